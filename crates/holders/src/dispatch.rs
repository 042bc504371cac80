use camino::Utf8Path;

use crate::actions::{self, Runner};
use crate::classify::DeviceKind;
use crate::error::HoldersError;
use crate::plan::ScheduleEntry;

type Action = fn(&Utf8Path, &dyn Runner) -> Result<(), HoldersError>;

/// The shutdown action registered for each device kind. Every kind has
/// one, including `disk` and `partition`, which share `wipe_superblock`.
fn shutdown_for(kind: DeviceKind) -> Action {
    match kind {
        DeviceKind::Partition => actions::wipe_superblock,
        DeviceKind::Lvm => actions::shutdown_lvm,
        DeviceKind::Raid => actions::shutdown_mdadm,
        DeviceKind::Bcache => actions::shutdown_bcache,
        DeviceKind::Disk => actions::wipe_superblock,
    }
}

/// Run a schedule in order: for each entry, invoke its kind's shutdown
/// action, then settle the kernel's uevent queue before moving to the
/// next entry. Stops at the first unhandled error, leaving everything
/// from that entry on untouched.
pub(crate) fn dispatch(schedule: &[ScheduleEntry], runner: &dyn Runner) -> Result<(), HoldersError> {
    for entry in schedule {
        tracing::info!(
            "shutdown running on holder type: '{}' syspath: '{}'",
            entry.kind,
            entry.device
        );
        let action = shutdown_for(entry.kind);
        action(&entry.device, runner)?;
        settle(runner)?;
    }
    Ok(())
}

fn settle(runner: &dyn Runner) -> Result<(), HoldersError> {
    let out = runner
        .run("udevadm", &["settle"])
        .map_err(|e| HoldersError::CommandFailed {
            cmd: "udevadm settle".to_string(),
            rc: None,
            stderr: e.to_string(),
        })?;
    if out.success {
        Ok(())
    } else {
        Err(HoldersError::CommandFailed {
            cmd: "udevadm settle".to_string(),
            rc: out.code,
            stderr: out.stderr,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{FakeRunner, SysfsFixture};
    use crate::plan::plan_shutdown_holder_trees;
    use crate::tree::build_tree;

    #[test]
    fn test_dispatch_settles_after_every_action() {
        let fx = SysfsFixture::new();
        let sda = fx.disk("sda");
        fx.partition(&sda, "sda1", 1);
        let tree = build_tree(&fx.root, "sda").unwrap();
        let schedule = plan_shutdown_holder_trees([&tree]);

        let runner = FakeRunner::new();
        dispatch(&schedule, &runner).unwrap();

        let calls = runner.calls();
        assert_eq!(calls.len(), schedule.len() * 2);
        for pair in calls.chunks(2) {
            assert_eq!(pair[1].0, "udevadm");
        }
    }

    #[test]
    fn test_dispatch_stops_on_first_failure() {
        let fx = SysfsFixture::new();
        let sda = fx.disk("sda");
        let sda1 = fx.partition(&sda, "sda1", 1);
        fx.raid("md0");
        fx.hold(&sda1, "md0");
        let tree = build_tree(&fx.root, "sda").unwrap();
        let schedule = plan_shutdown_holder_trees([&tree]);

        let runner = FakeRunner::new().fail("mdadm");
        let err = dispatch(&schedule, &runner).unwrap_err();
        assert!(matches!(err, HoldersError::CommandFailed { .. }));
        // md0, the first and deepest entry, failed before any settle or
        // subsequent action ran.
        assert_eq!(runner.calls().len(), 1);
    }
}
