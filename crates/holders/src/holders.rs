//! Holders graph engine: discover, classify, order, and tear down the
//! virtual storage layers stacked on top of a set of base block devices.
//!
//! [`sysfs`] resolves device designators and reads the raw holder and
//! partition relationships, [`classify`] assigns each node a
//! [`DeviceKind`], [`tree`] builds the holders tree, [`plan`] flattens
//! one or more trees into an ordered teardown schedule, [`actions`] and
//! [`dispatch`] run the per-kind shutdown and settle the kernel's uevent
//! queue afterward, and [`report`] renders trees and checks that a
//! device is clear of holders.

mod actions;
mod classify;
mod dispatch;
mod error;
mod plan;
mod report;
mod sysfs;
mod tree;

#[cfg(test)]
mod fixtures;

pub use actions::{RunOutput, Runner, SystemRunner};
pub use classify::DeviceKind;
pub use error::HoldersError;
pub use plan::{plan_shutdown_holder_trees, ScheduleEntry};
pub use report::format_holders_tree;
pub use sysfs::{dev_path, short_name};
pub use tree::HoldersTree;

use camino::Utf8Path;

const DEFAULT_SYSFS_ROOT: &str = "/sys";

/// Generate the holders tree rooted at `base`, against the real `/sys`.
///
/// `base` may be a short kernel name (`vdb`), a `/dev` node path, or an
/// absolute `/sys/block/...` path.
pub fn gen_holders_tree(base: &str) -> Result<HoldersTree, HoldersError> {
    tree::build_tree(Utf8Path::new(DEFAULT_SYSFS_ROOT), base)
}

/// Check that `bases` are clear of any non-trivial holders: nothing above
/// them but raw disks and their own partitions. Purely inspects sysfs and
/// never tears anything down.
pub fn assert_clear(bases: &[&str]) -> Result<(), HoldersError> {
    assert_clear_with(Utf8Path::new(DEFAULT_SYSFS_ROOT), bases)
}

/// As [`assert_clear`], but against an injected sysfs root — the seam
/// integration tests use to check S6 without a real kernel underneath.
pub fn assert_clear_with(root: &Utf8Path, bases: &[&str]) -> Result<(), HoldersError> {
    report::assert_clear_in(root, bases)
}

/// Tear down every virtual storage layer depending on `bases`, against
/// the real `/sys` and real external commands.
///
/// Fails (and stops) at the first unhandled error; teardown is not
/// transactional, so a caller may retry with the same `bases` once
/// whatever caused the failure is addressed.
pub fn clear_holders(bases: &[&str]) -> Result<(), HoldersError> {
    clear_holders_with(Utf8Path::new(DEFAULT_SYSFS_ROOT), &SystemRunner, bases)
}

/// As [`clear_holders`], but against an injected sysfs root and
/// [`Runner`] — the seam tests use to exercise the whole pipeline without
/// a real kernel underneath.
pub fn clear_holders_with(
    root: &Utf8Path,
    runner: &dyn Runner,
    bases: &[&str],
) -> Result<(), HoldersError> {
    let trees = bases
        .iter()
        .map(|b| tree::build_tree(root, b))
        .collect::<Result<Vec<_>, _>>()?;
    tracing::info!(
        "current device storage tree:\n{}",
        trees
            .iter()
            .map(format_holders_tree)
            .collect::<Vec<_>>()
            .join("\n")
    );
    let schedule = plan::plan_shutdown_holder_trees(trees.iter());
    dispatch::dispatch(&schedule, runner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{FakeRunner, SysfsFixture};

    #[test]
    fn test_clear_holders_with_end_to_end() {
        let fx = SysfsFixture::new();
        let sda = fx.disk("sda");
        fx.partition(&sda, "sda1", 1);
        fx.partition(&sda, "sda2", 2);

        let runner = FakeRunner::new();
        clear_holders_with(&fx.root, &runner, &["sda"]).unwrap();

        // 3 schedule entries (sda1, sda2, sda), one action call and one
        // settle call each.
        assert_eq!(runner.calls().len(), 6);
    }

    #[test]
    fn test_gen_holders_tree_rejects_unknown_device() {
        let err = gen_holders_tree("totally-bogus-device-name").unwrap_err();
        assert!(matches!(err, HoldersError::NotBlockDevice(_)));
    }
}
