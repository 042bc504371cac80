use std::fs;
use std::process::Command;

use camino::Utf8Path;
use fn_error_context::context;
use storectl_utils::{CommandRunExt, PathQuotedDisplay};

use crate::error::HoldersError;
use crate::sysfs;

/// The outcome of running an external program: enough for a kind action
/// to tell success, a tolerated "already gone" code, and failure apart.
#[derive(Debug, Clone)]
pub struct RunOutput {
    /// Whether the process exited with code 0.
    pub success: bool,
    /// Its exit code, if not killed by a signal.
    pub code: Option<i32>,
    /// Captured standard output, trimmed.
    pub stdout: String,
    /// Captured standard error, trimmed.
    pub stderr: String,
}

/// Abstraction over "run an external program, get back its result",
/// letting tests substitute a recording fake instead of spawning real
/// binaries (`wipefs`, `lvremove`, `mdadm`, `udevadm`, ...).
pub trait Runner: std::fmt::Debug {
    /// Run `program` with `args` to completion and return its result.
    /// Only a failure to start the process (missing binary, fork
    /// failure) is an `Err`; a non-zero exit is a successfully-observed
    /// [`RunOutput`].
    fn run(&self, program: &str, args: &[&str]) -> anyhow::Result<RunOutput>;
}

/// The real [`Runner`], spawning actual processes.
#[derive(Debug, Default)]
pub struct SystemRunner;

impl Runner for SystemRunner {
    #[context("Running {program}")]
    fn run(&self, program: &str, args: &[&str]) -> anyhow::Result<RunOutput> {
        let mut cmd = Command::new(program);
        cmd.args(args);
        cmd.log_debug();
        let out = cmd.output()?;
        Ok(RunOutput {
            success: out.status.success(),
            code: out.status.code(),
            stdout: String::from_utf8_lossy(&out.stdout).trim().to_string(),
            stderr: String::from_utf8_lossy(&out.stderr).trim().to_string(),
        })
    }
}

/// Render a program and its arguments for an error message or log line,
/// shell-quoting each argument so a device path containing whitespace or
/// metacharacters doesn't read as multiple tokens.
fn describe(program: &str, args: &[&str]) -> String {
    let mut s = program.to_string();
    for a in args {
        s.push(' ');
        s.push_str(&PathQuotedDisplay::new(a).to_string());
    }
    s
}

/// Run `program`, converting a failure to even start the process into a
/// [`HoldersError::CommandFailed`] so every action has one error type to
/// propagate with `?`.
fn run(runner: &dyn Runner, program: &str, args: &[&str]) -> Result<RunOutput, HoldersError> {
    runner
        .run(program, args)
        .map_err(|e| HoldersError::CommandFailed {
            cmd: describe(program, args),
            rc: None,
            stderr: e.to_string(),
        })
}

fn failed(program: &str, args: &[&str], out: &RunOutput) -> HoldersError {
    HoldersError::CommandFailed {
        cmd: describe(program, args),
        rc: out.code,
        stderr: out.stderr.clone(),
    }
}

/// Zero the on-disk metadata of the device at `path` so it isn't
/// reassembled into a filesystem, array, or partition table on next boot.
///
/// Tolerates one specific failure: a "no such device" condition when the
/// node looks like a DOS extended partition container (size 0 or 2
/// sectors, partition index <= 4) — wiping these historically reports
/// failure even though nothing is actually wrong.
pub(crate) fn wipe_superblock(path: &Utf8Path, runner: &dyn Runner) -> Result<(), HoldersError> {
    let dev = sysfs::dev_path(sysfs::short_name(path));
    tracing::info!("wiping superblock on {path}");
    let out = run(runner, "wipefs", &["-a", dev.as_str()])?;
    if out.success {
        return Ok(());
    }
    if is_no_such_device(&out) && is_phantom_extended_partition(path) {
        tracing::debug!("{path}: swallowing wipe error, likely a phantom extended partition");
        return Ok(());
    }
    Err(failed("wipefs", &["-a", dev.as_str()], &out))
}

fn is_no_such_device(out: &RunOutput) -> bool {
    let s = out.stderr.to_ascii_lowercase();
    s.contains("no such device") || s.contains("no such file")
}

fn is_phantom_extended_partition(path: &Utf8Path) -> bool {
    let size = fs::read_to_string(path.join("size"))
        .ok()
        .and_then(|s| s.trim().parse::<u64>().ok());
    let partno = fs::read_to_string(path.join("partition"))
        .ok()
        .and_then(|s| s.trim().parse::<u32>().ok());
    matches!(size, Some(0) | Some(2)) && matches!(partno, Some(n) if n <= 4)
}

/// Split a `dm/name` value of the form `vg-lv` into `(vg, lv)`, honoring
/// LVM's escape of a literal `-` inside either component as `--`.
pub(crate) fn split_lvm_name(name: &str) -> (String, String) {
    let bytes = name.as_bytes();
    let mut i = 0;
    let mut boundary = None;
    while i < bytes.len() {
        if bytes[i] == b'-' {
            if i + 1 < bytes.len() && bytes[i + 1] == b'-' {
                i += 2;
                continue;
            }
            boundary = Some(i);
            break;
        }
        i += 1;
    }
    let unescape = |s: &str| s.replace("--", "-");
    match boundary {
        Some(idx) => (unescape(&name[..idx]), unescape(&name[idx + 1..])),
        None => (unescape(name), String::new()),
    }
}

/// Remove the logical volume backing `path`, reading its `(vg, lv)` from
/// `dm/name`. Tolerates `lvremove` exit code 5: a sibling teardown may
/// have already destroyed the volume group.
pub(crate) fn shutdown_lvm(path: &Utf8Path, runner: &dyn Runner) -> Result<(), HoldersError> {
    let name_path = path.join("dm").join("name");
    let raw = fs::read_to_string(&name_path)
        .map_err(|_| HoldersError::MissingSysfs(name_path.clone()))?;
    let (vg, lv) = split_lvm_name(raw.trim());
    let target = format!("{vg}/{lv}");
    tracing::debug!("running lvremove on {target}");
    let out = run(runner, "lvremove", &["--force", "--force", &target])?;
    if out.success {
        return Ok(());
    }
    if out.code == Some(5) {
        tracing::debug!("{target}: lvremove rc=5, already gone");
        return Ok(());
    }
    Err(failed("lvremove", &["--force", "--force", &target], &out))
}

/// Stop and remove the RAID array at `path`.
pub(crate) fn shutdown_mdadm(path: &Utf8Path, runner: &dyn Runner) -> Result<(), HoldersError> {
    let dev = sysfs::dev_path(sysfs::short_name(path));
    tracing::debug!("using mdadm stop/remove on {dev}");
    let stop = run(runner, "mdadm", &["--stop", dev.as_str()])?;
    if !stop.success {
        return Err(failed("mdadm", &["--stop", dev.as_str()], &stop));
    }
    let remove = run(runner, "mdadm", &["--remove", dev.as_str()])?;
    if !remove.success {
        return Err(failed("mdadm", &["--remove", dev.as_str()], &remove));
    }
    Ok(())
}

/// Stop the bcache cache layer backing `path`, if one is currently
/// attached. A missing `bcache/cache` symlink means bcache is already
/// stopped: a no-op success, not an error. Unlike the other actions this
/// writes directly to a sysfs attribute rather than shelling out.
pub(crate) fn shutdown_bcache(path: &Utf8Path, _runner: &dyn Runner) -> Result<(), HoldersError> {
    let link = path.join("bcache").join("cache");
    let Ok(cache_dir) = fs::canonicalize(&link) else {
        tracing::debug!("{path}: bcache not running, nothing to do");
        return Ok(());
    };
    let stop = cache_dir.join("stop");
    tracing::debug!("stopping bcache at {}", cache_dir.display());
    fs::write(&stop, b"1").map_err(|_| HoldersError::MissingSysfs(link))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{FakeRunner, SysfsFixture};

    #[test]
    fn test_split_lvm_name_simple() {
        assert_eq!(
            split_lvm_name("vg0-lv0"),
            ("vg0".to_string(), "lv0".to_string())
        );
    }

    #[test]
    fn test_split_lvm_name_escaped_hyphens() {
        // A literal hyphen in either the vg or lv name is doubled.
        assert_eq!(
            split_lvm_name("my--vg-my--lv"),
            ("my-vg".to_string(), "my-lv".to_string())
        );
    }

    #[test]
    fn test_wipe_superblock_calls_wipefs() {
        let fx = SysfsFixture::new();
        let sda = fx.disk("sda");
        let runner = FakeRunner::new();
        wipe_superblock(&sda, &runner).unwrap();
        let calls = runner.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, "wipefs");
    }

    #[test]
    fn test_shutdown_lvm_splits_name_and_removes() {
        let fx = SysfsFixture::new();
        let dm = fx.lvm("dm-0", "vg0-lv0");
        let runner = FakeRunner::new();
        shutdown_lvm(&dm, &runner).unwrap();
        let calls = runner.calls();
        assert_eq!(calls[0].0, "lvremove");
        assert!(calls[0].1.iter().any(|a| a == "vg0/lv0"));
    }

    #[test]
    fn test_shutdown_mdadm_stop_then_remove() {
        let fx = SysfsFixture::new();
        let md0 = fx.raid("md0");
        let runner = FakeRunner::new();
        shutdown_mdadm(&md0, &runner).unwrap();
        let calls = runner.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].1[0], "--stop");
        assert_eq!(calls[1].1[0], "--remove");
    }

    #[test]
    fn test_shutdown_bcache_noop_when_not_running() {
        let fx = SysfsFixture::new();
        let bcache0 = fx.bcache("bcache0");
        let runner = FakeRunner::new();
        shutdown_bcache(&bcache0, &runner).unwrap();
        assert!(runner.calls().is_empty());
    }

    #[test]
    fn test_shutdown_bcache_writes_stop() {
        let fx = SysfsFixture::new();
        let (bcache0, cache_dir) = fx.bcache_with_cache("bcache0");
        let runner = FakeRunner::new();
        shutdown_bcache(&bcache0, &runner).unwrap();
        let stopped = fs::read_to_string(cache_dir.join("stop")).unwrap();
        assert_eq!(stopped, "1");
    }
}
