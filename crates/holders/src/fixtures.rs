//! Synthetic sysfs trees and a fake command runner, shared by every
//! module's unit tests. Never compiled outside `#[cfg(test)]`.

use std::cell::RefCell;
use std::collections::HashSet;
use std::fs;

use camino::{Utf8Path, Utf8PathBuf};
use tempfile::TempDir;

use crate::actions::{RunOutput, Runner};

/// A throwaway `<root>/block/...` sysfs tree, torn down when dropped.
///
/// Real sysfs represents a "holder" relationship as a symlink under
/// `holders/` to the holding device's own directory; these fixtures use
/// an empty file with the holder's short name instead, since
/// [`crate::sysfs::list_holders`] only cares about directory entry
/// names. bcache's `bcache/cache` link is the one place the engine
/// resolves a holder relationship via `fs::canonicalize`, so
/// [`SysfsFixture::bcache_with_cache`] uses a real symlink there.
pub(crate) struct SysfsFixture {
    _dir: TempDir,
    pub(crate) root: Utf8PathBuf,
}

impl SysfsFixture {
    pub(crate) fn new() -> Self {
        let dir = TempDir::new().expect("create tempdir");
        let root = Utf8PathBuf::try_from(dir.path().to_path_buf()).expect("utf8 tmp path");
        fs::create_dir_all(root.join("block")).unwrap();
        Self { _dir: dir, root }
    }

    fn block(&self) -> Utf8PathBuf {
        self.root.join("block")
    }

    /// Create a disk node `name` directly under `block/`.
    pub(crate) fn disk(&self, name: &str) -> Utf8PathBuf {
        let p = self.block().join(name);
        fs::create_dir_all(p.join("holders")).unwrap();
        p
    }

    /// Create a partition node nested under `disk`, with a `partition`
    /// index attribute and a plausible `size`.
    pub(crate) fn partition(&self, disk: &Utf8Path, name: &str, index: u32) -> Utf8PathBuf {
        let p = disk.join(name);
        fs::create_dir_all(p.join("holders")).unwrap();
        fs::write(p.join("partition"), index.to_string()).unwrap();
        fs::write(p.join("size"), "1048576").unwrap();
        p
    }

    /// Create a RAID (md) node directly under `block/`.
    pub(crate) fn raid(&self, name: &str) -> Utf8PathBuf {
        let p = self.block().join(name);
        fs::create_dir_all(p.join("holders")).unwrap();
        fs::create_dir_all(p.join("md")).unwrap();
        p
    }

    /// Create an LVM (device-mapper) node directly under `block/`, with
    /// `dm/name` set to `dm_name`.
    pub(crate) fn lvm(&self, name: &str, dm_name: &str) -> Utf8PathBuf {
        let p = self.block().join(name);
        fs::create_dir_all(p.join("holders")).unwrap();
        fs::create_dir_all(p.join("dm")).unwrap();
        fs::write(p.join("dm").join("name"), dm_name).unwrap();
        p
    }

    /// Create a bcache node directly under `block/`, with no running
    /// cache attached.
    pub(crate) fn bcache(&self, name: &str) -> Utf8PathBuf {
        let p = self.block().join(name);
        fs::create_dir_all(p.join("holders")).unwrap();
        fs::create_dir_all(p.join("bcache")).unwrap();
        p
    }

    /// As [`SysfsFixture::bcache`], but also wires up a running cache:
    /// a `bcache/cache` symlink to a stand-in for `/sys/fs/bcache/<uuid>`
    /// carrying a `stop` attribute. Returns the bcache node and the
    /// cache directory.
    pub(crate) fn bcache_with_cache(&self, name: &str) -> (Utf8PathBuf, Utf8PathBuf) {
        let p = self.bcache(name);
        let cache_dir = self.root.join(format!("fs-bcache-{name}"));
        fs::create_dir_all(&cache_dir).unwrap();
        fs::write(cache_dir.join("stop"), "").unwrap();
        std::os::unix::fs::symlink(cache_dir.as_std_path(), p.join("bcache").join("cache"))
            .unwrap();
        (p, cache_dir)
    }

    /// Record that `holder_name` holds `device`.
    pub(crate) fn hold(&self, device: &Utf8Path, holder_name: &str) {
        fs::write(device.join("holders").join(holder_name), "").unwrap();
    }
}

/// A [`Runner`] that records every invocation instead of spawning a
/// process, optionally simulating failure for a named program.
#[derive(Debug, Default)]
pub(crate) struct FakeRunner {
    calls: RefCell<Vec<(String, Vec<String>)>>,
    fail_programs: HashSet<String>,
}

impl FakeRunner {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Make every future call to `program` report failure.
    pub(crate) fn fail(mut self, program: &str) -> Self {
        self.fail_programs.insert(program.to_string());
        self
    }

    pub(crate) fn calls(&self) -> Vec<(String, Vec<String>)> {
        self.calls.borrow().clone()
    }
}

impl Runner for FakeRunner {
    fn run(&self, program: &str, args: &[&str]) -> anyhow::Result<RunOutput> {
        self.calls.borrow_mut().push((
            program.to_string(),
            args.iter().map(|s| s.to_string()).collect(),
        ));
        let success = !self.fail_programs.contains(program);
        Ok(RunOutput {
            success,
            code: Some(if success { 0 } else { 1 }),
            stdout: String::new(),
            stderr: if success {
                String::new()
            } else {
                format!("{program}: simulated failure")
            },
        })
    }
}
