use camino::Utf8PathBuf;

/// Errors surfaced by the holders engine's public API.
///
/// Two recoverable conditions named in the design notes — wiping a
/// phantom extended partition, and "something else already tore this
/// down" — are deliberately not variants here: they're detected and
/// swallowed inside the kind actions before ever becoming a `Result::Err`
/// a caller would see.
#[derive(Debug, thiserror::Error)]
pub enum HoldersError {
    /// A device designator did not resolve to a sysfs block device node.
    #[error("{0} is not a block device")]
    NotBlockDevice(Utf8PathBuf),

    /// A sysfs attribute that should exist given the node's classified
    /// kind was missing.
    #[error("missing sysfs attribute: {0}")]
    MissingSysfs(Utf8PathBuf),

    /// An external command exited with a code the caller did not expect
    /// and did not tolerate.
    #[error("command `{cmd}` failed (exit {rc:?}): {stderr}")]
    CommandFailed {
        /// The program and arguments invoked.
        cmd: String,
        /// Its exit code, if not killed by a signal.
        rc: Option<i32>,
        /// Captured standard error.
        stderr: String,
    },

    /// [`crate::assert_clear`] found holders that are not plain disks or
    /// partitions. Carries a rendered tree of the offending state.
    #[error("storage not clear, remaining:\n{0}")]
    NotClear(String),
}
