use std::fs;

use camino::{Utf8Path, Utf8PathBuf};

use crate::error::HoldersError;

/// Resolve any of the three device designator forms (a short kernel
/// name, a `/dev` node path, or an absolute `<root>/block/...` path) to a
/// canonical sysfs block device path of the form
/// `<root>/block/<disk>[/<partition>]`.
pub(crate) fn canonicalize(
    root: &Utf8Path,
    designator: &str,
) -> Result<Utf8PathBuf, HoldersError> {
    let block = root.join("block");

    if let Ok(rel) = Utf8Path::new(designator).strip_prefix(&block) {
        return verify(block.join(rel));
    }

    if let Some(short) = designator.strip_prefix("/dev/") {
        return resolve_short_name(root, short);
    }

    if designator.starts_with('/') {
        return Err(HoldersError::NotBlockDevice(designator.into()));
    }

    resolve_short_name(root, designator)
}

fn verify(path: Utf8PathBuf) -> Result<Utf8PathBuf, HoldersError> {
    if path.is_dir() {
        Ok(path)
    } else {
        Err(HoldersError::NotBlockDevice(path))
    }
}

/// Resolve a bare kernel name (`vdb`, `vdb7`, `md0`, ...) to its canonical
/// sysfs path. Tried first as a top-level disk, then as a partition
/// nested one level under some disk, mirroring how the kernel itself
/// nests `<root>/block/<disk>/<partition>`.
fn resolve_short_name(root: &Utf8Path, short: &str) -> Result<Utf8PathBuf, HoldersError> {
    let block = root.join("block");

    let direct = block.join(short);
    if direct.is_dir() {
        return Ok(direct);
    }

    if let Ok(entries) = fs::read_dir(&block) {
        for entry in entries.flatten() {
            let Ok(path) = Utf8PathBuf::try_from(entry.path()) else {
                continue;
            };
            let candidate = path.join(short);
            if candidate.is_dir() {
                return Ok(candidate);
            }
        }
    }

    Err(HoldersError::NotBlockDevice(short.into()))
}

/// List the short kernel names of a device's current holders. An absent
/// or empty `holders/` directory yields an empty list, not an error.
pub(crate) fn list_holders(path: &Utf8Path) -> Vec<String> {
    let Ok(entries) = fs::read_dir(path.join("holders")) else {
        return Vec::new();
    };
    let mut names: Vec<String> = entries
        .flatten()
        .filter_map(|e| e.file_name().into_string().ok())
        .collect();
    names.sort();
    tracing::debug!("{path} had holders: {names:?}");
    names
}

/// List the partition subdirectories directly under a disk's sysfs node.
/// A partition subdirectory is identified by carrying a `partition`
/// attribute file — the same test [`crate::classify::classify`] uses.
/// Naturally empty for anything that isn't a disk, since non-disk nodes
/// don't nest device directories under themselves.
pub(crate) fn list_partitions(path: &Utf8Path) -> Vec<Utf8PathBuf> {
    let Ok(entries) = fs::read_dir(path) else {
        return Vec::new();
    };
    let mut parts: Vec<Utf8PathBuf> = entries
        .flatten()
        .filter_map(|e| Utf8PathBuf::try_from(e.path()).ok())
        .filter(|p| p.is_dir() && p.join("partition").is_file())
        .collect();
    parts.sort();
    parts
}

/// The short kernel name of a canonical sysfs path: its last component.
pub fn short_name(path: &Utf8Path) -> &str {
    path.file_name().unwrap_or(path.as_str())
}

/// The `/dev` node path for a short kernel name.
pub fn dev_path(short: &str) -> Utf8PathBuf {
    Utf8PathBuf::from("/dev").join(short)
}
