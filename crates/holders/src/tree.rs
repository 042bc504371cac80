use camino::{Utf8Path, Utf8PathBuf};

use crate::classify::{classify, DeviceKind};
use crate::error::HoldersError;
use crate::sysfs;

/// A node in the holders tree: a device, its classified kind, and the
/// devices that hold it. A holder depends on the device it holds and
/// must be torn down first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HoldersTree {
    /// The device's canonical sysfs path.
    pub device: Utf8PathBuf,
    /// Its classified kind.
    pub kind: DeviceKind,
    /// Devices holding this one: RAID members list their array, bcache
    /// cache and backing devices list their bcache layer, disks list
    /// their partitions, and so on.
    pub holders: Vec<HoldersTree>,
}

/// Recursively build the holders tree rooted at `designator`, resolved
/// against `root` (ordinarily `/sys`).
pub(crate) fn build_tree(root: &Utf8Path, designator: &str) -> Result<HoldersTree, HoldersError> {
    let device = sysfs::canonicalize(root, designator)?;
    build_tree_at(root, device)
}

fn build_tree_at(root: &Utf8Path, device: Utf8PathBuf) -> Result<HoldersTree, HoldersError> {
    let kind = classify(&device);

    let mut children: Vec<Utf8PathBuf> = Vec::new();
    for holder in sysfs::list_holders(&device) {
        children.push(sysfs::canonicalize(root, &holder)?);
    }
    children.extend(sysfs::list_partitions(&device));

    let mut holders = Vec::with_capacity(children.len());
    for child in children {
        holders.push(build_tree_at(root, child)?);
    }

    Ok(HoldersTree {
        device,
        kind,
        holders,
    })
}
