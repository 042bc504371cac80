use camino::Utf8Path;

/// The kind of a block device node, as classified by [`classify`] from
/// the sysfs subpaths present under its directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceKind {
    /// A partition of a disk (or of another partitionable device).
    Partition,
    /// A device-mapper node; in practice almost always an LVM logical
    /// volume, which is the only device-mapper use case this engine
    /// knows how to tear down.
    Lvm,
    /// A software RAID array (md).
    Raid,
    /// A bcache caching layer.
    Bcache,
    /// Anything else, typically a whole disk.
    Disk,
}

impl std::fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            DeviceKind::Partition => "partition",
            DeviceKind::Lvm => "lvm",
            DeviceKind::Raid => "raid",
            DeviceKind::Bcache => "bcache",
            DeviceKind::Disk => "disk",
        };
        f.write_str(s)
    }
}

/// Subpaths tested against a device's sysfs node, in priority order: the
/// first one present wins. A node with none of these present classifies
/// as a plain [`DeviceKind::Disk`].
const IDENTIFIERS: &[(&str, DeviceKind)] = &[
    ("partition", DeviceKind::Partition),
    ("dm", DeviceKind::Lvm),
    ("md", DeviceKind::Raid),
    ("bcache", DeviceKind::Bcache),
];

/// Classify a canonical sysfs device node by the first identifying
/// subpath present, falling back to [`DeviceKind::Disk`].
pub fn classify(path: &Utf8Path) -> DeviceKind {
    IDENTIFIERS
        .iter()
        .find(|(subpath, _)| path.join(subpath).exists())
        .map(|(_, kind)| *kind)
        .unwrap_or(DeviceKind::Disk)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::SysfsFixture;

    #[test]
    fn test_classify_disk() {
        let fx = SysfsFixture::new();
        let sda = fx.disk("sda");
        assert_eq!(classify(&sda), DeviceKind::Disk);
    }

    #[test]
    fn test_classify_partition_wins_over_dm() {
        // A node carrying both `partition` and `dm` subpaths classifies
        // as a partition: first-match-wins.
        let fx = SysfsFixture::new();
        let sda = fx.disk("sda");
        let sda1 = fx.partition(&sda, "sda1", 1);
        std::fs::create_dir_all(sda1.join("dm")).unwrap();
        assert_eq!(classify(&sda1), DeviceKind::Partition);
    }

    #[test]
    fn test_classify_raid_bcache_lvm() {
        let fx = SysfsFixture::new();
        assert_eq!(classify(&fx.raid("md0")), DeviceKind::Raid);
        assert_eq!(classify(&fx.bcache("bcache0")), DeviceKind::Bcache);
        assert_eq!(classify(&fx.lvm("dm-0", "vg0-lv0")), DeviceKind::Lvm);
    }
}
