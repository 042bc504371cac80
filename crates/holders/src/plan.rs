use std::collections::HashMap;

use camino::Utf8PathBuf;

use crate::classify::DeviceKind;
use crate::tree::HoldersTree;

/// One entry of a computed teardown schedule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduleEntry {
    /// The device's canonical sysfs path.
    pub device: Utf8PathBuf,
    /// Its teardown level: the maximum depth at which it's reachable from
    /// any of the planner's input roots. Higher levels are torn down
    /// first.
    pub level: u32,
    /// Its classified kind.
    pub kind: DeviceKind,
}

/// Flatten one or more holders trees into a single schedule, reconciling
/// devices reachable via more than one path to the maximum level seen on
/// any path, and propagating that increase down to their own holders.
///
/// The overwrite-then-recurse shape (rather than "first level visited
/// wins") matters whenever a layer is reachable both directly and via a
/// deeper path: a bcache layer caching a disk directly, while also
/// backed by a RAID array built from partitions of that same disk, must
/// end up scheduled above the RAID array regardless of which path the
/// traversal happens to visit it by first.
pub fn plan_shutdown_holder_trees<'a, I>(trees: I) -> Vec<ScheduleEntry>
where
    I: IntoIterator<Item = &'a HoldersTree>,
{
    let mut registry: HashMap<Utf8PathBuf, ScheduleEntry> = HashMap::new();
    for tree in trees {
        flatten(tree, 0, &mut registry);
    }
    let mut schedule: Vec<ScheduleEntry> = registry.into_values().collect();
    schedule.sort_by(|a, b| b.level.cmp(&a.level));
    schedule
}

fn flatten(tree: &HoldersTree, level: u32, registry: &mut HashMap<Utf8PathBuf, ScheduleEntry>) {
    let level = match registry.get(&tree.device) {
        Some(existing) => level.max(existing.level),
        None => level,
    };
    registry.insert(
        tree.device.clone(),
        ScheduleEntry {
            device: tree.device.clone(),
            level,
            kind: tree.kind,
        },
    );
    for holder in &tree.holders {
        flatten(holder, level + 1, registry);
    }
}
