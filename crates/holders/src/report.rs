use std::collections::HashSet;

use camino::Utf8Path;

use crate::classify::DeviceKind;
use crate::error::HoldersError;
use crate::sysfs::short_name;
use crate::tree::{build_tree, HoldersTree};

/// Render a holders tree as an ASCII diagram, in the style of
/// `tree --charset=ascii`.
pub fn format_holders_tree(tree: &HoldersTree) -> String {
    format_lines(tree).join("\n")
}

fn format_lines(tree: &HoldersTree) -> Vec<String> {
    let mut result = vec![short_name(&tree.device).to_string()];
    let holders = &tree.holders;
    for (i, holder) in holders.iter().enumerate() {
        let last = i + 1 == holders.len();
        let (first_prefix, rest_prefix) = if last {
            ("`-- ", "    ")
        } else {
            ("|-- ", "|   ")
        };
        for (line_no, line) in format_lines(holder).into_iter().enumerate() {
            let prefix = if line_no == 0 { first_prefix } else { rest_prefix };
            result.push(format!("{prefix}{line}"));
        }
    }
    result
}

/// Pre-order `(kind, device)` pairs for every node in the tree, the
/// device itself first and its holders afterward.
fn flatten_kinds(tree: &HoldersTree) -> Vec<(DeviceKind, &Utf8Path)> {
    let mut out = vec![(tree.kind, tree.device.as_path())];
    for holder in &tree.holders {
        out.extend(flatten_kinds(holder));
    }
    out
}

/// Check that `bases` are clear of any non-trivial holders: nothing above
/// them but raw disks and their own partitions. Purely inspects sysfs;
/// never touches any device.
pub(crate) fn assert_clear_in(root: &Utf8Path, bases: &[&str]) -> Result<(), HoldersError> {
    let base_paths: HashSet<String> = bases
        .iter()
        .map(|b| crate::sysfs::canonicalize(root, b))
        .collect::<Result<HashSet<_>, _>>()?
        .into_iter()
        .map(|p| p.into_string())
        .collect();

    for base in bases {
        let tree = build_tree(root, base)?;
        let bad = flatten_kinds(&tree).into_iter().any(|(kind, path)| {
            !matches!(kind, DeviceKind::Disk | DeviceKind::Partition)
                && !base_paths.contains(path.as_str())
        });
        if bad {
            return Err(HoldersError::NotClear(format_holders_tree(&tree)));
        }
    }
    Ok(())
}
