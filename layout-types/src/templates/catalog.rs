use std::sync::LazyLock;

use crate::partition::PartitionTable;

// Load TOML data at compile time from the workspace resources directory
const PLAIN_TOML: &str = include_str!("../../../resources/templates/plain.toml");
const LUKS_TOML: &str = include_str!("../../../resources/templates/luks.toml");
const LUKS_LVM_TOML: &str = include_str!("../../../resources/templates/luks-lvm.toml");
const BTRFS_TOML: &str = include_str!("../../../resources/templates/btrfs.toml");

pub(super) const SOURCES: &[(&str, &str)] = &[
    ("plain", PLAIN_TOML),
    ("luks", LUKS_TOML),
    ("luks+lvm", LUKS_LVM_TOML),
    ("btrfs", BTRFS_TOML),
];

pub static BUILTIN_TEMPLATES: LazyLock<Vec<(&'static str, PartitionTable)>> =
    LazyLock::new(|| {
        SOURCES
            .iter()
            .filter_map(|(name, source)| {
                toml::from_str::<PartitionTable>(source)
                    .ok()
                    .map(|table| (*name, table))
            })
            .collect()
    });
