//! Feature inspection
//!
//! Reports which filesystems and block-layer wrappers occur anywhere in a
//! partition table, e.g. to check that an image type supports LUKS before
//! accepting a layout.

use serde::{Deserialize, Serialize};

use crate::filesystem::{Filesystem, FilesystemType};
use crate::partition::{LuksPayload, PartitionTable, Payload};

/// Structures present in a partition table
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionTableFeatures {
    pub xfs: bool,
    pub fat: bool,
    pub luks: bool,
    pub lvm: bool,
    pub btrfs: bool,
}

impl PartitionTableFeatures {
    fn visit_filesystem(&mut self, fs: &Filesystem) {
        match fs.fs_type {
            FilesystemType::Xfs => self.xfs = true,
            FilesystemType::Vfat => self.fat = true,
            FilesystemType::Btrfs => self.btrfs = true,
            FilesystemType::Ext4 | FilesystemType::Swap => {}
        }
    }

    fn visit_payload(&mut self, payload: &Payload) {
        match payload {
            Payload::Filesystem(fs) => self.visit_filesystem(fs),
            Payload::Luks(luks) => {
                self.luks = true;
                match &luks.payload {
                    LuksPayload::Filesystem(fs) => self.visit_filesystem(fs),
                    LuksPayload::LvmVolumeGroup(vg) => {
                        self.lvm = true;
                        for lv in &vg.logical_volumes {
                            self.visit_filesystem(&lv.payload);
                        }
                    }
                }
            }
            Payload::LvmVolumeGroup(vg) => {
                self.lvm = true;
                for lv in &vg.logical_volumes {
                    self.visit_filesystem(&lv.payload);
                }
            }
            Payload::Btrfs(_) => self.btrfs = true,
        }
    }

    /// Names of the features that are set, for display
    pub fn names(&self) -> Vec<&'static str> {
        [
            (self.xfs, "xfs"),
            (self.fat, "fat"),
            (self.luks, "luks"),
            (self.lvm, "lvm"),
            (self.btrfs, "btrfs"),
        ]
        .into_iter()
        .filter_map(|(set, name)| set.then_some(name))
        .collect()
    }
}

impl PartitionTable {
    pub fn features(&self) -> PartitionTableFeatures {
        let mut features = PartitionTableFeatures::default();
        for payload in self.partitions.iter().filter_map(|p| p.payload.as_ref()) {
            features.visit_payload(payload);
        }
        features
    }
}
