//! LVM (Logical Volume Manager) types
//!
//! A volume group is the payload of a partition (optionally inside LUKS) and
//! is carved into logical volumes, each holding one filesystem.

use serde::{Deserialize, Serialize};

use crate::common::MIB;
use crate::filesystem::Filesystem;

/// Default LVM physical extent size; logical volumes are sized in extents
pub const LVM_EXTENT_SIZE: u64 = 4 * MIB;

/// Space reserved at the start of a physical volume for LVM metadata
pub const LVM_METADATA_SIZE: u64 = MIB;

/// Volume group
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LvmVolumeGroup {
    /// Volume group name
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default)]
    pub logical_volumes: Vec<LogicalVolume>,
}

impl LvmVolumeGroup {
    /// Sum of all logical volume sizes in bytes
    pub fn used(&self) -> u64 {
        self.logical_volumes
            .iter()
            .fold(0u64, |acc, lv| acc.saturating_add(lv.size))
    }

    /// Size of the physical volume needed to hold every logical volume
    pub fn required_size(&self) -> u64 {
        self.used().saturating_add(LVM_METADATA_SIZE)
    }

    pub fn find_mountpoint(&self, mountpoint: &str) -> Option<&LogicalVolume> {
        self.logical_volumes
            .iter()
            .find(|lv| lv.payload.mountpoint.as_deref() == Some(mountpoint))
    }

    /// Pick a logical volume name derived from `mountpoint` that is not yet
    /// used in this group.
    pub fn unique_lv_name(&self, mountpoint: &str) -> String {
        let base = lv_name_for_mountpoint(mountpoint);
        let taken = |name: &str| self.logical_volumes.iter().any(|lv| lv.name == name);

        if !taken(&base) {
            return base;
        }
        (1..)
            .map(|n| format!("{base}{n:02}"))
            .find(|candidate| !taken(candidate))
            .unwrap_or(base)
    }
}

/// Logical volume
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogicalVolume {
    /// Logical volume name
    pub name: String,

    /// Size in bytes
    pub size: u64,

    pub payload: Filesystem,
}

impl LogicalVolume {
    /// Get a display name for this logical volume (e.g. "rootvg/rootlv")
    pub fn display_name(&self, vg_name: &str) -> String {
        if vg_name.is_empty() {
            self.name.clone()
        } else {
            format!("{}/{}", vg_name, self.name)
        }
    }
}

/// Derive a logical volume name from a mountpoint:
/// `/` → `rootlv`, `/var/log` → `var_loglv`.
pub fn lv_name_for_mountpoint(mountpoint: &str) -> String {
    let trimmed = mountpoint.trim_matches('/');
    if trimmed.is_empty() {
        "rootlv".to_string()
    } else {
        format!("{}lv", trimmed.replace('/', "_"))
    }
}
