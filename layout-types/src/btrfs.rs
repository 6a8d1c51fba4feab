// SPDX-License-Identifier: GPL-3.0-only

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A btrfs volume occupying one partition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BtrfsVolume {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uuid: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default)]
    pub subvolumes: Vec<BtrfsSubvolume>,
}

impl BtrfsVolume {
    pub fn find_mountpoint(&self, mountpoint: &str) -> Option<&BtrfsSubvolume> {
        self.subvolumes
            .iter()
            .find(|subvol| subvol.mountpoint.as_deref() == Some(mountpoint))
    }
}

/// A named subvolume; shares the storage of its volume
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BtrfsSubvolume {
    /// Path of the subvolume relative to the top-level volume (e.g. "root", "var/log")
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mountpoint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compress: Option<String>,
}

/// Subvolume name for a mountpoint: `/` → `root`, `/var/log` → `var/log`.
pub fn subvolume_name_for_mountpoint(mountpoint: &str) -> String {
    let trimmed = mountpoint.trim_matches('/');
    if trimmed.is_empty() {
        "root".to_string()
    } else {
        trimmed.to_string()
    }
}
