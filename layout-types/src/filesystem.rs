//! Filesystem payloads

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Filesystem types the builder knows how to lay out
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilesystemType {
    Xfs,
    Ext4,
    Vfat,
    Btrfs,
    Swap,
}

impl FilesystemType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Xfs => "xfs",
            Self::Ext4 => "ext4",
            Self::Vfat => "vfat",
            Self::Btrfs => "btrfs",
            Self::Swap => "swap",
        }
    }

    /// Whether the filesystem is mounted somewhere in the tree
    pub fn is_mountable(&self) -> bool {
        !matches!(self, Self::Swap)
    }
}

impl fmt::Display for FilesystemType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FilesystemType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "xfs" => Ok(Self::Xfs),
            "ext4" => Ok(Self::Ext4),
            "vfat" | "fat" => Ok(Self::Vfat),
            "btrfs" => Ok(Self::Btrfs),
            "swap" => Ok(Self::Swap),
            other => Err(format!("unknown filesystem type: {other}")),
        }
    }
}

/// A filesystem living on a partition, inside LUKS, or on a logical volume
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Filesystem {
    pub fs_type: FilesystemType,

    /// Filesystem UUID, generated by the builder when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uuid: Option<Uuid>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,

    /// Mount point (e.g., "/", "/boot/efi"); `None` for swap
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mountpoint: Option<String>,

    #[serde(default = "default_fstab_options")]
    pub fstab_options: String,
}

fn default_fstab_options() -> String {
    "defaults".to_string()
}

impl Filesystem {
    pub fn new(fs_type: FilesystemType, mountpoint: Option<String>) -> Self {
        let fstab_options = match (fs_type, mountpoint.as_deref()) {
            (FilesystemType::Vfat, Some("/boot/efi")) => "defaults,uid=0,gid=0,umask=077,shortname=winnt",
            _ => "defaults",
        };
        Self {
            fs_type,
            uuid: None,
            label: None,
            mountpoint,
            fstab_options: fstab_options.to_string(),
        }
    }

    pub fn with_label(mut self, label: Option<String>) -> Self {
        self.label = label;
        self
    }
}

/// Filesystem type chosen for a mountpoint when the request does not name one.
pub fn default_fs_type_for(mountpoint: &str, fallback: FilesystemType) -> FilesystemType {
    match mountpoint {
        "/boot/efi" => FilesystemType::Vfat,
        _ => fallback,
    }
}
