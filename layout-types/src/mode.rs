//! Partitioning mode policy values

use std::fmt;

use serde::{Deserialize, Serialize};

/// How content mountpoints are placed on the disk.
///
/// `Default` defers to the policy configured on the base partition table; it
/// is substituted away before any layout decision is taken.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PartitioningMode {
    #[default]
    #[serde(alias = "")]
    Default,

    /// Wrap content in LVM only when a sized non-root mountpoint is requested
    AutoLvm,

    /// Always wrap content in an LVM volume group
    Lvm,

    /// Never wrap content in LVM
    Raw,
}

impl PartitioningMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Default => "default",
            Self::AutoLvm => "auto-lvm",
            Self::Lvm => "lvm",
            Self::Raw => "raw",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "" | "default" => Some(Self::Default),
            "auto-lvm" => Some(Self::AutoLvm),
            "lvm" => Some(Self::Lvm),
            "raw" => Some(Self::Raw),
            _ => None,
        }
    }
}

impl fmt::Display for PartitioningMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
