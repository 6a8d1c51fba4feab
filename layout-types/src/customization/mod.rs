//! Disk customizations
//!
//! A [`DiskCustomization`] is the user's declarative description of the disk:
//! an optional size floor and an ordered list of partitions. Each partition is
//! one of three variants selected by its `type` field:
//!
//! - `plain`: a filesystem directly on the partition
//! - `lvm`: an LVM volume group holding logical volumes
//! - `btrfs`: a btrfs volume holding subvolumes
//!
//! Decoding is strict per variant (see [`decode`]): a `plain` partition that
//! carries `logical_volumes` is rejected instead of having the field dropped.

mod decode;
mod validate;

use std::fmt;

use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

use crate::filesystem::FilesystemType;
use crate::size::deserialize_opt_size;

pub use decode::{DecodeError, decode_disk, decode_logical_volume, decode_partition};
pub use validate::{ValidationError, is_canonical_mountpoint};

/// Discriminant of a [`PartitionCustomization`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PartitionType {
    Plain,
    Lvm,
    Btrfs,
}

impl PartitionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Plain => "plain",
            Self::Lvm => "lvm",
            Self::Btrfs => "btrfs",
        }
    }

    /// Parse a `type` value; an empty string selects `plain`.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "" | "plain" => Some(Self::Plain),
            "lvm" => Some(Self::Lvm),
            "btrfs" => Some(Self::Btrfs),
            _ => None,
        }
    }
}

impl fmt::Display for PartitionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whole-disk customization
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DiskCustomization {
    /// Minimum size of the disk image in bytes (0 = no floor)
    #[serde(rename = "minsize", skip_serializing_if = "is_zero")]
    pub min_size: u64,

    /// Encrypt the customized partitions with LUKS
    #[serde(skip_serializing_if = "Option::is_none")]
    pub encryption: Option<EncryptionCustomization>,

    pub partitions: Vec<PartitionCustomization>,
}

impl DiskCustomization {
    /// Decode a JSON document holding a disk customization
    pub fn from_json_str(input: &str) -> Result<Self, DecodeError> {
        let value: Value =
            serde_json::from_str(input).map_err(|e| DecodeError::Syntax(e.to_string()))?;
        decode_disk(&value)
    }

    /// Decode a TOML document holding a disk customization
    pub fn from_toml_str(input: &str) -> Result<Self, DecodeError> {
        let table: toml::Table =
            toml::from_str(input).map_err(|e| DecodeError::Syntax(e.to_string()))?;
        let value =
            serde_json::to_value(&table).map_err(|e| DecodeError::Syntax(e.to_string()))?;
        decode_disk(&value)
    }

    /// Every mountpoint declared anywhere in the customization, in order
    pub fn mountpoints(&self) -> Vec<&str> {
        self.partitions
            .iter()
            .flat_map(PartitionCustomization::mountpoints)
            .collect()
    }
}

impl<'de> Deserialize<'de> for DiskCustomization {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        decode_disk(&value).map_err(serde::de::Error::custom)
    }
}

/// Disk-level LUKS request
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EncryptionCustomization {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cipher: Option<String>,
}

/// One partition of the disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionCustomization {
    /// Minimum size of the partition in bytes (0 = derived from its content)
    pub min_size: u64,
    pub payload: PartitionPayload,
}

/// Variant body of a partition, selected by its `type`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PartitionPayload {
    Plain(FilesystemTypedCustomization),
    Lvm(VGCustomization),
    Btrfs(BtrfsVolumeCustomization),
}

impl PartitionCustomization {
    pub fn partition_type(&self) -> PartitionType {
        match self.payload {
            PartitionPayload::Plain(_) => PartitionType::Plain,
            PartitionPayload::Lvm(_) => PartitionType::Lvm,
            PartitionPayload::Btrfs(_) => PartitionType::Btrfs,
        }
    }

    pub fn mountpoints(&self) -> Vec<&str> {
        match &self.payload {
            PartitionPayload::Plain(fs) => fs.mountpoint.as_deref().into_iter().collect(),
            PartitionPayload::Lvm(vg) => vg
                .logical_volumes
                .iter()
                .filter_map(|lv| lv.fs.mountpoint.as_deref())
                .collect(),
            PartitionPayload::Btrfs(volume) => volume
                .subvolumes
                .iter()
                .map(|subvol| subvol.mountpoint.as_str())
                .collect(),
        }
    }
}

impl<'de> Deserialize<'de> for PartitionCustomization {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        decode_partition(&value).map_err(serde::de::Error::custom)
    }
}

impl Serialize for PartitionCustomization {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut map = serializer.serialize_map(None)?;
        map.serialize_entry("type", self.partition_type().as_str())?;
        if self.min_size > 0 {
            map.serialize_entry("minsize", &self.min_size)?;
        }
        match &self.payload {
            PartitionPayload::Plain(fs) => fs.serialize_fields(&mut map)?,
            PartitionPayload::Lvm(vg) => {
                if let Some(name) = &vg.name {
                    map.serialize_entry("name", name)?;
                }
                map.serialize_entry("logical_volumes", &vg.logical_volumes)?;
            }
            PartitionPayload::Btrfs(volume) => {
                map.serialize_entry("subvolumes", &volume.subvolumes)?;
            }
        }
        map.end()
    }
}

/// A filesystem on a plain partition or logical volume. The size comes from
/// the container.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FilesystemTypedCustomization {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mountpoint: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fs_type: Option<FilesystemType>,
}

impl FilesystemTypedCustomization {
    fn serialize_fields<M: SerializeMap>(&self, map: &mut M) -> Result<(), M::Error> {
        if let Some(mountpoint) = &self.mountpoint {
            map.serialize_entry("mountpoint", mountpoint)?;
        }
        if let Some(label) = &self.label {
            map.serialize_entry("label", label)?;
        }
        if let Some(fs_type) = &self.fs_type {
            map.serialize_entry("fs_type", fs_type)?;
        }
        Ok(())
    }
}

/// An LVM volume group with its logical volumes
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VGCustomization {
    /// Volume group name; generated when absent
    pub name: Option<String>,
    pub logical_volumes: Vec<LVCustomization>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LVCustomization {
    /// Logical volume name; derived from the mountpoint when absent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(rename = "minsize", skip_serializing_if = "is_zero")]
    pub min_size: u64,

    #[serde(flatten)]
    pub fs: FilesystemTypedCustomization,
}

impl<'de> Deserialize<'de> for LVCustomization {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        decode_logical_volume(&value).map_err(serde::de::Error::custom)
    }
}

/// A btrfs volume with its subvolumes
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BtrfsVolumeCustomization {
    pub subvolumes: Vec<BtrfsSubvolumeCustomization>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BtrfsSubvolumeCustomization {
    /// Path of the subvolume on the top-level volume
    pub name: String,
    pub mountpoint: String,
}

/// A requested mountpoint with a minimum size, as listed in the image
/// request's filesystem customizations.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FilesystemCustomization {
    pub mountpoint: String,

    #[serde(
        rename = "minsize",
        default,
        deserialize_with = "deserialize_opt_size",
        skip_serializing_if = "is_zero"
    )]
    pub min_size: u64,
}

impl FilesystemCustomization {
    pub fn new(mountpoint: impl Into<String>, min_size: u64) -> Self {
        Self {
            mountpoint: mountpoint.into(),
            min_size,
        }
    }
}

fn is_zero(value: &u64) -> bool {
    *value == 0
}
