//! Partition table model
//!
//! A [`PartitionTable`] is both the input template supplied by an image type
//! (fixed partitions such as the ESP and /boot plus a partitioning policy) and
//! the output of the builder. Payload nesting is restricted by the types:
//! LUKS may only wrap a filesystem or a volume group, and logical volumes may
//! only hold filesystems.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::btrfs::BtrfsVolume;
use crate::common::{ByteRange, GPT_ALIGNMENT_BYTES, GPT_FOOTER_BYTES, MIB};
use crate::filesystem::{Filesystem, FilesystemType};
use crate::lvm::LvmVolumeGroup;
use crate::mode::PartitioningMode;
use crate::size::deserialize_opt_size;

/// Space taken by a LUKS2 header in front of the encrypted payload
pub const LUKS2_HEADER_SIZE: u64 = 16 * MIB;

/// GPT partition type GUIDs and DOS partition ids
pub mod part_types {
    pub const ESP_GUID: &str = "C12A7328-F81F-11D2-BA4B-00A0C93EC93B";
    pub const BIOS_BOOT_GUID: &str = "21686148-6449-6E6F-744E-656564454649";
    pub const XBOOTLDR_GUID: &str = "BC13C2FF-59E6-4262-A352-B275FD6F7172";
    pub const FILESYSTEM_GUID: &str = "0FC63DAF-8483-4772-8E79-3D69D8477DE4";
    pub const LVM_GUID: &str = "E6D6D379-F507-44C2-A23C-238F2A3DF928";
    pub const SWAP_GUID: &str = "0657FD6D-A4AB-43C4-84E5-0933C84B4F4F";

    pub const DOS_ESP_ID: &str = "ef";
    pub const DOS_LINUX_ID: &str = "83";
    pub const DOS_LVM_ID: &str = "8e";
    pub const DOS_SWAP_ID: &str = "82";
}

/// Partition table type
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PartitionTableType {
    /// GPT (GUID Partition Table)
    #[default]
    Gpt,

    /// MBR/DOS (Master Boot Record)
    Dos,
}

impl PartitionTableType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Gpt => "gpt",
            Self::Dos => "dos",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "gpt" => Some(Self::Gpt),
            "dos" | "mbr" => Some(Self::Dos),
            _ => None,
        }
    }

    /// Bytes at the end of the disk that partitions may not use
    pub fn footer_size(&self) -> u64 {
        match self {
            Self::Gpt => GPT_FOOTER_BYTES,
            Self::Dos => 0,
        }
    }

    /// Partition type identifier for a new partition holding `payload`
    pub fn type_id_for(&self, payload: &Payload) -> &'static str {
        let is_lvm = matches!(payload.innermost(), Inner::VolumeGroup(_));
        let fs_type = match payload.innermost() {
            Inner::Filesystem(fs) => Some(fs.fs_type),
            _ => None,
        };
        let is_esp = matches!(payload, Payload::Filesystem(fs) if fs.mountpoint.as_deref() == Some("/boot/efi"));

        match self {
            Self::Gpt if is_esp => part_types::ESP_GUID,
            Self::Gpt if is_lvm => part_types::LVM_GUID,
            Self::Gpt if fs_type == Some(FilesystemType::Swap) => part_types::SWAP_GUID,
            Self::Gpt => part_types::FILESYSTEM_GUID,
            Self::Dos if is_esp => part_types::DOS_ESP_ID,
            Self::Dos if is_lvm => part_types::DOS_LVM_ID,
            Self::Dos if fs_type == Some(FilesystemType::Swap) => part_types::DOS_SWAP_ID,
            Self::Dos => part_types::DOS_LINUX_ID,
        }
    }
}

fn default_start_offset() -> u64 {
    GPT_ALIGNMENT_BYTES
}

/// A complete partition table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionTable {
    /// Total size of the disk in bytes
    #[serde(default, deserialize_with = "deserialize_opt_size")]
    pub size: u64,

    /// Disk identifier (GPT disk GUID)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uuid: Option<Uuid>,

    #[serde(rename = "type", default)]
    pub table_type: PartitionTableType,

    /// Offset of the first usable byte
    #[serde(default = "default_start_offset")]
    pub start_offset: u64,

    /// Policy hint used when the requested partitioning mode is `Default`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_partitioning_mode: Option<PartitioningMode>,

    /// Filesystem type for new mountpoints that do not name one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_fs_type: Option<FilesystemType>,

    #[serde(default)]
    pub partitions: Vec<Partition>,
}

impl PartitionTable {
    /// Every mountpoint in the table, in traversal order
    pub fn mountpoints(&self) -> Vec<String> {
        let mut out = Vec::new();
        for partition in &self.partitions {
            if let Some(payload) = &partition.payload {
                payload.collect_mountpoints(&mut out);
            }
        }
        out
    }

    /// Index of the partition holding `mountpoint`, at any nesting depth
    pub fn partition_index_for(&self, mountpoint: &str) -> Option<usize> {
        self.partitions
            .iter()
            .position(|p| p.contains_mountpoint(mountpoint))
    }

    /// Partition holding `mountpoint`, at any nesting depth
    pub fn find_mountpoint(&self, mountpoint: &str) -> Option<&Partition> {
        self.partition_index_for(mountpoint)
            .map(|index| &self.partitions[index])
    }

    pub fn contains_mountpoint(&self, mountpoint: &str) -> bool {
        self.partition_index_for(mountpoint).is_some()
    }

    /// Index of the first partition whose payload is (or wraps) a volume group
    pub fn volume_group_index(&self) -> Option<usize> {
        self.partitions.iter().position(|p| {
            p.payload
                .as_ref()
                .is_some_and(|payload| payload.volume_group().is_some())
        })
    }

    /// Index of the first partition holding a btrfs volume
    pub fn btrfs_index(&self) -> Option<usize> {
        self.partitions
            .iter()
            .position(|p| matches!(p.payload, Some(Payload::Btrfs(_))))
    }

    /// Last byte (exclusive) partitions may occupy
    pub fn usable_end(&self) -> u64 {
        self.size.saturating_sub(self.table_type.footer_size())
    }

    /// Sum of all partition sizes
    pub fn allocated(&self) -> u64 {
        self.partitions
            .iter()
            .fold(0u64, |acc, p| acc.saturating_add(p.size))
    }

    /// Byte ranges of all partitions, in table order
    pub fn ranges(&self) -> Vec<ByteRange> {
        self.partitions.iter().map(Partition::range).collect()
    }
}

/// A single partition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Partition {
    /// Offset from start of disk in bytes
    #[serde(default)]
    pub start: u64,

    /// Size in bytes
    #[serde(default, deserialize_with = "deserialize_opt_size")]
    pub size: u64,

    /// Partition type identifier (GPT GUID or DOS id); filled by the builder when empty
    #[serde(rename = "type", default)]
    pub part_type: String,

    #[serde(default)]
    pub bootable: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uuid: Option<Uuid>,

    /// `None` for raw firmware partitions such as BIOS boot
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Payload>,
}

impl Partition {
    pub fn new(payload: Payload) -> Self {
        Self {
            start: 0,
            size: 0,
            part_type: String::new(),
            bootable: false,
            uuid: None,
            payload: Some(payload),
        }
    }

    pub fn range(&self) -> ByteRange {
        ByteRange {
            start: self.start,
            end: self.start.saturating_add(self.size),
        }
    }

    pub fn mountpoints(&self) -> Vec<String> {
        let mut out = Vec::new();
        if let Some(payload) = &self.payload {
            payload.collect_mountpoints(&mut out);
        }
        out
    }

    pub fn contains_mountpoint(&self, mountpoint: &str) -> bool {
        self.mountpoints().iter().any(|m| m == mountpoint)
    }

    /// Whether spare disk capacity may be given to this partition.
    ///
    /// Firmware partitions, swap and anything mounted under /boot keep their
    /// size.
    pub fn is_growable(&self) -> bool {
        let Some(payload) = &self.payload else {
            return false;
        };
        if let Inner::Filesystem(fs) = payload.innermost() {
            if fs.fs_type == FilesystemType::Swap {
                return false;
            }
            if let Some(mountpoint) = fs.mountpoint.as_deref() {
                return !(mountpoint == "/boot" || mountpoint.starts_with("/boot/"));
            }
        }
        true
    }
}

/// Partition payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Payload {
    Filesystem(Filesystem),
    Luks(LuksContainer),
    LvmVolumeGroup(LvmVolumeGroup),
    Btrfs(BtrfsVolume),
}

/// Payload found after unwrapping any LUKS container
#[derive(Debug, Clone, Copy)]
pub enum Inner<'a> {
    Filesystem(&'a Filesystem),
    VolumeGroup(&'a LvmVolumeGroup),
    Btrfs(&'a BtrfsVolume),
}

impl Payload {
    pub fn innermost(&self) -> Inner<'_> {
        match self {
            Payload::Filesystem(fs) => Inner::Filesystem(fs),
            Payload::LvmVolumeGroup(vg) => Inner::VolumeGroup(vg),
            Payload::Btrfs(volume) => Inner::Btrfs(volume),
            Payload::Luks(luks) => match &luks.payload {
                LuksPayload::Filesystem(fs) => Inner::Filesystem(fs),
                LuksPayload::LvmVolumeGroup(vg) => Inner::VolumeGroup(vg),
            },
        }
    }

    pub fn volume_group(&self) -> Option<&LvmVolumeGroup> {
        match self.innermost() {
            Inner::VolumeGroup(vg) => Some(vg),
            _ => None,
        }
    }

    pub fn volume_group_mut(&mut self) -> Option<&mut LvmVolumeGroup> {
        match self {
            Payload::LvmVolumeGroup(vg) => Some(vg),
            Payload::Luks(LuksContainer {
                payload: LuksPayload::LvmVolumeGroup(vg),
                ..
            }) => Some(vg),
            _ => None,
        }
    }

    pub fn collect_mountpoints(&self, out: &mut Vec<String>) {
        match self.innermost() {
            Inner::Filesystem(fs) => out.extend(fs.mountpoint.clone()),
            Inner::VolumeGroup(vg) => out.extend(
                vg.logical_volumes
                    .iter()
                    .filter_map(|lv| lv.payload.mountpoint.clone()),
            ),
            Inner::Btrfs(volume) => out.extend(
                volume
                    .subvolumes
                    .iter()
                    .filter_map(|subvol| subvol.mountpoint.clone()),
            ),
        }
    }
}

/// LUKS encrypted container
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LuksContainer {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uuid: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cipher: Option<String>,
    pub payload: LuksPayload,
}

impl LuksContainer {
    pub fn new(payload: LuksPayload) -> Self {
        Self {
            uuid: None,
            label: None,
            cipher: None,
            payload,
        }
    }
}

/// Payloads a LUKS container may wrap
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LuksPayload {
    Filesystem(Filesystem),
    LvmVolumeGroup(LvmVolumeGroup),
}
