// SPDX-License-Identifier: GPL-3.0-only

//! Domain models for disk image layouts
//!
//! This crate defines the types shared by every part of the layout stack:
//!
//! - **Customizations** (`DiskCustomization`) → what the user asked for,
//!   decoded strictly from JSON or TOML documents
//! - **Partition tables** (`PartitionTable`) → the base template supplied by
//!   an image type, and the concrete table produced by `layout-engine`
//! - **Features** (`PartitionTableFeatures`) → which filesystems and
//!   block-layer wrappers a table contains
//!
//! All sizes are normalized to bytes by a single parser (`parse_size`) no
//! matter which document format they came from.

pub mod btrfs;
pub mod common;
pub mod customization;
pub mod features;
pub mod filesystem;
pub mod lvm;
pub mod mode;
pub mod partition;
pub mod size;
pub mod templates;

pub use btrfs::{BtrfsSubvolume, BtrfsVolume, subvolume_name_for_mountpoint};
pub use common::{
    ByteRange, GIB, GPT_ALIGNMENT_BYTES, GPT_FOOTER_BYTES, KIB, MIB, TIB, align_down, align_up,
    bytes_to_pretty,
};
pub use customization::{
    BtrfsSubvolumeCustomization, BtrfsVolumeCustomization, DecodeError, DiskCustomization,
    EncryptionCustomization, FilesystemCustomization, FilesystemTypedCustomization,
    LVCustomization, PartitionCustomization, PartitionPayload, PartitionType, VGCustomization,
    ValidationError, is_canonical_mountpoint,
};
pub use features::PartitionTableFeatures;
pub use filesystem::{Filesystem, FilesystemType, default_fs_type_for};
pub use lvm::{
    LVM_EXTENT_SIZE, LVM_METADATA_SIZE, LogicalVolume, LvmVolumeGroup, lv_name_for_mountpoint,
};
pub use mode::PartitioningMode;
pub use partition::{
    Inner, LUKS2_HEADER_SIZE, LuksContainer, LuksPayload, Partition, PartitionTable,
    PartitionTableType, Payload, part_types,
};
pub use size::{InvalidSize, parse_size, parse_size_str};
pub use templates::{builtin_template, builtin_template_names};
