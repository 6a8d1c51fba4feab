use std::collections::HashSet;

use thiserror::Error;

use super::{DiskCustomization, FilesystemTypedCustomization, PartitionPayload};
use crate::filesystem::FilesystemType;

/// Structural problems in an otherwise well-formed customization
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("mountpoint \"{0}\" must be an absolute, canonical path")]
    InvalidMountpoint(String),

    #[error("mountpoint \"{0}\" is declared more than once")]
    DuplicateMountpoint(String),

    #[error("partition {index} has no mountpoint")]
    MissingMountpoint { index: usize },

    #[error("swap on partition {index} cannot have a mountpoint")]
    SwapWithMountpoint { index: usize },

    #[error("volume group on partition {index} has no logical volumes")]
    EmptyVolumeGroup { index: usize },

    #[error("btrfs volume on partition {index} has no subvolumes")]
    EmptyBtrfsVolume { index: usize },

    #[error("subvolume on partition {index} has no name")]
    MissingSubvolumeName { index: usize },

    #[error("name \"{0}\" is used more than once")]
    DuplicateName(String),

    #[error("fs_type btrfs on partition {index} requires type \"btrfs\"")]
    BtrfsFsTypeOnPlain { index: usize },
}

/// Check that a mountpoint is absolute and already in canonical form.
pub fn is_canonical_mountpoint(mountpoint: &str) -> bool {
    if mountpoint == "/" {
        return true;
    }
    mountpoint.starts_with('/')
        && !mountpoint.ends_with('/')
        && mountpoint[1..]
            .split('/')
            .all(|component| !component.is_empty() && component != "." && component != "..")
}

struct Seen<'a> {
    mountpoints: HashSet<&'a str>,
    names: HashSet<&'a str>,
}

impl<'a> Seen<'a> {
    fn mountpoint(&mut self, mountpoint: &'a str) -> Result<(), ValidationError> {
        if !is_canonical_mountpoint(mountpoint) {
            return Err(ValidationError::InvalidMountpoint(mountpoint.to_string()));
        }
        if !self.mountpoints.insert(mountpoint) {
            return Err(ValidationError::DuplicateMountpoint(mountpoint.to_string()));
        }
        Ok(())
    }

    fn name(&mut self, name: Option<&'a str>) -> Result<(), ValidationError> {
        match name {
            Some(name) if !self.names.insert(name) => {
                Err(ValidationError::DuplicateName(name.to_string()))
            }
            _ => Ok(()),
        }
    }

    fn filesystem(
        &mut self,
        fs: &'a FilesystemTypedCustomization,
        index: usize,
    ) -> Result<(), ValidationError> {
        match (fs.fs_type, fs.mountpoint.as_deref()) {
            (Some(FilesystemType::Btrfs), _) => Err(ValidationError::BtrfsFsTypeOnPlain { index }),
            (Some(FilesystemType::Swap), Some(_)) => {
                Err(ValidationError::SwapWithMountpoint { index })
            }
            (Some(FilesystemType::Swap), None) => Ok(()),
            (_, None) => Err(ValidationError::MissingMountpoint { index }),
            (_, Some(mountpoint)) => self.mountpoint(mountpoint),
        }
    }
}

impl DiskCustomization {
    /// Check structural rules the decoder cannot express: canonical and
    /// unique mountpoints, non-empty containers, unique VG/LV names.
    pub fn validate(&self) -> Result<(), ValidationError> {
        let mut seen = Seen {
            mountpoints: HashSet::new(),
            names: HashSet::new(),
        };

        for (index, partition) in self.partitions.iter().enumerate() {
            match &partition.payload {
                PartitionPayload::Plain(fs) => seen.filesystem(fs, index)?,
                PartitionPayload::Lvm(vg) => {
                    if vg.logical_volumes.is_empty() {
                        return Err(ValidationError::EmptyVolumeGroup { index });
                    }
                    seen.name(vg.name.as_deref())?;
                    let mut lv_names = HashSet::new();
                    for lv in &vg.logical_volumes {
                        if let Some(name) = lv.name.as_deref()
                            && !lv_names.insert(name)
                        {
                            return Err(ValidationError::DuplicateName(name.to_string()));
                        }
                        seen.filesystem(&lv.fs, index)?;
                    }
                }
                PartitionPayload::Btrfs(volume) => {
                    if volume.subvolumes.is_empty() {
                        return Err(ValidationError::EmptyBtrfsVolume { index });
                    }
                    for subvol in &volume.subvolumes {
                        if subvol.name.is_empty() {
                            return Err(ValidationError::MissingSubvolumeName { index });
                        }
                        seen.mountpoint(&subvol.mountpoint)?;
                    }
                }
            }
        }

        Ok(())
    }
}
