// SPDX-License-Identifier: GPL-3.0-only

use layout_types::ValidationError;
use thiserror::Error;

/// Error types for partition table construction
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BuildError {
    #[error("invalid disk customization: {0}")]
    InvalidCustomization(#[from] ValidationError),

    #[error("invalid mountpoint \"{0}\"")]
    InvalidMountpoint(String),

    #[error("mountpoint \"{0}\" is mapped more than once")]
    DuplicateMountpoint(String),

    #[error("volume group \"{0}\" already exists")]
    DuplicateVolumeGroup(String),

    #[error("image size of {available} bytes is too small, at least {required} bytes are needed")]
    InsufficientSpace { required: u64, available: u64 },

    #[error("raw partitioning mode set for a base partition table with LVM")]
    RawWithLvmTemplate,

    #[error("unsupported nesting: {0}")]
    UnsupportedNesting(String),

    #[error("growth policy handed out {granted} bytes but only {spare} were spare")]
    PolicyOverflow { granted: u64, spare: u64 },
}

/// Result type alias for build operations
pub type Result<T> = std::result::Result<T, BuildError>;
