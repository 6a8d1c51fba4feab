//! Partitioning mode resolution
//!
//! Single source of truth for whether an image gets an LVM volume group. The
//! requested mode always wins; the table default is only consulted when the
//! request is `Default`, and `AutoLvm` is the fallback when neither decides.

use layout_types::{FilesystemCustomization, PartitioningMode};

/// Substitute `Default` away: request → table default → `AutoLvm`.
pub fn effective_mode(
    default_mode: Option<PartitioningMode>,
    requested_mode: PartitioningMode,
) -> PartitioningMode {
    let mode = match requested_mode {
        PartitioningMode::Default => default_mode.unwrap_or(PartitioningMode::Default),
        explicit => explicit,
    };

    match mode {
        PartitioningMode::Default => PartitioningMode::AutoLvm,
        resolved => resolved,
    }
}

/// Whether any requested mountpoint other than `/` asks for a size
pub fn has_sized_secondary_mountpoint(mountpoints: &[FilesystemCustomization]) -> bool {
    mountpoints
        .iter()
        .any(|fs| fs.mountpoint != "/" && fs.min_size > 0)
}

/// Decide whether content must be wrapped in an LVM volume group.
pub fn resolve(
    default_mode: Option<PartitioningMode>,
    requested_mode: PartitioningMode,
    mountpoints: &[FilesystemCustomization],
) -> bool {
    match effective_mode(default_mode, requested_mode) {
        PartitioningMode::Raw => false,
        PartitioningMode::Lvm => true,
        PartitioningMode::AutoLvm => has_sized_secondary_mountpoint(mountpoints),
        // effective_mode never returns Default
        PartitioningMode::Default => has_sized_secondary_mountpoint(mountpoints),
    }
}
