// SPDX-License-Identifier: GPL-3.0-only

//! Partition table construction
//!
//! - [`mode`] decides whether requested content is wrapped in LVM
//! - [`policy`] hands out capacity beyond the minimum sizes
//! - [`builder`] materializes a [`layout_types::PartitionTable`] from a base
//!   template, requested mountpoints and disk customizations
//!
//! Everything here is a pure function of its inputs. The only randomness is
//! the RNG passed to [`build`], which makes tables reproducible from a seed.

pub mod builder;
pub mod error;
pub mod mode;
pub mod policy;

pub use builder::{
    DEFAULT_CONTENT_SIZE, REQUIRED_SIZES, ROOT_VG_NAME, build, build_with_policy, new_uuid,
};
pub use error::{BuildError, Result};
pub use mode::{effective_mode, has_sized_secondary_mountpoint, resolve};
pub use policy::{EqualShare, GrowthEntry, GrowthPolicy, RootGrows};
