// SPDX-License-Identifier: GPL-3.0-only

//! Support code for the `disk-layout` binary: build config loading,
//! logging setup and table rendering.

pub mod config;
pub mod errors;
pub mod logging;
pub mod output;

use layout_engine::{EqualShare, GrowthPolicy, RootGrows};

/// Growth policy selectable on the command line
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum Policy {
    /// Share spare capacity equally among growable partitions
    #[default]
    Equal,
    /// Give all spare capacity to the root filesystem
    Root,
}

impl Policy {
    pub fn growth_policy(&self) -> &'static dyn GrowthPolicy {
        match self {
            Self::Equal => &EqualShare,
            Self::Root => &RootGrows,
        }
    }
}
