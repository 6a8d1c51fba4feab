//! Free-space distribution
//!
//! Once every partition and logical volume has its minimum size, the capacity
//! left over is handed out by a [`GrowthPolicy`]. The builder only relies on
//! the policy never granting more than it was offered; the builder then
//! rounds each grant down to the alignment of the entry.

/// An entry that may receive spare capacity
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GrowthEntry {
    /// Human-readable identifier (mountpoints or volume name), for logging
    pub name: String,
    /// Whether the entry holds the root filesystem
    pub holds_root: bool,
    /// Minimum size already assigned to the entry
    pub min_size: u64,
}

pub trait GrowthPolicy {
    /// Short name used in logs
    fn name(&self) -> &'static str;

    /// Split `spare` bytes among `entries`. Returns one grant per entry; the
    /// grants must not sum to more than `spare`.
    fn distribute(&self, spare: u64, entries: &[GrowthEntry]) -> Vec<u64>;
}

/// Every growable entry gets the same share; the last one also takes the
/// remainder of the division.
#[derive(Debug, Clone, Copy, Default)]
pub struct EqualShare;

impl GrowthPolicy for EqualShare {
    fn name(&self) -> &'static str {
        "equal"
    }

    fn distribute(&self, spare: u64, entries: &[GrowthEntry]) -> Vec<u64> {
        let count = entries.len() as u64;
        if count == 0 {
            return Vec::new();
        }

        let share = spare / count;
        let mut grants = vec![share; entries.len()];
        if let Some(last) = grants.last_mut() {
            *last += spare - share * count;
        }
        grants
    }
}

/// All spare capacity goes to the entry holding `/`, or to the last entry
/// when no entry does.
#[derive(Debug, Clone, Copy, Default)]
pub struct RootGrows;

impl GrowthPolicy for RootGrows {
    fn name(&self) -> &'static str {
        "root"
    }

    fn distribute(&self, spare: u64, entries: &[GrowthEntry]) -> Vec<u64> {
        let mut grants = vec![0; entries.len()];
        let target = entries
            .iter()
            .position(|entry| entry.holds_root)
            .or_else(|| entries.len().checked_sub(1));
        if let Some(index) = target {
            grants[index] = spare;
        }
        grants
    }
}
