//! Built-in base partition tables
//!
//! Image types supply the base table a layout is built on. These templates
//! cover the common shapes (plain, encrypted root, encrypted LVM, btrfs) and
//! are embedded from `resources/templates`.

mod catalog;

use crate::partition::PartitionTable;

pub use catalog::BUILTIN_TEMPLATES;

/// Look up a built-in template by name
pub fn builtin_template(name: &str) -> Option<PartitionTable> {
    BUILTIN_TEMPLATES
        .iter()
        .find(|(template_name, _)| *template_name == name)
        .map(|(_, table)| table.clone())
}

/// Names of all built-in templates, in catalog order
pub fn builtin_template_names() -> Vec<&'static str> {
    catalog::SOURCES.iter().map(|(name, _)| *name).collect()
}
