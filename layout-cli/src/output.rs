//! Human readable rendering of built tables

use std::fmt;

use layout_types::{
    Filesystem, LuksPayload, LvmVolumeGroup, PartitionTable, PartitionTableFeatures, Payload,
    bytes_to_pretty,
};

fn filesystem_line(fs: &Filesystem) -> String {
    match &fs.mountpoint {
        Some(mountpoint) => format!("{} {}", fs.fs_type, mountpoint),
        None => fs.fs_type.to_string(),
    }
}

fn volume_group_lines(
    f: &mut fmt::Formatter<'_>,
    vg: &LvmVolumeGroup,
    indent: &str,
) -> fmt::Result {
    writeln!(f, "{indent}lvm volume group {}", vg.name)?;
    for lv in &vg.logical_volumes {
        writeln!(
            f,
            "{indent}  {:<24} {:>12}  {}",
            lv.display_name(&vg.name),
            bytes_to_pretty(&lv.size, false),
            filesystem_line(&lv.payload)
        )?;
    }
    Ok(())
}

/// Multi-line listing of a partition table and everything nested in it
pub struct TableView<'a>(pub &'a PartitionTable);

impl fmt::Display for TableView<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let table = self.0;
        writeln!(
            f,
            "{} table, {} ({})",
            table.table_type.as_str(),
            bytes_to_pretty(&table.size, true),
            table
                .uuid
                .map(|uuid| uuid.to_string())
                .unwrap_or_default()
        )?;

        for (index, partition) in table.partitions.iter().enumerate() {
            writeln!(
                f,
                "{:>3}  {:>12}  {:>12}  {}",
                index + 1,
                bytes_to_pretty(&partition.start, false),
                bytes_to_pretty(&partition.size, false),
                partition.part_type
            )?;

            match &partition.payload {
                None => {}
                Some(Payload::Filesystem(fs)) => writeln!(f, "     {}", filesystem_line(fs))?,
                Some(Payload::LvmVolumeGroup(vg)) => volume_group_lines(f, vg, "     ")?,
                Some(Payload::Luks(luks)) => {
                    writeln!(f, "     luks {}", luks.label.as_deref().unwrap_or_default())?;
                    match &luks.payload {
                        LuksPayload::Filesystem(fs) => {
                            writeln!(f, "       {}", filesystem_line(fs))?
                        }
                        LuksPayload::LvmVolumeGroup(vg) => volume_group_lines(f, vg, "       ")?,
                    }
                }
                Some(Payload::Btrfs(volume)) => {
                    writeln!(f, "     btrfs {}", volume.label.as_deref().unwrap_or_default())?;
                    for subvol in &volume.subvolumes {
                        writeln!(
                            f,
                            "       {} {}",
                            subvol.name,
                            subvol.mountpoint.as_deref().unwrap_or_default()
                        )?;
                    }
                }
            }
        }
        Ok(())
    }
}

pub fn render_features(features: &PartitionTableFeatures) -> String {
    let names = features.names();
    if names.is_empty() {
        "none".to_string()
    } else {
        names.join(" ")
    }
}
