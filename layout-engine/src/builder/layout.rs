//! Size and offset assignment
//!
//! Every partition first gets its aligned minimum: the larger of its own size
//! and what its content needs. What is left of the disk is handed out by the
//! growth policy, then the same happens inside each volume group for its
//! logical volumes.

use std::collections::HashMap;

use layout_types::{
    GPT_ALIGNMENT_BYTES, LUKS2_HEADER_SIZE, LVM_EXTENT_SIZE, LVM_METADATA_SIZE, LuksPayload,
    Partition, PartitionTable, Payload, align_down, align_up,
};
use tracing::trace;

use crate::error::{BuildError, Result};
use crate::policy::{GrowthEntry, GrowthPolicy};

/// Bytes the content of `partition` needs, excluding the partition's own size
pub(super) fn content_size(partition: &Partition, subvolume_mins: &HashMap<String, u64>) -> u64 {
    match &partition.payload {
        None | Some(Payload::Filesystem(_)) => 0,
        Some(Payload::LvmVolumeGroup(vg)) => vg.required_size(),
        Some(Payload::Luks(luks)) => {
            let inner = match &luks.payload {
                LuksPayload::Filesystem(_) => 0,
                LuksPayload::LvmVolumeGroup(vg) => vg.required_size(),
            };
            inner.saturating_add(LUKS2_HEADER_SIZE)
        }
        Some(Payload::Btrfs(volume)) => volume
            .subvolumes
            .iter()
            .filter_map(|subvol| subvol.mountpoint.as_ref())
            .filter_map(|mountpoint| subvolume_mins.get(mountpoint))
            .fold(0u64, |acc, size| acc.saturating_add(*size)),
    }
}

fn describe(partition: &Partition, index: usize) -> String {
    let mountpoints = partition.mountpoints();
    if mountpoints.is_empty() {
        format!("partition {index}")
    } else {
        mountpoints.join(",")
    }
}

/// Ask `policy` for grants and check it stayed within `spare`.
fn grants(policy: &dyn GrowthPolicy, spare: u64, entries: &[GrowthEntry]) -> Result<Vec<u64>> {
    let grants = policy.distribute(spare, entries);
    let granted = grants
        .iter()
        .fold(0u64, |acc, grant| acc.saturating_add(*grant));
    if granted > spare {
        return Err(BuildError::PolicyOverflow { granted, spare });
    }
    Ok(grants)
}

/// Assign final sizes and offsets to every partition of `table`.
pub(super) fn layout(
    mut table: PartitionTable,
    subvolume_mins: &HashMap<String, u64>,
    disk_size: u64,
    policy: &dyn GrowthPolicy,
) -> Result<PartitionTable> {
    for vg in table
        .partitions
        .iter_mut()
        .filter_map(|p| p.payload.as_mut()?.volume_group_mut())
    {
        for lv in &mut vg.logical_volumes {
            lv.size = align_up(lv.size, LVM_EXTENT_SIZE);
        }
    }

    let start = align_up(table.start_offset, GPT_ALIGNMENT_BYTES);
    let footer = table.table_type.footer_size();
    let minimums: Vec<u64> = table
        .partitions
        .iter()
        .map(|p| {
            align_up(
                p.size.max(content_size(p, subvolume_mins)),
                GPT_ALIGNMENT_BYTES,
            )
        })
        .collect();
    let required = minimums
        .iter()
        .fold(start, |acc, size| acc.saturating_add(*size));

    let usable_end = align_down(disk_size.saturating_sub(footer), GPT_ALIGNMENT_BYTES);
    if required > usable_end {
        return Err(BuildError::InsufficientSpace {
            required: required.saturating_add(footer),
            available: disk_size,
        });
    }

    let spare = usable_end - required;
    let growable: Vec<usize> = (0..table.partitions.len())
        .filter(|&index| table.partitions[index].is_growable())
        .collect();
    let entries: Vec<GrowthEntry> = growable
        .iter()
        .map(|&index| {
            let partition = &table.partitions[index];
            GrowthEntry {
                name: describe(partition, index),
                holds_root: partition.contains_mountpoint("/"),
                min_size: minimums[index],
            }
        })
        .collect();

    let mut sizes = minimums;
    for (entry, grant) in growable.iter().zip(grants(policy, spare, &entries)?) {
        sizes[*entry] += align_down(grant, GPT_ALIGNMENT_BYTES);
    }
    trace!(start, spare, usable_end, policy = policy.name(), "distributed spare capacity");

    let table_type = table.table_type;
    let mut offset = start;
    for (index, (partition, size)) in table.partitions.iter_mut().zip(sizes).enumerate() {
        partition.start = offset;
        partition.size = size;
        offset += size;

        if partition.part_type.is_empty()
            && let Some(payload) = &partition.payload
        {
            partition.part_type = table_type.type_id_for(payload).to_string();
        }
        grow_logical_volumes(partition, policy)?;

        trace!(index, start = partition.start, size, "placed partition");
    }

    table.start_offset = start;
    table.size = disk_size;
    Ok(table)
}

/// Share the free extents of a volume group among its non-swap volumes.
fn grow_logical_volumes(partition: &mut Partition, policy: &dyn GrowthPolicy) -> Result<()> {
    let size = partition.size;
    let Some(payload) = partition.payload.as_mut() else {
        return Ok(());
    };
    let header = match payload {
        Payload::Luks(_) => LUKS2_HEADER_SIZE,
        _ => 0,
    };
    let Some(vg) = payload.volume_group_mut() else {
        return Ok(());
    };

    let capacity = align_down(
        size.saturating_sub(header).saturating_sub(LVM_METADATA_SIZE),
        LVM_EXTENT_SIZE,
    );
    let spare = capacity.saturating_sub(vg.used());

    let growable: Vec<usize> = vg
        .logical_volumes
        .iter()
        .enumerate()
        .filter(|(_, lv)| lv.payload.fs_type.is_mountable())
        .map(|(index, _)| index)
        .collect();
    let entries: Vec<GrowthEntry> = growable
        .iter()
        .map(|&index| {
            let lv = &vg.logical_volumes[index];
            GrowthEntry {
                name: lv.display_name(&vg.name),
                holds_root: lv.payload.mountpoint.as_deref() == Some("/"),
                min_size: lv.size,
            }
        })
        .collect();

    for (index, grant) in growable.iter().zip(grants(policy, spare, &entries)?) {
        vg.logical_volumes[*index].size += align_down(grant, LVM_EXTENT_SIZE);
    }
    trace!(vg = %vg.name, capacity, spare, "distributed free extents");
    Ok(())
}
