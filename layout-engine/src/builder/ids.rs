//! Identifier assignment
//!
//! Identifiers are filled in a fixed order (table, then each partition
//! followed by its payload, depth first) so the same RNG state always yields
//! the same table. Identifiers already present are left alone.

use std::collections::HashSet;

use layout_types::{Filesystem, LuksPayload, LvmVolumeGroup, PartitionTable, Payload};
use rand::RngCore;
use uuid::{Builder, Uuid};

/// Draw a version 4 UUID from `rng`.
pub fn new_uuid<R: RngCore + ?Sized>(rng: &mut R) -> Uuid {
    let mut bytes = [0u8; 16];
    rng.fill_bytes(&mut bytes);
    Builder::from_random_bytes(bytes).into_uuid()
}

pub(super) fn assign<R: RngCore + ?Sized>(table: &mut PartitionTable, rng: &mut R) {
    let mut vg_names: HashSet<String> = table
        .partitions
        .iter()
        .filter_map(|p| p.payload.as_ref()?.volume_group())
        .filter(|vg| !vg.name.is_empty())
        .map(|vg| vg.name.clone())
        .collect();

    if table.uuid.is_none() {
        table.uuid = Some(new_uuid(rng));
    }

    for partition in &mut table.partitions {
        if partition.uuid.is_none() {
            partition.uuid = Some(new_uuid(rng));
        }
        match partition.payload.as_mut() {
            None => {}
            Some(Payload::Filesystem(fs)) => filesystem(fs, rng),
            Some(Payload::LvmVolumeGroup(vg)) => volume_group(vg, rng, &mut vg_names),
            Some(Payload::Btrfs(volume)) => {
                if volume.uuid.is_none() {
                    volume.uuid = Some(new_uuid(rng));
                }
            }
            Some(Payload::Luks(luks)) => {
                if luks.uuid.is_none() {
                    luks.uuid = Some(new_uuid(rng));
                }
                match &mut luks.payload {
                    LuksPayload::Filesystem(fs) => filesystem(fs, rng),
                    LuksPayload::LvmVolumeGroup(vg) => volume_group(vg, rng, &mut vg_names),
                }
            }
        }
    }
}

fn filesystem<R: RngCore + ?Sized>(fs: &mut Filesystem, rng: &mut R) {
    if fs.uuid.is_none() {
        fs.uuid = Some(new_uuid(rng));
    }
}

fn volume_group<R: RngCore + ?Sized>(
    vg: &mut LvmVolumeGroup,
    rng: &mut R,
    taken: &mut HashSet<String>,
) {
    if vg.name.is_empty() {
        vg.name = loop {
            let candidate = format!("vg{:08x}", rng.next_u32());
            if taken.insert(candidate.clone()) {
                break candidate;
            }
        };
    }
    for lv in &mut vg.logical_volumes {
        filesystem(&mut lv.payload, rng);
    }
}
