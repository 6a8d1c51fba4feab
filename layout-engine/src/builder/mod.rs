// SPDX-License-Identifier: GPL-3.0-only

//! Partition table builder
//!
//! Turns a base template, a list of requested mountpoints and an optional
//! disk customization into a concrete [`PartitionTable`]:
//!
//! 1. Customizations are appended as new partitions, in declaration order,
//!    replacing template content that held their mountpoints
//! 2. Requested mountpoints grow existing content or get placed (new LV,
//!    subvolume or plain partition)
//! 3. Sizes and offsets are assigned ([`layout`])
//! 4. Missing identifiers are drawn from the caller's RNG ([`ids`])
//!
//! The template is never modified; the builder works on a copy.

mod ids;
mod layout;

use std::collections::{HashMap, HashSet};

use layout_types::{
    BtrfsSubvolume, BtrfsVolume, DiskCustomization, EncryptionCustomization, Filesystem,
    FilesystemCustomization, FilesystemType, FilesystemTypedCustomization, GIB, LUKS2_HEADER_SIZE,
    LVM_EXTENT_SIZE, LogicalVolume, LuksContainer, LuksPayload, LvmVolumeGroup, Partition,
    PartitionCustomization, PartitionPayload, PartitionTable, PartitioningMode, Payload,
    align_up, default_fs_type_for, is_canonical_mountpoint, subvolume_name_for_mountpoint,
};
use rand::RngCore;
use tracing::debug;

use crate::error::{BuildError, Result};
use crate::mode::{effective_mode, resolve};
use crate::policy::{EqualShare, GrowthPolicy};

pub use ids::new_uuid;

/// Size given to builder-created content that did not ask for one
pub const DEFAULT_CONTENT_SIZE: u64 = GIB;

/// Minimum sizes for well-known mountpoints, applied after placement
pub const REQUIRED_SIZES: &[(&str, u64)] = &[("/", GIB), ("/usr", 2 * GIB)];

/// Volume group the root filesystem is moved into in LVM mode
pub const ROOT_VG_NAME: &str = "rootvg";

/// Build a partition table, distributing spare capacity with [`EqualShare`].
pub fn build<R: RngCore + ?Sized>(
    base: &PartitionTable,
    mountpoints: &[FilesystemCustomization],
    image_size: u64,
    requested_mode: PartitioningMode,
    customizations: Option<&DiskCustomization>,
    rng: &mut R,
) -> Result<PartitionTable> {
    build_with_policy(
        base,
        mountpoints,
        image_size,
        requested_mode,
        customizations,
        rng,
        &EqualShare,
    )
}

/// Build a partition table with an explicit growth policy.
pub fn build_with_policy<R: RngCore + ?Sized>(
    base: &PartitionTable,
    mountpoints: &[FilesystemCustomization],
    image_size: u64,
    requested_mode: PartitioningMode,
    customizations: Option<&DiskCustomization>,
    rng: &mut R,
    policy: &dyn GrowthPolicy,
) -> Result<PartitionTable> {
    if let Some(disk) = customizations {
        disk.validate()?;
    }
    check_mountpoints(mountpoints)?;

    let mode = effective_mode(base.default_partitioning_mode, requested_mode);
    let wrap_in_lvm = resolve(base.default_partitioning_mode, requested_mode, mountpoints);
    debug!(
        requested = %requested_mode,
        effective = %mode,
        wrap_in_lvm,
        "resolved partitioning mode"
    );

    if mode == PartitioningMode::Raw && base.volume_group_index().is_some() {
        return Err(BuildError::RawWithLvmTemplate);
    }

    let encryption = customizations.and_then(|disk| disk.encryption.clone());
    let mut draft = Draft::new(base, encryption);

    if let Some(disk) = customizations {
        for partition in &disk.partitions {
            draft.add_customization(partition)?;
        }
    }

    if wrap_in_lvm {
        draft.ensure_volume_group();
    }

    for fs in mountpoints {
        if draft.table.contains_mountpoint(&fs.mountpoint) {
            draft.grow(&fs.mountpoint, fs.min_size);
        } else {
            draft.place(&fs.mountpoint, fs.min_size, wrap_in_lvm);
        }
    }

    for (mountpoint, size) in REQUIRED_SIZES {
        draft.grow(mountpoint, *size);
    }

    let disk_floor = customizations.map_or(0, |disk| disk.min_size);
    let mut table = layout::layout(
        draft.table,
        &draft.subvolume_mins,
        image_size.max(disk_floor),
        policy,
    )?;
    ids::assign(&mut table, rng);

    debug!(
        partitions = table.partitions.len(),
        size = table.size,
        policy = policy.name(),
        "built partition table"
    );
    Ok(table)
}

fn check_mountpoints(mountpoints: &[FilesystemCustomization]) -> Result<()> {
    let mut seen = HashSet::new();
    for fs in mountpoints {
        if !is_canonical_mountpoint(&fs.mountpoint) {
            return Err(BuildError::InvalidMountpoint(fs.mountpoint.clone()));
        }
        if !seen.insert(fs.mountpoint.as_str()) {
            return Err(BuildError::DuplicateMountpoint(fs.mountpoint.clone()));
        }
    }
    Ok(())
}

/// Builder-created content without an explicit size gets the default.
fn content_floor(min_size: u64) -> u64 {
    if min_size == 0 {
        DEFAULT_CONTENT_SIZE
    } else {
        min_size
    }
}

/// Working copy of the table while content is being placed
struct Draft {
    table: PartitionTable,
    /// Number of partitions that came from the template
    fixed: usize,
    /// Requested minimum size per btrfs subvolume mountpoint
    subvolume_mins: HashMap<String, u64>,
    /// Partition holding the volume group new logical volumes go to
    target_vg: Option<usize>,
    default_fs: FilesystemType,
    encryption: Option<EncryptionCustomization>,
}

impl Draft {
    fn new(base: &PartitionTable, encryption: Option<EncryptionCustomization>) -> Self {
        let table = base.clone();
        Self {
            fixed: table.partitions.len(),
            target_vg: table.volume_group_index(),
            default_fs: table.default_fs_type.unwrap_or(FilesystemType::Xfs),
            subvolume_mins: HashMap::new(),
            encryption,
            table,
        }
    }

    /// Put `payload` inside a LUKS container when encryption was requested.
    fn wrap(&self, payload: LuksPayload) -> Payload {
        match (&self.encryption, payload) {
            (Some(encryption), payload) => Payload::Luks(LuksContainer {
                uuid: None,
                label: encryption.label.clone(),
                cipher: encryption.cipher.clone(),
                payload,
            }),
            (None, LuksPayload::Filesystem(fs)) => Payload::Filesystem(fs),
            (None, LuksPayload::LvmVolumeGroup(vg)) => Payload::LvmVolumeGroup(vg),
        }
    }

    fn push(&mut self, payload: Payload, min_size: u64) -> usize {
        let mut partition = Partition::new(payload);
        partition.size = min_size;
        self.table.partitions.push(partition);
        self.table.partitions.len() - 1
    }

    fn filesystem(&self, mountpoint: &str) -> Filesystem {
        Filesystem::new(
            default_fs_type_for(mountpoint, self.default_fs),
            Some(mountpoint.to_string()),
        )
    }

    fn customized_filesystem(&self, fs: &FilesystemTypedCustomization) -> Filesystem {
        let fs_type = fs.fs_type.unwrap_or_else(|| {
            default_fs_type_for(fs.mountpoint.as_deref().unwrap_or_default(), self.default_fs)
        });
        Filesystem::new(fs_type, fs.mountpoint.clone()).with_label(fs.label.clone())
    }

    fn unique_vg_name(&self, base: &str) -> String {
        let taken: HashSet<&str> = self
            .table
            .partitions
            .iter()
            .filter_map(|p| p.payload.as_ref()?.volume_group())
            .map(|vg| vg.name.as_str())
            .collect();

        if !taken.contains(base) {
            return base.to_string();
        }
        (1..)
            .map(|n| format!("{base}{n:02}"))
            .find(|candidate| !taken.contains(candidate.as_str()))
            .unwrap_or_else(|| base.to_string())
    }

    /// Drop the template content providing `mountpoint` so a customization
    /// can take it over. Containers left empty are removed with it.
    fn release_mountpoint(&mut self, mountpoint: &str) -> Result<()> {
        let Some(index) = self.table.partition_index_for(mountpoint) else {
            return Ok(());
        };
        if index >= self.fixed || mountpoint == "/boot" || mountpoint.starts_with("/boot/") {
            return Err(BuildError::DuplicateMountpoint(mountpoint.to_string()));
        }

        let provides = |fs: &Filesystem| fs.mountpoint.as_deref() == Some(mountpoint);
        let emptied = match self.table.partitions[index].payload.as_mut() {
            Some(Payload::Btrfs(volume)) => {
                volume
                    .subvolumes
                    .retain(|subvol| subvol.mountpoint.as_deref() != Some(mountpoint));
                volume.subvolumes.is_empty()
            }
            Some(payload) => match payload.volume_group_mut() {
                Some(vg) => {
                    vg.logical_volumes.retain(|lv| !provides(&lv.payload));
                    vg.logical_volumes.is_empty()
                }
                None => true,
            },
            None => true,
        };

        if emptied {
            self.table.partitions.remove(index);
            self.fixed -= 1;
            self.target_vg = self.table.partitions[..self.fixed].iter().position(|p| {
                p.payload
                    .as_ref()
                    .is_some_and(|payload| payload.volume_group().is_some())
            });
        }
        debug!(mountpoint, index, emptied, "released template mountpoint");
        Ok(())
    }

    /// Partition size for content of `size` bytes, including the LUKS header
    /// when encryption was requested.
    fn with_luks_header(&self, size: u64) -> u64 {
        match self.encryption {
            Some(_) => size.saturating_add(LUKS2_HEADER_SIZE),
            None => size,
        }
    }

    fn add_customization(&mut self, customization: &PartitionCustomization) -> Result<()> {
        for mountpoint in customization.mountpoints() {
            self.release_mountpoint(mountpoint)?;
        }

        match &customization.payload {
            PartitionPayload::Plain(fs) => {
                let payload = self.wrap(LuksPayload::Filesystem(self.customized_filesystem(fs)));
                let size = self.with_luks_header(content_floor(customization.min_size));
                self.push(payload, size);
            }
            PartitionPayload::Lvm(vg) => {
                if let Some(name) = vg.name.as_deref()
                    && self.unique_vg_name(name) != name
                {
                    return Err(BuildError::DuplicateVolumeGroup(name.to_string()));
                }
                let mut group = LvmVolumeGroup {
                    // unnamed groups get a generated name with the other identifiers
                    name: vg.name.clone().unwrap_or_default(),
                    description: None,
                    logical_volumes: Vec::with_capacity(vg.logical_volumes.len()),
                };
                for lv in &vg.logical_volumes {
                    let payload = self.customized_filesystem(&lv.fs);
                    let name = match &lv.name {
                        Some(name) => name.clone(),
                        None => group.unique_lv_name(payload.mountpoint.as_deref().unwrap_or("swap")),
                    };
                    group.logical_volumes.push(LogicalVolume {
                        name,
                        size: align_up(content_floor(lv.min_size), LVM_EXTENT_SIZE),
                        payload,
                    });
                }
                let payload = self.wrap(LuksPayload::LvmVolumeGroup(group));
                let size = self.with_luks_header(customization.min_size);
                self.push(payload, size);
            }
            PartitionPayload::Btrfs(volume) => {
                if self.encryption.is_some() {
                    return Err(BuildError::UnsupportedNesting(
                        "btrfs volumes cannot be placed inside LUKS".to_string(),
                    ));
                }
                let subvolumes = volume
                    .subvolumes
                    .iter()
                    .map(|subvol| BtrfsSubvolume {
                        name: subvol.name.clone(),
                        mountpoint: Some(subvol.mountpoint.clone()),
                        compress: None,
                    })
                    .collect();
                let payload = Payload::Btrfs(BtrfsVolume {
                    uuid: None,
                    label: None,
                    subvolumes,
                });
                self.push(payload, content_floor(customization.min_size));
            }
        }

        debug!(
            partition_type = %customization.partition_type(),
            index = self.table.partitions.len() - 1,
            "added customized partition"
        );
        Ok(())
    }

    /// Make sure a volume group exists for new logical volumes.
    ///
    /// The template's root filesystem is moved into one when possible,
    /// otherwise a customized group is used or an empty one is created.
    fn ensure_volume_group(&mut self) {
        if self.target_vg.is_some() || self.convert_root() {
            return;
        }
        match self.table.volume_group_index() {
            Some(index) => self.target_vg = Some(index),
            None => {
                self.new_volume_group();
            }
        }
    }

    /// Move a plain or encrypted template root filesystem into a volume
    /// group. Returns false when there is no such root.
    fn convert_root(&mut self) -> bool {
        let Some(index) = self.table.partitions[..self.fixed]
            .iter()
            .position(|p| p.contains_mountpoint("/"))
        else {
            return false;
        };

        let name = self.unique_vg_name(ROOT_VG_NAME);
        let partition = &mut self.table.partitions[index];
        let root_vg = |fs: Filesystem, size: u64| LvmVolumeGroup {
            name,
            description: None,
            logical_volumes: vec![LogicalVolume {
                name: "rootlv".to_string(),
                size: align_up(size, LVM_EXTENT_SIZE),
                payload: fs,
            }],
        };

        let converted = match partition.payload.take() {
            Some(Payload::Filesystem(fs)) => Payload::LvmVolumeGroup(root_vg(fs, partition.size)),
            Some(Payload::Luks(LuksContainer {
                uuid,
                label,
                cipher,
                payload: LuksPayload::Filesystem(fs),
            })) => {
                let size = partition.size.saturating_sub(LUKS2_HEADER_SIZE);
                Payload::Luks(LuksContainer {
                    uuid,
                    label,
                    cipher,
                    payload: LuksPayload::LvmVolumeGroup(root_vg(fs, size)),
                })
            }
            other => {
                partition.payload = other;
                return false;
            }
        };
        partition.payload = Some(converted);
        // the partition type must now say LVM
        partition.part_type.clear();
        partition.size = 0;
        self.target_vg = Some(index);

        debug!(index, "moved root filesystem into a volume group");
        true
    }

    fn new_volume_group(&mut self) -> usize {
        let group = LvmVolumeGroup {
            name: self.unique_vg_name(ROOT_VG_NAME),
            description: None,
            logical_volumes: Vec::new(),
        };
        let payload = self.wrap(LuksPayload::LvmVolumeGroup(group));
        let index = self.push(payload, 0);
        self.target_vg = Some(index);

        debug!(index, "created volume group partition");
        index
    }

    /// Place a mountpoint nothing in the table provides yet.
    fn place(&mut self, mountpoint: &str, min_size: u64, wrap_in_lvm: bool) {
        if self.target_vg.is_some() || wrap_in_lvm {
            let index = match self.target_vg {
                Some(index) => index,
                None => self.new_volume_group(),
            };
            let payload = self.filesystem(mountpoint);
            if let Some(vg) = self.table.partitions[index]
                .payload
                .as_mut()
                .and_then(Payload::volume_group_mut)
            {
                let name = vg.unique_lv_name(mountpoint);
                debug!(mountpoint, lv = %name, vg = %vg.name, "placed as logical volume");
                vg.logical_volumes.push(LogicalVolume {
                    name,
                    size: align_up(content_floor(min_size), LVM_EXTENT_SIZE),
                    payload,
                });
            }
            return;
        }

        if let Some(index) = self.table.btrfs_index().filter(|index| *index < self.fixed)
            && let Some(Payload::Btrfs(volume)) = self.table.partitions[index].payload.as_mut()
        {
            let name = subvolume_name_for_mountpoint(mountpoint);
            debug!(mountpoint, subvolume = %name, "placed as btrfs subvolume");
            volume.subvolumes.push(BtrfsSubvolume {
                name,
                mountpoint: Some(mountpoint.to_string()),
                compress: None,
            });
            self.subvolume_mins.insert(mountpoint.to_string(), min_size);
            return;
        }

        let payload = self.wrap(LuksPayload::Filesystem(self.filesystem(mountpoint)));
        let size = self.with_luks_header(content_floor(min_size));
        let index = self.push(payload, size);
        debug!(mountpoint, index, "placed as plain partition");
    }

    /// Raise the minimum size of whatever holds `mountpoint`.
    fn grow(&mut self, mountpoint: &str, min_size: u64) {
        let Some(index) = self.table.partition_index_for(mountpoint) else {
            return;
        };
        let partition = &mut self.table.partitions[index];
        let Some(payload) = partition.payload.as_mut() else {
            return;
        };

        match payload {
            Payload::Filesystem(_) => partition.size = partition.size.max(min_size),
            Payload::Luks(LuksContainer {
                payload: LuksPayload::Filesystem(_),
                ..
            }) => {
                partition.size = partition
                    .size
                    .max(min_size.saturating_add(LUKS2_HEADER_SIZE));
            }
            Payload::Btrfs(_) => {
                let entry = self
                    .subvolume_mins
                    .entry(mountpoint.to_string())
                    .or_insert(0);
                *entry = (*entry).max(min_size);
            }
            other => {
                if let Some(lv) = other.volume_group_mut().and_then(|vg| {
                    vg.logical_volumes
                        .iter_mut()
                        .find(|lv| lv.payload.mountpoint.as_deref() == Some(mountpoint))
                }) {
                    lv.size = lv.size.max(align_up(min_size, LVM_EXTENT_SIZE));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::RootGrows;
    use layout_types::{
        GPT_ALIGNMENT_BYTES, Inner, MIB, PartitionTableType, align_down, builtin_template,
        part_types,
    };
    use proptest::prelude::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn template(name: &str) -> PartitionTable {
        builtin_template(name).unwrap()
    }

    fn rng(seed: u64) -> StdRng {
        StdRng::seed_from_u64(seed)
    }

    fn fs(mountpoint: &str, min_size: u64) -> FilesystemCustomization {
        FilesystemCustomization::new(mountpoint, min_size)
    }

    fn disk(json: &str) -> DiskCustomization {
        DiskCustomization::from_json_str(json).unwrap()
    }

    fn build_simple(
        base: &PartitionTable,
        mountpoints: &[FilesystemCustomization],
        mode: PartitioningMode,
    ) -> Result<PartitionTable> {
        build(base, mountpoints, 20 * GIB, mode, None, &mut rng(0))
    }

    fn assert_valid_layout(table: &PartitionTable) {
        let ranges = table.ranges();
        for (i, range) in ranges.iter().enumerate() {
            assert!(range.start >= table.start_offset, "partition {i} before start offset");
            assert!(range.is_valid_for_disk(table.usable_end()), "partition {i} past end");
            assert_eq!(range.start % GPT_ALIGNMENT_BYTES, 0, "partition {i} unaligned");
            for other in &ranges[i + 1..] {
                assert!(!range.overlaps(other), "{range:?} overlaps {other:?}");
            }
        }
        assert!(table.allocated() <= table.size);

        for partition in &table.partitions {
            if let Some(vg) = partition.payload.as_ref().and_then(Payload::volume_group) {
                assert!(vg.required_size() <= partition.size);
                for lv in &vg.logical_volumes {
                    assert_eq!(lv.size % LVM_EXTENT_SIZE, 0);
                }
            }
        }
    }

    fn lv_names(table: &PartitionTable) -> Vec<String> {
        table
            .partitions
            .iter()
            .filter_map(|p| p.payload.as_ref()?.volume_group())
            .flat_map(|vg| vg.logical_volumes.iter().map(|lv| lv.name.clone()))
            .collect()
    }

    #[test]
    fn plain_template_reports_lvm_as_resolved() {
        use layout_types::PartitioningMode::*;

        let var = vec![fs("/var", 10 * GIB)];
        let cases = [
            (None, Default, vec![], false),
            (None, Default, var.clone(), true),
            (None, AutoLvm, vec![], false),
            (None, AutoLvm, var.clone(), true),
            (None, Lvm, vec![], true),
            (None, Lvm, var.clone(), true),
            (None, Raw, vec![], false),
            (None, Raw, var.clone(), false),
            (Some(Raw), Default, var.clone(), false),
            (Some(Raw), AutoLvm, var.clone(), true),
            (Some(Lvm), Default, vec![], true),
            (Some(Lvm), Raw, var.clone(), false),
        ];

        for (default_mode, requested, mountpoints, expected) in cases {
            let mut base = template("plain");
            base.default_partitioning_mode = default_mode;

            let table = build_simple(&base, &mountpoints, requested).unwrap();
            assert_eq!(
                table.features().lvm,
                expected,
                "default={default_mode:?} requested={requested:?} mountpoints={}",
                mountpoints.len()
            );
            assert_eq!(
                table.features().lvm,
                resolve(default_mode, requested, &mountpoints)
            );
            assert_valid_layout(&table);
        }
    }

    #[test]
    fn template_features_survive_building() {
        let cases = [
            ("plain", vec!["xfs", "fat"]),
            ("luks", vec!["xfs", "fat", "luks"]),
            ("luks+lvm", vec!["xfs", "fat", "luks", "lvm"]),
            ("btrfs", vec!["xfs", "fat", "btrfs"]),
        ];
        for (name, expected) in cases {
            let table = build_simple(&template(name), &[], PartitioningMode::Default).unwrap();
            assert_eq!(table.features().names(), expected, "template {name}");
            assert_valid_layout(&table);
        }
    }

    #[test]
    fn lvm_mode_moves_root_into_volume_group() {
        let table = build_simple(
            &template("plain"),
            &[fs("/var", 2 * GIB), fs("/var/log", GIB)],
            PartitioningMode::Lvm,
        )
        .unwrap();

        assert_eq!(table.partitions.len(), 4);
        let root = &table.partitions[3];
        assert_eq!(root.part_type, part_types::LVM_GUID);
        let vg = root.payload.as_ref().and_then(Payload::volume_group).unwrap();
        assert_eq!(vg.name, ROOT_VG_NAME);
        assert_eq!(lv_names(&table), ["rootlv", "varlv", "var_loglv"]);
        assert!(vg.find_mountpoint("/var").unwrap().size >= 2 * GIB);
        assert_valid_layout(&table);
    }

    #[test]
    fn raw_mode_adds_plain_partitions() {
        let table = build_simple(
            &template("plain"),
            &[fs("/var", 10 * GIB)],
            PartitioningMode::Raw,
        )
        .unwrap();

        assert_eq!(table.partitions.len(), 5);
        let var = table.find_mountpoint("/var").unwrap();
        assert_eq!(var.start, table.partitions[4].start);
        assert_eq!(var.part_type, part_types::FILESYSTEM_GUID);
        assert!(var.size >= 10 * GIB);
        assert!(!table.features().lvm);
        assert_valid_layout(&table);
    }

    #[test]
    fn existing_mountpoints_grow() {
        let table = build_simple(
            &template("plain"),
            &[fs("/", 5 * GIB), fs("/boot", GIB)],
            PartitioningMode::Raw,
        )
        .unwrap();

        assert_eq!(table.partitions.len(), 4);
        assert_eq!(table.partitions[2].size, GIB);
        assert!(table.partitions[3].size >= 5 * GIB);
    }

    #[test]
    fn boot_partitions_do_not_grow() {
        let table = build_simple(&template("plain"), &[], PartitioningMode::Raw).unwrap();
        assert_eq!(table.partitions[0].size, MIB);
        assert_eq!(table.partitions[1].size, 200 * MIB);
        assert_eq!(table.partitions[2].size, 500 * MIB);
        // the root partition takes everything that is left
        let root = &table.partitions[3];
        assert_eq!(root.range().end, align_down(table.usable_end(), MIB));
    }

    #[test]
    fn template_volume_group_receives_new_volumes() {
        let table = build_simple(
            &template("luks+lvm"),
            &[fs("/home", 3 * GIB)],
            PartitioningMode::Default,
        )
        .unwrap();

        assert_eq!(table.partitions.len(), 3);
        assert_eq!(lv_names(&table), ["rootlv", "homelv"]);
        let container = &table.partitions[2];
        assert!(matches!(container.payload, Some(Payload::Luks(_))));
        assert_valid_layout(&table);
    }

    #[test]
    fn raw_mode_rejects_lvm_template() {
        let err = build_simple(&template("luks+lvm"), &[], PartitioningMode::Raw).unwrap_err();
        assert_eq!(err, BuildError::RawWithLvmTemplate);
    }

    #[test]
    fn btrfs_template_gets_subvolumes() {
        let table = build_simple(
            &template("btrfs"),
            &[fs("/var", 4 * GIB), fs("/home", GIB)],
            PartitioningMode::Default,
        )
        .unwrap();

        assert_eq!(table.partitions.len(), 3);
        let Some(Payload::Btrfs(volume)) = &table.partitions[2].payload else {
            panic!("expected btrfs payload");
        };
        let names: Vec<_> = volume.subvolumes.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, ["root", "home", "var"]);
        assert!(table.partitions[2].size >= 5 * GIB);
        assert_valid_layout(&table);
    }

    #[test]
    fn btrfs_template_in_lvm_mode_creates_volume_group() {
        let table = build_simple(
            &template("btrfs"),
            &[fs("/var", 4 * GIB)],
            PartitioningMode::Lvm,
        )
        .unwrap();

        assert_eq!(table.partitions.len(), 4);
        assert!(table.features().btrfs);
        assert!(table.features().lvm);
        assert_eq!(lv_names(&table), ["varlv"]);
        assert_valid_layout(&table);
    }

    #[test]
    fn required_sizes_apply() {
        let mut base = template("plain");
        base.partitions[3].size = 100 * MIB;

        let table = build(
            &base,
            &[fs("/usr", MIB)],
            20 * GIB,
            PartitioningMode::Raw,
            None,
            &mut rng(0),
        )
        .unwrap();
        assert!(table.partitions[3].size >= GIB);
        assert!(table.partitions[4].size >= 2 * GIB);
    }

    #[test]
    fn insufficient_space() {
        let err = build(
            &template("plain"),
            &[fs("/var", 10 * GIB)],
            4 * GIB,
            PartitioningMode::Raw,
            None,
            &mut rng(0),
        )
        .unwrap_err();

        let BuildError::InsufficientSpace {
            required,
            available,
        } = err
        else {
            panic!("unexpected error {err:?}");
        };
        assert_eq!(available, 4 * GIB);
        assert!(required > 12 * GIB);
    }

    #[test]
    fn disk_min_size_raises_image_size() {
        let customizations = disk(r#"{"minsize": "30 GiB", "partitions": []}"#);
        let table = build(
            &template("plain"),
            &[],
            10 * GIB,
            PartitioningMode::Raw,
            Some(&customizations),
            &mut rng(0),
        )
        .unwrap();
        assert_eq!(table.size, 30 * GIB);
    }

    #[test]
    fn invalid_requests() {
        assert_eq!(
            build_simple(&template("plain"), &[fs("var", 0)], PartitioningMode::Raw).unwrap_err(),
            BuildError::InvalidMountpoint("var".to_string())
        );
        assert_eq!(
            build_simple(
                &template("plain"),
                &[fs("/var", 0), fs("/var", GIB)],
                PartitioningMode::Raw
            )
            .unwrap_err(),
            BuildError::DuplicateMountpoint("/var".to_string())
        );
    }

    #[test]
    fn customization_cannot_reuse_template_mountpoint() {
        let customizations = disk(r#"{"partitions": [{"mountpoint": "/boot", "minsize": "1 GiB"}]}"#);
        let err = build(
            &template("plain"),
            &[],
            20 * GIB,
            PartitioningMode::Raw,
            Some(&customizations),
            &mut rng(0),
        )
        .unwrap_err();
        assert_eq!(err, BuildError::DuplicateMountpoint("/boot".to_string()));
    }

    #[test]
    fn customization_replaces_template_root() {
        let customizations = disk(
            r#"{"partitions": [
                {"type": "lvm", "name": "sysvg", "logical_volumes": [
                    {"name": "rootlv", "mountpoint": "/"},
                    {"mountpoint": "/home", "minsize": "2 GiB"}
                ]}
            ]}"#,
        );
        let table = build(
            &template("plain"),
            &[],
            20 * GIB,
            PartitioningMode::Raw,
            Some(&customizations),
            &mut rng(0),
        )
        .unwrap();

        assert_eq!(table.partitions.len(), 4);
        let root = table.find_mountpoint("/").unwrap();
        assert_eq!(root, &table.partitions[3]);
        let vg = root.payload.as_ref().and_then(Payload::volume_group).unwrap();
        assert_eq!(vg.name, "sysvg");
        assert_eq!(lv_names(&table), ["rootlv", "homelv"]);
        assert!(vg.find_mountpoint("/").unwrap().size >= GIB);
        assert_valid_layout(&table);
    }

    #[test]
    fn customized_root_keeps_other_subvolumes() {
        let customizations = disk(r#"{"partitions": [{"mountpoint": "/", "minsize": "4 GiB"}]}"#);
        let table = build(
            &template("btrfs"),
            &[],
            20 * GIB,
            PartitioningMode::Default,
            Some(&customizations),
            &mut rng(0),
        )
        .unwrap();

        assert_eq!(table.partitions.len(), 4);
        let Some(Payload::Btrfs(volume)) = &table.partitions[2].payload else {
            panic!("expected btrfs payload");
        };
        let names: Vec<_> = volume.subvolumes.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, ["home"]);

        let root = &table.partitions[3];
        let Some(Payload::Filesystem(root_fs)) = &root.payload else {
            panic!("expected filesystem payload");
        };
        assert_eq!(root_fs.mountpoint.as_deref(), Some("/"));
        assert!(root.size >= 4 * GIB);
        assert_valid_layout(&table);
    }

    #[test]
    fn customized_volume_group_replaces_emptied_template_group() {
        let customizations = disk(
            r#"{"partitions": [
                {"type": "lvm", "name": "rootvg", "logical_volumes": [{"mountpoint": "/"}]}
            ]}"#,
        );
        let table = build(
            &template("luks+lvm"),
            &[fs("/var", GIB)],
            20 * GIB,
            PartitioningMode::Default,
            Some(&customizations),
            &mut rng(0),
        )
        .unwrap();

        // the encrypted template group lost its only volume and is gone
        assert_eq!(table.partitions.len(), 3);
        assert!(!table.features().luks);
        let vg = table.partitions[2]
            .payload
            .as_ref()
            .and_then(Payload::volume_group)
            .unwrap();
        assert_eq!(vg.name, ROOT_VG_NAME);
        assert_eq!(lv_names(&table), ["rootlv", "varlv"]);
        assert_valid_layout(&table);
    }

    #[test]
    fn volume_group_names_must_not_clash_with_template() {
        let customizations = disk(
            r#"{"partitions": [
                {"type": "lvm", "name": "rootvg", "logical_volumes": [{"mountpoint": "/data"}]}
            ]}"#,
        );
        let err = build(
            &template("luks+lvm"),
            &[],
            20 * GIB,
            PartitioningMode::Default,
            Some(&customizations),
            &mut rng(0),
        )
        .unwrap_err();
        assert_eq!(err, BuildError::DuplicateVolumeGroup("rootvg".to_string()));
    }

    #[test]
    fn lvm_mode_without_convertible_root_still_creates_volume_group() {
        use layout_types::PartitioningMode::*;

        let table = build_simple(&template("btrfs"), &[], Lvm).unwrap();
        assert!(table.features().lvm);
        assert_eq!(table.features().lvm, resolve(Some(Raw), Lvm, &[]));
        assert_eq!(table.partitions.len(), 4);
        let vg = table.partitions[3]
            .payload
            .as_ref()
            .and_then(Payload::volume_group)
            .unwrap();
        assert_eq!(vg.name, ROOT_VG_NAME);
        assert!(vg.logical_volumes.is_empty());
        assert_valid_layout(&table);
    }

    #[test]
    fn encrypted_partitions_add_header_to_requested_size() {
        let customizations = disk(
            r#"{"encryption": {}, "partitions": [{"mountpoint": "/data", "minsize": "2 GiB"}]}"#,
        );
        let table = build_with_policy(
            &template("plain"),
            &[fs("/srv", 2 * GIB)],
            20 * GIB,
            PartitioningMode::Raw,
            Some(&customizations),
            &mut rng(0),
            &RootGrows,
        )
        .unwrap();

        for mountpoint in ["/data", "/srv"] {
            let partition = table.find_mountpoint(mountpoint).unwrap();
            assert!(matches!(partition.payload, Some(Payload::Luks(_))));
            assert_eq!(partition.size, 2 * GIB + LUKS2_HEADER_SIZE, "{mountpoint}");
        }
    }

    #[test]
    fn encrypted_oversized_request_is_insufficient_space() {
        let customizations = disk(r#"{"encryption": {}, "partitions": []}"#);
        let err = build(
            &template("plain"),
            &[fs("/data", u64::MAX)],
            20 * GIB,
            PartitioningMode::Raw,
            Some(&customizations),
            &mut rng(0),
        )
        .unwrap_err();
        assert!(
            matches!(err, BuildError::InsufficientSpace { available, .. } if available == 20 * GIB),
            "{err:?}"
        );
    }

    #[test]
    fn invalid_customization_is_rejected() {
        let customizations = disk(r#"{"partitions": [{"type": "lvm"}]}"#);
        let err = build(
            &template("plain"),
            &[],
            20 * GIB,
            PartitioningMode::Raw,
            Some(&customizations),
            &mut rng(0),
        )
        .unwrap_err();
        assert!(matches!(err, BuildError::InvalidCustomization(_)));
    }

    #[test]
    fn lvm_customization_is_realized_in_raw_mode() {
        let customizations = disk(
            r#"{"partitions": [
                {"type": "lvm", "minsize": "6 GiB", "logical_volumes": [
                    {"mountpoint": "/data", "minsize": "2 GiB"},
                    {"fs_type": "swap", "minsize": "1 GiB"}
                ]},
                {"mountpoint": "/srv", "fs_type": "ext4", "label": "srv"}
            ]}"#,
        );
        let table = build(
            &template("plain"),
            &[],
            20 * GIB,
            PartitioningMode::Raw,
            Some(&customizations),
            &mut rng(0),
        )
        .unwrap();

        assert_eq!(table.partitions.len(), 6);
        let vg_partition = &table.partitions[4];
        assert!(vg_partition.size >= 6 * GIB);
        let vg = vg_partition.payload.as_ref().and_then(Payload::volume_group).unwrap();
        assert!(vg.name.starts_with("vg"));
        assert_eq!(lv_names(&table), ["datalv", "swaplv"]);

        // swap keeps its size, the data volume takes the spare extents
        let swap = &vg.logical_volumes[1];
        assert_eq!(swap.size, GIB);
        assert!(vg.logical_volumes[0].size > 2 * GIB);

        let srv = &table.partitions[5];
        let Some(Payload::Filesystem(srv_fs)) = &srv.payload else {
            panic!("expected filesystem payload");
        };
        assert_eq!(srv_fs.fs_type, FilesystemType::Ext4);
        assert_eq!(srv_fs.label.as_deref(), Some("srv"));
        assert!(table.features().lvm);
        assert_valid_layout(&table);
    }

    #[test]
    fn encryption_wraps_customized_partitions() {
        let customizations = disk(
            r#"{
                "encryption": {"label": "crypt", "cipher": "aes-xts-plain64"},
                "partitions": [
                    {"mountpoint": "/data", "minsize": "2 GiB"},
                    {"type": "lvm", "name": "datavg", "logical_volumes": [{"mountpoint": "/srv"}]}
                ]
            }"#,
        );
        let table = build(
            &template("plain"),
            &[],
            20 * GIB,
            PartitioningMode::Raw,
            Some(&customizations),
            &mut rng(0),
        )
        .unwrap();

        for partition in &table.partitions[4..] {
            let Some(Payload::Luks(luks)) = &partition.payload else {
                panic!("expected LUKS payload");
            };
            assert_eq!(luks.label.as_deref(), Some("crypt"));
            assert_eq!(luks.cipher.as_deref(), Some("aes-xts-plain64"));
            assert!(luks.uuid.is_some());
        }
        assert_eq!(table.partitions[5].part_type, part_types::LVM_GUID);
        let features = table.features();
        assert!(features.luks && features.lvm);
        assert_valid_layout(&table);
    }

    #[test]
    fn encryption_wraps_synthesized_volume_group() {
        let customizations = disk(r#"{"encryption": {}, "partitions": []}"#);
        let table = build(
            &template("btrfs"),
            &[fs("/var", GIB)],
            20 * GIB,
            PartitioningMode::Lvm,
            Some(&customizations),
            &mut rng(0),
        )
        .unwrap();

        let last = table.partitions.last().unwrap();
        assert!(matches!(
            last.payload.as_ref().map(Payload::innermost),
            Some(Inner::VolumeGroup(_))
        ));
        assert!(matches!(last.payload, Some(Payload::Luks(_))));
        assert!(last.size >= GIB + LUKS2_HEADER_SIZE);
    }

    #[test]
    fn encrypted_btrfs_is_unsupported() {
        let customizations = disk(
            r#"{"encryption": {}, "partitions": [
                {"type": "btrfs", "subvolumes": [{"name": "data", "mountpoint": "/data"}]}
            ]}"#,
        );
        let err = build(
            &template("plain"),
            &[],
            20 * GIB,
            PartitioningMode::Raw,
            Some(&customizations),
            &mut rng(0),
        )
        .unwrap_err();
        assert!(matches!(err, BuildError::UnsupportedNesting(_)));
    }

    #[test]
    fn btrfs_customization_sizes_from_requests() {
        let customizations = disk(
            r#"{"partitions": [
                {"type": "btrfs", "subvolumes": [
                    {"name": "data", "mountpoint": "/data"},
                    {"name": "logs", "mountpoint": "/logs"}
                ]}
            ]}"#,
        );
        let table = build(
            &template("plain"),
            &[fs("/data", 3 * GIB), fs("/logs", 2 * GIB)],
            20 * GIB,
            PartitioningMode::Raw,
            Some(&customizations),
            &mut rng(0),
        )
        .unwrap();

        let volume = &table.partitions[4];
        assert!(volume.size >= 5 * GIB);
        let Some(Payload::Btrfs(btrfs)) = &volume.payload else {
            panic!("expected btrfs payload");
        };
        assert_eq!(
            btrfs.subvolumes[0],
            BtrfsSubvolume {
                name: "data".to_string(),
                mountpoint: Some("/data".to_string()),
                compress: None,
            }
        );
        assert!(btrfs.uuid.is_some());
    }

    #[test]
    fn root_grows_policy() {
        let table = build_with_policy(
            &template("plain"),
            &[fs("/var", 2 * GIB)],
            20 * GIB,
            PartitioningMode::Raw,
            None,
            &mut rng(0),
            &RootGrows,
        )
        .unwrap();

        let var = &table.partitions[4];
        assert_eq!(var.size, 2 * GIB);
        assert!(table.partitions[3].size > 10 * GIB);
        assert_valid_layout(&table);
    }

    #[test]
    fn deterministic_identifiers() {
        let build_seeded = |seed| {
            build(
                &template("luks+lvm"),
                &[fs("/var", GIB)],
                20 * GIB,
                PartitioningMode::Default,
                Some(&disk(
                    r#"{"partitions": [{"type": "lvm", "logical_volumes": [{"mountpoint": "/data"}]}]}"#,
                )),
                &mut rng(seed),
            )
            .unwrap()
        };

        let a = build_seeded(7);
        let b = build_seeded(7);
        let c = build_seeded(8);
        assert_eq!(a, b);
        assert!(a.uuid.is_some());
        assert_ne!(a.uuid, c.uuid);
        assert_ne!(a.partitions[3].uuid, c.partitions[3].uuid);

        for partition in &a.partitions {
            assert!(partition.uuid.is_some());
            assert!(!partition.part_type.is_empty());
        }
    }

    #[test]
    fn template_identifiers_are_kept() {
        let mut base = template("plain");
        let fixed = new_uuid(&mut rng(99));
        base.uuid = Some(fixed);

        let table = build_simple(&base, &[], PartitioningMode::Raw).unwrap();
        assert_eq!(table.uuid, Some(fixed));
    }

    fn holder_size(table: &PartitionTable, mountpoint: &str) -> u64 {
        let partition = table.find_mountpoint(mountpoint).unwrap();
        match partition.payload.as_ref().and_then(Payload::volume_group) {
            Some(vg) => vg.find_mountpoint(mountpoint).map_or(0, |lv| lv.size),
            None => partition.size,
        }
    }

    proptest! {
        #[test]
        fn built_tables_respect_minimums(
            image_gib in 4u64..64,
            sizes in proptest::collection::vec(0u64..4096, 4),
            mode in 0usize..4,
            seed in any::<u64>(),
        ) {
            use layout_types::PartitioningMode::*;

            let mountpoints: Vec<_> = ["/var", "/home", "/srv", "/opt"]
                .iter()
                .zip(&sizes)
                .map(|(mountpoint, mib)| fs(mountpoint, mib * MIB))
                .collect();
            let mode = [Default, AutoLvm, Lvm, Raw][mode];

            match build(&template("plain"), &mountpoints, image_gib * GIB, mode, None, &mut rng(seed)) {
                Ok(table) => {
                    assert_valid_layout(&table);
                    for fs in &mountpoints {
                        prop_assert!(holder_size(&table, &fs.mountpoint) >= fs.min_size);
                    }
                    prop_assert_eq!(table.features().lvm, resolve(None, mode, &mountpoints));
                }
                Err(BuildError::InsufficientSpace { required, available }) => {
                    prop_assert!(required > available);
                }
                Err(e) => panic!("unexpected error {e}"),
            }
        }
    }

    #[test]
    fn dos_tables_use_dos_ids() {
        let mut base = template("plain");
        base.table_type = PartitionTableType::Dos;
        base.partitions.remove(0);
        for partition in &mut base.partitions {
            partition.part_type.clear();
        }

        let table = build_simple(&base, &[fs("/var", 0)], PartitioningMode::Raw).unwrap();
        let ids: Vec<_> = table.partitions.iter().map(|p| p.part_type.as_str()).collect();
        assert_eq!(
            ids,
            [
                part_types::DOS_ESP_ID,
                part_types::DOS_LINUX_ID,
                part_types::DOS_LINUX_ID,
                part_types::DOS_LINUX_ID
            ]
        );
        assert_valid_layout(&table);
    }
}
