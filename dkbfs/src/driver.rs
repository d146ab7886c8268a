// SPDX-License-Identifier: MIT

//! Format drivers: the common contract and the closed set implementing it.

use core::ops::{Deref, DerefMut};
use std::sync::Arc;

use dkbio::sector::SectorStore;
use time::PrimitiveDateTime;

use crate::core::{
    alloc_map::{AllocMode, AllocationMap},
    chain::GroupChain,
    entry::DirectoryEntry,
    error::*,
    params::{FormatKind, FormatParameters},
    report::Report,
    tree::{SlotBounds, SlotCodec},
};
use crate::fs::{
    fat::{FatDriver, FatFlavor, codec::FatCodec},
    os9::Os9Driver,
};

/// Caller-supplied volume identity for `format`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VolumeMeta {
    pub label: Option<String>,
    pub volume_id: Option<u32>,
    pub created: Option<PrimitiveDateTime>,
}

/// Free-space figures of a mounted volume.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FreeSpace {
    pub free_groups: u32,
    pub total_groups: u32,
    pub group_bytes: usize,
}

impl FreeSpace {
    #[inline]
    pub fn free_bytes(&self) -> u64 {
        self.free_groups as u64 * self.group_bytes as u64
    }

    #[inline]
    pub fn total_bytes(&self) -> u64 {
        self.total_groups as u64 * self.group_bytes as u64
    }
}

/// Per-format behaviour behind a [`FilesystemSession`](crate::session::FilesystemSession).
///
/// Detection methods return a [`Ratio`]: 0.0..=1.0 for the share of checks
/// passed, negative for a hard contradiction.
pub trait FormatDriver: SlotCodec {
    fn params(&self) -> &Arc<FormatParameters>;

    // === Detection ===

    /// Reads the parameter area and derives the volume geometry. With
    /// `is_formatting` the geometry comes from the template and the store.
    fn parse_parameters(&mut self, store: &mut dyn SectorStore, is_formatting: bool) -> Ratio;
    fn check_fat(&self, store: &mut dyn SectorStore, is_formatting: bool) -> Ratio;
    fn check_directory(&self, store: &mut dyn SectorStore, is_formatting: bool) -> Ratio;

    // === Allocation map ===

    fn load_map(&self, store: &mut dyn SectorStore) -> FsResult<AllocationMap>;
    fn write_map(&self, store: &mut dyn SectorStore, map: &AllocationMap) -> FsResult;

    // === Addressing ===

    fn sectors_per_group(&self) -> u32;

    fn group_bytes(&self) -> usize {
        self.sectors_per_group() as usize * self.params().sector_size as usize
    }

    fn start_sector_of_group(&self, group: u32) -> u32;

    fn end_sector_of_group(&self, group: u32) -> u32 {
        self.start_sector_of_group(group) + self.sectors_per_group() - 1
    }

    /// First sector of the group heap.
    fn data_start_sector(&self) -> u32;

    // === Chains ===

    /// Chain covering at least `bytes`. `Append` extends `tail`, whose
    /// groups are not repeated in the result.
    fn allocate_groups(
        &self,
        map: &mut AllocationMap,
        bytes: u64,
        mode: AllocMode,
        tail: Option<&GroupChain>,
    ) -> FsResult<GroupChain>;

    /// Every group an entry owns through `chain`.
    fn owned_groups(&self, chain: &GroupChain) -> Vec<u32> {
        chain.groups()
    }

    fn delete_groups(&self, map: &mut AllocationMap, chain: &GroupChain) {
        map.release(&self.owned_groups(chain));
    }

    /// Data chain of a file or directory entry.
    fn file_chain(
        &self,
        store: &mut dyn SectorStore,
        map: &AllocationMap,
        entry: &DirectoryEntry,
    ) -> FsResult<GroupChain>;

    /// Free space, recomputed when `wrote` or nothing is cached yet.
    fn calc_disk_free_size(&mut self, map: &AllocationMap, wrote: bool) -> FreeSpace;

    // === Directories ===

    fn root_entry(&self, store: &mut dyn SectorStore) -> FsResult<DirectoryEntry>;

    fn root_chain(
        &self,
        store: &mut dyn SectorStore,
        map: &AllocationMap,
        root: &DirectoryEntry,
    ) -> FsResult<GroupChain>;

    fn directory_bounds(&self, dir: &DirectoryEntry, is_root: bool) -> SlotBounds;

    /// Writes `entry` into `raw`, keeping unmanaged bytes.
    fn encode_slot(&self, entry: &DirectoryEntry, raw: &mut [u8]);

    /// Marks a slot deleted.
    fn delete_slot(&self, raw: &mut [u8]);

    fn can_expand_directory(&self, dir: &DirectoryEntry, is_root: bool) -> bool;

    fn initialize_sectors_as_directory(
        &self,
        store: &mut dyn SectorStore,
        chain: &GroupChain,
    ) -> FsResult {
        for lsn in chain.sectors() {
            store.fill_sector(lsn, 0)?;
        }
        Ok(())
    }

    /// Writes the `.`/`..` records (and descriptor) of a new directory.
    /// `parent == None` means the parent is the root.
    fn additional_process_on_made_directory(
        &self,
        store: &mut dyn SectorStore,
        dir: &mut DirectoryEntry,
        chain: &GroupChain,
        parent: Option<&DirectoryEntry>,
    ) -> FsResult;

    fn additional_process_on_expanded_directory(
        &self,
        _store: &mut dyn SectorStore,
        _dir: &mut DirectoryEntry,
        _chain: &GroupChain,
    ) -> FsResult {
        Ok(())
    }

    /// Called after a changed slot was written at `slot_index` of `dir`.
    fn on_slot_written(
        &self,
        _store: &mut dyn SectorStore,
        _dir: &mut DirectoryEntry,
        _slot_index: usize,
    ) -> FsResult {
        Ok(())
    }

    // === Per-operation hooks ===

    fn pre_save(&self, _entry: &mut DirectoryEntry) -> FsResult {
        Ok(())
    }

    /// Runs after the data is written, before the slot is.
    fn post_save(
        &self,
        _store: &mut dyn SectorStore,
        _entry: &mut DirectoryEntry,
        _chain: &GroupChain,
    ) -> FsResult {
        Ok(())
    }

    fn pre_delete(&self, _entry: &DirectoryEntry) -> FsResult {
        Ok(())
    }

    fn post_delete(&self, _store: &mut dyn SectorStore, _entry: &DirectoryEntry) -> FsResult {
        Ok(())
    }

    fn pre_rename(&self, _entry: &DirectoryEntry, _name: &str) -> FsResult {
        Ok(())
    }

    fn post_rename(&self, _store: &mut dyn SectorStore, _entry: &DirectoryEntry) -> FsResult {
        Ok(())
    }

    /// Persists attributes kept outside the slot.
    fn post_change_attributes(
        &self,
        _store: &mut dyn SectorStore,
        _entry: &DirectoryEntry,
        _chain: &GroupChain,
    ) -> FsResult {
        Ok(())
    }

    // === Formatting ===

    /// Byte every sector `lsn` is filled with before the structures are laid.
    fn fill_sector(&self, lsn: u32) -> u8;

    fn create_bios_parameter_block(
        &mut self,
        store: &mut dyn SectorStore,
        vol: &VolumeMeta,
    ) -> FsResult;

    /// Lays the root directory and label; returns the fresh map.
    fn additional_process_on_formatted(
        &self,
        store: &mut dyn SectorStore,
        vol: &VolumeMeta,
    ) -> FsResult<AllocationMap>;

    // === Volume ===

    fn volume_label(&self, store: &mut dyn SectorStore) -> Option<String>;

    /// Format-specific integrity findings.
    fn check_extra(&self, _store: &mut dyn SectorStore, _map: &AllocationMap, _rep: &mut Report) {}
}

/// The closed driver set.
#[derive(Debug, Clone)]
pub enum Driver {
    Fat12(FatDriver),
    Fat16(FatDriver),
    Fat16Be(FatDriver),
    Hu68k(FatDriver),
    Os9(Os9Driver),
}

impl Driver {
    pub fn new(params: Arc<FormatParameters>) -> Self {
        match params.kind {
            FormatKind::Fat12 => Driver::Fat12(FatDriver::new(params, FatFlavor::MsDos, FatCodec::Fat12)),
            FormatKind::Fat16 => Driver::Fat16(FatDriver::new(params, FatFlavor::MsDos, FatCodec::Fat16Le)),
            FormatKind::Fat16Be => {
                Driver::Fat16Be(FatDriver::new(params, FatFlavor::MsDos, FatCodec::Fat16Be))
            }
            FormatKind::Hu68k => Driver::Hu68k(FatDriver::new(params, FatFlavor::Hu68k, FatCodec::Fat12)),
            FormatKind::Os9 => Driver::Os9(Os9Driver::new(params)),
        }
    }

    /// Picks the table width the parsed cluster count requires. A FAT12
    /// driver over 4085 or more clusters becomes a FAT16 driver.
    pub fn settle(self) -> Self {
        match self {
            Driver::Fat12(mut d) | Driver::Fat16(mut d) => {
                d.settle_codec();
                if d.codec() == FatCodec::Fat12 {
                    Driver::Fat12(d)
                } else {
                    log::debug!("{}: promoted to a 16-bit table", d.params().name);
                    Driver::Fat16(d)
                }
            }
            Driver::Fat16Be(mut d) => {
                d.settle_codec();
                Driver::Fat16Be(d)
            }
            Driver::Hu68k(mut d) => {
                d.settle_codec();
                Driver::Hu68k(d)
            }
            other => other,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Driver::Fat12(_) => "FAT12",
            Driver::Fat16(_) => "FAT16",
            Driver::Fat16Be(_) => "FAT16-BE",
            Driver::Hu68k(d) if d.codec() == FatCodec::Fat12 => "Human68k FAT12",
            Driver::Hu68k(_) => "Human68k FAT16",
            Driver::Os9(_) => "OS-9 RBF",
        }
    }
}

impl Deref for Driver {
    type Target = dyn FormatDriver;

    fn deref(&self) -> &Self::Target {
        match self {
            Driver::Fat12(d) | Driver::Fat16(d) | Driver::Fat16Be(d) | Driver::Hu68k(d) => d,
            Driver::Os9(d) => d,
        }
    }
}

impl DerefMut for Driver {
    fn deref_mut(&mut self) -> &mut Self::Target {
        match self {
            Driver::Fat12(d) | Driver::Fat16(d) | Driver::Fat16Be(d) | Driver::Hu68k(d) => d,
            Driver::Os9(d) => d,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(kind: FormatKind) -> Arc<FormatParameters> {
        Arc::new(FormatParameters {
            name: "T".into(),
            kind,
            ..Default::default()
        })
    }

    #[test]
    fn driver_per_kind() {
        assert!(matches!(Driver::new(params(FormatKind::Fat12)), Driver::Fat12(_)));
        assert!(matches!(Driver::new(params(FormatKind::Fat16Be)), Driver::Fat16Be(_)));
        assert!(matches!(Driver::new(params(FormatKind::Os9)), Driver::Os9(_)));
        assert_eq!(Driver::new(params(FormatKind::Hu68k)).name(), "Human68k FAT12");
    }

    #[test]
    fn free_space_bytes() {
        let f = FreeSpace {
            free_groups: 10,
            total_groups: 20,
            group_bytes: 1024,
        };
        assert_eq!(f.free_bytes(), 10240);
        assert_eq!(f.total_bytes(), 20480);
    }
}
