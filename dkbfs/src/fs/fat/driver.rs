// SPDX-License-Identifier: MIT

use std::sync::Arc;

use dkbio::sector::SectorStore;

use crate::core::{
    alloc_map::{AllocMode, AllocationMap, FatTable},
    attr::{FatAttr, FileAttr},
    chain::{GroupChain, GroupItem},
    entry::DirectoryEntry,
    error::*,
    params::{FormatKind, FormatParameters},
    report::Report,
    tree::{SlotBounds, SlotCodec},
    utils::{bytes_utils::Endian, time_utils, volume_utils::generate_volume_id_32},
};
use crate::driver::{FormatDriver, FreeSpace, VolumeMeta};
use crate::fs::fat::{
    boot::{Hu68kBpb, MsdosBpb},
    checker::{self, BootCandidate},
    codec::{FatCodec, TableWidth},
    constant::*,
    entries::SlotStyle,
    formatter,
    meta::FatMeta,
};

/// Boot-sector family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FatFlavor {
    MsDos,
    Hu68k,
}

/// Driver for every FAT table family: MS-DOS FAT12/16, the big-endian
/// FAT16 variant and Human68k.
#[derive(Debug, Clone)]
pub struct FatDriver {
    params: Arc<FormatParameters>,
    flavor: FatFlavor,
    codec: FatCodec,
    meta: FatMeta,
    free_cache: Option<FreeSpace>,
}

impl FatDriver {
    pub fn new(params: Arc<FormatParameters>, flavor: FatFlavor, codec: FatCodec) -> Self {
        Self {
            params,
            flavor,
            codec,
            meta: FatMeta::default(),
            free_cache: None,
        }
    }

    #[inline]
    pub fn codec(&self) -> FatCodec {
        self.codec
    }

    #[inline]
    pub fn flavor(&self) -> FatFlavor {
        self.flavor
    }

    #[inline]
    pub fn meta(&self) -> &FatMeta {
        &self.meta
    }

    /// Table codec policy of this family. Big-endian FAT16 volumes keep
    /// 16-bit entries at every size.
    fn width(&self) -> TableWidth {
        match (self.flavor, self.params.kind) {
            (_, FormatKind::Fat16Be) => TableWidth::Fixed(FatCodec::Fat16Be),
            (FatFlavor::Hu68k, _) => TableWidth::Auto(FatCodec::Fat16Be),
            _ => TableWidth::Auto(FatCodec::Fat16Le),
        }
    }

    /// Re-derives the table codec from the parsed cluster count.
    pub fn settle_codec(&mut self) {
        self.codec = self.meta.codec_for(self.width());
    }

    fn style(&self) -> SlotStyle {
        SlotStyle {
            endian: match self.flavor {
                FatFlavor::Hu68k => Endian::Little,
                FatFlavor::MsDos => self.params.kind.endian(),
            },
            long_names: self.flavor == FatFlavor::Hu68k,
            delete_code: self.params.delete_code,
            space_code: self.params.space_code,
        }
    }

    fn read_boot(&self, sector: &[u8]) -> Option<BootCandidate> {
        Some(match self.flavor {
            FatFlavor::MsDos => {
                let bpb = MsdosBpb::read(sector)?;
                BootCandidate {
                    meta: bpb.to_meta(self.params.kind.endian()),
                    jump_ok: bpb.has_jump(),
                    signature_ok: sector
                        .get(FAT_SIGNATURE_OFFSET..FAT_SIGNATURE_OFFSET + 2)
                        .is_none_or(|s| s == FAT_SIGNATURE),
                }
            }
            FatFlavor::Hu68k => {
                let bpb = Hu68kBpb::read(sector)?;
                BootCandidate {
                    meta: bpb.to_meta(),
                    jump_ok: bpb.has_jump(),
                    signature_ok: bpb.has_oem(),
                }
            }
        })
    }

    fn read_fat_bytes(&self, store: &mut dyn SectorStore, copy: u8) -> FsResult<Vec<u8>> {
        let ss = store.sector_size();
        let spf = self.meta.sectors_per_fat as u32;
        let mut raw = vec![0u8; spf as usize * ss];
        for (i, chunk) in raw.chunks_exact_mut(ss).enumerate() {
            store.read_sector(self.meta.fat_sector(copy) + i as u32, chunk)?;
        }
        Ok(raw)
    }

    fn item(&self, group: u32, next: u32) -> GroupItem {
        GroupItem {
            group,
            next_group: next,
            sector_start: self.start_sector_of_group(group),
            sector_end: self.end_sector_of_group(group),
        }
    }
}

impl SlotCodec for FatDriver {
    fn slot_size(&self) -> usize {
        FAT_SLOT_SIZE
    }

    fn decode_slot(&self, _store: &mut dyn SectorStore, raw: &[u8]) -> Option<DirectoryEntry> {
        self.style().decode(raw)
    }

    fn is_end_slot(&self, raw: &[u8]) -> bool {
        raw[0] == FAT_ENTRY_END_OF_DIR
    }

    fn mark_end_slot(&self, raw: &mut [u8]) {
        raw[0] = FAT_ENTRY_END_OF_DIR;
    }
}

impl FormatDriver for FatDriver {
    fn params(&self) -> &Arc<FormatParameters> {
        &self.params
    }

    fn parse_parameters(&mut self, store: &mut dyn SectorStore, is_formatting: bool) -> Ratio {
        self.free_cache = None;
        if is_formatting {
            return match FatMeta::for_format(&self.params, store.sector_count(), self.width()) {
                Ok(m) => {
                    self.meta = m;
                    1.0
                }
                Err(e) => {
                    log::debug!("{}: cannot lay out volume: {e}", self.params.name);
                    -1.0
                }
            };
        }

        let mut buf = store.sector_buf();
        if store.read_sector(FAT_BOOT_SECTOR, &mut buf).is_err() {
            return -1.0;
        }
        let Some(candidate) = self.read_boot(&buf) else {
            return -1.0;
        };
        let r = checker::score_parameters(
            &candidate,
            &self.params,
            store.sector_size(),
            store.sector_count(),
            self.width(),
        );
        self.meta = candidate.meta;
        r
    }

    fn check_fat(&self, store: &mut dyn SectorStore, is_formatting: bool) -> Ratio {
        if is_formatting {
            return 1.0;
        }
        checker::score_fat(store, &self.meta, self.codec)
    }

    fn check_directory(&self, store: &mut dyn SectorStore, is_formatting: bool) -> Ratio {
        if is_formatting {
            return 1.0;
        }
        checker::score_root(store, &self.meta, &self.style())
    }

    fn load_map(&self, store: &mut dyn SectorStore) -> FsResult<AllocationMap> {
        let raw = self.read_fat_bytes(store, 0)?;
        let count = self.meta.cluster_count() + FAT_FIRST_CLUSTER;
        let entries = self.codec.decode(&raw, count);
        ensure!(entries.len() == count as usize, FsError::FatAreaInvalid);
        Ok(AllocationMap::Table(FatTable::new(entries, self.codec.bits())))
    }

    fn write_map(&self, store: &mut dyn SectorStore, map: &AllocationMap) -> FsResult {
        let AllocationMap::Table(table) = map else {
            bail!(FsError::FatAreaInvalid);
        };
        let mut raw = self.read_fat_bytes(store, 0)?;
        self.codec.encode(table.entries(), &mut raw);
        let ss = store.sector_size();
        for copy in 0..self.meta.num_fats {
            for (i, chunk) in raw.chunks_exact(ss).enumerate() {
                store.write_sector(self.meta.fat_sector(copy) + i as u32, chunk)?;
            }
        }
        Ok(())
    }

    fn sectors_per_group(&self) -> u32 {
        self.meta.sectors_per_cluster as u32
    }

    fn group_bytes(&self) -> usize {
        self.meta.cluster_bytes()
    }

    fn start_sector_of_group(&self, group: u32) -> u32 {
        self.meta.cluster_sector(group)
    }

    fn data_start_sector(&self) -> u32 {
        self.meta.data_start()
    }

    fn allocate_groups(
        &self,
        map: &mut AllocationMap,
        bytes: u64,
        mode: AllocMode,
        tail: Option<&GroupChain>,
    ) -> FsResult<GroupChain> {
        let mut chain = GroupChain::new(self.meta.bytes_per_sector as usize);
        let count = bytes.div_ceil(self.group_bytes().max(1) as u64);
        ensure!(count <= u32::MAX as u64, FsError::DiskFull);
        if count == 0 {
            return Ok(chain);
        }
        let groups = map.take_free(count as u32)?;
        if mode == AllocMode::Append {
            if let Some(last) = tail.and_then(GroupChain::last_group) {
                map.link(last, groups[0])?;
            }
        }
        let eoc = map.end_of_chain();
        for (i, &g) in groups.iter().enumerate() {
            chain.push(self.item(g, groups.get(i + 1).copied().unwrap_or(eoc)));
        }
        Ok(chain)
    }

    fn file_chain(
        &self,
        _store: &mut dyn SectorStore,
        map: &AllocationMap,
        entry: &DirectoryEntry,
    ) -> FsResult<GroupChain> {
        let mut chain = GroupChain::new(self.meta.bytes_per_sector as usize);
        let mut g = entry.start_group;
        if g == 0 {
            return Ok(chain);
        }
        let limit = map.group_limit();
        let mut steps = 0u32;
        loop {
            ensure!(
                g >= FAT_FIRST_CLUSTER && g < limit,
                FsAllocError::InvalidGroup(g)
            );
            let next = map.next(g).ok_or(FsAllocError::InvalidGroup(g))?;
            chain.push(self.item(g, next));
            if map.is_end_of_chain(next) {
                break;
            }
            steps += 1;
            ensure!(steps < limit, FsAllocError::LoopDetected(g));
            g = next;
        }
        Ok(chain)
    }

    fn calc_disk_free_size(&mut self, map: &AllocationMap, wrote: bool) -> FreeSpace {
        if let (false, Some(cached)) = (wrote, self.free_cache) {
            return cached;
        }
        let f = FreeSpace {
            free_groups: map.free_count(),
            total_groups: self.meta.cluster_count(),
            group_bytes: self.group_bytes(),
        };
        self.free_cache = Some(f);
        f
    }

    fn root_entry(&self, _store: &mut dyn SectorStore) -> FsResult<DirectoryEntry> {
        Ok(DirectoryEntry::new_file("", "", FileAttr::DIRECTORY))
    }

    fn root_chain(
        &self,
        _store: &mut dyn SectorStore,
        map: &AllocationMap,
        _root: &DirectoryEntry,
    ) -> FsResult<GroupChain> {
        let mut chain = GroupChain::new(self.meta.bytes_per_sector as usize);
        let start = self.meta.root_start();
        chain.push(GroupItem {
            group: 0,
            next_group: map.end_of_chain(),
            sector_start: start,
            sector_end: start + self.meta.root_sectors().max(1) - 1,
        });
        Ok(chain)
    }

    fn directory_bounds(&self, _dir: &DirectoryEntry, is_root: bool) -> SlotBounds {
        SlotBounds {
            max_slots: is_root.then_some(self.meta.root_entries as usize),
            live_slots: None,
        }
    }

    fn encode_slot(&self, entry: &DirectoryEntry, raw: &mut [u8]) {
        self.style().encode(entry, raw);
    }

    fn delete_slot(&self, raw: &mut [u8]) {
        raw[0] = self.params.delete_code;
    }

    fn can_expand_directory(&self, _dir: &DirectoryEntry, is_root: bool) -> bool {
        !is_root
    }

    fn additional_process_on_made_directory(
        &self,
        store: &mut dyn SectorStore,
        dir: &mut DirectoryEntry,
        chain: &GroupChain,
        parent: Option<&DirectoryEntry>,
    ) -> FsResult {
        let Some(first) = chain.items().first() else {
            bail!(FsError::DirectoryAreaInvalid);
        };
        let dt = dir.modified.unwrap_or_else(time_utils::now);
        let style = self.style();
        let mut buf = store.sector_buf();
        store.read_sector(first.sector_start, &mut buf)?;
        buf[..FAT_SLOT_SIZE].copy_from_slice(&style.dot_slot(FAT_DOT_NAME, dir.start_group, dt));
        let parent_group = parent.map_or(0, |p| p.start_group);
        buf[FAT_SLOT_SIZE..FAT_SLOT_SIZE * 2]
            .copy_from_slice(&style.dot_slot(FAT_DOTDOT_NAME, parent_group, dt));
        store.write_sector(first.sector_start, &buf)?;
        dir.size = 0;
        Ok(())
    }

    fn post_change_attributes(
        &self,
        store: &mut dyn SectorStore,
        entry: &DirectoryEntry,
        chain: &GroupChain,
    ) -> FsResult {
        if !entry.is_dir() {
            return Ok(());
        }
        let Some(first) = chain.items().first() else {
            return Ok(());
        };
        let mut buf = store.sector_buf();
        store.read_sector(first.sector_start, &mut buf)?;
        if buf[0] == b'.' && buf[1] == b' ' {
            buf[11] = (FatAttr::from_common(entry.attr) | FatAttr::DIRECTORY).bits();
            store.write_sector(first.sector_start, &buf)?;
        }
        Ok(())
    }

    fn fill_sector(&self, lsn: u32) -> u8 {
        if lsn < self.meta.data_start() {
            0x00
        } else {
            self.params.fill_code
        }
    }

    fn create_bios_parameter_block(
        &mut self,
        store: &mut dyn SectorStore,
        vol: &VolumeMeta,
    ) -> FsResult {
        self.meta.volume_id = vol.volume_id.unwrap_or_else(generate_volume_id_32);
        self.meta.volume_label = formatter::label_field(vol.label.as_deref());
        formatter::write_boot_sector(store, &self.meta, self.flavor, &self.style(), self.codec)
    }

    fn additional_process_on_formatted(
        &self,
        store: &mut dyn SectorStore,
        vol: &VolumeMeta,
    ) -> FsResult<AllocationMap> {
        formatter::seed_volume(store, &self.meta, &self.style(), self.codec, vol)
    }

    fn volume_label(&self, store: &mut dyn SectorStore) -> Option<String> {
        let mut buf = store.sector_buf();
        let start = self.meta.root_start();
        for lsn in start..start + self.meta.root_sectors() {
            store.read_sector(lsn, &mut buf).ok()?;
            for raw in buf.chunks_exact(FAT_SLOT_SIZE) {
                if raw[0] == FAT_ENTRY_END_OF_DIR {
                    return self.meta.label();
                }
                let attr = raw[11];
                if raw[0] != self.params.delete_code
                    && attr != FAT_ATTR_LFN
                    && attr & FatAttr::VOLUME_ID.bits() != 0
                {
                    let text: String = raw[..11].iter().map(|&b| b as char).collect();
                    return Some(text.trim_end().to_string());
                }
            }
        }
        self.meta.label()
    }

    fn check_extra(&self, store: &mut dyn SectorStore, _map: &AllocationMap, rep: &mut Report) {
        checker::compare_fat_copies(store, &self.meta, rep);
        if self.meta.total_sectors < store.sector_count() {
            rep.info(
                "BPB.SIZE",
                format!(
                    "volume uses {} of {} sectors",
                    self.meta.total_sectors,
                    store.sector_count()
                ),
            );
        }
    }
}
