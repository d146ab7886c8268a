// SPDX-License-Identifier: MIT

use std::sync::Arc;

use dkbio::sector::SectorStore;
use zerocopy::IntoBytes;
use zerocopy::byteorder::{U16, U32};

use crate::core::{
    alloc_map::{AllocBitmap, AllocMode, AllocationMap, BITMAP_EOC},
    attr::{FileAttr, Os9Attr},
    chain::{GroupChain, GroupItem},
    entry::{DirectoryEntry, Os9Extra},
    error::*,
    params::FormatParameters,
    report::Report,
    tree::{SlotBounds, SlotCodec},
    utils::{bitmap::BitmapOps, time_utils, volume_utils::generate_volume_id_32},
};
use crate::driver::{FormatDriver, FreeSpace, VolumeMeta};
use crate::fs::os9::{
    checker,
    constant::*,
    entries,
    fd::FileDesc,
    lsn0::{IdSector, Os9Meta},
};

/// OS-9 RBF driver: bitmap allocation, file descriptors with segment lists.
#[derive(Debug, Clone)]
pub struct Os9Driver {
    params: Arc<FormatParameters>,
    meta: Os9Meta,
    free_cache: Option<FreeSpace>,
}

impl Os9Driver {
    pub fn new(params: Arc<FormatParameters>) -> Self {
        Self {
            params,
            meta: Os9Meta::default(),
            free_cache: None,
        }
    }

    #[inline]
    pub fn meta(&self) -> &Os9Meta {
        &self.meta
    }

    #[inline]
    fn spb(&self) -> u32 {
        self.meta.sectors_per_bit.max(1) as u32
    }

    fn sector_size(&self) -> usize {
        self.meta.sector_size as usize
    }

    pub fn read_fd(&self, store: &mut dyn SectorStore, lsn: u32) -> FsResult<FileDesc> {
        ensure!(lsn < self.meta.total_sectors, FsError::NoSector(lsn));
        let mut buf = store.sector_buf();
        store.read_sector(lsn, &mut buf)?;
        FileDesc::read(&buf).ok_or(FsError::InvalidSector(lsn))
    }

    fn write_fd(&self, store: &mut dyn SectorStore, lsn: u32, fd: &FileDesc) -> FsResult {
        let mut buf = store.sector_buf();
        buf[..OS9_FD_SIZE].copy_from_slice(fd.as_bytes());
        store.write_sector(lsn, &buf)?;
        Ok(())
    }

    /// Descriptor describing `entry` and its data `chain`.
    fn build_fd(&self, entry: &DirectoryEntry, chain: &GroupChain) -> FsResult<FileDesc> {
        let mut fd = FileDesc::new(self.native_attr(entry));
        let extra = entry.os9.unwrap_or_default();
        fd.owner = U16::new(extra.owner);
        fd.link_count = extra.link_count.max(1);
        fd.modified = time_utils::os9_pack(entry.modified.unwrap_or_else(time_utils::now));
        let created = time_utils::os9_pack(entry.created.or(entry.modified).unwrap_or_else(time_utils::now));
        fd.created.copy_from_slice(&created[..3]);
        fd.size = U32::new(entry.size.min(u32::MAX as u64) as u32);
        fd.set_segments(chain)?;
        Ok(fd)
    }

    /// Permission byte for `entry`; public read/exec bits already on disk
    /// survive attribute changes.
    fn native_attr(&self, entry: &DirectoryEntry) -> u8 {
        let mut a = Os9Attr::from_common(entry.attr);
        if let Some(x) = entry.os9 {
            let old = Os9Attr::from_bits_truncate(x.native_attr);
            a |= old & (Os9Attr::PREAD | Os9Attr::PEXEC);
            if !entry.attr.contains(FileAttr::READ_ONLY) {
                a |= old & Os9Attr::PWRITE;
            }
        }
        a.bits()
    }

    fn entry_from_fd(&self, name: String, fd_lsn: u32, fd: &FileDesc, raw: &[u8]) -> DirectoryEntry {
        let native = Os9Attr::from_bits_truncate(fd.attr);
        DirectoryEntry {
            used: true,
            raw: raw.to_vec(),
            name,
            ext: String::new(),
            ext_name: None,
            attr: native.to_common(),
            native_attr: fd.attr,
            start_group: fd_lsn,
            size: fd.size.get() as u64,
            modified: time_utils::os9_unpack(&fd.modified),
            created: time_utils::os9_unpack(&fd.created),
            accessed: None,
            os9: Some(Os9Extra {
                fd_lsn,
                link_count: fd.link_count,
                owner: fd.owner.get(),
                native_attr: fd.attr,
            }),
        }
    }

    fn cluster_item(&self, group: u32, next: u32) -> GroupItem {
        GroupItem {
            group,
            next_group: next,
            sector_start: self.start_sector_of_group(group),
            sector_end: self.end_sector_of_group(group),
        }
    }

    /// Writes the `..` and `.` head into the first data sector of `chain`.
    fn write_dir_head(
        &self,
        store: &mut dyn SectorStore,
        chain: &GroupChain,
        parent_fd: u32,
        own_fd: u32,
    ) -> FsResult {
        let Some(first) = chain.items().first() else {
            bail!(FsError::DirectoryAreaInvalid);
        };
        let mut buf = store.sector_buf();
        store.read_sector(first.sector_start, &mut buf)?;
        entries::encode_slot("..", parent_fd, &mut buf[..OS9_SLOT_SIZE]);
        entries::encode_slot(".", own_fd, &mut buf[OS9_SLOT_SIZE..OS9_SLOT_SIZE * 2]);
        store.write_sector(first.sector_start, &buf)?;
        Ok(())
    }
}

impl SlotCodec for Os9Driver {
    fn slot_size(&self) -> usize {
        OS9_SLOT_SIZE
    }

    fn decode_slot(&self, store: &mut dyn SectorStore, raw: &[u8]) -> Option<DirectoryEntry> {
        let (name, fd_lsn) = entries::decode_slot(raw)?;
        match self.read_fd(store, fd_lsn) {
            Ok(fd) => Some(self.entry_from_fd(name, fd_lsn, &fd, raw)),
            Err(e) => {
                log::warn!("{name}: unreadable file descriptor at LSN {fd_lsn}: {e}");
                let mut entry = DirectoryEntry::new_file(&name, "", FileAttr::empty());
                entry.raw = raw.to_vec();
                entry.start_group = fd_lsn;
                Some(entry)
            }
        }
    }
}

impl FormatDriver for Os9Driver {
    fn params(&self) -> &Arc<FormatParameters> {
        &self.params
    }

    fn parse_parameters(&mut self, store: &mut dyn SectorStore, is_formatting: bool) -> Ratio {
        self.free_cache = None;
        let p = &self.params;
        if store.sector_size() != p.sector_size as usize {
            return -1.0;
        }
        if is_formatting {
            return match Os9Meta::for_format(
                p.sector_size,
                store.sector_count(),
                p.sectors_per_bit,
                p.sectors_per_track,
                p.sides,
                p.tracks,
            ) {
                Some(m) => {
                    self.meta = m;
                    1.0
                }
                None => -1.0,
            };
        }

        let mut buf = store.sector_buf();
        if store.read_sector(OS9_ID_SECTOR, &mut buf).is_err() {
            return -1.0;
        }
        let Ok((id, _)) = <IdSector as zerocopy::FromBytes>::read_from_prefix(&buf) else {
            return -1.0;
        };
        let meta = Os9Meta::from_id(&id, p.sector_size);
        let r = checker::score_parameters(&meta, p, store.sector_count());
        self.meta = meta;
        r
    }

    fn check_fat(&self, store: &mut dyn SectorStore, is_formatting: bool) -> Ratio {
        if is_formatting {
            return 1.0;
        }
        checker::score_bitmap(store, &self.meta)
    }

    fn check_directory(&self, store: &mut dyn SectorStore, is_formatting: bool) -> Ratio {
        if is_formatting {
            return 1.0;
        }
        checker::score_root(store, &self.meta)
    }

    fn load_map(&self, store: &mut dyn SectorStore) -> FsResult<AllocationMap> {
        let bits = checker::read_bitmap(store, &self.meta)?;
        ensure!(
            bits.len() == self.meta.map_bytes as usize,
            FsError::FatAreaInvalid
        );
        Ok(AllocationMap::Bitmap(AllocBitmap::new(
            bits,
            self.meta.clusters(),
            self.meta.system_groups(),
        )))
    }

    fn write_map(&self, store: &mut dyn SectorStore, map: &AllocationMap) -> FsResult {
        let AllocationMap::Bitmap(bm) = map else {
            bail!(FsError::FatAreaInvalid);
        };
        let ss = store.sector_size();
        let mut raw = vec![0u8; self.meta.map_sectors() as usize * ss];
        for (i, chunk) in raw.chunks_exact_mut(ss).enumerate() {
            store.read_sector(OS9_MAP_START + i as u32, chunk)?;
        }
        let n = bm.bytes().len().min(raw.len());
        raw[..n].copy_from_slice(&bm.bytes()[..n]);
        for (i, chunk) in raw.chunks_exact(ss).enumerate() {
            store.write_sector(OS9_MAP_START + i as u32, chunk)?;
        }
        Ok(())
    }

    fn sectors_per_group(&self) -> u32 {
        self.spb()
    }

    fn group_bytes(&self) -> usize {
        self.spb() as usize * self.sector_size()
    }

    fn start_sector_of_group(&self, group: u32) -> u32 {
        group * self.spb()
    }

    fn data_start_sector(&self) -> u32 {
        self.meta.system_groups() * self.spb()
    }

    /// `New` takes one cluster for the descriptor; the sectors left in that
    /// cluster hold the first data sectors before more clusters are taken.
    fn allocate_groups(
        &self,
        map: &mut AllocationMap,
        bytes: u64,
        mode: AllocMode,
        tail: Option<&GroupChain>,
    ) -> FsResult<GroupChain> {
        let ss = self.sector_size() as u64;
        let spb = self.spb();
        let mut chain = GroupChain::new(self.sector_size());
        let sectors = bytes.div_ceil(ss.max(1));
        ensure!(sectors <= self.meta.total_sectors as u64, FsError::DiskFull);
        let sectors = sectors as u32;

        match mode {
            AllocMode::New => {
                let in_fd_cluster = sectors.min(spb - 1);
                let extra = (sectors - in_fd_cluster).div_ceil(spb);
                let groups = map.take_free(1 + extra)?;
                let fd_lsn = groups[0] * spb;
                chain.descriptor = Some(fd_lsn);
                if in_fd_cluster > 0 {
                    chain.push(GroupItem {
                        group: groups[0],
                        next_group: BITMAP_EOC,
                        sector_start: fd_lsn + 1,
                        sector_end: fd_lsn + in_fd_cluster,
                    });
                }
                for &g in &groups[1..] {
                    chain.push(self.cluster_item(g, BITMAP_EOC));
                }
            }
            AllocMode::Append => {
                let count = sectors.div_ceil(spb);
                if count > 0 {
                    for g in map.take_free(count)? {
                        chain.push(self.cluster_item(g, BITMAP_EOC));
                    }
                }
                chain.descriptor = tail.and_then(|t| t.descriptor);
            }
        }

        let mut linked = GroupChain::new(self.sector_size());
        linked.descriptor = chain.descriptor;
        for (i, item) in chain.items().iter().enumerate() {
            let next = chain.items().get(i + 1).map_or(BITMAP_EOC, |n| n.group);
            linked.push(GroupItem {
                next_group: next,
                ..*item
            });
        }

        let runs = match (mode, tail) {
            (AllocMode::Append, Some(t)) => {
                let mut all = t.clone();
                all.append(linked.clone());
                all.runs().len()
            }
            _ => linked.runs().len(),
        };
        if runs > OS9_SEGMENTS {
            // an appended extent never owns the descriptor of its tail
            let taken = match mode {
                AllocMode::New => self.owned_groups(&linked),
                AllocMode::Append => linked.groups(),
            };
            map.release(&taken);
            bail!(FsAllocError::TooFragmented);
        }
        Ok(linked)
    }

    fn owned_groups(&self, chain: &GroupChain) -> Vec<u32> {
        let mut out = Vec::with_capacity(chain.len() + 1);
        if let Some(fd) = chain.descriptor {
            out.push(fd / self.spb());
        }
        for g in chain.groups() {
            if !out.contains(&g) {
                out.push(g);
            }
        }
        out
    }

    fn file_chain(
        &self,
        store: &mut dyn SectorStore,
        _map: &AllocationMap,
        entry: &DirectoryEntry,
    ) -> FsResult<GroupChain> {
        let fd_lsn = entry.start_group;
        let fd = self.read_fd(store, fd_lsn)?;
        let spb = self.spb();
        let mut chain = GroupChain::new(self.sector_size());
        chain.descriptor = Some(fd_lsn);
        for seg in fd.extents() {
            let (start, end) = (seg.start(), seg.start() + seg.sectors() - 1);
            ensure!(end < self.meta.total_sectors, FsAllocError::InvalidGroup(end / spb));
            let mut s = start;
            while s <= end {
                let g = s / spb;
                let e = end.min(g * spb + spb - 1);
                chain.push(GroupItem {
                    group: g,
                    next_group: BITMAP_EOC,
                    sector_start: s,
                    sector_end: e,
                });
                s = e + 1;
            }
        }
        let mut linked = GroupChain::new(self.sector_size());
        linked.descriptor = chain.descriptor;
        let items = chain.items();
        for (i, item) in items.iter().enumerate() {
            linked.push(GroupItem {
                next_group: items.get(i + 1).map_or(BITMAP_EOC, |n| n.group),
                ..*item
            });
        }
        Ok(linked)
    }

    fn calc_disk_free_size(&mut self, map: &AllocationMap, wrote: bool) -> FreeSpace {
        if let (false, Some(cached)) = (wrote, self.free_cache) {
            return cached;
        }
        let f = FreeSpace {
            free_groups: map.free_count(),
            total_groups: self.meta.clusters(),
            group_bytes: self.group_bytes(),
        };
        self.free_cache = Some(f);
        f
    }

    fn root_entry(&self, store: &mut dyn SectorStore) -> FsResult<DirectoryEntry> {
        let fd = self.read_fd(store, self.meta.root_fd)?;
        ensure!(
            Os9Attr::from_bits_truncate(fd.attr).contains(Os9Attr::DIR),
            FsError::DirectoryAreaInvalid
        );
        Ok(self.entry_from_fd(String::new(), self.meta.root_fd, &fd, &[]))
    }

    fn root_chain(
        &self,
        store: &mut dyn SectorStore,
        map: &AllocationMap,
        root: &DirectoryEntry,
    ) -> FsResult<GroupChain> {
        self.file_chain(store, map, root)
    }

    fn directory_bounds(&self, dir: &DirectoryEntry, _is_root: bool) -> SlotBounds {
        SlotBounds {
            max_slots: None,
            live_slots: Some((dir.size / OS9_SLOT_SIZE as u64) as usize),
        }
    }

    fn encode_slot(&self, entry: &DirectoryEntry, raw: &mut [u8]) {
        entries::encode_slot(&entry.name, entry.start_group, raw);
    }

    fn delete_slot(&self, raw: &mut [u8]) {
        raw[0] = self.params.delete_code;
    }

    fn can_expand_directory(&self, _dir: &DirectoryEntry, _is_root: bool) -> bool {
        true
    }

    fn additional_process_on_made_directory(
        &self,
        store: &mut dyn SectorStore,
        dir: &mut DirectoryEntry,
        chain: &GroupChain,
        parent: Option<&DirectoryEntry>,
    ) -> FsResult {
        let own = chain.descriptor.ok_or(FsError::DirectoryAreaInvalid)?;
        let parent_fd = parent.map_or(self.meta.root_fd, |p| p.start_group);
        self.write_dir_head(store, chain, parent_fd, own)?;
        dir.start_group = own;
        dir.size = OS9_DIR_MIN_SIZE;
        let fd = self.build_fd(dir, chain)?;
        self.write_fd(store, own, &fd)?;
        *dir = self.entry_from_fd(dir.name.clone(), own, &fd, &dir.raw);
        Ok(())
    }

    fn additional_process_on_expanded_directory(
        &self,
        store: &mut dyn SectorStore,
        dir: &mut DirectoryEntry,
        chain: &GroupChain,
    ) -> FsResult {
        let mut fd = self.read_fd(store, dir.start_group)?;
        fd.set_segments(chain)?;
        self.write_fd(store, dir.start_group, &fd)
    }

    /// Grows the directory's recorded size to cover the written slot.
    fn on_slot_written(
        &self,
        store: &mut dyn SectorStore,
        dir: &mut DirectoryEntry,
        slot_index: usize,
    ) -> FsResult {
        let needed = ((slot_index + 1) * OS9_SLOT_SIZE) as u64;
        if dir.size >= needed {
            return Ok(());
        }
        let mut fd = self.read_fd(store, dir.start_group)?;
        fd.size = U32::new(needed as u32);
        self.write_fd(store, dir.start_group, &fd)?;
        dir.size = needed;
        Ok(())
    }

    fn post_save(
        &self,
        store: &mut dyn SectorStore,
        entry: &mut DirectoryEntry,
        chain: &GroupChain,
    ) -> FsResult {
        let fd_lsn = chain.descriptor.ok_or(FsError::DirectoryAreaInvalid)?;
        entry.start_group = fd_lsn;
        let fd = self.build_fd(entry, chain)?;
        self.write_fd(store, fd_lsn, &fd)?;
        *entry = self.entry_from_fd(entry.name.clone(), fd_lsn, &fd, &entry.raw);
        Ok(())
    }

    fn post_change_attributes(
        &self,
        store: &mut dyn SectorStore,
        entry: &DirectoryEntry,
        _chain: &GroupChain,
    ) -> FsResult {
        let mut fd = self.read_fd(store, entry.start_group)?;
        fd.attr = self.native_attr(entry);
        self.write_fd(store, entry.start_group, &fd)
    }

    fn fill_sector(&self, lsn: u32) -> u8 {
        if lsn < self.meta.root_fd {
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
        let m = &mut self.meta;
        m.created = time_utils::os9_pack(vol.created.unwrap_or_else(time_utils::now));
        m.disk_id = vol.volume_id.unwrap_or_else(generate_volume_id_32) as u16;
        m.name = [0; OS9_NAME_LEN];
        if let Some(label) = vol.label.as_deref().filter(|l| !l.is_empty()) {
            let enc = entries::encode_name(label);
            let n = enc.len().min(OS9_NAME_LEN);
            m.name[..n].copy_from_slice(&enc[..n]);
            m.name[n - 1] |= 0x80;
        }
        let mut buf = store.sector_buf();
        buf[..OS9_ID_SIZE].copy_from_slice(m.to_id().as_bytes());
        store.write_sector(OS9_ID_SECTOR, &buf)?;
        Ok(())
    }

    fn additional_process_on_formatted(
        &self,
        store: &mut dyn SectorStore,
        vol: &VolumeMeta,
    ) -> FsResult<AllocationMap> {
        let m = &self.meta;
        let clusters = m.clusters();
        let mut bits = vec![0u8; m.map_bytes as usize];
        bits.set_range(0, m.system_groups() as usize, true);
        // bits past the last cluster never free
        let pad = bits.len() * 8 - clusters as usize;
        bits.set_range(clusters as usize, pad, true);
        let mut map = AllocationMap::Bitmap(AllocBitmap::new(bits, clusters, m.system_groups()));

        let bytes = self.params.subdir_groups as u64 * self.group_bytes() as u64;
        let chain = self.allocate_groups(&mut map, bytes, AllocMode::New, None)?;
        ensure!(
            chain.descriptor == Some(m.root_fd),
            FsError::DirectoryAreaInvalid
        );
        self.initialize_sectors_as_directory(store, &chain)?;
        self.write_dir_head(store, &chain, m.root_fd, m.root_fd)?;

        let mut root = DirectoryEntry::new_file("", "", FileAttr::DIRECTORY);
        root.size = OS9_DIR_MIN_SIZE;
        root.modified = vol.created;
        let mut fd = self.build_fd(&root, &chain)?;
        fd.attr = (Os9Attr::all() - Os9Attr::SHARE).bits();
        self.write_fd(store, m.root_fd, &fd)?;
        Ok(map)
    }

    fn volume_label(&self, _store: &mut dyn SectorStore) -> Option<String> {
        self.meta.label()
    }

    fn check_extra(&self, _store: &mut dyn SectorStore, map: &AllocationMap, rep: &mut Report) {
        if let AllocationMap::Bitmap(bm) = map {
            let clusters = self.meta.clusters() as usize;
            let tail = bm.bytes().len() * 8;
            if clusters < tail && bm.bytes().count_ones_in_range(clusters, tail) != tail - clusters {
                rep.warn("MAP.PAD", "bitmap bits past the last cluster are not all set");
            }
        }
        if self.meta.total_sectors % self.spb() != 0 {
            rep.info(
                "LSN0.TOT",
                format!(
                    "{} trailing sector(s) outside any cluster",
                    self.meta.total_sectors % self.spb()
                ),
            );
        }
    }
}
