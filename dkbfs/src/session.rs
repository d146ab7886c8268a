// SPDX-License-Identifier: MIT

//! Mounted-volume session: detection, allocation and directory upkeep
//! behind one file-level API.

use std::io::{Read, Write};
use std::sync::Arc;

use dkbio::sector::SectorStore;

use crate::core::{
    alloc_map::{AllocMode, AllocationMap, GroupState},
    attr::FileAttr,
    chain::GroupChain,
    entry::{DirectoryEntry, SlotPos},
    error::*,
    params::{FormatParameters, TemplateTable},
    report::Report,
    tree::{DirectoryTree, NodeId, SlotCodec},
    utils::{
        path_utils::{is_absolute, join_name_ext, split_path},
        time_utils,
    },
};
use crate::driver::{Driver, FreeSpace, VolumeMeta};

/// Combined detection ratio a candidate needs to be accepted.
pub const ACCEPT_RATIO: Ratio = 0.6;
/// Parameter ratio below which a candidate is dropped before the
/// FAT/directory checks.
pub const REJECT_RATIO: Ratio = 0.1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    #[default]
    Unassigned,
    Parsed,
    Assigned,
}

/// How file bytes are transformed between disk and caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoadMode {
    #[default]
    Binary,
    /// Trims at the template's text terminator on load, appends it on save.
    Text,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerifyOutcome {
    Match,
    /// First differing byte offset.
    Mismatch { offset: u64 },
    IoError(FsError),
}

impl VerifyOutcome {
    pub fn is_match(&self) -> bool {
        matches!(self, VerifyOutcome::Match)
    }

    pub fn into_result(self) -> FsResult {
        match self {
            VerifyOutcome::Match => Ok(()),
            VerifyOutcome::Mismatch { offset } => Err(FsError::VerifyMismatch { offset }),
            VerifyOutcome::IoError(e) => Err(e),
        }
    }
}

/// Allocation map and directory tree of an assigned volume.
#[derive(Debug)]
struct Mount {
    map: AllocationMap,
    tree: DirectoryTree,
}

impl Mount {
    /// Decodes the slots of `dir` unless already resolved.
    fn load_dir(&mut self, driver: &Driver, store: &mut dyn SectorStore, dir: NodeId) -> FsResult {
        if self.tree.is_valid(dir) {
            return Ok(());
        }
        let is_root = self.tree.is_root(dir);
        let entry = self.tree.entry(dir).clone();
        ensure!(is_root || entry.is_dir(), FsError::FileNotFound(entry.full_name()));
        let chain = if is_root {
            driver.root_chain(store, &self.map, &entry)?
        } else {
            driver.file_chain(store, &self.map, &entry)?
        };
        let bounds = driver.directory_bounds(&entry, is_root);
        self.tree.assign(&**driver, store, dir, chain, bounds)
    }

    /// Chain of `dir`, resolved on demand.
    fn dir_chain(&mut self, driver: &Driver, store: &mut dyn SectorStore, dir: NodeId) -> FsResult<GroupChain> {
        self.load_dir(driver, store, dir)?;
        self.tree
            .node(dir)
            .chain()
            .cloned()
            .ok_or(FsError::DirectoryAreaInvalid)
    }

    /// Free slot of `dir` and the slot after it, growing the directory once
    /// when the driver allows it.
    fn free_slot(
        &mut self,
        driver: &Driver,
        store: &mut dyn SectorStore,
        dir: NodeId,
    ) -> FsResult<(NodeId, Option<NodeId>)> {
        self.load_dir(driver, store, dir)?;
        if let Some(found) = self.tree.find_empty_slot(dir) {
            return Ok(found);
        }
        let entry = self.tree.entry(dir).clone();
        ensure!(
            driver.can_expand_directory(&entry, self.tree.is_root(dir)),
            FsError::DirectoryFull
        );
        log::debug!("directory {} full, expanding", self.tree.path(dir));
        self.expand(driver, store, dir)?;
        self.tree.find_empty_slot(dir).ok_or(FsError::DirectoryFull)
    }

    /// Moves the end marker to `next` when the slot being taken held it, so
    /// stale records behind the marker stay hidden.
    fn seal_after(
        &mut self,
        driver: &Driver,
        store: &mut dyn SectorStore,
        taken_raw: &[u8],
        next: Option<NodeId>,
    ) -> FsResult {
        let Some(next) = next else {
            return Ok(());
        };
        let node = self.tree.node(next);
        if !driver.is_end_slot(taken_raw) || driver.is_end_slot(&node.entry.raw) {
            return Ok(());
        }
        let pos = node.slot.ok_or(FsError::DirectoryAreaInvalid)?;
        let mut raw = node.entry.raw.clone();
        driver.mark_end_slot(&mut raw);
        write_slot(store, pos, &raw)?;
        self.tree.mark_unused(next, raw);
        Ok(())
    }

    /// Writes back slot bytes saved before a failed mutation.
    fn restore_slots(&mut self, store: &mut dyn SectorStore, saved: Vec<(NodeId, DirectoryEntry)>) {
        for (id, entry) in saved.into_iter().rev() {
            if let Some(pos) = self.tree.node(id).slot {
                let _ = write_slot(store, pos, &entry.raw);
            }
            if entry.used {
                self.tree.set_entry(id, entry);
            } else {
                self.tree.mark_unused(id, entry.raw);
            }
        }
    }

    /// Appends one default-sized extent to `dir`.
    fn expand(&mut self, driver: &Driver, store: &mut dyn SectorStore, dir: NodeId) -> FsResult {
        let chain = self.dir_chain(driver, store, dir)?;
        let snapshot = self.map.clone();
        let bytes = driver.params().subdir_groups as u64 * driver.group_bytes() as u64;
        let result = (|| -> FsResult<GroupChain> {
            let extent = driver.allocate_groups(&mut self.map, bytes, AllocMode::Append, Some(&chain))?;
            driver.initialize_sectors_as_directory(store, &extent)?;
            let mut full = chain.clone();
            full.append(extent.clone());
            let mut entry = self.tree.entry(dir).clone();
            driver.additional_process_on_expanded_directory(store, &mut entry, &full)?;
            driver.write_map(store, &self.map)?;
            self.tree.set_entry(dir, entry);
            Ok(extent)
        })();
        match result {
            Ok(extent) => self.tree.extend(&**driver, store, dir, extent),
            Err(e) => {
                self.map = snapshot;
                let _ = driver.write_map(store, &self.map);
                Err(e)
            }
        }
    }

    fn slot_index(&self, dir: NodeId, slot: NodeId) -> usize {
        self.tree
            .children(dir)
            .iter()
            .position(|&c| c == slot)
            .unwrap_or_default()
    }

    /// Encodes and writes `entry` into `slot`, then lets the driver update
    /// the owning directory.
    fn store_entry(
        &mut self,
        driver: &Driver,
        store: &mut dyn SectorStore,
        dir: NodeId,
        slot: NodeId,
        entry: &mut DirectoryEntry,
        fresh: bool,
    ) -> FsResult {
        let pos = self.tree.node(slot).slot.ok_or(FsError::DirectoryAreaInvalid)?;
        let mut raw = if fresh {
            vec![0u8; driver.slot_size()]
        } else {
            entry.raw.clone()
        };
        raw.resize(driver.slot_size(), 0);
        driver.encode_slot(entry, &mut raw);
        write_slot(store, pos, &raw)?;
        entry.raw = raw;
        let index = self.slot_index(dir, slot);
        let mut dir_entry = self.tree.entry(dir).clone();
        driver.on_slot_written(store, &mut dir_entry, index)?;
        self.tree.set_entry(dir, dir_entry);
        Ok(())
    }

    /// Children before parents, for recursive deletion.
    fn subtree_post_order(&mut self, driver: &Driver, store: &mut dyn SectorStore, id: NodeId) -> FsResult<Vec<NodeId>> {
        let mut order = Vec::new();
        let mut stack = vec![(id, false)];
        while let Some((n, visited)) = stack.pop() {
            if visited || !self.tree.entry(n).is_dir() {
                order.push(n);
                continue;
            }
            self.load_dir(driver, store, n)?;
            stack.push((n, true));
            stack.extend(self.tree.listing(n).into_iter().map(|c| (c, false)));
        }
        Ok(order)
    }
}

fn write_slot(store: &mut dyn SectorStore, pos: SlotPos, raw: &[u8]) -> FsResult {
    let mut buf = store.sector_buf();
    store.read_sector(pos.lsn, &mut buf)?;
    let off = pos.offset as usize;
    let dst = buf
        .get_mut(off..off + raw.len())
        .ok_or(FsError::InvalidSector(pos.lsn))?;
    dst.copy_from_slice(raw);
    store.write_sector(pos.lsn, &buf)?;
    Ok(())
}

fn write_data(store: &mut dyn SectorStore, chain: &GroupChain, data: &[u8], inverted: bool) -> FsResult {
    let ss = store.sector_size();
    let mut buf = store.sector_buf();
    for (i, lsn) in chain.sectors().enumerate() {
        buf.fill(0);
        let off = i * ss;
        if off < data.len() {
            let n = (data.len() - off).min(ss);
            buf[..n].copy_from_slice(&data[off..off + n]);
            if inverted {
                buf[..n].iter_mut().for_each(|b| *b = !*b);
            }
        }
        store.write_sector(lsn, &buf)?;
    }
    Ok(())
}

fn read_data(store: &mut dyn SectorStore, chain: &GroupChain, size: u64, inverted: bool) -> FsResult<Vec<u8>> {
    let mut out = Vec::with_capacity(size.min(chain.byte_size()) as usize);
    let mut buf = store.sector_buf();
    for lsn in chain.sectors() {
        let left = size - out.len() as u64;
        if left == 0 {
            break;
        }
        store.read_sector(lsn, &mut buf)?;
        let n = (left as usize).min(buf.len());
        out.extend_from_slice(&buf[..n]);
    }
    if (out.len() as u64) < size {
        log::warn!("chain holds {} of {size} bytes", out.len());
    }
    if inverted {
        out.iter_mut().for_each(|b| *b = !*b);
    }
    Ok(out)
}

fn trim_text(data: &mut Vec<u8>, terminator: Option<u8>) {
    if let Some(p) = terminator.and_then(|t| data.iter().position(|&b| b == t)) {
        data.truncate(p);
    }
}

/// One partition under one format driver.
///
/// States run `Unassigned -> Parsed -> Assigned`; every file operation
/// needs `Assigned`.
pub struct FilesystemSession<S: SectorStore> {
    store: S,
    templates: Arc<TemplateTable>,
    driver: Option<Driver>,
    mount: Option<Mount>,
    score: Ratio,
    report: Report,
}

impl<S: SectorStore> FilesystemSession<S> {
    pub fn new(store: S, templates: impl Into<Arc<TemplateTable>>) -> Self {
        Self {
            store,
            templates: templates.into(),
            driver: None,
            mount: None,
            score: 0.0,
            report: Report::default(),
        }
    }

    /// Parses and assigns in one step.
    pub fn open(store: S, templates: impl Into<Arc<TemplateTable>>, hint: Option<&str>) -> FsResult<Self> {
        let mut s = Self::new(store, templates);
        s.parse_disk(hint)?;
        s.assign_fat_and_directory()?;
        Ok(s)
    }

    pub fn state(&self) -> SessionState {
        match (&self.driver, &self.mount) {
            (None, _) => SessionState::Unassigned,
            (Some(_), None) => SessionState::Parsed,
            (Some(_), Some(_)) => SessionState::Assigned,
        }
    }

    /// Combined ratio of the accepted candidate.
    #[inline]
    pub fn score(&self) -> Ratio {
        self.score
    }

    #[inline]
    pub fn report(&self) -> &Report {
        &self.report
    }

    pub fn take_report(&mut self) -> Report {
        std::mem::take(&mut self.report)
    }

    #[inline]
    pub fn store(&self) -> &S {
        &self.store
    }

    #[inline]
    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    pub fn into_store(self) -> S {
        self.store
    }

    pub fn templates(&self) -> &TemplateTable {
        &self.templates
    }

    pub fn driver(&self) -> Option<&Driver> {
        self.driver.as_ref()
    }

    pub fn params(&self) -> Option<&Arc<FormatParameters>> {
        self.driver.as_ref().map(|d| d.params())
    }

    pub fn map(&self) -> FsResult<&AllocationMap> {
        self.mount.as_ref().map(|m| &m.map).ok_or(FsError::NotAssigned)
    }

    pub fn tree(&self) -> FsResult<&DirectoryTree> {
        self.mount.as_ref().map(|m| &m.tree).ok_or(FsError::NotAssigned)
    }

    pub fn entry(&self, id: NodeId) -> FsResult<&DirectoryEntry> {
        self.tree()?.get(id).ok_or(FsError::FileNotFound(format!("#{id}")))
    }

    fn parts(&mut self) -> FsResult<(&mut S, &mut Driver, &mut Mount)> {
        match (self.driver.as_mut(), self.mount.as_mut()) {
            (Some(d), Some(m)) => Ok((&mut self.store, d, m)),
            _ => Err(FsError::NotAssigned),
        }
    }

    fn ensure_writable(&self) -> FsResult {
        ensure!(!self.store.is_write_protected(), FsError::WriteProtected);
        Ok(())
    }

    // === Detection ===

    /// Scores every candidate template and keeps the best one.
    ///
    /// Ties keep the earlier template in table order.
    pub fn parse_disk(&mut self, hint: Option<&str>) -> FsResult<Ratio> {
        self.clear_parse_and_assign();
        let candidates = self.templates.candidates(hint);
        if candidates.is_empty() {
            self.report.err("PARSE.NONE", format!("no template matches hint {hint:?}"));
            bail!(FsError::Unsupported);
        }

        let mut best: Option<(Ratio, Driver)> = None;
        let mut param_rejects = 0usize;
        for params in &candidates {
            let mut driver = Driver::new(params.clone());
            let rp = driver.parse_parameters(&mut self.store, false);
            if rp < REJECT_RATIO {
                log::debug!("{}: parameter ratio {rp:.2}, rejected", params.name);
                self.report
                    .info("PARSE.PARAM", format!("{}: parameter area rejected ({rp:.2})", params.name));
                param_rejects += 1;
                continue;
            }
            let driver = driver.settle();
            let rf = driver.check_fat(&mut self.store, false);
            let rd = driver.check_directory(&mut self.store, false);
            if rf < 0.0 || rd < 0.0 {
                log::debug!("{}: fat {rf:.2} dir {rd:.2}, rejected", params.name);
                self.report.info(
                    "PARSE.AREA",
                    format!("{}: allocation/directory area rejected ({rf:.2}/{rd:.2})", params.name),
                );
                continue;
            }
            let score = (rp + rf + rd) / 3.0;
            log::debug!(
                "{} ({}): param {rp:.2} fat {rf:.2} dir {rd:.2} -> {score:.3}",
                params.name,
                driver.name()
            );
            if best.as_ref().is_none_or(|(b, _)| score > *b) {
                best = Some((score, driver));
            }
        }

        match best {
            Some((score, driver)) if score >= ACCEPT_RATIO => {
                log::debug!("accepted {} with {score:.3}", driver.params().name);
                self.score = score;
                self.driver = Some(driver);
                Ok(score)
            }
            Some((score, driver)) => {
                self.report.err(
                    "PARSE.LOW",
                    format!("best match {} scored {score:.2}", driver.params().name),
                );
                bail!(FsError::Unsupported)
            }
            None if param_rejects == candidates.len() => {
                self.report.err("PARSE.NOFMT", "no parameter area recognized");
                bail!(FsError::NotFormatted)
            }
            None => {
                self.report.err("PARSE.UNSUP", "no template accepted the disk");
                bail!(FsError::Unsupported)
            }
        }
    }

    /// Binds the allocation map and resolves the root directory.
    pub fn assign_fat_and_directory(&mut self) -> FsResult {
        let driver = self.driver.as_mut().ok_or(FsError::NotAssigned)?;
        let store = &mut self.store;
        let map = driver.load_map(store)?;
        let root = driver.root_entry(store)?;
        let mut mount = Mount {
            map,
            tree: DirectoryTree::new(root),
        };
        let root_id = mount.tree.root();
        mount.load_dir(driver, store, root_id)?;
        driver.calc_disk_free_size(&mount.map, true);
        self.mount = Some(mount);
        Ok(())
    }

    pub fn clear_parse_and_assign(&mut self) {
        self.driver = None;
        self.mount = None;
        self.score = 0.0;
    }

    // === Navigation ===

    /// Used entries of the current directory, aliases and labels excluded.
    pub fn list(&mut self) -> FsResult<Vec<NodeId>> {
        let (store, driver, m) = self.parts()?;
        let cur = m.tree.current();
        m.load_dir(driver, store, cur)?;
        Ok(m.tree.listing(cur))
    }

    pub fn list_dir(&mut self, dir: NodeId) -> FsResult<Vec<NodeId>> {
        let (store, driver, m) = self.parts()?;
        let dir = m.tree.resolve(dir);
        m.load_dir(driver, store, dir)?;
        Ok(m.tree.listing(dir))
    }

    pub fn current(&self) -> FsResult<NodeId> {
        Ok(self.tree()?.current())
    }

    pub fn change_directory(&mut self, target: NodeId) -> FsResult {
        let (store, driver, m) = self.parts()?;
        let real = m.tree.resolve(target);
        m.tree.change(real)?;
        m.load_dir(driver, store, real)
    }

    /// `/A/B` from the root, `A/B` from the current directory; `..` allowed.
    pub fn change_directory_path(&mut self, path: &str) -> FsResult {
        let id = self.find_path(path)?;
        self.change_directory(id)
    }

    /// Entry named `name` in the current directory.
    pub fn find(&mut self, name: &str) -> FsResult<NodeId> {
        let dir = self.current()?;
        self.find_in(dir, name)
    }

    pub fn find_in(&mut self, dir: NodeId, name: &str) -> FsResult<NodeId> {
        let (store, driver, m) = self.parts()?;
        m.load_dir(driver, store, dir)?;
        if name == "." {
            return Ok(dir);
        }
        if name == ".." {
            return Ok(m.tree.parent(dir).unwrap_or(m.tree.root()));
        }
        let ci = driver.params().name_rule.case_insensitive;
        m.tree
            .find_file(dir, name, ci, None)
            .map(|(id, _)| id)
            .ok_or_else(|| FsError::FileNotFound(name.to_string()))
    }

    pub fn find_path(&mut self, path: &str) -> FsResult<NodeId> {
        let tree = self.tree()?;
        let mut cur = if is_absolute(path) {
            tree.root()
        } else {
            tree.current()
        };
        for part in split_path(path) {
            let dir = self.tree()?.resolve(cur);
            let e = self.entry(dir)?;
            ensure!(
                self.tree()?.is_root(dir) || e.is_dir(),
                FsError::FileNotFound(path.to_string())
            );
            let found = self.find_in(dir, part)?;
            cur = self.tree()?.resolve(found);
        }
        Ok(cur)
    }

    pub fn path_of(&self, id: NodeId) -> FsResult<String> {
        Ok(self.tree()?.path(id))
    }

    /// Occupied size of a directory's slot area.
    pub fn directory_size(&mut self, dir: NodeId) -> FsResult<u64> {
        let (store, driver, m) = self.parts()?;
        let dir = m.tree.resolve(dir);
        m.load_dir(driver, store, dir)?;
        Ok(m.tree.calc_size(dir, driver.slot_size()))
    }

    // === Files ===

    /// Streams the contents of `id` into `sink`; returns the bytes written.
    pub fn load(&mut self, id: NodeId, sink: &mut impl Write, mode: LoadMode) -> FsResult<u64> {
        let data = self.read_file(id, mode)?;
        sink.write_all(&data)?;
        Ok(data.len() as u64)
    }

    /// Contents of `id` after the load transforms.
    pub fn read_file(&mut self, id: NodeId, mode: LoadMode) -> FsResult<Vec<u8>> {
        let (store, driver, m) = self.parts()?;
        let entry = m.tree.entry(id).clone();
        ensure!(
            entry.used && !entry.is_dir() && !entry.is_volume_label(),
            FsError::FileNotFound(entry.full_name())
        );
        let params = driver.params().clone();
        let chain = driver.file_chain(store, &m.map, &entry)?;
        let mut data = read_data(store, &chain, entry.size, params.data_inverted)?;
        if mode == LoadMode::Text {
            trim_text(&mut data, params.text_terminator);
        }
        Ok(data)
    }

    /// Compares `id` against `source` with the same transforms as `load`.
    pub fn verify(&mut self, id: NodeId, source: &mut impl Read, mode: LoadMode) -> VerifyOutcome {
        let disk = match self.read_file(id, mode) {
            Ok(d) => d,
            Err(e) => return VerifyOutcome::IoError(e),
        };
        let mut expected = Vec::new();
        if let Err(e) = source.read_to_end(&mut expected) {
            return VerifyOutcome::IoError(e.into());
        }
        if mode == LoadMode::Text {
            trim_text(&mut expected, self.params().and_then(|p| p.text_terminator));
        }
        match disk.iter().zip(&expected).position(|(a, b)| a != b) {
            Some(p) => VerifyOutcome::Mismatch { offset: p as u64 },
            None if disk.len() != expected.len() => VerifyOutcome::Mismatch {
                offset: disk.len().min(expected.len()) as u64,
            },
            None => VerifyOutcome::Match,
        }
    }

    /// Writes `source` as a new file in the current directory, named and
    /// attributed after `template`.
    ///
    /// On failure the map and the chosen slot are put back as they were.
    pub fn save(&mut self, source: &mut impl Read, template: &DirectoryEntry, mode: LoadMode) -> FsResult<NodeId> {
        self.ensure_writable()?;
        let mut data = Vec::new();
        source.read_to_end(&mut data)?;

        let (store, driver, m) = self.parts()?;
        let params = driver.params().clone();
        if mode == LoadMode::Text {
            if let Some(t) = params.text_terminator {
                if data.last() != Some(&t) {
                    data.push(t);
                }
            }
        }

        let dir = m.tree.current();
        m.load_dir(driver, store, dir)?;
        let rule = &params.name_rule;
        let (base, ext) = rule.validate(&template.full_name())?;
        let full = join_name_ext(&base, &ext);
        if m.tree.find_file(dir, &full, rule.case_insensitive, None).is_some() {
            bail!(FsError::FileAlreadyExists(full));
        }

        let mut entry = template.clone();
        entry.used = true;
        entry.name = base;
        entry.ext = ext;
        entry.attr -= FileAttr::DIRECTORY | FileAttr::VOLUME;
        if entry.attr.is_empty() {
            entry.attr = params.ext_attr(&entry.ext).unwrap_or(FileAttr::ARCHIVE);
        }
        entry.size = data.len() as u64;
        entry.modified.get_or_insert_with(time_utils::now);
        driver.pre_save(&mut entry)?;

        let (slot, next) = m.free_slot(driver, store, dir)?;
        let original = m.tree.entry(slot).clone();
        let saved_next = next.map(|n| (n, m.tree.entry(n).clone()));
        let snapshot = m.map.clone();

        let result = (|| -> FsResult {
            let chain = driver.allocate_groups(&mut m.map, entry.size, AllocMode::New, None)?;
            write_data(store, &chain, &data, params.data_inverted)?;
            entry.start_group = chain.descriptor.or(chain.first_group()).unwrap_or(0);
            driver.post_save(store, &mut entry, &chain)?;
            m.seal_after(driver, store, &original.raw, next)?;
            m.store_entry(driver, store, dir, slot, &mut entry, true)?;
            driver.write_map(store, &m.map)
        })();

        match result {
            Ok(()) => {
                log::debug!("saved {} ({} bytes)", entry.full_name(), entry.size);
                m.tree.set_entry(slot, entry);
                driver.calc_disk_free_size(&m.map, true);
                Ok(slot)
            }
            Err(e) => {
                log::warn!("save of {full} failed, rolling back: {e}");
                m.map = snapshot;
                let _ = driver.write_map(store, &m.map);
                m.restore_slots(store, [(slot, original)].into_iter().chain(saved_next).collect());
                driver.calc_disk_free_size(&m.map, true);
                Err(e)
            }
        }
    }

    /// `save` from a byte slice with default attributes.
    pub fn save_bytes(&mut self, name: &str, data: &[u8], mode: LoadMode) -> FsResult<NodeId> {
        let (base, ext) = crate::core::utils::path_utils::split_name_ext(name);
        let template = DirectoryEntry::new_file(base, ext, FileAttr::empty());
        self.save(&mut &data[..], &template, mode)
    }

    /// Deletes `id`; directories go with everything below them.
    pub fn delete(&mut self, id: NodeId) -> FsResult {
        self.ensure_writable()?;
        let (store, driver, m) = self.parts()?;
        let entry = m.tree.entry(id).clone();
        ensure!(entry.used, FsError::FileNotFound(entry.full_name()));
        ensure!(
            !m.tree.is_root(id) && !entry.is_alias(),
            FsError::NotDeletable(entry.full_name())
        );

        let order = m.subtree_post_order(driver, store, id)?;
        for &n in &order {
            let e = m.tree.entry(n);
            ensure!(
                !e.attr.contains(FileAttr::READ_ONLY),
                FsError::NotDeletable(e.full_name())
            );
            driver.pre_delete(e)?;
        }

        let snapshot = m.map.clone();
        let mut touched = Vec::with_capacity(order.len());
        let result = (|| -> FsResult {
            for n in order {
                let e = m.tree.entry(n).clone();
                if !e.is_volume_label() {
                    let chain = driver.file_chain(store, &m.map, &e)?;
                    driver.delete_groups(&mut m.map, &chain);
                }
                let pos = m.tree.node(n).slot.ok_or(FsError::DirectoryAreaInvalid)?;
                let mut raw = e.raw.clone();
                driver.delete_slot(&mut raw);
                touched.push((n, e.clone()));
                write_slot(store, pos, &raw)?;
                m.tree.mark_unused(n, raw);
                driver.post_delete(store, &e)?;
                log::trace!("deleted {}", e.full_name());
            }
            driver.write_map(store, &m.map)
        })();

        if let Err(e) = result {
            log::warn!("delete of {} failed, rolling back: {e}", entry.full_name());
            m.map = snapshot;
            let _ = driver.write_map(store, &m.map);
            m.restore_slots(store, touched);
            driver.calc_disk_free_size(&m.map, true);
            return Err(e);
        }
        driver.calc_disk_free_size(&m.map, true);
        Ok(())
    }

    /// Renames `id` in place; the name must be free in its directory.
    pub fn rename(&mut self, id: NodeId, new_name: &str) -> FsResult {
        self.ensure_writable()?;
        let (store, driver, m) = self.parts()?;
        let entry = m.tree.entry(id).clone();
        ensure!(
            entry.used && !m.tree.is_root(id) && !entry.is_alias() && !entry.is_volume_label(),
            FsError::NotRenameable(entry.full_name())
        );
        let dir = m.tree.parent(id).unwrap_or(m.tree.root());
        let rule = &driver.params().name_rule;
        let (base, ext) = rule.validate(new_name)?;
        let full = join_name_ext(&base, &ext);
        if m.tree.find_file(dir, &full, rule.case_insensitive, Some(id)).is_some() {
            bail!(FsError::FileAlreadyExists(full));
        }
        driver.pre_rename(&entry, &full)?;

        let mut renamed = entry.clone();
        renamed.name = base;
        renamed.ext = ext;
        let result = m
            .store_entry(driver, store, dir, id, &mut renamed, false)
            .and_then(|()| driver.post_rename(store, &renamed));
        if let Err(e) = result {
            log::warn!("rename of {} failed, rolling back: {e}", entry.full_name());
            m.restore_slots(store, vec![(id, entry)]);
            return Err(e);
        }
        m.tree.set_entry(id, renamed);
        Ok(())
    }

    /// Replaces the attributes of `id`; the directory bit is kept.
    pub fn change_attributes(&mut self, id: NodeId, attr: FileAttr) -> FsResult {
        self.ensure_writable()?;
        let (store, driver, m) = self.parts()?;
        let mut entry = m.tree.entry(id).clone();
        ensure!(
            entry.used && !m.tree.is_root(id) && !entry.is_alias(),
            FsError::FileNotFound(entry.full_name())
        );
        let fixed = FileAttr::DIRECTORY | FileAttr::VOLUME;
        entry.attr = (attr - fixed) | (entry.attr & fixed);
        let dir = m.tree.parent(id).unwrap_or(m.tree.root());
        m.store_entry(driver, store, dir, id, &mut entry, false)?;
        let chain = if entry.is_dir() {
            m.dir_chain(driver, store, id)?
        } else {
            driver.file_chain(store, &m.map, &entry)?
        };
        driver.post_change_attributes(store, &entry, &chain)?;
        m.tree.set_entry(id, entry);
        Ok(())
    }

    // === Directories ===

    /// Creates `name` in the current directory with its `.`/`..` records.
    pub fn make_directory(&mut self, name: &str) -> FsResult<NodeId> {
        self.ensure_writable()?;
        let (store, driver, m) = self.parts()?;
        let params = driver.params().clone();
        let dir = m.tree.current();
        m.load_dir(driver, store, dir)?;
        let rule = &params.name_rule;
        let (base, ext) = rule.validate(name)?;
        let full = join_name_ext(&base, &ext);
        if m.tree.find_file(dir, &full, rule.case_insensitive, None).is_some() {
            bail!(FsError::FileAlreadyExists(full));
        }

        let (slot, next) = m.free_slot(driver, store, dir)?;
        let original = m.tree.entry(slot).clone();
        let saved_next = next.map(|n| (n, m.tree.entry(n).clone()));
        let parent = (!m.tree.is_root(dir)).then(|| m.tree.entry(dir).clone());
        let snapshot = m.map.clone();

        let mut entry = DirectoryEntry::new_file(&base, &ext, FileAttr::DIRECTORY);
        entry.modified = Some(time_utils::now());
        let bytes = params.subdir_groups as u64 * driver.group_bytes() as u64;

        let result = (|| -> FsResult<GroupChain> {
            let chain = driver.allocate_groups(&mut m.map, bytes, AllocMode::New, None)?;
            driver.initialize_sectors_as_directory(store, &chain)?;
            entry.start_group = chain.descriptor.or(chain.first_group()).unwrap_or(0);
            driver.additional_process_on_made_directory(store, &mut entry, &chain, parent.as_ref())?;
            m.seal_after(driver, store, &original.raw, next)?;
            m.store_entry(driver, store, dir, slot, &mut entry, true)?;
            driver.write_map(store, &m.map)?;
            Ok(chain)
        })();

        match result {
            Ok(chain) => {
                let bounds = driver.directory_bounds(&entry, false);
                m.tree.set_entry(slot, entry);
                m.tree.assign(&**driver, store, slot, chain, bounds)?;
                driver.calc_disk_free_size(&m.map, true);
                log::debug!("made directory {full}");
                Ok(slot)
            }
            Err(e) => {
                log::warn!("mkdir {full} failed, rolling back: {e}");
                m.map = snapshot;
                let _ = driver.write_map(store, &m.map);
                m.restore_slots(store, [(slot, original)].into_iter().chain(saved_next).collect());
                driver.calc_disk_free_size(&m.map, true);
                Err(e)
            }
        }
    }

    /// Grows an existing directory by one default extent.
    pub fn expand_directory(&mut self, id: NodeId) -> FsResult {
        self.ensure_writable()?;
        let (store, driver, m) = self.parts()?;
        let dir = m.tree.resolve(id);
        let entry = m.tree.entry(dir).clone();
        let is_root = m.tree.is_root(dir);
        ensure!(is_root || entry.is_dir(), FsError::FileNotFound(entry.full_name()));
        ensure!(driver.can_expand_directory(&entry, is_root), FsError::DirectoryFull);
        m.expand(driver, store, dir)?;
        driver.calc_disk_free_size(&m.map, true);
        Ok(())
    }

    // === Volume ===

    /// Formats with the current template.
    pub fn format(&mut self, vol: &VolumeMeta) -> FsResult {
        let params = self.params().cloned().ok_or(FsError::NotAssigned)?;
        self.format_with(params, vol)
    }

    pub fn format_template(&mut self, name: &str, vol: &VolumeMeta) -> FsResult {
        let params = self
            .templates
            .get(name)
            .ok_or_else(|| FsError::Template(format!("unknown template {name}")))?;
        self.format_with(params, vol)
    }

    /// Fills every sector, lays the volume structures and mounts the result.
    pub fn format_with(&mut self, params: Arc<FormatParameters>, vol: &VolumeMeta) -> FsResult {
        self.ensure_writable()?;
        self.clear_parse_and_assign();
        let mut driver = Driver::new(params.clone());
        if driver.parse_parameters(&mut self.store, true) < 0.0 {
            bail!(FsError::ParameterAreaInvalid);
        }
        let mut driver = driver.settle();
        log::debug!("formatting {} sectors as {}", self.store.sector_count(), params.name);

        let store = &mut self.store;
        for lsn in 0..store.sector_count() {
            store.fill_sector(lsn, driver.fill_sector(lsn))?;
        }
        driver.create_bios_parameter_block(store, vol)?;
        let map = driver.additional_process_on_formatted(store, vol)?;
        driver.write_map(store, &map)?;
        store.flush()?;

        self.score = 1.0;
        self.driver = Some(driver);
        self.assign_fat_and_directory()
    }

    pub fn free_space(&mut self) -> FsResult<FreeSpace> {
        let (_, driver, m) = self.parts()?;
        Ok(driver.calc_disk_free_size(&m.map, false))
    }

    pub fn volume_label(&mut self) -> Option<String> {
        let driver = self.driver.as_ref()?;
        driver.volume_label(&mut self.store)
    }

    /// Group classification against every chain reachable from the root.
    pub fn availability(&mut self) -> FsResult<Vec<GroupState>> {
        let (store, driver, m) = self.parts()?;
        let root = m.tree.root();
        let mut chains = vec![driver.owned_groups(&m.dir_chain(driver, store, root)?)];
        let mut stack = vec![root];
        while let Some(dir) = stack.pop() {
            m.load_dir(driver, store, dir)?;
            for id in m.tree.listing(dir) {
                let e = m.tree.entry(id).clone();
                match driver.file_chain(store, &m.map, &e) {
                    Ok(c) => chains.push(driver.owned_groups(&c)),
                    Err(err) => log::warn!("{}: unreadable chain: {err}", e.full_name()),
                }
                if e.is_dir() {
                    stack.push(id);
                }
            }
        }
        Ok(m.map.availability(&chains))
    }

    /// Re-runs the structural checks and reports leaks, missing and
    /// cross-linked groups.
    pub fn check(&mut self) -> FsResult<Report> {
        let mut rep = Report::default();
        let states = self.availability()?;
        let (store, driver, m) = self.parts()?;

        let mut trial = driver.clone();
        let rp = trial.parse_parameters(store, false);
        let rf = driver.check_fat(store, false);
        let rd = driver.check_directory(store, false);
        for (code, r) in [("CHK.PARAM", rp), ("CHK.FAT", rf), ("CHK.DIR", rd)] {
            if r < 0.0 {
                rep.err(code, format!("structural check failed ({r:.2})"));
            } else if r < 1.0 {
                rep.warn(code, format!("structural check ratio {r:.2}"));
            }
        }

        let count = |s: GroupState| states.iter().filter(|&&x| x == s).count();
        let leaks = count(GroupState::Leak);
        let missing = count(GroupState::Missing);
        if leaks > 0 {
            rep.warn("CHK.LEAK", format!("{leaks} group(s) in use but unreferenced"));
        }
        if missing > 0 {
            rep.err("CHK.MISSING", format!("{missing} referenced group(s) marked free"));
        }
        driver.check_extra(store, &m.map, &mut rep);
        self.report.extend(rep.clone());
        Ok(rep)
    }
}

impl<S: SectorStore> std::fmt::Debug for FilesystemSession<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FilesystemSession")
            .field("state", &self.state())
            .field("driver", &self.driver.as_ref().map(Driver::name))
            .field("score", &self.score)
            .finish()
    }
}
