// SPDX-License-Identifier: MIT

//! Directory tree manager.
//!
//! Nodes live in an arena and refer to each other by index. Every on-disk
//! slot of a resolved directory, used or not, is a child node, so slot order
//! is preserved and empty slots can be handed out in place. `.` and `..`
//! are ordinary slots; traversal through them resolves to the real node.

use dkbio::sector::SectorStore;

use crate::core::{
    chain::GroupChain,
    entry::{DirectoryEntry, SlotPos},
    error::*,
};

pub type NodeId = usize;

/// Slot range rules for one directory.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SlotBounds {
    /// Hard cap on the slot count (fixed-size FAT root).
    pub max_slots: Option<usize>,
    /// Slots at or past this index are unused whatever they hold (OS-9
    /// directories end at the size recorded in their descriptor).
    pub live_slots: Option<usize>,
}

/// Slot decoding surface a directory tree needs from its driver.
pub trait SlotCodec {
    fn slot_size(&self) -> usize;

    /// Decodes a slot; `None` marks it unused. Formats keeping metadata
    /// outside the slot (OS-9 file descriptors) read it through `store`.
    fn decode_slot(&self, store: &mut dyn SectorStore, raw: &[u8]) -> Option<DirectoryEntry>;

    /// This slot and every following one are unused.
    fn is_end_slot(&self, _raw: &[u8]) -> bool {
        false
    }

    /// Rewrites `raw` as the end-of-directory marker.
    fn mark_end_slot(&self, _raw: &mut [u8]) {}
}

#[derive(Debug, Clone)]
pub struct Node {
    pub entry: DirectoryEntry,
    pub slot: Option<SlotPos>,
    pub parent: Option<NodeId>,
    children: Vec<NodeId>,
    valid: bool,
    chain: Option<GroupChain>,
}

impl Node {
    fn new(entry: DirectoryEntry, slot: Option<SlotPos>, parent: Option<NodeId>) -> Self {
        Self {
            entry,
            slot,
            parent,
            children: Vec::new(),
            valid: false,
            chain: None,
        }
    }

    /// Sectors backing this directory, once resolved.
    pub fn chain(&self) -> Option<&GroupChain> {
        self.chain.as_ref()
    }
}

#[derive(Debug, Clone)]
pub struct DirectoryTree {
    nodes: Vec<Node>,
    root: NodeId,
    current: NodeId,
}

impl DirectoryTree {
    pub fn new(root_entry: DirectoryEntry) -> Self {
        Self {
            nodes: vec![Node::new(root_entry, None, None)],
            root: 0,
            current: 0,
        }
    }

    #[inline]
    pub fn root(&self) -> NodeId {
        self.root
    }

    #[inline]
    pub fn current(&self) -> NodeId {
        self.current
    }

    #[inline]
    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id]
    }

    #[inline]
    pub fn entry(&self, id: NodeId) -> &DirectoryEntry {
        &self.nodes[id].entry
    }

    pub fn get(&self, id: NodeId) -> Option<&DirectoryEntry> {
        self.nodes.get(id).map(|n| &n.entry)
    }

    #[inline]
    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id].parent
    }

    #[inline]
    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.nodes[id].children
    }

    /// Used children that are neither aliases nor volume labels.
    pub fn listing(&self, dir: NodeId) -> Vec<NodeId> {
        self.children(dir)
            .iter()
            .copied()
            .filter(|&c| {
                let e = self.entry(c);
                e.used && !e.is_alias() && !e.is_volume_label()
            })
            .collect()
    }

    #[inline]
    pub fn is_valid(&self, id: NodeId) -> bool {
        self.nodes[id].valid
    }

    /// Forces the next visit of `id` to re-decode its slots.
    pub fn invalidate(&mut self, id: NodeId) {
        self.nodes[id].valid = false;
    }

    pub fn is_root(&self, id: NodeId) -> bool {
        id == self.root
    }

    /// Replaces the entry stored at `id`.
    pub fn set_entry(&mut self, id: NodeId, entry: DirectoryEntry) {
        self.nodes[id].entry = entry;
    }

    /// Clears a slot after deletion, dropping its subtree.
    pub fn mark_unused(&mut self, id: NodeId, raw: Vec<u8>) {
        let n = &mut self.nodes[id];
        n.entry = DirectoryEntry::unused(raw);
        n.children.clear();
        n.valid = false;
        n.chain = None;
    }

    /// Resolves the children of `dir` by decoding every slot of `chain`
    /// until the chain is exhausted or `bounds.max_slots` is reached.
    pub fn assign<C: SlotCodec + ?Sized>(
        &mut self,
        codec: &C,
        store: &mut dyn SectorStore,
        dir: NodeId,
        chain: GroupChain,
        bounds: SlotBounds,
    ) -> FsResult {
        self.nodes[dir].children.clear();
        let slots = self.decode_slots(codec, store, dir, &chain, bounds, 0)?;
        let n = &mut self.nodes[dir];
        n.children = slots;
        n.chain = Some(chain);
        n.valid = true;
        log::trace!("assigned directory node {dir}: {} slots", self.nodes[dir].children.len());
        Ok(())
    }

    /// Appends the slots of a freshly grown extent to `dir`.
    pub fn extend<C: SlotCodec + ?Sized>(
        &mut self,
        codec: &C,
        store: &mut dyn SectorStore,
        dir: NodeId,
        extent: GroupChain,
    ) -> FsResult {
        let first = self.nodes[dir].children.len();
        let slots = self.decode_slots(codec, store, dir, &extent, SlotBounds::default(), first)?;
        let n = &mut self.nodes[dir];
        n.children.extend(slots);
        match n.chain.as_mut() {
            Some(c) => c.append(extent),
            None => n.chain = Some(extent),
        }
        Ok(())
    }

    fn decode_slots<C: SlotCodec + ?Sized>(
        &mut self,
        codec: &C,
        store: &mut dyn SectorStore,
        dir: NodeId,
        chain: &GroupChain,
        bounds: SlotBounds,
        first_index: usize,
    ) -> FsResult<Vec<NodeId>> {
        let size = codec.slot_size();
        let mut ended = false;
        let mut out = Vec::new();
        let mut buf = store.sector_buf();
        'sectors: for lsn in chain.sectors() {
            store.read_sector(lsn, &mut buf)?;
            for (i, raw) in buf.chunks_exact(size).enumerate() {
                if bounds.max_slots.is_some_and(|l| out.len() >= l) {
                    break 'sectors;
                }
                let index = first_index + out.len();
                ended = ended
                    || codec.is_end_slot(raw)
                    || bounds.live_slots.is_some_and(|l| index >= l);
                let entry = if ended {
                    None
                } else {
                    codec.decode_slot(store, raw)
                };
                let entry = entry.unwrap_or_else(|| DirectoryEntry::unused(raw.to_vec()));
                let pos = SlotPos {
                    lsn,
                    offset: (i * size) as u16,
                };
                self.nodes.push(Node::new(entry, Some(pos), Some(dir)));
                out.push(self.nodes.len() - 1);
            }
        }
        Ok(out)
    }

    /// Linear scan of `dir` for a used entry named `name`.
    ///
    /// Returns the match and the slot right after it.
    pub fn find_file(
        &self,
        dir: NodeId,
        name: &str,
        case_insensitive: bool,
        exclude: Option<NodeId>,
    ) -> Option<(NodeId, Option<NodeId>)> {
        let kids = self.children(dir);
        kids.iter().enumerate().find_map(|(i, &c)| {
            let e = self.entry(c);
            if !e.used || e.is_volume_label() || Some(c) == exclude {
                return None;
            }
            let full = e.full_name();
            let hit = if case_insensitive {
                full.eq_ignore_ascii_case(name)
            } else {
                full == name
            };
            hit.then(|| (c, kids.get(i + 1).copied()))
        })
    }

    /// First unused slot of `dir` and the slot after it; `None` when full.
    pub fn find_empty_slot(&self, dir: NodeId) -> Option<(NodeId, Option<NodeId>)> {
        let kids = self.children(dir);
        kids.iter()
            .position(|&c| !self.entry(c).used)
            .map(|i| (kids[i], kids.get(i + 1).copied()))
    }

    /// Maps `.` and `..` slots onto the directory they name.
    pub fn resolve(&self, id: NodeId) -> NodeId {
        let e = self.entry(id);
        let owner = self.parent(id).unwrap_or(self.root);
        if e.is_dot() {
            owner
        } else if e.is_dotdot() {
            self.parent(owner).unwrap_or(self.root)
        } else {
            id
        }
    }

    /// Moves `current` to `target`, collapsing aliases.
    pub fn change(&mut self, target: NodeId) -> FsResult {
        let real = self.resolve(target);
        let e = self.entry(real);
        ensure!(
            real == self.root || (e.used && e.is_dir()),
            FsError::FileNotFound(e.full_name())
        );
        self.current = real;
        Ok(())
    }

    /// Occupied size: slots before the trailing unused run × slot size.
    pub fn calc_size(&self, dir: NodeId, slot_size: usize) -> u64 {
        let kids = self.children(dir);
        let occupied = kids
            .iter()
            .rposition(|&c| self.entry(c).used)
            .map_or(0, |p| p + 1);
        (occupied * slot_size) as u64
    }

    /// Used descendants of `dir` in depth-first order, aliases excluded.
    pub fn descendants(&self, dir: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeId> = self.listing(dir).into_iter().rev().collect();
        while let Some(id) = stack.pop() {
            out.push(id);
            stack.extend(self.listing(id).into_iter().rev());
        }
        out
    }

    /// `/`-joined path of `id` from the root.
    pub fn path(&self, id: NodeId) -> String {
        let mut parts = Vec::new();
        let mut cur = self.resolve(id);
        while cur != self.root {
            parts.push(self.entry(cur).full_name());
            cur = self.parent(cur).unwrap_or(self.root);
        }
        parts.reverse();
        format!("/{}", parts.join("/"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{attr::FileAttr, chain::GroupItem};
    use dkbio::prelude::*;

    /// 16-byte slots: byte 0 = 0 ends the directory, 0xE5 is deleted,
    /// bytes 1..9 name, byte 9 directory flag.
    struct TestCodec;

    impl SlotCodec for TestCodec {
        fn slot_size(&self) -> usize {
            16
        }
        fn decode_slot(&self, _: &mut dyn SectorStore, raw: &[u8]) -> Option<DirectoryEntry> {
            if raw[0] == 0xE5 {
                return None;
            }
            let name: String = raw[1..9]
                .iter()
                .take_while(|&&b| b != b' ')
                .map(|&b| b as char)
                .collect();
            let attr = if raw[9] != 0 {
                FileAttr::DIRECTORY
            } else {
                FileAttr::empty()
            };
            let mut e = DirectoryEntry::new_file(&name, "", attr);
            e.raw = raw.to_vec();
            Some(e)
        }
        fn is_end_slot(&self, raw: &[u8]) -> bool {
            raw[0] == 0
        }
    }

    fn slot(name: &str, dir: bool) -> [u8; 16] {
        let mut s = [b' '; 16];
        s[0] = 1;
        s[1..1 + name.len()].copy_from_slice(name.as_bytes());
        s[9] = dir as u8;
        s
    }

    fn setup(buf: &mut [u8]) -> (DirectoryTree, SectorDisk<MemIO<'_>>) {
        let mut disk = SectorDisk::new(MemIO::new(buf), DiskGeometry::flat(64, 4));
        let mut sec = [0u8; 64];
        sec[0..16].copy_from_slice(&slot("..", true));
        sec[16..32].copy_from_slice(&slot("A", false));
        sec[32] = 0xE5;
        sec[48..64].copy_from_slice(&slot("SUB", true));
        disk.write_sector(0, &sec).unwrap();
        let mut sec = [0u8; 64];
        sec[0..16].copy_from_slice(&slot("LOST", false));
        sec[16] = 0;
        sec[32..48].copy_from_slice(&slot("HIDDEN", false));
        disk.write_sector(1, &sec).unwrap();

        let mut tree = DirectoryTree::new(DirectoryEntry::new_file("", "", FileAttr::DIRECTORY));
        let mut chain = GroupChain::new(64);
        chain.push(GroupItem {
            group: 0,
            next_group: u32::MAX,
            sector_start: 0,
            sector_end: 1,
        });
        tree.assign(&TestCodec, &mut disk, 0, chain, SlotBounds::default())
            .unwrap();
        (tree, disk)
    }

    #[test]
    fn slots_after_end_marker_are_unused() {
        let mut buf = vec![0u8; 256];
        let (tree, _) = setup(&mut buf);
        assert_eq!(tree.children(0).len(), 8);
        let names: Vec<_> = tree.listing(0).iter().map(|&c| tree.entry(c).full_name()).collect();
        assert_eq!(names, vec!["A", "SUB", "LOST"]);
        assert!(tree.find_file(0, "HIDDEN", false, None).is_none());
        assert_eq!(tree.calc_size(0, 16), 5 * 16);
    }

    #[test]
    fn find_file_and_empty_slot_never_alias() {
        let mut buf = vec![0u8; 256];
        let (tree, _) = setup(&mut buf);
        let (a, next) = tree.find_file(0, "a", true, None).unwrap();
        assert_eq!(tree.entry(a).full_name(), "A");
        assert_eq!(next, Some(tree.children(0)[2]));
        assert!(tree.find_file(0, "a", false, None).is_none());
        assert!(tree.find_file(0, "A", false, Some(a)).is_none());

        let (empty, _) = tree.find_empty_slot(0).unwrap();
        assert_eq!(empty, tree.children(0)[2]);
        assert!(!tree.entry(empty).used);
    }

    #[test]
    fn change_collapses_aliases() {
        let mut buf = vec![0u8; 256];
        let (mut tree, _) = setup(&mut buf);
        let (sub, _) = tree.find_file(0, "SUB", false, None).unwrap();
        tree.change(sub).unwrap();
        assert_eq!(tree.current(), sub);
        assert_eq!(tree.path(sub), "/SUB");

        let (a, _) = tree.find_file(0, "A", false, None).unwrap();
        assert!(tree.change(a).is_err());
        assert_eq!(tree.current(), sub);

        // ".." in root resolves to root itself
        let dotdot = tree.children(0)[0];
        tree.change(dotdot).unwrap();
        assert_eq!(tree.current(), tree.root());
    }

    #[test]
    fn limit_caps_fixed_root() {
        let mut buf = vec![0u8; 256];
        let (mut tree, mut disk) = setup(&mut buf);
        let mut chain = GroupChain::new(64);
        chain.push(GroupItem {
            group: 0,
            next_group: u32::MAX,
            sector_start: 0,
            sector_end: 1,
        });
        let bounds = SlotBounds {
            max_slots: Some(3),
            live_slots: None,
        };
        tree.assign(&TestCodec, &mut disk, 0, chain, bounds).unwrap();
        assert_eq!(tree.children(0).len(), 3);
        assert_eq!(tree.find_empty_slot(0).map(|x| x.1), Some(None));
    }

    #[test]
    fn slots_past_live_bound_are_unused() {
        let mut buf = vec![0u8; 256];
        let (mut tree, mut disk) = setup(&mut buf);
        let mut chain = GroupChain::new(64);
        chain.push(GroupItem {
            group: 0,
            next_group: u32::MAX,
            sector_start: 0,
            sector_end: 0,
        });
        let bounds = SlotBounds {
            max_slots: None,
            live_slots: Some(2),
        };
        tree.assign(&TestCodec, &mut disk, 0, chain, bounds).unwrap();
        assert_eq!(tree.children(0).len(), 4);
        assert!(tree.find_file(0, "SUB", false, None).is_none());
        assert!(tree.find_file(0, "A", false, None).is_some());
    }
}
