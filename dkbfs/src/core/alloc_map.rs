// SPDX-License-Identifier: MIT

//! Allocation map: which groups are free, used, reserved or end-of-chain.
//!
//! Two concrete forms answer the same queries:
//! - [`FatTable`]: group → next-group table (FAT12/16)
//! - [`AllocBitmap`]: one bit per cluster of `sectors_per_bit` sectors (OS-9)

use crate::core::{error::*, utils::bitmap::BitmapOps};

/// Allocation request mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllocMode {
    /// Fresh chain for a new file or directory.
    New,
    /// Extension linked after an existing chain.
    Append,
}

/// Per-group classification returned by [`AllocationMap::availability`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupState {
    Free,
    System,
    Used,
    UsedFirst,
    UsedLast,
    /// Marked used but owned by no chain.
    Leak,
    /// Owned by a chain but marked free.
    Missing,
}

/// Sentinel closing bitmap-backed chains, which carry no on-disk links.
pub const BITMAP_EOC: u32 = u32::MAX;

/// In-memory FAT. `entries[g]` holds the raw next-group value of group `g`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FatTable {
    entries: Vec<u32>,
    eoc: u32,
    eoc_min: u32,
    bad: u32,
}

impl FatTable {
    pub const FIRST_GROUP: u32 = 2;

    /// `bits` is 12 or 16; `entries` must include the two reserved slots.
    pub fn new(entries: Vec<u32>, bits: u8) -> Self {
        let mask = if bits == 12 { 0x0FFF } else { 0xFFFF };
        Self {
            entries,
            eoc: mask,
            eoc_min: mask - 7,
            bad: mask - 8,
        }
    }

    /// Empty table for `clusters` data groups, reserved slots seeded.
    pub fn blank(clusters: u32, bits: u8, entry0: u32) -> Self {
        let mut t = Self::new(vec![0; clusters as usize + 2], bits);
        t.entries[0] = entry0;
        t.entries[1] = t.eoc;
        t
    }

    #[inline]
    pub fn entries(&self) -> &[u32] {
        &self.entries
    }

    #[inline]
    pub fn get(&self, group: u32) -> Option<u32> {
        self.entries.get(group as usize).copied()
    }

    pub fn set(&mut self, group: u32, value: u32) -> FsAllocResult {
        let slot = self
            .entries
            .get_mut(group as usize)
            .ok_or(FsAllocError::InvalidGroup(group))?;
        *slot = value;
        Ok(())
    }

    #[inline]
    pub fn eoc(&self) -> u32 {
        self.eoc
    }

    #[inline]
    pub fn is_valid_group(&self, group: u32) -> bool {
        group >= Self::FIRST_GROUP && (group as usize) < self.entries.len()
    }
}

/// OS-9 style allocation bitmap.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllocBitmap {
    bits: Vec<u8>,
    groups: u32,
    system_groups: u32,
}

impl AllocBitmap {
    /// `system_groups` leading clusters hold management data and never free.
    pub fn new(bits: Vec<u8>, groups: u32, system_groups: u32) -> Self {
        Self {
            bits,
            groups,
            system_groups,
        }
    }

    #[inline]
    pub fn bytes(&self) -> &[u8] {
        &self.bits
    }

    #[inline]
    pub fn system_groups(&self) -> u32 {
        self.system_groups
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AllocationMap {
    Table(FatTable),
    Bitmap(AllocBitmap),
}

impl AllocationMap {
    /// Lowest allocatable group number.
    pub fn first_group(&self) -> u32 {
        match self {
            AllocationMap::Table(_) => FatTable::FIRST_GROUP,
            AllocationMap::Bitmap(_) => 0,
        }
    }

    /// One past the highest group number.
    pub fn group_limit(&self) -> u32 {
        match self {
            AllocationMap::Table(t) => t.entries.len() as u32,
            AllocationMap::Bitmap(b) => b.groups,
        }
    }

    pub fn end_of_chain(&self) -> u32 {
        match self {
            AllocationMap::Table(t) => t.eoc,
            AllocationMap::Bitmap(_) => BITMAP_EOC,
        }
    }

    /// Whether a next-group value terminates a chain.
    pub fn is_end_of_chain(&self, value: u32) -> bool {
        match self {
            AllocationMap::Table(t) => value >= t.eoc_min,
            AllocationMap::Bitmap(_) => value == BITMAP_EOC,
        }
    }

    pub fn is_system(&self, group: u32) -> bool {
        match self {
            AllocationMap::Table(t) => match t.get(group) {
                _ if group < FatTable::FIRST_GROUP => true,
                Some(v) => (t.bad - 7..=t.bad).contains(&v),
                None => true,
            },
            AllocationMap::Bitmap(b) => group < b.system_groups || group >= b.groups,
        }
    }

    pub fn is_used(&self, group: u32) -> bool {
        match self {
            AllocationMap::Table(t) => t.get(group).is_none_or(|v| v != 0),
            AllocationMap::Bitmap(b) => group >= b.groups || b.bits.get_bit(group as usize),
        }
    }

    /// Next group of a table chain; `None` for bitmaps and free groups.
    pub fn next(&self, group: u32) -> Option<u32> {
        match self {
            AllocationMap::Table(t) => t.get(group).filter(|&v| v != 0),
            AllocationMap::Bitmap(_) => None,
        }
    }

    pub fn find_first_free(&self) -> Option<u32> {
        self.find_free_from(self.first_group())
    }

    pub fn find_free_from(&self, from: u32) -> Option<u32> {
        match self {
            AllocationMap::Table(t) => (from.max(FatTable::FIRST_GROUP)..t.entries.len() as u32)
                .find(|&g| t.entries[g as usize] == 0),
            AllocationMap::Bitmap(b) => b
                .bits
                .find_first_zero(from.max(b.system_groups) as usize, b.groups as usize)
                .map(|g| g as u32),
        }
    }

    pub fn free_count(&self) -> u32 {
        let (first, limit) = (self.first_group(), self.group_limit());
        (first..limit).filter(|&g| !self.is_used(g)).count() as u32
    }

    /// Takes the `count` lowest free groups and marks them used, linked in
    /// ascending order and closed with the end-of-chain sentinel.
    ///
    /// Nothing is modified when fewer than `count` groups are free.
    pub fn take_free(&mut self, count: u32) -> FsAllocResult<Vec<u32>> {
        let mut picked = Vec::with_capacity(count as usize);
        let mut g = self.first_group();
        while (picked.len() as u32) < count {
            match self.find_free_from(g) {
                Some(f) => {
                    picked.push(f);
                    g = f + 1;
                }
                None => return Err(FsAllocError::DiskFull),
            }
        }
        self.mark_chain(&picked)?;
        Ok(picked)
    }

    /// Marks `groups` used; table forms link them in order.
    pub fn mark_chain(&mut self, groups: &[u32]) -> FsAllocResult {
        match self {
            AllocationMap::Table(t) => {
                let eoc = t.eoc;
                for (i, &g) in groups.iter().enumerate() {
                    let next = groups.get(i + 1).copied().unwrap_or(eoc);
                    t.set(g, next)?;
                }
            }
            AllocationMap::Bitmap(b) => {
                for &g in groups {
                    if g >= b.groups {
                        return Err(FsAllocError::InvalidGroup(g));
                    }
                    b.bits.set_bit(g as usize, true);
                }
            }
        }
        Ok(())
    }

    /// Links `tail` after `head` (append mode). No-op for bitmaps.
    pub fn link(&mut self, head: u32, tail: u32) -> FsAllocResult {
        match self {
            AllocationMap::Table(t) => t.set(head, tail),
            AllocationMap::Bitmap(_) => Ok(()),
        }
    }

    /// Closes a table chain at `group`. No-op for bitmaps.
    pub fn terminate(&mut self, group: u32) -> FsAllocResult {
        match self {
            AllocationMap::Table(t) => {
                let eoc = t.eoc;
                t.set(group, eoc)
            }
            AllocationMap::Bitmap(_) => Ok(()),
        }
    }

    /// Returns every non-system group in `groups` to free.
    pub fn release(&mut self, groups: &[u32]) {
        for &g in groups {
            if self.is_system(g) {
                continue;
            }
            match self {
                AllocationMap::Table(t) => {
                    let _ = t.set(g, 0);
                }
                AllocationMap::Bitmap(b) => b.bits.set_bit(g as usize, false),
            }
        }
    }

    /// Classifies every group `0..group_limit()` against the chains that
    /// reference them.
    pub fn availability(&self, chains: &[Vec<u32>]) -> Vec<GroupState> {
        let limit = self.group_limit() as usize;
        let mut refs = vec![0u16; limit];
        let mut role = vec![GroupState::Used; limit];

        for chain in chains {
            for (i, &g) in chain.iter().enumerate() {
                let Some(r) = refs.get_mut(g as usize) else {
                    continue;
                };
                *r = r.saturating_add(1);
                if i == 0 {
                    role[g as usize] = GroupState::UsedFirst;
                } else if i + 1 == chain.len() {
                    role[g as usize] = GroupState::UsedLast;
                }
            }
        }

        (0..limit as u32)
            .map(|g| {
                if self.is_system(g) {
                    return GroupState::System;
                }
                match (self.is_used(g), refs[g as usize]) {
                    (false, 0) => GroupState::Free,
                    (true, 0) => GroupState::Leak,
                    (false, _) => GroupState::Missing,
                    (true, _) => role[g as usize],
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fat12(clusters: u32) -> AllocationMap {
        AllocationMap::Table(FatTable::blank(clusters, 12, 0xFF9))
    }

    #[test]
    fn take_free_is_lowest_first_and_linked() {
        let mut m = fat12(10);
        let a = m.take_free(2).unwrap();
        assert_eq!(a, vec![2, 3]);
        assert_eq!(m.next(2), Some(3));
        assert!(m.is_end_of_chain(m.next(3).unwrap()));

        m.release(&[2]);
        let b = m.take_free(2).unwrap();
        assert_eq!(b, vec![2, 4]);
    }

    #[test]
    fn take_free_then_release_restores_map() {
        let mut m = fat12(8);
        m.take_free(1).unwrap();
        let before = m.clone();
        let g = m.take_free(4).unwrap();
        m.release(&g);
        assert_eq!(m, before);
    }

    #[test]
    fn disk_full_leaves_map_untouched() {
        let mut m = fat12(3);
        let before = m.clone();
        assert_eq!(m.take_free(4), Err(FsAllocError::DiskFull));
        assert_eq!(m, before);
        assert_eq!(m.free_count(), 3);
    }

    #[test]
    fn bad_clusters_are_system() {
        let mut t = FatTable::blank(4, 12, 0xFF9);
        t.set(3, 0xFF7).unwrap();
        let mut m = AllocationMap::Table(t);
        assert!(m.is_system(3));
        assert!(m.is_system(0));
        m.release(&[3]);
        assert!(m.is_used(3));
    }

    #[test]
    fn bitmap_respects_system_region() {
        let mut m = AllocationMap::Bitmap(AllocBitmap::new(vec![0xC0, 0], 16, 2));
        assert!(m.is_system(1));
        assert_eq!(m.find_first_free(), Some(2));
        let g = m.take_free(3).unwrap();
        assert_eq!(g, vec![2, 3, 4]);
        m.release(&[0, 1, 2, 3, 4]);
        assert!(m.is_used(0) && m.is_used(1));
        assert_eq!(m.free_count(), 14);
        assert!(m.is_used(16));
    }

    #[test]
    fn availability_flags_leaks_and_missing() {
        let mut m = fat12(6);
        m.take_free(3).unwrap(); // 2,3,4
        m.take_free(1).unwrap(); // 5, never referenced
        let chains = vec![vec![2, 3, 4], vec![6]];
        let a = m.availability(&chains);
        assert_eq!(a[0], GroupState::System);
        assert_eq!(a[2], GroupState::UsedFirst);
        assert_eq!(a[3], GroupState::Used);
        assert_eq!(a[4], GroupState::UsedLast);
        assert_eq!(a[5], GroupState::Leak);
        assert_eq!(a[6], GroupState::Missing);
        assert_eq!(a[7], GroupState::Free);
    }
}
