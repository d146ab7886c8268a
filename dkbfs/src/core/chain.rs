// SPDX-License-Identifier: MIT

//! Physical extents of one file or directory.

/// One group of a chain and the sectors it covers (inclusive, partition LSNs).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GroupItem {
    pub group: u32,
    pub next_group: u32,
    pub sector_start: u32,
    pub sector_end: u32,
}

impl GroupItem {
    #[inline]
    pub fn sectors(&self) -> u32 {
        self.sector_end - self.sector_start + 1
    }
}

/// Ordered group list in file-offset order.
///
/// The last item's `next_group` is the format's end-of-chain sentinel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupChain {
    items: Vec<GroupItem>,
    sector_size: usize,
    /// OS-9 file descriptor sector owning this chain.
    pub descriptor: Option<u32>,
}

impl GroupChain {
    pub fn new(sector_size: usize) -> Self {
        Self {
            items: Vec::new(),
            sector_size,
            descriptor: None,
        }
    }

    pub fn push(&mut self, item: GroupItem) {
        self.items.push(item);
    }

    /// Appends `other`, re-linking the current tail to its head.
    pub fn append(&mut self, other: GroupChain) {
        if let (Some(last), Some(first)) = (self.items.last_mut(), other.items.first()) {
            last.next_group = first.group;
        }
        self.items.extend(other.items);
    }

    #[inline]
    pub fn items(&self) -> &[GroupItem] {
        &self.items
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    #[inline]
    pub fn sector_size(&self) -> usize {
        self.sector_size
    }

    pub fn first_group(&self) -> Option<u32> {
        self.items.first().map(|i| i.group)
    }

    pub fn last_group(&self) -> Option<u32> {
        self.items.last().map(|i| i.group)
    }

    /// Distinct groups in chain order.
    pub fn groups(&self) -> Vec<u32> {
        let mut out: Vec<u32> = Vec::with_capacity(self.items.len());
        for i in &self.items {
            if out.last() != Some(&i.group) {
                out.push(i.group);
            }
        }
        out
    }

    pub fn total_sectors(&self) -> u32 {
        self.items.iter().map(GroupItem::sectors).sum()
    }

    /// Σ(sector_end − sector_start + 1) × sector_size.
    pub fn byte_size(&self) -> u64 {
        self.total_sectors() as u64 * self.sector_size as u64
    }

    /// Every sector in file order.
    pub fn sectors(&self) -> impl Iterator<Item = u32> + '_ {
        self.items
            .iter()
            .flat_map(|i| i.sector_start..=i.sector_end)
    }

    /// Contiguous sector runs `(start, count)`.
    pub fn runs(&self) -> Vec<(u32, u32)> {
        let mut runs: Vec<(u32, u32)> = Vec::new();
        for i in &self.items {
            match runs.last_mut() {
                Some((s, n)) if *s + *n == i.sector_start => *n += i.sectors(),
                _ => runs.push((i.sector_start, i.sectors())),
            }
        }
        runs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(group: u32, next: u32, start: u32, end: u32) -> GroupItem {
        GroupItem {
            group,
            next_group: next,
            sector_start: start,
            sector_end: end,
        }
    }

    #[test]
    fn size_and_runs_merge_contiguous_groups() {
        let mut c = GroupChain::new(512);
        c.push(item(2, 3, 10, 11));
        c.push(item(3, 7, 12, 13));
        c.push(item(7, 0xFFF, 20, 21));
        assert_eq!(c.total_sectors(), 6);
        assert_eq!(c.byte_size(), 3072);
        assert_eq!(c.runs(), vec![(10, 4), (20, 2)]);
        assert_eq!(c.sectors().collect::<Vec<_>>(), vec![10, 11, 12, 13, 20, 21]);
    }

    #[test]
    fn append_relinks_tail() {
        let mut a = GroupChain::new(512);
        a.push(item(2, 0xFFF, 10, 10));
        let mut b = GroupChain::new(512);
        b.push(item(5, 0xFFF, 13, 13));
        a.append(b);
        assert_eq!(a.items()[0].next_group, 5);
        assert_eq!(a.groups(), vec![2, 5]);
    }
}
