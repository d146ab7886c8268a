// SPDX-License-Identifier: MIT

//! File descriptor sector: attributes, dates, size and segment list.

use zerocopy::byteorder::{BigEndian, U16, U32};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

use crate::core::{
    chain::GroupChain,
    error::*,
    utils::bytes_utils::{u24_be, u24_be_bytes},
};
use crate::fs::os9::constant::*;

#[derive(IntoBytes, FromBytes, KnownLayout, Immutable, Unaligned, Copy, Clone, Debug)]
#[repr(C)]
pub struct Segment {
    pub lsn: [u8; 3],
    pub count: U16<BigEndian>,
}

impl Segment {
    pub const EMPTY: Segment = Segment {
        lsn: [0; 3],
        count: U16::new(0),
    };

    #[inline]
    pub fn start(&self) -> u32 {
        u24_be(self.lsn)
    }

    #[inline]
    pub fn sectors(&self) -> u32 {
        self.count.get() as u32
    }
}

#[derive(IntoBytes, FromBytes, KnownLayout, Immutable, Unaligned, Copy, Clone, Debug)]
#[repr(C)]
pub struct FileDesc {
    pub attr: u8,               // FD.ATT
    pub owner: U16<BigEndian>,  // FD.OWN
    pub modified: [u8; 5],      // FD.DAT
    pub link_count: u8,         // FD.LNK
    pub size: U32<BigEndian>,   // FD.SIZ
    pub created: [u8; 3],       // FD.Creat
    pub segments: [Segment; OS9_SEGMENTS],
}

impl FileDesc {
    pub fn new(attr: u8) -> Self {
        Self {
            attr,
            owner: U16::new(0),
            modified: [0; 5],
            link_count: 1,
            size: U32::new(0),
            created: [0; 3],
            segments: [Segment::EMPTY; OS9_SEGMENTS],
        }
    }

    pub fn read(sector: &[u8]) -> Option<Self> {
        Self::read_from_prefix(sector).ok().map(|(fd, _)| fd)
    }

    /// Non-empty segments, up to the first zero-count one.
    pub fn extents(&self) -> impl Iterator<Item = &Segment> + '_ {
        self.segments.iter().take_while(|s| s.sectors() > 0)
    }

    /// Replaces the segment list with the runs of `chain`.
    pub fn set_segments(&mut self, chain: &GroupChain) -> FsAllocResult {
        let mut segs = Vec::new();
        for (mut start, mut count) in chain.runs() {
            while count > 0 {
                let n = count.min(OS9_SEGMENT_MAX_SECTORS);
                segs.push((start, n));
                start += n;
                count -= n;
            }
        }
        if segs.len() > OS9_SEGMENTS {
            return Err(FsAllocError::TooFragmented);
        }
        self.segments = [Segment::EMPTY; OS9_SEGMENTS];
        for (slot, (start, n)) in self.segments.iter_mut().zip(segs) {
            slot.lsn = u24_be_bytes(start);
            slot.count = U16::new(n as u16);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::chain::GroupItem;

    #[test]
    fn fd_offsets() {
        assert_eq!(core::mem::size_of::<FileDesc>(), OS9_FD_SIZE);
        let mut fd = FileDesc::new(0x1B);
        fd.size = U32::new(0x0102_0304);
        fd.created = [87, 1, 2];
        let raw = fd.as_bytes();
        assert_eq!(&raw[9..13], &[1, 2, 3, 4]);
        assert_eq!(&raw[13..16], &[87, 1, 2]);
        assert_eq!(raw[8], 1);
    }

    #[test]
    fn segments_follow_chain_runs() {
        let mut chain = GroupChain::new(256);
        for (g, s) in [(10, 10), (11, 11), (20, 20)] {
            chain.push(GroupItem {
                group: g,
                next_group: 0,
                sector_start: s,
                sector_end: s,
            });
        }
        let mut fd = FileDesc::new(0);
        fd.set_segments(&chain).unwrap();
        let segs: Vec<(u32, u32)> = fd.extents().map(|s| (s.start(), s.sectors())).collect();
        assert_eq!(segs, vec![(10, 2), (20, 1)]);
        assert_eq!(&fd.as_bytes()[16..21], &[0, 0, 10, 0, 2]);
    }

    #[test]
    fn too_many_runs_are_rejected() {
        let mut chain = GroupChain::new(256);
        for g in 0..49u32 {
            chain.push(GroupItem {
                group: g * 2,
                next_group: 0,
                sector_start: g * 2,
                sector_end: g * 2,
            });
        }
        let mut fd = FileDesc::new(0);
        assert_eq!(fd.set_segments(&chain), Err(FsAllocError::TooFragmented));
    }
}
