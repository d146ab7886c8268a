// SPDX-License-Identifier: MIT

//! Sector-addressed view over a byte-addressed [`DkbIO`].
//!
//! Filesystem drivers never see byte offsets: they read and write whole
//! logical sectors (LSNs) relative to the start of the mounted partition.

use crate::{DkbIO, DkbIOError, DkbIOResult};

/// Physical geometry of a disk or partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiskGeometry {
    pub sector_size: u16,
    pub sectors_per_track: u16,
    pub sides: u16,
    pub tracks: u16,
}

impl DiskGeometry {
    pub const fn new(sector_size: u16, sectors_per_track: u16, sides: u16, tracks: u16) -> Self {
        Self {
            sector_size,
            sectors_per_track,
            sides,
            tracks,
        }
    }

    /// Flat geometry for hard disks and raw images: one track holding every sector.
    pub fn flat(sector_size: u16, sector_count: u32) -> Self {
        Self {
            sector_size,
            sectors_per_track: sector_count.min(u16::MAX as u32) as u16,
            sides: 1,
            tracks: 1,
        }
    }

    #[inline]
    pub fn total_sectors(&self) -> u32 {
        self.sectors_per_track as u32 * self.sides as u32 * self.tracks as u32
    }
}

/// Sector store consumed by the filesystem layer.
pub trait SectorStore {
    fn sector_size(&self) -> usize;

    /// Number of sectors addressable through this store.
    fn sector_count(&self) -> u32;

    fn geometry(&self) -> DiskGeometry;

    fn is_write_protected(&self) -> bool;

    /// Reads sector `lsn` into `buf`; `buf.len()` must equal `sector_size()`.
    fn read_sector(&mut self, lsn: u32, buf: &mut [u8]) -> DkbIOResult;

    /// Writes `data` to sector `lsn`; `data.len()` must equal `sector_size()`.
    fn write_sector(&mut self, lsn: u32, data: &[u8]) -> DkbIOResult;

    /// Fills sector `lsn` with `value`.
    fn fill_sector(&mut self, lsn: u32, value: u8) -> DkbIOResult {
        let buf = vec![value; self.sector_size()];
        self.write_sector(lsn, &buf)
    }

    fn flush(&mut self) -> DkbIOResult {
        Ok(())
    }

    /// Allocates a zeroed buffer of one sector.
    fn sector_buf(&self) -> Vec<u8> {
        vec![0u8; self.sector_size()]
    }
}

impl<T: SectorStore + ?Sized> SectorStore for &mut T {
    fn sector_size(&self) -> usize {
        (**self).sector_size()
    }
    fn sector_count(&self) -> u32 {
        (**self).sector_count()
    }
    fn geometry(&self) -> DiskGeometry {
        (**self).geometry()
    }
    fn is_write_protected(&self) -> bool {
        (**self).is_write_protected()
    }
    fn read_sector(&mut self, lsn: u32, buf: &mut [u8]) -> DkbIOResult {
        (**self).read_sector(lsn, buf)
    }
    fn write_sector(&mut self, lsn: u32, data: &[u8]) -> DkbIOResult {
        (**self).write_sector(lsn, data)
    }
    fn fill_sector(&mut self, lsn: u32, value: u8) -> DkbIOResult {
        (**self).fill_sector(lsn, value)
    }
    fn flush(&mut self) -> DkbIOResult {
        (**self).flush()
    }
}

/// [`SectorStore`] over any [`DkbIO`], with a partition window and a
/// write-protect switch.
#[derive(Debug)]
pub struct SectorDisk<IO: DkbIO> {
    io: IO,
    geometry: DiskGeometry,
    start: u32,
    count: u32,
    write_protected: bool,
}

impl<IO: DkbIO> SectorDisk<IO> {
    /// Wraps `io`; the sector count is taken from the backing length when
    /// known, otherwise from `geometry`.
    pub fn new(io: IO, geometry: DiskGeometry) -> Self {
        let ss = geometry.sector_size.max(1) as u64;
        let count = match io.len() {
            Some(len) => (len / ss).min(u32::MAX as u64) as u32,
            None => geometry.total_sectors(),
        };
        Self {
            io,
            geometry,
            start: 0,
            count,
            write_protected: false,
        }
    }

    /// Restricts the store to `count` sectors starting at absolute sector `start`.
    pub fn with_partition(mut self, start: u32, count: u32) -> DkbIOResult<Self> {
        let end = start.checked_add(count).ok_or(DkbIOError::OutOfBounds)?;
        if end > self.start + self.count {
            return Err(DkbIOError::OutOfBounds);
        }
        self.start += start;
        self.count = count;
        Ok(self)
    }

    pub fn set_write_protected(&mut self, on: bool) {
        self.write_protected = on;
    }

    pub fn write_protected(mut self, on: bool) -> Self {
        self.write_protected = on;
        self
    }

    #[inline]
    pub fn partition_start(&self) -> u32 {
        self.start
    }

    pub fn into_inner(self) -> IO {
        self.io
    }

    #[inline]
    fn offset_of(&self, lsn: u32) -> u64 {
        (self.start as u64 + lsn as u64) * self.geometry.sector_size as u64
    }

    #[inline]
    fn check(&self, lsn: u32, len: usize) -> DkbIOResult {
        if lsn >= self.count {
            return Err(DkbIOError::NoSector(lsn));
        }
        if len != self.geometry.sector_size as usize {
            return Err(DkbIOError::InvalidSector(lsn));
        }
        Ok(())
    }
}

impl<IO: DkbIO> SectorStore for SectorDisk<IO> {
    #[inline]
    fn sector_size(&self) -> usize {
        self.geometry.sector_size as usize
    }

    #[inline]
    fn sector_count(&self) -> u32 {
        self.count
    }

    fn geometry(&self) -> DiskGeometry {
        self.geometry
    }

    #[inline]
    fn is_write_protected(&self) -> bool {
        self.write_protected
    }

    fn read_sector(&mut self, lsn: u32, buf: &mut [u8]) -> DkbIOResult {
        self.check(lsn, buf.len())?;
        let off = self.offset_of(lsn);
        self.io.read_at(off, buf).map_err(|e| match e {
            DkbIOError::OutOfBounds => DkbIOError::NoSector(lsn),
            other => other,
        })
    }

    fn write_sector(&mut self, lsn: u32, data: &[u8]) -> DkbIOResult {
        if self.write_protected {
            return Err(DkbIOError::WriteProtected);
        }
        self.check(lsn, data.len())?;
        let off = self.offset_of(lsn);
        self.io.write_at(off, data).map_err(|e| match e {
            DkbIOError::OutOfBounds => DkbIOError::NoSector(lsn),
            other => other,
        })
    }

    fn fill_sector(&mut self, lsn: u32, value: u8) -> DkbIOResult {
        if self.write_protected {
            return Err(DkbIOError::WriteProtected);
        }
        self.check(lsn, self.sector_size())?;
        let off = self.offset_of(lsn);
        let len = self.sector_size();
        self.io.fill(off, len, value)
    }

    fn flush(&mut self) -> DkbIOResult {
        self.io.flush()
    }
}

#[cfg(test)]
mod tests {
    use crate::prelude::*;

    fn disk(buf: &mut [u8]) -> SectorDisk<MemIO<'_>> {
        SectorDisk::new(MemIO::new(buf), DiskGeometry::new(256, 4, 1, 4))
    }

    #[test]
    fn sector_count_follows_backing_len() {
        let mut buf = vec![0u8; 256 * 10];
        let d = disk(&mut buf);
        assert_eq!(d.sector_count(), 10);
        assert_eq!(d.geometry().total_sectors(), 16);
    }

    #[test]
    fn read_write_and_bounds() {
        let mut buf = vec![0u8; 256 * 4];
        let mut d = disk(&mut buf);
        d.write_sector(3, &[0x5A; 256]).unwrap();
        let mut out = d.sector_buf();
        d.read_sector(3, &mut out).unwrap();
        assert_eq!(out, vec![0x5A; 256]);

        assert_eq!(d.read_sector(4, &mut out), Err(DkbIOError::NoSector(4)));
        let mut short = [0u8; 16];
        assert_eq!(
            d.read_sector(0, &mut short),
            Err(DkbIOError::InvalidSector(0))
        );
    }

    #[test]
    fn write_protect_rejects_mutation() {
        let mut buf = vec![0u8; 256 * 4];
        let mut d = disk(&mut buf).write_protected(true);
        assert_eq!(
            d.write_sector(0, &[0u8; 256]),
            Err(DkbIOError::WriteProtected)
        );
        assert_eq!(d.fill_sector(0, 0xE5), Err(DkbIOError::WriteProtected));
        let mut out = d.sector_buf();
        assert!(d.read_sector(0, &mut out).is_ok());
    }

    #[test]
    fn partition_window() {
        let mut buf = vec![0u8; 256 * 8];
        {
            let mut d = disk(&mut buf).with_partition(2, 4).unwrap();
            assert_eq!(d.sector_count(), 4);
            d.fill_sector(0, 0xAA).unwrap();
            assert!(d.fill_sector(4, 0).is_err());
        }
        assert_eq!(buf[2 * 256], 0xAA);
        assert_eq!(buf[2 * 256 - 1], 0);
    }

    #[test]
    fn partition_past_end_is_rejected() {
        let mut buf = vec![0u8; 256 * 8];
        assert!(disk(&mut buf).with_partition(6, 4).is_err());
    }
}
