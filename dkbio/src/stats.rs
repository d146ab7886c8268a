// SPDX-License-Identifier: MIT

use crate::{DkbIO, DkbIOResult};

/// Simple I/O counters.
#[derive(Clone, Copy, Default, Debug, PartialEq, Eq)]
pub struct IoStats {
    pub reads: u64,
    pub read_bytes: u64,
    pub writes: u64,
    pub write_bytes: u64,
    pub flushes: u64,

    // Alignment against `IOCounter::align` (usually the sector size)
    pub aligned_reads: u64,
    pub unaligned_reads: u64,
    pub aligned_writes: u64,
    pub unaligned_writes: u64,
}

impl IoStats {
    #[inline]
    pub fn reset(&mut self) {
        *self = IoStats::default();
    }
}

/// Transparent instrumentation wrapper.
pub struct IOCounter<'a, IO: DkbIO + ?Sized> {
    inner: &'a mut IO,
    pub stats: IoStats,
    pub align: u64,
}

impl<'a, IO: DkbIO + ?Sized> IOCounter<'a, IO> {
    #[inline]
    pub fn new(inner: &'a mut IO) -> Self {
        Self {
            inner,
            stats: IoStats::default(),
            align: 1,
        }
    }

    #[inline]
    pub fn with_align(inner: &'a mut IO, align: u64) -> Self {
        Self {
            inner,
            stats: IoStats::default(),
            align: align.max(1),
        }
    }

    #[inline]
    pub fn snapshot(&self) -> IoStats {
        self.stats
    }

    #[inline]
    pub fn into_inner(self) -> &'a mut IO {
        self.inner
    }

    #[inline]
    fn is_aligned(&self, offset: u64, len: usize) -> bool {
        offset % self.align == 0 && len as u64 % self.align == 0
    }
}

impl<'a, IO: DkbIO + ?Sized> DkbIO for IOCounter<'a, IO> {
    #[inline]
    fn write_at(&mut self, offset: u64, data: &[u8]) -> DkbIOResult {
        if self.is_aligned(offset, data.len()) {
            self.stats.aligned_writes += 1;
        } else {
            self.stats.unaligned_writes += 1;
        }
        self.stats.writes += 1;
        self.stats.write_bytes += data.len() as u64;
        self.inner.write_at(offset, data)
    }

    #[inline]
    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> DkbIOResult {
        if self.is_aligned(offset, buf.len()) {
            self.stats.aligned_reads += 1;
        } else {
            self.stats.unaligned_reads += 1;
        }
        self.stats.reads += 1;
        self.stats.read_bytes += buf.len() as u64;
        self.inner.read_at(offset, buf)
    }

    #[inline]
    fn flush(&mut self) -> DkbIOResult {
        self.stats.flushes += 1;
        self.inner.flush()
    }

    #[inline]
    fn len(&self) -> Option<u64> {
        self.inner.len()
    }
}

#[cfg(test)]
mod test {
    use crate::prelude::*;

    #[test]
    fn counts_and_alignment() {
        let mut buf = [0u8; 1024];
        let mut mem = MemIO::new(&mut buf);
        let mut io = IOCounter::with_align(&mut mem, 256);

        io.write_at(0, &[0u8; 256]).unwrap();
        io.write_at(3, &[0u8; 4]).unwrap();
        let mut out = [0u8; 256];
        io.read_at(256, &mut out).unwrap();
        io.flush().unwrap();

        let s = io.snapshot();
        assert_eq!(s.writes, 2);
        assert_eq!(s.write_bytes, 260);
        assert_eq!(s.aligned_writes, 1);
        assert_eq!(s.unaligned_writes, 1);
        assert_eq!(s.reads, 1);
        assert_eq!(s.aligned_reads, 1);
        assert_eq!(s.flushes, 1);
    }
}
