// SPDX-License-Identifier: MIT

use crate::{DkbIO, DkbIOError, DkbIOResult};

/// Image held in a caller-owned buffer.
#[derive(Debug)]
pub struct MemIO<'a> {
    image: &'a mut [u8],
}

impl<'a> MemIO<'a> {
    #[inline]
    pub fn new(image: &'a mut [u8]) -> Self {
        Self { image }
    }

    fn span(&self, offset: u64, len: usize) -> DkbIOResult<core::ops::Range<usize>> {
        let start = usize::try_from(offset).map_err(|_| DkbIOError::OutOfBounds)?;
        let end = start.checked_add(len).ok_or(DkbIOError::OutOfBounds)?;
        if end > self.image.len() {
            return Err(DkbIOError::OutOfBounds);
        }
        Ok(start..end)
    }
}

impl DkbIO for MemIO<'_> {
    fn write_at(&mut self, offset: u64, data: &[u8]) -> DkbIOResult {
        let span = self.span(offset, data.len())?;
        self.image[span].copy_from_slice(data);
        Ok(())
    }

    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> DkbIOResult {
        let span = self.span(offset, buf.len())?;
        buf.copy_from_slice(&self.image[span]);
        Ok(())
    }

    fn len(&self) -> Option<u64> {
        Some(self.image.len() as u64)
    }

    fn fill(&mut self, offset: u64, len: usize, value: u8) -> DkbIOResult {
        let span = self.span(offset, len)?;
        self.image[span].fill(value);
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use crate::prelude::*;

    #[test]
    fn reads_back_what_was_written() {
        let mut image = [0u8; 256];
        let mut io = MemIO::new(&mut image);
        io.write_at(10, &[1, 2, 3, 4]).unwrap();

        let mut out = [0u8; 4];
        io.read_at(10, &mut out).unwrap();
        assert_eq!(out, [1, 2, 3, 4]);
        assert_eq!(io.len(), Some(256));
    }

    #[test]
    fn access_past_the_end_fails() {
        let mut image = [0u8; 16];
        let mut io = MemIO::new(&mut image);
        assert_eq!(io.write_at(14, &[0; 4]), Err(DkbIOError::OutOfBounds));
        assert_eq!(io.fill(15, 2, 0xE5), Err(DkbIOError::OutOfBounds));
        let mut out = [0u8; 1];
        assert_eq!(io.read_at(16, &mut out), Err(DkbIOError::OutOfBounds));
        assert_eq!(io.read_at(u64::MAX, &mut out), Err(DkbIOError::OutOfBounds));
    }

    #[test]
    fn fill_covers_only_the_requested_run() {
        let mut image = [0xFF; 64];
        MemIO::new(&mut image).fill(20, 4, 0xE5).unwrap();
        assert_eq!(image[19], 0xFF);
        assert_eq!(image[20..24], [0xE5; 4]);
        assert_eq!(image[24], 0xFF);
    }
}
