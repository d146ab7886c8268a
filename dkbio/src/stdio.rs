// SPDX-License-Identifier: MIT

use std::io::{Read, Seek, SeekFrom, Write};

use crate::{DkbIO, DkbIOResult};

/// Image behind any seekable stream, usually an image file.
///
/// The length is sampled once and then tracked across writes.
#[derive(Debug)]
pub struct StdIO<'a, T: Read + Write + Seek> {
    stream: &'a mut T,
    len: Option<u64>,
}

impl<'a, T: Read + Write + Seek> StdIO<'a, T> {
    pub fn new(stream: &'a mut T) -> Self {
        let len = stream.seek(SeekFrom::End(0)).ok();
        Self { stream, len }
    }
}

impl<T: Read + Write + Seek> DkbIO for StdIO<'_, T> {
    fn write_at(&mut self, offset: u64, data: &[u8]) -> DkbIOResult {
        self.stream.seek(SeekFrom::Start(offset))?;
        self.stream.write_all(data)?;
        let end = offset + data.len() as u64;
        self.len = self.len.map(|l| l.max(end));
        Ok(())
    }

    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> DkbIOResult {
        self.stream.seek(SeekFrom::Start(offset))?;
        self.stream.read_exact(buf)?;
        Ok(())
    }

    fn flush(&mut self) -> DkbIOResult {
        Ok(self.stream.flush()?)
    }

    fn len(&self) -> Option<u64> {
        self.len
    }
}

#[cfg(test)]
mod test {
    use std::io::Cursor;

    use crate::prelude::*;
    use tempfile::tempfile;

    #[test]
    fn file_grows_with_writes() {
        let mut file = tempfile().unwrap();
        let mut io = StdIO::new(&mut file);
        assert_eq!(io.len(), Some(0));
        io.write_at(10, &[1, 2, 3, 4]).unwrap();

        let mut out = [0u8; 4];
        io.read_at(10, &mut out).unwrap();
        assert_eq!(out, [1, 2, 3, 4]);
        assert_eq!(io.len(), Some(14));
    }

    #[test]
    fn short_read_is_out_of_bounds() {
        let mut cursor = Cursor::new(vec![0u8; 16]);
        let mut io = StdIO::new(&mut cursor);
        let mut out = [0u8; 8];
        assert_eq!(io.read_at(12, &mut out), Err(DkbIOError::OutOfBounds));
    }

    #[test]
    fn fill_writes_the_value() {
        let mut file = tempfile().unwrap();
        let mut io = StdIO::new(&mut file);
        io.write_at(42, &[0xFF; 8]).unwrap();
        io.fill(42, 8, 0xE5).unwrap();

        let mut out = [0xAA; 8];
        io.read_at(42, &mut out).unwrap();
        assert_eq!(out, [0xE5; 8]);
    }
}
