// SPDX-License-Identifier: MIT

//! Byte and sector access to disk images.
//!
//! [`DkbIO`] addresses a backing store by byte offset; [`sector::SectorDisk`]
//! turns one into the [`sector::SectorStore`] the filesystem layer reads.

pub mod error;
pub mod sector;
pub mod stats;

mod mem;
mod stdio;

pub mod prelude {
    pub use super::DkbIO;
    pub use super::error::*;
    pub use super::mem::MemIO;
    pub use super::sector::*;
    pub use super::stats::*;
    pub use super::stdio::StdIO;
}

use error::*;

/// Largest run `fill` hands to one `write_at` call.
pub const FILL_RUN: usize = 4096;

/// Byte-addressed backing store of a disk image.
pub trait DkbIO {
    fn write_at(&mut self, offset: u64, data: &[u8]) -> DkbIOResult;

    /// Reads exactly `buf.len()` bytes; a short store is `OutOfBounds`.
    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> DkbIOResult;

    fn flush(&mut self) -> DkbIOResult {
        Ok(())
    }

    /// Store length in bytes, if known.
    fn len(&self) -> Option<u64> {
        None
    }

    /// Writes `len` copies of `value` from `offset`, used for format fill codes.
    fn fill(&mut self, offset: u64, len: usize, value: u8) -> DkbIOResult {
        let run = [value; FILL_RUN];
        let mut done = 0;
        while done < len {
            let n = (len - done).min(FILL_RUN);
            self.write_at(offset + done as u64, &run[..n])?;
            done += n;
        }
        Ok(())
    }
}
