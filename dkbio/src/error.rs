// SPDX-License-Identifier: MIT

use thiserror::Error;

/// Result type for sector and byte I/O.
pub type DkbIOResult<T = ()> = core::result::Result<T, DkbIOError>;

/// Error type for sector and byte I/O.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DkbIOError {
    /// Access past the end of the backing store or partition window.
    #[error("out of bounds")]
    OutOfBounds,

    /// The requested sector does not exist on this disk.
    #[error("no sector {0}")]
    NoSector(u32),

    /// The sector exists but the buffer handed in does not match its size.
    #[error("invalid sector {0}")]
    InvalidSector(u32),

    #[error("disk is write protected")]
    WriteProtected,

    #[error("unsupported operation")]
    Unsupported,

    /// Underlying device error, carried as text.
    #[error("io: {0}")]
    Io(String),
}

impl From<std::io::Error> for DkbIOError {
    #[cold]
    #[inline(never)]
    fn from(e: std::io::Error) -> Self {
        match e.kind() {
            std::io::ErrorKind::UnexpectedEof => DkbIOError::OutOfBounds,
            _ => DkbIOError::Io(e.to_string()),
        }
    }
}
