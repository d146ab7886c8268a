// SPDX-License-Identifier: MIT

use thiserror::Error;

pub use dkbio::error::*;

/// Group allocation failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FsAllocError {
    #[error("no free groups left")]
    DiskFull,

    /// The chain would need more extents than the format can record.
    #[error("allocation too fragmented")]
    TooFragmented,

    #[error("invalid group {0}")]
    InvalidGroup(u32),

    #[error("loop detected in chain at group {0}")]
    LoopDetected(u32),
}

/// Top-level error
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FsError {
    /// No template matches the disk (or the hint).
    #[error("unsupported disk format")]
    Unsupported,

    #[error("parameter area invalid")]
    ParameterAreaInvalid,

    #[error("allocation table invalid")]
    FatAreaInvalid,

    #[error("directory area invalid")]
    DirectoryAreaInvalid,

    #[error("disk is not formatted")]
    NotFormatted,

    /// Session used before a successful parse and assign.
    #[error("no filesystem assigned")]
    NotAssigned,

    #[error("disk is write protected")]
    WriteProtected,

    #[error("disk full")]
    DiskFull,

    #[error("directory full")]
    DirectoryFull,

    #[error("file not found: {0}")]
    FileNotFound(String),

    #[error("file already exists: {0}")]
    FileAlreadyExists(String),

    #[error("cannot delete {0}")]
    NotDeletable(String),

    #[error("cannot rename {0}")]
    NotRenameable(String),

    #[error("invalid file name: {0}")]
    InvalidName(String),

    #[error("no sector {0}")]
    NoSector(u32),

    #[error("invalid sector {0}")]
    InvalidSector(u32),

    #[error("verify mismatch at byte {offset}")]
    VerifyMismatch { offset: u64 },

    #[error("template error: {0}")]
    Template(String),

    /// Caller-side stream (source or sink) failure.
    #[error("stream: {0}")]
    Stream(String),

    #[error(transparent)]
    Alloc(FsAllocError),

    #[error(transparent)]
    IO(DkbIOError),
}

impl From<DkbIOError> for FsError {
    fn from(e: DkbIOError) -> Self {
        match e {
            DkbIOError::NoSector(n) => FsError::NoSector(n),
            DkbIOError::InvalidSector(n) => FsError::InvalidSector(n),
            DkbIOError::WriteProtected => FsError::WriteProtected,
            other => FsError::IO(other),
        }
    }
}

impl From<FsAllocError> for FsError {
    fn from(e: FsAllocError) -> Self {
        match e {
            FsAllocError::DiskFull | FsAllocError::TooFragmented => FsError::DiskFull,
            other => FsError::Alloc(other),
        }
    }
}

impl From<std::io::Error> for FsError {
    #[cold]
    fn from(e: std::io::Error) -> Self {
        FsError::Stream(e.to_string())
    }
}

// === type Fs*Result ===

pub type FsResult<T = ()> = Result<T, FsError>;
pub type FsAllocResult<T = ()> = Result<T, FsAllocError>;

/// Confidence score produced by detection checks: `[0.0, 1.0]`, negative on
/// hard contradiction.
pub type Ratio = f64;
