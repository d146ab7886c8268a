// SPDX-License-Identifier: MIT

//! DISK BASIC filesystem drivers: FAT12, FAT16 (little and big-endian),
//! Human68k and OS-9 RBF over a [`dkbio::sector::SectorStore`].

// Core Modules
#[macro_use]
pub mod core;
pub mod driver;
pub mod fs;
pub mod session;

// Reusable types
pub use crate::core::*;
pub use driver::{Driver, FormatDriver, FreeSpace, VolumeMeta};
pub use session::{FilesystemSession, LoadMode, SessionState, VerifyOutcome};

pub mod prelude {
    pub use crate::core::utils::path_utils::*;
    pub use crate::core::*;
    pub use crate::driver::{Driver, FormatDriver, FreeSpace, VolumeMeta};
    pub use crate::session::{FilesystemSession, LoadMode, SessionState, VerifyOutcome};
    pub use dkbio::prelude::*;
}
