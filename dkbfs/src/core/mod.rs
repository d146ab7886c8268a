// SPDX-License-Identifier: MIT

#[macro_use]
mod macros;

// === Sub-modules ===
pub mod alloc_map;
pub mod attr;
pub mod chain;
pub mod entry;
pub mod error;
pub mod params;
pub mod report;
pub mod tree;
pub mod utils;

// === Error types ===
pub use error::*;

// === Common types ===
pub use alloc_map::{AllocMode, AllocationMap, GroupState};
pub use attr::FileAttr;
pub use chain::{GroupChain, GroupItem};
pub use entry::DirectoryEntry;
pub use params::{FormatKind, FormatParameters, TemplateTable, TypeNumber};
pub use report::{Report, Severity};
pub use tree::{DirectoryTree, NodeId};
