// SPDX-License-Identifier: MIT

//! Format-neutral view of one directory slot.

use time::PrimitiveDateTime;

use crate::core::{attr::FileAttr, utils::path_utils::join_name_ext};

/// Location of a slot on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotPos {
    pub lsn: u32,
    pub offset: u16,
}

/// OS-9 file-descriptor fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Os9Extra {
    pub fd_lsn: u32,
    pub link_count: u8,
    pub owner: u16,
    /// `FD.ATT` as stored.
    pub native_attr: u8,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DirectoryEntry {
    pub used: bool,
    /// Slot bytes as read from (or last written to) disk.
    pub raw: Vec<u8>,
    pub name: String,
    pub ext: String,
    /// Human68k second name part, already folded into `name`.
    pub ext_name: Option<String>,
    pub attr: FileAttr,
    /// Attribute byte as stored in the slot.
    pub native_attr: u8,
    /// First group; the file-descriptor LSN on OS-9.
    pub start_group: u32,
    pub size: u64,
    pub modified: Option<PrimitiveDateTime>,
    pub created: Option<PrimitiveDateTime>,
    pub accessed: Option<PrimitiveDateTime>,
    pub os9: Option<Os9Extra>,
}

impl DirectoryEntry {
    /// Unused slot carrying its raw bytes.
    pub fn unused(raw: Vec<u8>) -> Self {
        Self {
            raw,
            ..Default::default()
        }
    }

    /// Entry supplied by a caller for a new file.
    pub fn new_file(name: &str, ext: &str, attr: FileAttr) -> Self {
        Self {
            used: true,
            name: name.to_string(),
            ext: ext.to_string(),
            attr,
            ..Default::default()
        }
    }

    /// Display name, `NAME.EXT` or `NAME`.
    pub fn full_name(&self) -> String {
        join_name_ext(&self.name, &self.ext)
    }

    #[inline]
    pub fn is_dir(&self) -> bool {
        self.attr.is_dir()
    }

    #[inline]
    pub fn is_volume_label(&self) -> bool {
        self.attr.contains(FileAttr::VOLUME)
    }

    #[inline]
    pub fn is_dot(&self) -> bool {
        self.name == "." && self.ext.is_empty()
    }

    #[inline]
    pub fn is_dotdot(&self) -> bool {
        self.name == ".." && self.ext.is_empty()
    }

    /// `.` or `..` alias.
    #[inline]
    pub fn is_alias(&self) -> bool {
        self.is_dot() || self.is_dotdot()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_and_aliases() {
        let e = DirectoryEntry::new_file("GAME", "BAS", FileAttr::ARCHIVE);
        assert_eq!(e.full_name(), "GAME.BAS");
        assert!(!e.is_alias());

        let d = DirectoryEntry::new_file("..", "", FileAttr::DIRECTORY);
        assert!(d.is_dotdot() && d.is_alias() && d.is_dir());
        assert!(!DirectoryEntry::unused(vec![0; 32]).used);
    }
}
