// SPDX-License-Identifier: MIT

use crate::core::error::*;

bitflags::bitflags! {
    /// Cross-format attribute bits carried by every directory entry.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct FileAttr: u16 {
        const READ_ONLY  = 0x0001;
        const HIDDEN     = 0x0002;
        const SYSTEM     = 0x0004;
        const VOLUME     = 0x0008;
        const DIRECTORY  = 0x0010;
        const ARCHIVE    = 0x0020;
        const ENCRYPTED  = 0x0040;
        const EXECUTABLE = 0x0080;
        const SHARED     = 0x0100;
    }
}

impl FileAttr {
    /// Parses `"HIDDEN | SYSTEM"` style text, as used in template tables.
    pub fn parse(text: &str) -> FsResult<Self> {
        bitflags::parser::from_str::<FileAttr>(text)
            .map_err(|e| FsError::Template(format!("attribute {text:?}: {e}")))
    }

    #[inline]
    pub fn is_dir(&self) -> bool {
        self.contains(FileAttr::DIRECTORY)
    }

    /// Six-column listing form, `DRHSA-`.
    pub fn short(&self) -> String {
        [
            (FileAttr::DIRECTORY, 'D'),
            (FileAttr::READ_ONLY, 'R'),
            (FileAttr::HIDDEN, 'H'),
            (FileAttr::SYSTEM, 'S'),
            (FileAttr::ARCHIVE, 'A'),
            (FileAttr::EXECUTABLE, 'E'),
        ]
        .iter()
        .map(|&(f, c)| if self.contains(f) { c } else { '-' })
        .collect()
    }
}

bitflags::bitflags! {
    /// FAT / Human68k directory attribute byte.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct FatAttr: u8 {
        const READ_ONLY = 0x01;
        const HIDDEN    = 0x02;
        const SYSTEM    = 0x04;
        const VOLUME_ID = 0x08;
        const DIRECTORY = 0x10;
        const ARCHIVE   = 0x20;
        const LFN       = 0x0F;
    }
}

impl FatAttr {
    pub fn to_common(self) -> FileAttr {
        let mut a = FileAttr::empty();
        for (f, c) in FAT_MAP {
            if self.contains(f) {
                a |= c;
            }
        }
        a
    }

    pub fn from_common(attr: FileAttr) -> Self {
        let mut a = FatAttr::empty();
        for (f, c) in FAT_MAP {
            if attr.contains(c) {
                a |= f;
            }
        }
        a
    }
}

const FAT_MAP: [(FatAttr, FileAttr); 6] = [
    (FatAttr::READ_ONLY, FileAttr::READ_ONLY),
    (FatAttr::HIDDEN, FileAttr::HIDDEN),
    (FatAttr::SYSTEM, FileAttr::SYSTEM),
    (FatAttr::VOLUME_ID, FileAttr::VOLUME),
    (FatAttr::DIRECTORY, FileAttr::DIRECTORY),
    (FatAttr::ARCHIVE, FileAttr::ARCHIVE),
];

bitflags::bitflags! {
    /// OS-9 file descriptor attribute byte (`FD.ATT`).
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Os9Attr: u8 {
        const DIR     = 0x80;
        const SHARE   = 0x40;
        const PEXEC   = 0x20;
        const PWRITE  = 0x10;
        const PREAD   = 0x08;
        const EXEC    = 0x04;
        const WRITE   = 0x02;
        const READ    = 0x01;
    }
}

impl Os9Attr {
    /// Read-only means the owner has no write permission.
    pub fn to_common(self) -> FileAttr {
        let mut a = FileAttr::empty();
        if self.contains(Os9Attr::DIR) {
            a |= FileAttr::DIRECTORY;
        }
        if !self.contains(Os9Attr::WRITE) {
            a |= FileAttr::READ_ONLY;
        }
        if self.contains(Os9Attr::EXEC) {
            a |= FileAttr::EXECUTABLE;
        }
        if self.contains(Os9Attr::SHARE) {
            a |= FileAttr::SHARED;
        }
        a
    }

    pub fn from_common(attr: FileAttr) -> Self {
        let mut a = Os9Attr::READ | Os9Attr::PREAD;
        if attr.contains(FileAttr::DIRECTORY) {
            a |= Os9Attr::DIR | Os9Attr::EXEC | Os9Attr::PEXEC;
        }
        if !attr.contains(FileAttr::READ_ONLY) {
            a |= Os9Attr::WRITE;
        }
        if attr.contains(FileAttr::EXECUTABLE) {
            a |= Os9Attr::EXEC | Os9Attr::PEXEC;
        }
        if attr.contains(FileAttr::SHARED) {
            a |= Os9Attr::SHARE;
        }
        a
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fat_mapping_roundtrips_common_bits() {
        let a = FileAttr::READ_ONLY | FileAttr::HIDDEN | FileAttr::ARCHIVE;
        let fat = FatAttr::from_common(a);
        assert_eq!(fat.bits(), 0x23);
        assert_eq!(fat.to_common(), a);
    }

    #[test]
    fn os9_read_only_is_missing_write() {
        let a = Os9Attr::from_bits_truncate(0x8D).to_common();
        assert!(a.is_dir());
        assert!(a.contains(FileAttr::READ_ONLY));
        assert!(a.contains(FileAttr::EXECUTABLE));

        let back = Os9Attr::from_common(FileAttr::empty());
        assert!(back.contains(Os9Attr::WRITE | Os9Attr::READ));
    }

    #[test]
    fn parse_from_template_text() {
        assert_eq!(
            FileAttr::parse("HIDDEN | SYSTEM").unwrap(),
            FileAttr::HIDDEN | FileAttr::SYSTEM
        );
        assert!(FileAttr::parse("BOGUS").is_err());
        assert_eq!(
            (FileAttr::DIRECTORY | FileAttr::READ_ONLY).short(),
            "DR----"
        );
    }
}
