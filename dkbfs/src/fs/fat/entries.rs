// SPDX-License-Identifier: MIT

//! 32-byte FAT directory slots, MS-DOS and Human68k flavours.

use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

use crate::core::{
    attr::{FatAttr, FileAttr},
    entry::DirectoryEntry,
    utils::{bytes_utils::*, time_utils},
};
use crate::fs::fat::constant::*;

#[derive(IntoBytes, FromBytes, KnownLayout, Immutable, Unaligned, Copy, Clone, Debug)]
#[repr(C)]
pub struct FatSlot {
    pub name: [u8; 8],
    pub ext: [u8; 3],
    pub attr: u8,
    /// MS-DOS: NT flags, create time/date, access date, high cluster.
    /// Human68k: the second 10 name bytes.
    pub reserved: [u8; 10],
    pub time: [u8; 2],
    pub date: [u8; 2],
    pub cluster: [u8; 2],
    pub size: [u8; 4],
}

/// Family-specific slot conventions.
#[derive(Debug, Clone, Copy)]
pub struct SlotStyle {
    pub endian: Endian,
    pub long_names: bool,
    pub delete_code: u8,
    pub space_code: u8,
}

impl SlotStyle {
    pub fn decode(&self, raw: &[u8]) -> Option<DirectoryEntry> {
        let (slot, _) = FatSlot::read_from_prefix(raw).ok()?;
        let first = slot.name[0];
        if first == FAT_ENTRY_END_OF_DIR || first == self.delete_code {
            return None;
        }

        let mut name_bytes = slot.name.to_vec();
        if first == FAT_ENTRY_KANJI_E5 {
            name_bytes[0] = 0xE5;
        }
        let mut name = trim_field(&name_bytes, self.space_code);
        let mut ext_name = None;
        if self.long_names && slot.reserved[0] != 0 && slot.attr != FAT_ATTR_LFN {
            let more = trim_field(&slot.reserved, self.space_code);
            name = format!("{}{more}", latin_string(&name_bytes));
            ext_name = Some(more);
        }

        let native = slot.attr;
        let attr = if native == FAT_ATTR_LFN {
            // long-name records stay in place but never list
            FileAttr::VOLUME | FileAttr::HIDDEN | FileAttr::SYSTEM | FileAttr::READ_ONLY
        } else {
            FatAttr::from_bits_truncate(native).to_common()
        };

        let e = self.endian;
        let modified = time_utils::fat_unpack(e.u16(slot.date), e.u16(slot.time));
        let (created, accessed) = if self.long_names {
            (None, None)
        } else {
            let r = &slot.reserved;
            (
                time_utils::fat_unpack(e.u16([r[4], r[5]]), e.u16([r[2], r[3]])),
                time_utils::fat_unpack(e.u16([r[6], r[7]]), 0),
            )
        };

        Some(DirectoryEntry {
            used: true,
            raw: raw.to_vec(),
            name: name.trim_end().to_string(),
            ext: trim_field(&slot.ext, self.space_code),
            ext_name,
            attr,
            native_attr: native,
            start_group: e.u16(slot.cluster) as u32,
            size: e.u32(slot.size) as u64,
            modified,
            created,
            accessed,
            os9: None,
        })
    }

    /// Writes `entry` into `raw`, keeping bytes this crate does not manage.
    pub fn encode(&self, entry: &DirectoryEntry, raw: &mut [u8]) {
        let Ok((mut slot, _)) = FatSlot::read_from_prefix(raw) else {
            return;
        };
        let e = self.endian;

        let base = latin_bytes(&entry.name);
        let (head, tail) = base.split_at(base.len().min(FAT_NAME_LEN));
        slot.name = pad_field(head, self.space_code);
        if slot.name[0] == 0xE5 {
            slot.name[0] = FAT_ENTRY_KANJI_E5;
        }
        if self.long_names {
            slot.reserved = pad_field(tail, 0);
        }
        slot.ext = pad_field(&latin_bytes(&entry.ext), self.space_code);

        let known = FatAttr::from_common(entry.attr).bits();
        // keep native bits the common mask does not model
        slot.attr = known | (entry.native_attr & !FatAttr::all().bits());

        if let Some(dt) = entry.modified {
            let (date, time) = time_utils::fat_pack(dt);
            slot.date = e.u16_bytes(date);
            slot.time = e.u16_bytes(time);
        }
        if !self.long_names {
            if let Some(dt) = entry.created {
                let (date, time) = time_utils::fat_pack(dt);
                slot.reserved[2..4].copy_from_slice(&e.u16_bytes(time));
                slot.reserved[4..6].copy_from_slice(&e.u16_bytes(date));
            }
            if let Some(dt) = entry.accessed {
                let (date, _) = time_utils::fat_pack(dt);
                slot.reserved[6..8].copy_from_slice(&e.u16_bytes(date));
            }
        }
        slot.cluster = e.u16_bytes(entry.start_group as u16);
        let size = if entry.is_dir() { 0 } else { entry.size as u32 };
        slot.size = e.u32_bytes(size);

        raw[..FAT_SLOT_SIZE].copy_from_slice(slot.as_bytes());
    }

    /// Slot bytes of a `.` / `..` record.
    pub fn dot_slot(&self, name: &[u8; 11], cluster: u32, dt: time::PrimitiveDateTime) -> [u8; FAT_SLOT_SIZE] {
        let e = self.endian;
        let (date, time) = time_utils::fat_pack(dt);
        let slot = FatSlot {
            name: pad_field(&name[..FAT_NAME_LEN], b' '),
            ext: pad_field(&name[FAT_NAME_LEN..], b' '),
            attr: FatAttr::DIRECTORY.bits(),
            reserved: [0; 10],
            time: e.u16_bytes(time),
            date: e.u16_bytes(date),
            cluster: e.u16_bytes(cluster as u16),
            size: [0; 4],
        };
        let mut out = [0u8; FAT_SLOT_SIZE];
        out.copy_from_slice(slot.as_bytes());
        out
    }

    /// Whether a used slot looks sane for a volume of `max_cluster` groups.
    pub fn plausible(&self, raw: &[u8], max_cluster: u32) -> bool {
        let Ok((slot, _)) = FatSlot::read_from_prefix(raw) else {
            return false;
        };
        if slot.attr == FAT_ATTR_LFN {
            return true;
        }
        if slot.attr & 0xC0 != 0 {
            return false;
        }
        let printable = |b: &u8| *b >= 0x20 && *b != 0x7F;
        let name_ok = slot.name[1..].iter().all(printable)
            && (printable(&slot.name[0]) || slot.name[0] == FAT_ENTRY_KANJI_E5)
            && slot.ext.iter().all(printable);
        let cluster = self.endian.u16(slot.cluster) as u32;
        let cluster_ok = cluster == 0 || (FAT_FIRST_CLUSTER..=max_cluster).contains(&cluster);
        name_ok && cluster_ok
    }
}
