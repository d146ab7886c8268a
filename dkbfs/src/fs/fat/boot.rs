// SPDX-License-Identifier: MIT

//! Boot-sector parameter blocks.
//!
//! The MS-DOS layout is shared by the little and big-endian families, so
//! multi-byte fields are kept as raw arrays and read through [`Endian`].
//! Human68k always stores its BPB big-endian.

use zerocopy::byteorder::{BigEndian, U16, U32};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

use crate::core::utils::bytes_utils::Endian;
use crate::fs::fat::{constant::*, meta::FatMeta};

#[derive(IntoBytes, FromBytes, KnownLayout, Immutable, Unaligned, Copy, Clone, Debug)]
#[repr(C)]
pub struct MsdosBpb {
    pub jump_boot: [u8; 3],
    pub oem_name: [u8; 8],
    pub bytes_per_sector: [u8; 2],
    pub sectors_per_cluster: u8,
    pub reserved_sectors: [u8; 2],
    pub num_fats: u8,
    pub root_entry_count: [u8; 2],
    pub total_sectors_16: [u8; 2],
    pub media: u8,
    pub fat_size_16: [u8; 2],
    pub sectors_per_track: [u8; 2],
    pub num_heads: [u8; 2],
    pub hidden_sectors: [u8; 4],
    pub total_sectors_32: [u8; 4],

    // Extended BPB
    pub drive_number: u8,
    pub reserved1: u8,
    pub boot_signature: u8,
    pub volume_id: [u8; 4],
    pub volume_label: [u8; 11],
    pub fs_type: [u8; 8],
}

impl MsdosBpb {
    pub fn read(sector: &[u8]) -> Option<Self> {
        Self::read_from_prefix(sector).ok().map(|(b, _)| b)
    }

    pub fn to_meta(&self, e: Endian) -> FatMeta {
        let total16 = e.u16(self.total_sectors_16) as u32;
        FatMeta {
            bytes_per_sector: e.u16(self.bytes_per_sector),
            sectors_per_cluster: self.sectors_per_cluster,
            reserved_sectors: e.u16(self.reserved_sectors),
            num_fats: self.num_fats,
            root_entries: e.u16(self.root_entry_count),
            total_sectors: if total16 != 0 {
                total16
            } else {
                e.u32(self.total_sectors_32)
            },
            media: self.media,
            sectors_per_fat: e.u16(self.fat_size_16),
            sectors_per_track: e.u16(self.sectors_per_track),
            heads: e.u16(self.num_heads),
            hidden_sectors: e.u32(self.hidden_sectors),
            volume_id: if self.boot_signature == FAT_BOOT_SIGNATURE {
                e.u32(self.volume_id)
            } else {
                0
            },
            volume_label: if self.boot_signature == FAT_BOOT_SIGNATURE {
                self.volume_label
            } else {
                *FAT_VOLUME_LABEL_EMPTY
            },
        }
    }

    pub fn from_meta(meta: &FatMeta, e: Endian, wide: bool) -> Self {
        let (total16, total32) = match u16::try_from(meta.total_sectors) {
            Ok(t) => (t, 0),
            Err(_) => (0, meta.total_sectors),
        };
        Self {
            jump_boot: FAT_JUMP_BOOT,
            oem_name: *FAT_OEM_NAME,
            bytes_per_sector: e.u16_bytes(meta.bytes_per_sector),
            sectors_per_cluster: meta.sectors_per_cluster,
            reserved_sectors: e.u16_bytes(meta.reserved_sectors),
            num_fats: meta.num_fats,
            root_entry_count: e.u16_bytes(meta.root_entries),
            total_sectors_16: e.u16_bytes(total16),
            media: meta.media,
            fat_size_16: e.u16_bytes(meta.sectors_per_fat),
            sectors_per_track: e.u16_bytes(meta.sectors_per_track),
            num_heads: e.u16_bytes(meta.heads),
            hidden_sectors: e.u32_bytes(meta.hidden_sectors),
            total_sectors_32: e.u32_bytes(total32),
            drive_number: if meta.media == 0xF8 { 0x80 } else { 0x00 },
            reserved1: 0,
            boot_signature: FAT_BOOT_SIGNATURE,
            volume_id: e.u32_bytes(meta.volume_id),
            volume_label: meta.volume_label,
            fs_type: if wide {
                *FAT_FS_TYPE_16
            } else {
                *FAT_FS_TYPE_12
            },
        }
    }

    /// x86 short or near jump.
    pub fn has_jump(&self) -> bool {
        matches!(self.jump_boot[0], 0xEB | 0xE9)
    }
}

#[derive(IntoBytes, FromBytes, KnownLayout, Immutable, Unaligned, Copy, Clone, Debug)]
#[repr(C)]
pub struct Hu68kBpb {
    pub jump_boot: [u8; 2],
    pub oem_name: [u8; 16],
    pub bytes_per_sector: U16<BigEndian>,
    pub sectors_per_cluster: u8,
    pub num_fats: u8,
    pub reserved_sectors: U16<BigEndian>,
    pub root_entry_count: U16<BigEndian>,
    pub total_sectors_16: U16<BigEndian>,
    pub media: u8,
    pub fat_size: u8,
    pub start_sector: U32<BigEndian>,
    pub total_sectors_32: U32<BigEndian>,
}

impl Hu68kBpb {
    pub fn read(sector: &[u8]) -> Option<Self> {
        Self::read_from_prefix(sector).ok().map(|(b, _)| b)
    }

    pub fn to_meta(&self) -> FatMeta {
        let total16 = self.total_sectors_16.get() as u32;
        FatMeta {
            bytes_per_sector: self.bytes_per_sector.get(),
            sectors_per_cluster: self.sectors_per_cluster,
            reserved_sectors: self.reserved_sectors.get(),
            num_fats: self.num_fats,
            root_entries: self.root_entry_count.get(),
            total_sectors: if total16 != 0 {
                total16
            } else {
                self.total_sectors_32.get()
            },
            media: self.media,
            sectors_per_fat: self.fat_size as u16,
            sectors_per_track: 0,
            heads: 0,
            hidden_sectors: self.start_sector.get(),
            volume_id: 0,
            volume_label: *FAT_VOLUME_LABEL_EMPTY,
        }
    }

    pub fn from_meta(meta: &FatMeta) -> Self {
        let (total16, total32) = match u16::try_from(meta.total_sectors) {
            Ok(t) => (t, 0),
            Err(_) => (0, meta.total_sectors),
        };
        Self {
            jump_boot: HU68K_JUMP_BOOT,
            oem_name: *HU68K_OEM_NAME,
            bytes_per_sector: U16::new(meta.bytes_per_sector),
            sectors_per_cluster: meta.sectors_per_cluster,
            num_fats: meta.num_fats,
            reserved_sectors: U16::new(meta.reserved_sectors),
            root_entry_count: U16::new(meta.root_entries),
            total_sectors_16: U16::new(total16),
            media: meta.media,
            fat_size: meta.sectors_per_fat.min(u8::MAX as u16) as u8,
            start_sector: U32::new(meta.hidden_sectors),
            total_sectors_32: U32::new(total32),
        }
    }

    /// 68000 `bra` opcode.
    pub fn has_jump(&self) -> bool {
        self.jump_boot[0] == 0x60
    }

    pub fn has_oem(&self) -> bool {
        self.oem_name.starts_with(HU68K_OEM_PREFIX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta() -> FatMeta {
        FatMeta {
            bytes_per_sector: 512,
            sectors_per_cluster: 2,
            reserved_sectors: 1,
            num_fats: 2,
            root_entries: 112,
            total_sectors: 1440,
            media: 0xF9,
            sectors_per_fat: 3,
            sectors_per_track: 9,
            heads: 2,
            hidden_sectors: 0,
            volume_id: 0x1234_5678,
            volume_label: *b"DKB        ",
        }
    }

    #[test]
    fn msdos_bpb_offsets() {
        assert_eq!(core::mem::size_of::<MsdosBpb>(), FAT_BPB_SIZE);
        let bpb = MsdosBpb::from_meta(&meta(), Endian::Little, false);
        let raw = bpb.as_bytes();
        assert_eq!(&raw[0x0B..0x0D], &[0x00, 0x02]);
        assert_eq!(raw[0x0D], 2);
        assert_eq!(&raw[0x11..0x13], &[112, 0]);
        assert_eq!(&raw[0x13..0x15], &[0xA0, 0x05]);
        assert_eq!(raw[0x15], 0xF9);
        assert_eq!(&raw[0x36..0x3E], FAT_FS_TYPE_12);
    }

    #[test]
    fn msdos_bpb_big_endian_fields() {
        let bpb = MsdosBpb::from_meta(&meta(), Endian::Big, true);
        let raw = bpb.as_bytes();
        assert_eq!(&raw[0x0B..0x0D], &[0x02, 0x00]);
        let back = MsdosBpb::read(raw).unwrap().to_meta(Endian::Big);
        assert_eq!(back, meta());
    }

    #[test]
    fn hu68k_bpb_offsets() {
        assert_eq!(core::mem::size_of::<Hu68kBpb>(), HU68K_BPB_SIZE);
        let mut m = meta();
        m.bytes_per_sector = 1024;
        m.sectors_per_cluster = 1;
        m.root_entries = 192;
        m.total_sectors = 1232;
        m.media = 0xFE;
        m.sectors_per_fat = 2;
        let bpb = Hu68kBpb::from_meta(&m);
        let raw = bpb.as_bytes();
        assert_eq!(&raw[2..18], HU68K_OEM_NAME);
        assert_eq!(&raw[0x12..0x14], &[0x04, 0x00]);
        assert_eq!(raw[0x14], 1);
        assert_eq!(raw[0x15], 2);
        assert_eq!(&raw[0x18..0x1A], &[0x00, 0xC0]);
        assert_eq!(&raw[0x1A..0x1C], &[0x04, 0xD0]);
        assert_eq!(raw[0x1C], 0xFE);
        assert_eq!(raw[0x1D], 2);
        let back = Hu68kBpb::read(raw).unwrap();
        assert!(back.has_jump() && back.has_oem());
        assert_eq!(back.to_meta().total_sectors, 1232);
    }
}
