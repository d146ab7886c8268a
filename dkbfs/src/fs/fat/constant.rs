// SPDX-License-Identifier: MIT

// === Boot Sector ===

pub const FAT_BOOT_SECTOR: u32 = 0;
pub const FAT_BPB_SIZE: usize = 62;
pub const FAT_JUMP_BOOT: [u8; 3] = [0xEB, 0x3C, 0x90]; // BS_jmpBoot
pub const FAT_OEM_NAME: &[u8; 8] = b"DKBFS1.0"; // BS_OEMName
pub const FAT_BOOT_SIGNATURE: u8 = 0x29; // BS_BootSig
pub const FAT_SIGNATURE: [u8; 2] = [0x55, 0xAA];
pub const FAT_SIGNATURE_OFFSET: usize = 510;
pub const FAT_FS_TYPE_12: &[u8; 8] = b"FAT12   ";
pub const FAT_FS_TYPE_16: &[u8; 8] = b"FAT16   ";
pub const FAT_VOLUME_LABEL_EMPTY: &[u8; 11] = b"NO NAME    ";

// === Human68k Boot Sector ===

pub const HU68K_BPB_SIZE: usize = 0x26;
pub const HU68K_JUMP_BOOT: [u8; 2] = [0x60, 0x24]; // bra.s past the BPB
pub const HU68K_OEM_NAME: &[u8; 16] = b"Hudson soft 2.00";
pub const HU68K_OEM_PREFIX: &[u8] = b"Hudson soft";

// === FAT Region ===

pub const FAT_FIRST_CLUSTER: u32 = 2;
/// Smallest cluster heap a format lays out.
pub const FAT_MIN_CLUSTERS: u32 = 16;
/// Cluster count from which a 12-bit table no longer fits.
pub const FAT12_MAX_CLUSTERS: u32 = 4085;
pub const FAT16_MAX_CLUSTERS: u32 = 65525;
pub const FAT_MIN_MEDIA: u8 = 0xF0;

// === Directory Slots ===

pub const FAT_SLOT_SIZE: usize = 32;
pub const FAT_NAME_LEN: usize = 8;
pub const FAT_EXT_LEN: usize = 3;
pub const HU68K_NAME2_LEN: usize = 10;
pub const FAT_ENTRY_END_OF_DIR: u8 = 0x00;
/// Stand-in for a real leading 0xE5 name byte.
pub const FAT_ENTRY_KANJI_E5: u8 = 0x05;
pub const FAT_ATTR_LFN: u8 = 0x0F;
pub const FAT_DOT_NAME: &[u8; 11] = b".          ";
pub const FAT_DOTDOT_NAME: &[u8; 11] = b"..         ";
