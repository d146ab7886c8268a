// SPDX-License-Identifier: MIT

// === Identification Sector (LSN0) ===

pub const OS9_ID_SECTOR: u32 = 0;
pub const OS9_ID_SIZE: usize = 63;
pub const OS9_MAP_START: u32 = 1;
pub const OS9_NAME_LEN: usize = 32;

// DD.FMT bits
pub const OS9_FMT_DOUBLE_SIDED: u8 = 0x01;
pub const OS9_FMT_DOUBLE_DENSITY: u8 = 0x02;
pub const OS9_FMT_DOUBLE_TRACK: u8 = 0x04;

// === File Descriptor ===

pub const OS9_FD_SIZE: usize = 256;
pub const OS9_SEGMENTS: usize = 48;
pub const OS9_SEGMENT_MAX_SECTORS: u32 = 0xFFFF;

// === Directory Slots ===

pub const OS9_SLOT_SIZE: usize = 32;
pub const OS9_SLOT_NAME_LEN: usize = 29;
/// `..` then `.`: the fixed head of every directory.
pub const OS9_DIR_MIN_SIZE: u64 = 2 * OS9_SLOT_SIZE as u64;
pub const OS9_DOTDOT_NAME: &[u8] = &[b'.', b'.' | 0x80];
pub const OS9_DOT_NAME: &[u8] = &[b'.' | 0x80];
