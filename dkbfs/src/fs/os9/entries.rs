// SPDX-License-Identifier: MIT

//! 32-byte directory slots: a high-bit terminated name and the 3-byte LSN
//! of the file descriptor.

use crate::core::utils::bytes_utils::{u24_be, u24_be_bytes};
use crate::fs::os9::constant::*;

/// Name bytes with the last character's high bit set.
pub fn encode_name(name: &str) -> Vec<u8> {
    let mut b: Vec<u8> = name.bytes().map(|c| c & 0x7F).collect();
    if let Some(last) = b.last_mut() {
        *last |= 0x80;
    }
    b
}

/// Decodes up to the high-bit or NUL terminator. `None` for non-ASCII
/// garbage.
pub fn decode_name(raw: &[u8]) -> Option<String> {
    let mut out = String::new();
    for &b in raw {
        if b == 0 {
            break;
        }
        let c = b & 0x7F;
        if !(0x20..0x7F).contains(&c) {
            return None;
        }
        out.push(c as char);
        if b & 0x80 != 0 {
            break;
        }
    }
    Some(out)
}

/// `(name, fd_lsn)` of a used slot.
pub fn decode_slot(raw: &[u8]) -> Option<(String, u32)> {
    if raw.len() < OS9_SLOT_SIZE || raw[0] == 0 {
        return None;
    }
    let name = decode_name(&raw[..OS9_SLOT_NAME_LEN])?;
    let lsn = u24_be([raw[29], raw[30], raw[31]]);
    Some((name, lsn))
}

pub fn encode_slot(name: &str, fd_lsn: u32, raw: &mut [u8]) {
    let enc = encode_name(name);
    let n = enc.len().min(OS9_SLOT_NAME_LEN);
    raw[..OS9_SLOT_NAME_LEN].fill(0);
    raw[..n].copy_from_slice(&enc[..n]);
    if n == OS9_SLOT_NAME_LEN {
        raw[n - 1] |= 0x80;
    }
    raw[29..32].copy_from_slice(&u24_be_bytes(fd_lsn));
}
