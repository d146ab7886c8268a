// SPDX-License-Identifier: MIT

//! Endian-aware field helpers for on-disk records whose byte order depends
//! on the format family.

/// Byte order of multi-byte fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Endian {
    #[default]
    Little,
    Big,
}

impl Endian {
    #[inline]
    pub fn u16(self, b: [u8; 2]) -> u16 {
        match self {
            Endian::Little => u16::from_le_bytes(b),
            Endian::Big => u16::from_be_bytes(b),
        }
    }

    #[inline]
    pub fn u32(self, b: [u8; 4]) -> u32 {
        match self {
            Endian::Little => u32::from_le_bytes(b),
            Endian::Big => u32::from_be_bytes(b),
        }
    }

    #[inline]
    pub fn u16_bytes(self, v: u16) -> [u8; 2] {
        match self {
            Endian::Little => v.to_le_bytes(),
            Endian::Big => v.to_be_bytes(),
        }
    }

    #[inline]
    pub fn u32_bytes(self, v: u32) -> [u8; 4] {
        match self {
            Endian::Little => v.to_le_bytes(),
            Endian::Big => v.to_be_bytes(),
        }
    }
}

/// Reads a 3-byte big-endian LSN.
#[inline]
pub fn u24_be(b: [u8; 3]) -> u32 {
    (b[0] as u32) << 16 | (b[1] as u32) << 8 | b[2] as u32
}

/// Encodes the low 24 bits of `v` big-endian.
#[inline]
pub fn u24_be_bytes(v: u32) -> [u8; 3] {
    [(v >> 16) as u8, (v >> 8) as u8, v as u8]
}

/// Copies `src` into a fixed field, padded with `pad`.
pub fn pad_field<const N: usize>(src: &[u8], pad: u8) -> [u8; N] {
    let mut out = [pad; N];
    let n = src.len().min(N);
    out[..n].copy_from_slice(&src[..n]);
    out
}

/// Decodes a padded ASCII field, trimming trailing `pad` and NUL bytes.
pub fn trim_field(src: &[u8], pad: u8) -> String {
    let end = src
        .iter()
        .rposition(|&b| b != pad && b != 0)
        .map_or(0, |p| p + 1);
    src[..end].iter().map(|&b| b as char).collect()
}

/// Byte-per-char view of a name; chars past U+00FF become `_`.
pub fn latin_bytes(s: &str) -> Vec<u8> {
    s.chars()
        .map(|c| u8::try_from(c as u32).unwrap_or(b'_'))
        .collect()
}

/// Inverse of [`latin_bytes`].
pub fn latin_string(b: &[u8]) -> String {
    b.iter().map(|&b| b as char).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endian_fields() {
        assert_eq!(Endian::Big.u16([0x04, 0x00]), 0x0400);
        assert_eq!(Endian::Little.u16([0x04, 0x00]), 0x0004);
        assert_eq!(Endian::Big.u32_bytes(0x0102_0304), [1, 2, 3, 4]);
    }

    #[test]
    fn lsn24() {
        assert_eq!(u24_be([0x01, 0x02, 0x03]), 0x010203);
        assert_eq!(u24_be_bytes(0xAB_CDEF), [0xAB, 0xCD, 0xEF]);
    }

    #[test]
    fn padded_fields() {
        let f: [u8; 8] = pad_field(b"README", b' ');
        assert_eq!(&f, b"README  ");
        assert_eq!(trim_field(&f, b' '), "README");
        assert_eq!(trim_field(b"AB\0\0", b' '), "AB");
    }

    #[test]
    fn latin_names() {
        assert_eq!(latin_bytes("\u{e5}A"), vec![0xE5, b'A']);
        assert_eq!(latin_bytes("\u{3042}"), vec![b'_']);
        assert_eq!(latin_string(&[0xE5, b'A']), "\u{e5}A");
    }
}
