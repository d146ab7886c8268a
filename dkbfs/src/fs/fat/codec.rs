// SPDX-License-Identifier: MIT

//! FAT table encodings: 12-bit packed little-endian, 16-bit little and big
//! endian.

use crate::core::utils::bytes_utils::Endian;
use crate::fs::fat::constant::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FatCodec {
    Fat12,
    Fat16Le,
    Fat16Be,
}

/// How a family picks its table codec from the cluster count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableWidth {
    /// 12-bit below the FAT12 limit, the given codec from there on.
    Auto(FatCodec),
    /// The given codec at every size.
    Fixed(FatCodec),
}

impl TableWidth {
    pub fn codec(self, clusters: u32) -> FatCodec {
        match self {
            TableWidth::Auto(wide) => FatCodec::for_clusters(clusters, wide),
            TableWidth::Fixed(codec) => codec,
        }
    }
}

impl FatCodec {
    #[inline]
    pub fn bits(self) -> u8 {
        match self {
            FatCodec::Fat12 => 12,
            FatCodec::Fat16Le | FatCodec::Fat16Be => 16,
        }
    }

    /// End-of-chain value written by this crate.
    #[inline]
    pub fn eoc(self) -> u32 {
        match self {
            FatCodec::Fat12 => 0x0FFF,
            _ => 0xFFFF,
        }
    }

    /// Byte order of boot-sector and directory fields that go with the table.
    pub fn endian(self) -> Endian {
        match self {
            FatCodec::Fat16Be => Endian::Big,
            _ => Endian::Little,
        }
    }

    /// Expected value of FAT entry 0 for a media byte.
    pub fn media_entry(self, media: u8) -> u32 {
        match self {
            FatCodec::Fat12 => 0x0F00 | media as u32,
            FatCodec::Fat16Le => 0xFF00 | media as u32,
            FatCodec::Fat16Be => (media as u32) << 8 | 0xFF,
        }
    }

    /// Codec a table of `clusters` data groups needs: 12-bit below the
    /// FAT12 limit, `wide` from there on.
    pub fn for_clusters(clusters: u32, wide: FatCodec) -> Self {
        if clusters < FAT12_MAX_CLUSTERS {
            FatCodec::Fat12
        } else {
            wide
        }
    }

    /// Bytes taken by `entries` table entries.
    pub fn table_bytes(self, entries: u32) -> usize {
        (entries as usize * self.bits() as usize).div_ceil(8)
    }

    /// Decodes the first `count` entries of a raw table. Entries past the
    /// end of `raw` are not returned.
    pub fn decode(self, raw: &[u8], count: u32) -> Vec<u32> {
        let mut out = Vec::with_capacity(count as usize);
        for n in 0..count as usize {
            let v = match self {
                FatCodec::Fat12 => {
                    let off = n + n / 2;
                    let Some(pair) = raw.get(off..off + 2) else {
                        break;
                    };
                    let w = u16::from_le_bytes([pair[0], pair[1]]);
                    if n & 1 == 0 { w & 0x0FFF } else { w >> 4 }
                }
                FatCodec::Fat16Le | FatCodec::Fat16Be => {
                    let Some(pair) = raw.get(n * 2..n * 2 + 2) else {
                        break;
                    };
                    self.endian().u16([pair[0], pair[1]])
                }
            };
            out.push(v as u32);
        }
        out
    }

    /// Encodes `entries` into `raw`, leaving bytes past the table intact.
    pub fn encode(self, entries: &[u32], raw: &mut [u8]) {
        for (n, &v) in entries.iter().enumerate() {
            match self {
                FatCodec::Fat12 => {
                    let off = n + n / 2;
                    if off + 1 >= raw.len() {
                        break;
                    }
                    let v = (v & 0x0FFF) as u16;
                    if n & 1 == 0 {
                        raw[off] = v as u8;
                        raw[off + 1] = (raw[off + 1] & 0xF0) | (v >> 8) as u8;
                    } else {
                        raw[off] = (raw[off] & 0x0F) | ((v & 0x0F) << 4) as u8;
                        raw[off + 1] = (v >> 4) as u8;
                    }
                }
                FatCodec::Fat16Le | FatCodec::Fat16Be => {
                    let Some(dst) = raw.get_mut(n * 2..n * 2 + 2) else {
                        break;
                    };
                    dst.copy_from_slice(&self.endian().u16_bytes(v as u16));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fat12_packing_matches_dos_layout() {
        // F9 FF FF 03 40 00: media F9, EOC, 2 -> 3, 3 -> 4
        let raw = [0xF9, 0xFF, 0xFF, 0x03, 0x40, 0x00];
        let e = FatCodec::Fat12.decode(&raw, 4);
        assert_eq!(e, vec![0xFF9, 0xFFF, 0x003, 0x004]);

        let mut out = [0u8; 6];
        FatCodec::Fat12.encode(&e, &mut out);
        assert_eq!(out, raw);
    }

    #[test]
    fn fat16_byte_order() {
        let mut le = [0u8; 4];
        let mut be = [0u8; 4];
        FatCodec::Fat16Le.encode(&[0xFFF8, 0x1234], &mut le);
        FatCodec::Fat16Be.encode(&[0xFFF8, 0x1234], &mut be);
        assert_eq!(le, [0xF8, 0xFF, 0x34, 0x12]);
        assert_eq!(be, [0xFF, 0xF8, 0x12, 0x34]);
        assert_eq!(FatCodec::Fat16Be.decode(&be, 2), vec![0xFFF8, 0x1234]);
    }

    #[test]
    fn media_entries() {
        assert_eq!(FatCodec::Fat12.media_entry(0xF9), 0xFF9);
        assert_eq!(FatCodec::Fat16Le.media_entry(0xF8), 0xFFF8);
        assert_eq!(FatCodec::Fat16Be.media_entry(0xF8), 0xF8FF);
    }

    #[test]
    fn promotion_by_cluster_count() {
        let wide = FatCodec::Fat16Le;
        assert_eq!(FatCodec::for_clusters(4084, wide), FatCodec::Fat12);
        assert_eq!(FatCodec::for_clusters(4085, wide), FatCodec::Fat16Le);
        assert_eq!(FatCodec::for_clusters(5000, FatCodec::Fat16Be), FatCodec::Fat16Be);
        assert_eq!(TableWidth::Auto(wide).codec(100), FatCodec::Fat12);
        assert_eq!(TableWidth::Fixed(FatCodec::Fat16Be).codec(100), FatCodec::Fat16Be);
    }

    #[test]
    fn decode_stops_at_end_of_buffer() {
        assert_eq!(FatCodec::Fat12.decode(&[0xF0, 0xFF], 4).len(), 1);
    }
}
