// SPDX-License-Identifier: MIT

//! Identification sector (LSN0), big-endian with 3-byte LSNs.

use zerocopy::byteorder::{BigEndian, U16};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

use crate::core::utils::bytes_utils::{u24_be, u24_be_bytes};
use crate::fs::os9::{constant::*, entries};

#[derive(IntoBytes, FromBytes, KnownLayout, Immutable, Unaligned, Copy, Clone, Debug)]
#[repr(C)]
pub struct IdSector {
    pub total_sectors: [u8; 3], // DD.TOT
    pub track_sectors: u8,      // DD.TKS
    pub map_bytes: U16<BigEndian>,
    pub sectors_per_bit: U16<BigEndian>,
    pub root_fd: [u8; 3], // DD.DIR
    pub owner: U16<BigEndian>,
    pub attr: u8,
    pub disk_id: U16<BigEndian>,
    pub format: u8,
    pub sectors_per_track: U16<BigEndian>,
    pub reserved: U16<BigEndian>,
    pub boot_lsn: [u8; 3],
    pub boot_size: U16<BigEndian>,
    pub created: [u8; 5],
    pub name: [u8; OS9_NAME_LEN],
}

/// Decoded LSN0 plus the layout derived from it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Os9Meta {
    pub sector_size: u16,
    pub total_sectors: u32,
    pub track_sectors: u8,
    pub map_bytes: u16,
    pub sectors_per_bit: u16,
    pub root_fd: u32,
    pub owner: u16,
    pub attr: u8,
    pub disk_id: u16,
    pub format: u8,
    pub sectors_per_track: u16,
    pub boot_lsn: u32,
    pub boot_size: u16,
    pub created: [u8; 5],
    pub name: [u8; OS9_NAME_LEN],
}

impl Os9Meta {
    pub fn from_id(id: &IdSector, sector_size: u16) -> Self {
        Self {
            sector_size,
            total_sectors: u24_be(id.total_sectors),
            track_sectors: id.track_sectors,
            map_bytes: id.map_bytes.get(),
            sectors_per_bit: id.sectors_per_bit.get(),
            root_fd: u24_be(id.root_fd),
            owner: id.owner.get(),
            attr: id.attr,
            disk_id: id.disk_id.get(),
            format: id.format,
            sectors_per_track: id.sectors_per_track.get(),
            boot_lsn: u24_be(id.boot_lsn),
            boot_size: id.boot_size.get(),
            created: id.created,
            name: id.name,
        }
    }

    pub fn to_id(&self) -> IdSector {
        IdSector {
            total_sectors: u24_be_bytes(self.total_sectors),
            track_sectors: self.track_sectors,
            map_bytes: U16::new(self.map_bytes),
            sectors_per_bit: U16::new(self.sectors_per_bit),
            root_fd: u24_be_bytes(self.root_fd),
            owner: U16::new(self.owner),
            attr: self.attr,
            disk_id: U16::new(self.disk_id),
            format: self.format,
            sectors_per_track: U16::new(self.sectors_per_track),
            reserved: U16::new(0),
            boot_lsn: u24_be_bytes(self.boot_lsn),
            boot_size: U16::new(self.boot_size),
            created: self.created,
            name: self.name,
        }
    }

    /// Layout of a fresh volume: bitmap right after LSN0, root descriptor
    /// on the first cluster past the map.
    pub fn for_format(
        sector_size: u16,
        total_sectors: u32,
        sectors_per_bit: u16,
        sectors_per_track: u16,
        sides: u16,
        tracks: u16,
    ) -> Option<Self> {
        let spb = sectors_per_bit.max(1) as u32;
        let clusters = total_sectors / spb;
        let map_bytes = u16::try_from(clusters.div_ceil(8)).ok()?;
        let mut meta = Self {
            sector_size,
            total_sectors,
            track_sectors: sectors_per_track.min(u8::MAX as u16) as u8,
            map_bytes,
            sectors_per_bit: spb as u16,
            root_fd: 0,
            owner: 0,
            attr: 0xFF,
            disk_id: 0,
            format: 0,
            sectors_per_track,
            boot_lsn: 0,
            boot_size: 0,
            created: [0; 5],
            name: [0; OS9_NAME_LEN],
        };
        if sides > 1 {
            meta.format |= OS9_FMT_DOUBLE_SIDED;
        }
        if sectors_per_track > 10 {
            meta.format |= OS9_FMT_DOUBLE_DENSITY;
        }
        if tracks > 40 {
            meta.format |= OS9_FMT_DOUBLE_TRACK;
        }
        meta.root_fd = meta.system_groups() * spb;
        (meta.root_fd < total_sectors && clusters > meta.system_groups()).then_some(meta)
    }

    pub fn map_sectors(&self) -> u32 {
        (self.map_bytes as u32).div_ceil(self.sector_size.max(1) as u32)
    }

    /// Allocatable clusters; a partial last cluster is not counted.
    pub fn clusters(&self) -> u32 {
        let by_size = self.total_sectors / self.sectors_per_bit.max(1) as u32;
        by_size.min(self.map_bytes as u32 * 8)
    }

    /// Clusters covering LSN0 and the bitmap.
    pub fn system_groups(&self) -> u32 {
        (OS9_MAP_START + self.map_sectors()).div_ceil(self.sectors_per_bit.max(1) as u32)
    }

    pub fn label(&self) -> Option<String> {
        entries::decode_name(&self.name).filter(|n| !n.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_sector_offsets() {
        assert_eq!(core::mem::size_of::<IdSector>(), OS9_ID_SIZE);
        let mut meta = Os9Meta::for_format(256, 1440, 1, 18, 2, 40).unwrap();
        meta.name[..3].copy_from_slice(&[b'D', b'K', b'B' | 0x80]);
        let id = meta.to_id();
        let raw = id.as_bytes();
        assert_eq!(&raw[0..3], &[0x00, 0x05, 0xA0]);
        assert_eq!(raw[3], 18);
        assert_eq!(&raw[4..6], &[0x00, 180]);
        assert_eq!(&raw[6..8], &[0x00, 0x01]);
        assert_eq!(&raw[8..11], &[0, 0, 2]);
        assert_eq!(raw[0x10], OS9_FMT_DOUBLE_SIDED | OS9_FMT_DOUBLE_DENSITY);
        assert_eq!(&raw[0x11..0x13], &[0, 18]);
        assert_eq!(raw[0x1F + 2], b'B' | 0x80);

        let back = Os9Meta::from_id(&id, 256);
        assert_eq!(back, meta);
        assert_eq!(back.label().as_deref(), Some("DKB"));
    }

    #[test]
    fn layout_with_two_sectors_per_bit() {
        let meta = Os9Meta::for_format(256, 2880, 2, 18, 2, 80).unwrap();
        assert_eq!(meta.map_bytes, 180);
        assert_eq!(meta.map_sectors(), 1);
        assert_eq!(meta.system_groups(), 1);
        assert_eq!(meta.root_fd, 2);
        assert_eq!(meta.clusters(), 1440);
    }

    #[test]
    fn tiny_volume_is_rejected() {
        assert!(Os9Meta::for_format(256, 2, 1, 18, 1, 35).is_none());
    }
}
