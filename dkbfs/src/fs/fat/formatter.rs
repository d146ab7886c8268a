// SPDX-License-Identifier: MIT

//! Boot sector, FAT seed and root directory of a freshly formatted volume.

use dkbio::sector::SectorStore;
use zerocopy::IntoBytes;

use crate::core::{
    alloc_map::{AllocationMap, FatTable},
    attr::FileAttr,
    entry::DirectoryEntry,
    error::*,
    utils::{bytes_utils::pad_field, time_utils},
};
use crate::driver::VolumeMeta;
use crate::fs::fat::{
    FatFlavor,
    boot::{Hu68kBpb, MsdosBpb},
    codec::FatCodec,
    constant::*,
    entries::SlotStyle,
    meta::FatMeta,
};

pub fn write_boot_sector(
    store: &mut dyn SectorStore,
    meta: &FatMeta,
    flavor: FatFlavor,
    style: &SlotStyle,
    codec: FatCodec,
) -> FsResult {
    let mut buf = store.sector_buf();
    match flavor {
        FatFlavor::MsDos => {
            let bpb = MsdosBpb::from_meta(meta, style.endian, codec != FatCodec::Fat12);
            buf[..FAT_BPB_SIZE].copy_from_slice(bpb.as_bytes());
            if let Some(sig) = buf.get_mut(FAT_SIGNATURE_OFFSET..FAT_SIGNATURE_OFFSET + 2) {
                sig.copy_from_slice(&FAT_SIGNATURE);
            }
        }
        FatFlavor::Hu68k => {
            let bpb = Hu68kBpb::from_meta(meta);
            buf[..HU68K_BPB_SIZE].copy_from_slice(bpb.as_bytes());
        }
    }
    store.write_sector(FAT_BOOT_SECTOR, &buf)?;
    Ok(())
}

/// Label field of up to 11 bytes, space padded.
pub fn label_field(label: Option<&str>) -> [u8; 11] {
    match label {
        Some(l) if !l.is_empty() => pad_field(l.to_ascii_uppercase().as_bytes(), b' '),
        _ => *FAT_VOLUME_LABEL_EMPTY,
    }
}

/// Empty table plus the optional volume-label slot in the first root slot.
pub fn seed_volume(
    store: &mut dyn SectorStore,
    meta: &FatMeta,
    style: &SlotStyle,
    codec: FatCodec,
    vol: &VolumeMeta,
) -> FsResult<AllocationMap> {
    let table = FatTable::blank(meta.cluster_count(), codec.bits(), codec.media_entry(meta.media));

    if let Some(label) = vol.label.as_deref().filter(|l| !l.is_empty()) {
        let field = label_field(Some(label));
        let name = String::from_utf8_lossy(&field[..FAT_NAME_LEN]).trim_end().to_string();
        let ext = String::from_utf8_lossy(&field[FAT_NAME_LEN..]).trim_end().to_string();
        let mut entry = DirectoryEntry::new_file(&name, &ext, FileAttr::VOLUME);
        entry.modified = Some(vol.created.unwrap_or_else(time_utils::now));

        let mut buf = store.sector_buf();
        store.read_sector(meta.root_start(), &mut buf)?;
        let short = SlotStyle {
            long_names: false,
            ..*style
        };
        short.encode(&entry, &mut buf[..FAT_SLOT_SIZE]);
        store.write_sector(meta.root_start(), &buf)?;
    }

    Ok(AllocationMap::Table(table))
}
