// SPDX-License-Identifier: MIT

//! Detection ratios and integrity checks for FAT volumes.

use dkbio::sector::SectorStore;

use crate::core::{error::Ratio, params::FormatParameters, report::Report};
use crate::fs::fat::{
    codec::{FatCodec, TableWidth},
    constant::*,
    entries::SlotStyle,
    meta::FatMeta,
};

/// Boot-sector facts gathered before scoring.
pub struct BootCandidate {
    pub meta: FatMeta,
    pub jump_ok: bool,
    /// 0x55AA signature, or the Human68k OEM string.
    pub signature_ok: bool,
}

fn ratio(checks: &[bool]) -> Ratio {
    checks.iter().filter(|&&c| c).count() as Ratio / checks.len() as Ratio
}

/// Scores a parsed BPB against the physical store and the template.
pub fn score_parameters(
    candidate: &BootCandidate,
    params: &FormatParameters,
    sector_size: usize,
    sector_count: u32,
    width: TableWidth,
) -> Ratio {
    let m = &candidate.meta;
    if m.bytes_per_sector == 0 || m.sectors_per_cluster == 0 || m.num_fats == 0 {
        log::debug!("{}: zero field in BPB", params.name);
        return -1.0;
    }
    if m.bytes_per_sector as usize != sector_size {
        log::debug!(
            "{}: BPB sector size {} vs physical {sector_size}",
            params.name,
            m.bytes_per_sector
        );
        return -1.0;
    }
    let codec = m.codec_for(width);
    ratio(&[
        candidate.jump_ok,
        candidate.signature_ok,
        m.sectors_per_cluster.is_power_of_two(),
        m.reserved_sectors >= 1,
        m.num_fats <= 4,
        m.root_entries > 0
            && (m.root_entries as usize * FAT_SLOT_SIZE) % m.bytes_per_sector as usize == 0,
        m.total_sectors > 0 && m.total_sectors <= sector_count,
        m.media >= FAT_MIN_MEDIA,
        m.sectors_per_fat > 0 && m.fat_fits(codec),
        m.data_start() < m.total_sectors && m.cluster_count() > 0,
        m.media == params.media_id,
        m.sectors_per_cluster as u16 == params.sectors_per_group,
        m.root_entries == params.dir_entry_count,
    ])
}

/// Reserved entries, FAT-copy agreement and entry plausibility over the
/// first FAT sector.
pub fn score_fat(store: &mut dyn SectorStore, m: &FatMeta, codec: FatCodec) -> Ratio {
    let end = m.root_start();
    if m.sectors_per_fat == 0 || end > store.sector_count() || end > m.total_sectors {
        return -1.0;
    }
    let mut first = store.sector_buf();
    if store.read_sector(m.fat_sector(0), &mut first).is_err() {
        return -1.0;
    }

    let per_sector = (first.len() * 8 / codec.bits() as usize) as u32;
    let limit = m.cluster_count() + FAT_FIRST_CLUSTER;
    let entries = codec.decode(&first, per_sector.min(limit));
    if entries.len() < 2 {
        return -1.0;
    }

    let eoc_min = codec.eoc() - 7;
    let media_ok = entries[0] == codec.media_entry(m.media);
    let eoc_ok = entries[1] >= eoc_min;

    let mut copies_ok = true;
    let mut other = store.sector_buf();
    for copy in 1..m.num_fats {
        if store.read_sector(m.fat_sector(copy), &mut other).is_err() || other != first {
            copies_ok = false;
        }
    }

    let max = limit - 1;
    let body = &entries[2..];
    let plausible = if body.is_empty() {
        1.0
    } else {
        let good = body
            .iter()
            .filter(|&&v| v == 0 || (FAT_FIRST_CLUSTER..=max).contains(&v) || v >= eoc_min - 1)
            .count();
        good as Ratio / body.len() as Ratio
    };

    let flags = [media_ok, eoc_ok, copies_ok]
        .iter()
        .filter(|&&c| c)
        .count() as Ratio;
    (flags + plausible) / 4.0
}

/// Share of used root slots that look sane; 1.0 for an empty root.
pub fn score_root(store: &mut dyn SectorStore, m: &FatMeta, style: &SlotStyle) -> Ratio {
    let start = m.root_start();
    let count = m.root_sectors();
    if count == 0 || start + count > store.sector_count() || start + count > m.total_sectors {
        return -1.0;
    }
    let max = m.cluster_count() + 1;
    let (mut used, mut valid) = (0u32, 0u32);
    let mut buf = store.sector_buf();
    'scan: for lsn in start..start + count {
        if store.read_sector(lsn, &mut buf).is_err() {
            return -1.0;
        }
        for raw in buf.chunks_exact(FAT_SLOT_SIZE) {
            match raw[0] {
                FAT_ENTRY_END_OF_DIR => break 'scan,
                b if b == style.delete_code => continue,
                _ => {}
            }
            used += 1;
            if style.plausible(raw, max) {
                valid += 1;
            }
        }
    }
    if used == 0 {
        1.0
    } else {
        valid as Ratio / used as Ratio
    }
}

/// Compares every FAT copy with the first, sector by sector.
pub fn compare_fat_copies(store: &mut dyn SectorStore, m: &FatMeta, rep: &mut Report) {
    if m.num_fats < 2 {
        rep.info("FAT.MIRROR", "Single FAT (no mirror)");
        return;
    }
    let mut a = store.sector_buf();
    let mut b = store.sector_buf();
    let mut mismatches = 0u32;
    for s in 0..m.sectors_per_fat as u32 {
        if let Err(e) = store.read_sector(m.fat_sector(0) + s, &mut a) {
            rep.err("FAT.READ", format!("FAT#0 sector {s}: {e}"));
            return;
        }
        for copy in 1..m.num_fats {
            match store.read_sector(m.fat_sector(copy) + s, &mut b) {
                Ok(()) if a == b => {}
                Ok(()) => mismatches += 1,
                Err(e) => {
                    rep.err("FAT.READ", format!("FAT#{copy} sector {s}: {e}"));
                    return;
                }
            }
        }
    }
    if mismatches == 0 {
        rep.info("FAT.MIRROR", format!("{} FAT copies identical", m.num_fats));
    } else {
        rep.warn("FAT.MIRROR", format!("{mismatches} FAT copy sector(s) differ"));
    }
}
