// SPDX-License-Identifier: MIT

//! Detection ratios for OS-9 RBF volumes.

use dkbio::sector::SectorStore;

use crate::core::{error::Ratio, params::FormatParameters, utils::bitmap::BitmapOps};
use crate::fs::os9::{constant::*, entries, fd::FileDesc, lsn0::Os9Meta};

fn ratio(checks: &[bool]) -> Ratio {
    checks.iter().filter(|&&c| c).count() as Ratio / checks.len() as Ratio
}

pub fn score_parameters(m: &Os9Meta, params: &FormatParameters, sector_count: u32) -> Ratio {
    if m.total_sectors == 0 || m.sectors_per_bit == 0 || m.map_bytes == 0 {
        log::debug!("{}: zero field in LSN0", params.name);
        return -1.0;
    }
    let spb = m.sectors_per_bit as u32;
    let expected_map = (m.total_sectors / spb).div_ceil(8);
    let date_ok = m.created[1] == 0
        || ((1..=12).contains(&m.created[1]) && (1..=31).contains(&m.created[2]));
    let template_total = params.total_sectors();
    ratio(&[
        m.total_sectors <= sector_count,
        m.sectors_per_bit.is_power_of_two(),
        m.map_bytes as u32 * 8 * spb >= m.total_sectors,
        (m.map_bytes as u32).abs_diff(expected_map) <= 1,
        m.root_fd > m.map_sectors() && m.root_fd < m.total_sectors,
        m.sectors_per_track > 0 && m.track_sectors > 0,
        m.name[0] == 0 || entries::decode_name(&m.name).is_some(),
        date_ok,
        m.sectors_per_bit == params.sectors_per_bit,
        template_total == 0 || template_total == m.total_sectors,
    ])
}

/// System clusters and the root descriptor cluster must be marked used.
pub fn score_bitmap(store: &mut dyn SectorStore, m: &Os9Meta) -> Ratio {
    let map_end = OS9_MAP_START + m.map_sectors();
    if map_end > m.total_sectors || map_end > store.sector_count() {
        return -1.0;
    }
    let Ok(bits) = read_bitmap(store, m) else {
        return -1.0;
    };
    let clusters = m.clusters() as usize;
    let system = m.system_groups() as usize;
    let root = (m.root_fd / m.sectors_per_bit as u32) as usize;
    let used = bits.count_ones_in_range(0, clusters.min(bits.len() * 8));
    ratio(&[
        (0..system).all(|g| bits.get_bit(g)),
        root < clusters && bits.get_bit(root),
        used <= clusters && used > system,
    ])
}

/// Root descriptor sanity plus the `..`/`.` head of its first sector.
pub fn score_root(store: &mut dyn SectorStore, m: &Os9Meta) -> Ratio {
    if m.root_fd >= m.total_sectors || m.root_fd >= store.sector_count() {
        return -1.0;
    }
    let mut buf = store.sector_buf();
    if store.read_sector(m.root_fd, &mut buf).is_err() {
        return -1.0;
    }
    let Some(fd) = FileDesc::read(&buf) else {
        return -1.0;
    };
    let size = fd.size.get() as u64;
    let first = fd.extents().next().copied();
    let seg_ok = first.is_some_and(|s| s.start() + s.sectors() <= m.total_sectors);

    let head_ok = match first {
        Some(s) if seg_ok && store.read_sector(s.start(), &mut buf).is_ok() => {
            let dotdot = entries::decode_slot(&buf[..OS9_SLOT_SIZE]);
            let dot = entries::decode_slot(&buf[OS9_SLOT_SIZE..OS9_SLOT_SIZE * 2]);
            matches!(dotdot, Some((ref n, _)) if n == "..")
                && matches!(dot, Some((ref n, lsn)) if n == "." && lsn == m.root_fd)
        }
        _ => false,
    };

    ratio(&[
        fd.attr & 0x80 != 0,
        seg_ok,
        size % OS9_SLOT_SIZE as u64 == 0 && size >= OS9_DIR_MIN_SIZE,
        head_ok,
    ])
}

pub fn read_bitmap(store: &mut dyn SectorStore, m: &Os9Meta) -> dkbio::error::DkbIOResult<Vec<u8>> {
    let ss = store.sector_size();
    let mut raw = vec![0u8; m.map_sectors() as usize * ss];
    for (i, chunk) in raw.chunks_exact_mut(ss).enumerate() {
        store.read_sector(OS9_MAP_START + i as u32, chunk)?;
    }
    raw.truncate(m.map_bytes as usize);
    Ok(raw)
}
