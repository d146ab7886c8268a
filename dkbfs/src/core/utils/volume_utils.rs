// SPDX-License-Identifier: MIT

//! Volume utils.
//!
//! - `generate_volume_id_32()` → 4-byte serial for FAT boot sectors
//! - `converge_fat_layout()` → FAT size and cluster count for a FAT geometry

use core::sync::atomic::{AtomicU32, Ordering};

use crate::core::utils::time_utils;

static COUNTER: AtomicU32 = AtomicU32::new(0);

/// Generates a 4-byte volume serial from the current time.
///
/// Not guaranteed to be globally unique.
pub fn generate_volume_id_32() -> u32 {
    let now = time_utils::now();
    let seconds = now.assume_utc().unix_timestamp() as u32;
    let millis = now.millisecond() as u32;
    let counter = COUNTER.fetch_add(1, Ordering::Relaxed);

    let id = (seconds & 0xFFFF) | ((millis & 0xFF) << 16) | ((millis >> 8) << 24);
    id ^ (counter & 0xFF)
}

/// Computes `(sectors_per_fat, cluster_count)` for a FAT geometry.
///
/// `entry_bits` is 12 or 16. `fixed_sectors` covers the reserved area and
/// the root directory, which sit outside the cluster heap.
pub fn converge_fat_layout(
    sector_size: u32,
    total_sectors: u32,
    fixed_sectors: u32,
    entry_bits: u32,
    num_fats: u8,
    sectors_per_cluster: u32,
) -> (u32, u32) {
    let spc = sectors_per_cluster.max(1);
    let mut cluster_count = 0u32;
    let mut fat_size = 0u32;
    // converges in a few rounds; the bound guards oscillating geometries
    for _ in 0..32 {
        let entries = cluster_count + 2;
        let new_fat_size = (entries * entry_bits).div_ceil(8).div_ceil(sector_size);
        let fat_area = new_fat_size * num_fats as u32;
        let data_sectors = total_sectors.saturating_sub(fixed_sectors + fat_area);
        let new_cluster_count = data_sectors / spc;

        if new_cluster_count == cluster_count && new_fat_size == fat_size {
            break;
        }

        cluster_count = new_cluster_count;
        fat_size = new_fat_size;
    }

    (fat_size, cluster_count)
}
