// SPDX-License-Identifier: MIT

use crate::core::{error::*, params::FormatParameters, utils::volume_utils::converge_fat_layout};
use crate::fs::fat::{
    codec::{FatCodec, TableWidth},
    constant::*,
};

/// Geometry of a FAT volume as read from (or destined for) its BPB.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FatMeta {
    pub bytes_per_sector: u16,
    pub sectors_per_cluster: u8,
    pub reserved_sectors: u16,
    pub num_fats: u8,
    pub root_entries: u16,
    pub total_sectors: u32,
    pub media: u8,
    pub sectors_per_fat: u16,
    pub sectors_per_track: u16,
    pub heads: u16,
    pub hidden_sectors: u32,
    pub volume_id: u32,
    pub volume_label: [u8; 11],
}

impl FatMeta {
    /// Layout for formatting `total_sectors` with a template. A non-zero
    /// template FAT size is kept when it covers the cluster heap.
    pub fn for_format(
        params: &FormatParameters,
        total_sectors: u32,
        width: TableWidth,
    ) -> FsResult<Self> {
        let mut meta = Self {
            bytes_per_sector: params.sector_size,
            sectors_per_cluster: params.sectors_per_group.min(u8::MAX as u16) as u8,
            reserved_sectors: params.reserved_sectors.max(1),
            num_fats: params.fat_count,
            root_entries: params.dir_entry_count,
            total_sectors,
            media: params.media_id,
            sectors_per_fat: params.sectors_per_fat,
            sectors_per_track: params.sectors_per_track,
            heads: params.sides,
            hidden_sectors: 0,
            volume_id: 0,
            volume_label: *FAT_VOLUME_LABEL_EMPTY,
        };
        ensure!(
            meta.sectors_per_cluster > 0 && meta.num_fats > 0,
            FsError::ParameterAreaInvalid
        );

        if meta.sectors_per_fat == 0 || !meta.fat_fits(meta.codec_for(width)) {
            let fixed = meta.reserved_sectors as u32 + meta.root_sectors();
            let layout = |bits| {
                converge_fat_layout(
                    meta.bytes_per_sector as u32,
                    total_sectors,
                    fixed,
                    bits,
                    meta.num_fats,
                    meta.sectors_per_cluster as u32,
                )
            };
            let spf = match width {
                TableWidth::Fixed(codec) => layout(codec.bits() as u32).0,
                TableWidth::Auto(_) => match layout(12) {
                    (_, clusters) if clusters >= FAT12_MAX_CLUSTERS => layout(16).0,
                    (spf, _) => spf,
                },
            };
            ensure!(spf <= u16::MAX as u32, FsError::ParameterAreaInvalid);
            meta.sectors_per_fat = spf as u16;
        }

        ensure!(
            meta.data_start() < total_sectors && meta.cluster_count() >= FAT_MIN_CLUSTERS,
            FsError::ParameterAreaInvalid
        );
        ensure!(
            meta.cluster_count() < FAT16_MAX_CLUSTERS,
            FsError::ParameterAreaInvalid
        );
        Ok(meta)
    }

    /// Table codec for this cluster count.
    #[inline]
    pub fn codec_for(&self, width: TableWidth) -> FatCodec {
        width.codec(self.cluster_count())
    }

    #[inline]
    pub fn fat_start(&self) -> u32 {
        self.reserved_sectors as u32
    }

    /// First sector of FAT copy `copy`.
    #[inline]
    pub fn fat_sector(&self, copy: u8) -> u32 {
        self.fat_start() + copy as u32 * self.sectors_per_fat as u32
    }

    #[inline]
    pub fn root_start(&self) -> u32 {
        self.fat_sector(self.num_fats)
    }

    pub fn root_sectors(&self) -> u32 {
        if self.bytes_per_sector == 0 {
            return 0;
        }
        (self.root_entries as u32 * FAT_SLOT_SIZE as u32).div_ceil(self.bytes_per_sector as u32)
    }

    #[inline]
    pub fn data_start(&self) -> u32 {
        self.root_start() + self.root_sectors()
    }

    pub fn cluster_count(&self) -> u32 {
        if self.sectors_per_cluster == 0 {
            return 0;
        }
        self.total_sectors.saturating_sub(self.data_start()) / self.sectors_per_cluster as u32
    }

    #[inline]
    pub fn cluster_bytes(&self) -> usize {
        self.bytes_per_sector as usize * self.sectors_per_cluster as usize
    }

    /// First sector of data cluster `cluster` (clusters count from 2).
    #[inline]
    pub fn cluster_sector(&self, cluster: u32) -> u32 {
        self.data_start() + (cluster.saturating_sub(FAT_FIRST_CLUSTER)) * self.sectors_per_cluster as u32
    }

    /// Whether one FAT copy holds an entry per cluster.
    pub fn fat_fits(&self, codec: FatCodec) -> bool {
        let have = self.sectors_per_fat as usize * self.bytes_per_sector as usize;
        have >= codec.table_bytes(self.cluster_count() + FAT_FIRST_CLUSTER)
    }

    /// Label field as text, `None` when blank.
    pub fn label(&self) -> Option<String> {
        let s = crate::core::utils::bytes_utils::trim_field(&self.volume_label, b' ');
        (!s.is_empty() && s != "NO NAME").then_some(s)
    }
}
