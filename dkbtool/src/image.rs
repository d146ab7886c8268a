// SPDX-License-Identifier: MIT

use std::{fs::File, sync::Arc};

use anyhow::{Context, anyhow, bail};
use dkbfs::prelude::*;

pub type ImageSession<'a> = FilesystemSession<SectorDisk<StdIO<'a, File>>>;

/// How an image file is turned into a sector store and mounted.
#[derive(Debug, Clone)]
pub struct ImageOptions {
    /// First sector of the partition window.
    pub offset: u32,
    /// Sector count of the window; the rest of the file when unset.
    pub sectors: Option<u32>,
    /// Forces one sector size instead of trying every template's.
    pub sector_size: Option<u16>,
    pub hint: Option<String>,
    pub templates: Arc<TemplateTable>,
    pub read_only: bool,
}

impl ImageOptions {
    fn disk<'a>(&self, file: &'a mut File, sector_size: u16) -> anyhow::Result<SectorDisk<StdIO<'a, File>>> {
        let io = StdIO::new(file);
        let len = io.len().unwrap_or(0);
        let count = (len / sector_size.max(1) as u64).min(u32::MAX as u64) as u32;
        let geometry = self
            .templates
            .iter()
            .find(|t| t.sector_size == sector_size && t.total_sectors() == count)
            .map_or(DiskGeometry::flat(sector_size, count), |t| t.geometry());

        let disk = SectorDisk::new(io, geometry).write_protected(self.read_only);
        if self.offset == 0 && self.sectors.is_none() {
            return Ok(disk);
        }
        let window = self.sectors.unwrap_or(count.saturating_sub(self.offset));
        disk.with_partition(self.offset, window)
            .with_context(|| format!("partition {}+{window} outside a {count}-sector image", self.offset))
    }

    fn sector_sizes(&self) -> Vec<u16> {
        if let Some(ss) = self.sector_size {
            return vec![ss];
        }
        let mut sizes = Vec::new();
        for t in self.templates.candidates(self.hint.as_deref()) {
            if !sizes.contains(&t.sector_size) {
                sizes.push(t.sector_size);
            }
        }
        sizes
    }

    /// Detects the format and mounts it. Each candidate sector size is tried;
    /// the best detection score wins.
    pub fn mount<'a>(&self, file: &'a mut File) -> anyhow::Result<ImageSession<'a>> {
        let mut best: Option<(Ratio, u16)> = None;
        let mut last_err = None;
        for ss in self.sector_sizes() {
            let disk = self.disk(&mut *file, ss)?;
            let mut s = FilesystemSession::new(disk, self.templates.clone());
            match s.parse_disk(self.hint.as_deref()) {
                Ok(score) => {
                    log::debug!("{ss}-byte sectors: {score:.3}");
                    if best.is_none_or(|(b, _)| score > b) {
                        best = Some((score, ss));
                    }
                }
                Err(e) => {
                    log::debug!("{ss}-byte sectors: {e}");
                    last_err = Some(e);
                }
            }
        }

        let Some((_, ss)) = best else {
            let err = match last_err {
                Some(e) => anyhow::Error::from(e),
                None => anyhow!("no template matches hint {:?}", self.hint),
            };
            return Err(err.context("cannot mount image"));
        };
        let disk = self.disk(file, ss)?;
        let s = FilesystemSession::open(disk, self.templates.clone(), self.hint.as_deref())?;
        Ok(s)
    }

    /// Formats the window with `template`, growing the file when it is too
    /// small for the template.
    pub fn format<'a>(
        &self,
        file: &'a mut File,
        template: &str,
        vol: &VolumeMeta,
    ) -> anyhow::Result<ImageSession<'a>> {
        if self.read_only {
            bail!(FsError::WriteProtected);
        }
        let params = self
            .templates
            .get(template)
            .ok_or_else(|| anyhow!("unknown template {template}"))?;
        let sectors = match (params.total_sectors(), self.sectors) {
            (0, Some(n)) => n,
            (0, None) => bail!("{template} has no fixed size, pass --sectors"),
            (n, _) => n,
        };
        let ss = params.sector_size as u64;
        let needed = (self.offset as u64 + sectors as u64) * ss;
        if file.metadata()?.len() < needed {
            log::debug!("growing image to {needed} bytes");
            file.set_len(needed)?;
        }

        let window = ImageOptions {
            sectors: Some(sectors),
            ..self.clone()
        };
        let disk = window.disk(file, params.sector_size)?;
        let mut s = FilesystemSession::new(disk, self.templates.clone());
        s.format_with(params, vol)?;
        Ok(s)
    }
}
