// SPDX-License-Identifier: MIT

#![allow(dead_code)]

use dkbfs::prelude::*;

pub type MemSession<'a> = FilesystemSession<SectorDisk<MemIO<'a>>>;

/// Geometry and size of an image for `name`; hard-disk templates get
/// `hdd_sectors` flat sectors.
pub fn image_for(name: &str, hdd_sectors: u32) -> (DiskGeometry, usize) {
    let table = TemplateTable::builtin();
    let p = table.get(name).expect("template");
    let geom = if p.total_sectors() == 0 {
        DiskGeometry::flat(p.sector_size, hdd_sectors)
    } else {
        p.geometry()
    };
    (geom, geom.total_sectors() as usize * p.sector_size as usize)
}

/// Unformatted session over `buf`, sized for `name`.
pub fn blank<'a>(buf: &'a mut Vec<u8>, name: &str) -> MemSession<'a> {
    let (geom, len) = image_for(name, 40960);
    buf.clear();
    buf.resize(len, 0);
    FilesystemSession::new(SectorDisk::new(MemIO::new(buf), geom), TemplateTable::builtin())
}

/// Freshly formatted and mounted session.
pub fn formatted<'a>(buf: &'a mut Vec<u8>, name: &str) -> MemSession<'a> {
    let mut s = blank(buf, name);
    s.format_template(name, &VolumeMeta::default()).expect("format");
    s
}

/// Re-mounts an existing image with auto-detection.
pub fn reopen<'a>(buf: &'a mut Vec<u8>, name: &str, hint: Option<&str>) -> MemSession<'a> {
    let (geom, _) = image_for(name, (buf.len() / geom_sector(name)) as u32);
    FilesystemSession::open(SectorDisk::new(MemIO::new(buf), geom), TemplateTable::builtin(), hint)
        .expect("open")
}

fn geom_sector(name: &str) -> usize {
    TemplateTable::builtin().get(name).expect("template").sector_size as usize
}

/// Every FAT-family template and every OS-9 template.
pub const ALL_TEMPLATES: &[&str] = &[
    "MSDOS_2DD",
    "MSDOS_2HD",
    "MSDOS_144",
    "MSDOS_HDD",
    "FAT16BE_HDD",
    "HU68K_2HD",
    "HU68K_HDD",
    "OS9_35S",
    "OS9_40D",
    "OS9_80D",
];

pub fn pattern(len: usize, seed: u8) -> Vec<u8> {
    (0..len).map(|i| (i as u8).wrapping_mul(31).wrapping_add(seed)).collect()
}

pub fn names<S: SectorStore>(s: &mut FilesystemSession<S>) -> Vec<String> {
    let ids = s.list().expect("list");
    ids.into_iter()
        .map(|id| s.entry(id).expect("entry").full_name())
        .collect()
}

/// Store that fails one chosen sector write and passes every other call.
pub struct FlakyDisk<S: SectorStore> {
    pub inner: S,
    pub writes: u32,
    pub fail_at: Option<u32>,
}

impl<S: SectorStore> FlakyDisk<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            writes: 0,
            fail_at: None,
        }
    }

    /// Makes the `n`th write from now (counting from 0) fail.
    pub fn fail_in(&mut self, n: u32) {
        self.fail_at = Some(self.writes + n);
    }
}

impl<S: SectorStore> SectorStore for FlakyDisk<S> {
    fn sector_size(&self) -> usize {
        self.inner.sector_size()
    }

    fn sector_count(&self) -> u32 {
        self.inner.sector_count()
    }

    fn geometry(&self) -> DiskGeometry {
        self.inner.geometry()
    }

    fn is_write_protected(&self) -> bool {
        self.inner.is_write_protected()
    }

    fn read_sector(&mut self, lsn: u32, buf: &mut [u8]) -> DkbIOResult {
        self.inner.read_sector(lsn, buf)
    }

    fn write_sector(&mut self, lsn: u32, data: &[u8]) -> DkbIOResult {
        let n = self.writes;
        self.writes += 1;
        if self.fail_at == Some(n) {
            self.fail_at = None;
            return Err(DkbIOError::Io(format!("write of sector {lsn} failed")));
        }
        self.inner.write_sector(lsn, data)
    }
}

pub type FlakySession<'a> = FilesystemSession<FlakyDisk<SectorDisk<MemIO<'a>>>>;

/// Mounts an existing image behind a [`FlakyDisk`].
pub fn reopen_flaky<'a>(buf: &'a mut Vec<u8>, name: &str) -> FlakySession<'a> {
    let (geom, _) = image_for(name, (buf.len() / geom_sector(name)) as u32);
    let disk = FlakyDisk::new(SectorDisk::new(MemIO::new(buf), geom));
    FilesystemSession::open(disk, TemplateTable::builtin(), Some(name)).expect("open")
}
