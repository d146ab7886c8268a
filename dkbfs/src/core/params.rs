// SPDX-License-Identifier: MIT

//! Format templates: immutable per-format constants, loaded from TOML.

use std::{collections::BTreeMap, path::Path, sync::Arc};

use dkbio::sector::DiskGeometry;
use serde::Deserialize;

use crate::core::{
    attr::FileAttr,
    error::*,
    utils::{bytes_utils::Endian, path_utils::split_name_ext},
};

const BUILTIN: &str = include_str!("../../templates/builtin.toml");

/// The five driver families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FormatKind {
    #[default]
    Fat12,
    Fat16,
    Fat16Be,
    Hu68k,
    Os9,
}

impl FormatKind {
    pub fn type_number(self) -> TypeNumber {
        match self {
            FormatKind::Fat12 | FormatKind::Fat16 | FormatKind::Fat16Be => TypeNumber::Msdos,
            FormatKind::Hu68k => TypeNumber::Hu68k,
            FormatKind::Os9 => TypeNumber::Os9,
        }
    }

    /// Byte order of FAT entries and directory fields.
    pub fn endian(self) -> Endian {
        match self {
            FormatKind::Fat16Be | FormatKind::Os9 => Endian::Big,
            _ => Endian::Little,
        }
    }

    pub fn is_fat(self) -> bool {
        !matches!(self, FormatKind::Os9)
    }
}

/// Format category numbers used for template lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum TypeNumber {
    Msdos = 3,
    Os9 = 9,
    Hu68k = 14,
    MachFs = 41,
    Unknown = -1,
}

impl TypeNumber {
    pub fn from_i32(v: i32) -> Self {
        match v {
            3 => TypeNumber::Msdos,
            9 => TypeNumber::Os9,
            14 => TypeNumber::Hu68k,
            41 => TypeNumber::MachFs,
            _ => TypeNumber::Unknown,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            TypeNumber::Msdos => "MSDOS",
            TypeNumber::Os9 => "OS9",
            TypeNumber::Hu68k => "HU68K",
            TypeNumber::MachFs => "MACHFS",
            TypeNumber::Unknown => "UNKNOWN",
        }
    }
}

/// File name validation rule.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct NameRule {
    pub max_name: u8,
    pub max_ext: u8,
    /// Names carry a separate extension field.
    pub has_ext: bool,
    pub forbidden: String,
    pub case_insensitive: bool,
    /// Names are folded to upper case when stored.
    pub upper_case: bool,
}

impl Default for NameRule {
    fn default() -> Self {
        Self {
            max_name: 8,
            max_ext: 3,
            has_ext: true,
            forbidden: "\"*+,/:;<=>?[\\]|".into(),
            case_insensitive: true,
            upper_case: true,
        }
    }
}

impl NameRule {
    /// Validates and normalizes `name`, returning `(base, ext)`.
    pub fn validate(&self, name: &str) -> FsResult<(String, String)> {
        let invalid = || FsError::InvalidName(name.to_string());
        ensure!(!name.is_empty() && name != "." && name != "..", invalid());

        let (base, ext) = if self.has_ext {
            split_name_ext(name)
        } else {
            (name, "")
        };
        ensure!(!base.is_empty(), invalid());
        ensure!(base.len() <= self.max_name as usize, invalid());
        ensure!(ext.len() <= self.max_ext as usize, invalid());

        let ok = |c: char| c.is_ascii_graphic() && !self.forbidden.contains(c);
        ensure!(base.chars().all(ok) && ext.chars().all(ok), invalid());
        ensure!(!self.has_ext || !ext.contains('.'), invalid());

        if self.upper_case {
            Ok((base.to_ascii_uppercase(), ext.to_ascii_uppercase()))
        } else {
            Ok((base.to_string(), ext.to_string()))
        }
    }

    pub fn name_eq(&self, a: &str, b: &str) -> bool {
        if self.case_insensitive {
            a.eq_ignore_ascii_case(b)
        } else {
            a == b
        }
    }
}

/// Immutable per-format configuration, shared by `Arc` across a session.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FormatParameters {
    pub name: String,
    pub description: String,
    pub kind: FormatKind,
    /// Extra category names accepted as detection hints.
    pub hints: Vec<String>,

    pub sector_size: u16,
    pub sectors_per_track: u16,
    pub sides: u16,
    pub tracks: u16,

    pub sectors_per_group: u16,
    pub reserved_sectors: u16,
    pub fat_count: u8,
    /// Zero lets the formatter size the FAT from the disk.
    pub sectors_per_fat: u16,
    pub dir_entry_size: u16,
    pub dir_entry_count: u16,
    pub media_id: u8,

    pub fill_code: u8,
    pub delete_code: u8,
    pub terminator_code: u8,
    pub space_code: u8,

    pub name_rule: NameRule,
    /// Extension → attribute text (`"HIDDEN | SYSTEM"`).
    pub ext_attrs: BTreeMap<String, String>,

    /// Groups given to a new or expanded sub-directory.
    pub subdir_groups: u16,
    /// OS-9 sectors per allocation bit.
    pub sectors_per_bit: u16,
    pub text_terminator: Option<u8>,
    pub data_inverted: bool,
}

impl Default for FormatParameters {
    fn default() -> Self {
        Self {
            name: String::new(),
            description: String::new(),
            kind: FormatKind::Fat12,
            hints: Vec::new(),
            sector_size: 512,
            sectors_per_track: 9,
            sides: 2,
            tracks: 80,
            sectors_per_group: 2,
            reserved_sectors: 1,
            fat_count: 2,
            sectors_per_fat: 0,
            dir_entry_size: 32,
            dir_entry_count: 112,
            media_id: 0xF9,
            fill_code: 0xE5,
            delete_code: 0xE5,
            terminator_code: 0x00,
            space_code: 0x20,
            name_rule: NameRule::default(),
            ext_attrs: BTreeMap::new(),
            subdir_groups: 1,
            sectors_per_bit: 1,
            text_terminator: None,
            data_inverted: false,
        }
    }
}

impl FormatParameters {
    #[inline]
    pub fn type_number(&self) -> TypeNumber {
        self.kind.type_number()
    }

    pub fn total_sectors(&self) -> u32 {
        self.sectors_per_track as u32 * self.sides as u32 * self.tracks as u32
    }

    pub fn geometry(&self) -> DiskGeometry {
        DiskGeometry::new(
            self.sector_size,
            self.sectors_per_track,
            self.sides,
            self.tracks,
        )
    }

    /// Attribute implied by a file extension, if the template maps it.
    pub fn ext_attr(&self, ext: &str) -> Option<FileAttr> {
        self.ext_attrs
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(ext))
            .and_then(|(_, v)| FileAttr::parse(v).ok())
    }

    /// Whether `hint` names this template or one of its categories.
    pub fn matches_hint(&self, hint: &str) -> bool {
        self.name.eq_ignore_ascii_case(hint)
            || self.type_number().name().eq_ignore_ascii_case(hint)
            || self.hints.iter().any(|h| h.eq_ignore_ascii_case(hint))
    }

    fn validate(&self) -> FsResult {
        let bad = |what: &str| FsError::Template(format!("{}: {what}", self.name));
        ensure!(!self.name.is_empty(), FsError::Template("template without name".into()));
        ensure!(
            self.sector_size >= 128 && self.sector_size.is_power_of_two(),
            bad("sector_size")
        );
        ensure!(self.dir_entry_size == 32, bad("dir_entry_size"));
        ensure!(self.subdir_groups > 0, bad("subdir_groups"));
        if self.kind.is_fat() {
            ensure!(
                self.sectors_per_group > 0 && self.sectors_per_group.is_power_of_two(),
                bad("sectors_per_group")
            );
            ensure!(self.fat_count > 0, bad("fat_count"));
            ensure!(self.dir_entry_count > 0, bad("dir_entry_count"));
        } else {
            ensure!(
                self.sectors_per_bit > 0 && self.sectors_per_bit.is_power_of_two(),
                bad("sectors_per_bit")
            );
        }
        for (ext, attr) in &self.ext_attrs {
            FileAttr::parse(attr).map_err(|_| bad(&format!("ext_attrs.{ext}")))?;
        }
        Ok(())
    }
}

#[derive(Deserialize)]
struct TemplateFile {
    #[serde(rename = "template", default)]
    templates: Vec<FormatParameters>,
}

/// Ordered registry of format templates, injected into sessions.
#[derive(Debug, Clone, Default)]
pub struct TemplateTable {
    templates: Vec<Arc<FormatParameters>>,
}

impl TemplateTable {
    /// Templates shipped with the crate.
    pub fn builtin() -> Self {
        match Self::from_toml_str(BUILTIN) {
            Ok(t) => t,
            Err(e) => {
                log::error!("built-in templates: {e}");
                Self::default()
            }
        }
    }

    pub fn from_toml_str(text: &str) -> FsResult<Self> {
        let file: TemplateFile =
            toml::from_str(text).map_err(|e| FsError::Template(e.to_string()))?;
        let mut table = Self::default();
        for t in file.templates {
            t.validate()?;
            table.insert(t);
        }
        Ok(table)
    }

    pub fn from_file(path: impl AsRef<Path>) -> FsResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| FsError::Template(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&text)
    }

    /// Adds a template, replacing one with the same name.
    pub fn insert(&mut self, t: FormatParameters) {
        let t = Arc::new(t);
        match self
            .templates
            .iter_mut()
            .find(|x| x.name.eq_ignore_ascii_case(&t.name))
        {
            Some(slot) => *slot = t,
            None => self.templates.push(t),
        }
    }

    pub fn extend(&mut self, other: TemplateTable) {
        for t in other.templates {
            self.insert(Arc::unwrap_or_clone(t));
        }
    }

    pub fn get(&self, name: &str) -> Option<Arc<FormatParameters>> {
        self.templates
            .iter()
            .find(|t| t.name.eq_ignore_ascii_case(name))
            .cloned()
    }

    pub fn by_type_number(&self, tn: TypeNumber) -> Vec<Arc<FormatParameters>> {
        self.templates
            .iter()
            .filter(|t| t.type_number() == tn)
            .cloned()
            .collect()
    }

    /// Detection candidates in table order; every template when no hint is given.
    pub fn candidates(&self, hint: Option<&str>) -> Vec<Arc<FormatParameters>> {
        match hint {
            None => self.templates.clone(),
            Some(h) => self
                .templates
                .iter()
                .filter(|t| t.matches_hint(h))
                .cloned()
                .collect(),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<FormatParameters>> {
        self.templates.iter()
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_table_loads_every_family() {
        let t = TemplateTable::builtin();
        assert!(!t.is_empty());
        for kind in [FormatKind::Fat12, FormatKind::Fat16, FormatKind::Fat16Be, FormatKind::Hu68k, FormatKind::Os9] {
            assert!(t.iter().any(|p| p.kind == kind), "{kind:?}");
        }
        assert!(!t.by_type_number(TypeNumber::Os9).is_empty());
        assert!(t.by_type_number(TypeNumber::MachFs).is_empty());
    }

    #[test]
    fn candidates_by_name_category_and_type() {
        let t = TemplateTable::builtin();
        assert_eq!(t.candidates(Some("msdos_2hd")).len(), 1);
        assert!(t.candidates(Some("OS9")).iter().all(|p| p.kind == FormatKind::Os9));
        assert!(t.candidates(Some("no-such-format")).is_empty());
        assert_eq!(t.candidates(None).len(), t.len());
    }

    #[test]
    fn custom_table_overrides_by_name() {
        let mut t = TemplateTable::builtin();
        let n = t.len();
        let custom = TemplateTable::from_toml_str(
            r#"
            [[template]]
            name = "MSDOS_2HD"
            description = "patched"
            sector_size = 1024
            sectors_per_group = 1
            dir_entry_count = 192

            [[template]]
            name = "MY_DISK"
            kind = "fat12"
            ext_attrs = { SYS = "HIDDEN | SYSTEM" }
            "#,
        )
        .unwrap();
        t.extend(custom);
        assert_eq!(t.len(), n + 1);
        assert_eq!(t.get("MSDOS_2HD").unwrap().description, "patched");
        let mine = t.get("my_disk").unwrap();
        assert_eq!(mine.ext_attr("sys"), Some(FileAttr::HIDDEN | FileAttr::SYSTEM));
    }

    #[test]
    fn invalid_templates_are_rejected() {
        let r = TemplateTable::from_toml_str(
            "[[template]]\nname = \"X\"\nsectors_per_group = 3\n",
        );
        assert!(matches!(r, Err(FsError::Template(_))));
        let r = TemplateTable::from_toml_str("[[template]]\nname = \"X\"\nbogus = 1\n");
        assert!(r.is_err());
    }

    #[test]
    fn name_rule_validation() {
        let r = NameRule::default();
        assert_eq!(r.validate("game.bas").unwrap(), ("GAME".into(), "BAS".into()));
        assert!(r.validate("toolongname.bas").is_err());
        assert!(r.validate("a.basic").is_err());
        assert!(r.validate("a*b").is_err());
        assert!(r.validate("..").is_err());
        assert!(r.validate("").is_err());
        assert!(r.name_eq("Game.bas", "GAME.BAS"));

        let os9 = NameRule {
            max_name: 29,
            has_ext: false,
            forbidden: "/".into(),
            upper_case: false,
            ..NameRule::default()
        };
        assert_eq!(
            os9.validate("Long.File.name").unwrap(),
            ("Long.File.name".into(), String::new())
        );
    }
}
