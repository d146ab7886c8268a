// SPDX-License-Identifier: MIT

mod common;

use common::*;
use dkbfs::prelude::*;

#[test]
fn allocate_then_free_restores_the_map() {
    for name in ALL_TEMPLATES {
        let mut buf = Vec::new();
        let s = formatted(&mut buf, name);
        let driver = s.driver().expect("driver");
        let before = s.map().expect("map").clone();
        let group = driver.group_bytes() as u64;

        for bytes in [0, 1, group - 1, group, group + 1, 5 * group + 17] {
            let mut map = before.clone();
            let chain = driver
                .allocate_groups(&mut map, bytes, AllocMode::New, None)
                .expect("allocate");
            if bytes > 0 {
                assert_ne!(map, before, "{name}: {bytes} bytes allocated nothing");
            }
            driver.delete_groups(&mut map, &chain);
            assert_eq!(map, before, "{name}: {bytes} bytes");
        }
    }
}

#[test]
fn allocated_chain_covers_request_within_one_group() {
    for name in ALL_TEMPLATES {
        let mut buf = Vec::new();
        let s = formatted(&mut buf, name);
        let driver = s.driver().expect("driver");
        let group = driver.group_bytes() as u64;
        for bytes in [1, 100, group, group + 1, 3 * group - 1, 7 * group + 3] {
            let mut map = s.map().expect("map").clone();
            let chain = driver
                .allocate_groups(&mut map, bytes, AllocMode::New, None)
                .expect("allocate");
            let got = chain.byte_size();
            assert!(got >= bytes, "{name}: {got} < {bytes}");
            assert!(got < bytes + group, "{name}: {got} >= {bytes} + {group}");
        }
    }
}

#[test]
fn empty_slot_never_aliases_an_existing_name() {
    for name in ["MSDOS_2DD", "HU68K_2HD", "OS9_40D"] {
        let mut buf = Vec::new();
        let mut s = formatted(&mut buf, name);
        for i in 0..6 {
            s.save_bytes(&format!("F{i}.DAT"), &pattern(300, i), LoadMode::Binary)
                .expect("save");
        }
        let f2 = s.find("F2.DAT").expect("find");
        s.delete(f2).expect("delete");

        let tree = s.tree().expect("tree");
        let root = tree.root();
        let (slot, _) = tree.find_empty_slot(root).expect("empty slot");
        assert!(!tree.entry(slot).used);
        for i in 0..6 {
            if let Some((hit, _)) = tree.find_file(root, &format!("F{i}.DAT"), true, None) {
                assert_ne!(hit, slot, "{name}: F{i}.DAT aliases the empty slot");
            }
        }
    }
}

#[test]
fn recursive_delete_frees_every_descendant() {
    for name in ["MSDOS_2DD", "HU68K_2HD", "MSDOS_HDD", "OS9_40D", "OS9_80D"] {
        let mut buf = Vec::new();
        let mut s = formatted(&mut buf, name);
        let fresh = s.availability().expect("availability");

        let top = s.make_directory("TOP").expect("mkdir");
        s.change_directory(top).expect("cd");
        s.save_bytes("A.TXT", &pattern(1500, 1), LoadMode::Binary).expect("save");
        let sub = s.make_directory("SUB").expect("mkdir");
        s.change_directory(sub).expect("cd");
        s.save_bytes("B.BIN", &pattern(5000, 2), LoadMode::Binary).expect("save");
        s.change_directory_path("/").expect("cd /");

        let busy = s.availability().expect("availability");
        let owned: Vec<usize> = busy
            .iter()
            .enumerate()
            .filter(|(g, st)| {
                matches!(st, GroupState::Used | GroupState::UsedFirst | GroupState::UsedLast)
                    && fresh[*g] == GroupState::Free
            })
            .map(|(g, _)| g)
            .collect();
        assert!(!owned.is_empty(), "{name}");

        s.delete(top).expect("delete");
        let after = s.availability().expect("availability");
        for g in owned {
            assert!(
                matches!(after[g], GroupState::Free | GroupState::System),
                "{name}: group {g} is {:?}",
                after[g]
            );
        }
        assert_eq!(after, fresh, "{name}");
        assert!(names(&mut s).is_empty());
    }
}

#[test]
fn detection_without_hint_matches_hinted_detection() {
    for name in ALL_TEMPLATES {
        let mut buf = Vec::new();
        drop(formatted(&mut buf, name));

        let hinted = reopen(&mut buf, name, Some(name));
        assert_eq!(hinted.params().expect("params").name, *name);
        let hinted_score = hinted.score();
        drop(hinted);

        let mut auto = reopen(&mut buf, name, None);
        assert_eq!(auto.params().expect("params").name, *name, "auto-detected");
        assert_eq!(auto.score(), hinted_score);

        // and again: no residual state decides the winner
        let again = auto.parse_disk(None).expect("parse");
        assert_eq!(again, hinted_score);
        assert_eq!(auto.params().expect("params").name, *name);
    }
}

#[test]
fn zero_sectors_per_cluster_is_never_mounted() {
    let mut buf = Vec::new();
    drop(formatted(&mut buf, "MSDOS_2DD"));
    buf[13] = 0;

    let (geom, _) = image_for("MSDOS_2DD", 0);
    let table = TemplateTable::builtin();
    let params = table.get("MSDOS_2DD").expect("template");
    let mut disk = SectorDisk::new(MemIO::new(&mut buf), geom);
    let mut driver = Driver::new(params);
    assert!(driver.parse_parameters(&mut disk, false) < 0.0);

    let mut s = FilesystemSession::new(disk, table);
    let err = s.parse_disk(Some("fat12")).expect_err("must not parse");
    assert_eq!(err, FsError::NotFormatted);
    assert_eq!(s.state(), SessionState::Unassigned);
    assert!(s.report().has_error());

    let err = s.parse_disk(None).expect_err("must not parse");
    assert!(matches!(err, FsError::NotFormatted | FsError::Unsupported), "{err:?}");
    assert_eq!(s.state(), SessionState::Unassigned);
    assert_eq!(s.list().expect_err("not assigned"), FsError::NotAssigned);
}

#[test]
fn file_filling_the_last_groups_takes_exactly_its_groups() {
    for name in ["MSDOS_2DD", "HU68K_2HD"] {
        let mut buf = Vec::new();
        let mut s = formatted(&mut buf, name);
        let group = s.free_space().expect("free").group_bytes as u64;

        let before = s.free_space().expect("free");
        let size = 3 * group - 10;
        s.save_bytes("SMALL.DAT", &pattern(size as usize, 3), LoadMode::Binary)
            .expect("save");
        let after = s.free_space().expect("free");
        assert_eq!(before.free_bytes() - size.div_ceil(group) * group, after.free_bytes());

        // exactly the rest of the volume
        let rest = after.free_bytes();
        s.save_bytes("REST.DAT", &pattern(rest as usize, 4), LoadMode::Binary)
            .expect("fill");
        assert_eq!(s.free_space().expect("free").free_groups, 0);
        assert_eq!(s.map().expect("map").find_first_free(), None);

        let map = s.map().expect("map").clone();
        let err = s
            .save_bytes("MORE.DAT", b"x", LoadMode::Binary)
            .expect_err("disk is full");
        assert_eq!(err, FsError::DiskFull);
        assert_eq!(s.map().expect("map"), &map);
        assert!(s.find("MORE.DAT").is_err());
    }
}

#[test]
fn new_directory_links_dot_entries() {
    for name in ["MSDOS_2DD", "HU68K_2HD", "FAT16BE_HDD", "OS9_40D", "OS9_80D"] {
        let mut buf = Vec::new();
        let mut s = formatted(&mut buf, name);
        let os9 = name.starts_with("OS9");
        let root_start = {
            let t = s.tree().expect("tree");
            t.entry(t.root()).start_group
        };

        let outer = s.make_directory("NEWDIR").expect("mkdir");
        let matches = {
            let t = s.tree().expect("tree");
            t.listing(t.root())
                .into_iter()
                .filter(|&c| t.entry(c).full_name().eq_ignore_ascii_case("NEWDIR"))
                .count()
        };
        assert_eq!(matches, 1, "{name}");

        let check = |s: &MemSession<'_>, dir: NodeId, parent_start: u32| {
            let t = s.tree().expect("tree");
            let own = t.entry(dir).start_group;
            let kids = t.children(dir);
            let dot = t.entry(kids[if os9 { 1 } else { 0 }]);
            let dotdot = t.entry(kids[if os9 { 0 } else { 1 }]);
            assert!(dot.is_dot(), "{name}: {dot:?}");
            assert!(dotdot.is_dotdot(), "{name}: {dotdot:?}");
            assert_eq!(dot.start_group, own, "{name}: .");
            assert_eq!(dotdot.start_group, parent_start, "{name}: ..");
        };
        // the root is group 0 on FAT and its descriptor on OS-9
        check(&s, outer, if os9 { root_start } else { 0 });

        s.change_directory(outer).expect("cd");
        let inner = s.make_directory("INNER").expect("mkdir");
        let outer_start = s.entry(outer).expect("entry").start_group;
        check(&s, inner, outer_start);

        // and the same after re-reading the image
        drop(s);
        let mut s = reopen(&mut buf, name, Some(name));
        let outer = s.find_path("/NEWDIR").expect("outer");
        let inner = s.find_path("/NEWDIR/INNER").expect("inner");
        s.list_dir(inner).expect("list");
        check(&s, outer, if os9 { root_start } else { 0 });
        check(&s, inner, outer_start);
    }
}

#[test]
fn rename_onto_existing_name_changes_nothing() {
    for name in ["MSDOS_2DD", "HU68K_2HD", "OS9_40D"] {
        let mut buf = Vec::new();
        let mut s = formatted(&mut buf, name);
        let a = s.save_bytes("ALPHA.BAS", b"10 END", LoadMode::Binary).expect("save");
        let b = s.save_bytes("BETA.BAS", b"20 END", LoadMode::Binary).expect("save");
        let map = s.map().expect("map").clone();
        let (ea, eb) = (s.entry(a).expect("a").clone(), s.entry(b).expect("b").clone());

        let err = s.rename(b, "alpha.bas").expect_err("duplicate");
        assert!(matches!(err, FsError::FileAlreadyExists(_)), "{name}: {err:?}");
        assert_eq!(s.map().expect("map"), &map);
        assert_eq!(s.entry(a).expect("a"), &ea);
        assert_eq!(s.entry(b).expect("b"), &eb);

        // renaming onto its own name is allowed
        s.rename(b, "beta.bas").expect("self rename");
        drop(s);
        let mut s = reopen(&mut buf, name, Some(name));
        let mut got = names(&mut s);
        got.sort_by_key(|n| n.to_ascii_uppercase());
        assert_eq!(got.len(), 2);
        assert!(got[0].eq_ignore_ascii_case("ALPHA.BAS"));
        assert!(got[1].eq_ignore_ascii_case("BETA.BAS"));
    }
}

#[test]
fn os9_first_free_group_follows_the_system_and_root_extent() {
    for name in ["OS9_35S", "OS9_40D", "OS9_80D"] {
        let mut buf = Vec::new();
        let s = formatted(&mut buf, name);
        let Some(Driver::Os9(d)) = s.driver() else {
            panic!("{name}: not an OS-9 driver");
        };
        let meta = d.meta().clone();
        let spb = meta.sectors_per_bit as u32;
        let params = s.params().expect("params").clone();

        let first = s.map().expect("map").find_first_free().expect("free group");
        let lsn = first * spb;
        let reserved_end = meta.root_fd + (1 + params.subdir_groups as u32) * spb;
        assert!(lsn > meta.root_fd, "{name}: LSN {lsn} inside the reserved area");
        assert!(lsn >= reserved_end, "{name}: LSN {lsn} inside the root extent");
        assert!(first >= meta.system_groups());
        assert_eq!(meta.root_fd, meta.system_groups() * spb);
    }
}
