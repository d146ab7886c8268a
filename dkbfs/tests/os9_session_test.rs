// SPDX-License-Identifier: MIT

mod common;

use common::*;
use dkbfs::prelude::*;

fn root_fd(s: &MemSession<'_>) -> u32 {
    match s.driver() {
        Some(Driver::Os9(d)) => d.meta().root_fd,
        other => panic!("not an OS-9 mount: {:?}", other.map(Driver::name)),
    }
}

fn fd_sector(s: &mut MemSession<'_>, lsn: u32) -> Vec<u8> {
    let mut buf = vec![0u8; 256];
    s.store_mut().read_sector(lsn, &mut buf).expect("read fd");
    buf
}

#[test]
fn format_lays_a_mountable_volume() {
    for name in ["OS9_35S", "OS9_40D", "OS9_80D"] {
        let mut buf = Vec::new();
        let mut s = formatted(&mut buf, name);
        assert_eq!(s.driver().map(Driver::name), Some("OS-9 RBF"));
        assert!(names(&mut s).is_empty(), "{name}");
        assert!(!s.check().expect("check").has_error(), "{name}");

        // root descriptor: directory, 64 bytes of dot records
        let fd = root_fd(&s);
        let raw = fd_sector(&mut s, fd);
        assert_eq!(raw[0], 0xBF, "{name}");
        assert_eq!(&raw[9..13], &[0, 0, 0, 64], "{name}");

        drop(s);
        let s = reopen(&mut buf, name, None);
        assert_eq!(s.params().map(|p| p.name.as_str()), Some(name));
    }
}

#[test]
fn save_and_reload_across_mounts() {
    let mut buf = Vec::new();
    let mut s = formatted(&mut buf, "OS9_40D");
    let data = pattern(5000, 3);
    let id = s.save_bytes("startup", &data, LoadMode::Binary).expect("save");
    let e = s.entry(id).expect("entry");
    assert_eq!(e.size, 5000);
    assert!(e.os9.is_some());
    assert!(!e.attr.contains(FileAttr::READ_ONLY));
    assert!(s.verify(id, &mut &data[..], LoadMode::Binary).is_match());

    drop(s);
    let mut s = reopen(&mut buf, "OS9_40D", Some("os9"));
    assert_eq!(names(&mut s), vec!["startup".to_string()]);
    let id = s.find("STARTUP").expect("case-insensitive lookup");
    assert_eq!(s.read_file(id, LoadMode::Binary).expect("read"), data);
}

#[test]
fn names_follow_the_rbf_rules() {
    let mut buf = Vec::new();
    let mut s = formatted(&mut buf, "OS9_40D");
    let long = "a".repeat(29);
    s.save_bytes(&long, b"x", LoadMode::Binary).expect("29 chars fit");
    let err = s.save_bytes(&"b".repeat(30), b"x", LoadMode::Binary).expect_err("too long");
    assert!(matches!(err, FsError::InvalidName(_)));
    let id = s.save_bytes("cmds.list", b"y", LoadMode::Binary).expect("dots are plain chars");
    assert_eq!(s.entry(id).expect("entry").full_name(), "cmds.list");
    assert!(s.entry(id).expect("entry").ext.is_empty());
}

#[test]
fn data_starts_inside_the_descriptor_cluster() {
    let mut buf = Vec::new();
    let mut s = formatted(&mut buf, "OS9_80D");
    assert_eq!(s.params().expect("params").sectors_per_bit, 2);
    let data = pattern(1000, 7);
    let id = s.save_bytes("sample", &data, LoadMode::Binary).expect("save");
    let fd = s.entry(id).expect("entry").start_group;
    assert_eq!(fd % 2, 0);

    let raw = fd_sector(&mut s, fd);
    assert_eq!(&raw[9..13], &1000u32.to_be_bytes());
    let first = u32::from_be_bytes([0, raw[16], raw[17], raw[18]]);
    assert_eq!(first, fd + 1);
    assert_eq!(s.read_file(id, LoadMode::Binary).expect("read"), data);
}

#[test]
fn directories_carry_dotdot_then_dot() {
    let mut buf = Vec::new();
    let mut s = formatted(&mut buf, "OS9_40D");
    let cmds = s.make_directory("CMDS").expect("mkdir");
    let e = s.entry(cmds).expect("entry").clone();
    assert!(e.is_dir());
    assert_eq!(e.size, 64);

    let kids = s.tree().expect("tree").children(cmds).to_vec();
    let (dotdot, dot) = (s.entry(kids[0]).expect("..").clone(), s.entry(kids[1]).expect(".").clone());
    assert!(dotdot.is_dotdot());
    assert!(dot.is_dot());
    assert_eq!(dotdot.start_group, root_fd(&s));
    assert_eq!(dot.start_group, e.start_group);

    s.change_directory(cmds).expect("cd");
    s.save_bytes("dir", b"listing", LoadMode::Binary).expect("save");
    // one more slot raises the directory size
    assert_eq!(s.entry(cmds).expect("entry").size, 96);

    drop(s);
    let mut s = reopen(&mut buf, "OS9_40D", None);
    let id = s.find_path("/CMDS/dir").expect("path");
    assert_eq!(s.read_file(id, LoadMode::Binary).expect("read"), b"listing");
    assert_eq!(s.path_of(id).expect("path"), "/CMDS/dir");
}

#[test]
fn read_only_lives_in_the_descriptor() {
    let mut buf = Vec::new();
    let mut s = formatted(&mut buf, "OS9_40D");
    let id = s.save_bytes("locked", b"data", LoadMode::Binary).expect("save");
    s.change_attributes(id, FileAttr::READ_ONLY | FileAttr::EXECUTABLE)
        .expect("attr");
    let fd = s.entry(id).expect("entry").start_group;
    let raw = fd_sector(&mut s, fd);
    assert_eq!(raw[0] & 0x02, 0, "write bit cleared");
    assert_ne!(raw[0] & 0x04, 0, "exec bit set");

    drop(s);
    let mut s = reopen(&mut buf, "OS9_40D", None);
    let id = s.find("locked").expect("find");
    assert!(s.entry(id).expect("entry").attr.contains(FileAttr::READ_ONLY));
    assert_eq!(s.delete(id), Err(FsError::NotDeletable("locked".into())));
    s.change_attributes(id, FileAttr::empty()).expect("unlock");
    s.delete(id).expect("delete");
    assert!(names(&mut s).is_empty());
}

#[test]
fn fragmented_heap_refuses_a_49th_segment() {
    let mut buf = Vec::new();
    let mut s = formatted(&mut buf, "OS9_40D");
    let mut ids = Vec::new();
    for i in 0..100 {
        ids.push(s.save_bytes(&format!("f{i:03}"), &pattern(256, i as u8), LoadMode::Binary).expect("save"));
    }
    for id in ids.iter().step_by(2) {
        s.delete(*id).expect("delete");
    }
    let map = s.map().expect("map").clone();
    let free = s.free_space().expect("free");

    // 100 freed clusters sit in 50 holes; the request spills past them
    let err = s
        .save_bytes("big", &pattern(120 * 256, 1), LoadMode::Binary)
        .expect_err("too many segments");
    assert_eq!(err, FsError::DiskFull);
    assert_eq!(s.map().expect("map"), &map);
    assert_eq!(s.free_space().expect("free"), free);
    assert!(s.find("big").is_err());

    // a request that fits in 48 segments still goes through
    let id = s.save_bytes("small", &pattern(40 * 256, 2), LoadMode::Binary).expect("save");
    assert_eq!(s.read_file(id, LoadMode::Binary).expect("read"), pattern(40 * 256, 2));
}

#[test]
fn volume_name_round_trips() {
    let mut buf = Vec::new();
    let mut s = blank(&mut buf, "OS9_35S");
    let vol = VolumeMeta {
        label: Some("Sys Disk".into()),
        ..Default::default()
    };
    s.format_template("OS9_35S", &vol).expect("format");
    assert_eq!(s.volume_label().as_deref(), Some("Sys Disk"));
    drop(s);
    let mut s = reopen(&mut buf, "OS9_35S", None);
    assert_eq!(s.volume_label().as_deref(), Some("Sys Disk"));
}
