// Copyright (c) Contributors to the sftpfs project.
// SPDX-License-Identifier: Apache-2.0

use rstest::rstest;

use super::{Inodes, ROOT_INODE};
use crate::Error;

#[rstest]
fn test_root_is_premapped() {
    let inodes = Inodes::new();
    assert_eq!(inodes.path(ROOT_INODE).unwrap(), "\\");
    assert_eq!(inodes.lookup("\\"), ROOT_INODE);
    inodes.forget(ROOT_INODE, 100);
    assert_eq!(inodes.path(ROOT_INODE).unwrap(), "\\");
}

#[rstest]
fn test_lookup_is_stable() {
    let inodes = Inodes::new();
    let a = inodes.lookup("\\a");
    let b = inodes.lookup("\\b");
    assert_ne!(a, b);
    assert_ne!(a, ROOT_INODE);
    assert_eq!(inodes.lookup("\\a"), a);
    assert_eq!(inodes.path(b).unwrap(), "\\b");
    assert_eq!(inodes.get("\\a"), Some(a));
    assert_eq!(inodes.get("\\c"), None);
}

#[rstest]
fn test_unknown_and_removed() {
    let inodes = Inodes::new();
    assert!(matches!(inodes.path(99), Err(Error::UnknownInode(99))));
    let ino = inodes.lookup("\\gone.txt");
    inodes.remove("\\gone.txt");
    assert!(inodes.path(ino).is_err());
    assert_ne!(inodes.lookup("\\gone.txt"), ino, "inodes are not reused");
    inodes.forget(ino, 1);
}

#[rstest]
fn test_forget_releases_after_last_reference() {
    let inodes = Inodes::new();
    let ino = inodes.lookup("\\docs");
    inodes.lookup("\\docs");
    inodes.lookup("\\docs");

    inodes.forget(ino, 2);
    assert_eq!(inodes.path(ino).unwrap(), "\\docs");

    inodes.forget(ino, 1);
    assert!(inodes.path(ino).is_err());
    assert_eq!(inodes.get("\\docs"), None);
    assert_ne!(inodes.lookup("\\docs"), ino);
}

#[rstest]
fn test_forget_bounds_browsing() {
    let inodes = Inodes::new();
    let looked_up: Vec<u64> = (0..1000)
        .map(|index| inodes.lookup(&format!("\\dir\\file-{index}")))
        .collect();
    for ino in &looked_up {
        inodes.forget(*ino, 1);
    }
    assert!(looked_up.iter().all(|ino| inodes.path(*ino).is_err()));
    assert_eq!(inodes.nodes.len(), 1, "only the root remains");
    assert_eq!(inodes.inodes.len(), 1);
}

#[rstest]
fn test_rename_moves_descendants() {
    let inodes = Inodes::new();
    let dir = inodes.lookup("\\docs");
    let file = inodes.lookup("\\docs\\a.txt");
    let sibling = inodes.lookup("\\docs-old\\b.txt");
    inodes.rename("\\docs", "\\papers");
    assert_eq!(inodes.path(dir).unwrap(), "\\papers");
    assert_eq!(inodes.path(file).unwrap(), "\\papers\\a.txt");
    assert_eq!(inodes.path(sibling).unwrap(), "\\docs-old\\b.txt");
    assert_eq!(inodes.get("\\papers\\a.txt"), Some(file));

    // renamed inodes keep their references
    inodes.forget(file, 1);
    assert_eq!(inodes.get("\\papers\\a.txt"), None);
}

#[rstest]
fn test_rename_replaces_destination() {
    let inodes = Inodes::new();
    let source = inodes.lookup("\\new.txt");
    let target = inodes.lookup("\\old.txt");
    inodes.rename("\\new.txt", "\\old.txt");
    assert_eq!(inodes.get("\\old.txt"), Some(source));
    assert!(inodes.path(target).is_err());
    assert!(inodes.path(source).is_ok());
}
