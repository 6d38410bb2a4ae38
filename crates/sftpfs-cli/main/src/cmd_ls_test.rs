// Copyright (c) Contributors to the sftpfs project.
// SPDX-License-Identifier: Apache-2.0

use clap::Parser;
use rstest::rstest;
use sftpfs::config::Filesystem;
use sftpfs::fixtures::{MemoryRemote, memory_context};
use sftpfs::SftpFs;

use super::CmdLs;

#[derive(Parser)]
struct Opt {
    #[command(flatten)]
    ls: CmdLs,
}

fn mount() -> SftpFs<MemoryRemote> {
    let remote = MemoryRemote::new()
        .with_file("/srv/notes.txt", "notes")
        .with_file("/srv/report.doc", "report")
        .with_file("/srv/.profile", "")
        .with_dir("/srv/archive");
    let fs = SftpFs::new(remote, memory_context("/srv"), &Filesystem::default());
    fs.connect().expect("memory remote should connect");
    fs
}

fn list(args: &[&str]) -> (i32, String) {
    let opt = Opt::try_parse_from(args).expect("arguments should parse");
    let mut out = Vec::new();
    let code = opt
        .ls
        .list(&mount(), &mut out)
        .expect("listing should not fail");
    (code, String::from_utf8(out).expect("listing should be utf-8"))
}

#[rstest]
fn test_ls_sorted_with_directory_suffix() {
    let (code, out) = list(&["ls", "me@memory"]);
    assert_eq!(code, 0);
    assert_eq!(out, ".profile\narchive/\nnotes.txt\nreport.doc\n");
}

#[rstest]
#[case("*.txt", "notes.txt\n")]
#[case("<.doc", "report.doc\n")]
#[case("??????e", "archive/\n")]
#[case("*.none", "")]
fn test_ls_pattern(#[case] pattern: &str, #[case] expected: &str) {
    let (code, out) = list(&["ls", "me@memory", "--pattern", pattern]);
    assert_eq!(code, 0);
    assert_eq!(out, expected);
}

#[rstest]
fn test_ls_long_shows_attributes() {
    let (code, out) = list(&["ls", "-l", "me@memory", "--pattern", ".profile"]);
    assert_eq!(code, 0);
    assert!(out.starts_with("--ho "), "unexpected long listing: {out}");
    assert!(out.trim_end().ends_with(".profile"));
}

#[rstest]
fn test_ls_missing_directory() {
    let (code, out) = list(&["ls", "me@memory", "/nope"]);
    assert_eq!(code, 1);
    assert!(out.is_empty());
}
