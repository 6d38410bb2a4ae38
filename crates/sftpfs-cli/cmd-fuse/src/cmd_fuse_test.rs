// Copyright (c) Contributors to the sftpfs project.
// SPDX-License-Identifier: Apache-2.0

use std::time::Duration;

use fuser::MountOption;
use nix::unistd::{Gid, Uid};
use rstest::rstest;

use super::{DEFAULT_TTL, build_config, parse_options_from_args};

fn options(raw: &[&str]) -> Vec<String> {
    raw.iter().map(|s| s.to_string()).collect()
}

const USER: Uid = Uid::from_raw(1000);
const GROUP: Gid = Gid::from_raw(1000);

#[rstest]
fn test_defaults() {
    let settings = build_config(&[], USER, GROUP).unwrap();
    let config = settings.config;
    assert_eq!(config.uid, USER);
    assert_eq!(config.gid, GROUP);
    assert_eq!(config.ttl, Duration::ZERO, "nothing is cached unless asked for");
    assert_eq!(config.ttl, DEFAULT_TTL);
    assert_eq!(settings.threads, None);
    assert!(config.mount_options.contains(&MountOption::NoDev));
    assert!(config.mount_options.contains(&MountOption::NoSuid));
}

#[rstest]
fn test_standard_and_custom_options() {
    let settings = build_config(
        &options(&["ro", "allow_other", "ttl=30", "threads=8"]),
        USER,
        GROUP,
    )
    .unwrap();
    let config = settings.config;
    assert!(config.mount_options.contains(&MountOption::RO));
    assert!(config.mount_options.contains(&MountOption::AllowOther));
    assert!(
        !config.mount_options.contains(&MountOption::CUSTOM("threads=8".into())),
        "custom options are not passed on to the mount"
    );
    assert_eq!(config.ttl, Duration::from_secs(30));
    assert_eq!(settings.threads, Some(8));
}

#[rstest]
fn test_root_may_change_owner() {
    let config = build_config(
        &options(&["uid=1234", "gid=5678"]),
        Uid::from_raw(0),
        Gid::from_raw(0),
    )
    .unwrap()
    .config;
    assert_eq!(config.uid, Uid::from_raw(1234));
    assert_eq!(config.gid, Gid::from_raw(5678));
}

#[rstest]
#[case::owner_not_root(&["uid=0"])]
#[case::group_not_root(&["gid=0"])]
#[case::bad_ttl(&["ttl=soon"])]
#[case::no_threads(&["threads=0"])]
#[case::bad_threads(&["threads=many"])]
#[case::unknown(&["frobnicate"])]
#[case::dev(&["dev"])]
#[case::suid(&["suid"])]
#[case::ro_and_rw(&["ro", "rw"])]
fn test_rejected_options(#[case] raw: &[&str]) {
    assert!(build_config(&options(raw), USER, GROUP).is_err());
}

#[rstest]
fn test_parse_named_options() {
    let parsed = parse_options_from_args(&options(&["fsname=me@host", "subtype=x", "noatime"]));
    assert_eq!(
        parsed,
        vec![
            MountOption::FSName("me@host".into()),
            MountOption::Subtype("x".into()),
            MountOption::NoAtime,
        ]
    );
}
