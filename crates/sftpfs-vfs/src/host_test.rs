// Copyright (c) Contributors to the sftpfs project.
// SPDX-License-Identifier: Apache-2.0

use rstest::rstest;
use sftpfs::{Disposition, Status};

use super::*;

#[rstest]
#[case(ROOT_PATH, "a.txt", "\\a.txt")]
#[case("\\docs", "a.txt", "\\docs\\a.txt")]
#[case("\\docs\\deep", "x", "\\docs\\deep\\x")]
fn test_child_path(#[case] parent: &str, #[case] name: &str, #[case] expected: &str) {
    assert_eq!(child_path(parent, name), expected);
}

#[rstest]
#[case("\\docs", "\\docs", true)]
#[case("\\docs", "\\docs\\a.txt", true)]
#[case("\\docs", "\\docs-old\\a.txt", false)]
#[case("\\docs", "\\other", false)]
#[case(ROOT_PATH, "\\anything", true)]
fn test_is_within(#[case] path: &str, #[case] candidate: &str, #[case] expected: bool) {
    assert_eq!(is_within(path, candidate), expected);
}

#[rstest]
#[case(libc::O_RDONLY, Disposition::Open)]
#[case(libc::O_WRONLY | libc::O_TRUNC, Disposition::Truncate)]
#[case(libc::O_WRONLY | libc::O_APPEND, Disposition::Append)]
fn test_disposition_for_open(#[case] flags: i32, #[case] expected: Disposition) {
    assert_eq!(disposition_for_open(flags), expected);
}

#[rstest]
#[case(libc::O_CREAT | libc::O_EXCL | libc::O_WRONLY, Disposition::CreateNew)]
#[case(libc::O_CREAT | libc::O_TRUNC | libc::O_WRONLY, Disposition::Create)]
#[case(libc::O_CREAT | libc::O_RDWR, Disposition::OpenOrCreate)]
fn test_disposition_for_create(#[case] flags: i32, #[case] expected: Disposition) {
    assert_eq!(disposition_for_create(flags), expected);
}

#[rstest]
#[case(Status::NameNotFound, libc::ENOENT)]
#[case(Status::PathNotFound, libc::ENOENT)]
#[case(Status::NameCollision, libc::EEXIST)]
#[case(Status::AccessDenied, libc::EACCES)]
#[case(Status::NotADirectory, libc::ENOTDIR)]
#[case(Status::NotImplemented, libc::ENOSYS)]
#[case(Status::Error, libc::EIO)]
fn test_errno(#[case] status: Status, #[case] expected: i32) {
    assert_eq!(errno(status), expected);
    assert_eq!(crate::Error::from(status).errno(), expected);
}
