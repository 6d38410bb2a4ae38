// Copyright (c) Contributors to the sftpfs project.
// SPDX-License-Identifier: Apache-2.0

use rstest::rstest;

use super::Status;

#[rstest]
#[case(Status::Success, "Success (0x00000000)")]
#[case(Status::NameNotFound, "NameNotFound (0xC0000034)")]
#[case(Status::NotADirectory, "NotADirectory (0xC0000103)")]
fn test_status_display(#[case] status: Status, #[case] expected: &str) {
    assert_eq!(status.to_string(), expected);
}

#[rstest]
fn test_status_is_an_error() {
    let err: Box<dyn std::error::Error> = Box::new(Status::AccessDenied);
    assert_eq!(err.to_string(), "AccessDenied (0xC0000022)");
    assert!(Status::Success.is_success());
    assert!(!Status::Error.is_success());
}
