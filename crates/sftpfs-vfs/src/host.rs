// Copyright (c) Contributors to the sftpfs project.
// SPDX-License-Identifier: Apache-2.0

//! Translation between POSIX request details and the path based
//! callbacks of [`sftpfs::SftpFs`].

use sftpfs::{Disposition, Status};

#[cfg(test)]
#[path = "./host_test.rs"]
mod host_test;

/// The host path of the mount root
pub const ROOT_PATH: &str = "\\";

const SEPARATOR: char = '\\';

/// Join a single name onto a host path
pub fn child_path(parent: &str, name: &str) -> String {
    if parent.ends_with(SEPARATOR) {
        format!("{parent}{name}")
    } else {
        format!("{parent}{SEPARATOR}{name}")
    }
}

/// True if `candidate` is `path` itself or located somewhere below it
pub fn is_within(path: &str, candidate: &str) -> bool {
    match candidate.strip_prefix(path) {
        Some("") => true,
        Some(rest) => path.ends_with(SEPARATOR) || rest.starts_with(SEPARATOR),
        None => false,
    }
}

/// The disposition for opening an existing file with the given flags
pub fn disposition_for_open(flags: i32) -> Disposition {
    if flags & libc::O_TRUNC != 0 {
        Disposition::Truncate
    } else if flags & libc::O_APPEND != 0 {
        Disposition::Append
    } else {
        Disposition::Open
    }
}

/// The disposition for a create request with the given flags
pub fn disposition_for_create(flags: i32) -> Disposition {
    if flags & libc::O_EXCL != 0 {
        Disposition::CreateNew
    } else if flags & libc::O_TRUNC != 0 {
        Disposition::Create
    } else {
        Disposition::OpenOrCreate
    }
}

/// The errno value that best describes a failed request
pub fn errno(status: Status) -> i32 {
    match status {
        Status::Success => 0,
        Status::NameNotFound | Status::PathNotFound => libc::ENOENT,
        Status::NameCollision => libc::EEXIST,
        Status::AccessDenied => libc::EACCES,
        Status::NotADirectory => libc::ENOTDIR,
        Status::NotImplemented => libc::ENOSYS,
        Status::Error => libc::EIO,
    }
}
