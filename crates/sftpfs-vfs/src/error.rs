// Copyright (c) Contributors to the sftpfs project.
// SPDX-License-Identifier: Apache-2.0

use std::ffi::OsString;

use miette::Diagnostic;
use sftpfs::Status;
use thiserror::Error;

/// A specialized result for host filesystem requests
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while serving a host filesystem request.
#[derive(Diagnostic, Debug, Error)]
pub enum Error {
    /// The host referred to an inode that was never handed out
    #[error("Unknown inode: {0}")]
    UnknownInode(u64),

    /// The host referred to a file handle that is not open
    #[error("Unknown file handle: {0}")]
    UnknownHandle(u64),

    /// The host sent a name that cannot be represented remotely
    #[error("Invalid file name: {0:?}")]
    InvalidName(OsString),

    /// The request was served, but failed
    #[error("Request failed: {0}")]
    Status(Status),
}

impl Error {
    /// The errno value to report back to the host for this error
    pub fn errno(&self) -> i32 {
        match self {
            Error::UnknownInode(_) => libc::ENOENT,
            Error::UnknownHandle(_) => libc::EBADF,
            Error::InvalidName(_) => libc::EINVAL,
            Error::Status(status) => crate::host::errno(*status),
        }
    }
}

impl From<Status> for Error {
    fn from(status: Status) -> Self {
        Error::Status(status)
    }
}
