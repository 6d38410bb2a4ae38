// Copyright (c) Contributors to the sftpfs project.
// SPDX-License-Identifier: Apache-2.0

use std::io;

use miette::Diagnostic;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while talking to the remote endpoint or
/// preparing a mount.
#[derive(Diagnostic, Debug, Error)]
pub enum Error {
    #[error("No such remote path: {0}")]
    #[diagnostic(code(sftpfs::not_found))]
    NotFound(String),
    #[error("Permission denied: {0}")]
    #[diagnostic(code(sftpfs::permission_denied))]
    PermissionDenied(String),
    #[error("Remote path already exists: {0}")]
    #[diagnostic(code(sftpfs::already_exists))]
    AlreadyExists(String),
    #[error("Connection to the remote endpoint was lost: {0}")]
    #[diagnostic(
        code(sftpfs::connection_lost),
        help("The session will be re-established on the next request")
    )]
    ConnectionLost(String),
    #[error("No remote session is connected")]
    #[diagnostic(code(sftpfs::not_connected))]
    NotConnected,
    #[error("Remote protocol error: {0}")]
    #[diagnostic(code(sftpfs::protocol))]
    Protocol(String),
    #[error("The remote endpoint does not support {0}")]
    #[diagnostic(code(sftpfs::unsupported))]
    Unsupported(&'static str),
    #[error("Invalid mount configuration: {0}")]
    #[diagnostic(code(sftpfs::invalid_mount))]
    InvalidMount(String),

    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Config(#[from] config::ConfigError),
}

impl Error {
    /// Classify a standard io error by its kind.
    ///
    /// Transport-level kinds become [`Error::ConnectionLost`] so that
    /// they trigger the reconnect path, the rest keep their meaning.
    pub fn from_io<P: Into<String>>(err: io::Error, path: P) -> Self {
        use io::ErrorKind::*;
        match err.kind() {
            NotFound => Error::NotFound(path.into()),
            PermissionDenied => Error::PermissionDenied(path.into()),
            AlreadyExists => Error::AlreadyExists(path.into()),
            ConnectionReset | ConnectionAborted | NotConnected | BrokenPipe | TimedOut
            | UnexpectedEof => Error::ConnectionLost(err.to_string()),
            _ => Error::Io(err),
        }
    }

    /// True if this error means the session itself is unusable.
    pub fn is_connection_lost(&self) -> bool {
        matches!(self, Error::ConnectionLost(_) | Error::NotConnected)
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_))
    }
}
