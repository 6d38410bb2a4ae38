// Copyright (c) Contributors to the sftpfs project.
// SPDX-License-Identifier: Apache-2.0

//! The remote session that every filesystem operation is driven through.
//!
//! The adapter only ever talks to the remote endpoint through the
//! [`Connector`] and [`RemoteSession`] traits, which keeps it independent
//! of the actual transport. The [`ssh`] module provides the libssh2
//! backed implementation used for real mounts.

use std::io::{self, Read, Seek, Write};

use chrono::{DateTime, Utc};

use crate::config::MountContext;
use crate::{Error, Result};

#[cfg(feature = "ssh2-backend")]
pub mod ssh;

/// The type of a remote filesystem node
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FileKind {
    File,
    Directory,
    /// Symlinks, devices and anything else that is not a plain
    /// file or directory
    Other,
}

/// Metadata of a remote node as reported by the endpoint
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RemoteAttributes {
    pub kind: FileKind,
    pub size: u64,
    pub accessed: Option<DateTime<Utc>>,
    pub modified: Option<DateTime<Utc>>,
}

impl RemoteAttributes {
    pub fn is_dir(&self) -> bool {
        self.kind == FileKind::Directory
    }
}

/// One named entry of a remote directory listing
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RemoteEntry {
    pub name: String,
    pub attributes: RemoteAttributes,
}

/// Opens new sessions to the remote endpoint.
pub trait Connector: Send + Sync + 'static {
    type Session: RemoteSession;

    /// Authenticate and open a new session for the given mount.
    fn connect(&self, context: &MountContext) -> Result<Self::Session>;
}

/// An authenticated, stateful connection to the remote file endpoint.
///
/// All paths are absolute remote paths. Implementations must classify
/// their failures into the [`Error`] variants that the adapter
/// understands, most importantly [`Error::ConnectionLost`] for any
/// transport-level failure.
pub trait RemoteSession: Send + Sync + 'static {
    type Reader: Read + Seek + Send;
    type Writer: Write + Seek + Send;

    fn disconnect(&self) -> Result<()>;

    fn stat(&self, path: &str) -> Result<RemoteAttributes>;

    /// List the contents of a directory, excluding `.` and `..`
    fn list_directory(&self, path: &str) -> Result<Vec<RemoteEntry>>;

    fn open_read(&self, path: &str) -> Result<Self::Reader>;

    /// Open an existing file for writing without truncating it
    fn open_write(&self, path: &str) -> Result<Self::Writer>;

    /// Create a zero-length file, replacing any existing content
    fn create_empty(&self, path: &str) -> Result<()>;

    fn delete(&self, path: &str) -> Result<()>;

    fn delete_directory(&self, path: &str) -> Result<()>;

    fn create_directory(&self, path: &str) -> Result<()>;

    fn rename(&self, from: &str, to: &str, overwrite: bool) -> Result<()>;

    /// Classify a failure raised by one of this session's streams
    fn classify_io(&self, err: io::Error, path: &str) -> Error {
        Error::from_io(err, path)
    }

    /// Change the recorded size of a file
    fn set_size(&self, _path: &str, _size: u64) -> Result<()> {
        Err(Error::Unsupported("changing file sizes"))
    }

    /// Change the access and/or modification time of a node
    fn set_times(
        &self,
        _path: &str,
        _accessed: Option<DateTime<Utc>>,
        _modified: Option<DateTime<Utc>>,
    ) -> Result<()> {
        Err(Error::Unsupported("changing file times"))
    }
}
