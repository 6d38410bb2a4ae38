// Copyright (c) Contributors to the sftpfs project.
// SPDX-License-Identifier: Apache-2.0

//! The host filesystem callbacks, served from a remote session.

use std::io::{self, Read, Seek, SeekFrom, Write};
use std::ops::BitOr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::instrument;

use crate::attributes::{AttributeTranslator, FileAttributes, FileInformation};
use crate::config::{Filesystem, MountContext};
use crate::path::{PathResolver, RemotePath};
use crate::pattern::Pattern;
use crate::remote::{Connector, RemoteSession};
use crate::session::SessionManager;
use crate::{Error, Result, Status};

#[cfg(test)]
#[path = "./dispatcher_test.rs"]
mod dispatcher_test;

const GIB: u64 = 1024 * 1024 * 1024;

/// The name reported to the host for every mount
pub const FILE_SYSTEM_NAME: &str = "SFTPFS";

/// How an open request treats existing and missing files
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Disposition {
    /// Open an existing node
    Open,
    /// Create a node that must not already exist
    CreateNew,
    /// Create a file, replacing any existing one
    Create,
    /// Open a file, creating it first if needed
    OpenOrCreate,
    /// Empty an existing file
    Truncate,
    /// Open a file for appending, creating it first if needed
    Append,
}

/// Whether a remote path exists, and what it is
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PathState {
    Exists { is_directory: bool },
    Absent,
}

/// The outcome of a successful open, handed back with later
/// requests against the same handle.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FileContext {
    pub is_directory: bool,
}

impl FileContext {
    pub fn file() -> Self {
        Self {
            is_directory: false,
        }
    }

    pub fn directory() -> Self {
        Self { is_directory: true }
    }
}

/// Capabilities advertised for a mounted volume
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct VolumeFeatures(u32);

impl VolumeFeatures {
    pub const CASE_SENSITIVE_SEARCH: Self = Self(0x0000_0001);
    pub const CASE_PRESERVED_NAMES: Self = Self(0x0000_0002);
    pub const UNICODE_ON_DISK: Self = Self(0x0000_0004);
    pub const PERSISTENT_ACLS: Self = Self(0x0000_0008);
    pub const SUPPORTS_REMOTE_STORAGE: Self = Self(0x0000_0100);

    pub const fn bits(&self) -> u32 {
        self.0
    }

    pub const fn contains(&self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for VolumeFeatures {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VolumeInformation {
    pub label: String,
    pub features: VolumeFeatures,
    pub file_system_name: &'static str,
    pub max_component_length: u32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DiskSpace {
    pub free_bytes_available: u64,
    pub total_bytes: u64,
    pub total_free_bytes: u64,
}

/// Serves host filesystem requests from a single remote session.
///
/// Every method corresponds to one host callback and may be called
/// concurrently from any number of threads. Failures are reported
/// as a [`Status`] for the host, and any connection level failure
/// repairs the session before returning.
pub struct SftpFs<C: Connector> {
    sessions: SessionManager<C>,
    resolver: PathResolver,
    translator: AttributeTranslator,
    volume_label: String,
    strict_writes: bool,
}

impl<C: Connector> SftpFs<C> {
    pub fn new(connector: C, context: MountContext, options: &Filesystem) -> Self {
        Self {
            resolver: PathResolver::new(context.root()),
            translator: AttributeTranslator::new(options.offline_attribute),
            volume_label: context.volume_label().to_string(),
            strict_writes: options.strict_writes,
            sessions: SessionManager::new(connector, context),
        }
    }

    /// Open the remote session, this must succeed before mounting
    pub fn connect(&self) -> Result<()> {
        self.sessions.connect()
    }

    pub fn sessions(&self) -> &SessionManager<C> {
        &self.sessions
    }

    pub fn resolver(&self) -> &PathResolver {
        &self.resolver
    }

    #[instrument(skip_all)]
    pub fn open_or_create(
        &self,
        file_name: &str,
        is_directory: bool,
        disposition: Disposition,
    ) -> std::result::Result<FileContext, Status> {
        let path = self.resolver.resolve(file_name);
        tracing::trace!(%path, is_directory, ?disposition, "start");
        let session = self.session(&path)?;
        if is_directory {
            self.open_directory(&session, &path, disposition)
        } else {
            self.open_file(&session, &path, disposition)
        }
    }

    fn open_directory(
        &self,
        session: &Arc<C::Session>,
        path: &RemotePath,
        disposition: Disposition,
    ) -> std::result::Result<FileContext, Status> {
        match disposition {
            Disposition::Open => match self.path_state(session, path)? {
                PathState::Exists { is_directory: true } => Ok(FileContext::directory()),
                PathState::Exists {
                    is_directory: false,
                } => Err(Status::NotADirectory),
                PathState::Absent => Err(Status::NameNotFound),
            },
            Disposition::CreateNew => match self.path_state(session, path)? {
                PathState::Exists { .. } => Err(Status::NameCollision),
                PathState::Absent => {
                    session
                        .create_directory(path.as_str())
                        .map_err(|err| self.fail(session, "create_directory", path, err))?;
                    Ok(FileContext::directory())
                }
            },
            other => {
                tracing::debug!(%path, "cannot open a directory with {other:?}");
                Err(Status::Error)
            }
        }
    }

    fn open_file(
        &self,
        session: &Arc<C::Session>,
        path: &RemotePath,
        disposition: Disposition,
    ) -> std::result::Result<FileContext, Status> {
        use Disposition::*;

        match (disposition, self.path_state(session, path)?) {
            (Open | Truncate, PathState::Absent) => return Err(Status::NameNotFound),
            (CreateNew, PathState::Exists { .. }) => return Err(Status::NameCollision),
            (Open | OpenOrCreate | Append, PathState::Exists { is_directory }) => {
                return Ok(FileContext { is_directory });
            }
            (Create, _)
            | (CreateNew | OpenOrCreate | Append, PathState::Absent)
            | (Truncate, PathState::Exists { .. }) => {}
        }
        session
            .create_empty(path.as_str())
            .map_err(|err| self.fail(session, "create_file", path, err))?;
        Ok(FileContext::file())
    }

    #[instrument(skip_all)]
    pub fn cleanup(&self, file_name: &str, _context: &FileContext) {
        tracing::trace!(%file_name, "cleanup");
    }

    #[instrument(skip_all)]
    pub fn close_file(&self, file_name: &str, _context: &FileContext) {
        tracing::trace!(%file_name, "close");
    }

    /// Read from `offset` into the buffer, returning the number
    /// of bytes read, which is zero at the end of the file.
    #[instrument(skip_all)]
    pub fn read_file(
        &self,
        file_name: &str,
        context: &FileContext,
        buffer: &mut [u8],
        offset: u64,
    ) -> std::result::Result<usize, Status> {
        let path = self.resolver.resolve(file_name);
        tracing::trace!(%path, offset, len = buffer.len(), "start");
        if context.is_directory {
            tracing::debug!(%path, "cannot read from a directory");
            return Err(Status::Error);
        }
        let session = self.session(&path)?;
        let mut reader = session
            .open_read(path.as_str())
            .map_err(|err| self.fail(&session, "read_file", &path, err))?;
        read_at(&mut reader, offset, buffer).map_err(|err| {
            let err = session.classify_io(err, path.as_str());
            self.fail(&session, "read_file", &path, err)
        })
    }

    /// Write the whole buffer at `offset`, returning the number of
    /// bytes written.
    ///
    /// Unless writes are strict, a local failure of the write stream
    /// is logged and reported as success to the host.
    #[instrument(skip_all)]
    pub fn write_file(
        &self,
        file_name: &str,
        context: &FileContext,
        buffer: &[u8],
        offset: u64,
    ) -> std::result::Result<usize, Status> {
        let path = self.resolver.resolve(file_name);
        tracing::trace!(%path, offset, len = buffer.len(), "start");
        if context.is_directory {
            tracing::debug!(%path, "cannot write to a directory");
            return Err(Status::Error);
        }
        let session = self.session(&path)?;
        let mut writer = session
            .open_write(path.as_str())
            .map_err(|err| self.fail(&session, "write_file", &path, err))?;

        let mut written = 0;
        let Err(err) = write_at(&mut writer, offset, buffer, &mut written) else {
            return Ok(buffer.len());
        };
        match session.classify_io(err, path.as_str()) {
            Error::Io(err) if !self.strict_writes => {
                tracing::warn!(%path, written, "write failed, reporting success anyway: {err}");
                Ok(written)
            }
            err => Err(self.fail(&session, "write_file", &path, err)),
        }
    }

    pub fn flush_file_buffers(
        &self,
        _file_name: &str,
        _context: &FileContext,
    ) -> std::result::Result<(), Status> {
        Ok(())
    }

    #[instrument(skip_all)]
    pub fn get_file_information(
        &self,
        file_name: &str,
    ) -> std::result::Result<FileInformation, Status> {
        let path = self.resolver.resolve(file_name);
        tracing::trace!(%path, "start");
        let session = self.session(&path)?;
        let attributes = session
            .stat(path.as_str())
            .map_err(|err| self.fail(&session, "get_file_information", &path, err))?;
        Ok(self.translator.translate(path.file_name(), &attributes))
    }

    /// List every entry of a directory
    pub fn find_files(&self, file_name: &str) -> std::result::Result<Vec<FileInformation>, Status> {
        self.find_files_with_pattern(file_name, "*")
    }

    /// List the entries of a directory whose names match the host
    /// wildcard expression.
    #[instrument(skip_all)]
    pub fn find_files_with_pattern(
        &self,
        file_name: &str,
        pattern: &str,
    ) -> std::result::Result<Vec<FileInformation>, Status> {
        let path = self.resolver.resolve(file_name);
        tracing::trace!(%path, %pattern, "start");
        let pattern = Pattern::new(pattern);
        let session = self.session(&path)?;
        let entries = session
            .list_directory(path.as_str())
            .map_err(|err| self.fail(&session, "find_files", &path, err))?;
        Ok(entries
            .into_iter()
            .filter(|entry| pattern.matches(&entry.name))
            .map(|entry| self.translator.translate(entry.name, &entry.attributes))
            .collect())
    }

    /// Alternate data streams do not exist on the remote
    pub fn find_streams(
        &self,
        _file_name: &str,
    ) -> std::result::Result<Vec<FileInformation>, Status> {
        Err(Status::NotImplemented)
    }

    #[instrument(skip_all)]
    pub fn set_file_attributes(
        &self,
        file_name: &str,
        attributes: FileAttributes,
    ) -> std::result::Result<(), Status> {
        // there is nothing on the remote for these to map onto
        tracing::trace!(%file_name, ?attributes, "ignored");
        Ok(())
    }

    /// Update the access and modification times of a node.
    ///
    /// The remote has no creation time, so that value is ignored.
    #[instrument(skip_all)]
    pub fn set_file_time(
        &self,
        file_name: &str,
        _creation_time: Option<DateTime<Utc>>,
        last_access_time: Option<DateTime<Utc>>,
        last_write_time: Option<DateTime<Utc>>,
    ) -> std::result::Result<(), Status> {
        let path = self.resolver.resolve(file_name);
        tracing::trace!(%path, ?last_access_time, ?last_write_time, "start");
        let session = self.session(&path)?;
        match session.set_times(path.as_str(), last_access_time, last_write_time) {
            Ok(()) => Ok(()),
            Err(Error::Unsupported(what)) => {
                tracing::debug!(%path, "remote does not support {what}");
                Ok(())
            }
            Err(err) => Err(self.fail(&session, "set_file_time", &path, err)),
        }
    }

    #[instrument(skip_all)]
    pub fn delete_file(&self, file_name: &str) -> std::result::Result<(), Status> {
        let path = self.resolver.resolve(file_name);
        tracing::trace!(%path, "start");
        let session = self.session(&path)?;
        session
            .delete(path.as_str())
            .map_err(|err| self.fail(&session, "delete_file", &path, err))
    }

    #[instrument(skip_all)]
    pub fn delete_directory(&self, file_name: &str) -> std::result::Result<(), Status> {
        let path = self.resolver.resolve(file_name);
        tracing::trace!(%path, "start");
        let session = self.session(&path)?;
        session
            .delete_directory(path.as_str())
            .map_err(|err| self.fail(&session, "delete_directory", &path, err))
    }

    #[instrument(skip_all)]
    pub fn move_file(
        &self,
        file_name: &str,
        new_name: &str,
        replace: bool,
    ) -> std::result::Result<(), Status> {
        let from = self.resolver.resolve(file_name);
        let to = self.resolver.resolve(new_name);
        tracing::trace!(%from, %to, replace, "start");
        let session = self.session(&from)?;
        session
            .rename(from.as_str(), to.as_str(), replace)
            .map_err(|err| self.fail(&session, "move_file", &from, err))
    }

    /// Extend a file to at least `length` bytes, files are never truncated
    #[instrument(skip_all)]
    pub fn set_end_of_file(&self, file_name: &str, length: u64) -> std::result::Result<(), Status> {
        let path = self.resolver.resolve(file_name);
        tracing::trace!(%path, length, "start");
        self.grow(&path, length)
    }

    #[instrument(skip_all)]
    pub fn set_allocation_size(
        &self,
        file_name: &str,
        length: u64,
    ) -> std::result::Result<(), Status> {
        let path = self.resolver.resolve(file_name);
        tracing::trace!(%path, length, "start");
        self.grow(&path, length)
    }

    fn grow(&self, path: &RemotePath, length: u64) -> std::result::Result<(), Status> {
        let session = self.session(path)?;
        let current = session
            .stat(path.as_str())
            .map_err(|err| self.fail(&session, "stat", path, err))?;
        if length <= current.size {
            return Ok(());
        }
        match session.set_size(path.as_str(), length) {
            Ok(()) => Ok(()),
            Err(Error::Unsupported(what)) => {
                tracing::debug!(%path, "remote does not support {what}");
                Ok(())
            }
            Err(err) => Err(self.fail(&session, "set_size", path, err)),
        }
    }

    pub fn lock_file(
        &self,
        _file_name: &str,
        _offset: u64,
        _length: u64,
    ) -> std::result::Result<(), Status> {
        Ok(())
    }

    pub fn unlock_file(
        &self,
        _file_name: &str,
        _offset: u64,
        _length: u64,
    ) -> std::result::Result<(), Status> {
        Ok(())
    }

    /// The remote does not report its capacity, so fixed values are used
    pub fn get_disk_free_space(&self) -> DiskSpace {
        DiskSpace {
            free_bytes_available: 10 * GIB,
            total_bytes: 20 * GIB,
            total_free_bytes: 10 * GIB,
        }
    }

    pub fn mounted(&self) -> std::result::Result<(), Status> {
        tracing::info!(root = self.resolver.root(), "mounted");
        Ok(())
    }

    /// Drop the remote session, failures are logged and ignored
    pub fn unmounted(&self) -> std::result::Result<(), Status> {
        tracing::debug!(reconnects = self.sessions.retry_count(), "disconnecting");
        match self.sessions.disconnect() {
            Ok(()) => tracing::info!("disconnected"),
            Err(err) => tracing::warn!("failed to disconnect cleanly: {err}"),
        }
        Ok(())
    }

    pub fn get_file_security(&self, file_name: &str) -> std::result::Result<(), Status> {
        tracing::debug!(%file_name, "file security is not supported");
        Err(Status::Error)
    }

    pub fn set_file_security(&self, file_name: &str) -> std::result::Result<(), Status> {
        tracing::debug!(%file_name, "file security is not supported");
        Err(Status::Error)
    }

    pub fn get_volume_information(&self) -> VolumeInformation {
        VolumeInformation {
            label: self.volume_label.clone(),
            features: VolumeFeatures::CASE_PRESERVED_NAMES
                | VolumeFeatures::CASE_SENSITIVE_SEARCH
                | VolumeFeatures::UNICODE_ON_DISK
                | VolumeFeatures::SUPPORTS_REMOTE_STORAGE,
            file_system_name: FILE_SYSTEM_NAME,
            max_component_length: 255,
        }
    }

    /// Check if a remote path exists, without treating absence as a failure
    fn path_state(
        &self,
        session: &Arc<C::Session>,
        path: &RemotePath,
    ) -> std::result::Result<PathState, Status> {
        match session.stat(path.as_str()) {
            Ok(attributes) => Ok(PathState::Exists {
                is_directory: attributes.is_dir(),
            }),
            Err(err) if err.is_not_found() => Ok(PathState::Absent),
            Err(err) => Err(self.fail(session, "stat", path, err)),
        }
    }

    fn session(&self, path: &RemotePath) -> std::result::Result<Arc<C::Session>, Status> {
        self.sessions.current_session().map_err(|err| {
            tracing::warn!(%path, "session: {err}");
            if !self.sessions.repair(None) {
                tracing::error!("remote session could not be established");
            }
            Status::Error
        })
    }

    /// Convert a remote failure into the status reported to the host.
    ///
    /// Connection level failures repair the session before returning
    /// unless it was already replaced, the failed operation is never
    /// retried.
    fn fail(
        &self,
        session: &Arc<C::Session>,
        operation: &str,
        path: &RemotePath,
        err: Error,
    ) -> Status {
        if err.is_connection_lost() {
            tracing::warn!(%path, "{operation}: {err}");
            if !self.sessions.repair(Some(session)) {
                tracing::error!("remote session could not be re-established");
            }
            return Status::Error;
        }
        match err {
            Error::NotFound(_) => Status::NameNotFound,
            Error::PermissionDenied(_) => Status::AccessDenied,
            Error::AlreadyExists(_) => Status::NameCollision,
            err => {
                tracing::debug!(%path, "{operation}: {err}");
                Status::Error
            }
        }
    }
}

fn read_at<R: Read + Seek>(reader: &mut R, offset: u64, buffer: &mut [u8]) -> io::Result<usize> {
    reader.seek(SeekFrom::Start(offset))?;
    let mut consumed = 0;
    while consumed < buffer.len() {
        let count = reader.read(&mut buffer[consumed..])?;
        if count == 0 {
            // the end of the file has been reached
            break;
        }
        consumed += count;
    }
    Ok(consumed)
}

fn write_at<W: Write + Seek>(
    writer: &mut W,
    offset: u64,
    buffer: &[u8],
    written: &mut usize,
) -> io::Result<()> {
    writer.seek(SeekFrom::Start(offset))?;
    writer.write_all(buffer)?;
    *written = buffer.len();
    writer.flush()
}
