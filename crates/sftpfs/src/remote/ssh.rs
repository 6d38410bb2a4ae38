// Copyright (c) Contributors to the sftpfs project.
// SPDX-License-Identifier: Apache-2.0

//! Remote sessions over SFTP, backed by libssh2.

use std::net::{TcpStream, ToSocketAddrs};
use std::path::Path;
use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, TimeZone, Utc};
use ssh2::{DisconnectCode, ErrorCode, FileStat, OpenFlags, OpenType, RenameFlags, Sftp};

use super::{Connector, FileKind, RemoteAttributes, RemoteEntry, RemoteSession};
use crate::config::{Credential, MountContext};
use crate::{Error, Result};

// sftp status codes, from draft-ietf-secsh-filexfer-02
const FX_NO_SUCH_FILE: i32 = 2;
const FX_PERMISSION_DENIED: i32 = 3;
const FX_NO_CONNECTION: i32 = 6;
const FX_CONNECTION_LOST: i32 = 7;
const FX_NO_SUCH_PATH: i32 = 10;
const FX_FILE_ALREADY_EXISTS: i32 = 11;

// libssh2 session errors that mean the transport is gone
const SOCKET_SEND: i32 = -7;
const TIMEOUT: i32 = -9;
const SOCKET_DISCONNECT: i32 = -13;
const CHANNEL_CLOSED: i32 = -26;
const SOCKET_TIMEOUT: i32 = -30;
const SOCKET_RECV: i32 = -43;

/// Opens authenticated SFTP sessions over TCP
#[derive(Clone, Copy, Debug, Default)]
pub struct SshConnector;

impl Connector for SshConnector {
    type Session = SshSession;

    fn connect(&self, context: &MountContext) -> Result<SshSession> {
        let address = context.address();
        tracing::debug!(%address, user = context.user(), "opening ssh session");

        let tcp = match context.timeout() {
            None => TcpStream::connect(&address).map_err(|err| Error::from_io(err, &address))?,
            Some(timeout) => {
                let socket = address
                    .to_socket_addrs()
                    .map_err(|err| Error::from_io(err, &address))?
                    .next()
                    .ok_or_else(|| Error::InvalidMount(format!("{address} did not resolve")))?;
                TcpStream::connect_timeout(&socket, timeout)
                    .map_err(|err| Error::from_io(err, &address))?
            }
        };

        let mut session = ssh2::Session::new().map_err(|err| classify(err, &address))?;
        session.set_tcp_stream(tcp);
        if let Some(timeout) = context.timeout() {
            session.set_timeout(timeout.as_millis().min(u32::MAX as u128) as u32);
        }
        session.handshake().map_err(|err| classify(err, &address))?;

        match context.credential() {
            Credential::Password(password) => session
                .userauth_password(context.user(), password)
                .map_err(|err| authentication_failed(err, context))?,
            Credential::PrivateKey {
                identity,
                passphrase,
            } => session
                .userauth_pubkey_file(context.user(), None, identity, passphrase.as_deref())
                .map_err(|err| authentication_failed(err, context))?,
        }
        if !session.authenticated() {
            return Err(Error::PermissionDenied(format!(
                "{}@{address}",
                context.user()
            )));
        }

        let sftp = session.sftp().map_err(|err| classify(err, &address))?;
        tracing::info!(%address, "sftp session established");
        Ok(SshSession {
            session,
            sftp: Mutex::new(sftp),
        })
    }
}

/// A live SFTP session
pub struct SshSession {
    session: ssh2::Session,
    sftp: Mutex<Sftp>,
}

impl SshSession {
    fn with_sftp<T, F>(&self, path: &str, op: F) -> Result<T>
    where
        F: FnOnce(&Sftp, &Path) -> std::result::Result<T, ssh2::Error>,
    {
        let sftp = self.sftp.lock().unwrap_or_else(PoisonError::into_inner);
        op(&sftp, Path::new(path)).map_err(|err| classify(err, path))
    }
}

impl RemoteSession for SshSession {
    type Reader = ssh2::File;
    type Writer = ssh2::File;

    fn disconnect(&self) -> Result<()> {
        self.session
            .disconnect(Some(DisconnectCode::ByApplication), "unmounted", None)
            .map_err(|err| classify(err, "disconnect"))
    }

    fn stat(&self, path: &str) -> Result<RemoteAttributes> {
        self.with_sftp(path, |sftp, path| sftp.stat(path))
            .map(|stat| attributes_from_stat(&stat))
    }

    fn list_directory(&self, path: &str) -> Result<Vec<RemoteEntry>> {
        let entries = self.with_sftp(path, |sftp, path| sftp.readdir(path))?;
        Ok(entries
            .into_iter()
            .filter_map(|(entry_path, stat)| {
                let name = entry_path.file_name()?.to_string_lossy().into_owned();
                if name == "." || name == ".." {
                    return None;
                }
                Some(RemoteEntry {
                    name,
                    attributes: attributes_from_stat(&stat),
                })
            })
            .collect())
    }

    fn open_read(&self, path: &str) -> Result<Self::Reader> {
        self.with_sftp(path, |sftp, path| sftp.open(path))
    }

    fn open_write(&self, path: &str) -> Result<Self::Writer> {
        self.with_sftp(path, |sftp, path| {
            sftp.open_mode(
                path,
                OpenFlags::WRITE | OpenFlags::CREATE,
                0o644,
                OpenType::File,
            )
        })
    }

    fn create_empty(&self, path: &str) -> Result<()> {
        self.with_sftp(path, |sftp, path| sftp.create(path))
            .map(|_file| ())
    }

    fn delete(&self, path: &str) -> Result<()> {
        self.with_sftp(path, |sftp, path| sftp.unlink(path))
    }

    fn delete_directory(&self, path: &str) -> Result<()> {
        self.with_sftp(path, |sftp, path| sftp.rmdir(path))
    }

    fn create_directory(&self, path: &str) -> Result<()> {
        self.with_sftp(path, |sftp, path| sftp.mkdir(path, 0o755))
    }

    fn rename(&self, from: &str, to: &str, overwrite: bool) -> Result<()> {
        let mut flags = RenameFlags::ATOMIC | RenameFlags::NATIVE;
        if overwrite {
            flags |= RenameFlags::OVERWRITE;
        }
        self.with_sftp(from, |sftp, from| {
            sftp.rename(from, Path::new(to), Some(flags))
        })
    }

    fn classify_io(&self, err: std::io::Error, path: &str) -> Error {
        classify_io(err, path)
    }

    fn set_size(&self, path: &str, size: u64) -> Result<()> {
        let stat = FileStat {
            size: Some(size),
            uid: None,
            gid: None,
            perm: None,
            atime: None,
            mtime: None,
        };
        self.with_sftp(path, |sftp, path| sftp.setstat(path, stat))
    }

    fn set_times(
        &self,
        path: &str,
        accessed: Option<DateTime<Utc>>,
        modified: Option<DateTime<Utc>>,
    ) -> Result<()> {
        if accessed.is_none() && modified.is_none() {
            return Ok(());
        }
        // the protocol always sets both times together
        let current = self.with_sftp(path, |sftp, path| sftp.stat(path))?;
        let stat = FileStat {
            size: None,
            uid: None,
            gid: None,
            perm: None,
            atime: accessed.map(to_seconds).or(current.atime),
            mtime: modified.map(to_seconds).or(current.mtime),
        };
        self.with_sftp(path, |sftp, path| sftp.setstat(path, stat))
    }
}

fn to_seconds(time: DateTime<Utc>) -> u64 {
    time.timestamp().max(0) as u64
}

fn from_seconds(seconds: u64) -> Option<DateTime<Utc>> {
    Utc.timestamp_opt(i64::try_from(seconds).ok()?, 0).single()
}

fn attributes_from_stat(stat: &FileStat) -> RemoteAttributes {
    let kind = if stat.is_dir() {
        FileKind::Directory
    } else if stat.is_file() {
        FileKind::File
    } else {
        FileKind::Other
    };
    RemoteAttributes {
        kind,
        size: stat.size.unwrap_or_default(),
        accessed: stat.atime.and_then(from_seconds),
        modified: stat.mtime.and_then(from_seconds),
    }
}

fn authentication_failed(err: ssh2::Error, context: &MountContext) -> Error {
    match classify(err, context.address()) {
        err @ Error::ConnectionLost(_) => err,
        err => {
            tracing::debug!("authentication failed: {err}");
            Error::PermissionDenied(format!("{}@{}", context.user(), context.address()))
        }
    }
}

/// Sort a libssh2 failure into the errors understood by the adapter
fn classify<P: Into<String>>(err: ssh2::Error, path: P) -> Error {
    match err.code() {
        ErrorCode::SFTP(FX_NO_SUCH_FILE | FX_NO_SUCH_PATH) => Error::NotFound(path.into()),
        ErrorCode::SFTP(FX_PERMISSION_DENIED) => Error::PermissionDenied(path.into()),
        ErrorCode::SFTP(FX_FILE_ALREADY_EXISTS) => Error::AlreadyExists(path.into()),
        ErrorCode::SFTP(FX_NO_CONNECTION | FX_CONNECTION_LOST)
        | ErrorCode::Session(
            SOCKET_SEND | TIMEOUT | SOCKET_DISCONNECT | CHANNEL_CLOSED | SOCKET_TIMEOUT
            | SOCKET_RECV,
        ) => Error::ConnectionLost(err.to_string()),
        _ => Error::Protocol(format!("{}: {err}", path.into())),
    }
}

/// Sort an io failure from a remote file stream.
///
/// Streams wrap the underlying libssh2 error, which is preferred
/// over the coarser io error kind when present.
fn classify_io<P: Into<String>>(err: std::io::Error, path: P) -> Error {
    let code = err
        .get_ref()
        .and_then(|inner| inner.downcast_ref::<ssh2::Error>())
        .map(|inner| inner.code());
    match code {
        Some(ErrorCode::SFTP(FX_NO_SUCH_FILE | FX_NO_SUCH_PATH)) => Error::NotFound(path.into()),
        Some(ErrorCode::SFTP(FX_PERMISSION_DENIED)) => Error::PermissionDenied(path.into()),
        Some(ErrorCode::SFTP(FX_NO_CONNECTION | FX_CONNECTION_LOST))
        | Some(ErrorCode::Session(
            SOCKET_SEND | TIMEOUT | SOCKET_DISCONNECT | CHANNEL_CLOSED | SOCKET_TIMEOUT
            | SOCKET_RECV,
        )) => Error::ConnectionLost(err.to_string()),
        _ => Error::from_io(err, path),
    }
}
