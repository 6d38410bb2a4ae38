// Copyright (c) Contributors to the sftpfs project.
// SPDX-License-Identifier: Apache-2.0

//! A remote directory tree, reachable over SFTP, served as a
//! local filesystem.
//!
//! [`SftpFs`] implements the callbacks of a host virtual filesystem
//! framework by driving a single remote session, which it repairs
//! whenever a connection failure is observed.

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(any(test, feature = "test-fixtures"))]
pub mod fixtures;

pub mod attributes;
pub mod config;
mod dispatcher;
mod error;
pub mod path;
pub mod pattern;
pub mod remote;
mod session;
mod status;

pub use attributes::{FileAttributes, FileInformation};
pub use config::{get_config, load_config, Config, Credential, MountContext};
pub use dispatcher::{
    Disposition,
    DiskSpace,
    FileContext,
    PathState,
    SftpFs,
    VolumeFeatures,
    VolumeInformation,
    FILE_SYSTEM_NAME,
};
pub use error::{Error, Result};
pub use path::{PathResolver, RemotePath};
pub use session::SessionManager;
pub use status::Status;
