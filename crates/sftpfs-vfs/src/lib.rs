// Copyright (c) Contributors to the sftpfs project.
// SPDX-License-Identifier: Apache-2.0

//! Host filesystem bindings for sftpfs
//!
//! Notably, provides the logic to serve an sftpfs mount over FUSE on linux.

#![deny(missing_docs)]

mod error;
pub mod host;
#[cfg_attr(not(all(unix, feature = "fuse-backend")), allow(dead_code))]
mod inodes;

pub use error::{Error, Result};

#[cfg(all(unix, feature = "fuse-backend"))]
mod fuse;

#[cfg(all(unix, feature = "fuse-backend"))]
pub use fuse::{Config, Session};
