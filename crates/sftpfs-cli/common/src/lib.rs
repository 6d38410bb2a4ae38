// Copyright (c) Contributors to the sftpfs project.
// SPDX-License-Identifier: Apache-2.0

//! Common macros and argument structures for the sftpfs command line

mod args;

pub use args::{configure_logging, log_directives, parse_address, Address, CommandName, Logging, Target};

#[doc(hidden)]
pub mod __private {
    pub use {sftpfs, tracing};
}
