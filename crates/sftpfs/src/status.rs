// Copyright (c) Contributors to the sftpfs project.
// SPDX-License-Identifier: Apache-2.0

//! The status vocabulary reported back to the host framework.

#[cfg(test)]
#[path = "./status_test.rs"]
mod status_test;

/// The outcome of a host filesystem request.
///
/// Every value corresponds to an `NTSTATUS` code, see [`Status::code`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Status {
    Success,
    NameNotFound,
    NameCollision,
    AccessDenied,
    PathNotFound,
    NotADirectory,
    Error,
    NotImplemented,
}

impl Status {
    pub const fn code(&self) -> u32 {
        match self {
            Status::Success => 0x0000_0000,
            Status::NameNotFound => 0xC000_0034,
            Status::NameCollision => 0xC000_0035,
            Status::AccessDenied => 0xC000_0022,
            Status::PathNotFound => 0xC000_003A,
            Status::NotADirectory => 0xC000_0103,
            Status::Error => 0xC000_0001,
            Status::NotImplemented => 0xC000_0002,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Status::Success)
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?} (0x{:08X})", self.code())
    }
}

impl std::error::Error for Status {}
