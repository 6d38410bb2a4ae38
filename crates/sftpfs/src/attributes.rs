// Copyright (c) Contributors to the sftpfs project.
// SPDX-License-Identifier: Apache-2.0

//! Translation of remote metadata into host file information.

use std::ops::{BitOr, BitOrAssign};

use chrono::{DateTime, Utc};

use crate::remote::{FileKind, RemoteAttributes};

#[cfg(test)]
#[path = "./attributes_test.rs"]
mod attributes_test;

/// Host file attribute flags
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct FileAttributes(u32);

impl FileAttributes {
    pub const READONLY: Self = Self(0x0000_0001);
    pub const HIDDEN: Self = Self(0x0000_0002);
    pub const DIRECTORY: Self = Self(0x0000_0010);
    pub const NORMAL: Self = Self(0x0000_0080);
    pub const OFFLINE: Self = Self(0x0000_1000);

    pub const fn bits(&self) -> u32 {
        self.0
    }

    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    pub const fn contains(&self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for FileAttributes {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for FileAttributes {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0
    }
}

impl std::fmt::Debug for FileAttributes {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names = [
            (Self::READONLY, "READONLY"),
            (Self::HIDDEN, "HIDDEN"),
            (Self::DIRECTORY, "DIRECTORY"),
            (Self::NORMAL, "NORMAL"),
            (Self::OFFLINE, "OFFLINE"),
        ];
        let mut set = f.debug_set();
        for (flag, name) in names {
            if self.contains(flag) {
                set.entry(&format_args!("{name}"));
            }
        }
        set.finish()
    }
}

/// The host view of a single remote node
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FileInformation {
    pub file_name: String,
    pub attributes: FileAttributes,
    pub creation_time: DateTime<Utc>,
    pub last_access_time: DateTime<Utc>,
    pub last_write_time: DateTime<Utc>,
    pub length: u64,
}

impl FileInformation {
    pub fn is_dir(&self) -> bool {
        self.attributes.contains(FileAttributes::DIRECTORY)
    }
}

/// Builds [`FileInformation`] records from remote attributes.
#[derive(Clone, Copy, Debug, Default)]
pub struct AttributeTranslator {
    offline: bool,
}

impl AttributeTranslator {
    pub fn new(offline: bool) -> Self {
        Self { offline }
    }

    /// Translate the attributes of a remote node called `name`.
    ///
    /// The remote protocol carries no creation time, so the last
    /// modification time is reported in its place. Missing times
    /// are reported as the unix epoch.
    pub fn translate<S: Into<String>>(&self, name: S, remote: &RemoteAttributes) -> FileInformation {
        let file_name = name.into();
        let mut attributes = match remote.kind {
            FileKind::Directory => FileAttributes::DIRECTORY,
            FileKind::File | FileKind::Other => FileAttributes::NORMAL,
        };
        if file_name.starts_with('.') {
            attributes |= FileAttributes::HIDDEN;
        }
        if self.offline {
            attributes |= FileAttributes::OFFLINE;
        }
        let modified = remote.modified.unwrap_or_default();
        FileInformation {
            file_name,
            attributes,
            creation_time: modified,
            last_access_time: remote.accessed.unwrap_or_default(),
            last_write_time: modified,
            length: match remote.kind {
                FileKind::Directory => 0,
                _ => remote.size,
            },
        }
    }
}
