// Copyright (c) Contributors to the sftpfs project.
// SPDX-License-Identifier: Apache-2.0

use std::io::Write;

use anyhow::Result;
use clap::Args;
use sftpfs::remote::Connector;
use sftpfs::{FileAttributes, FileInformation, SftpFs, Status};
use sftpfs_cli_common as cli;

#[cfg(test)]
#[path = "./cmd_ls_test.rs"]
mod cmd_ls_test;

/// List the contents of a remote directory
#[derive(Debug, Args)]
#[clap(visible_aliases = &["list-dir", "list"])]
pub struct CmdLs {
    #[clap(flatten)]
    pub(crate) target: cli::Target,

    /// Only list entries whose names match this wildcard expression
    #[clap(long, short, default_value = "*")]
    pattern: String,

    /// Long listing format
    #[clap(short = 'l')]
    long: bool,

    /// The directory to list, relative to the remote root
    #[clap(default_value = "/")]
    path: String,
}

impl CmdLs {
    pub fn run(&mut self, config: &sftpfs::Config) -> Result<i32> {
        let fs = super::connect(&self.target, config)?;
        let code = self.list(&fs, &mut std::io::stdout().lock())?;
        let _ = fs.unmounted();
        Ok(code)
    }

    pub(crate) fn list<C, W>(&self, fs: &SftpFs<C>, out: &mut W) -> Result<i32>
    where
        C: Connector,
        W: Write,
    {
        let mut entries = match fs.find_files_with_pattern(&self.path, &self.pattern) {
            Ok(entries) => entries,
            Err(Status::NameNotFound | Status::PathNotFound) => {
                tracing::error!("directory not found: {}", self.path);
                return Ok(1);
            }
            Err(Status::NotADirectory) => {
                tracing::error!("path is not a directory: {}", self.path);
                return Ok(1);
            }
            Err(status) => return Err(status.into()),
        };
        entries.sort_by(|a, b| a.file_name.cmp(&b.file_name));
        for entry in entries.iter() {
            self.print_file(entry, out)?;
        }
        Ok(0)
    }

    fn print_file<W: Write>(&self, entry: &FileInformation, out: &mut W) -> Result<()> {
        let suffix = if entry.is_dir() { "/" } else { "" };
        if self.long {
            writeln!(
                out,
                "{} {:>12} {} {}{suffix}",
                mode_string(entry.attributes),
                entry.length,
                entry.last_write_time.format("%b %e %Y %H:%M"),
                entry.file_name,
            )?;
        } else {
            writeln!(out, "{}{suffix}", entry.file_name)?;
        }
        Ok(())
    }
}

/// A short summary of the attribute flags, eg: `d-h-`
fn mode_string(attributes: FileAttributes) -> String {
    [
        (FileAttributes::DIRECTORY, 'd'),
        (FileAttributes::READONLY, 'r'),
        (FileAttributes::HIDDEN, 'h'),
        (FileAttributes::OFFLINE, 'o'),
    ]
    .iter()
    .map(|(flag, c)| if attributes.contains(*flag) { *c } else { '-' })
    .collect()
}
