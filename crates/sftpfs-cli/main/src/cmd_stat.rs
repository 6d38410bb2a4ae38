// Copyright (c) Contributors to the sftpfs project.
// SPDX-License-Identifier: Apache-2.0

use std::io::Write;

use anyhow::Result;
use clap::Args;
use sftpfs::remote::Connector;
use sftpfs::{SftpFs, Status};
use sftpfs_cli_common as cli;

/// Show the file information of a remote path, as a mount reports it
#[derive(Debug, Args)]
pub struct CmdStat {
    #[clap(flatten)]
    pub(crate) target: cli::Target,

    /// The path to inspect, relative to the remote root
    path: String,
}

impl CmdStat {
    pub fn run(&mut self, config: &sftpfs::Config) -> Result<i32> {
        let fs = super::connect(&self.target, config)?;
        let code = self.stat(&fs, &mut std::io::stdout().lock())?;
        let _ = fs.unmounted();
        Ok(code)
    }

    pub(crate) fn stat<C, W>(&self, fs: &SftpFs<C>, out: &mut W) -> Result<i32>
    where
        C: Connector,
        W: Write,
    {
        let info = match fs.get_file_information(&self.path) {
            Ok(info) => info,
            Err(Status::NameNotFound | Status::PathNotFound) => {
                tracing::error!("path not found: {}", self.path);
                return Ok(1);
            }
            Err(status) => return Err(status.into()),
        };
        writeln!(out, "name:        {}", info.file_name)?;
        writeln!(out, "attributes:  {:?}", info.attributes)?;
        writeln!(out, "size:        {}", info.length)?;
        writeln!(out, "created:     {}", info.creation_time.to_rfc3339())?;
        writeln!(out, "accessed:    {}", info.last_access_time.to_rfc3339())?;
        writeln!(out, "modified:    {}", info.last_write_time.to_rfc3339())?;
        Ok(0)
    }
}
