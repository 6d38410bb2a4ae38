// Copyright (c) Contributors to the sftpfs project.
// SPDX-License-Identifier: Apache-2.0

use std::io::Write;

use anyhow::Result;
use clap::Args;
use sftpfs::remote::Connector;
use sftpfs::{Disposition, SftpFs, Status};
use sftpfs_cli_common as cli;

const CHUNK_SIZE: usize = 64 * 1024;

/// Output the contents of a remote file to stdout
#[derive(Debug, Args)]
#[clap(visible_aliases = &["read", "read-file"])]
pub struct CmdCat {
    #[clap(flatten)]
    pub(crate) target: cli::Target,

    /// The file to read, relative to the remote root
    path: String,
}

impl CmdCat {
    pub fn run(&mut self, config: &sftpfs::Config) -> Result<i32> {
        let fs = super::connect(&self.target, config)?;
        let code = self.cat(&fs, &mut std::io::stdout().lock())?;
        let _ = fs.unmounted();
        Ok(code)
    }

    pub(crate) fn cat<C, W>(&self, fs: &SftpFs<C>, out: &mut W) -> Result<i32>
    where
        C: Connector,
        W: Write,
    {
        let context = match fs.open_or_create(&self.path, false, Disposition::Open) {
            Ok(context) if context.is_directory => {
                tracing::error!("path is a directory: {}", self.path);
                return Ok(1);
            }
            Ok(context) => context,
            Err(Status::NameNotFound | Status::PathNotFound) => {
                tracing::error!("file does not exist: {}", self.path);
                return Ok(1);
            }
            Err(status) => return Err(status.into()),
        };

        let mut buffer = vec![0; CHUNK_SIZE];
        let mut offset = 0;
        let result: Result<i32> = loop {
            let count = match fs.read_file(&self.path, &context, &mut buffer, offset) {
                Ok(0) => break Ok(0),
                Ok(count) => count,
                Err(status) => break Err(status.into()),
            };
            if let Err(err) = out.write_all(&buffer[..count]) {
                break Err(anyhow::Error::new(err).context("failed to write file contents"));
            }
            offset += count as u64;
        };
        fs.cleanup(&self.path, &context);
        fs.close_file(&self.path, &context);
        out.flush()?;
        result
    }
}
