// Copyright (c) Contributors to the sftpfs project.
// SPDX-License-Identifier: Apache-2.0

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use sftpfs::remote::ssh::SshConnector;
use sftpfs::{Config, SftpFs};
use sftpfs_cli_common as cli;

mod cmd_cat;
mod cmd_ls;
mod cmd_presets;
mod cmd_stat;

cli::main!(Opt);

/// Browse remote directories over SFTP, the same way a mount sees them
#[derive(Debug, Parser)]
#[clap(about, name = "sftpfs", version = sftpfs::VERSION)]
pub struct Opt {
    #[clap(flatten)]
    pub logging: cli::Logging,

    #[clap(subcommand)]
    pub cmd: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    Ls(cmd_ls::CmdLs),
    Stat(cmd_stat::CmdStat),
    Cat(cmd_cat::CmdCat),
    Presets(cmd_presets::CmdPresets),
}

impl cli::CommandName for Opt {
    fn command_name(&self) -> &str {
        match &self.cmd {
            Command::Ls(_) => "ls",
            Command::Stat(_) => "stat",
            Command::Cat(_) => "cat",
            Command::Presets(_) => "presets",
        }
    }
}

impl Opt {
    pub fn run(&mut self, config: &Config) -> Result<i32> {
        tracing::debug!(command = cli::CommandName::command_name(self), "running");
        match &mut self.cmd {
            Command::Ls(cmd) => cmd.run(config),
            Command::Stat(cmd) => cmd.run(config),
            Command::Cat(cmd) => cmd.run(config),
            Command::Presets(cmd) => cmd.run(config),
        }
    }
}

/// Establish a session with the remote named by the given target
fn connect(target: &cli::Target, config: &Config) -> Result<SftpFs<SshConnector>> {
    let context = target.mount_context(config)?;
    let address = context.address();
    let fs = SftpFs::new(SshConnector, context, &config.filesystem);
    fs.connect()
        .with_context(|| format!("failed to connect to {address}"))?;
    Ok(fs)
}
