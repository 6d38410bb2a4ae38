// Copyright (c) Contributors to the sftpfs project.
// SPDX-License-Identifier: Apache-2.0

use std::io::Write;

use anyhow::Result;
use clap::Args;

/// List the mount presets found in the configuration
#[derive(Debug, Args)]
pub struct CmdPresets {
    /// Also show where each preset connects to
    #[clap(short = 'l')]
    long: bool,
}

impl CmdPresets {
    pub fn run(&mut self, config: &sftpfs::Config) -> Result<i32> {
        self.print(config, &mut std::io::stdout().lock())?;
        Ok(0)
    }

    fn print<W: Write>(&self, config: &sftpfs::Config, out: &mut W) -> Result<()> {
        for name in config.list_preset_names() {
            let Some(preset) = config.preset(&name) else {
                continue;
            };
            if !self.long {
                writeln!(out, "{name}")?;
                continue;
            }
            let port = preset.port.unwrap_or(config.connection.port);
            let auth = if preset.use_password { "password" } else { "key" };
            write!(
                out,
                "{name}\t{}@{}:{port}{}\t{auth}",
                preset.user, preset.host, preset.root
            )?;
            match &preset.mountpoint {
                Some(mountpoint) => writeln!(out, "\t{}", mountpoint.display())?,
                None => writeln!(out)?,
            }
        }
        Ok(())
    }
}
