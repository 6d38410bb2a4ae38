// Copyright (c) Contributors to the sftpfs project.
// SPDX-License-Identifier: Apache-2.0

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result, anyhow, bail};
use sftpfs::config::Preset;
use sftpfs::{Config, Credential, MountContext};
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::prelude::*;

#[cfg(test)]
#[path = "./args_test.rs"]
mod args_test;

const SFTPFS_LOG: &str = "SFTPFS_LOG";

/// Command line flags for configuring logging
#[derive(Debug, Clone, clap::Args)]
pub struct Logging {
    /// Make output more verbose, can be specified more than once
    #[clap(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Additionally log output to the provided file
    #[clap(long, global = true, env = "SFTPFS_LOG_FILE", value_hint = clap::ValueHint::FilePath)]
    pub log_file: Option<PathBuf>,
}

impl Logging {
    pub fn configure(&self) {
        configure_logging(self.verbose, self.log_file.as_deref())
    }
}

/// Build the tracing filter directives for a verbosity level.
///
/// When not verbose, an existing `SFTPFS_LOG` value replaces the
/// default, and any `RUST_LOG` value is always appended last.
pub fn log_directives(verbosity: u8, existing: Option<String>, overrides: Option<String>) -> String {
    let mut config = match verbosity {
        0 => existing.unwrap_or_else(|| "sftpfs=info,warn".to_string()),
        1 => "sftpfs=debug,info".to_string(),
        2 => "sftpfs=trace,info".to_string(),
        3 => "sftpfs=trace,debug".to_string(),
        _ => "trace".to_string(),
    };
    if let Some(overrides) = overrides {
        config.push(',');
        config.push_str(&overrides);
    }
    config
}

pub fn configure_logging(verbosity: u8, log_file: Option<&Path>) {
    let config = log_directives(
        verbosity,
        std::env::var(SFTPFS_LOG).ok(),
        std::env::var("RUST_LOG").ok(),
    );
    let env_filter = tracing_subscriber::filter::EnvFilter::new(config);

    let file = log_file.and_then(|path| {
        std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|err| eprintln!("WARNING: cannot log to {}: {err}", path.display()))
            .ok()
    });
    let (writer, ansi) = match file {
        Some(file) => (BoxMakeWriter::new(Mutex::new(file)), false),
        None => (BoxMakeWriter::new(std::io::stderr), true),
    };
    let fmt_layer = tracing_subscriber::fmt::layer()
        .without_time()
        .with_ansi(ansi)
        .with_target(verbosity > 2)
        .with_writer(writer);

    let sub = tracing_subscriber::registry().with(fmt_layer.with_filter(env_filter));
    if let Err(err) = tracing::subscriber::set_global_default(sub) {
        eprintln!("WARNING: failed to configure logging: {err}");
    }
}

/// Trait all sftpfs cli command parsers must implement to provide the
/// name of the sftpfs command that has been parsed.
pub trait CommandName {
    fn command_name(&self) -> &str;
}

/// A remote address in the form `user@host[:port]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Address {
    pub user: String,
    pub host: String,
    pub port: Option<u16>,
}

/// Parse a `user@host[:port]` address.
///
/// IPv6 hosts must be bracketed, eg: `me@[::1]:2222`, and
/// keep their brackets so that they can be connected to.
pub fn parse_address(address: &str) -> Result<Address> {
    let (user, rest) = address
        .rsplit_once('@')
        .ok_or_else(|| anyhow!("expected user@host[:port], got '{address}'"))?;
    let (host, port) = match rest.find(']') {
        Some(end) if rest.starts_with('[') => {
            let (host, tail) = rest.split_at(end + 1);
            match tail {
                "" => (host, None),
                tail => match tail.strip_prefix(':') {
                    Some(port) => (host, Some(port)),
                    None => bail!("invalid address after host: '{address}'"),
                },
            }
        }
        _ => match rest.split_once(':') {
            Some((host, port)) => (host, Some(port)),
            None => (rest, None),
        },
    };
    if user.is_empty() {
        bail!("a remote user is required: '{address}'");
    }
    if host.is_empty() || host == "[]" {
        bail!("a remote host is required: '{address}'");
    }
    let port = port
        .map(|port| {
            port.parse::<u16>()
                .with_context(|| format!("invalid port '{port}' in '{address}'"))
        })
        .transpose()?;
    Ok(Address {
        user: user.to_string(),
        host: host.to_string(),
        port,
    })
}

/// Command line flags for selecting and authenticating with a remote
#[derive(Debug, Clone, clap::Args)]
pub struct Target {
    /// A configured preset name, or a remote address as user@host[:port]
    #[clap(value_name = "TARGET")]
    pub target: String,

    /// The password to authenticate with
    #[clap(long, env = "SFTPFS_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// Authenticate with this private key instead of a password
    #[clap(long, short = 'i', value_hint = clap::ValueHint::FilePath)]
    pub identity: Option<PathBuf>,

    /// The passphrase of the private key, if it has one
    #[clap(long, env = "SFTPFS_PASSPHRASE", hide_env_values = true)]
    pub passphrase: Option<String>,

    /// The remote directory to serve, overriding any preset
    #[clap(long)]
    pub root: Option<String>,
}

impl Target {
    /// The preset named by this target, if there is one
    pub fn preset<'a>(&self, config: &'a Config) -> Option<&'a Preset> {
        config.preset(&self.target)
    }

    /// Resolve these flags into the context for a new mount
    pub fn mount_context(&self, config: &Config) -> Result<MountContext> {
        if let Some(preset) = self.preset(config) {
            tracing::debug!(preset = %self.target, "using configured preset");
            let mut preset = preset.clone();
            if let Some(root) = &self.root {
                preset.root = root.clone();
            }
            if let Some(identity) = &self.identity {
                preset.identity = Some(identity.clone());
                preset.use_password = false;
            }
            let secret = if preset.use_password {
                self.password.clone()
            } else {
                self.passphrase.clone()
            };
            return preset
                .mount_context(secret, config)
                .with_context(|| format!("invalid preset '{}'", self.target));
        }

        let address = parse_address(&self.target)?;
        let credential = match &self.identity {
            Some(identity) => Credential::PrivateKey {
                identity: identity.clone(),
                passphrase: self.passphrase.clone(),
            },
            None => Credential::Password(self.password.clone().unwrap_or_default()),
        };
        MountContext::builder(address.host, address.user, credential)
            .port(address.port.unwrap_or(config.connection.port))
            .root(self.root.as_deref().unwrap_or("/"))
            .volume_label(&config.filesystem.volume_label)
            .timeout_secs(config.connection.timeout_secs)
            .build()
            .context("invalid mount target")
    }
}

#[macro_export]
macro_rules! main {
    ($cmd:ident) => {
        fn main() {
            // because this function exits right away it does not
            // properly handle destruction of data, so we put the actual
            // logic into a separate function/scope
            std::process::exit(main2())
        }
        fn main2() -> i32 {
            let mut opt = $cmd::parse();
            let config = $crate::configure!(opt);

            let result = opt.run(&config);

            $crate::handle_result!(result)
        }
    };
}

#[macro_export]
macro_rules! configure {
    ($opt:ident) => {{
        $opt.logging.configure();

        match $crate::__private::sftpfs::get_config() {
            Err(err) => {
                $crate::__private::tracing::error!(err = ?err, "failed to load config");
                return 1;
            }
            Ok(config) => config,
        }
    }};
}

#[macro_export]
macro_rules! handle_result {
    ($result:ident) => {{
        use $crate::__private::sftpfs::Error as SftpfsError;
        match $result {
            Err(err) => match err.chain().find_map(|e| e.downcast_ref::<SftpfsError>()) {
                Some(cause) if cause.is_connection_lost() => {
                    $crate::__private::tracing::error!("Lost connection to the remote: {err:#}");
                    1
                }
                Some(SftpfsError::InvalidMount(_)) => {
                    $crate::__private::tracing::error!("{err:#}");
                    2
                }
                _ => {
                    $crate::__private::tracing::error!("{err:#}");
                    1
                }
            },
            Ok(code) => code,
        }
    }};
}
