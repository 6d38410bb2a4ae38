// Copyright (c) Contributors to the sftpfs project.
// SPDX-License-Identifier: Apache-2.0

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

#[cfg(test)]
#[path = "./config_test.rs"]
mod config_test;

static CONFIG: OnceCell<Arc<Config>> = OnceCell::new();

pub const DEFAULT_PORT: u16 = 22;
pub const DEFAULT_VOLUME_LABEL: &str = "SFTP";

/// Behavior of the mounted filesystem
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct Filesystem {
    /// The volume label reported to the host when a preset
    /// does not name its own
    pub volume_label: String,

    /// Report every file and directory as offline.
    ///
    /// Host file browsers avoid opening offline files to generate
    /// previews and thumbnails, which would otherwise download
    /// whole files over the network while browsing.
    pub offline_attribute: bool,

    /// Report writes that fail with a non-connection io error
    /// as failures instead of accepting them.
    pub strict_writes: bool,
}

impl Default for Filesystem {
    fn default() -> Self {
        Self {
            volume_label: DEFAULT_VOLUME_LABEL.to_string(),
            offline_attribute: true,
            strict_writes: false,
        }
    }
}

/// Defaults applied when establishing remote sessions
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct Connection {
    pub port: u16,

    /// Seconds to wait for any single remote call, zero waits forever
    pub timeout_secs: u64,
}

impl Default for Connection {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            timeout_secs: 0,
        }
    }
}

/// A named, reusable mount target
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct Preset {
    pub host: String,
    pub port: Option<u16>,
    pub user: String,
    /// Private key used to authenticate, when not using a password
    pub identity: Option<PathBuf>,
    pub use_password: bool,
    /// The remote directory that appears as the root of the mount
    pub root: String,
    pub mountpoint: Option<PathBuf>,
    pub volume_label: Option<String>,
}

impl Default for Preset {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: None,
            user: String::new(),
            identity: None,
            use_password: true,
            root: "/".to_string(),
            mountpoint: None,
            volume_label: None,
        }
    }
}

impl Preset {
    /// Build the context for mounting this preset with the given secret.
    ///
    /// The secret is the password when the preset uses password
    /// authentication, and the key passphrase otherwise.
    pub fn mount_context(&self, secret: Option<String>, config: &Config) -> Result<MountContext> {
        let credential = if self.use_password {
            Credential::Password(secret.unwrap_or_default())
        } else {
            let identity = self.identity.clone().ok_or_else(|| {
                Error::InvalidMount(format!(
                    "preset for {} uses key authentication but has no identity",
                    self.host
                ))
            })?;
            Credential::PrivateKey {
                identity,
                passphrase: secret,
            }
        };
        MountContext::builder(&self.host, &self.user, credential)
            .port(self.port.unwrap_or(config.connection.port))
            .root(&self.root)
            .volume_label(
                self.volume_label
                    .as_deref()
                    .unwrap_or(&config.filesystem.volume_label),
            )
            .timeout_secs(config.connection.timeout_secs)
            .build()
    }
}

/// Configuration values for sftpfs.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    // These sub-types should aim to only have one level of
    // values within them, otherwise they become impossible to address
    // with environment variables.
    pub filesystem: Filesystem,
    pub connection: Connection,
    pub presets: BTreeMap<String, Preset>,
}

impl Config {
    /// Parse a config from a toml string, without any other sources
    pub fn load_string<S: AsRef<str>>(conf: S) -> Result<Self> {
        let config = config::Config::builder()
            .add_source(config::File::from_str(
                conf.as_ref(),
                config::FileFormat::Toml,
            ))
            .build()?;
        Ok(Config::deserialize(config)?)
    }

    /// List the names of all configured presets.
    pub fn list_preset_names(&self) -> Vec<String> {
        self.presets.keys().cloned().collect()
    }

    pub fn preset<S: AsRef<str>>(&self, name: S) -> Option<&Preset> {
        self.presets.get(name.as_ref())
    }
}

/// Get the current sftpfs config, fetching it from disk if needed.
pub fn get_config() -> Result<Arc<Config>> {
    CONFIG
        .get_or_try_init(|| load_config().map(Arc::new))
        .cloned()
}

/// Load the sftpfs configuration from disk, even if it has already been loaded.
///
/// This includes the system and user configurations (if they exist),
/// followed by any `SFTPFS_<SECTION>_<NAME>` environment variables.
pub fn load_config() -> Result<Config> {
    use config::{Config as RawConfig, File};

    let mut config_builder = RawConfig::builder()
        // the system config can be in any supported format: toml, yaml, json, ini, etc
        .add_source(File::with_name("/etc/sftpfs").required(false));
    if let Some(user_config) = dirs::config_dir().map(|d| d.join("sftpfs").join("sftpfs")) {
        config_builder = config_builder
            .add_source(File::with_name(&format!("{}", user_config.display())).required(false));
    }

    for (var, value) in std::env::vars() {
        let Some(tail) = var.strip_prefix("SFTPFS_") else {
            continue;
        };
        let Some((section, name)) = tail.split_once('_') else {
            // a value with no section is not a configuration
            // value, and can be skipped (eg: SFTPFS_LOG)
            continue;
        };
        let section = section.to_lowercase();
        if !matches!(section.as_str(), "filesystem" | "connection") {
            // credentials and cli flags share the same prefix
            continue;
        }

        let key = format!("{section}.{}", name.to_lowercase());
        config_builder = config_builder.set_override(key, value)?;
    }

    let config = config_builder.build()?;
    Ok(Config::deserialize(config)?)
}

/// The secret used to authenticate a session
#[derive(Clone, PartialEq, Eq)]
pub enum Credential {
    Password(String),
    PrivateKey {
        identity: PathBuf,
        passphrase: Option<String>,
    },
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Password(_) => f.debug_tuple("Password").field(&"<redacted>").finish(),
            Self::PrivateKey {
                identity,
                passphrase,
            } => f
                .debug_struct("PrivateKey")
                .field("identity", identity)
                .field("passphrase", &passphrase.as_ref().map(|_| "<redacted>"))
                .finish(),
        }
    }
}

/// Everything needed to open a session for one mount.
///
/// A context never changes once a mount has been established,
/// mounting again creates a new context.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MountContext {
    user: String,
    host: String,
    port: u16,
    credential: Credential,
    root: String,
    volume_label: String,
    timeout: Option<Duration>,
}

impl MountContext {
    pub fn builder<H, U>(host: H, user: U, credential: Credential) -> MountContextBuilder
    where
        H: Into<String>,
        U: Into<String>,
    {
        MountContextBuilder {
            context: MountContext {
                user: user.into(),
                host: host.into(),
                port: DEFAULT_PORT,
                credential,
                root: "/".to_string(),
                volume_label: DEFAULT_VOLUME_LABEL.to_string(),
                timeout: None,
            },
        }
    }

    pub fn user(&self) -> &str {
        &self.user
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn credential(&self) -> &Credential {
        &self.credential
    }

    pub fn root(&self) -> &str {
        &self.root
    }

    pub fn volume_label(&self) -> &str {
        &self.volume_label
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// The `host:port` pair to connect to
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Assembles a validated [`MountContext`]
#[derive(Debug)]
pub struct MountContextBuilder {
    context: MountContext,
}

impl MountContextBuilder {
    pub fn port(mut self, port: u16) -> Self {
        self.context.port = port;
        self
    }

    pub fn root<S: Into<String>>(mut self, root: S) -> Self {
        self.context.root = root.into();
        self
    }

    pub fn volume_label<S: Into<String>>(mut self, label: S) -> Self {
        self.context.volume_label = label.into();
        self
    }

    /// Zero disables the timeout
    pub fn timeout_secs(mut self, secs: u64) -> Self {
        self.context.timeout = (secs > 0).then(|| Duration::from_secs(secs));
        self
    }

    pub fn build(self) -> Result<MountContext> {
        let context = self.context;
        if context.host.is_empty() {
            return Err(Error::InvalidMount("a remote host is required".into()));
        }
        if context.user.is_empty() {
            return Err(Error::InvalidMount("a remote user is required".into()));
        }
        if context.port == 0 {
            return Err(Error::InvalidMount("port must not be zero".into()));
        }
        Ok(context)
    }
}
