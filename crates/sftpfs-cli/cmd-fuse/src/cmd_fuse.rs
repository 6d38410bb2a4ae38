// Copyright (c) Contributors to the sftpfs project.
// SPDX-License-Identifier: Apache-2.0

use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use clap::Parser;
use fuser::MountOption;
use nix::unistd::{Gid, Uid};
use sftpfs::SftpFs;
use sftpfs::remote::ssh::SshConnector;
use sftpfs_cli_common as cli;
use sftpfs_vfs::{Config, Session};
use tokio::signal::unix::{SignalKind, signal};

#[cfg(test)]
#[path = "./cmd_fuse_test.rs"]
mod cmd_fuse_test;

const DEFAULT_TTL: Duration = Duration::ZERO;

fn main() {
    // because this function exits right away it does not
    // properly handle destruction of data, so we put the actual
    // logic into a separate function/scope
    std::process::exit(main2())
}
fn main2() -> i32 {
    let mut opt = CmdFuse::parse();
    opt.logging.configure();

    let config = match sftpfs::get_config() {
        Err(err) => {
            tracing::error!(err = ?err, "failed to load config");
            return 1;
        }
        Ok(config) => config,
    };
    let result = opt.run(&config);

    cli::handle_result!(result)
}

/// Mount a remote directory over SFTP as a local FUSE filesystem
#[derive(Debug, Parser)]
#[clap(name = "sftpfs-fuse", version = sftpfs::VERSION)]
pub struct CmdFuse {
    #[clap(flatten)]
    logging: cli::Logging,

    #[clap(flatten)]
    target: cli::Target,

    /// Do not daemonize the filesystem, run it in the foreground instead
    #[clap(long, short)]
    foreground: bool,

    /// Do not disconnect the filesystem logs from stderr
    ///
    /// Although the filesystem will still daemonize, the logs will
    /// still appear in the stderr of the calling process/shell
    #[clap(long, env = "SFTPFS_FUSE_LOG_FOREGROUND")]
    log_foreground: bool,

    /// Options for the mount in the form opt1,opt2=value
    ///
    /// In addition to all existing fuse mount options, the following custom
    /// options are also supported:
    ///
    ///  uid    - the user id that should own all files in the mount, defaults to
    ///           the effective user id of the caller. Only allowed when running
    ///           as root/sudo.
    ///  gid    - the group id that should own all files in the mount, defaults to
    ///           the effective group id of the caller. Only allowed when running
    ///           as root/sudo.
    ///  ttl    - seconds that the kernel may cache attributes and lookups for,
    ///           nothing is cached by default
    ///  threads - the number of requests that may be served at the same time,
    ///           defaults to the limit of the async runtime
    #[clap(long, short, value_delimiter = ',')]
    options: Vec<String>,

    /// The location where to mount the remote directory, required
    /// unless the target is a preset with its own mountpoint
    mountpoint: Option<std::path::PathBuf>,
}

impl cli::CommandName for CmdFuse {
    fn command_name(&self) -> &str {
        "fuse"
    }
}

impl CmdFuse {
    pub fn run(&mut self, config: &sftpfs::Config) -> Result<i32> {
        let calling_uid = nix::unistd::geteuid();
        let calling_gid = nix::unistd::getegid();

        let context = self.target.mount_context(config)?;
        let MountSettings { config: mut opts, threads } =
            build_config(&self.options, calling_uid, calling_gid)?;
        opts.mount_options
            .insert(MountOption::FSName(format!("{}@{}", context.user(), context.address())));

        tracing::debug!("FUSE Config: {opts:#?}");

        if opts.gid != calling_gid {
            nix::unistd::setgid(opts.gid).context("Failed to set desired group (actual)")?;
            nix::unistd::setegid(opts.gid).context("Failed to set desired group (effective)")?;
        }
        if opts.uid != calling_uid {
            nix::unistd::setuid(opts.uid).context("Failed to become desired user (actual)")?;
            nix::unistd::seteuid(opts.uid).context("Failed to become desired user (effective)")?;
        }

        let mountpoint = self
            .mountpoint
            .clone()
            .or_else(|| {
                self.target
                    .preset(config)
                    .and_then(|preset| preset.mountpoint.clone())
            })
            .ok_or_else(|| anyhow!("A mountpoint is required for '{}'", self.target.target))?
            .canonicalize()
            .context("Invalid mount point")?;

        if !calling_uid.is_root() {
            // unprivileged callers must have write access to the directory that
            // they are trying to mount over.
            nix::unistd::access(&mountpoint, nix::unistd::AccessFlags::W_OK)
                .context("Must have write access to mountpoint")?;
        }

        // connect before mounting so that authentication problems
        // are reported to the caller rather than to the daemon logs
        let address = context.address();
        let fs = SftpFs::new(SshConnector, context, &config.filesystem);
        fs.connect()
            .with_context(|| format!("Failed to connect to {address}"))?;

        tracing::debug!("Establishing fuse session...");
        let mount_opts = opts.mount_options.iter().cloned().collect::<Vec<_>>();
        let mut session = fuser::Session::new(Session::new(fs, opts), &mountpoint, &mount_opts)
            .context("Failed to create a FUSE session")?;

        if !self.foreground {
            tracing::debug!("Moving into background...");
            // We cannot daemonize until the session is established above,
            // otherwise initial use of the filesystem may not show any mount
            // at all.
            nix::unistd::daemon(false, self.log_foreground)?;
        }

        // The runtime must not be started until after daemonizing,
        // as its worker threads do not survive the fork.
        let mut builder = tokio::runtime::Builder::new_multi_thread();
        if let Some(threads) = threads {
            // one more for the session loop itself
            builder.max_blocking_threads(threads + 1);
        }
        let rt = builder
            .enable_all()
            .build()
            .context("Failed to establish runtime")?;

        let result = rt.block_on(async move {
            let mut interrupt = signal(SignalKind::interrupt()).context("interrupt signal handler")?;
            let mut quit = signal(SignalKind::quit()).context("quit signal handler")?;
            let mut terminate = signal(SignalKind::terminate()).context("terminate signal handler")?;

            tracing::info!("Starting FUSE filesystem");
            // the session blocks until it is unmounted, and requests are
            // served from the blocking pool of this runtime
            let fut = tokio::task::spawn_blocking(move || session.run());
            tokio::select! {
                res = fut => {
                    tracing::info!("Filesystem shutting down");
                    res.context("FUSE session failed")
                }
                // we explicitly catch any signal related to interruption
                // and will act by shutting down the filesystem early
                _ = terminate.recv() => Err(anyhow!("Terminate signal received, filesystem shutting down")),
                _ = interrupt.recv() => Err(anyhow!("Interrupt signal received, filesystem shutting down")),
                _ = quit.recv() => Err(anyhow!("Quit signal received, filesystem shutting down")),
            }
        });

        // requests may still be waiting on the remote, and
        // there is no reason to wait long for them to finish
        rt.shutdown_timeout(Duration::from_secs(2));
        result??;
        Ok(0)
    }
}

/// Everything configured through the raw `-o` options
#[derive(Debug)]
struct MountSettings {
    config: Config,
    /// Limit on the requests served at the same time
    threads: Option<usize>,
}

/// Build the filesystem configuration from the raw `-o` options
fn build_config(options: &[String], calling_uid: Uid, calling_gid: Gid) -> Result<MountSettings> {
    // these will cause conflicts later on if their counterpart is also provided
    let required_opts = vec![
        MountOption::NoDev,
        MountOption::NoSuid,
        MountOption::Subtype("sftpfs".into()),
    ];
    let mut opts = Config {
        uid: calling_uid,
        gid: calling_gid,
        mount_options: required_opts.into_iter().collect(),
        ttl: DEFAULT_TTL,
    };
    let mut threads = None;

    for option in parse_options_from_args(options) {
        match option {
            MountOption::CUSTOM(opt) => match opt.split_once('=') {
                Some(("uid", num)) if calling_uid.is_root() => {
                    opts.uid = num
                        .parse::<u32>()
                        .map(Uid::from_raw)
                        .with_context(|| format!("Invalid parameter value for uid={num}"))?
                }
                Some(("gid", num)) if calling_uid.is_root() => {
                    opts.gid = num
                        .parse::<u32>()
                        .map(Gid::from_raw)
                        .with_context(|| format!("Invalid parameter value for gid={num}"))?
                }
                Some(("uid", _)) | Some(("gid", _)) => {
                    bail!("Must be root to launch with alternate uid/gid");
                }
                Some(("ttl", secs)) => {
                    opts.ttl = secs
                        .parse::<u64>()
                        .map(Duration::from_secs)
                        .with_context(|| format!("Invalid parameter value for ttl={secs}"))?
                }
                Some(("threads", count)) => match count.parse::<usize>() {
                    Ok(count) if count > 0 => threads = Some(count),
                    _ => bail!("Invalid parameter value for threads={count}"),
                },
                _ => bail!("Unsupported mount option, or missing value: {opt}"),
            },
            MountOption::Dev | MountOption::Suid => {
                bail!("Device files and setuid programs are never allowed: {option:?}")
            }
            _ => {
                opts.mount_options.insert(option);
            }
        }
    }

    if opts.mount_options.contains(&MountOption::RO) && opts.mount_options.contains(&MountOption::RW) {
        bail!("Cannot mount as both ro and rw");
    }
    Ok(MountSettings {
        config: opts,
        threads,
    })
}

/// Copies from the private [`fuser::MountOption::from_str`]
fn parse_options_from_args(args: &[String]) -> Vec<MountOption> {
    args.iter()
        .map(|s| match s.as_str() {
            "auto_unmount" => MountOption::AutoUnmount,
            "allow_other" => MountOption::AllowOther,
            "allow_root" => MountOption::AllowRoot,
            "default_permissions" => MountOption::DefaultPermissions,
            "dev" => MountOption::Dev,
            "nodev" => MountOption::NoDev,
            "suid" => MountOption::Suid,
            "nosuid" => MountOption::NoSuid,
            "ro" => MountOption::RO,
            "rw" => MountOption::RW,
            "exec" => MountOption::Exec,
            "noexec" => MountOption::NoExec,
            "atime" => MountOption::Atime,
            "noatime" => MountOption::NoAtime,
            "dirsync" => MountOption::DirSync,
            "sync" => MountOption::Sync,
            "async" => MountOption::Async,
            x if x.starts_with("fsname=") => MountOption::FSName(x[7..].into()),
            x if x.starts_with("subtype=") => MountOption::Subtype(x[8..].into()),
            x => MountOption::CUSTOM(x.into()),
        })
        .collect()
}
