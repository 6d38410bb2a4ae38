// Copyright (c) Contributors to the sftpfs project.
// SPDX-License-Identifier: Apache-2.0

use std::collections::HashSet;
use std::ffi::{OsStr, OsString};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use fuser::consts::*;
use fuser::{
    FileAttr,
    FileType,
    MountOption,
    ReplyAttr,
    ReplyCreate,
    ReplyData,
    ReplyDirectory,
    ReplyEmpty,
    ReplyEntry,
    ReplyOpen,
    ReplyWrite,
    Request,
    TimeOrNow,
};
use sftpfs::remote::Connector;
use sftpfs::{Disposition, FileAttributes, FileContext, FileInformation, SftpFs};

use crate::host;
use crate::inodes::{Inodes, UNKNOWN_INODE};
use crate::{Error, Result};

// the kernel flag asking rename to fail if the target exists
const RENAME_NOREPLACE: u32 = 1;

/// Options to configure the FUSE filesystem and
/// its behavior at runtime
#[derive(Debug, Clone)]
pub struct Config {
    /// The user id that should own all files and directories
    pub uid: nix::unistd::Uid,
    /// The group id that should own all files and directories
    pub gid: nix::unistd::Gid,
    /// Mount options to be used when setting up
    pub mount_options: HashSet<MountOption>,
    /// How long the kernel may cache attributes and lookups
    pub ttl: Duration,
}

struct Handle {
    path: String,
    context: FileContext,
}

/// Serves FUSE requests from an [`SftpFs`]
struct Filesystem<C: Connector> {
    fs: SftpFs<C>,
    opts: Config,
    inodes: Inodes,
    next_handle: AtomicU64,
    handles: DashMap<u64, Handle>,
}

impl<C: Connector> Filesystem<C> {
    const BLOCK_SIZE: u32 = 4096;

    fn new(fs: SftpFs<C>, opts: Config) -> Self {
        Self {
            fs,
            opts,
            inodes: Inodes::new(),
            next_handle: AtomicU64::new(1),
            handles: DashMap::new(),
        }
    }

    fn allocate_handle(&self, path: String, context: FileContext) -> u64 {
        let fh = self.next_handle.fetch_add(1, Ordering::Relaxed);
        self.handles.insert(fh, Handle { path, context });
        fh
    }

    fn handle(&self, fh: u64) -> Result<(String, FileContext)> {
        self.handles
            .get(&fh)
            .map(|handle| (handle.path.clone(), handle.context))
            .ok_or(Error::UnknownHandle(fh))
    }

    fn child_path(&self, parent: u64, name: &OsStr) -> Result<String> {
        let parent = self.inodes.path(parent)?;
        let name = name
            .to_str()
            .ok_or_else(|| Error::InvalidName(name.to_owned()))?;
        Ok(host::child_path(&parent, name))
    }

    fn attr_from_info(&self, ino: u64, info: &FileInformation) -> FileAttr {
        let (kind, perm) = if info.is_dir() {
            (FileType::Directory, 0o755)
        } else if info.attributes.contains(FileAttributes::READONLY) {
            (FileType::RegularFile, 0o444)
        } else {
            (FileType::RegularFile, 0o644)
        };
        FileAttr {
            ino,
            size: info.length,
            blocks: info.length.div_ceil(512),
            atime: SystemTime::from(info.last_access_time),
            mtime: SystemTime::from(info.last_write_time),
            ctime: SystemTime::from(info.last_write_time),
            crtime: SystemTime::from(info.creation_time),
            kind,
            perm,
            nlink: if info.is_dir() { 2 } else { 1 },
            uid: self.opts.uid.as_raw(),
            gid: self.opts.gid.as_raw(),
            rdev: 0,
            blksize: Self::BLOCK_SIZE,
            flags: 0,
        }
    }

    fn lookup_path(&self, path: &str) -> Result<FileAttr> {
        let info = self.fs.get_file_information(path)?;
        let ino = self.inodes.lookup(path);
        Ok(self.attr_from_info(ino, &info))
    }
}

/// Extract the ok value from a result, or reply with an error in FUSE
macro_rules! unwrap {
    ($reply:ident, $op:expr) => {{
        match $op {
            Ok(r) => r,
            Err(err) => err!($reply, err),
        }
    }};
}

/// Reply with an error to FUSE and return
macro_rules! err {
    ($reply:ident, $err:expr) => {{
        let err = Error::from($err);
        tracing::debug!("{err}");
        $reply.error(err.errno());
        return;
    }};
}

// these functions mirror the actual fuse ones and
// so we don't have much control over the shape
#[allow(clippy::too_many_arguments)]
impl<C: Connector> Filesystem<C> {
    fn statfs(&self, reply: fuser::ReplyStatfs) {
        let space = self.fs.get_disk_free_space();
        let volume = self.fs.get_volume_information();
        let block = Self::BLOCK_SIZE as u64;
        reply.statfs(
            space.total_bytes / block,
            space.total_free_bytes / block,
            space.free_bytes_available / block,
            0,
            0,
            Self::BLOCK_SIZE,
            volume.max_component_length,
            Self::BLOCK_SIZE,
        )
    }

    fn lookup(&self, parent: u64, name: OsString, reply: ReplyEntry) {
        let path = unwrap!(reply, self.child_path(parent, &name));
        tracing::trace!("lookup {path}");
        let attr = unwrap!(reply, self.lookup_path(&path));
        reply.entry(&self.opts.ttl, &attr, 0);
    }

    fn getattr(&self, ino: u64, reply: ReplyAttr) {
        let path = unwrap!(reply, self.inodes.path(ino));
        let info = unwrap!(reply, self.fs.get_file_information(&path));
        reply.attr(&self.opts.ttl, &self.attr_from_info(ino, &info));
    }

    fn setattr(
        &self,
        ino: u64,
        size: Option<u64>,
        atime: Option<TimeOrNow>,
        mtime: Option<TimeOrNow>,
        reply: ReplyAttr,
    ) {
        let path = unwrap!(reply, self.inodes.path(ino));
        match size {
            None => {}
            Some(0) => {
                unwrap!(
                    reply,
                    self.fs.open_or_create(&path, false, Disposition::Truncate)
                );
            }
            Some(size) => {
                let current = unwrap!(reply, self.fs.get_file_information(&path));
                if size < current.length {
                    // remote files are only ever grown in place
                    tracing::debug!("ignoring request to shrink {path} to {size} bytes");
                } else {
                    unwrap!(reply, self.fs.set_end_of_file(&path, size));
                }
            }
        }
        if atime.is_some() || mtime.is_some() {
            unwrap!(
                reply,
                self.fs
                    .set_file_time(&path, None, atime.map(to_datetime), mtime.map(to_datetime))
            );
        }
        let info = unwrap!(reply, self.fs.get_file_information(&path));
        reply.attr(&self.opts.ttl, &self.attr_from_info(ino, &info));
    }

    fn mkdir(&self, parent: u64, name: OsString, reply: ReplyEntry) {
        let path = unwrap!(reply, self.child_path(parent, &name));
        unwrap!(
            reply,
            self.fs.open_or_create(&path, true, Disposition::CreateNew)
        );
        let attr = unwrap!(reply, self.lookup_path(&path));
        reply.entry(&self.opts.ttl, &attr, 0);
    }

    fn unlink(&self, parent: u64, name: OsString, reply: ReplyEmpty) {
        let path = unwrap!(reply, self.child_path(parent, &name));
        unwrap!(reply, self.fs.delete_file(&path));
        self.inodes.remove(&path);
        reply.ok();
    }

    fn rmdir(&self, parent: u64, name: OsString, reply: ReplyEmpty) {
        let path = unwrap!(reply, self.child_path(parent, &name));
        unwrap!(reply, self.fs.delete_directory(&path));
        self.inodes.remove(&path);
        reply.ok();
    }

    fn rename(
        &self,
        parent: u64,
        name: OsString,
        newparent: u64,
        newname: OsString,
        flags: u32,
        reply: ReplyEmpty,
    ) {
        let from = unwrap!(reply, self.child_path(parent, &name));
        let to = unwrap!(reply, self.child_path(newparent, &newname));
        let replace = flags & RENAME_NOREPLACE == 0;
        unwrap!(reply, self.fs.move_file(&from, &to, replace));
        self.inodes.rename(&from, &to);
        reply.ok();
    }

    fn open(&self, ino: u64, flags: i32, reply: ReplyOpen) {
        let path = unwrap!(reply, self.inodes.path(ino));
        let disposition = host::disposition_for_open(flags);
        let context = unwrap!(reply, self.fs.open_or_create(&path, false, disposition));
        if context.is_directory {
            reply.error(libc::EISDIR);
            return;
        }
        let fh = self.allocate_handle(path, context);
        tracing::trace!("open {ino} = {fh}");
        reply.opened(fh, 0);
    }

    fn create(&self, parent: u64, name: OsString, flags: i32, reply: ReplyCreate) {
        let path = unwrap!(reply, self.child_path(parent, &name));
        let disposition = host::disposition_for_create(flags);
        let context = unwrap!(reply, self.fs.open_or_create(&path, false, disposition));
        let attr = unwrap!(reply, self.lookup_path(&path));
        let fh = self.allocate_handle(path, context);
        tracing::trace!("create {} = {fh}", attr.ino);
        reply.created(&self.opts.ttl, &attr, 0, fh, 0);
    }

    fn read(&self, fh: u64, offset: i64, size: u32, reply: ReplyData) {
        let (path, context) = unwrap!(reply, self.handle(fh));
        let mut buf = vec![0; size as usize];
        let offset = offset.max(0) as u64;
        let count = unwrap!(reply, self.fs.read_file(&path, &context, &mut buf, offset));
        tracing::trace!("read {fh} = {count}/{size}");
        reply.data(&buf[..count]);
    }

    fn write(&self, fh: u64, offset: i64, data: Vec<u8>, reply: ReplyWrite) {
        let (path, context) = unwrap!(reply, self.handle(fh));
        let offset = offset.max(0) as u64;
        let count = unwrap!(reply, self.fs.write_file(&path, &context, &data, offset));
        tracing::trace!("write {fh} = {count}/{}", data.len());
        reply.written(count as u32);
    }

    fn flush(&self, fh: u64, reply: ReplyEmpty) {
        let (path, context) = unwrap!(reply, self.handle(fh));
        unwrap!(reply, self.fs.flush_file_buffers(&path, &context));
        reply.ok();
    }

    fn release(&self, fh: u64, reply: ReplyEmpty) {
        let Some((_, handle)) = self.handles.remove(&fh) else {
            reply.error(libc::EBADF);
            return;
        };
        self.fs.cleanup(&handle.path, &handle.context);
        self.fs.close_file(&handle.path, &handle.context);
        reply.ok();
    }

    fn opendir(&self, ino: u64, reply: ReplyOpen) {
        let path = unwrap!(reply, self.inodes.path(ino));
        let context = unwrap!(reply, self.fs.open_or_create(&path, true, Disposition::Open));
        let fh = self.allocate_handle(path, context);
        tracing::trace!("opendir {ino} = {fh}");
        reply.opened(fh, 0);
    }

    fn readdir(&self, fh: u64, offset: i64, mut reply: ReplyDirectory) {
        let (path, _context) = unwrap!(reply, self.handle(fh));
        let entries = unwrap!(reply, self.fs.find_files(&path));
        let skip = offset.max(0) as usize;
        for (index, entry) in entries.iter().enumerate().skip(skip) {
            let ino = self
                .inodes
                .get(&host::child_path(&path, &entry.file_name))
                .unwrap_or(UNKNOWN_INODE);
            let kind = if entry.is_dir() {
                FileType::Directory
            } else {
                FileType::RegularFile
            };
            // offsets point to the next entry to be read
            let buffer_full = reply.add(ino, (index + 1) as i64, kind, &entry.file_name);
            if buffer_full {
                break;
            }
        }
        reply.ok();
    }

    fn releasedir(&self, fh: u64, reply: ReplyEmpty) {
        let Some((_, handle)) = self.handles.remove(&fh) else {
            reply.error(libc::EBADF);
            return;
        };
        self.fs.close_file(&handle.path, &handle.context);
        reply.ok();
    }
}

fn to_datetime(time: TimeOrNow) -> DateTime<Utc> {
    match time {
        TimeOrNow::SpecificTime(time) => DateTime::<Utc>::from(time),
        TimeOrNow::Now => Utc::now(),
    }
}

/// Represents a connected FUSE session.
///
/// This implements the [`fuser::Filesystem`] trait, receives
/// all requests and executes each one on the blocking thread pool
/// of the current tokio runtime, so that the remote is never
/// waited on from the FUSE event loop.
pub struct Session<C: Connector> {
    inner: Arc<Filesystem<C>>,
}

impl<C: Connector> Session<C> {
    /// Construct a new session which serves the given filesystem
    pub fn new(fs: SftpFs<C>, opts: Config) -> Self {
        Self {
            inner: Arc::new(Filesystem::new(fs, opts)),
        }
    }
}

impl<C: Connector> fuser::Filesystem for Session<C> {
    fn init(
        &mut self,
        _req: &Request<'_>,
        config: &mut fuser::KernelConfig,
    ) -> std::result::Result<(), libc::c_int> {
        const DESIRED: &[(&str, u32)] = &[
            ("FUSE_ASYNC_READ", FUSE_ASYNC_READ),
            ("FUSE_BIG_WRITES", FUSE_BIG_WRITES),
            ("FUSE_ATOMIC_O_TRUNC", FUSE_ATOMIC_O_TRUNC),
        ];
        let all_desired = DESIRED.iter().fold(0, |prev, (_, i)| prev | i);
        if let Err(unsupported) = config.add_capabilities(all_desired) {
            let rejected = DESIRED
                .iter()
                .filter_map(|d| (d.1 & unsupported != 0).then_some(d.0));
            for name in rejected {
                tracing::warn!("FUSE feature rejected: {name}");
            }
            if config.add_capabilities(all_desired & !unsupported).is_err() {
                tracing::warn!("FUSE capabilities could not be negotiated");
            }
        }
        if let Err(status) = self.inner.fs.mounted() {
            tracing::error!("failed to mount: {status}");
            return Err(host::errno(status));
        }
        tracing::info!("Filesystem initialized");
        Ok(())
    }

    fn destroy(&mut self) {
        if let Err(status) = self.inner.fs.unmounted() {
            tracing::warn!("failed to unmount cleanly: {status}");
        }
    }

    fn statfs(&mut self, _req: &Request<'_>, _ino: u64, reply: fuser::ReplyStatfs) {
        let fs = Arc::clone(&self.inner);
        tokio::task::spawn_blocking(move || fs.statfs(reply));
    }

    fn lookup(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEntry) {
        let name = name.to_owned();
        let fs = Arc::clone(&self.inner);
        tokio::task::spawn_blocking(move || fs.lookup(parent, name, reply));
    }

    fn forget(&mut self, _req: &Request<'_>, ino: u64, nlookup: u64) {
        tracing::trace!(ino, nlookup, "forget");
        self.inner.inodes.forget(ino, nlookup);
    }

    fn getattr(&mut self, _req: &Request<'_>, ino: u64, reply: ReplyAttr) {
        let fs = Arc::clone(&self.inner);
        tokio::task::spawn_blocking(move || fs.getattr(ino, reply));
    }

    fn setattr(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _mode: Option<u32>,
        _uid: Option<u32>,
        _gid: Option<u32>,
        size: Option<u64>,
        atime: Option<TimeOrNow>,
        mtime: Option<TimeOrNow>,
        _ctime: Option<SystemTime>,
        _fh: Option<u64>,
        _crtime: Option<SystemTime>,
        _chgtime: Option<SystemTime>,
        _bkuptime: Option<SystemTime>,
        _flags: Option<u32>,
        reply: ReplyAttr,
    ) {
        let fs = Arc::clone(&self.inner);
        tokio::task::spawn_blocking(move || fs.setattr(ino, size, atime, mtime, reply));
    }

    fn mkdir(
        &mut self,
        _req: &Request<'_>,
        parent: u64,
        name: &OsStr,
        _mode: u32,
        _umask: u32,
        reply: ReplyEntry,
    ) {
        let name = name.to_owned();
        let fs = Arc::clone(&self.inner);
        tokio::task::spawn_blocking(move || fs.mkdir(parent, name, reply));
    }

    fn unlink(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEmpty) {
        let name = name.to_owned();
        let fs = Arc::clone(&self.inner);
        tokio::task::spawn_blocking(move || fs.unlink(parent, name, reply));
    }

    fn rmdir(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEmpty) {
        let name = name.to_owned();
        let fs = Arc::clone(&self.inner);
        tokio::task::spawn_blocking(move || fs.rmdir(parent, name, reply));
    }

    fn rename(
        &mut self,
        _req: &Request<'_>,
        parent: u64,
        name: &OsStr,
        newparent: u64,
        newname: &OsStr,
        flags: u32,
        reply: ReplyEmpty,
    ) {
        let name = name.to_owned();
        let newname = newname.to_owned();
        let fs = Arc::clone(&self.inner);
        tokio::task::spawn_blocking(move || {
            fs.rename(parent, name, newparent, newname, flags, reply)
        });
    }

    fn open(&mut self, _req: &Request<'_>, ino: u64, flags: i32, reply: ReplyOpen) {
        let fs = Arc::clone(&self.inner);
        tokio::task::spawn_blocking(move || fs.open(ino, flags, reply));
    }

    fn create(
        &mut self,
        _req: &Request<'_>,
        parent: u64,
        name: &OsStr,
        _mode: u32,
        _umask: u32,
        flags: i32,
        reply: ReplyCreate,
    ) {
        let name = name.to_owned();
        let fs = Arc::clone(&self.inner);
        tokio::task::spawn_blocking(move || fs.create(parent, name, flags, reply));
    }

    fn read(
        &mut self,
        _req: &Request<'_>,
        _ino: u64,
        fh: u64,
        offset: i64,
        size: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyData,
    ) {
        let fs = Arc::clone(&self.inner);
        tokio::task::spawn_blocking(move || fs.read(fh, offset, size, reply));
    }

    fn write(
        &mut self,
        _req: &Request<'_>,
        _ino: u64,
        fh: u64,
        offset: i64,
        data: &[u8],
        _write_flags: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyWrite,
    ) {
        let data = data.to_vec();
        let fs = Arc::clone(&self.inner);
        tokio::task::spawn_blocking(move || fs.write(fh, offset, data, reply));
    }

    fn flush(
        &mut self,
        _req: &Request<'_>,
        _ino: u64,
        fh: u64,
        _lock_owner: u64,
        reply: ReplyEmpty,
    ) {
        let fs = Arc::clone(&self.inner);
        tokio::task::spawn_blocking(move || fs.flush(fh, reply));
    }

    fn release(
        &mut self,
        _req: &Request<'_>,
        _ino: u64,
        fh: u64,
        _flags: i32,
        _lock_owner: Option<u64>,
        _flush: bool,
        reply: ReplyEmpty,
    ) {
        let fs = Arc::clone(&self.inner);
        tokio::task::spawn_blocking(move || fs.release(fh, reply));
    }

    fn opendir(&mut self, _req: &Request<'_>, ino: u64, _flags: i32, reply: ReplyOpen) {
        let fs = Arc::clone(&self.inner);
        tokio::task::spawn_blocking(move || fs.opendir(ino, reply));
    }

    fn readdir(
        &mut self,
        _req: &Request<'_>,
        _ino: u64,
        fh: u64,
        offset: i64,
        reply: ReplyDirectory,
    ) {
        let fs = Arc::clone(&self.inner);
        tokio::task::spawn_blocking(move || fs.readdir(fh, offset, reply));
    }

    fn releasedir(
        &mut self,
        _req: &Request<'_>,
        _ino: u64,
        fh: u64,
        _flags: i32,
        reply: ReplyEmpty,
    ) {
        let fs = Arc::clone(&self.inner);
        tokio::task::spawn_blocking(move || fs.releasedir(fh, reply));
    }
}
