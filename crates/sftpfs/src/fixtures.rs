// Copyright (c) Contributors to the sftpfs project.
// SPDX-License-Identifier: Apache-2.0

//! An in-memory remote endpoint for exercising the adapter.
//!
//! [`MemoryRemote`] behaves like a small SFTP server and can be told
//! to misbehave: live sessions can be severed, connects refused and
//! individual paths denied.

use std::collections::{BTreeMap, BTreeSet};
use std::io::{self, Cursor, Seek, SeekFrom, Write};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use rstest::fixture;

use crate::config::{Credential, MountContext};
use crate::remote::{Connector, FileKind, RemoteAttributes, RemoteEntry, RemoteSession};
use crate::{Error, Result};

pub fn init_logging() {
    let sub = tracing_subscriber::FmtSubscriber::builder()
        .with_env_filter("sftpfs=trace,debug")
        .without_time()
        .with_test_writer()
        .finish();
    let _ = tracing::subscriber::set_global_default(sub);
}

/// A mount context that points nowhere, for use with [`MemoryRemote`]
pub fn memory_context(root: &str) -> MountContext {
    MountContext::builder("memory", "tester", Credential::Password("secret".into()))
        .root(root)
        .build()
        .expect("static context is valid")
}

#[fixture]
pub fn remote() -> MemoryRemote {
    MemoryRemote::new()
}

#[derive(Clone, Debug)]
enum Node {
    File {
        data: Vec<u8>,
        accessed: DateTime<Utc>,
        modified: DateTime<Utc>,
    },
    Directory {
        modified: DateTime<Utc>,
    },
}

impl Node {
    fn attributes(&self) -> RemoteAttributes {
        match self {
            Node::File {
                data,
                accessed,
                modified,
            } => RemoteAttributes {
                kind: FileKind::File,
                size: data.len() as u64,
                accessed: Some(*accessed),
                modified: Some(*modified),
            },
            Node::Directory { modified } => RemoteAttributes {
                kind: FileKind::Directory,
                size: 0,
                accessed: Some(*modified),
                modified: Some(*modified),
            },
        }
    }

    fn empty_file() -> Self {
        let now = Utc::now();
        Node::File {
            data: Vec::new(),
            accessed: now,
            modified: now,
        }
    }
}

#[derive(Debug, Default)]
struct MemoryState {
    nodes: BTreeMap<String, Node>,
    generation: u64,
    refuse_connects: usize,
    connects: usize,
    disconnects: usize,
    denied: BTreeSet<String>,
    failing_writes: bool,
    mutable_metadata: bool,
}

/// A shared in-memory file tree that sessions can be opened against
#[derive(Clone, Debug)]
pub struct MemoryRemote {
    state: Arc<Mutex<MemoryState>>,
}

impl Default for MemoryRemote {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryRemote {
    pub fn new() -> Self {
        let mut state = MemoryState {
            mutable_metadata: true,
            ..Default::default()
        };
        state.nodes.insert(
            "/".to_string(),
            Node::Directory {
                modified: Utc::now(),
            },
        );
        Self {
            state: Arc::new(Mutex::new(state)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Add a directory and any missing parents
    pub fn with_dir(self, path: &str) -> Self {
        let mut state = self.lock();
        let mut current = String::new();
        for part in path.split('/').filter(|p| !p.is_empty()) {
            current.push('/');
            current.push_str(part);
            state
                .nodes
                .entry(current.clone())
                .or_insert_with(|| Node::Directory {
                    modified: Utc::now(),
                });
        }
        drop(state);
        self
    }

    /// Add a file with the given content, and any missing parents
    pub fn with_file<D: Into<Vec<u8>>>(self, path: &str, data: D) -> Self {
        let this = self.with_dir(parent_of(path));
        let now = Utc::now();
        this.lock().nodes.insert(
            path.to_string(),
            Node::File {
                data: data.into(),
                accessed: now,
                modified: now,
            },
        );
        this
    }

    /// Fail every operation touching this exact path with a permission error
    pub fn deny(&self, path: &str) {
        self.lock().denied.insert(path.to_string());
    }

    /// Break every session opened so far, as if the network dropped
    pub fn sever(&self) {
        self.lock().generation += 1;
    }

    /// Refuse the next `count` connection attempts
    pub fn refuse_connects(&self, count: usize) {
        self.lock().refuse_connects = count;
    }

    /// Make every write to a file stream fail with a local io error
    pub fn fail_writes(&self) {
        self.lock().failing_writes = true;
    }

    /// Report size and time changes as unsupported
    pub fn freeze_metadata(&self) {
        self.lock().mutable_metadata = false;
    }

    /// The number of connection attempts, successful or not
    pub fn connects(&self) -> usize {
        self.lock().connects
    }

    pub fn disconnects(&self) -> usize {
        self.lock().disconnects
    }

    pub fn contents(&self, path: &str) -> Option<Vec<u8>> {
        match self.lock().nodes.get(path) {
            Some(Node::File { data, .. }) => Some(data.clone()),
            _ => None,
        }
    }

    pub fn exists(&self, path: &str) -> bool {
        self.lock().nodes.contains_key(path)
    }

    pub fn is_dir(&self, path: &str) -> bool {
        matches!(self.lock().nodes.get(path), Some(Node::Directory { .. }))
    }

    pub fn times(&self, path: &str) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        match self.lock().nodes.get(path) {
            Some(Node::File {
                accessed, modified, ..
            }) => Some((*accessed, *modified)),
            Some(Node::Directory { modified }) => Some((*modified, *modified)),
            None => None,
        }
    }
}

impl Connector for MemoryRemote {
    type Session = MemorySession;

    fn connect(&self, _context: &MountContext) -> Result<MemorySession> {
        let mut state = self.lock();
        state.connects += 1;
        if state.refuse_connects > 0 {
            state.refuse_connects -= 1;
            return Err(Error::ConnectionLost("connection refused".into()));
        }
        Ok(MemorySession {
            state: Arc::clone(&self.state),
            generation: state.generation,
        })
    }
}

/// A session against a [`MemoryRemote`]
#[derive(Debug)]
pub struct MemorySession {
    state: Arc<Mutex<MemoryState>>,
    generation: u64,
}

impl MemorySession {
    /// Lock the remote for an operation on `path`
    fn open(&self, path: &str) -> Result<MutexGuard<'_, MemoryState>> {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if state.generation != self.generation {
            return Err(Error::ConnectionLost("session severed".into()));
        }
        if state.denied.contains(path) {
            return Err(Error::PermissionDenied(path.to_string()));
        }
        Ok(state)
    }
}

fn parent_of(path: &str) -> &str {
    match path.rsplit_once('/') {
        Some(("", _)) | None => "/",
        Some((parent, _)) => parent,
    }
}

fn require_parent(state: &MemoryState, path: &str) -> Result<()> {
    match state.nodes.get(parent_of(path)) {
        Some(Node::Directory { .. }) => Ok(()),
        Some(Node::File { .. }) => Err(Error::Protocol(format!("{path}: parent is a file"))),
        None => Err(Error::NotFound(path.to_string())),
    }
}

fn is_child(parent: &str, candidate: &str) -> bool {
    candidate != parent && parent_of(candidate) == parent
}

fn is_descendant(parent: &str, candidate: &str) -> bool {
    candidate
        .strip_prefix(parent)
        .is_some_and(|rest| rest.starts_with('/'))
}

impl RemoteSession for MemorySession {
    type Reader = Cursor<Vec<u8>>;
    type Writer = MemoryWriter;

    fn disconnect(&self) -> Result<()> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.disconnects += 1;
        if state.generation != self.generation {
            return Err(Error::ConnectionLost("session severed".into()));
        }
        Ok(())
    }

    fn stat(&self, path: &str) -> Result<RemoteAttributes> {
        let state = self.open(path)?;
        state
            .nodes
            .get(path)
            .map(Node::attributes)
            .ok_or_else(|| Error::NotFound(path.to_string()))
    }

    fn list_directory(&self, path: &str) -> Result<Vec<RemoteEntry>> {
        let state = self.open(path)?;
        match state.nodes.get(path) {
            Some(Node::Directory { .. }) => {}
            Some(Node::File { .. }) => {
                return Err(Error::Protocol(format!("{path}: not a directory")))
            }
            None => return Err(Error::NotFound(path.to_string())),
        }
        Ok(state
            .nodes
            .iter()
            .filter(|(candidate, _)| is_child(path, candidate))
            .map(|(candidate, node)| RemoteEntry {
                name: candidate.rsplit('/').next().unwrap_or_default().to_string(),
                attributes: node.attributes(),
            })
            .collect())
    }

    fn open_read(&self, path: &str) -> Result<Self::Reader> {
        let state = self.open(path)?;
        match state.nodes.get(path) {
            Some(Node::File { data, .. }) => Ok(Cursor::new(data.clone())),
            Some(Node::Directory { .. }) => Err(Error::Protocol(format!("{path}: is a directory"))),
            None => Err(Error::NotFound(path.to_string())),
        }
    }

    fn open_write(&self, path: &str) -> Result<Self::Writer> {
        let mut state = self.open(path)?;
        require_parent(&state, path)?;
        match state.nodes.get(path) {
            Some(Node::Directory { .. }) => {
                return Err(Error::Protocol(format!("{path}: is a directory")))
            }
            Some(Node::File { .. }) => {}
            None => {
                state.nodes.insert(path.to_string(), Node::empty_file());
            }
        }
        Ok(MemoryWriter {
            state: Arc::clone(&self.state),
            generation: self.generation,
            path: path.to_string(),
            position: 0,
        })
    }

    fn create_empty(&self, path: &str) -> Result<()> {
        let mut state = self.open(path)?;
        require_parent(&state, path)?;
        if let Some(Node::Directory { .. }) = state.nodes.get(path) {
            return Err(Error::Protocol(format!("{path}: is a directory")));
        }
        state.nodes.insert(path.to_string(), Node::empty_file());
        Ok(())
    }

    fn delete(&self, path: &str) -> Result<()> {
        let mut state = self.open(path)?;
        match state.nodes.get(path) {
            Some(Node::File { .. }) => {
                state.nodes.remove(path);
                Ok(())
            }
            Some(Node::Directory { .. }) => Err(Error::Protocol(format!("{path}: is a directory"))),
            None => Err(Error::NotFound(path.to_string())),
        }
    }

    fn delete_directory(&self, path: &str) -> Result<()> {
        let mut state = self.open(path)?;
        match state.nodes.get(path) {
            Some(Node::Directory { .. }) => {}
            Some(Node::File { .. }) => {
                return Err(Error::Protocol(format!("{path}: not a directory")))
            }
            None => return Err(Error::NotFound(path.to_string())),
        }
        if state.nodes.keys().any(|candidate| is_child(path, candidate)) {
            return Err(Error::Protocol(format!("{path}: directory not empty")));
        }
        state.nodes.remove(path);
        Ok(())
    }

    fn create_directory(&self, path: &str) -> Result<()> {
        let mut state = self.open(path)?;
        require_parent(&state, path)?;
        if state.nodes.contains_key(path) {
            return Err(Error::AlreadyExists(path.to_string()));
        }
        state.nodes.insert(
            path.to_string(),
            Node::Directory {
                modified: Utc::now(),
            },
        );
        Ok(())
    }

    fn rename(&self, from: &str, to: &str, overwrite: bool) -> Result<()> {
        let mut state = self.open(from)?;
        if state.denied.contains(to) {
            return Err(Error::PermissionDenied(to.to_string()));
        }
        if !state.nodes.contains_key(from) {
            return Err(Error::NotFound(from.to_string()));
        }
        require_parent(&state, to)?;
        if state.nodes.contains_key(to) && !overwrite {
            return Err(Error::AlreadyExists(to.to_string()));
        }
        let moved: Vec<String> = state
            .nodes
            .keys()
            .filter(|candidate| *candidate == from || is_descendant(from, candidate))
            .cloned()
            .collect();
        state.nodes.remove(to);
        for old in moved {
            if let Some(node) = state.nodes.remove(&old) {
                let new = format!("{to}{}", &old[from.len()..]);
                state.nodes.insert(new, node);
            }
        }
        Ok(())
    }

    fn set_size(&self, path: &str, size: u64) -> Result<()> {
        let mut state = self.open(path)?;
        if !state.mutable_metadata {
            return Err(Error::Unsupported("changing file sizes"));
        }
        match state.nodes.get_mut(path) {
            Some(Node::File { data, modified, .. }) => {
                data.resize(size as usize, 0);
                *modified = Utc::now();
                Ok(())
            }
            Some(Node::Directory { .. }) => Err(Error::Protocol(format!("{path}: is a directory"))),
            None => Err(Error::NotFound(path.to_string())),
        }
    }

    fn set_times(
        &self,
        path: &str,
        new_accessed: Option<DateTime<Utc>>,
        new_modified: Option<DateTime<Utc>>,
    ) -> Result<()> {
        let mut state = self.open(path)?;
        if !state.mutable_metadata {
            return Err(Error::Unsupported("changing file times"));
        }
        match state.nodes.get_mut(path) {
            Some(Node::File {
                accessed, modified, ..
            }) => {
                *accessed = new_accessed.unwrap_or(*accessed);
                *modified = new_modified.unwrap_or(*modified);
                Ok(())
            }
            Some(Node::Directory { modified }) => {
                *modified = new_modified.unwrap_or(*modified);
                Ok(())
            }
            None => Err(Error::NotFound(path.to_string())),
        }
    }
}

/// A seekable write stream into a [`MemoryRemote`] file
#[derive(Debug)]
pub struct MemoryWriter {
    state: Arc<Mutex<MemoryState>>,
    generation: u64,
    path: String,
    position: u64,
}

impl MemoryWriter {
    fn len(&self) -> io::Result<u64> {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        match state.nodes.get(&self.path) {
            Some(Node::File { data, .. }) => Ok(data.len() as u64),
            _ => Err(io::Error::new(io::ErrorKind::NotFound, self.path.clone())),
        }
    }
}

impl Write for MemoryWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if state.generation != self.generation {
            return Err(io::Error::new(
                io::ErrorKind::ConnectionReset,
                "session severed",
            ));
        }
        if state.failing_writes {
            return Err(io::Error::new(io::ErrorKind::Other, "remote disk is full"));
        }
        let Some(Node::File { data, modified, .. }) = state.nodes.get_mut(&self.path) else {
            return Err(io::Error::new(io::ErrorKind::NotFound, self.path.clone()));
        };
        let start = self.position as usize;
        let end = start + buf.len();
        if data.len() < end {
            data.resize(end, 0);
        }
        data[start..end].copy_from_slice(buf);
        *modified = Utc::now();
        self.position = end as u64;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Seek for MemoryWriter {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let target = match pos {
            SeekFrom::Start(offset) => Some(offset),
            SeekFrom::End(delta) => self.len()?.checked_add_signed(delta),
            SeekFrom::Current(delta) => self.position.checked_add_signed(delta),
        };
        self.position = target.ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidInput, "seek before start of file")
        })?;
        Ok(self.position)
    }
}
