// Copyright (c) Contributors to the sftpfs project.
// SPDX-License-Identifier: Apache-2.0

use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;

use crate::host::{self, ROOT_PATH};
use crate::{Error, Result};

#[cfg(test)]
#[path = "./inodes_test.rs"]
mod inodes_test;

/// The inode of the mount root, as expected by FUSE
pub(crate) const ROOT_INODE: u64 = 1;

/// Reported for directory entries that the kernel has not looked up yet
pub(crate) const UNKNOWN_INODE: u64 = 0xffff_ffff;

struct Node {
    path: String,
    /// references held by the kernel, one per entry reply
    lookups: u64,
}

/// Two way mapping between inode numbers and host paths.
///
/// Inodes are handed out the first time a path is looked up and are
/// never reused for a different path. A mapping lives until the kernel
/// forgets every reference to it, or its path is removed.
pub(crate) struct Inodes {
    next_inode: AtomicU64,
    nodes: DashMap<u64, Node>,
    inodes: DashMap<String, u64>,
}

impl Inodes {
    pub fn new() -> Self {
        let inodes = Self {
            next_inode: AtomicU64::new(ROOT_INODE + 1),
            nodes: DashMap::new(),
            inodes: DashMap::new(),
        };
        inodes.nodes.insert(
            ROOT_INODE,
            Node {
                path: ROOT_PATH.to_string(),
                lookups: 0,
            },
        );
        inodes.inodes.insert(ROOT_PATH.to_string(), ROOT_INODE);
        inodes
    }

    pub fn path(&self, ino: u64) -> Result<String> {
        self.nodes
            .get(&ino)
            .map(|node| node.path.clone())
            .ok_or(Error::UnknownInode(ino))
    }

    /// The inode already mapped to a path, if any
    pub fn get(&self, path: &str) -> Option<u64> {
        self.inodes.get(path).map(|ino| *ino)
    }

    /// The inode of a path, assigning a new one if needed, and
    /// counting one more kernel reference to it
    pub fn lookup(&self, path: &str) -> u64 {
        loop {
            let ino = *self
                .inodes
                .entry(path.to_string())
                .or_insert_with(|| {
                    let ino = self.next_inode.fetch_add(1, Ordering::Relaxed);
                    self.nodes.insert(
                        ino,
                        Node {
                            path: path.to_string(),
                            lookups: 0,
                        },
                    );
                    ino
                })
                .value();
            if let Some(mut node) = self.nodes.get_mut(&ino) {
                node.lookups += 1;
                return ino;
            }
            // forgotten between the two maps, wait for the path to be released
            std::hint::spin_loop();
        }
    }

    /// Drop `count` kernel references to an inode, releasing
    /// the mapping once none remain. The root is never released.
    pub fn forget(&self, ino: u64, count: u64) {
        if ino == ROOT_INODE {
            return;
        }
        let path = {
            let Some(mut node) = self.nodes.get_mut(&ino) else {
                return;
            };
            node.lookups = node.lookups.saturating_sub(count);
            if node.lookups > 0 {
                return;
            }
            node.path.clone()
        };
        if self
            .nodes
            .remove_if(&ino, |_, node| node.lookups == 0)
            .is_some()
        {
            self.inodes.remove_if(&path, |_, mapped| *mapped == ino);
        }
    }

    pub fn remove(&self, path: &str) {
        if let Some((_, ino)) = self.inodes.remove(path) {
            self.nodes.remove(&ino);
        }
    }

    /// Move a path and everything below it to a new location,
    /// forgetting anything that was previously at the destination
    pub fn rename(&self, from: &str, to: &str) {
        let replaced: Vec<String> = self
            .inodes
            .iter()
            .filter(|entry| host::is_within(to, entry.key()))
            .map(|entry| entry.key().clone())
            .collect();
        for path in replaced {
            self.remove(&path);
        }
        let moved: Vec<(u64, String)> = self
            .nodes
            .iter()
            .filter(|entry| host::is_within(from, &entry.value().path))
            .map(|entry| (*entry.key(), entry.value().path.clone()))
            .collect();
        for (ino, old) in moved {
            let new = format!("{to}{}", &old[from.len()..]);
            self.inodes.remove(&old);
            self.inodes.insert(new.clone(), ino);
            if let Some(mut node) = self.nodes.get_mut(&ino) {
                node.path = new;
            }
        }
    }
}
