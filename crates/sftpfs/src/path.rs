// Copyright (c) Contributors to the sftpfs project.
// SPDX-License-Identifier: Apache-2.0

//! Mapping of host-relative paths onto the remote tree.

use std::fmt::Display;

#[cfg(test)]
#[path = "./path_test.rs"]
mod path_test;

const HOST_SEPARATOR: char = '\\';
const REMOTE_SEPARATOR: char = '/';

/// An absolute path on the remote endpoint, always located
/// under the configured root.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RemotePath(String);

impl RemotePath {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The final component of this path, or the whole path
    /// when it has only one (eg: the remote root `/`).
    pub fn file_name(&self) -> &str {
        match self.0.rsplit_once(REMOTE_SEPARATOR) {
            Some((_, name)) if !name.is_empty() => name,
            _ => &self.0,
        }
    }
}

impl AsRef<str> for RemotePath {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Display for RemotePath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Anything that can be resolved into a [`RemotePath`].
///
/// Host paths are joined onto the root, while paths that
/// have already been resolved pass through untouched.
pub trait Resolve {
    fn resolve_with(self, resolver: &PathResolver) -> RemotePath;
}

impl Resolve for &str {
    fn resolve_with(self, resolver: &PathResolver) -> RemotePath {
        resolver.join(self)
    }
}

impl Resolve for &String {
    fn resolve_with(self, resolver: &PathResolver) -> RemotePath {
        resolver.join(self)
    }
}

impl Resolve for RemotePath {
    fn resolve_with(self, _resolver: &PathResolver) -> RemotePath {
        self
    }
}

impl Resolve for &RemotePath {
    fn resolve_with(self, _resolver: &PathResolver) -> RemotePath {
        self.clone()
    }
}

/// Joins host-supplied relative paths onto a fixed remote root.
#[derive(Clone, Debug)]
pub struct PathResolver {
    root: String,
}

impl PathResolver {
    pub fn new<S: AsRef<str>>(root: S) -> Self {
        let trimmed = root.as_ref().trim_end_matches(REMOTE_SEPARATOR);
        let root = if trimmed.is_empty() {
            REMOTE_SEPARATOR.to_string()
        } else {
            trimmed.to_string()
        };
        Self { root }
    }

    /// The remote root that every resolved path starts with.
    pub fn root(&self) -> &str {
        &self.root
    }

    pub fn resolve<P: Resolve>(&self, path: P) -> RemotePath {
        path.resolve_with(self)
    }

    fn join(&self, relative: &str) -> RemotePath {
        let normalized = relative.replace(HOST_SEPARATOR, "/");
        let mut parts: Vec<&str> = Vec::new();
        for part in normalized.split(REMOTE_SEPARATOR) {
            match part {
                "" | "." => continue,
                // the host cannot reach above the mount root
                ".." => {
                    parts.pop();
                }
                part => parts.push(part),
            }
        }
        if parts.is_empty() {
            return RemotePath(self.root.clone());
        }
        let tail = parts.join("/");
        if self.root == "/" {
            RemotePath(format!("/{tail}"))
        } else {
            RemotePath(format!("{}/{tail}", self.root))
        }
    }
}
