//! Path resolution and manipulation utilities.
//!
//! Paths are '/' separated. A leading `~` (or '/') starts at the root,
//! anything else starts at the caller's working directory.

use crate::config::*;
use crate::structs::*;
use crate::{BlockDevice, Error, FileSystem, Result};

/// Splits `path` at its last '/' into (parent path, base name).
/// The parent is "." when there is no '/'.
pub fn split_path(full_path: &str) -> (&str, &str) {
    match full_path.rfind('/') {
        Some(0) => ("/", &full_path[1..]),
        Some(i) => (&full_path[..i], &full_path[i + 1..]),
        None => (".", full_path),
    }
}

/// Picks the starting inode and strips the absolute marker.
fn path_start(path: &str, start: InodeId) -> (InodeId, &str) {
    if let Some(rest) = path.strip_prefix(ROOT_MARKER) {
        (InodeId::ROOT, rest)
    } else if path.starts_with('/') {
        (InodeId::ROOT, path)
    } else {
        (start, path)
    }
}

/// Path components with empty and '.' tokens dropped.
fn components(path: &str) -> Vec<&str> {
    path.split('/')
        .filter(|token| !token.is_empty() && *token != DOT_NAME)
        .collect()
}

impl<D: BlockDevice> FileSystem<D> {
    /// Resolves `path` to an inode, following '..' and symlinks.
    pub fn resolve(&self, path: &str, start: InodeId) -> Result<InodeId> {
        let (mut current, rest) = path_start(path, start);
        let tokens = components(rest);
        for (i, token) in tokens.iter().enumerate() {
            if *token == DOTDOT_NAME {
                current = self.find_entry(current, DOTDOT_NAME, EntryKind::Directory)?;
                continue;
            }
            let kind = if i + 1 == tokens.len() {
                EntryKind::Any
            } else {
                EntryKind::Traversable
            };
            let next = self.find_entry(current, token, kind)?;
            current = self.deref_symlinks(next)?;
        }
        Ok(current)
    }

    /// Like `resolve`, but every missing component is created as a directory
    /// owned by `uid`. Returns the final directory.
    pub fn create_directories_recursively(&mut self, path: &str, start: InodeId, uid: Uid) -> Result<InodeId> {
        let (mut current, rest) = path_start(path, start);
        for token in components(rest) {
            if token == DOTDOT_NAME {
                current = self.find_entry(current, DOTDOT_NAME, EntryKind::Directory)?;
                continue;
            }
            let next = match self.find_entry(current, token, EntryKind::Traversable) {
                Ok(id) => id,
                Err(Error::NotFound) => self.create_directory(current, token, uid)?,
                Err(e) => return Err(e),
            };
            current = self.deref_symlinks(next)?;
            if !self.inode(current)?.is_dir() {
                return Err(Error::NotDirectory);
            }
        }
        Ok(current)
    }

    /// Resolves the parent of `path`, creating it when missing, and returns it
    /// together with the base name.
    pub(crate) fn ensure_parent<'p>(&mut self, path: &'p str, cwd: InodeId, uid: Uid) -> Result<(InodeId, &'p str)> {
        let (parent_path, name) = split_path(path);
        let parent = match self.resolve(parent_path, cwd) {
            Ok(parent) => parent,
            Err(Error::NotFound) => self.create_directories_recursively(parent_path, cwd, uid)?,
            Err(e) => return Err(e),
        };
        Ok((parent, name))
    }
}
