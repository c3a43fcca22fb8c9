//! Path based operations, the way a shell drives the engine.
//!
//! Every call takes the caller's working directory `cwd` for relative paths.
//! Operations that create something materialize missing parent directories.

use crate::path::split_path;
use crate::structs::*;
use crate::{BlockDevice, Error, FileSystem, Result};

/// How `write_file` treats existing content.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    /// Replace the content (`echo >`).
    Truncate,
    /// Add to the end (`echo >>`).
    Append,
}

impl<D: BlockDevice> FileSystem<D> {
    pub fn make_directory(&mut self, path: &str, cwd: InodeId, uid: Uid) -> Result<InodeId> {
        let (parent, name) = self.ensure_parent(path, cwd, uid)?;
        self.create_directory(parent, name, uid)
    }

    /// Creates an empty file at `path`, or returns the file already there.
    pub fn touch(&mut self, path: &str, cwd: InodeId, uid: Uid) -> Result<InodeId> {
        let (parent, name) = self.ensure_parent(path, cwd, uid)?;
        self.open_or_create(parent, name, uid)
    }

    fn open_or_create(&mut self, parent: InodeId, name: &str, uid: Uid) -> Result<InodeId> {
        match self.find_entry(parent, name, EntryKind::Regular) {
            Ok(id) => Ok(id),
            Err(Error::NotFound) => self.create_file(parent, name, uid),
            Err(e) => Err(e),
        }
    }

    /// Writes `data` to the file at `path`, creating it when missing.
    pub fn write_file(&mut self, path: &str, data: &[u8], mode: WriteMode, cwd: InodeId, uid: Uid) -> Result<InodeId> {
        let (parent, name) = self.ensure_parent(path, cwd, uid)?;
        let id = self.open_or_create(parent, name, uid)?;
        if mode == WriteMode::Truncate {
            self.truncate(id, uid)?;
        }
        self.append(id, data, uid)?;
        Ok(id)
    }

    pub fn read_file(&self, path: &str, cwd: InodeId, uid: Uid) -> Result<Vec<u8>> {
        let id = self.resolve(path, cwd)?;
        self.read_to_vec(id, uid)
    }

    /// Copies the content of `src` into `dst`, replacing whatever `dst` held.
    pub fn copy_file(&mut self, src: &str, dst: &str, cwd: InodeId, uid: Uid) -> Result<InodeId> {
        let data = self.read_file(src, cwd, uid)?;
        self.write_file(dst, &data, WriteMode::Truncate, cwd, uid)
    }

    /// Copies `src` to `dst`, then deletes `src`.
    pub fn move_file(&mut self, src: &str, dst: &str, cwd: InodeId, uid: Uid) -> Result<InodeId> {
        let (src_dir, src_name) = split_path(src);
        let src_parent = self.resolve(src_dir, cwd)?;
        let src_id = self.lookup(src_parent, src_name, FileType::Regular)?;
        let data = self.read_to_vec(src_id, uid)?;

        let dst_id = self.write_file(dst, &data, WriteMode::Truncate, cwd, uid)?;
        if dst_id != src_id {
            self.delete_file(src_parent, src_name, uid)?;
        }
        Ok(dst_id)
    }

    /// Creates a symlink at `link` to whatever `target` resolves to.
    pub fn symlink(&mut self, target: &str, link: &str, cwd: InodeId, uid: Uid) -> Result<InodeId> {
        let target = self.resolve(target, cwd)?;
        let (parent, name) = self.ensure_parent(link, cwd, uid)?;
        self.create_symlink(parent, target, name, uid)
    }

    /// Removes a file or a symlink. Directories are refused.
    pub fn remove_file(&mut self, path: &str, cwd: InodeId, uid: Uid) -> Result<()> {
        let (dir, name) = split_path(path);
        let parent = self.resolve(dir, cwd)?;
        let target = self.find_entry(parent, name, EntryKind::Any)?;
        let ftype = self.inode(target)?.ftype;
        match ftype {
            FileType::Directory => Err(Error::IsDirectory),
            FileType::Symlink => self.delete_symlink(parent, target, uid),
            FileType::Regular => self.delete_file(parent, name, uid),
        }
    }

    pub fn remove_directory(&mut self, path: &str, cwd: InodeId, uid: Uid) -> Result<()> {
        let (dir, name) = split_path(path);
        let parent = self.resolve(dir, cwd)?;
        self.delete_directory(parent, name, uid)
    }

    /// Removes the symlink at `path`.
    pub fn unlink(&mut self, path: &str, cwd: InodeId, uid: Uid) -> Result<()> {
        let (dir, name) = split_path(path);
        let parent = self.resolve(dir, cwd)?;
        let target = self.find_entry(parent, name, EntryKind::Any)?;
        self.delete_symlink(parent, target, uid)
    }

    /// Resolves `path` to the directory that becomes the new working directory.
    pub fn change_dir(&self, path: &str, cwd: InodeId) -> Result<InodeId> {
        let id = self.resolve(path, cwd)?;
        self.expect_directory(id)?;
        Ok(id)
    }
}
