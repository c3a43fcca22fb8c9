//! Creation and deletion of files, directories and symlinks.
//!
//! Every operation here ends with `sync_all`, so it is durable once it returns `Ok`.

use tracing::debug;

use crate::config::*;
use crate::structs::*;
use crate::{BlockDevice, Error, FileSystem, Result};

impl<D: BlockDevice> FileSystem<D> {
    pub(crate) fn expect_directory(&self, id: InodeId) -> Result<()> {
        if self.live_inode(id)?.is_dir() {
            Ok(())
        } else {
            Err(Error::NotDirectory)
        }
    }

    /// Finds `name` in `parent` as a `ftype` entry. When only an entry of
    /// another type carries that name, the error says which mismatch it was.
    pub(crate) fn lookup(&self, parent: InodeId, name: &str, ftype: FileType) -> Result<InodeId> {
        match self.find_entry(parent, name, EntryKind::from(ftype)) {
            Err(Error::NotFound) => {}
            res => return res,
        }
        let other = self.find_entry(parent, name, EntryKind::Any)?;
        Err(match (ftype, self.inode(other)?.ftype) {
            (FileType::Directory, _) => Error::NotDirectory,
            (_, FileType::Directory) => Error::IsDirectory,
            (FileType::Symlink, _) => Error::NotSymlink,
            _ => Error::NotRegular,
        })
    }

    /// Fails with `AlreadyExists` when `find_entry` sees `name` under `kind`.
    fn ensure_absent(&self, parent: InodeId, name: &str, kind: EntryKind) -> Result<()> {
        match self.find_entry(parent, name, kind) {
            Ok(_) => Err(Error::AlreadyExists),
            Err(Error::NotFound) => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// Allocates and fills in a fresh inode owned by `uid`.
    fn new_inode(&mut self, ftype: FileType, name: &str, mode: Mode, uid: Uid) -> Result<InodeId> {
        let encoded = encode_name(name)?;
        let id = self.allocate_inode()?;
        let now = unix_now();
        let inode = self.inode_mut(id)?;
        inode.ftype = ftype;
        inode.mode = mode;
        inode.name = encoded;
        inode.creator_uid = uid;
        inode.owner_uid = uid;
        inode.created = now;
        inode.modified = now;
        Ok(id)
    }

    /// Frees `id` again when `res` failed, so a failed create does not leak it.
    fn release_on_error<T>(&mut self, id: InodeId, res: Result<T>) -> Result<T> {
        if res.is_err() {
            debug!(inode = id.0, "rolling back inode of failed create");
            self.free_inode(id);
        }
        res
    }

    /// Writes to the root are always allowed during creation, everywhere
    /// else the parent must grant `WRITE`.
    fn authorize_create_in(&self, parent: InodeId, uid: Uid) -> Result<()> {
        if parent == InodeId::ROOT {
            Ok(())
        } else {
            self.authorize(parent, uid, Permission::WRITE)
        }
    }

    pub fn create_file(&mut self, parent: InodeId, name: &str, uid: Uid) -> Result<InodeId> {
        validate_name(name)?;
        self.expect_directory(parent)?;
        self.ensure_absent(parent, name, EntryKind::Regular)?;
        self.authorize_create_in(parent, uid)?;

        let id = self.new_inode(FileType::Regular, name, Mode::DEFAULT, uid)?;
        let res = self.add_entry(parent, name, EntryKind::Regular, id);
        self.release_on_error(id, res)?;
        self.sync_all()?;
        debug!(parent = parent.0, inode = id.0, name, uid = uid.0, "created file");
        Ok(id)
    }

    pub fn create_directory(&mut self, parent: InodeId, name: &str, uid: Uid) -> Result<InodeId> {
        validate_name(name)?;
        self.expect_directory(parent)?;
        self.ensure_absent(parent, name, EntryKind::Directory)?;
        self.authorize_create_in(parent, uid)?;

        let id = self.new_inode(FileType::Directory, name, Mode::DEFAULT, uid)?;
        let res = self.populate_directory(id, parent);
        self.release_on_error(id, res)?;
        let res = self.add_entry(parent, name, EntryKind::Directory, id);
        self.release_on_error(id, res)?;
        self.sync_all()?;
        debug!(parent = parent.0, inode = id.0, name, uid = uid.0, "created directory");
        Ok(id)
    }

    /// Gives a new directory its '.' / '..' block.
    fn populate_directory(&mut self, id: InodeId, parent: InodeId) -> Result<()> {
        let block = self.allocate_block()?;
        let inode = self.inode_mut(id)?;
        inode.direct_ptrs[0] = Some(block);
        inode.size = 2 * DIR_ENTRY_SIZE as u64;
        self.write_dot_block(block, id, parent)
    }

    /// Removes the regular file `name` from `parent` and frees its content.
    pub fn delete_file(&mut self, parent: InodeId, name: &str, uid: Uid) -> Result<()> {
        let target = self.lookup(parent, name, FileType::Regular)?;
        self.authorize(target, uid, Permission::WRITE)?;
        self.remove_entry(parent, name, EntryKind::Regular)?;
        self.sync_all()?;
        debug!(parent = parent.0, inode = target.0, name, "deleted file");
        Ok(())
    }

    /// Removes the directory `name` from `parent`. It must hold nothing but '.' and '..'.
    pub fn delete_directory(&mut self, parent: InodeId, name: &str, uid: Uid) -> Result<()> {
        let target = self.lookup(parent, name, FileType::Directory)?;
        self.authorize(target, uid, Permission::WRITE)?;
        if !self.dir_is_empty(target)? {
            return Err(Error::DirectoryNotEmpty);
        }
        self.remove_entry(parent, name, EntryKind::Directory)?;
        self.sync_all()?;
        debug!(parent = parent.0, inode = target.0, name, "deleted directory");
        Ok(())
    }

    /// Creates the symlink `name` in `parent` pointing at `target`.
    /// The link takes a copy of the target's mode at this moment.
    pub fn create_symlink(&mut self, parent: InodeId, target: InodeId, name: &str, uid: Uid) -> Result<InodeId> {
        validate_name(name)?;
        self.expect_directory(parent)?;
        self.ensure_absent(parent, name, EntryKind::Symlink)?;
        self.authorize(parent, uid, Permission::WRITE)?;
        let mode = self.live_inode(target)?.mode;

        let id = self.new_inode(FileType::Symlink, name, mode, uid)?;
        self.inode_mut(id)?.link_target = Some(target);
        let res = self.add_entry(parent, name, EntryKind::Symlink, id);
        self.release_on_error(id, res)?;
        self.sync_all()?;
        debug!(parent = parent.0, inode = id.0, target = target.0, name, "created symlink");
        Ok(id)
    }

    /// Removes the symlink `link` from `parent`. The link target is untouched.
    pub fn delete_symlink(&mut self, parent: InodeId, link: InodeId, uid: Uid) -> Result<()> {
        self.live_inode(link)?;
        self.authorize(link, uid, Permission::WRITE)?;
        if self.inode(link)?.ftype != FileType::Symlink {
            return Err(Error::NotSymlink);
        }
        self.remove_entry_for(parent, link)?;
        self.sync_all()?;
        debug!(parent = parent.0, inode = link.0, "deleted symlink");
        Ok(())
    }
}
