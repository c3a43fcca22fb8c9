//! Access to the in-memory inode table and inode chains.

use crate::config::*;
use crate::structs::*;
use crate::{BlockDevice, Error, FileSystem, Result};

/// Owned snapshot of an inode's metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stat {
    pub id: InodeId,
    pub ftype: FileType,
    pub name: String,
    pub creator_uid: Uid,
    pub owner_uid: Uid,
    pub size: u64,
    pub created: i64,
    pub modified: i64,
    pub mode: Mode,
    pub link_target: Option<InodeId>,
    pub blocks: Vec<BlockId>,
    /// Number of inodes in the chain headed by this inode.
    pub chain_len: usize,
}

impl<D: BlockDevice> FileSystem<D> {
    pub fn inode(&self, id: InodeId) -> Result<&Inode> {
        self.inodes.get(id.index()).ok_or(Error::InodeOutOfRange(id))
    }

    pub(crate) fn inode_mut(&mut self, id: InodeId) -> Result<&mut Inode> {
        self.inodes.get_mut(id.index()).ok_or(Error::InodeOutOfRange(id))
    }

    /// Like `inode`, but the slot must be allocated.
    pub fn live_inode(&self, id: InodeId) -> Result<&Inode> {
        let inode = self.inode(id)?;
        if !self.inode_bitmap.get(id.0) {
            return Err(Error::NotFound);
        }
        Ok(inode)
    }

    /// Ids of every inode in the chain headed by `head`, in link order.
    pub fn chain(&self, head: InodeId) -> Result<Vec<InodeId>> {
        let mut ids = vec![head];
        let mut current = self.inode(head)?.next_inode;
        while let Some(next) = current {
            if ids.len() >= self.inodes.len() {
                return Err(Error::CorruptFilesystem(format!("inode chain from {head} loops")));
            }
            ids.push(next);
            current = self.inode(next)?.next_inode;
        }
        Ok(ids)
    }

    /// Follows symlinks from `id` until a non-symlink is reached.
    pub fn deref_symlinks(&self, id: InodeId) -> Result<InodeId> {
        let mut current = id;
        let mut depth = 0;
        while self.inode(current)?.ftype == FileType::Symlink {
            depth += 1;
            if depth > MAX_SYMLINK_DEPTH {
                return Err(Error::SymlinkLoop);
            }
            current = self.inode(current)?.link_target.ok_or(Error::NotFound)?;
            if !self.inode_bitmap.get(current.0) {
                return Err(Error::NotFound);
            }
        }
        Ok(current)
    }

    pub fn stat(&self, id: InodeId) -> Result<Stat> {
        let inode = self.live_inode(id)?;
        let chain = self.chain(id)?;
        let mut blocks = Vec::new();
        for member in &chain {
            blocks.extend(self.inode(*member)?.blocks());
        }
        Ok(Stat {
            id,
            ftype: inode.ftype,
            name: inode.name(),
            creator_uid: inode.creator_uid,
            owner_uid: inode.owner_uid,
            size: inode.size,
            created: inode.created,
            modified: inode.modified,
            mode: inode.mode,
            link_target: inode.link_target,
            blocks,
            chain_len: chain.len(),
        })
    }
}
