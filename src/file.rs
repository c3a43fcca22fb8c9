//! Byte content of regular files.
//!
//! A file's blocks live in the direct slots of its head inode and, past
//! `NUM_DIRECT_PTRS` blocks, in regular inodes chained through `next_inode`.
//! The logical size is only ever kept on the head.

use tracing::debug;

use crate::config::*;
use crate::structs::*;
use crate::{BlockDevice, Error, FileSystem, Result};

fn expect_regular(inode: &Inode) -> Result<()> {
    match inode.ftype {
        FileType::Regular => Ok(()),
        FileType::Directory => Err(Error::IsDirectory),
        FileType::Symlink => Err(Error::NotRegular),
    }
}

impl<D: BlockDevice> FileSystem<D> {
    /// Appends `data` to the file headed by `id`. Returns the number of bytes written.
    ///
    /// Blocks written before a failure stay allocated, but the head's size is
    /// only advanced once the whole write went through. Logical block `i`
    /// always lives in slot `i % NUM_DIRECT_PTRS` of chain member
    /// `i / NUM_DIRECT_PTRS`, so a later append overwrites such leftovers.
    pub fn append(&mut self, id: InodeId, data: &[u8], uid: Uid) -> Result<usize> {
        let head = *self.live_inode(id)?;
        expect_regular(&head)?;
        self.authorize(id, uid, Permission::WRITE)?;
        if data.is_empty() {
            return Ok(0);
        }

        let mut chain = self.chain(id)?;
        let mut pos = head.size as usize;
        let mut written = 0;
        while written < data.len() {
            let index = pos / BLOCK_SIZE;
            let inner = pos % BLOCK_SIZE;
            let member = index / NUM_DIRECT_PTRS;
            let slot = index % NUM_DIRECT_PTRS;
            if member >= chain.len() {
                let next = self.extend_file_chain(chain[chain.len() - 1])?;
                chain.push(next);
            }

            let mut buf = [0u8; BLOCK_SIZE];
            let current = self.inode(chain[member])?.direct_ptrs[slot];
            let block = match current {
                Some(block) => {
                    if inner > 0 {
                        self.read_block(block, &mut buf)?;
                    }
                    block
                }
                None => {
                    let block = self.allocate_block()?;
                    self.inode_mut(chain[member])?.direct_ptrs[slot] = Some(block);
                    block
                }
            };

            let n = (BLOCK_SIZE - inner).min(data.len() - written);
            buf[inner..inner + n].copy_from_slice(&data[written..written + n]);
            self.write_block(block, &buf)?;
            written += n;
            pos += n;
        }

        let head = self.inode_mut(id)?;
        head.size += written as u64;
        head.modified = unix_now();
        let size = head.size;
        self.sync_all()?;
        debug!(inode = id.0, written, size, "appended content");
        Ok(written)
    }

    fn extend_file_chain(&mut self, tail: InodeId) -> Result<InodeId> {
        let next = self.allocate_inode()?;
        let now = unix_now();
        let inode = self.inode_mut(next)?;
        inode.ftype = FileType::Regular;
        inode.created = now;
        inode.modified = now;
        self.inode_mut(tail)?.next_inode = Some(next);
        debug!(tail = tail.0, next = next.0, "extended file chain");
        Ok(next)
    }

    /// Reads the whole file behind `id` (symlinks followed) into `buf`.
    /// `buf` must hold at least `size + 1` bytes. Returns the byte count read.
    pub fn read(&self, id: InodeId, uid: Uid, buf: &mut [u8]) -> Result<usize> {
        let target = self.deref_symlinks(id)?;
        let inode = *self.live_inode(target)?;
        expect_regular(&inode)?;
        self.authorize(target, uid, Permission::READ)?;

        let size = inode.size as usize;
        if buf.len() < size + 1 {
            return Err(Error::BufferTooSmall {
                needed: size + 1,
                capacity: buf.len(),
            });
        }

        let mut offset = 0;
        let mut block_buf = [0u8; BLOCK_SIZE];
        'chain: for member in self.chain(target)? {
            for block in self.inode(member)?.blocks() {
                if offset >= size {
                    break 'chain;
                }
                self.read_block(block, &mut block_buf)?;
                let n = BLOCK_SIZE.min(size - offset);
                buf[offset..offset + n].copy_from_slice(&block_buf[..n]);
                offset += n;
            }
        }
        Ok(offset)
    }

    /// Reads the whole file behind `id` into a new vector.
    pub fn read_to_vec(&self, id: InodeId, uid: Uid) -> Result<Vec<u8>> {
        let target = self.deref_symlinks(id)?;
        let size = self.live_inode(target)?.size;
        let capacity = (self.chain(target)?.len() * NUM_DIRECT_PTRS * BLOCK_SIZE) as u64;
        if size > capacity {
            return Err(Error::CorruptFilesystem(format!(
                "inode {target} claims {size} bytes, its chain holds at most {capacity}"
            )));
        }
        let size = size as usize;
        let mut buf = vec![0u8; size + 1];
        let n = self.read(target, uid, &mut buf)?;
        buf.truncate(n);
        Ok(buf)
    }

    /// Drops every block and chained inode of the file, leaving it empty.
    pub fn truncate(&mut self, id: InodeId, uid: Uid) -> Result<()> {
        let head = *self.live_inode(id)?;
        expect_regular(&head)?;
        self.authorize(id, uid, Permission::WRITE)?;

        for block in head.blocks() {
            self.free_block(block);
        }
        if let Some(next) = head.next_inode {
            self.free_inode(next);
        }
        let inode = self.inode_mut(id)?;
        inode.direct_ptrs = [None; NUM_DIRECT_PTRS];
        inode.next_inode = None;
        inode.size = 0;
        inode.modified = unix_now();
        self.sync_all()?;
        debug!(inode = id.0, "truncated");
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{FsOptions, MemDisk};

    const ALICE: Uid = Uid(1000);

    fn small() -> FileSystem<MemDisk> {
        FileSystem::format(MemDisk::new(1 << 20), FsOptions::default()).unwrap()
    }

    #[test]
    fn test_oversized_inode_is_corrupt() {
        let mut fs = small();
        let file = fs.create_file(InodeId::ROOT, "f", ALICE).unwrap();
        fs.append(file, b"abc", ALICE).unwrap();
        fs.inode_mut(file).unwrap().size = u64::MAX / 2;
        assert!(matches!(fs.read_to_vec(file, ALICE), Err(Error::CorruptFilesystem(_))));
    }

    #[test]
    fn test_leftover_blocks_are_overwritten() {
        let mut fs = small();
        let file = fs.create_file(InodeId::ROOT, "f", ALICE).unwrap();
        fs.append(file, b"hello", ALICE).unwrap();

        // Leave a stale block linked past the logical end, as a failed append does.
        let stale = fs.allocate_block().unwrap();
        fs.write_block(stale, &[b'Z'; BLOCK_SIZE]).unwrap();
        fs.inode_mut(file).unwrap().direct_ptrs[1] = Some(stale);

        let tail = vec![b'w'; BLOCK_SIZE];
        fs.append(file, &tail, ALICE).unwrap();
        let mut expected = b"hello".to_vec();
        expected.extend_from_slice(&tail);
        assert_eq!(fs.read_to_vec(file, ALICE).unwrap(), expected);
        assert_eq!(fs.inode(file).unwrap().direct_ptrs[1], Some(stale));
        assert_eq!(fs.inode(file).unwrap().direct_ptrs[2], None);
    }
}
