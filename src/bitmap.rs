//! Management of data bitmap and inode bitmap.
//! Both bitmaps are held in memory while mounted and written back by `sync_all`.
//! Data bitmap tracks which data blocks are in use, inode bitmap tracks inode slots.

use tracing::{debug, trace, warn};

use crate::structs::{BlockId, Inode, InodeId};
use crate::{BlockDevice, Error, FileSystem, Result};

/// One bit per item, `1` = allocated. Bit `i` lives in byte `i / 8` at position `i % 8`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bitmap {
    bytes: Vec<u8>,
    len: u32,
}

impl Bitmap {
    /// An all-free bitmap tracking `len` items stored in `num_bytes` bytes.
    pub fn new(len: u32, num_bytes: usize) -> Self {
        Self {
            bytes: vec![0; num_bytes.max(len.div_ceil(8) as usize)],
            len,
        }
    }

    pub fn from_bytes(bytes: Vec<u8>, len: u32) -> Self {
        debug_assert!(bytes.len() * 8 >= len as usize);
        Self { bytes, len }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Number of items tracked.
    pub fn len(&self) -> u32 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn get(&self, item: u32) -> bool {
        item < self.len && self.bytes[(item / 8) as usize] & (1 << (item % 8)) != 0
    }

    /// Sets the bit for `item`. Returns the previous value.
    pub fn set(&mut self, item: u32) -> bool {
        let prev = self.get(item);
        if item < self.len {
            self.bytes[(item / 8) as usize] |= 1 << (item % 8);
        }
        prev
    }

    /// Clears the bit for `item`. Returns the previous value.
    pub fn clear(&mut self, item: u32) -> bool {
        let prev = self.get(item);
        if item < self.len {
            self.bytes[(item / 8) as usize] &= !(1 << (item % 8));
        }
        prev
    }

    /// Sets the first clear bit and returns its index.
    pub fn set_first_fit(&mut self) -> Option<u32> {
        for (j, byte) in self.bytes.iter_mut().enumerate() {
            if *byte == u8::MAX {
                continue;
            }
            for k in 0..8 {
                let item = j as u32 * 8 + k;
                if item >= self.len {
                    return None;
                }
                if *byte & (1 << k) == 0 {
                    *byte |= 1 << k;
                    return Some(item);
                }
            }
        }
        None
    }

    pub fn count_set(&self) -> u32 {
        (0..self.len).filter(|&i| self.get(i)).count() as u32
    }
}

// Allocator API over the mounted file system.

impl<D: BlockDevice> FileSystem<D> {
    /// Allocates the first free data block.
    pub fn allocate_block(&mut self) -> Result<BlockId> {
        let index = self.block_bitmap.set_first_fit().ok_or(Error::OutOfSpace)?;
        trace!(block = index, "allocated data block");
        Ok(BlockId(index))
    }

    /// Returns a data block to the bitmap. Freeing a free or out of range block is a no-op.
    pub fn free_block(&mut self, block: BlockId) {
        if !self.block_bitmap.clear(block.0) {
            trace!(block = block.0, "ignoring free of unallocated block");
        }
    }

    /// Allocates the first free inode slot and zeroes its record.
    pub fn allocate_inode(&mut self) -> Result<InodeId> {
        let index = self.inode_bitmap.set_first_fit().ok_or(Error::OutOfInodes)?;
        self.inodes[index as usize] = Inode::EMPTY;
        debug!(inode = index, "allocated inode");
        Ok(InodeId(index))
    }

    /// Frees `id`, every block it references, and every inode chained after it.
    /// Walks the chain iteratively; stops at slots that are already free so a
    /// corrupt cyclic chain cannot loop forever.
    pub fn free_inode(&mut self, id: InodeId) {
        if id == InodeId::ROOT {
            warn!("refusing to free the root inode");
            return;
        }
        let mut current = Some(id);
        while let Some(cur) = current {
            if cur == InodeId::ROOT || !self.inode_bitmap.get(cur.0) {
                break;
            }
            let inode = self.inodes[cur.index()];
            for block in inode.blocks() {
                self.free_block(block);
            }
            current = inode.next_inode;
            self.inode_bitmap.clear(cur.0);
            self.inodes[cur.index()] = Inode::EMPTY;
            debug!(inode = cur.0, "freed inode");
        }
    }

    pub fn is_block_allocated(&self, block: BlockId) -> bool {
        self.block_bitmap.get(block.0)
    }

    pub fn is_inode_allocated(&self, id: InodeId) -> bool {
        self.inode_bitmap.get(id.0)
    }
}
