//! Directory entries stored in the data blocks of a directory's inode chain.
//!
//! Traversal order is chain order, then block slot order, then entry order.
//! Slot 0 of a head directory inode holds the '.' and '..' block and slot 1 is
//! kept free; new entries go to slots 2.. of the head, then to every slot of
//! the chained inodes. Entry counts are accounted on the head inode's size.

use tracing::{debug, trace};

use crate::config::*;
use crate::inode::Stat;
use crate::structs::*;
use crate::{BlockDevice, Error, FileSystem, Result};

type EntryBlock = [DirEntry; NUM_ENTRY_PER_BLOCK];

fn name_cmp(n1: &[u8], n2: &[u8]) -> bool {
    trim_zero(n1) == trim_zero(n2)
}

impl DirEntry {
    pub fn is_empty(&self) -> bool {
        self.name.iter().all(|&c| c == 0)
    }

    pub fn name_eq(&self, name: &str) -> bool {
        name_cmp(&self.name, name.as_bytes())
    }

    pub fn is_dot(&self) -> bool {
        self.name_eq(DOT_NAME) || self.name_eq(DOTDOT_NAME)
    }
}

/// Where a directory record lives.
#[derive(Debug, Clone, Copy)]
struct EntrySlot {
    block: BlockId,
    index: usize,
    entry: DirEntry,
}

/// One live entry of a directory listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListEntry {
    pub name: String,
    pub stat: Stat,
}

impl<D: BlockDevice> FileSystem<D> {
    fn read_entries(&self, block: BlockId) -> Result<EntryBlock> {
        let mut buf = [0u8; BLOCK_SIZE];
        self.read_block(block, &mut buf)?;
        let mut entries = [DirEntry::NULL; NUM_ENTRY_PER_BLOCK];
        for (entry, chunk) in entries.iter_mut().zip(buf.chunks_exact(DIR_ENTRY_SIZE)) {
            *entry = DirEntry::decode(chunk);
        }
        Ok(entries)
    }

    fn write_entries(&self, block: BlockId, entries: &EntryBlock) -> Result<()> {
        let mut buf = [0u8; BLOCK_SIZE];
        for (entry, chunk) in entries.iter().zip(buf.chunks_exact_mut(DIR_ENTRY_SIZE)) {
            entry.encode(chunk);
        }
        self.write_block(block, &buf)
    }

    /// Writes a fresh entry block holding only '.' and '..'.
    pub(crate) fn write_dot_block(&self, block: BlockId, dir: InodeId, parent: InodeId) -> Result<()> {
        let mut entries = [DirEntry::NULL; NUM_ENTRY_PER_BLOCK];
        entries[0] = DirEntry::new(dir, DOT_NAME)?;
        entries[1] = DirEntry::new(parent, DOTDOT_NAME)?;
        self.write_entries(block, &entries)
    }

    /// Visits every live record of the chain headed by `dir` in traversal
    /// order and returns the first one `pred` accepts.
    fn scan_entries<F>(&self, dir: InodeId, mut pred: F) -> Result<Option<EntrySlot>>
    where
        F: FnMut(&DirEntry) -> Result<bool>,
    {
        for member in self.chain(dir)? {
            let inode = self.inode(member)?;
            if !inode.is_dir() {
                return Err(Error::NotDirectory);
            }
            for block in inode.blocks() {
                let entries = self.read_entries(block)?;
                for (index, entry) in entries.iter().enumerate() {
                    if entry.is_empty() {
                        continue;
                    }
                    if pred(entry)? {
                        return Ok(Some(EntrySlot {
                            block,
                            index,
                            entry: *entry,
                        }));
                    }
                }
            }
        }
        Ok(None)
    }

    fn entry_matches(&self, entry: &DirEntry, name: &str, kind: EntryKind) -> Result<bool> {
        if !entry.name_eq(name) {
            return Ok(false);
        }
        let ftype = self.inode(entry.inode_id)?.ftype;
        trace!(name, inode = entry.inode_id.0, ?ftype, ?kind, "checking entry");
        Ok(kind.matches(ftype))
    }

    /// Looks `name` up in `dir`. Case sensitive, first match wins.
    pub fn find_entry(&self, dir: InodeId, name: &str, kind: EntryKind) -> Result<InodeId> {
        self.scan_entries(dir, |entry| self.entry_matches(entry, name, kind))?
            .map(|slot| slot.entry.inode_id)
            .ok_or(Error::NotFound)
    }

    /// Adds a record for `id` to `dir`, growing the chain when every slot is taken.
    pub fn add_entry(&mut self, dir: InodeId, name: &str, kind: EntryKind, id: InodeId) -> Result<()> {
        match self.find_entry(dir, name, kind) {
            Ok(_) => return Err(Error::DuplicateName),
            Err(Error::NotFound) => {}
            Err(e) => return Err(e),
        }
        let record = DirEntry::new(id, name)?;

        let mut current = dir;
        loop {
            let inode = *self.inode(current)?;
            if !inode.is_dir() {
                return Err(Error::NotDirectory);
            }
            let first_slot = if current == dir { NUM_RESERVED_DIR_SLOTS } else { 0 };
            for slot in first_slot..NUM_DIRECT_PTRS {
                let block = match inode.direct_ptrs[slot] {
                    Some(block) => block,
                    None => {
                        let block = self.allocate_block()?;
                        self.write_block(block, &[0u8; BLOCK_SIZE])?;
                        self.inode_mut(current)?.direct_ptrs[slot] = Some(block);
                        block
                    }
                };
                let mut entries = self.read_entries(block)?;
                if let Some(index) = entries.iter().position(DirEntry::is_empty) {
                    entries[index] = record;
                    self.write_entries(block, &entries)?;
                    let head = self.inode_mut(dir)?;
                    head.size += DIR_ENTRY_SIZE as u64;
                    head.modified = unix_now();
                    trace!(dir = dir.0, member = current.0, slot, index, name, "added entry");
                    return Ok(());
                }
            }

            current = match inode.next_inode {
                Some(next) => next,
                None => self.extend_dir_chain(dir, current)?,
            };
        }
    }

    /// Links a new directory inode with one empty block after `tail`.
    fn extend_dir_chain(&mut self, head: InodeId, tail: InodeId) -> Result<InodeId> {
        let block = self.allocate_block()?;
        if let Err(e) = self.write_block(block, &[0u8; BLOCK_SIZE]) {
            self.free_block(block);
            return Err(e);
        }
        let next = match self.allocate_inode() {
            Ok(next) => next,
            Err(e) => {
                self.free_block(block);
                return Err(e);
            }
        };

        let head_inode = *self.inode(head)?;
        let inode = self.inode_mut(next)?;
        inode.ftype = FileType::Directory;
        inode.mode = head_inode.mode;
        inode.name = head_inode.name;
        inode.owner_uid = head_inode.owner_uid;
        inode.creator_uid = head_inode.creator_uid;
        inode.created = unix_now();
        inode.modified = inode.created;
        inode.direct_ptrs[0] = Some(block);
        self.inode_mut(tail)?.next_inode = Some(next);
        debug!(head = head.0, next = next.0, "extended directory chain");
        Ok(next)
    }

    /// Clears the record at `slot`, shrinks the head's size and tears down
    /// the target inode with its blocks and chain.
    fn clear_slot(&mut self, dir: InodeId, slot: EntrySlot) -> Result<InodeId> {
        let mut entries = self.read_entries(slot.block)?;
        entries[slot.index] = DirEntry::NULL;
        self.write_entries(slot.block, &entries)?;

        let head = self.inode_mut(dir)?;
        head.size = head.size.saturating_sub(DIR_ENTRY_SIZE as u64);
        head.modified = unix_now();

        let target = slot.entry.inode_id;
        self.free_inode(target);
        debug!(dir = dir.0, target = target.0, name = %slot.entry.name(), "removed entry");
        Ok(target)
    }

    /// Removes `name` from `dir` and frees the inode it referenced.
    pub fn remove_entry(&mut self, dir: InodeId, name: &str, kind: EntryKind) -> Result<InodeId> {
        if name == DOT_NAME || name == DOTDOT_NAME {
            return Err(Error::InvalidName);
        }
        let slot = self
            .scan_entries(dir, |entry| self.entry_matches(entry, name, kind))?
            .ok_or(Error::NotFound)?;
        self.clear_slot(dir, slot)
    }

    /// Removes the record of `dir` that points at `target`.
    pub(crate) fn remove_entry_for(&mut self, dir: InodeId, target: InodeId) -> Result<InodeId> {
        let slot = self
            .scan_entries(dir, |entry| Ok(entry.inode_id == target && !entry.is_dot()))?
            .ok_or(Error::NotFound)?;
        self.clear_slot(dir, slot)
    }

    /// True when no block of the chain holds anything besides '.' and '..'.
    pub fn dir_is_empty(&self, dir: InodeId) -> Result<bool> {
        Ok(self.scan_entries(dir, |entry| Ok(!entry.is_dot()))?.is_none())
    }

    /// Every live record of `dir` in traversal order, '.' and '..' included.
    pub fn list_directory(&self, dir: InodeId) -> Result<Vec<ListEntry>> {
        let mut listing = Vec::new();
        self.scan_entries(dir, |entry| {
            listing.push(ListEntry {
                name: entry.name(),
                stat: self.stat(entry.inode_id)?,
            });
            Ok(false)
        })?;
        Ok(listing)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{FsOptions, MemDisk};

    fn small() -> FileSystem<MemDisk> {
        FileSystem::format(MemDisk::new(1 << 20), FsOptions::default()).unwrap()
    }

    fn regular(fs: &mut FileSystem<MemDisk>) -> InodeId {
        let id = fs.allocate_inode().unwrap();
        fs.inode_mut(id).unwrap().ftype = FileType::Regular;
        id
    }

    #[test]
    fn test_name_cmp() {
        assert_eq!(name_cmp(b"test", b"test"), true);
        assert_eq!(name_cmp(b"test", b"test1"), false);
        assert_eq!(name_cmp(b"test", b"tes"), false);
        assert_eq!(name_cmp(b"test\0\0", b"test"), true);
    }

    #[test]
    fn test_root_dot_entries() {
        let fs = small();
        assert_eq!(fs.find_entry(InodeId::ROOT, ".", EntryKind::Directory).unwrap(), InodeId::ROOT);
        assert_eq!(fs.find_entry(InodeId::ROOT, "..", EntryKind::Directory).unwrap(), InodeId::ROOT);
        assert!(fs.dir_is_empty(InodeId::ROOT).unwrap());
    }

    #[test]
    fn test_add_find_remove() {
        let mut fs = small();
        let id = regular(&mut fs);
        fs.add_entry(InodeId::ROOT, "a.txt", EntryKind::Regular, id).unwrap();
        assert_eq!(fs.inode(InodeId::ROOT).unwrap().size, 3 * DIR_ENTRY_SIZE as u64);
        assert_eq!(fs.find_entry(InodeId::ROOT, "a.txt", EntryKind::Regular).unwrap(), id);
        assert_eq!(fs.find_entry(InodeId::ROOT, "a.txt", EntryKind::Any).unwrap(), id);
        assert!(matches!(
            fs.find_entry(InodeId::ROOT, "a.txt", EntryKind::Directory),
            Err(Error::NotFound)
        ));
        assert!(matches!(
            fs.find_entry(InodeId::ROOT, "A.TXT", EntryKind::Any),
            Err(Error::NotFound)
        ));
        assert!(!fs.dir_is_empty(InodeId::ROOT).unwrap());

        assert_eq!(fs.remove_entry(InodeId::ROOT, "a.txt", EntryKind::Regular).unwrap(), id);
        assert!(!fs.is_inode_allocated(id));
        assert_eq!(fs.inode(InodeId::ROOT).unwrap().size, 2 * DIR_ENTRY_SIZE as u64);
        assert!(matches!(
            fs.remove_entry(InodeId::ROOT, "a.txt", EntryKind::Regular),
            Err(Error::NotFound)
        ));
    }

    #[test]
    fn test_duplicate_name() {
        let mut fs = small();
        let a = regular(&mut fs);
        let b = regular(&mut fs);
        fs.add_entry(InodeId::ROOT, "dup", EntryKind::Regular, a).unwrap();
        assert!(matches!(
            fs.add_entry(InodeId::ROOT, "dup", EntryKind::Regular, b),
            Err(Error::DuplicateName)
        ));
    }

    #[test]
    fn test_entries_skip_reserved_slots() {
        let mut fs = small();
        let id = regular(&mut fs);
        fs.add_entry(InodeId::ROOT, "x", EntryKind::Regular, id).unwrap();
        let root = fs.inode(InodeId::ROOT).unwrap();
        assert!(root.direct_ptrs[1].is_none());
        assert!(root.direct_ptrs[2].is_some());
    }

    #[test]
    fn test_dot_names_cannot_be_removed() {
        let mut fs = small();
        assert!(matches!(
            fs.remove_entry(InodeId::ROOT, "..", EntryKind::Directory),
            Err(Error::InvalidName)
        ));
    }

    /// Formats an image with `capacity` inodes and fills the root's head
    /// inode so that the next entry needs a chained directory inode.
    fn full_root(capacity: u32) -> FileSystem<MemDisk> {
        let options = FsOptions {
            disk_size: 1 << 20,
            inode_capacity: capacity,
        };
        let mut fs = FileSystem::format(MemDisk::new(1 << 20), options).unwrap();
        for i in 0..(NUM_DIRECT_PTRS - NUM_RESERVED_DIR_SLOTS) * NUM_ENTRY_PER_BLOCK {
            let id = regular(&mut fs);
            fs.add_entry(InodeId::ROOT, &format!("f{i}"), EntryKind::Regular, id).unwrap();
        }
        fs
    }

    #[test]
    fn test_chain_growth_without_blocks_keeps_inodes() {
        let mut fs = full_root(160);
        while fs.allocate_block().is_ok() {}
        let id = regular(&mut fs);
        let usage = fs.usage();
        assert!(matches!(
            fs.add_entry(InodeId::ROOT, "last", EntryKind::Regular, id),
            Err(Error::OutOfSpace)
        ));
        assert_eq!(fs.usage(), usage);
        assert!(fs.inode(InodeId::ROOT).unwrap().next_inode.is_none());
    }

    #[test]
    fn test_chain_growth_without_inodes_keeps_blocks() {
        let mut fs = full_root(142);
        let id = regular(&mut fs);
        let usage = fs.usage();
        assert!(matches!(
            fs.add_entry(InodeId::ROOT, "last", EntryKind::Regular, id),
            Err(Error::OutOfInodes)
        ));
        assert_eq!(fs.usage(), usage);
    }

    #[test]
    fn test_lookup_in_regular_file_fails() {
        let mut fs = small();
        let id = regular(&mut fs);
        assert!(matches!(fs.find_entry(id, "x", EntryKind::Any), Err(Error::NotDirectory)));
    }
}
