use std::path::Path;

use tracing::{debug, info};

use crate::bitmap::Bitmap;
use crate::config::*;
use crate::header::{read_header, write_header, Header};
use crate::structs::*;
use crate::{BlockDevice, Error, FileDisk, Result};

/// Parameters for formatting a new image. Mounting reads everything from the header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FsOptions {
    /// Size of a newly created image file. `format` uses the device length instead.
    pub disk_size: u64,
    pub inode_capacity: u32,
}

impl Default for FsOptions {
    fn default() -> Self {
        Self {
            disk_size: DISK_SIZE,
            inode_capacity: MAX_INODES,
        }
    }
}

/// Block and inode usage, as reported by `df`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Usage {
    pub total_blocks: u32,
    pub used_blocks: u32,
    pub free_blocks: u32,
    pub total_inodes: u32,
    pub used_inodes: u32,
    pub free_inodes: u32,
}

impl Usage {
    /// Used share of the data region, rounded up.
    pub fn percent_used(&self) -> u32 {
        if self.total_blocks == 0 {
            return 0;
        }
        ((self.used_blocks as u64 * 100).div_ceil(self.total_blocks as u64)) as u32
    }
}

/// A mounted image. Owns the device and every in-memory structure of it;
/// all engine operations take this context explicitly.
#[derive(Debug)]
pub struct FileSystem<D: BlockDevice> {
    pub(crate) device: D,
    pub(crate) header: Header,
    pub(crate) block_bitmap: Bitmap,
    pub(crate) inode_bitmap: Bitmap,
    pub(crate) inodes: Vec<Inode>,
}

impl FileSystem<FileDisk> {
    /// Mounts the image at `path`, creating and formatting it first if it does not exist.
    pub fn initialize(path: impl AsRef<Path>, options: FsOptions) -> Result<Self> {
        let path = path.as_ref();
        if path.exists() {
            info!(path = %path.display(), "existing image found, mounting");
            return Self::mount(FileDisk::open(path)?);
        }
        info!(path = %path.display(), size = options.disk_size, "creating new image");
        let disk = FileDisk::create(path, options.disk_size)?;
        Self::format(disk, options)
    }
}

impl<D: BlockDevice> FileSystem<D> {
    /// Lays out a fresh file system over the whole device and creates the root directory.
    pub fn format(device: D, options: FsOptions) -> Result<Self> {
        let header = Header::compute(device.len(), options.inode_capacity)?;
        let mut fs = Self {
            device,
            block_bitmap: Bitmap::new(header.data_blocks, header.block_bitmap_bytes as usize),
            inode_bitmap: Bitmap::new(header.inode_capacity, header.inode_bitmap_bytes as usize),
            inodes: vec![Inode::EMPTY; header.inode_capacity as usize],
            header,
        };

        // Block pointer 0 means "unset", so data block 0 is never handed out.
        fs.block_bitmap.set(0);

        let root = fs.allocate_inode()?;
        debug_assert_eq!(root, InodeId::ROOT);
        let block = fs.allocate_block()?;
        let now = unix_now();
        let inode = fs.inode_mut(root)?;
        inode.ftype = FileType::Directory;
        inode.mode = Mode::FULL;
        inode.name = encode_name("/")?;
        inode.owner_uid = Uid::ROOT;
        inode.creator_uid = Uid::ROOT;
        inode.created = now;
        inode.modified = now;
        inode.direct_ptrs[0] = Some(block);
        inode.size = 2 * DIR_ENTRY_SIZE as u64;
        fs.write_dot_block(block, root, root)?;

        write_header(&fs.device, &fs.header)?;
        fs.sync_all()?;

        info!(
            header_bytes = HEADER_SIZE,
            block_bitmap_bytes = fs.header.block_bitmap_bytes,
            inode_bitmap_bytes = fs.header.inode_bitmap_bytes,
            inode_table_bytes = fs.header.inode_table_bytes,
            data_blocks = fs.header.data_blocks,
            "file system formatted"
        );
        Ok(fs)
    }

    /// Loads an existing image. Fails with `CorruptFilesystem` on a bad header.
    pub fn mount(device: D) -> Result<Self> {
        let header = read_header(&device)?;

        let mut block_bytes = vec![0u8; header.block_bitmap_bytes as usize];
        device.read_at(header.off_block_bitmap as u64, &mut block_bytes)?;
        let mut inode_bytes = vec![0u8; header.inode_bitmap_bytes as usize];
        device.read_at(header.off_inode_bitmap as u64, &mut inode_bytes)?;
        let mut table = vec![0u8; header.inode_table_bytes as usize];
        device.read_at(header.off_inode_table as u64, &mut table)?;

        let inodes = table
            .chunks_exact(INODE_SIZE)
            .map(Inode::decode)
            .collect::<Result<Vec<_>>>()?;

        let fs = Self {
            device,
            block_bitmap: Bitmap::from_bytes(block_bytes, header.data_blocks),
            inode_bitmap: Bitmap::from_bytes(inode_bytes, header.inode_capacity),
            inodes,
            header,
        };
        if !fs.inode_bitmap.get(ROOT_INODE_ID) || !fs.inodes[ROOT_INODE_ID as usize].is_dir() {
            return Err(Error::CorruptFilesystem("root directory is missing".into()));
        }

        info!(
            data_blocks = fs.header.data_blocks,
            inodes = fs.header.inode_capacity,
            "file system mounted"
        );
        Ok(fs)
    }

    /// Writes both bitmaps and the whole inode table back and forces them to stable storage.
    pub fn sync_all(&self) -> Result<()> {
        let h = &self.header;
        self.device.write_at(h.off_block_bitmap as u64, self.block_bitmap.as_bytes())?;
        self.device.write_at(h.off_inode_bitmap as u64, self.inode_bitmap.as_bytes())?;

        let mut table = vec![0u8; h.inode_table_bytes as usize];
        for (inode, chunk) in self.inodes.iter().zip(table.chunks_exact_mut(INODE_SIZE)) {
            inode.encode(chunk);
        }
        self.device.write_at(h.off_inode_table as u64, &table)?;
        self.device.sync()?;
        debug!("synced bitmaps and inode table");
        Ok(())
    }

    /// Writes a single inode record. Bitmaps are not touched.
    pub fn sync_inode(&self, id: InodeId) -> Result<()> {
        let inode = self.inode(id)?;
        let mut buf = [0u8; INODE_SIZE];
        inode.encode(&mut buf);
        self.device.write_at(self.header.inode_offset(id.0), &buf)?;
        self.device.sync()?;
        Ok(())
    }

    /// Final sync, then releases the image.
    pub fn unmount(self) -> Result<D> {
        self.sync_all()?;
        info!("file system unmounted");
        Ok(self.device)
    }

    pub fn read_block(&self, block: BlockId, buf: &mut [u8; BLOCK_SIZE]) -> Result<()> {
        if block.0 >= self.header.data_blocks {
            return Err(Error::BlockOutOfRange(block));
        }
        self.device.read_at(self.header.block_offset(block.0), buf)
    }

    /// Writes one data block and forces it to stable storage.
    pub fn write_block(&self, block: BlockId, buf: &[u8; BLOCK_SIZE]) -> Result<()> {
        if block.0 >= self.header.data_blocks {
            return Err(Error::BlockOutOfRange(block));
        }
        self.device.write_at(self.header.block_offset(block.0), buf)?;
        self.device.sync()
    }

    pub fn usage(&self) -> Usage {
        let used_blocks = self.block_bitmap.count_set();
        let used_inodes = self.inode_bitmap.count_set();
        Usage {
            total_blocks: self.header.data_blocks,
            used_blocks,
            free_blocks: self.header.data_blocks - used_blocks,
            total_inodes: self.header.inode_capacity,
            used_inodes,
            free_inodes: self.header.inode_capacity - used_inodes,
        }
    }

    pub fn root_inode_id(&self) -> InodeId {
        InodeId::ROOT
    }

    pub fn header(&self) -> &Header {
        &self.header
    }

    pub fn device(&self) -> &D {
        &self.device
    }
}
