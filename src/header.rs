//! On-disk header and the layout derived from it.
//!
//! Linear layout of an image:
//! - Header (`HEADER_SIZE` bytes at offset 0)
//! - Block bitmap
//! - Inode bitmap
//! - Inode table
//! - Padding up to the next block boundary
//! - Data blocks

use tracing::warn;

use crate::config::*;
use crate::structs::{get_u32, put_u32};
use crate::{BlockDevice, Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub magic: u32,
    pub block_bitmap_bytes: u32,
    pub inode_bitmap_bytes: u32,
    pub inode_table_bytes: u32,
    pub meta_blocks: u32,  // Blocks consumed by header, bitmaps and inode table
    pub data_blocks: u32,  // Usable data blocks
    pub off_block_bitmap: u32,
    pub off_inode_bitmap: u32,
    pub off_inode_table: u32,
    pub off_data_region: u32,
    pub block_size: u32,
    pub inode_capacity: u32,
}

const fn div_ceil(n: u64, d: u64) -> u64 {
    (n + d - 1) / d
}

impl Header {
    /// Computes the layout for an image of `disk_size` bytes with
    /// `inode_capacity` inode slots. Deterministic for equal inputs.
    pub fn compute(disk_size: u64, inode_capacity: u32) -> Result<Self> {
        let block_size = BLOCK_SIZE as u64;
        let total_blocks = disk_size / block_size;
        let inode_bitmap_bytes = div_ceil(inode_capacity as u64, 8);
        let inode_table_bytes = inode_capacity as u64 * INODE_SIZE as u64;

        // Size the block bitmap for the whole budget first, then shrink it to
        // the blocks that remain once the metadata is accounted for.
        let upper_bitmap_bytes = div_ceil(total_blocks, 8);
        let meta_bytes = |bitmap_bytes: u64| {
            HEADER_SIZE as u64 + bitmap_bytes + inode_bitmap_bytes + inode_table_bytes
        };
        let meta_blocks = div_ceil(meta_bytes(upper_bitmap_bytes), block_size);
        if inode_capacity == 0 || meta_blocks >= total_blocks {
            return Err(Error::CorruptFilesystem(format!(
                "{disk_size} bytes cannot hold {inode_capacity} inodes"
            )));
        }
        let data_blocks = total_blocks - meta_blocks;
        let block_bitmap_bytes = div_ceil(data_blocks, 8);

        let off_block_bitmap = HEADER_SIZE as u64;
        let off_inode_bitmap = off_block_bitmap + block_bitmap_bytes;
        let off_inode_table = off_inode_bitmap + inode_bitmap_bytes;
        let off_data_region = div_ceil(off_inode_table + inode_table_bytes, block_size) * block_size;

        let fits = |v: u64| u32::try_from(v).map_err(|_| {
            Error::CorruptFilesystem(format!("layout value {v} overflows the header"))
        });

        Ok(Self {
            magic: MAGIC,
            block_bitmap_bytes: fits(block_bitmap_bytes)?,
            inode_bitmap_bytes: fits(inode_bitmap_bytes)?,
            inode_table_bytes: fits(inode_table_bytes)?,
            meta_blocks: fits(meta_blocks)?,
            data_blocks: fits(data_blocks)?,
            off_block_bitmap: fits(off_block_bitmap)?,
            off_inode_bitmap: fits(off_inode_bitmap)?,
            off_inode_table: fits(off_inode_table)?,
            off_data_region: fits(off_data_region)?,
            block_size: BLOCK_SIZE as u32,
            inode_capacity,
        })
    }

    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        let fields = [
            self.magic,
            self.block_bitmap_bytes,
            self.inode_bitmap_bytes,
            self.inode_table_bytes,
            self.meta_blocks,
            self.data_blocks,
            self.off_block_bitmap,
            self.off_inode_bitmap,
            self.off_inode_table,
            self.off_data_region,
            self.block_size,
            self.inode_capacity,
        ];
        for (i, field) in fields.into_iter().enumerate() {
            put_u32(&mut buf, i * 4, field);
        }
        buf
    }

    pub fn decode(buf: &[u8; HEADER_SIZE]) -> Self {
        let f = |i: usize| get_u32(buf, i * 4);
        Self {
            magic: f(0),
            block_bitmap_bytes: f(1),
            inode_bitmap_bytes: f(2),
            inode_table_bytes: f(3),
            meta_blocks: f(4),
            data_blocks: f(5),
            off_block_bitmap: f(6),
            off_inode_bitmap: f(7),
            off_inode_table: f(8),
            off_data_region: f(9),
            block_size: f(10),
            inode_capacity: f(11),
        }
    }

    /// Checks that the regions are consistent with each other and with an
    /// image of `image_len` bytes.
    pub fn validate(&self, image_len: u64) -> Result<()> {
        let corrupt = |why: String| {
            warn!(%why, "rejecting image header");
            Err(Error::CorruptFilesystem(why))
        };

        if self.magic != MAGIC {
            return corrupt(format!("bad magic {:#010x}", self.magic));
        }
        if self.block_size != BLOCK_SIZE as u32 {
            return corrupt(format!(
                "block size {} does not match this build ({BLOCK_SIZE})",
                self.block_size
            ));
        }
        if self.inode_table_bytes as u64 != self.inode_capacity as u64 * INODE_SIZE as u64
            || (self.inode_bitmap_bytes as u64) < div_ceil(self.inode_capacity as u64, 8)
            || (self.block_bitmap_bytes as u64) < div_ceil(self.data_blocks as u64, 8)
        {
            return corrupt("region sizes disagree with capacities".into());
        }
        // Widened so that sizes near u32::MAX cannot overflow.
        let after = |off: u32, len: u32| off as u64 + len as u64;
        if self.off_block_bitmap as usize != HEADER_SIZE
            || self.off_inode_bitmap as u64 != after(self.off_block_bitmap, self.block_bitmap_bytes)
            || self.off_inode_table as u64 != after(self.off_inode_bitmap, self.inode_bitmap_bytes)
            || (self.off_data_region as u64) < after(self.off_inode_table, self.inode_table_bytes)
            || self.off_data_region % self.block_size != 0
        {
            return corrupt("region offsets are out of order".into());
        }
        let end = self.off_data_region as u64 + self.data_blocks as u64 * self.block_size as u64;
        if end > image_len {
            return corrupt(format!("data region ends at {end}, image holds {image_len} bytes"));
        }
        Ok(())
    }

    /// Byte offset of data block `index`.
    pub fn block_offset(&self, index: u32) -> u64 {
        self.off_data_region as u64 + index as u64 * BLOCK_SIZE as u64
    }

    /// Byte offset of inode record `index`.
    pub fn inode_offset(&self, index: u32) -> u64 {
        self.off_inode_table as u64 + index as u64 * INODE_SIZE as u64
    }
}

pub fn read_header<D: BlockDevice>(device: &D) -> Result<Header> {
    let mut buf = [0u8; HEADER_SIZE];
    device.read_at(0, &mut buf)?;
    let header = Header::decode(&buf);
    header.validate(device.len())?;
    Ok(header)
}

pub fn write_header<D: BlockDevice>(device: &D, header: &Header) -> Result<()> {
    device.write_at(0, &header.encode())?;
    device.sync()?;
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::MemDisk;

    #[test]
    fn test_default_layout() {
        let header = Header::compute(DISK_SIZE, MAX_INODES).unwrap();
        let total_blocks = (DISK_SIZE / BLOCK_SIZE as u64) as u32;
        assert_eq!(header.meta_blocks + header.data_blocks, total_blocks);
        assert_eq!(header.block_bitmap_bytes, header.data_blocks.div_ceil(8));
        assert_eq!(header.inode_bitmap_bytes, MAX_INODES / 8);
        assert_eq!(header.off_data_region % BLOCK_SIZE as u32, 0);
        header.validate(DISK_SIZE).unwrap();
    }

    #[test]
    fn test_layout_is_deterministic() {
        assert_eq!(
            Header::compute(1 << 20, 64).unwrap(),
            Header::compute(1 << 20, 64).unwrap()
        );
    }

    #[test]
    fn test_too_small_image() {
        assert!(Header::compute(4 * BLOCK_SIZE as u64, 128).is_err());
        assert!(Header::compute(1 << 20, 0).is_err());
    }

    #[test]
    fn test_header_round_trip_through_device() {
        let disk = MemDisk::new(1 << 20);
        let header = Header::compute(1 << 20, 64).unwrap();
        write_header(&disk, &header).unwrap();
        assert_eq!(read_header(&disk).unwrap(), header);
    }

    #[test]
    fn test_bad_magic_and_block_size() {
        let disk = MemDisk::new(1 << 20);
        let mut header = Header::compute(1 << 20, 64).unwrap();
        header.magic = 0xDEAD_BEEF;
        write_header(&disk, &header).unwrap();
        assert!(matches!(read_header(&disk), Err(Error::CorruptFilesystem(_))));

        header.magic = MAGIC;
        header.block_size = 4096;
        write_header(&disk, &header).unwrap();
        assert!(matches!(read_header(&disk), Err(Error::CorruptFilesystem(_))));
    }

    #[test]
    fn test_oversized_regions_are_rejected() {
        let mut header = Header::compute(1 << 20, 64).unwrap();
        header.block_bitmap_bytes = u32::MAX;
        assert!(matches!(header.validate(1 << 20), Err(Error::CorruptFilesystem(_))));

        let mut header = Header::compute(1 << 20, 64).unwrap();
        header.off_inode_table = u32::MAX;
        header.inode_table_bytes = u32::MAX;
        assert!(matches!(header.validate(1 << 20), Err(Error::CorruptFilesystem(_))));
    }

    #[test]
    fn test_truncated_image_is_rejected() {
        let header = Header::compute(1 << 20, 64).unwrap();
        assert!(header.validate((1 << 20) - BLOCK_SIZE as u64).is_err());
    }
}
