//! Backing store abstraction.
//! The image is byte-addressed: the header and bitmaps are not block aligned,
//! only the data region is.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use parking_lot::Mutex;

use crate::Result;

pub trait BlockDevice: Send + Sync {
    /// Total size of the image in bytes.
    fn len(&self) -> u64;

    /// Fills `buf` from `offset`. A short read is an error.
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<()>;

    /// Writes all of `buf` at `offset`. A short write is an error.
    fn write_at(&self, offset: u64, buf: &[u8]) -> Result<()>;

    /// Forces previous writes to stable storage.
    fn sync(&self) -> Result<()>;
}

/// An image backed by a regular file.
#[derive(Debug)]
pub struct FileDisk {
    inner: Mutex<File>,
    len: u64,
}

impl FileDisk {
    /// Creates a new image of exactly `size` bytes. Fails if `path` exists.
    pub fn create(path: impl AsRef<Path>, size: u64) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(path)?;
        file.set_len(size)?;
        Ok(Self {
            inner: Mutex::new(file),
            len: size,
        })
    }

    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        let len = file.metadata()?.len();
        Ok(Self {
            inner: Mutex::new(file),
            len,
        })
    }
}

impl BlockDevice for FileDisk {
    fn len(&self) -> u64 {
        self.len
    }

    fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<()> {
        let mut inner = self.inner.lock();
        inner.seek(SeekFrom::Start(offset))?;
        inner.read_exact(buf)?;
        Ok(())
    }

    fn write_at(&self, offset: u64, buf: &[u8]) -> Result<()> {
        let mut inner = self.inner.lock();
        inner.seek(SeekFrom::Start(offset))?;
        inner.write_all(buf)?;
        Ok(())
    }

    fn sync(&self) -> Result<()> {
        let mut inner = self.inner.lock();
        inner.flush()?;
        inner.sync_all()?;
        Ok(())
    }
}

/// An image held in memory. Syncing is a no-op.
#[derive(Debug)]
pub struct MemDisk {
    inner: Mutex<Vec<u8>>,
}

impl MemDisk {
    pub fn new(size: u64) -> Self {
        Self {
            inner: Mutex::new(vec![0u8; size as usize]),
        }
    }

    /// Copy of the raw image, e.g. to remount it elsewhere.
    pub fn snapshot(&self) -> Vec<u8> {
        self.inner.lock().clone()
    }

    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self {
            inner: Mutex::new(bytes),
        }
    }
}

fn short_transfer(offset: u64, len: usize) -> std::io::Error {
    std::io::Error::new(
        std::io::ErrorKind::UnexpectedEof,
        format!("transfer of {len} bytes at offset {offset} runs past end of image"),
    )
}

impl BlockDevice for MemDisk {
    fn len(&self) -> u64 {
        self.inner.lock().len() as u64
    }

    fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<()> {
        let data = self.inner.lock();
        let start = offset as usize;
        let end = start + buf.len();
        if end > data.len() {
            return Err(short_transfer(offset, buf.len()).into());
        }
        buf.copy_from_slice(&data[start..end]);
        Ok(())
    }

    fn write_at(&self, offset: u64, buf: &[u8]) -> Result<()> {
        let mut data = self.inner.lock();
        let start = offset as usize;
        let end = start + buf.len();
        if end > data.len() {
            return Err(short_transfer(offset, buf.len()).into());
        }
        data[start..end].copy_from_slice(buf);
        Ok(())
    }

    fn sync(&self) -> Result<()> {
        Ok(())
    }
}
