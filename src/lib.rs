//! Pion is a block based file system that lives inside a single image file.
//! Files, directories and symlinks carry an owner, an rwx mode and timestamps.
//!
//! Pion's linear image layout:
//! - Header
//! - Block Bitmap
//! - Inode Bitmap
//! - Inode Table
//! - Padding up to a block boundary
//! - Data Blocks
//!
//! Pion's layers (from bottom to top):
//! 1. Block Device: byte addressed backing store.         `FileDisk` for image files, `MemDisk` for tests
//! 2. FileSystem: header, bitmaps and inode table.        Written through on every mutation
//! 3. Inode / Bitmap: allocation and inode chains.        First fit
//! 4. Directory / Path: entries, lookup and resolution.   Symlinks followed up to 16 levels
//! 5. File: append, read and truncate of contents.        Size kept on the chain head
//! 6. Lifecycle / Ops: creation, deletion, path helpers.  Permission checked per call

mod config;
mod block_dev;
mod structs;
mod header;
mod bitmap;
mod inode;
mod directory;
mod path;
mod file;
mod permission;
mod lifecycle;
mod ops;
mod fs;
mod error;

pub use block_dev::{BlockDevice, FileDisk, MemDisk};
pub use config::*;
pub use header::Header;
pub use structs::*;
pub use bitmap::Bitmap;
pub use inode::*;
pub use path::*;
pub use directory::*;
pub use permission::*;
pub use ops::*;
pub use fs::*;
pub use error::FsError as Error;
pub use error::Result;
