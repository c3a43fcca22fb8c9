//! Common utilities for tests

#![allow(unused)]

use pion::{FileSystem, FsOptions, MemDisk, Uid};

pub const ORANGE: &str = "\x1b[38;5;214m";
pub const RESET: &str = "\x1b[0m";

pub const ALICE: Uid = Uid(1000);
pub const BOB: Uid = Uid(1001);

/// Provides a macro for logging messages during tests.
/// e.g. log!("placeholder") -> println!("[test] placeholder");
#[macro_export]
macro_rules! log {
    ($msg:expr) => {
        println!("{}[test] {}{}", crate::common::ORANGE, $msg, crate::common::RESET)
    };
    ($msg:expr, $($arg:tt)*) => {
        println!("{}[test] {}{}", crate::common::ORANGE, format!($msg, $($arg)*), crate::common::RESET)
    };
}

/// A freshly formatted 1 MiB in-memory image with the default inode capacity.
pub fn small_fs() -> FileSystem<MemDisk> {
    fs_with_inodes(pion::MAX_INODES)
}

pub fn fs_with_inodes(inode_capacity: u32) -> FileSystem<MemDisk> {
    let options = FsOptions {
        disk_size: 1 << 20,
        inode_capacity,
    };
    FileSystem::format(MemDisk::new(options.disk_size), options).unwrap()
}

/// `len` bytes of a repeating, position dependent pattern.
pub fn pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}
