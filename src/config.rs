pub const MAGIC: u32 = 0xF5F5_F5F5;

pub const DEFAULT_DISK_NAME: &str = "disk.dat";
pub const DISK_SIZE: u64 = 64 * 1024 * 1024; // 64 MiB
pub const BLOCK_SIZE: usize = 512;
pub const MAX_INODES: u32 = 128; // Default inode capacity
pub const INODE_SIZE: usize = 128;
pub const HEADER_SIZE: usize = 48; // 12 little-endian u32 fields

pub const ROOT_INODE_ID: u32 = 0; // Inode ID for the root directory
pub const ROOT_UID: u32 = 0; // Superuser
pub const ROOT_MARKER: char = '~';

pub const NAME_LEN: usize = 32; // Name field, NUL padded
pub const MAX_FILE_NAME_LEN: usize = NAME_LEN - 1;
pub const DIR_ENTRY_SIZE: usize = NAME_LEN + 4; // name + inode ID
pub const NUM_ENTRY_PER_BLOCK: usize = BLOCK_SIZE / DIR_ENTRY_SIZE;
pub const DOT_NAME: &str = ".";
pub const DOTDOT_NAME: &str = "..";

pub const NUM_DIRECT_PTRS: usize = 12; // Number of direct pointers in an inode
pub const NUM_RESERVED_DIR_SLOTS: usize = 2; // Head directory slots kept for '.' and '..'
pub const MAX_SYMLINK_DEPTH: usize = 16;
