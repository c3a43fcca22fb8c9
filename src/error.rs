use thiserror::Error;

use crate::structs::{BlockId, InodeId};

#[derive(Debug, Error)]
pub enum FsError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Header magic, geometry or region offsets do not describe a valid image.
    #[error("corrupt filesystem: {0}")]
    CorruptFilesystem(String),

    #[error("not found")]
    NotFound,

    #[error("already exists")]
    AlreadyExists,

    /// A directory already holds an entry with this name and type.
    #[error("duplicate name")]
    DuplicateName,

    #[error("permission denied")]
    PermissionDenied,

    #[error("no free data blocks")]
    OutOfSpace,

    #[error("no free inodes")]
    OutOfInodes,

    #[error("directory not empty")]
    DirectoryNotEmpty,

    #[error("too many levels of symbolic links")]
    SymlinkLoop,

    #[error("not a directory")]
    NotDirectory,

    #[error("is a directory")]
    IsDirectory,

    #[error("not a regular file")]
    NotRegular,

    #[error("not a symbolic link")]
    NotSymlink,

    #[error("invalid file name")]
    InvalidName,

    #[error("buffer too small: need {needed} bytes, have {capacity}")]
    BufferTooSmall { needed: usize, capacity: usize },

    #[error("block {0} out of range")]
    BlockOutOfRange(BlockId),

    #[error("inode {0} out of range")]
    InodeOutOfRange(InodeId),
}

pub type Result<T> = core::result::Result<T, FsError>;
