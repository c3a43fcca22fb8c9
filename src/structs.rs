use core::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use bitflags::bitflags;

use crate::config::*;
use crate::Error;
use crate::Result;

/// Index into the inode table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct InodeId(pub u32);

/// Index into the data region (not an absolute device block).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BlockId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Uid(pub u32);

impl InodeId {
    pub const ROOT: Self = Self(ROOT_INODE_ID);

    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl BlockId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl Uid {
    pub const ROOT: Self = Self(ROOT_UID);

    pub fn is_superuser(self) -> bool {
        self == Self::ROOT
    }
}

impl fmt::Display for InodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for Uid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileType {
    Regular = 0,
    Directory = 1,
    Symlink = 2,
}

impl FileType {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Regular),
            1 => Some(Self::Directory),
            2 => Some(Self::Symlink),
            _ => None,
        }
    }

    /// One-letter tag used in listings.
    pub fn tag(self) -> char {
        match self {
            Self::Regular => 'f',
            Self::Directory => 'd',
            Self::Symlink => 'l',
        }
    }
}

/// Type filter for directory lookups.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    Regular,
    Directory,
    /// Matches any entry, same as `Any`.
    Symlink,
    Any,
    /// A directory, or a symlink that may lead to one.
    Traversable,
}

impl EntryKind {
    pub fn matches(self, ftype: FileType) -> bool {
        match self {
            Self::Regular => ftype == FileType::Regular,
            Self::Directory => ftype == FileType::Directory,
            Self::Symlink | Self::Any => true,
            Self::Traversable => matches!(ftype, FileType::Directory | FileType::Symlink),
        }
    }
}

impl From<FileType> for EntryKind {
    fn from(ftype: FileType) -> Self {
        match ftype {
            FileType::Regular => Self::Regular,
            FileType::Directory => Self::Directory,
            FileType::Symlink => Self::Symlink,
        }
    }
}

bitflags! {
    /// One rwx triplet.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct Permission: u8 {
        const EXEC = 1 << 0;
        const WRITE = 1 << 1;
        const READ = 1 << 2;

        const RX = Self::READ.bits() | Self::EXEC.bits();
        const RW = Self::READ.bits() | Self::WRITE.bits();
        const RWX = Self::READ.bits() | Self::WRITE.bits() | Self::EXEC.bits();
    }
}

/// Owner, group and other triplets packed as `0o[owner][group][other]`.
/// The group triplet is stored but never consulted by the permission gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Mode(u16);

impl Mode {
    pub const NONE: Self = Self(0);
    /// rwxr-xr-x
    pub const DEFAULT: Self = Self(0o755);
    /// rwxrwxrwx
    pub const FULL: Self = Self(0o777);

    pub const fn new(owner: Permission, group: Permission, other: Permission) -> Self {
        Self(((owner.bits() as u16) << 6) | ((group.bits() as u16) << 3) | other.bits() as u16)
    }

    pub const fn from_bits(bits: u16) -> Self {
        Self(bits & 0o777)
    }

    pub const fn bits(self) -> u16 {
        self.0
    }

    pub fn owner(self) -> Permission {
        Permission::from_bits_truncate(((self.0 >> 6) & 0o7) as u8)
    }

    pub fn group(self) -> Permission {
        Permission::from_bits_truncate(((self.0 >> 3) & 0o7) as u8)
    }

    pub fn other(self) -> Permission {
        Permission::from_bits_truncate((self.0 & 0o7) as u8)
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for triplet in [self.owner(), self.group(), self.other()] {
            let r = if triplet.contains(Permission::READ) { 'r' } else { '-' };
            let w = if triplet.contains(Permission::WRITE) { 'w' } else { '-' };
            let x = if triplet.contains(Permission::EXEC) { 'x' } else { '-' };
            write!(f, "{r}{w}{x}")?;
        }
        Ok(())
    }
}

/// Seconds since the Unix epoch, clamped to zero for clocks set before it.
pub fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

// Little-endian field helpers shared by the on-disk codecs.

pub(crate) fn get_u16(buf: &[u8], off: usize) -> u16 {
    let mut b = [0u8; 2];
    b.copy_from_slice(&buf[off..off + 2]);
    u16::from_le_bytes(b)
}

pub(crate) fn get_u32(buf: &[u8], off: usize) -> u32 {
    let mut b = [0u8; 4];
    b.copy_from_slice(&buf[off..off + 4]);
    u32::from_le_bytes(b)
}

pub(crate) fn get_u64(buf: &[u8], off: usize) -> u64 {
    let mut b = [0u8; 8];
    b.copy_from_slice(&buf[off..off + 8]);
    u64::from_le_bytes(b)
}

pub(crate) fn put_u16(buf: &mut [u8], off: usize, value: u16) {
    buf[off..off + 2].copy_from_slice(&value.to_le_bytes());
}

pub(crate) fn put_u32(buf: &mut [u8], off: usize, value: u32) {
    buf[off..off + 4].copy_from_slice(&value.to_le_bytes());
}

pub(crate) fn put_u64(buf: &mut [u8], off: usize, value: u64) {
    buf[off..off + 8].copy_from_slice(&value.to_le_bytes());
}

pub fn trim_zero(name: &[u8]) -> &[u8] {
    let mut end = name.len();
    while end > 0 && name[end - 1] == 0 {
        end -= 1;
    }
    &name[..end]
}

/// Checks that `name` can be stored as a single path component.
pub fn validate_name(name: &str) -> Result<()> {
    if name.is_empty()
        || name.len() > MAX_FILE_NAME_LEN
        || name.contains('/')
        || name.contains('\0')
        || name == DOT_NAME
        || name == DOTDOT_NAME
    {
        return Err(Error::InvalidName);
    }
    Ok(())
}

/// Copies `name` into a NUL padded name field.
/// Dot entries are accepted here, validation happens at the API boundary.
pub fn encode_name(name: &str) -> Result<[u8; NAME_LEN]> {
    let bytes = name.as_bytes();
    if bytes.is_empty() || bytes.len() > MAX_FILE_NAME_LEN {
        return Err(Error::InvalidName);
    }
    let mut arr = [0; NAME_LEN];
    arr[..bytes.len()].copy_from_slice(bytes);
    Ok(arr)
}

const NO_LINK_TARGET: u32 = u32::MAX;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Inode {
    pub ftype: FileType,
    pub mode: Mode,
    pub name: [u8; NAME_LEN],
    pub creator_uid: Uid,
    pub owner_uid: Uid,
    /// Logical byte count; only meaningful on the head of a chain.
    pub size: u64,
    pub created: i64,
    pub modified: i64,
    pub direct_ptrs: [Option<BlockId>; NUM_DIRECT_PTRS],
    pub next_inode: Option<InodeId>,
    pub link_target: Option<InodeId>,
}

impl Inode {
    /// A zeroed record, as found in a free inode slot.
    pub const EMPTY: Self = Self {
        ftype: FileType::Regular,
        mode: Mode::NONE,
        name: [0; NAME_LEN],
        creator_uid: Uid(0),
        owner_uid: Uid(0),
        size: 0,
        created: 0,
        modified: 0,
        direct_ptrs: [None; NUM_DIRECT_PTRS],
        next_inode: None,
        link_target: None,
    };

    pub fn name(&self) -> String {
        String::from_utf8_lossy(trim_zero(&self.name)).into_owned()
    }

    pub fn is_dir(&self) -> bool {
        self.ftype == FileType::Directory
    }

    pub fn blocks(&self) -> impl Iterator<Item = BlockId> + '_ {
        self.direct_ptrs.iter().flatten().copied()
    }

    pub fn encode(&self, buf: &mut [u8]) {
        buf[..INODE_SIZE].fill(0);
        buf[0] = self.ftype as u8;
        put_u16(buf, 2, self.mode.bits());
        buf[4..4 + NAME_LEN].copy_from_slice(&self.name);
        put_u32(buf, 36, self.creator_uid.0);
        put_u32(buf, 40, self.owner_uid.0);
        put_u64(buf, 44, self.size);
        put_u64(buf, 52, self.created as u64);
        put_u64(buf, 60, self.modified as u64);
        for (i, ptr) in self.direct_ptrs.iter().enumerate() {
            put_u32(buf, 68 + i * 4, ptr.map_or(0, |b| b.0));
        }
        put_u32(buf, 116, self.next_inode.map_or(0, |n| n.0));
        put_u32(buf, 120, self.link_target.map_or(NO_LINK_TARGET, |t| t.0));
    }

    pub fn decode(buf: &[u8]) -> Result<Self> {
        let ftype = FileType::from_u8(buf[0]).ok_or_else(|| {
            Error::CorruptFilesystem(format!("unknown inode type {}", buf[0]))
        })?;
        let mut name = [0u8; NAME_LEN];
        name.copy_from_slice(&buf[4..4 + NAME_LEN]);
        let mut direct_ptrs = [None; NUM_DIRECT_PTRS];
        for (i, ptr) in direct_ptrs.iter_mut().enumerate() {
            let raw = get_u32(buf, 68 + i * 4);
            *ptr = (raw != 0).then_some(BlockId(raw));
        }
        let next = get_u32(buf, 116);
        let link = get_u32(buf, 120);
        Ok(Self {
            ftype,
            mode: Mode::from_bits(get_u16(buf, 2)),
            name,
            creator_uid: Uid(get_u32(buf, 36)),
            owner_uid: Uid(get_u32(buf, 40)),
            size: get_u64(buf, 44),
            created: get_u64(buf, 52) as i64,
            modified: get_u64(buf, 60) as i64,
            direct_ptrs,
            next_inode: (next != 0).then_some(InodeId(next)),
            link_target: (link != NO_LINK_TARGET).then_some(InodeId(link)),
        })
    }
}

/// Fixed-size (name, inode) record inside a directory block.
/// A slot is free when its name is empty; the root's own '.' and '..'
/// records legitimately carry inode 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DirEntry {
    pub inode_id: InodeId,
    pub name: [u8; NAME_LEN],
}

impl DirEntry {
    pub const NULL: Self = Self {
        inode_id: InodeId(0),
        name: [0; NAME_LEN],
    };

    pub fn new(inode_id: InodeId, name: &str) -> Result<Self> {
        Ok(Self {
            inode_id,
            name: encode_name(name)?,
        })
    }

    pub fn name(&self) -> String {
        String::from_utf8_lossy(trim_zero(&self.name)).into_owned()
    }

    pub fn encode(&self, buf: &mut [u8]) {
        buf[..NAME_LEN].copy_from_slice(&self.name);
        put_u32(buf, NAME_LEN, self.inode_id.0);
    }

    pub fn decode(buf: &[u8]) -> Self {
        let mut name = [0u8; NAME_LEN];
        name.copy_from_slice(&buf[..NAME_LEN]);
        Self {
            inode_id: InodeId(get_u32(buf, NAME_LEN)),
            name,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_inode_codec() {
        let mut inode = Inode::EMPTY;
        inode.ftype = FileType::Symlink;
        inode.mode = Mode::DEFAULT;
        inode.name = encode_name("link").unwrap();
        inode.owner_uid = Uid(7);
        inode.size = 1 << 33;
        inode.direct_ptrs[3] = Some(BlockId(42));
        inode.next_inode = Some(InodeId(9));
        inode.link_target = Some(InodeId::ROOT);

        let mut buf = [0u8; INODE_SIZE];
        inode.encode(&mut buf);
        assert_eq!(Inode::decode(&buf).unwrap(), inode);
    }

    #[test]
    fn test_zeroed_record_is_empty_inode() {
        let decoded = Inode::decode(&[0u8; INODE_SIZE]).unwrap();
        assert_eq!(decoded.ftype, FileType::Regular);
        assert_eq!(decoded.blocks().count(), 0);
        assert_eq!(decoded.next_inode, None);
    }

    #[test]
    fn test_unknown_type_is_corrupt() {
        let mut buf = [0u8; INODE_SIZE];
        buf[0] = 9;
        assert!(matches!(Inode::decode(&buf), Err(Error::CorruptFilesystem(_))));
    }

    #[test]
    fn test_mode_display() {
        assert_eq!(Mode::DEFAULT.to_string(), "rwxr-xr-x");
        assert_eq!(Mode::new(Permission::RW, Permission::empty(), Permission::READ).to_string(), "rw----r--");
        assert_eq!(Mode::DEFAULT.group(), Permission::RX);
    }

    #[test]
    fn test_validate_name() {
        assert!(validate_name("passwd").is_ok());
        assert!(validate_name("").is_err());
        assert!(validate_name(".").is_err());
        assert!(validate_name("..").is_err());
        assert!(validate_name("a/b").is_err());
        assert!(validate_name(&"x".repeat(MAX_FILE_NAME_LEN)).is_ok());
        assert!(validate_name(&"x".repeat(MAX_FILE_NAME_LEN + 1)).is_err());
    }

    #[test]
    fn test_entry_kind_matching() {
        assert!(EntryKind::Any.matches(FileType::Regular));
        assert!(EntryKind::Symlink.matches(FileType::Directory));
        assert!(!EntryKind::Directory.matches(FileType::Symlink));
        assert!(EntryKind::Traversable.matches(FileType::Symlink));
        assert!(!EntryKind::Traversable.matches(FileType::Regular));
    }
}
