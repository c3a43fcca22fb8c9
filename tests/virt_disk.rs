mod common;

use std::fs::OpenOptions;
use std::io::{Seek, SeekFrom, Write};

use common::{pattern, ALICE};
use pion::*;

const DISK_SIZE: u64 = 2 << 20;

fn options() -> FsOptions {
    FsOptions {
        disk_size: DISK_SIZE,
        inode_capacity: MAX_INODES,
    }
}

#[test]
fn test_initialize_creates_image() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join(DEFAULT_DISK_NAME);

    let fs = FileSystem::<FileDisk>::initialize(&path, options()).unwrap();
    assert_eq!(std::fs::metadata(&path).unwrap().len(), DISK_SIZE);
    let header = *fs.header();
    log!("formatted header: {:?}", header);
    assert_eq!(header.magic, MAGIC);
    assert_eq!(header.off_data_region as usize % BLOCK_SIZE, 0);
    fs.unmount().unwrap();

    // The second call finds the image and mounts it.
    let fs = FileSystem::<FileDisk>::initialize(&path, FsOptions::default()).unwrap();
    assert_eq!(*fs.header(), header);
}

#[test]
fn test_contents_survive_remount() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join(DEFAULT_DISK_NAME);
    let data = pattern(NUM_DIRECT_PTRS * BLOCK_SIZE + 777);

    let (file, usage) = {
        let mut fs = FileSystem::<FileDisk>::initialize(&path, options()).unwrap();
        let cwd = fs.root_inode_id();
        let file = fs.write_file("home/alice/data.bin", &data, WriteMode::Truncate, cwd, ALICE).unwrap();
        fs.symlink("home/alice/data.bin", "latest", cwd, ALICE).unwrap();
        let usage = fs.usage();
        fs.unmount().unwrap();
        (file, usage)
    };

    let fs = FileSystem::mount(FileDisk::open(&path).unwrap()).unwrap();
    assert_eq!(fs.usage(), usage);
    assert_eq!(fs.resolve("~/latest", InodeId::ROOT).unwrap(), file);
    assert_eq!(fs.read_file("/home/alice/data.bin", InodeId::ROOT, ALICE).unwrap(), data);
    let stat = fs.stat(file).unwrap();
    assert_eq!(stat.owner_uid, ALICE);
    assert_eq!(stat.chain_len, 2);
}

#[test]
fn test_every_mutation_is_durable() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join(DEFAULT_DISK_NAME);

    let mut fs = FileSystem::<FileDisk>::initialize(&path, options()).unwrap();
    fs.make_directory("etc", InodeId::ROOT, Uid::ROOT).unwrap();
    fs.write_file("etc/hostname", b"pion\n", WriteMode::Truncate, InodeId::ROOT, Uid::ROOT).unwrap();

    // Mount a second view of the same file without unmounting the first.
    let other = FileSystem::mount(FileDisk::open(&path).unwrap()).unwrap();
    assert_eq!(other.read_file("etc/hostname", InodeId::ROOT, Uid::ROOT).unwrap(), b"pion\n");
}

#[test]
fn test_bad_magic_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join(DEFAULT_DISK_NAME);
    FileSystem::<FileDisk>::initialize(&path, options()).unwrap().unmount().unwrap();

    let mut file = OpenOptions::new().write(true).open(&path).unwrap();
    file.seek(SeekFrom::Start(0)).unwrap();
    file.write_all(&0xDEAD_BEEFu32.to_le_bytes()).unwrap();
    drop(file);

    let err = FileSystem::mount(FileDisk::open(&path).unwrap()).unwrap_err();
    log!("mount error: {}", err);
    assert!(matches!(err, Error::CorruptFilesystem(_)));
}

#[test]
fn test_truncated_image_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join(DEFAULT_DISK_NAME);
    FileSystem::<FileDisk>::initialize(&path, options()).unwrap().unmount().unwrap();

    let file = OpenOptions::new().write(true).open(&path).unwrap();
    file.set_len(DISK_SIZE / 2).unwrap();
    drop(file);

    assert!(matches!(
        FileSystem::mount(FileDisk::open(&path).unwrap()),
        Err(Error::CorruptFilesystem(_))
    ));
}

#[test]
fn test_missing_image_cannot_be_opened() {
    let dir = tempfile::tempdir().unwrap();
    assert!(matches!(FileDisk::open(dir.path().join("absent.dat")), Err(Error::Io(_))));
}

#[test]
fn test_memdisk_snapshot_remount() {
    let mut fs = FileSystem::format(MemDisk::new(1 << 20), FsOptions::default()).unwrap();
    fs.write_file("a/b", b"snapshot", WriteMode::Truncate, InodeId::ROOT, ALICE).unwrap();
    let image = fs.unmount().unwrap().snapshot();

    let fs = FileSystem::mount(MemDisk::from_bytes(image)).unwrap();
    assert_eq!(fs.read_file("a/b", InodeId::ROOT, ALICE).unwrap(), b"snapshot");
}
