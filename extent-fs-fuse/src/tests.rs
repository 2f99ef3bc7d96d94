use std::fs::{self, OpenOptions};
use std::path::PathBuf;
use std::sync::Arc;

use extent_fs::{
    BLOCK_SIZE, BlockDevice, ExtentFileSystem, FormatOptions, Inode, InodeKind, MountOptions,
};

use crate::BlockFile;

fn image(name: &str, blocks: usize) -> (PathBuf, Arc<dyn BlockDevice>) {
    let path = std::env::temp_dir().join(format!("{name}-{}.img", std::process::id()));
    let fd = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(true)
        .open(&path)
        .unwrap();
    fd.set_len((blocks * BLOCK_SIZE) as u64).unwrap();

    (path, Arc::new(BlockFile::new(fd)))
}

#[test]
fn image_survives_reopen() {
    let format = FormatOptions {
        inode_count: 16,
        block_count: 64,
    };
    let (path, block_file) = image("extent-fs-reopen", format.total_blocks());

    let data: Vec<u8> = (0..3000).map(|i| (i % 251) as u8).collect();
    let id = {
        let efs = ExtentFileSystem::format(block_file.clone(), format, MountOptions::default()).unwrap();
        let inode = Inode::create(&efs, InodeKind::File, 0o644).unwrap();
        assert_eq!(Ok(data.len()), inode.write_at(0, &data));
        inode.id()
    };

    let efs = ExtentFileSystem::open(block_file, MountOptions::default()).unwrap();
    let inode = Inode::open(&efs, id).unwrap();
    let mut buf = vec![0; 4096];
    assert_eq!(Ok(data.len()), inode.read_at(0, &mut buf));
    assert_eq!(data[..], buf[..data.len()]);

    let report = efs.lock().verify().unwrap();
    assert!(report.is_consistent());
    assert_eq!(6, report.allocated_blocks);

    fs::remove_file(path).unwrap();
}

#[test]
fn garbage_image_is_rejected() {
    let (path, block_file) = image("extent-fs-garbage", 8);
    block_file.write_block(0, &[0xFF; BLOCK_SIZE]);

    assert!(ExtentFileSystem::open(block_file, MountOptions::default()).is_err());
    fs::remove_file(path).unwrap();
}
