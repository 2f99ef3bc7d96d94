mod common;

use std::sync::Arc;

use extent_fs::{
    BLOCK_SIZE, BlockId, Error, Extent, ExtentFileSystem, File, FormatOptions, Inode, InodeId,
    InodeKind, MountOptions, SeekFrom, SizePolicy,
};

use common::{RamDisk, device, format, pattern};

#[test]
fn unlink_releases_inode_and_blocks() {
    let efs = format(3, 10, SizePolicy::WriteEnd);
    let first = Inode::create(&efs, InodeKind::File, 0o644).unwrap();
    let second = Inode::create(&efs, InodeKind::File, 0o644).unwrap();
    assert_eq!(InodeId::new(1), first.id());
    assert_eq!(InodeId::new(2), second.id());
    assert_eq!(
        Err(Error::NoSpace),
        Inode::create(&efs, InodeKind::File, 0o644).map(|inode| inode.id())
    );

    first.write_at(0, &pattern(3000, 1)).unwrap();
    assert_eq!(4, efs.lock().nr_free_blocks());

    let id = first.id();
    let stale = Inode::open(&efs, id).unwrap();
    first.unlink().unwrap();
    assert_eq!(10, efs.lock().nr_free_blocks());
    assert_eq!(1, efs.lock().nr_free_inodes());

    assert_eq!(Err(Error::NotFound), efs.lock().lookup_inode(id));
    assert_eq!(Err(Error::NotFound), stale.stat());
    assert_eq!(Err(Error::NotFound), stale.unlink());

    let reused = Inode::create(&efs, InodeKind::File, 0o644).unwrap();
    assert_eq!(id, reused.id());
    assert_eq!(0, reused.size().unwrap());
    assert_eq!(1, reused.record().unwrap().links);
}

#[test]
fn lookup_bounds() {
    let efs = format(4, 10, SizePolicy::WriteEnd);
    let efs = efs.lock();
    assert_eq!(Err(Error::NotFound), efs.lookup_inode(InodeId::new(0)));
    assert_eq!(Err(Error::NotFound), efs.lookup_inode(InodeId::new(1)));
    assert_eq!(Err(Error::NotFound), efs.lookup_inode(InodeId::new(4)));
    assert_eq!(Err(Error::NotFound), efs.lookup_inode(InodeId::new(u32::MAX)));
}

#[test]
fn stat_and_metadata() {
    let efs = format(4, 10, SizePolicy::WriteEnd);
    let inode = Inode::create(&efs, InodeKind::Directory, 0o755).unwrap();
    inode.write_at(0, &pattern(700, 2)).unwrap();

    let stat = inode.stat().unwrap();
    assert_eq!(inode.id().get() as u64, stat.inode);
    assert_eq!(0o040755, stat.mode);
    assert_eq!(1, stat.links);
    assert_eq!(BLOCK_SIZE as u64, stat.block_size);
    assert_eq!(2, stat.blocks);
    assert_eq!(700, stat.size);

    let id = inode.id();
    let old_uid = efs
        .lock()
        .update_inode(id, |record| {
            record.size = 1;
            std::mem::replace(&mut record.uid, 1000)
        })
        .unwrap();
    assert_eq!(0, old_uid);

    let record = inode.record().unwrap();
    assert_eq!(1000, record.uid);
    assert_eq!(700, record.size);
    assert!(record.is_dir());
}

#[test]
fn allocator_contract() {
    let efs = format(2, 6, SizePolicy::WriteEnd);
    let mut efs = efs.lock();

    assert_eq!(
        vec![Extent::new(BlockId::new(0), 6)],
        efs.allocate_multiple(6).unwrap()
    );
    assert_eq!(Err(Error::NoSpace), efs.allocate_run(1));
    assert_eq!(Err(Error::NoSpace), efs.allocate_multiple(1));

    assert_eq!(Ok(()), efs.release(BlockId::new(4)));
    assert_eq!(1, efs.nr_free_blocks());
    assert_eq!(Ok(Extent::new(BlockId::new(4), 1)), efs.allocate_run(3));
    assert_eq!(Err(Error::NoSpace), efs.allocate_run(1));

    for block in 0..6 {
        efs.release(BlockId::new(block)).unwrap();
    }
    assert_eq!(6, efs.nr_free_blocks());
}

#[test]
fn release_rejects_unallocated_blocks() {
    let efs = format(4, 10, SizePolicy::WriteEnd);
    let inode = Inode::create(&efs, InodeKind::File, 0o644).unwrap();
    let data = pattern(BLOCK_SIZE, 6);
    inode.write_at(0, &data).unwrap();

    let mut efs = efs.lock();
    assert_eq!(Err(Error::NotFound), efs.release(BlockId::new(3)));
    assert_eq!(Err(Error::NotFound), efs.release(BlockId::new(10)));
    assert_eq!(Err(Error::NotFound), efs.release(BlockId::new(u32::MAX)));
    assert_eq!(9, efs.nr_free_blocks());
    assert!(efs.verify().unwrap().is_consistent());

    // 文件的数据块没有被清零
    let mut buf = vec![0; BLOCK_SIZE];
    assert_eq!(Ok(BLOCK_SIZE), efs.read(inode.id(), 0, BLOCK_SIZE, &mut buf[..]));
    assert_eq!(data, buf);

    let run = efs.allocate_run(1).unwrap();
    assert_eq!(Ok(()), efs.release(run.start));
    assert_eq!(Err(Error::NotFound), efs.release(run.start));
    assert_eq!(9, efs.nr_free_blocks());
}

#[test]
fn format_rejects_empty_layout() {
    for (inode_count, block_count) in [(1, 10), (0, 10), (4, 0)] {
        let options = FormatOptions {
            inode_count,
            block_count,
        };
        assert_eq!(
            Some(Error::NoSpace),
            ExtentFileSystem::format(device(options), options, MountOptions::default()).err()
        );
    }
}

#[test]
fn reopen_keeps_data_and_counters() {
    let options = FormatOptions {
        inode_count: 8,
        block_count: 32,
    };
    let disk = device(options);
    let data = pattern(2 * BLOCK_SIZE + 100, 3);

    let (id, free_blocks) = {
        let efs = ExtentFileSystem::format(disk.clone(), options, MountOptions::default()).unwrap();
        let inode = Inode::create(&efs, InodeKind::File, 0o600).unwrap();
        inode.write_at(0, &data).unwrap();
        let free_blocks = efs.lock().nr_free_blocks();
        (inode.id(), free_blocks)
    };

    let efs = ExtentFileSystem::open(disk, MountOptions::default()).unwrap();
    assert_eq!(free_blocks, efs.lock().nr_free_blocks());
    assert_eq!(6, efs.lock().nr_free_inodes());
    assert_eq!(vec![id], efs.lock().allocated_inodes());

    let inode = Inode::open(&efs, id).unwrap();
    let mut buf = vec![0; data.len()];
    assert_eq!(Ok(data.len()), inode.read_at(0, &mut buf));
    assert_eq!(data, buf);

    // 重新挂载后继续分配，不会与已有的块重叠
    let other = Inode::create(&efs, InodeKind::File, 0o600).unwrap();
    other.write_at(0, &pattern(BLOCK_SIZE, 4)).unwrap();
    assert_eq!(vec![Extent::new(BlockId::new(3), 1)], other.extents().unwrap());
    assert!(efs.lock().verify().unwrap().is_consistent());
}

#[test]
fn open_rejects_unformatted_device() {
    let disk: Arc<RamDisk> = Arc::new(RamDisk::new(16));
    assert_eq!(
        Some(Error::Corrupted),
        ExtentFileSystem::open(disk, MountOptions::default()).err()
    );
}

#[test]
fn verify_reports_leaked_block() {
    let efs = format(4, 10, SizePolicy::WriteEnd);
    let inode = Inode::create(&efs, InodeKind::File, 0o644).unwrap();
    inode.write_at(0, &pattern(1500, 5)).unwrap();

    let report = efs.lock().verify().unwrap();
    assert!(report.is_consistent());
    assert_eq!(1, report.allocated_inodes);
    assert_eq!(3, report.mapped_blocks);

    efs.lock().allocate_run(1).unwrap();
    let report = efs.lock().verify().unwrap();
    assert!(!report.is_consistent());
    assert_eq!(1, report.leaked_blocks());
}

#[test]
fn fit_uses_whole_image() {
    let options = FormatOptions::fit(2048, 64).unwrap();
    assert_eq!(64, options.inode_count);
    assert!(options.total_blocks() <= 2048);
    assert!(options.total_blocks() >= 2047);
    assert_eq!(None, FormatOptions::fit(4, 64));
}

#[test]
fn file_cursor() {
    let efs = format(4, 16, SizePolicy::Extend);
    let mut file = File::new(Inode::create(&efs, InodeKind::File, 0o644).unwrap());

    assert_eq!(Ok(5), file.write(b"hello"));
    assert_eq!(Ok(6), file.write(b" world"));
    assert_eq!(11, file.offset());

    assert_eq!(Ok(0), file.seek(SeekFrom::Start(0)));
    let mut buf = [0u8; 5];
    assert_eq!(Ok(5), file.read(&mut buf));
    assert_eq!(b"hello", &buf);

    assert_eq!(Ok(6), file.seek(SeekFrom::Current(1)));
    assert_eq!(Ok(5), file.read(&mut buf));
    assert_eq!(b"world", &buf);
    assert_eq!(Ok(0), file.read(&mut buf));

    assert_eq!(Ok(9), file.seek(SeekFrom::End(-2)));
    assert_eq!(Ok(2), file.read(&mut buf));
    assert_eq!(b"ld", &buf[..2]);

    assert_eq!(Err(Error::Fault), file.seek(SeekFrom::Current(-100)));
    assert_eq!(11, file.offset());
}
