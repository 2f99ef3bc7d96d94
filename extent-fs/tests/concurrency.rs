mod common;

use std::thread;

use extent_fs::{BLOCK_SIZE, Inode, InodeKind, SizePolicy};

use common::{format, pattern};

#[test]
fn handles_share_one_file_system() {
    let efs = format(16, 512, SizePolicy::Extend);

    let workers: Vec<_> = (0..4u8)
        .map(|seed| {
            let efs = efs.clone();
            thread::spawn(move || {
                let inode = Inode::create(&efs, InodeKind::File, 0o644).unwrap();
                let chunk = pattern(BLOCK_SIZE + 17, seed);
                for round in 0..12 {
                    let offset = round * chunk.len();
                    assert_eq!(Ok(chunk.len()), inode.write_at(offset, &chunk));
                }

                let mut buf = vec![0; chunk.len()];
                for round in 0..12 {
                    assert_eq!(Ok(chunk.len()), inode.read_at(round * chunk.len(), &mut buf));
                    assert_eq!(chunk, buf);
                }
                inode.id()
            })
        })
        .collect();

    let ids: Vec<_> = workers
        .into_iter()
        .map(|worker| worker.join().unwrap())
        .collect();

    let report = efs.lock().verify().unwrap();
    assert!(report.is_consistent());
    assert_eq!(4, report.allocated_inodes);

    // 回收其中一半，计数随之恢复
    let blocks_per_file = (12 * (BLOCK_SIZE + 17)).div_ceil(BLOCK_SIZE) as u32;
    for &id in &ids[..2] {
        Inode::open(&efs, id).unwrap().unlink().unwrap();
    }
    let efs = efs.lock();
    assert_eq!(512 - 2 * blocks_per_file, efs.nr_free_blocks());
    assert!(efs.verify().unwrap().is_consistent());
}
