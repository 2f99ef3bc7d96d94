#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use extent_fs::{
    BLOCK_SIZE, BlockDevice, ExtentFileSystem, FormatOptions, MountOptions, SizePolicy,
};

pub struct RamDisk(Mutex<Vec<u8>>);

impl RamDisk {
    pub fn new(blocks: usize) -> Self {
        Self(Mutex::new(vec![0; blocks * BLOCK_SIZE]))
    }
}

impl BlockDevice for RamDisk {
    fn read_block(&self, block_id: usize, buf: &mut [u8]) {
        let disk = self.0.lock().unwrap();
        buf.copy_from_slice(&disk[block_id * BLOCK_SIZE..(block_id + 1) * BLOCK_SIZE]);
    }

    fn write_block(&self, block_id: usize, buf: &[u8]) {
        let mut disk = self.0.lock().unwrap();
        disk[block_id * BLOCK_SIZE..(block_id + 1) * BLOCK_SIZE].copy_from_slice(buf);
    }
}

pub fn device(format: FormatOptions) -> Arc<dyn BlockDevice> {
    Arc::new(RamDisk::new(format.total_blocks()))
}

pub fn format(
    inode_count: u32,
    block_count: u32,
    size_policy: SizePolicy,
) -> Arc<spin::Mutex<ExtentFileSystem>> {
    let format = FormatOptions {
        inode_count,
        block_count,
    };
    ExtentFileSystem::format(device(format), format, MountOptions { size_policy }).unwrap()
}

/// 可辨认的测试数据
pub fn pattern(len: usize, seed: u8) -> Vec<u8> {
    (0..len)
        .map(|i| ((i as u32).wrapping_mul(2_654_435_761) >> 24) as u8 ^ seed)
        .collect()
}
