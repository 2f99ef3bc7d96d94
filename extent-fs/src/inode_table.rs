//! # inode 目录
//!
//! 以编号定位磁盘 inode：**块ID**以及**块内偏移**。
//! 只负责编解码与读写，编号是否已分配由位图决定。
//!
//! 超出内联槽位的区段沿溢出块链表读写，溢出块由调用者预先分配。

use alloc::vec::Vec;

use crate::block_cache::BlockCacheManager;
use crate::extent::Extent;
use crate::layout::{DiskInode, ExtentBlock};
use crate::record::InodeRecord;
use crate::{BLOCK_SIZE, BlockId, Error, INLINE_EXTENTS, InodeId, Result};

const INODES_PER_BLOCK: usize = BLOCK_SIZE / DiskInode::SIZE;

#[derive(Debug, Clone, Copy)]
pub struct InodeTable {
    start_block_id: usize,
    inode_count: u32,
    /// 溢出块位于数据区
    data_start_block: usize,
    block_count: u32,
}

impl InodeTable {
    #[inline]
    pub fn new(
        start_block_id: usize,
        inode_count: u32,
        data_start_block: usize,
        block_count: u32,
    ) -> Self {
        Self {
            start_block_id,
            inode_count,
            data_start_block,
            block_count,
        }
    }

    /// 容纳 `inode_count` 个 inode 需要多少块
    #[inline]
    pub fn blocks_for(inode_count: u32) -> u32 {
        (inode_count as usize).div_ceil(INODES_PER_BLOCK) as u32
    }

    /// 0 号保留，不算在内
    #[inline]
    pub fn contains(&self, id: InodeId) -> bool {
        id.get() != 0 && id.get() < self.inode_count
    }

    pub fn disk_inode_pos(&self, id: InodeId) -> (usize, usize) {
        let id = id.get() as usize;
        let block_id = self.start_block_id + id / INODES_PER_BLOCK;
        let block_inoffset = id % INODES_PER_BLOCK * DiskInode::SIZE;

        (block_id, block_inoffset)
    }

    pub fn load(&self, cache: &BlockCacheManager, id: InodeId) -> Result<InodeRecord> {
        let (block_id, block_offset) = self.disk_inode_pos(id);
        let disk_inode = cache
            .get(block_id)
            .lock()
            .map(block_offset, |disk_inode: &DiskInode| *disk_inode);

        // 槽位数不可能多于数据块数
        if disk_inode.capacity() > self.block_count
            || disk_inode.extent_count() > disk_inode.capacity()
        {
            log::error!(
                "inode {} claims {} extents in {} slots on {} data blocks",
                id.get(),
                disk_inode.extent_count(),
                disk_inode.capacity(),
                self.block_count
            );
            return Err(Error::Corrupted);
        }

        let mut spilled = Vec::new();
        let mut overflow = Vec::new();
        let mut next = disk_inode.overflow_head();
        while let Some(block) = next {
            if block.get() >= self.block_count || overflow.len() >= disk_inode.overflow_blocks() {
                log::error!("inode {} has a broken overflow chain at block {}", id.get(), block.get());
                return Err(Error::Corrupted);
            }

            next = cache
                .get(self.device_block(block))
                .lock()
                .map(0, |extent_block: &ExtentBlock| -> Result<Option<BlockId>> {
                    spilled.extend_from_slice(extent_block.extents()?);
                    Ok(extent_block.next())
                })?;
            overflow.push(block);
        }

        disk_inode.decode(&spilled, overflow)
    }

    /// 写回记录，`record.overflow` 必须恰好容纳溢出的区段
    pub fn store(&self, cache: &BlockCacheManager, id: InodeId, record: &InodeRecord) -> Result<()> {
        let extents: Vec<Extent> = record.extents.extents().copied().collect();
        if record.overflow.len() != ExtentBlock::blocks_for(extents.len()) {
            log::error!(
                "inode {} holds {} extents but {} overflow blocks",
                id.get(),
                extents.len(),
                record.overflow.len()
            );
            return Err(Error::Corrupted);
        }

        let spilled = extents.get(INLINE_EXTENTS..).unwrap_or(&[]);
        for (i, chunk) in spilled.chunks(ExtentBlock::CAPACITY).enumerate() {
            let next = record.overflow.get(i + 1).copied();
            cache
                .get(self.device_block(record.overflow[i]))
                .lock()
                .map_mut(0, |extent_block: &mut ExtentBlock| {
                    extent_block.encode(next, chunk)
                });
        }

        let (block_id, block_offset) = self.disk_inode_pos(id);
        cache
            .get(block_id)
            .lock()
            .map_mut(block_offset, |disk_inode: &mut DiskInode| {
                disk_inode.encode(record)
            });
        Ok(())
    }

    #[inline]
    fn device_block(&self, block: BlockId) -> usize {
        self.data_start_block + block.get() as usize
    }
}

#[cfg(test)]
mod tests {
    use alloc::sync::Arc;
    use alloc::vec;

    use block_dev::BlockDevice;
    use spin::Mutex;

    use super::*;
    use crate::extent::{ExtentTable, Slot};
    use crate::record::InodeKind;

    struct RamDisk(Mutex<Vec<u8>>);

    impl BlockDevice for RamDisk {
        fn read_block(&self, block_id: usize, buf: &mut [u8]) {
            let disk = self.0.lock();
            buf.copy_from_slice(&disk[block_id * BLOCK_SIZE..(block_id + 1) * BLOCK_SIZE]);
        }

        fn write_block(&self, block_id: usize, buf: &[u8]) {
            let mut disk = self.0.lock();
            disk[block_id * BLOCK_SIZE..(block_id + 1) * BLOCK_SIZE].copy_from_slice(buf);
        }
    }

    /// 块 0 放两个 inode，块 1 起为 32 块的数据区
    fn setup() -> (BlockCacheManager, InodeTable) {
        let disk = RamDisk(Mutex::new(vec![0; 33 * BLOCK_SIZE]));
        (BlockCacheManager::new(Arc::new(disk)), InodeTable::new(0, 2, 1, 32))
    }

    #[test]
    fn capacity_beyond_data_region_is_corrupted() {
        let (cache, table) = setup();
        let id = InodeId::new(1);
        let mut record = InodeRecord::new(InodeKind::File, 0o644);
        record.extents.reserve(3);
        table.store(&cache, id, &record).unwrap();
        assert_eq!(Ok(record), table.load(&cache, id));

        // capacity 位于磁盘 inode 的第 48 字节
        let (block_id, block_offset) = table.disk_inode_pos(id);
        cache
            .get(block_id)
            .lock()
            .map_mut(block_offset + 48, |capacity: &mut u32| *capacity = u32::MAX);
        assert_eq!(Err(Error::Corrupted), table.load(&cache, id));
    }

    #[test]
    fn spilled_extents_round_trip_through_chain() {
        let (cache, table) = setup();
        let id = InodeId::new(1);
        let slots = (0..INLINE_EXTENTS as u32 + 2)
            .map(|i| Slot::Populated(Extent::new(BlockId::new(i), 1)))
            .collect();
        let record = InodeRecord {
            extents: ExtentTable::from_slots(slots).unwrap(),
            overflow: vec![BlockId::new(30)],
            ..Default::default()
        };

        assert_eq!(
            Err(Error::Corrupted),
            table.store(&cache, id, &InodeRecord {
                overflow: Vec::new(),
                ..record.clone()
            })
        );
        table.store(&cache, id, &record).unwrap();
        assert_eq!(Ok(record), table.load(&cache, id));

        // 溢出块指回自身，链表长度超出区段数所需
        cache
            .get(1 + 30)
            .lock()
            .map_mut(0, |next: &mut u32| *next = 31);
        assert_eq!(Err(Error::Corrupted), table.load(&cache, id));
    }
}
