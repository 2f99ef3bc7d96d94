//! # 位图分配器
//!
//! 管理空闲数据块位图与空闲 inode 位图，是唯一改动空闲计数的地方。
//! 空闲计数随每次分配、释放增量维护，从不通过扫描重算。
//!
//! 数据块按**贪心连续段**分配：找到第一个空闲位后，
//! 一路吞下紧随其后的空闲位，直到凑够或撞上已分配位。

use alloc::vec::Vec;
use core::mem;

use crate::block_cache::BlockCacheManager;
use crate::extent::Extent;
use crate::layout::Bitmap;
use crate::{BlockId, Error, InodeId, Result};

pub struct BitmapAllocator {
    inode_bitmap: Bitmap,
    block_bitmap: Bitmap,
    /// 数据区的起始块，释放数据块时据此清零
    data_start_block: usize,
    nr_free_inodes: u32,
    nr_free_blocks: u32,
}

/// 一次多段分配的作用域。
///
/// 未调用 [`Allocation::commit`] 就被丢弃时，已置位的块全部释放。
pub struct Allocation<'a> {
    allocator: &'a mut BitmapAllocator,
    cache: &'a BlockCacheManager,
    extents: Vec<Extent>,
}

impl BitmapAllocator {
    pub fn new(
        inode_bitmap: Bitmap,
        block_bitmap: Bitmap,
        data_start_block: usize,
        nr_free_inodes: u32,
        nr_free_blocks: u32,
    ) -> Self {
        Self {
            inode_bitmap,
            block_bitmap,
            data_start_block,
            nr_free_inodes,
            nr_free_blocks,
        }
    }

    #[inline]
    pub fn inode_count(&self) -> u32 {
        self.inode_bitmap.bits() as u32
    }

    #[inline]
    pub fn block_count(&self) -> u32 {
        self.block_bitmap.bits() as u32
    }

    #[inline]
    pub fn nr_free_inodes(&self) -> u32 {
        self.nr_free_inodes
    }

    #[inline]
    pub fn nr_free_blocks(&self) -> u32 {
        self.nr_free_blocks
    }

    #[inline]
    pub fn inode_bitmap(&self) -> &Bitmap {
        &self.inode_bitmap
    }

    #[inline]
    pub fn block_bitmap(&self) -> &Bitmap {
        &self.block_bitmap
    }

    /// 保留 0 号 inode，只在格式化时调用
    pub fn reserve_root_slot(&mut self, cache: &BlockCacheManager) {
        self.inode_bitmap.set(cache, 0);
        self.nr_free_inodes -= 1;
    }

    /// 自 1 号起线性扫描第一个空闲 inode 槽位
    pub fn allocate_inode(&mut self, cache: &BlockCacheManager) -> Result<InodeId> {
        let Some(index) = self.inode_bitmap.find_clear(cache, 1) else {
            log::error!("no free inode available");
            return Err(Error::NoSpace);
        };

        self.inode_bitmap.set(cache, index);
        self.nr_free_inodes -= 1;
        Ok(InodeId::new(index as u32))
    }

    pub fn release_inode(&mut self, cache: &BlockCacheManager, id: InodeId) {
        self.inode_bitmap.clear(cache, id.get() as usize);
        self.nr_free_inodes += 1;
    }

    pub fn is_inode_allocated(&self, cache: &BlockCacheManager, id: InodeId) -> bool {
        (id.get() as usize) < self.inode_bitmap.bits() && self.inode_bitmap.test(cache, id.get() as usize)
    }

    pub fn is_block_allocated(&self, cache: &BlockCacheManager, block: BlockId) -> bool {
        (block.get() as usize) < self.block_bitmap.bits()
            && self.block_bitmap.test(cache, block.get() as usize)
    }

    /// 自 0 号块起分配一个贪心连续段，长度在 `1..=needed` 之间。
    pub fn allocate_run(&mut self, cache: &BlockCacheManager, needed: u32) -> Result<Extent> {
        if needed == 0 {
            return Err(Error::NoSpace);
        }
        self.claim_run(cache, 0, needed).ok_or_else(|| {
            log::error!("no free data block available");
            Error::NoSpace
        })
    }

    /// 反复贪心分配连续段，直到累计 `needed` 块。
    ///
    /// 设备耗尽时，已置位的块全部回滚，计数恢复原值。
    pub fn allocate_multiple<'a>(
        &'a mut self,
        cache: &'a BlockCacheManager,
        needed: u32,
    ) -> Result<Allocation<'a>> {
        let mut allocation = Allocation {
            allocator: self,
            cache,
            extents: Vec::new(),
        };
        allocation.extend(needed)?;
        Ok(allocation)
    }

    /// 释放单个数据块并清零其内容
    pub fn release(&mut self, cache: &BlockCacheManager, block: BlockId) {
        cache
            .get(self.data_start_block + block.get() as usize)
            .lock()
            .zeroize();
        self.block_bitmap.clear(cache, block.get() as usize);
        self.nr_free_blocks += 1;
    }

    /// 自 `from` 起找到第一个空闲块，吞下其后紧邻的空闲块，最多 `max` 块。
    fn claim_run(&mut self, cache: &BlockCacheManager, from: usize, max: u32) -> Option<Extent> {
        let start = self.block_bitmap.find_clear(cache, from)?;
        let bits = self.block_bitmap.bits();

        let mut length = 0;
        while length < max as usize
            && start + length < bits
            && !self.block_bitmap.test(cache, start + length)
        {
            self.block_bitmap.set(cache, start + length);
            length += 1;
        }

        self.nr_free_blocks -= length as u32;
        Some(Extent::new(BlockId::new(start as u32), length as u32))
    }
}

impl Allocation<'_> {
    #[inline]
    pub fn extents(&self) -> &[Extent] {
        &self.extents
    }

    /// 在同一作用域内再分配 `needed` 块，返回新增的区段。
    ///
    /// 失败时已置位的块留在作用域中，随作用域一并回滚。
    pub fn extend(&mut self, needed: u32) -> Result<&[Extent]> {
        if needed > self.allocator.nr_free_blocks {
            log::error!(
                "need {needed} data blocks but only {} are free",
                self.allocator.nr_free_blocks
            );
            return Err(Error::NoSpace);
        }

        let first = self.extents.len();
        let mut from = 0;
        let mut collected = 0;
        while collected < needed {
            let Some(extent) = self.allocator.claim_run(self.cache, from, needed - collected) else {
                // 空闲计数与位图不符
                log::error!("data bitmap exhausted after {collected} of {needed} blocks");
                return Err(Error::NoSpace);
            };

            from = extent.end().get() as usize;
            collected += extent.length;
            self.extents.push(extent);
        }

        log::debug!(
            "allocated {needed} blocks as {} extents",
            self.extents.len() - first
        );
        Ok(&self.extents[first..])
    }

    /// 确认分配，交出区段
    pub fn commit(mut self) -> Vec<Extent> {
        mem::take(&mut self.extents)
    }
}

impl Drop for Allocation<'_> {
    fn drop(&mut self) {
        if self.extents.is_empty() {
            return;
        }

        log::warn!("rolling back {} extents", self.extents.len());
        for extent in mem::take(&mut self.extents) {
            for block in extent.blocks() {
                self.allocator.release(self.cache, block);
            }
        }
    }
}
