//! # 磁盘块管理器层
//!
//! 构建出磁盘的布局并使用：格式化、挂载、inode 的分配与查询、一致性校验。

use alloc::sync::Arc;
use alloc::vec::Vec;

use block_dev::BlockDevice;
use spin::Mutex;

use crate::DataBlock;
use crate::allocator::BitmapAllocator;
use crate::block_cache::BlockCacheManager;
use crate::extent::Extent;
use crate::inode_table::InodeTable;
use crate::layout::{Bitmap, SuperBlock};
use crate::record::{InodeKind, InodeRecord};
use crate::{BLOCK_SIZE, BlockId, Error, InodeId, Result, Stat};

pub struct ExtentFileSystem {
    pub(crate) cache: BlockCacheManager,
    pub(crate) allocator: BitmapAllocator,
    pub(crate) inodes: InodeTable,
    data_start_block: usize,
    options: MountOptions,
}

/// 格式化参数
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FormatOptions {
    /// inode 槽位数，含保留的 0 号
    pub inode_count: u32,
    /// 数据块数
    pub block_count: u32,
}

/// 挂载参数
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MountOptions {
    pub size_policy: SizePolicy,
}

/// 写入后文件大小的更新方式
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SizePolicy {
    /// 大小置为本次写入的末尾，即使文件原本更大
    #[default]
    WriteEnd,
    /// 大小只增不减
    Extend,
}

/// [`ExtentFileSystem::verify`] 的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Report {
    pub inode_count: u32,
    pub block_count: u32,
    /// inode 位图中置位的数目，不含 0 号
    pub allocated_inodes: u32,
    /// 数据块位图中置位的数目
    pub allocated_blocks: u32,
    /// 所有 inode 的区段覆盖的块数
    pub mapped_blocks: u64,
    /// 存放溢出区段的块数
    pub overflow_blocks: u32,
    pub nr_free_inodes: u32,
    pub nr_free_blocks: u32,
}

impl FormatOptions {
    /// 整个文件系统占据的块数
    pub fn total_blocks(&self) -> usize {
        1 + Bitmap::blocks_for(self.inode_count as usize)
            + Bitmap::blocks_for(self.block_count as usize)
            + InodeTable::blocks_for(self.inode_count) as usize
            + self.block_count as usize
    }

    /// 按总块数反推数据块数，`inode_count` 保持不变
    pub fn fit(total_blocks: usize, inode_count: u32) -> Option<Self> {
        let metadata = 1 + Bitmap::blocks_for(inode_count as usize)
            + InodeTable::blocks_for(inode_count) as usize;
        let rest = total_blocks.checked_sub(metadata)?;
        // 每个位图块记录 BLOCK_BITS 个数据块，合计占 BLOCK_BITS + 1 块
        let bitmap_blocks = rest.div_ceil(crate::BLOCK_BITS + 1);
        let block_count = u32::try_from(rest - bitmap_blocks).ok()?;

        (block_count > 0).then_some(Self {
            inode_count,
            block_count,
        })
    }
}

impl Report {
    /// 计数与位图吻合，且没有泄漏的块
    pub fn is_consistent(&self) -> bool {
        self.nr_free_inodes + self.allocated_inodes + 1 == self.inode_count
            && self.nr_free_blocks + self.allocated_blocks == self.block_count
            && self.mapped_blocks + self.overflow_blocks as u64 == self.allocated_blocks as u64
    }

    /// 已分配却不属于任何 inode 的块数
    pub fn leaked_blocks(&self) -> u64 {
        (self.allocated_blocks as u64).saturating_sub(self.mapped_blocks + self.overflow_blocks as u64)
    }
}

impl ExtentFileSystem {
    pub fn format(
        block_device: Arc<dyn BlockDevice>,
        format: FormatOptions,
        options: MountOptions,
    ) -> Result<Arc<Mutex<Self>>> {
        // 0 号 inode 保留，至少还要一个可用的
        if format.inode_count < 2 || format.block_count == 0 {
            log::error!("nothing to allocate in {format:?}");
            return Err(Error::NoSpace);
        }

        let inode_bitmap_blocks = Bitmap::blocks_for(format.inode_count as usize) as u32;
        let block_bitmap_blocks = Bitmap::blocks_for(format.block_count as usize) as u32;
        let inode_area_blocks = InodeTable::blocks_for(format.inode_count);

        let mut super_block = SuperBlock::default();
        super_block.init(
            format.inode_count,
            format.block_count,
            inode_bitmap_blocks,
            block_bitmap_blocks,
            inode_area_blocks,
        );

        let cache = BlockCacheManager::new(block_device);
        for i in 0..super_block.total_blocks() {
            cache
                .get(i as usize)
                .lock()
                .map_mut(0, |data_block: &mut DataBlock| data_block.fill(0));
        }
        cache
            .get(0)
            .lock()
            .map_mut(0, |disk_super_block: &mut SuperBlock| {
                *disk_super_block = super_block
            });

        let mut efs = Self::mount(cache, &super_block, options);
        efs.allocator.reserve_root_slot(&efs.cache);
        efs.sync();

        log::info!(
            "formatted {} inodes and {} data blocks, data region starts at block {}",
            format.inode_count,
            format.block_count,
            super_block.data_start_block
        );
        Ok(Arc::new(Mutex::new(efs)))
    }

    pub fn open(block_device: Arc<dyn BlockDevice>, options: MountOptions) -> Result<Arc<Mutex<Self>>> {
        let cache = BlockCacheManager::new(block_device);
        let super_block = cache
            .get(0)
            .lock()
            .map(0, |super_block: &SuperBlock| *super_block);

        if !super_block.is_valid() {
            log::error!("bad super block: {super_block:?}");
            return Err(Error::Corrupted);
        }
        if super_block.nr_free_inodes >= super_block.inode_count
            || super_block.nr_free_blocks > super_block.block_count
        {
            log::error!("free counters exceed capacity: {super_block:?}");
            return Err(Error::Corrupted);
        }

        Ok(Arc::new(Mutex::new(Self::mount(cache, &super_block, options))))
    }

    fn mount(cache: BlockCacheManager, super_block: &SuperBlock, options: MountOptions) -> Self {
        let data_start_block = super_block.data_start_block as usize;

        Self {
            allocator: BitmapAllocator::new(
                Bitmap::new(
                    super_block.inode_bitmap_start() as usize,
                    super_block.inode_count as usize,
                ),
                Bitmap::new(
                    super_block.block_bitmap_start() as usize,
                    super_block.block_count as usize,
                ),
                data_start_block,
                super_block.nr_free_inodes,
                super_block.nr_free_blocks,
            ),
            inodes: InodeTable::new(
                super_block.inode_area_start() as usize,
                super_block.inode_count,
                data_start_block,
                super_block.block_count,
            ),
            cache,
            data_start_block,
            options,
        }
    }

    /// 空闲计数写回超级块，再把脏块写回设备
    pub fn sync(&mut self) {
        let (nr_free_inodes, nr_free_blocks) = (
            self.allocator.nr_free_inodes(),
            self.allocator.nr_free_blocks(),
        );
        self.cache
            .get(0)
            .lock()
            .map_mut(0, |super_block: &mut SuperBlock| {
                super_block.nr_free_inodes = nr_free_inodes;
                super_block.nr_free_blocks = nr_free_blocks;
            });
        self.cache.sync_all();
    }

    #[inline]
    pub fn block_device(&self) -> &Arc<dyn BlockDevice> {
        self.cache.block_device()
    }

    #[inline]
    pub fn options(&self) -> MountOptions {
        self.options
    }

    #[inline]
    pub fn set_size_policy(&mut self, size_policy: SizePolicy) {
        self.options.size_policy = size_policy;
    }

    #[inline]
    pub fn inode_count(&self) -> u32 {
        self.allocator.inode_count()
    }

    #[inline]
    pub fn block_count(&self) -> u32 {
        self.allocator.block_count()
    }

    #[inline]
    pub fn nr_free_inodes(&self) -> u32 {
        self.allocator.nr_free_inodes()
    }

    #[inline]
    pub fn nr_free_blocks(&self) -> u32 {
        self.allocator.nr_free_blocks()
    }

    /// 数据区内块号对应的设备块号
    #[inline]
    pub(crate) fn device_block(&self, block: BlockId) -> usize {
        self.data_start_block + block.get() as usize
    }

    /// 在磁盘上分配新的 inode 并写入空记录
    pub fn allocate_inode(&mut self, kind: InodeKind, perm: u32) -> Result<InodeId> {
        let id = self.allocator.allocate_inode(&self.cache)?;
        self.inodes
            .store(&self.cache, id, &InodeRecord::new(kind, perm))?;
        self.sync();

        log::debug!("allocated inode {}", id.get());
        Ok(id)
    }

    pub fn lookup_inode(&self, id: InodeId) -> Result<InodeRecord> {
        if !self.inodes.contains(id) || !self.allocator.is_inode_allocated(&self.cache, id) {
            return Err(Error::NotFound);
        }
        self.inodes.load(&self.cache, id)
    }

    /// 修改 inode 的元数据；区段表与大小只能经由读写改变。
    pub fn update_inode<V>(&mut self, id: InodeId, f: impl FnOnce(&mut InodeRecord) -> V) -> Result<V> {
        let mut record = self.lookup_inode(id)?;
        let (extents, overflow, size) = (record.extents.clone(), record.overflow.clone(), record.size);

        let value = f(&mut record);
        record.extents = extents;
        record.overflow = overflow;
        record.size = size;

        self.inodes.store(&self.cache, id, &record)?;
        self.sync();
        Ok(value)
    }

    pub fn stat(&self, id: InodeId) -> Result<Stat> {
        let record = self.lookup_inode(id)?;
        Ok(Stat {
            inode: id.get() as u64,
            mode: record.mode,
            links: record.links,
            block_size: BLOCK_SIZE as u64,
            blocks: record.extents.mapped_blocks(),
            size: record.size,
        })
    }

    /// 已分配的 inode 编号，升序
    pub fn allocated_inodes(&self) -> Vec<InodeId> {
        (1..self.inode_count())
            .map(InodeId::new)
            .filter(|&id| self.allocator.is_inode_allocated(&self.cache, id))
            .collect()
    }

    /// 分配一个贪心连续段，不属于任何 inode
    pub fn allocate_run(&mut self, needed: u32) -> Result<Extent> {
        let run = self.allocator.allocate_run(&self.cache, needed)?;
        self.sync();
        Ok(run)
    }

    /// 分配若干连续段，合计 `needed` 块；失败时不留下任何置位
    pub fn allocate_multiple(&mut self, needed: u32) -> Result<Vec<Extent>> {
        let extents = self
            .allocator
            .allocate_multiple(&self.cache, needed)?
            .commit();
        self.sync();
        Ok(extents)
    }

    /// 释放单个已分配的数据块并清零。
    ///
    /// 块号越出数据区或本就空闲时返回 [`Error::NotFound`]，设备不受影响。
    pub fn release(&mut self, block: BlockId) -> Result<()> {
        if !self.allocator.is_block_allocated(&self.cache, block) {
            log::warn!("block {} is not allocated", block.get());
            return Err(Error::NotFound);
        }

        self.allocator.release(&self.cache, block);
        self.sync();
        Ok(())
    }

    /// 重新数一遍两张位图，检查每个 inode 的区段表。
    ///
    /// 区段越界、指向未分配的块或者相互重叠时返回 [`Error::Corrupted`]；
    /// 计数漂移与泄漏的块记录在 [`Report`] 中。
    pub fn verify(&self) -> Result<Report> {
        let block_count = self.block_count();
        let mut extents = Vec::new();
        let mut mapped_blocks = 0;
        let mut overflow_blocks = 0;

        for id in self.allocated_inodes() {
            let record = self.inodes.load(&self.cache, id)?;
            if record.extents.mapped_blocks() < InodeRecord::count_data_block(record.size) {
                log::error!(
                    "inode {} maps {} blocks but holds {} bytes",
                    id.get(),
                    record.extents.mapped_blocks(),
                    record.size
                );
                return Err(Error::Corrupted);
            }

            for extent in record.extents.extents() {
                if extent.end().get() > block_count {
                    log::error!("inode {} has {extent:?} outside the data region", id.get());
                    return Err(Error::Corrupted);
                }
                if let Some(block) = extent
                    .blocks()
                    .find(|&block| !self.allocator.is_block_allocated(&self.cache, block))
                {
                    log::error!("inode {} maps free block {}", id.get(), block.get());
                    return Err(Error::Corrupted);
                }
                extents.push((*extent, id));
            }
            mapped_blocks += record.extents.mapped_blocks();

            // load 已检查过溢出块不越界
            if let Some(block) = record
                .overflow
                .iter()
                .find(|&&block| !self.allocator.is_block_allocated(&self.cache, block))
            {
                log::error!("inode {} keeps extents in free block {}", id.get(), block.get());
                return Err(Error::Corrupted);
            }
            extents.extend(record.overflow.iter().map(|&block| (Extent::new(block, 1), id)));
            overflow_blocks += record.overflow.len() as u32;
        }

        extents.sort_unstable_by_key(|(extent, _)| extent.start);
        if let Some(pair) = extents.windows(2).find(|pair| pair[0].0.overlaps(&pair[1].0)) {
            log::error!(
                "inode {} and inode {} share blocks",
                pair[0].1.get(),
                pair[1].1.get()
            );
            return Err(Error::Corrupted);
        }

        let report = Report {
            inode_count: self.inode_count(),
            block_count,
            allocated_inodes: (self.allocator.inode_bitmap().count_ones(&self.cache) as u32)
                .saturating_sub(1),
            allocated_blocks: self.allocator.block_bitmap().count_ones(&self.cache) as u32,
            mapped_blocks,
            overflow_blocks,
            nr_free_inodes: self.nr_free_inodes(),
            nr_free_blocks: self.nr_free_blocks(),
        };
        if !report.is_consistent() {
            log::warn!("inconsistent file system: {report:?}");
        }
        Ok(report)
    }
}
