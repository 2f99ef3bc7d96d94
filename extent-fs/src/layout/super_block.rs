use crate::{BLOCK_SIZE, MAGIC};

/// 超级块：
/// - 提供文件系统合法性校验；
/// - 定位其它连续区域；
/// - 保存空闲计数。
#[derive(Debug, Default, Clone, Copy)]
#[repr(C)]
pub struct SuperBlock {
    /// 魔数：用于校验文件系统合法性
    magic: u32,
    block_size: u32,
    /// inode 槽位总数，含保留的 0 号
    pub inode_count: u32,
    /// 数据块总数
    pub block_count: u32,
    pub inode_bitmap_blocks: u32,
    pub block_bitmap_blocks: u32,
    pub inode_area_blocks: u32,
    /// 数据区的起始块
    pub data_start_block: u32,
    pub nr_free_inodes: u32,
    pub nr_free_blocks: u32,
}

impl SuperBlock {
    #[inline]
    pub fn init(
        &mut self,
        inode_count: u32,
        block_count: u32,
        inode_bitmap_blocks: u32,
        block_bitmap_blocks: u32,
        inode_area_blocks: u32,
    ) {
        *self = Self {
            magic: MAGIC,
            block_size: BLOCK_SIZE as u32,
            inode_count,
            block_count,
            inode_bitmap_blocks,
            block_bitmap_blocks,
            inode_area_blocks,
            data_start_block: 1 + inode_bitmap_blocks + block_bitmap_blocks + inode_area_blocks,
            nr_free_inodes: inode_count,
            nr_free_blocks: block_count,
        };
    }

    #[inline]
    pub fn is_valid(&self) -> bool {
        self.magic == MAGIC && self.block_size == BLOCK_SIZE as u32
    }

    /// 索引节点位图的起始块
    #[inline]
    pub fn inode_bitmap_start(&self) -> u32 {
        1
    }

    #[inline]
    pub fn block_bitmap_start(&self) -> u32 {
        1 + self.inode_bitmap_blocks
    }

    #[inline]
    pub fn inode_area_start(&self) -> u32 {
        1 + self.inode_bitmap_blocks + self.block_bitmap_blocks
    }

    /// 整个文件系统占据的块数
    #[inline]
    pub fn total_blocks(&self) -> u32 {
        self.data_start_block + self.block_count
    }
}
