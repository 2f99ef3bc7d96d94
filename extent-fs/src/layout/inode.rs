//! 磁盘上的 inode 记录
//!
//! 区段表在磁盘上只保存**容量**与已填充的区段，
//! 解码时其余槽位还原为预留槽位。
//!
//! 前 [`INLINE_EXTENTS`] 个区段内联在 inode 中，
//! 其余的依次存放在数据区的溢出块里，溢出块串成单链表。

use alloc::vec::Vec;

use crate::extent::{Extent, ExtentTable, Slot};
use crate::record::InodeRecord;
use crate::{BlockId, Error, INLINE_EXTENTS, Result};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[repr(C)]
pub struct DiskExtent {
    pub start: u32,
    pub length: u32,
}

#[derive(Debug, Default, Clone, Copy)]
#[repr(C)]
pub struct DiskInode {
    pub mode: u32,
    pub uid: u32,
    pub gid: u32,
    /// 硬链接个数
    pub links: u32,
    // 不用usize是为了严控布局
    pub size: u64,
    pub atime: u64,
    pub mtime: u64,
    pub ctime: u64,
    /// 区段表的槽位数
    capacity: u32,
    /// 已填充的区段数，含溢出块中的
    extent_count: u32,
    /// 首个溢出块的数据区块号加一，0 表示没有
    overflow: u32,
    _reserved: u32,
    extents: [DiskExtent; INLINE_EXTENTS],
}

/// 溢出块：放不进 inode 的区段
#[derive(Debug, Clone, Copy)]
#[repr(C)]
pub struct ExtentBlock {
    /// 下一个溢出块的数据区块号加一，0 表示链表结束
    next: u32,
    count: u32,
    extents: [DiskExtent; ExtentBlock::CAPACITY],
}

/// 数据区块号加一后存盘，0 留作空
#[inline]
fn encode_link(block: Option<BlockId>) -> u32 {
    block.map_or(0, |block| block.get() + 1)
}

#[inline]
fn decode_link(raw: u32) -> Option<BlockId> {
    raw.checked_sub(1).map(BlockId::new)
}

impl From<&DiskExtent> for Extent {
    fn from(extent: &DiskExtent) -> Self {
        Extent::new(BlockId::new(extent.start), extent.length)
    }
}

impl From<&Extent> for DiskExtent {
    fn from(extent: &Extent) -> Self {
        DiskExtent {
            start: extent.start.get(),
            length: extent.length,
        }
    }
}

impl DiskInode {
    pub const SIZE: usize = core::mem::size_of::<Self>();

    #[inline]
    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    #[inline]
    pub fn extent_count(&self) -> u32 {
        self.extent_count
    }

    #[inline]
    pub fn overflow_head(&self) -> Option<BlockId> {
        decode_link(self.overflow)
    }

    /// 记录中的区段需要多少溢出块
    #[inline]
    pub fn overflow_blocks(&self) -> usize {
        ExtentBlock::blocks_for(self.extent_count as usize)
    }

    /// 还原记录。`spilled` 为溢出块中依次读出的区段，`overflow` 为这些溢出块。
    pub fn decode(&self, spilled: &[DiskExtent], overflow: Vec<BlockId>) -> Result<InodeRecord> {
        let capacity = self.capacity as usize;
        let extent_count = self.extent_count as usize;
        if extent_count > capacity {
            log::error!("inode record holds {extent_count} extents with capacity {capacity}");
            return Err(Error::Corrupted);
        }
        if spilled.len() != extent_count.saturating_sub(INLINE_EXTENTS)
            || overflow.len() != self.overflow_blocks()
        {
            log::error!(
                "inode record holds {extent_count} extents but {} spilled in {} blocks",
                spilled.len(),
                overflow.len()
            );
            return Err(Error::Corrupted);
        }

        let mut slots: Vec<Slot> = self.extents[..extent_count.min(INLINE_EXTENTS)]
            .iter()
            .chain(spilled)
            .map(|extent| Slot::Populated(extent.into()))
            .collect();
        slots.resize(capacity, Slot::Reserved);

        Ok(InodeRecord {
            mode: self.mode,
            uid: self.uid,
            gid: self.gid,
            links: self.links,
            size: self.size,
            atime: self.atime,
            mtime: self.mtime,
            ctime: self.ctime,
            extents: ExtentTable::from_slots(slots)?,
            overflow,
        })
    }

    /// 写回记录本身；溢出的区段由调用者写进 `record.overflow`。
    pub fn encode(&mut self, record: &InodeRecord) {
        let mut extents = [DiskExtent::default(); INLINE_EXTENTS];
        for (disk, extent) in extents.iter_mut().zip(record.extents.extents()) {
            *disk = extent.into();
        }

        *self = Self {
            mode: record.mode,
            uid: record.uid,
            gid: record.gid,
            links: record.links,
            size: record.size,
            atime: record.atime,
            mtime: record.mtime,
            ctime: record.ctime,
            capacity: record.extents.capacity() as u32,
            extent_count: record.extents.extent_count() as u32,
            overflow: encode_link(record.overflow.first().copied()),
            _reserved: 0,
            extents,
        };
    }
}

impl ExtentBlock {
    pub const CAPACITY: usize = 63;

    /// 存放 `extent_count` 个区段需要多少溢出块
    #[inline]
    pub fn blocks_for(extent_count: usize) -> usize {
        extent_count.saturating_sub(INLINE_EXTENTS).div_ceil(Self::CAPACITY)
    }

    #[inline]
    pub fn next(&self) -> Option<BlockId> {
        decode_link(self.next)
    }

    pub fn extents(&self) -> Result<&[DiskExtent]> {
        self.extents.get(..self.count as usize).ok_or_else(|| {
            log::error!("overflow block claims {} extents", self.count);
            Error::Corrupted
        })
    }

    pub fn encode(&mut self, next: Option<BlockId>, extents: &[Extent]) {
        debug_assert!(extents.len() <= Self::CAPACITY);

        self.next = encode_link(next);
        self.count = extents.len() as u32;
        for (disk, extent) in self.extents.iter_mut().zip(extents) {
            *disk = extent.into();
        }
    }
}
