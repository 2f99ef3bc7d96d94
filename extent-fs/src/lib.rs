#![no_std]

extern crate alloc;

/* extent-fs 的整体架构，自上而下 */

// 句柄层：对外提供绑定到某个 inode 的读写、打开文件的游标
mod handle;

// 文件读写层：按块循环传输，按需扩张区段表
mod io;

// 磁盘块管理器层：格式化、挂载、校验
mod efs;

// inode 目录：编号到磁盘 inode 的定位与读写
mod inode_table;

// 位图分配器：空闲块与空闲 inode 的唯一记账者
mod allocator;

// 区段表与地址翻译
mod extent;

// inode 元数据记录
mod record;

// 调用者缓冲区
mod buffer;

// 磁盘数据结构层：表示磁盘文件系统的数据结构
mod layout;

// 块缓存层：内存上的磁盘块数据缓存
mod block_cache;

pub use self::{
    buffer::{UserBuffer, UserBufferMut},
    efs::{ExtentFileSystem, FormatOptions, MountOptions, Report, SizePolicy},
    extent::{Extent, ExtentTable, Mapping, Slot, translate},
    io::WriteError,
    layout::{DiskExtent, DiskInode, ExtentBlock, SuperBlock},
    record::{InodeKind, InodeRecord},
    handle::{File, Inode, SeekFrom},
};
pub use block_dev::BlockDevice;
pub use vfs::{Error, Stat};

pub const MAGIC: u32 = 0x3b80_e7f5;
pub const BLOCK_SIZE: usize = 512;
pub const BLOCK_BITS: usize = BLOCK_SIZE * 8;
/// 磁盘 inode 内联保存的区段个数，更多的区段进入溢出块
pub const INLINE_EXTENTS: usize = 24;

type DataBlock = [u8; BLOCK_SIZE];

pub type Result<T> = core::result::Result<T, Error>;

/// 数据区内的块编号（相对数据区起点）
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    derive_more::From,
    derive_more::Into,
    derive_more::Add,
)]
#[repr(transparent)]
pub struct BlockId(u32);

/// inode 编号，0 号保留不分配
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, derive_more::From, derive_more::Into,
)]
#[repr(transparent)]
pub struct InodeId(u32);

impl BlockId {
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    #[inline]
    pub const fn get(self) -> u32 {
        self.0
    }
}

impl core::ops::Add<u32> for BlockId {
    type Output = Self;

    fn add(self, rhs: u32) -> Self::Output {
        self + Self(rhs)
    }
}

impl InodeId {
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    #[inline]
    pub const fn get(self) -> u32 {
        self.0
    }
}
