use alloc::vec::Vec;

use enumflags2::{BitFlags, bitflags};

use crate::{BLOCK_SIZE, BlockId};
use crate::extent::ExtentTable;

/// `mode` 中的类型位
#[bitflags]
#[repr(u32)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum InodeKind {
    Directory = 0o040000,
    #[default]
    File = 0o100000,
}

/// 解码后的 inode 元数据
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InodeRecord {
    /// 类型位与权限位
    pub mode: u32,
    pub uid: u32,
    pub gid: u32,
    /// 硬链接个数
    pub links: u32,
    /// 文件的逻辑字节数
    pub size: u64,
    pub atime: u64,
    pub mtime: u64,
    pub ctime: u64,
    pub extents: ExtentTable,
    /// 存放内联槽位之外区段的溢出块，按链表顺序
    pub overflow: Vec<BlockId>,
}

impl InodeKind {
    /// 类型位所占的掩码
    pub const MASK: u32 = 0o170000;
}

impl InodeRecord {
    pub fn new(kind: InodeKind, perm: u32) -> Self {
        Self {
            mode: kind as u32 | (perm & !InodeKind::MASK),
            links: 1,
            ..Default::default()
        }
    }

    /// 类型位不合法时返回空
    pub fn kind(&self) -> Option<InodeKind> {
        BitFlags::<InodeKind>::from_bits_truncate(self.mode & InodeKind::MASK).exactly_one()
    }

    #[inline]
    pub fn is_dir(&self) -> bool {
        self.kind() == Some(InodeKind::Directory)
    }

    /// 容纳 `size` 字节需要多少个数据块
    #[inline]
    pub fn count_data_block(size: u64) -> u64 {
        size.div_ceil(BLOCK_SIZE as u64)
    }
}
