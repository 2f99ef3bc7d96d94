//! # 磁盘数据结构层
//!
//! extent-fs 的磁盘布局：
//! 超级块 | 索引节点位图 | 数据块位图 | 索引节点区域 | 数据块区域

mod super_block;
pub use super_block::SuperBlock;

mod bitmap;
pub use bitmap::Bitmap;

mod inode;
pub use inode::{DiskExtent, DiskInode, ExtentBlock};
