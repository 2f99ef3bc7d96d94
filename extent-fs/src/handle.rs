//! # 句柄层
//!
//! [`Inode`] 绑定共享文件系统中的一个 inode，每次操作都持有文件系统的锁直到结束；
//! [`File`] 在其上加一个字节游标。

use alloc::sync::Arc;
use alloc::vec::Vec;

use spin::Mutex;

use crate::efs::ExtentFileSystem;
use crate::extent::Extent;
use crate::io::WriteError;
use crate::record::{InodeKind, InodeRecord};
use crate::{Error, InodeId, Result, Stat};

pub struct Inode {
    id: InodeId,
    fs: Arc<Mutex<ExtentFileSystem>>,
}

/// 游标的定位方式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeekFrom {
    Start(u64),
    End(i64),
    Current(i64),
}

pub struct File {
    inode: Inode,
    offset: u64,
}

impl Inode {
    /// 分配一个新的 inode
    pub fn create(fs: &Arc<Mutex<ExtentFileSystem>>, kind: InodeKind, perm: u32) -> Result<Self> {
        let id = fs.lock().allocate_inode(kind, perm)?;
        Ok(Self {
            id,
            fs: fs.clone(),
        })
    }

    /// 打开已分配的 inode
    pub fn open(fs: &Arc<Mutex<ExtentFileSystem>>, id: InodeId) -> Result<Self> {
        fs.lock().lookup_inode(id)?;
        Ok(Self {
            id,
            fs: fs.clone(),
        })
    }

    #[inline]
    pub fn id(&self) -> InodeId {
        self.id
    }

    pub fn read_at(&self, offset: usize, buf: &mut [u8]) -> Result<usize> {
        let len = buf.len();
        self.fs.lock().read(self.id, offset, len, buf)
    }

    pub fn write_at(&self, offset: usize, buf: &[u8]) -> core::result::Result<usize, WriteError> {
        self.fs.lock().write(self.id, offset, buf.len(), buf)
    }

    pub fn clear(&self) -> Result<()> {
        self.fs.lock().clear(self.id)
    }

    /// 释放 inode；同一编号的其它句柄此后都会得到 [`Error::NotFound`]
    pub fn unlink(self) -> Result<()> {
        self.fs.lock().unlink(self.id)
    }

    pub fn stat(&self) -> Result<Stat> {
        self.fs.lock().stat(self.id)
    }

    pub fn record(&self) -> Result<InodeRecord> {
        self.fs.lock().lookup_inode(self.id)
    }

    /// 已填充的区段，按逻辑顺序
    pub fn extents(&self) -> Result<Vec<Extent>> {
        let record = self.record()?;
        Ok(record.extents.extents().copied().collect())
    }

    pub fn size(&self) -> Result<u64> {
        self.record().map(|record| record.size)
    }
}

impl File {
    #[inline]
    pub fn new(inode: Inode) -> Self {
        Self { inode, offset: 0 }
    }

    #[inline]
    pub fn inode(&self) -> &Inode {
        &self.inode
    }

    #[inline]
    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let read = self.inode.read_at(self.cursor()?, buf)?;
        self.offset += read as u64;
        Ok(read)
    }

    /// 失败时游标也前进已写入的字节数
    pub fn write(&mut self, buf: &[u8]) -> core::result::Result<usize, WriteError> {
        match self.inode.write_at(self.cursor()?, buf) {
            Ok(written) => {
                self.offset += written as u64;
                Ok(written)
            }
            Err(error) => {
                self.offset += error.written as u64;
                Err(error)
            }
        }
    }

    /// 定位到负偏移时返回 [`Error::Fault`]，游标不变
    pub fn seek(&mut self, pos: SeekFrom) -> Result<u64> {
        let offset = match pos {
            SeekFrom::Start(offset) => Some(offset),
            SeekFrom::End(delta) => self.inode.size()?.checked_add_signed(delta),
            SeekFrom::Current(delta) => self.offset.checked_add_signed(delta),
        }
        .ok_or(Error::Fault)?;

        self.offset = offset;
        Ok(offset)
    }

    /// 游标超出地址空间时视作错误的调用者位置
    fn cursor(&self) -> Result<usize> {
        usize::try_from(self.offset).map_err(|_| Error::Fault)
    }
}
