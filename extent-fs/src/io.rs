//! # 文件读写层
//!
//! 读写都按块循环：每轮翻译当前逻辑块，搬运不超过块尾的字节，
//! 所以跨越区段边界的传输总是正确的。

use core::{fmt, mem};

use crate::buffer::{UserBuffer, UserBufferMut};
use crate::efs::{ExtentFileSystem, SizePolicy};
use crate::layout::ExtentBlock;
use crate::record::InodeRecord;
use crate::{BLOCK_SIZE, DataBlock, Error, InodeId, Result};

/// 写入中途失败，`written` 为失败前已写入的字节数
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteError {
    pub error: Error,
    pub written: usize,
}

impl From<Error> for WriteError {
    #[inline]
    fn from(error: Error) -> Self {
        Self { error, written: 0 }
    }
}

impl fmt::Display for WriteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} after {} bytes", self.error, self.written)
    }
}

impl core::error::Error for WriteError {
    fn source(&self) -> Option<&(dyn core::error::Error + 'static)> {
        Some(&self.error)
    }
}

/// 块内的一段传输
struct Chunk {
    logical_block: u32,
    /// 块内偏移
    block_offset: usize,
    len: usize,
    /// 在本次传输中的偏移
    done: usize,
}

/// 把 `[start, end)` 切分为不跨块的若干段
fn chunks(start: usize, end: usize) -> impl Iterator<Item = Chunk> {
    let mut pos = start;
    core::iter::from_fn(move || {
        (pos < end).then(|| {
            let block_offset = pos % BLOCK_SIZE;
            let chunk = Chunk {
                logical_block: (pos / BLOCK_SIZE) as u32,
                block_offset,
                len: (end - pos).min(BLOCK_SIZE - block_offset),
                done: pos - start,
            };
            pos += chunk.len;
            chunk
        })
    })
}

impl ExtentFileSystem {
    /// 读取 `[offset, offset + len)` 到 `dst`，越过文件末尾的部分不读。
    pub fn read<B: UserBufferMut + ?Sized>(
        &self,
        id: InodeId,
        offset: usize,
        len: usize,
        dst: &mut B,
    ) -> Result<usize> {
        let record = self.lookup_inode(id)?;
        if record.extents.extent_count() == 0 || offset as u64 >= record.size {
            return Ok(0);
        }
        let end = (offset as u64).saturating_add(len as u64).min(record.size) as usize;

        for chunk in chunks(offset, end) {
            let block = record
                .extents
                .translate(chunk.logical_block)
                .ok_or(Error::Corrupted)?
                .block;
            self.cache.get(self.device_block(block)).lock().map(
                0,
                |data_block: &DataBlock| {
                    let range = chunk.block_offset..chunk.block_offset + chunk.len;
                    dst.write_from(chunk.done, &data_block[range])
                },
            )?;
        }

        Ok(end - offset)
    }

    /// 把 `src` 的前 `len` 个字节写到 `offset` 处，按需扩张。
    ///
    /// 空间不足时一个字节也不写；搬运中途失败时，大小的更新保留。
    pub fn write<B: UserBuffer + ?Sized>(
        &mut self,
        id: InodeId,
        offset: usize,
        len: usize,
        src: &B,
    ) -> core::result::Result<usize, WriteError> {
        let mut record = self.lookup_inode(id)?;
        if len == 0 {
            return Ok(0);
        }

        let end = offset.checked_add(len).ok_or(Error::NoSpace)?;
        self.ensure_capacity(id, &mut record, end as u64)?;

        record.size = match self.options().size_policy {
            SizePolicy::WriteEnd => end as u64,
            SizePolicy::Extend => record.size.max(end as u64),
        };
        self.inodes.store(&self.cache, id, &record)?;

        let mut written = 0;
        for chunk in chunks(offset, end) {
            let copied = record
                .extents
                .translate(chunk.logical_block)
                .ok_or(Error::Corrupted)
                .and_then(|mapping| {
                    self.cache.get(self.device_block(mapping.block)).lock().map_mut(
                        0,
                        |data_block: &mut DataBlock| {
                            let range = chunk.block_offset..chunk.block_offset + chunk.len;
                            src.read_into(chunk.done, &mut data_block[range])
                        },
                    )
                });

            if let Err(error) = copied {
                log::warn!("write to inode {} stopped after {written} bytes: {error}", id.get());
                self.sync();
                return Err(WriteError { error, written });
            }
            written += chunk.len;
        }

        self.sync();
        Ok(written)
    }

    /// 释放 inode 的全部数据块，大小归零，保留区段表容量
    pub fn clear(&mut self, id: InodeId) -> Result<()> {
        let mut record = self.lookup_inode(id)?;
        self.reclaim(&mut record);
        record.size = 0;
        self.inodes.store(&self.cache, id, &record)?;
        self.sync();
        Ok(())
    }

    /// 释放数据块与 inode 槽位，此后该编号查找不到
    pub fn unlink(&mut self, id: InodeId) -> Result<()> {
        let mut record = self.lookup_inode(id)?;
        self.reclaim(&mut record);
        record.size = 0;
        record.links = 0;
        self.inodes.store(&self.cache, id, &record)?;
        self.allocator.release_inode(&self.cache, id);
        self.sync();

        log::debug!("unlinked inode {}", id.get());
        Ok(())
    }

    /// 确保区段表覆盖 `size` 字节。
    ///
    /// 失败时分配回滚，磁盘上与 `record` 中的记录都保持原样。
    pub(crate) fn ensure_capacity(
        &mut self,
        id: InodeId,
        record: &mut InodeRecord,
        size: u64,
    ) -> Result<()> {
        let blocks_needed = InodeRecord::count_data_block(size);
        let mapped = record.extents.mapped_blocks();
        if record.extents.capacity() as u64 >= blocks_needed && mapped >= blocks_needed {
            return Ok(());
        }
        let remainder = u32::try_from(blocks_needed.saturating_sub(mapped)).map_err(|_| Error::NoSpace)?;

        let mut allocation = self.allocator.allocate_multiple(&self.cache, remainder)?;
        let mut grown = record.clone();
        grown.extents.reserve(blocks_needed as usize);
        for &extent in allocation.extents() {
            grown.extents.populate(extent).map_err(|_| Error::Corrupted)?;
        }

        // 内联槽位放不下的区段进入溢出块
        let spill = ExtentBlock::blocks_for(grown.extents.extent_count())
            .saturating_sub(grown.overflow.len());
        if spill > 0 {
            let extents = allocation.extend(spill as u32)?;
            grown.overflow.extend(extents.iter().flat_map(|extent| extent.blocks()));
        }
        self.inodes.store(&self.cache, id, &grown)?;
        allocation.commit();

        log::debug!(
            "inode {} grows to {blocks_needed} blocks in {} extents",
            id.get(),
            grown.extents.extent_count()
        );
        *record = grown;
        Ok(())
    }

    /// 逐块释放全部区段与溢出块，槽位复位为预留
    fn reclaim(&mut self, record: &mut InodeRecord) {
        for extent in record.extents.reset() {
            for block in extent.blocks() {
                self.allocator.release(&self.cache, block);
            }
        }
        for block in mem::take(&mut record.overflow) {
            self.allocator.release(&self.cache, block);
        }
    }
}

#[cfg(test)]
mod tests {
    use alloc::vec::Vec;

    use super::*;

    fn spans(start: usize, end: usize) -> Vec<(u32, usize, usize, usize)> {
        chunks(start, end)
            .map(|chunk| (chunk.logical_block, chunk.block_offset, chunk.len, chunk.done))
            .collect()
    }

    #[test]
    fn chunks_never_cross_blocks() {
        assert_eq!(
            [(0, 500, 12, 0), (1, 0, 512, 12), (2, 0, 4, 524)][..],
            spans(500, 1028)[..]
        );
        assert_eq!([(3, 0, 512, 0)][..], spans(1536, 2048)[..]);
        assert!(spans(7, 7).is_empty());
    }
}
