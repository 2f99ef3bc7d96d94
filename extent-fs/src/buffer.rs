//! # 调用者缓冲区
//!
//! 文件读写的另一端是调用者的内存，
//! 它可能由若干不连续的片段构成，访问也可能失败。
//! 读写引擎只通过这两个 trait 按块搬运数据，任何一次搬运失败都返回 [`Error::Fault`]。

use crate::{Error, Result};

/// 写入文件时的数据来源
pub trait UserBuffer {
    /// 把缓冲区 `[offset, offset + dst.len())` 处的字节复制到 `dst`
    fn read_into(&self, offset: usize, dst: &mut [u8]) -> Result<()>;
}

/// 读取文件时的数据去处
pub trait UserBufferMut {
    /// 把 `src` 复制到缓冲区 `[offset, offset + src.len())` 处
    fn write_from(&mut self, offset: usize, src: &[u8]) -> Result<()>;
}

impl UserBuffer for [u8] {
    fn read_into(&self, offset: usize, dst: &mut [u8]) -> Result<()> {
        let end = offset.checked_add(dst.len()).ok_or(Error::Fault)?;
        dst.copy_from_slice(self.get(offset..end).ok_or(Error::Fault)?);
        Ok(())
    }
}

impl UserBufferMut for [u8] {
    fn write_from(&mut self, offset: usize, src: &[u8]) -> Result<()> {
        let end = offset.checked_add(src.len()).ok_or(Error::Fault)?;
        self.get_mut(offset..end)
            .ok_or(Error::Fault)?
            .copy_from_slice(src);
        Ok(())
    }
}

/// 由多个片段依次拼接而成的来源
impl UserBuffer for [&[u8]] {
    fn read_into(&self, mut offset: usize, mut dst: &mut [u8]) -> Result<()> {
        for segment in self {
            if dst.is_empty() {
                break;
            }
            if offset >= segment.len() {
                offset -= segment.len();
                continue;
            }

            let len = dst.len().min(segment.len() - offset);
            let (head, tail) = dst.split_at_mut(len);
            head.copy_from_slice(&segment[offset..offset + len]);
            dst = tail;
            offset = 0;
        }

        if dst.is_empty() { Ok(()) } else { Err(Error::Fault) }
    }
}

/// 由多个片段依次拼接而成的去处
impl UserBufferMut for [&mut [u8]] {
    fn write_from(&mut self, mut offset: usize, mut src: &[u8]) -> Result<()> {
        for segment in self.iter_mut() {
            if src.is_empty() {
                break;
            }
            if offset >= segment.len() {
                offset -= segment.len();
                continue;
            }

            let len = src.len().min(segment.len() - offset);
            segment[offset..offset + len].copy_from_slice(&src[..len]);
            src = &src[len..];
            offset = 0;
        }

        if src.is_empty() { Ok(()) } else { Err(Error::Fault) }
    }
}
