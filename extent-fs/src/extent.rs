//! # 区段表与地址翻译
//!
//! 一个文件的逻辑块流由若干**区段**依次拼接而成：
//! 第 0 个区段承载逻辑块 `[0, len0)`，第 1 个承载 `[len0, len0 + len1)`，依此类推。
//! 区段在物理上可以任意不连续，但在逻辑上首尾相接、没有空洞。
//!
//! 区段表的每个槽位要么已填充（[`Slot::Populated`]），要么只是预留（[`Slot::Reserved`]）；
//! 已填充槽位总在预留槽位之前。槽位数即区段表的**容量**。

use alloc::vec::Vec;

use crate::{BlockId, Error, Result};

/// 一段连续的物理块
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Extent {
    /// 起始物理块
    pub start: BlockId,
    /// 块数
    pub length: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot {
    Populated(Extent),
    Reserved,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtentTable {
    slots: Vec<Slot>,
}

/// 逻辑块翻译的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Mapping {
    /// 物理块
    pub block: BlockId,
    /// 所在区段的下标
    pub extent_index: usize,
    /// 区段内的块偏移
    pub block_in_extent: u32,
}

impl Extent {
    #[inline]
    pub fn new(start: BlockId, length: u32) -> Self {
        Self { start, length }
    }

    /// 末块之后的第一个块
    #[inline]
    pub fn end(&self) -> BlockId {
        self.start + self.length
    }

    pub fn blocks(&self) -> impl Iterator<Item = BlockId> {
        let start = self.start.get();
        (start..start + self.length).map(BlockId::new)
    }

    #[inline]
    pub fn overlaps(&self, other: &Extent) -> bool {
        self.start < other.end() && other.start < self.end()
    }
}

impl ExtentTable {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// 校验后构造区段表：
    /// - 已填充槽位构成前缀；
    /// - 区段非空；
    /// - 区段两两不相交。
    pub fn from_slots(slots: Vec<Slot>) -> Result<Self> {
        let populated = slots
            .iter()
            .take_while(|slot| matches!(slot, Slot::Populated(_)))
            .count();
        if slots[populated..]
            .iter()
            .any(|slot| matches!(slot, Slot::Populated(_)))
        {
            return Err(Error::Corrupted);
        }

        let extents: Vec<Extent> = slots[..populated]
            .iter()
            .filter_map(|slot| match slot {
                Slot::Populated(extent) => Some(*extent),
                Slot::Reserved => None,
            })
            .collect();
        for (i, extent) in extents.iter().enumerate() {
            if extent.length == 0 || extent.start.get().checked_add(extent.length).is_none() {
                return Err(Error::Corrupted);
            }
            if extents[..i].iter().any(|other| other.overlaps(extent)) {
                return Err(Error::Corrupted);
            }
        }

        Ok(Self { slots })
    }

    /// 槽位数
    #[inline]
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    #[inline]
    pub fn slots(&self) -> &[Slot] {
        &self.slots
    }

    /// 按逻辑顺序遍历已填充的区段
    pub fn extents(&self) -> impl Iterator<Item = &Extent> {
        self.slots.iter().map_while(|slot| match slot {
            Slot::Populated(extent) => Some(extent),
            Slot::Reserved => None,
        })
    }

    #[inline]
    pub fn extent_count(&self) -> usize {
        self.extents().count()
    }

    /// 已填充区段所覆盖的块数
    pub fn mapped_blocks(&self) -> u64 {
        self.extents().map(|extent| extent.length as u64).sum()
    }

    /// 将容量扩张到 `capacity`，新槽位为预留；永不收缩。
    pub fn reserve(&mut self, capacity: usize) {
        if capacity > self.slots.len() {
            self.slots.resize(capacity, Slot::Reserved);
        }
    }

    /// 把区段填入第一个预留槽位，没有预留槽位时返回区段本身。
    pub fn populate(&mut self, extent: Extent) -> core::result::Result<(), Extent> {
        match self
            .slots
            .iter_mut()
            .find(|slot| matches!(slot, Slot::Reserved))
        {
            Some(slot) => {
                *slot = Slot::Populated(extent);
                Ok(())
            }
            None => Err(extent),
        }
    }

    /// 所有槽位复位为预留，返回原先填充的区段；容量不变。
    pub fn reset(&mut self) -> Vec<Extent> {
        let extents = self.extents().copied().collect();
        self.slots.fill(Slot::Reserved);
        extents
    }

    #[inline]
    pub fn translate(&self, logical_block: u32) -> Option<Mapping> {
        translate(self, logical_block)
    }
}

/// 把逻辑块翻译为物理块。
///
/// 依序遍历区段，从剩余量中减去每个区段的长度，
/// 直到剩余量小于当前区段长度；物理块即 `start + 剩余量`。
/// 超出已填充区段时返回 `None`。
pub fn translate(table: &ExtentTable, logical_block: u32) -> Option<Mapping> {
    let mut remainder = logical_block;

    for (extent_index, extent) in table.extents().enumerate() {
        if remainder < extent.length {
            return Some(Mapping {
                block: extent.start + remainder,
                extent_index,
                block_in_extent: remainder,
            });
        }
        remainder -= extent.length;
    }

    None
}
