use crate::BLOCK_BITS;
use crate::block_cache::BlockCacheManager;

/// 位图区域内块的结构
type BitmapBlock = [u64; BLOCK_BITS / 64];

/// 位图区域，记录其指示区域的分配情况，置位即已分配
#[derive(Debug, Clone, Copy)]
pub struct Bitmap {
    /// 位图的起始块
    start_block_id: usize,
    /// 位图占用块数
    blocks: usize,
    /// 有效位数，超出的位恒为 0 且不参与分配
    bits: usize,
}

/// 位在位图区域内的位置：块索引、组索引、组内索引
struct BitPos(usize);

impl Bitmap {
    #[inline]
    pub fn new(start_block_id: usize, bits: usize) -> Self {
        Self {
            start_block_id,
            blocks: Self::blocks_for(bits),
            bits,
        }
    }

    /// 记录 `bits` 个对象需要多少个位图块
    #[inline]
    pub fn blocks_for(bits: usize) -> usize {
        bits.div_ceil(BLOCK_BITS)
    }

    #[inline]
    pub fn bits(&self) -> usize {
        self.bits
    }

    #[inline]
    pub fn blocks(&self) -> usize {
        self.blocks
    }

    pub fn test(&self, cache: &BlockCacheManager, index: usize) -> bool {
        assert!(index < self.bits);
        let (block_index, group_index, ingroup_index) = BitPos(index).decode();
        cache
            .get(self.start_block_id + block_index)
            .lock()
            .map(0, |bitmap_block: &BitmapBlock| {
                bitmap_block[group_index] & (1 << ingroup_index) != 0
            })
    }

    pub fn set(&self, cache: &BlockCacheManager, index: usize) {
        assert!(index < self.bits);
        let (block_index, group_index, ingroup_index) = BitPos(index).decode();
        cache
            .get(self.start_block_id + block_index)
            .lock()
            .map_mut(0, |bitmap_block: &mut BitmapBlock| {
                // 不能重复分配
                assert_eq!(bitmap_block[group_index] & (1 << ingroup_index), 0);
                bitmap_block[group_index] |= 1 << ingroup_index;
            });
    }

    pub fn clear(&self, cache: &BlockCacheManager, index: usize) {
        assert!(index < self.bits);
        let (block_index, group_index, ingroup_index) = BitPos(index).decode();
        cache
            .get(self.start_block_id + block_index)
            .lock()
            .map_mut(0, |bitmap_block: &mut BitmapBlock| {
                // 编号一定得有对应的位
                assert_ne!(bitmap_block[group_index] & (1 << ingroup_index), 0);
                bitmap_block[group_index] &= !(1 << ingroup_index);
            });
    }

    /// 自 `from` 起寻找第一个为 0 的位。
    pub fn find_clear(&self, cache: &BlockCacheManager, from: usize) -> Option<usize> {
        let mut index = from;

        while index < self.bits {
            let (block_index, group_index, ingroup_index) = BitPos(index).decode();
            let found = cache
                .get(self.start_block_id + block_index)
                .lock()
                .map(0, |bitmap_block: &BitmapBlock| {
                    // 组内 `from` 之前的位视作已占用
                    let mut groups = bitmap_block.iter().enumerate().skip(group_index);
                    let (_, &first) = groups.next()?;
                    let first = first | ((1u64 << ingroup_index) - 1);
                    if first != u64::MAX {
                        return Some((group_index, first.trailing_ones()));
                    }
                    groups.find_map(|(group_index, &bits)| {
                        (bits != u64::MAX).then_some((group_index, bits.trailing_ones()))
                    })
                });

            if let Some((group_index, ingroup_index)) = found {
                let index = BitPos::encode(block_index, group_index, ingroup_index as usize);
                return (index < self.bits).then_some(index);
            }

            index = (block_index + 1) * BLOCK_BITS;
        }

        None
    }

    /// 已置位的位数
    pub fn count_ones(&self, cache: &BlockCacheManager) -> usize {
        (0..self.blocks())
            .map(|block_index| {
                cache
                    .get(self.start_block_id + block_index)
                    .lock()
                    .map(0, |bitmap_block: &BitmapBlock| {
                        bitmap_block
                            .iter()
                            .map(|bits| bits.count_ones() as usize)
                            .sum::<usize>()
                    })
            })
            .sum()
    }
}

impl BitPos {
    /// 线性映射编码得到位序号
    #[inline]
    fn encode(block_index: usize, group_index: usize, ingroup_index: usize) -> usize {
        block_index * BLOCK_BITS + group_index * 64 + ingroup_index
    }

    fn decode(self) -> (usize, usize, usize) {
        let mut index = self.0;

        let block_index = index / BLOCK_BITS;
        index %= BLOCK_BITS;
        (block_index, index / 64, index % 64)
    }
}
