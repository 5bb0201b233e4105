//! 暂存缓冲区
//!
//! 持有一个原生块大小的 [`BlockBuffer`]。第一次使用时分配,在触发条件
//! (最后一行被读出或写入)或者适配器销毁时释放。

use crate::raster::{BlockBuffer, PixelType};
use tracing::*;

pub(super) struct StagingBuffer {
    label: &'static str,
    block: Option<BlockBuffer>,
    /// 当前缓冲的原生块位置
    origin: (u64, u64),
    /// 已经写入但尚未写出的行数
    pending_rows: u32,
}

impl StagingBuffer {
    pub fn new(label: &'static str) -> Self {
        Self {
            label,
            block: None,
            origin: (0, 0),
            pending_rows: 0,
        }
    }

    pub fn is_allocated(&self) -> bool {
        self.block.is_some()
    }

    /// 是否正缓冲着指定位置的原生块
    pub fn holds(&self, origin: (u64, u64)) -> bool {
        self.block.is_some() && self.origin == origin
    }

    pub fn pending_rows(&self) -> u32 {
        self.pending_rows
    }

    /// 获取指定位置的缓冲区,不存在或位置不同时分配一个新的空白块
    pub fn acquire(
        &mut self,
        origin: (u64, u64),
        dimensions: (u32, u32),
        pixel_type: &PixelType,
    ) -> &mut BlockBuffer {
        if !self.holds(origin) {
            if self.pending_rows > 0 {
                warn!(
                    "{}: 丢弃块 {:?} 中 {} 行未写出的数据",
                    self.label, self.origin, self.pending_rows
                );
            }
            trace!("{}: 为块 {origin:?} 分配暂存缓冲区", self.label);
            self.origin = origin;
            self.pending_rows = 0;
            self.block = Some(BlockBuffer::blank(dimensions, pixel_type.clone()));
        }
        self.block.get_or_insert_with(|| BlockBuffer::blank(dimensions, pixel_type.clone()))
    }

    pub fn get(&self) -> Option<&BlockBuffer> {
        self.block.as_ref()
    }

    /// 记录写入了一行
    pub fn mark_row(&mut self) {
        self.pending_rows += 1;
    }

    /// 取出缓冲区,之后处于未分配状态
    pub fn release(&mut self) -> Option<BlockBuffer> {
        if self.block.is_some() {
            trace!("{}: 释放块 {:?} 的暂存缓冲区", self.label, self.origin);
        }
        self.pending_rows = 0;
        self.block.take()
    }
}

impl Drop for StagingBuffer {
    fn drop(&mut self) {
        if self.block.is_some() && self.pending_rows > 0 {
            warn!(
                "{}: 块 {:?} 还有 {} 行没有写出,数据被丢弃",
                self.label, self.origin, self.pending_rows
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_acquire_and_release() {
        let mut staging = StagingBuffer::new("test");
        assert!(!staging.is_allocated());
        staging.acquire((0, 4), (2, 4), &PixelType::gray8()).as_mut_slice()[0] = 7;
        assert!(staging.holds((0, 4)));
        assert!(!staging.holds((0, 0)));
        assert_eq!(staging.acquire((0, 4), (2, 4), &PixelType::gray8()).as_slice()[0], 7);

        staging.mark_row();
        let block = staging.release().unwrap();
        assert_eq!(block.len(), 8);
        assert!(!staging.is_allocated());
        assert_eq!(staging.pending_rows(), 0);
    }
}
