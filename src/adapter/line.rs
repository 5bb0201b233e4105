//! 行适配器
//!
//! 把整幅宽度的原生块(整幅图像或条带)按行暴露给调用者。
//!
//! - 读取:第一次读取某个原生块中的行时,把整个原生块读入暂存缓冲区,
//!   之后该块中的所有行都从缓冲区中取出;读到该块的最后一行时释放缓冲区。
//! - 写入:行必须严格按顺序到达。行被复制到暂存缓冲区中,
//!   原生块的最后一行到达时把完整的块写出一次。
//!
//! 栅格的最后一个条带可能不满一个块高度,此时栅格的最后一行就是它的最后一行,
//! 写出时剩余的行用0填充。

use super::staging::StagingBuffer;
use crate::resolution::{BlockError, BlockResult, ResolutionDescriptor, ResolutionEditor};
use tracing::*;

pub(super) struct LineAdapter {
    read_staging: StagingBuffer,
    write_staging: StagingBuffer,
    next_line_to_write: u64,
}

/// 一行所在的原生块
struct StripPosition {
    /// 原生块的起始行
    origin_y: u64,
    /// 行在原生块中的偏移
    row: u32,
    /// 原生块中属于栅格的最后一行
    last_line: u64,
    /// 暴露的一行的字节数
    line_bytes: usize,
}

impl StripPosition {
    fn locate(native: &ResolutionDescriptor, line: u64) -> Self {
        let strip_height = native.block_height as u64;
        let origin_y = line - line % strip_height;
        Self {
            origin_y,
            row: (line - origin_y) as u32,
            last_line: (origin_y + strip_height).min(native.height()) - 1,
            line_bytes: native.pixel_type.bytes_per_row(native.width() as u32),
        }
    }
}

fn empty_staging() -> BlockError {
    BlockError::NotSupported("暂存缓冲区未分配".to_string())
}

impl LineAdapter {
    pub fn new() -> Self {
        Self {
            read_staging: StagingBuffer::new("行读取"),
            write_staging: StagingBuffer::new("行写入"),
            next_line_to_write: 0,
        }
    }

    pub fn next_line_to_write(&self) -> u64 {
        self.next_line_to_write
    }

    pub fn read_line(
        &mut self,
        editor: &mut dyn ResolutionEditor,
        line: u64,
        out: &mut [u8],
    ) -> BlockResult<()> {
        if self.write_staging.pending_rows() > 0 {
            return Err(BlockError::PendingWrite(self.next_line_to_write));
        }
        let native = editor.descriptor().clone();
        let strip = StripPosition::locate(&native, line);
        let origin = (0, strip.origin_y);

        if !self.read_staging.holds(origin) {
            self.read_staging.release();
            let buffer = self.read_staging.acquire(
                origin,
                (native.block_width, native.block_height),
                &native.pixel_type,
            );
            trace!("读取原生块 {origin:?}");
            if let Err(e) = editor.read_block(origin.0, origin.1, buffer.as_mut_slice()) {
                self.read_staging.release();
                return Err(e);
            }
        }

        let block = self.read_staging.get().ok_or_else(empty_staging)?;
        let row = block.row(strip.row).ok_or_else(empty_staging)?;
        out.copy_from_slice(&row[..strip.line_bytes]);

        if line == strip.last_line {
            self.read_staging.release();
        }
        Ok(())
    }

    pub fn write_line(
        &mut self,
        editor: &mut dyn ResolutionEditor,
        line: u64,
        data: &[u8],
    ) -> BlockResult<()> {
        if line != self.next_line_to_write {
            error!(
                "行写入顺序错误: 期望第 {} 行, 实际第 {line} 行",
                self.next_line_to_write
            );
            return Err(BlockError::OutOfOrderWrite((self.next_line_to_write, line)));
        }
        let native = editor.descriptor().clone();
        let strip = StripPosition::locate(&native, line);
        let origin = (0, strip.origin_y);

        let buffer = self.write_staging.acquire(
            origin,
            (native.block_width, native.block_height),
            &native.pixel_type,
        );
        let row = buffer.row_mut(strip.row).ok_or_else(empty_staging)?;
        row[..strip.line_bytes].copy_from_slice(data);

        if line == strip.last_line {
            // 写出失败时保留暂存块且不计入这一行,调用者可以重试最后一行
            let block = self.write_staging.get().ok_or_else(empty_staging)?;
            debug!("写出原生块 {origin:?}");
            editor.write_block(origin.0, origin.1, block.as_slice())?;
            self.write_staging.release();
            if self.read_staging.holds(origin) {
                self.read_staging.release();
            }
        } else {
            self.write_staging.mark_row();
        }
        self.next_line_to_write += 1;
        Ok(())
    }
}
