//! 分辨率层级描述模块
//!
//! 每个分辨率层级(金字塔中的一级)有自己固定的块几何:
//!
//! * 块宽度和块高度 - 底层存储实际使用的分块单位
//! * 栅格宽度和高度 - 该层级的完整图像尺寸
//! * 像素类型 - 只用于计算每行字节数
//!
//! 块位置始终以块左上角的像素坐标表示,并且必须对齐到块边界。

use super::{BlockError, BlockResult, BlockType};
use crate::geometry::PixelRect;
use crate::raster::PixelType;
use std::fmt::Display;

/// 表示一个分辨率层级的不可变元数据
///
/// 由栅格文件持有,被该层级上的所有编辑器和适配器共享。
#[derive(Clone, Debug, PartialEq)]
pub struct ResolutionDescriptor {
    /// 在金字塔中的层级索引,0表示原始分辨率
    pub resolution: u16,

    /// 栅格尺寸 (宽度, 高度)
    pub dimensions: (u64, u64),

    /// 块宽度
    pub block_width: u32,

    /// 块高度
    pub block_height: u32,

    /// 块的种类
    pub block_type: BlockType,

    /// 像素类型
    pub pixel_type: PixelType,
}

impl ResolutionDescriptor {
    /// 创建一个新的分辨率描述
    ///
    /// # 错误
    ///
    /// 块尺寸或栅格尺寸为0、像素类型为空时返回 `BadDescriptor`
    pub fn new(
        resolution: u16,
        dimensions: (u64, u64),
        (block_width, block_height): (u32, u32),
        block_type: BlockType,
        pixel_type: PixelType,
    ) -> BlockResult<Self> {
        if block_width == 0 || block_height == 0 {
            return Err(BlockError::BadDescriptor(format!(
                "块尺寸必须大于0: {block_width}x{block_height}"
            )));
        }
        if dimensions.0 == 0 || dimensions.1 == 0 {
            return Err(BlockError::BadDescriptor(format!(
                "栅格尺寸必须大于0: {}x{}",
                dimensions.0, dimensions.1
            )));
        }
        if pixel_type.bits_per_pixel() == 0 {
            return Err(BlockError::BadDescriptor(format!("像素类型为空: {pixel_type}")));
        }
        Ok(Self {
            resolution,
            dimensions,
            block_width,
            block_height,
            block_type,
            pixel_type,
        })
    }

    /// 用同一栅格的另一种分块几何创建描述
    ///
    /// 块适配器用它来描述向调用者暴露的块几何。
    pub fn derive_exposed(
        &self,
        block_width: u32,
        block_height: u32,
        block_type: BlockType,
    ) -> BlockResult<Self> {
        Self::new(
            self.resolution,
            self.dimensions,
            (block_width, block_height),
            block_type,
            self.pixel_type.clone(),
        )
    }

    /// 获取栅格宽度(像素)
    pub fn width(&self) -> u64 {
        self.dimensions.0
    }

    /// 获取栅格高度(像素)
    pub fn height(&self) -> u64 {
        self.dimensions.1
    }

    /// 一个块中一行像素的字节数
    pub fn bytes_per_block_row(&self) -> usize {
        self.pixel_type.bytes_per_row(self.block_width)
    }

    /// 一个完整块的字节数
    pub fn block_size_bytes(&self) -> usize {
        self.bytes_per_block_row() * self.block_height as usize
    }

    /// 获取水平方向的块数量
    pub fn col_count(&self) -> u64 {
        self.width().div_ceil(self.block_width as u64)
    }

    /// 获取垂直方向的块数量
    pub fn row_count(&self) -> u64 {
        self.height().div_ceil(self.block_height as u64)
    }

    /// 块的总数
    pub fn block_count(&self) -> u64 {
        self.col_count() * self.row_count()
    }

    /// 检查块位置是否对齐并且位于栅格之内
    pub fn check_position(&self, pos_x: u64, pos_y: u64) -> BlockResult<()> {
        if pos_x >= self.width() || pos_y >= self.height() {
            return Err(BlockError::BlockOutOfRange((
                (pos_x, pos_y),
                self.dimensions,
            )));
        }
        if pos_x % self.block_width as u64 != 0 || pos_y % self.block_height as u64 != 0 {
            return Err(BlockError::Misaligned((
                (pos_x, pos_y),
                (self.block_width, self.block_height),
            )));
        }
        Ok(())
    }

    /// 检查调用者提供的缓冲区大小是否正好是一个块
    pub fn check_buffer(&self, len: usize) -> BlockResult<()> {
        let expected = self.block_size_bytes();
        if len != expected {
            return Err(BlockError::BufferSize((expected, len)));
        }
        Ok(())
    }

    /// 获取块位置对应的块索引(行优先)
    pub fn block_index(&self, pos_x: u64, pos_y: u64) -> BlockResult<usize> {
        self.check_position(pos_x, pos_y)?;
        let col = pos_x / self.block_width as u64;
        let row = pos_y / self.block_height as u64;
        Ok((row * self.col_count() + col) as usize)
    }

    /// 获取块索引对应的块位置
    pub fn block_origin(&self, index: usize) -> (u64, u64) {
        let col_count = self.col_count();
        let row = index as u64 / col_count;
        let col = index as u64 % col_count;
        (col * self.block_width as u64, row * self.block_height as u64)
    }

    /// 块覆盖的像素矩形,不裁剪到栅格范围
    pub fn block_rect(&self, pos_x: u64, pos_y: u64) -> PixelRect {
        PixelRect::new(
            pos_x,
            pos_y,
            self.block_width as u64,
            self.block_height as u64,
        )
    }

    /// 整个栅格的像素矩形
    pub fn raster_rect(&self) -> PixelRect {
        PixelRect::new(0, 0, self.width(), self.height())
    }
}

impl Display for ResolutionDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Resolution({}: {}x{}, {:?} {}x{}, {})",
            self.resolution,
            self.dimensions.0,
            self.dimensions.1,
            self.block_type,
            self.block_width,
            self.block_height,
            self.pixel_type
        )
    }
}
