//! 栅格块数据模块
//!
//! 本模块提供了描述像素格式和持有单个栅格块原始像素数据的类型:
//! - [`PixelType`] - 每个像素的位深度、通道布局和样本格式
//! - [`BlockBuffer`] - 一个栅格块的原始像素缓冲区
//! - [`copy_rect`] - 在两个按行存储的像素缓冲区之间复制矩形区域

use std::fmt::{self, Display};

mod layout;

pub use layout::{AlphaChannel, ColorModel, SampleFormat};

/// 栅格操作过程中可能出现的错误
#[derive(Debug)]
pub enum RasterError {
    /// 缓冲区大小不匹配错误
    /// 包含 (实际大小, (宽度, 高度), 每个像素的位数)
    BufferSize((usize, (u32, u32), u32)),
    /// 矩形区域超出缓冲区范围
    /// 包含 (区域原点, 区域尺寸, 缓冲区尺寸)
    RectOutOfBounds(((u32, u32), (u32, u32), (u32, u32))),
    /// 不支持的操作错误
    NotSupported(String),
}

impl Display for RasterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl std::error::Error for RasterError {}

/// 像素类型描述
///
/// 适配器只用它来计算每行字节数,不解释像素内容。
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct PixelType {
    /// 每个样本的位数
    pub bits_per_sample: Vec<u16>,
    /// 颜色模型
    pub color: ColorModel,
    /// 所有样本共用的数值格式
    pub sample_format: SampleFormat,
    /// 最后一个样本是 alpha 时的含义
    pub alpha: Option<AlphaChannel>,
}

impl PixelType {
    /// 创建一个新的像素类型
    pub fn new(
        bits_per_sample: Vec<u16>,
        color: ColorModel,
        sample_format: SampleFormat,
        alpha: Option<AlphaChannel>,
    ) -> Self {
        Self {
            bits_per_sample,
            color,
            sample_format,
            alpha,
        }
    }

    /// 1位二值图像
    pub fn gray1() -> Self {
        Self::new(vec![1], ColorModel::Gray, SampleFormat::Unsigned, None)
    }

    /// 8位灰度图像
    pub fn gray8() -> Self {
        Self::new(vec![8], ColorModel::Gray, SampleFormat::Unsigned, None)
    }

    /// 8位灰度图像 + alpha
    pub fn gray_alpha8() -> Self {
        Self::new(
            vec![8, 8],
            ColorModel::Gray,
            SampleFormat::Unsigned,
            Some(AlphaChannel::Straight),
        )
    }

    /// 24位 RGB 图像
    pub fn rgb8() -> Self {
        Self::new(vec![8, 8, 8], ColorModel::Rgb, SampleFormat::Unsigned, None)
    }

    /// 32位 RGBA 图像
    pub fn rgba8() -> Self {
        Self::new(
            vec![8, 8, 8, 8],
            ColorModel::Rgb,
            SampleFormat::Unsigned,
            Some(AlphaChannel::Straight),
        )
    }

    /// 每个像素的总位数(bits_per_sample 的总和)
    pub fn bits_per_pixel(&self) -> u32 {
        self.bits_per_sample.iter().map(|b| *b as u32).sum()
    }

    /// 像素是否按字节对齐
    pub fn is_byte_aligned(&self) -> bool {
        self.bits_per_pixel() % 8 == 0
    }

    /// 每个像素的字节数,像素未按字节对齐时返回 None
    pub fn bytes_per_pixel(&self) -> Option<usize> {
        if self.is_byte_aligned() {
            Some(self.bits_per_pixel() as usize / 8)
        } else {
            None
        }
    }

    /// 计算指定宽度的一行像素所占的字节数(向上取整到整字节)
    pub fn bytes_per_row(&self, width: u32) -> usize {
        (width as usize * self.bits_per_pixel() as usize + 7) / 8
    }
}

impl Display for PixelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "PixelType({:?}, {:?})",
            self.bits_per_sample, self.color
        )
    }
}

/// 一个栅格块的原始像素数据
///
/// 数据按行存储,每行占 [`BlockBuffer::row_size`] 字节。
#[derive(Clone, Debug, PartialEq)]
pub struct BlockBuffer {
    /// 块尺寸 (宽度, 高度)
    pub dimensions: (u32, u32),
    /// 像素类型
    pub pixel_type: PixelType,
    buffer: Vec<u8>,
    row_size: usize,
}

impl BlockBuffer {
    /// 用已有的数据创建块缓冲区
    ///
    /// # 错误
    /// 缓冲区大小与尺寸和像素类型不一致时返回 `RasterError::BufferSize`
    pub fn new(
        dimensions: (u32, u32),
        buffer: Vec<u8>,
        pixel_type: PixelType,
    ) -> Result<Self, RasterError> {
        let row_size = pixel_type.bytes_per_row(dimensions.0);
        let required_bytes = row_size * dimensions.1 as usize;

        // 检查缓冲区大小是否正确
        if buffer.len() != required_bytes {
            return Err(RasterError::BufferSize((
                buffer.len(),
                dimensions,
                pixel_type.bits_per_pixel(),
            )));
        }
        Ok(Self {
            dimensions,
            pixel_type,
            buffer,
            row_size,
        })
    }

    /// 创建一个填充为0的块缓冲区
    pub fn blank(dimensions: (u32, u32), pixel_type: PixelType) -> Self {
        let row_size = pixel_type.bytes_per_row(dimensions.0);
        Self {
            dimensions,
            pixel_type,
            buffer: vec![0; row_size * dimensions.1 as usize],
            row_size,
        }
    }

    /// 每行的字节数
    pub fn row_size(&self) -> usize {
        self.row_size
    }

    /// 缓冲区总字节数
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.buffer
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.buffer
    }

    /// 将缓冲区清零
    pub fn clear(&mut self) {
        self.buffer.fill(0);
    }

    /// 获取指定行的字节
    pub fn row(&self, y: u32) -> Option<&[u8]> {
        if y >= self.dimensions.1 {
            return None;
        }
        let start = y as usize * self.row_size;
        Some(&self.buffer[start..start + self.row_size])
    }

    /// 获取指定行的可变字节
    pub fn row_mut(&mut self, y: u32) -> Option<&mut [u8]> {
        if y >= self.dimensions.1 {
            return None;
        }
        let start = y as usize * self.row_size;
        Some(&mut self.buffer[start..start + self.row_size])
    }

    /// 从另一个块缓冲区复制一个矩形区域
    ///
    /// # 参数
    /// * `src` - 源缓冲区
    /// * `src_origin` - 源区域左上角 (x, y)
    /// * `dst_origin` - 目标区域左上角 (x, y)
    /// * `size` - 区域尺寸 (宽度, 高度)
    pub fn copy_region_from(
        &mut self,
        src: &BlockBuffer,
        src_origin: (u32, u32),
        dst_origin: (u32, u32),
        size: (u32, u32),
    ) -> Result<(), RasterError> {
        if src.pixel_type != self.pixel_type {
            return Err(RasterError::NotSupported(format!(
                "像素类型不一致: {} != {}",
                src.pixel_type, self.pixel_type
            )));
        }
        for (origin, dims) in [(src_origin, src.dimensions), (dst_origin, self.dimensions)] {
            if origin.0 + size.0 > dims.0 || origin.1 + size.1 > dims.1 {
                return Err(RasterError::RectOutOfBounds((origin, size, dims)));
            }
        }
        let src_row_size = src.row_size;
        let dst_row_size = self.row_size;
        copy_rect(
            &src.buffer,
            src_row_size,
            src_origin,
            &mut self.buffer,
            dst_row_size,
            dst_origin,
            size,
            &self.pixel_type,
        )
    }
}

impl Display for BlockBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "BlockBuffer({}x{}, {}, {}字节)",
            self.dimensions.0,
            self.dimensions.1,
            self.pixel_type,
            self.buffer.len()
        )
    }
}

/// 在两个按行存储的像素缓冲区之间复制矩形区域
///
/// 只支持按字节对齐的像素类型。调用者负责保证区域位于两个缓冲区之内。
#[allow(clippy::too_many_arguments)]
pub fn copy_rect(
    src: &[u8],
    src_row_size: usize,
    src_origin: (u32, u32),
    dst: &mut [u8],
    dst_row_size: usize,
    dst_origin: (u32, u32),
    size: (u32, u32),
    pixel_type: &PixelType,
) -> Result<(), RasterError> {
    let bytes_per_pixel = pixel_type.bytes_per_pixel().ok_or_else(|| {
        RasterError::NotSupported(format!("像素未按字节对齐: {pixel_type}"))
    })?;
    let n = size.0 as usize * bytes_per_pixel;
    for j in 0..size.1 as usize {
        let s = (src_origin.1 as usize + j) * src_row_size + src_origin.0 as usize * bytes_per_pixel;
        let d = (dst_origin.1 as usize + j) * dst_row_size + dst_origin.0 as usize * bytes_per_pixel;
        dst[d..d + n].copy_from_slice(&src[s..s + n]);
    }
    Ok(())
}
