//! 基于 image 库的图像编解码插件
//!
//! 支持 PNG、JPEG、BMP 和 (Geo)TIFF 负载,解码结果按目标像素类型转换:
//! - 8位灰度 / 8位灰度 + alpha
//! - 24位 RGB / 32位 RGBA

#![cfg(feature = "image")]

use super::{Codec, DecompressError};
use crate::raster::{ColorModel, PixelType, SampleFormat};
use image::{DynamicImage, ImageBuffer};
use std::io::Cursor;

/// 支持的图像格式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageFormat {
    Png,
    Jpeg,
    Bmp,
    Tiff,
}

impl ImageFormat {
    fn as_image_format(self) -> image::ImageFormat {
        match self {
            Self::Png => image::ImageFormat::Png,
            Self::Jpeg => image::ImageFormat::Jpeg,
            Self::Bmp => image::ImageFormat::Bmp,
            Self::Tiff => image::ImageFormat::Tiff,
        }
    }

    /// 根据 MIME 类型识别图像格式
    pub fn from_mime_type(mime: &str) -> Option<Self> {
        match mime.to_ascii_lowercase().as_str() {
            "image/png" => Some(Self::Png),
            "image/jpeg" | "image/jpg" => Some(Self::Jpeg),
            "image/bmp" => Some(Self::Bmp),
            "image/tiff" | "image/geotiff" => Some(Self::Tiff),
            _ => None,
        }
    }
}

/// 图像编解码插件
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageCodec {
    pub format: ImageFormat,
}

impl ImageCodec {
    pub fn new(format: ImageFormat) -> Self {
        Self { format }
    }
}

/// image 库能直接表示的通道布局
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Channels {
    Luma,
    LumaAlpha,
    Rgb,
    Rgba,
}

impl Channels {
    fn of(pixel_type: &PixelType) -> Result<Self, DecompressError> {
        let eight_bit = pixel_type.bits_per_sample.iter().all(|bits| *bits == 8);
        if !eight_bit || pixel_type.sample_format != SampleFormat::Unsigned {
            return Err(DecompressError::PixelTypeNotSupported(pixel_type.clone()));
        }
        let samples = pixel_type.bits_per_sample.len();
        match (pixel_type.color, pixel_type.alpha.is_some(), samples) {
            (ColorModel::Gray, false, 1) => Ok(Self::Luma),
            (ColorModel::Gray, true, 2) => Ok(Self::LumaAlpha),
            (ColorModel::Rgb, false, 3) => Ok(Self::Rgb),
            (ColorModel::Rgb, true, 4) => Ok(Self::Rgba),
            _ => Err(DecompressError::PixelTypeNotSupported(pixel_type.clone())),
        }
    }
}

/// 将 DynamicImage 转换为目标像素类型的原始字节
fn image_to_bytes(img: DynamicImage, pixel_type: &PixelType) -> Result<Vec<u8>, DecompressError> {
    Ok(match Channels::of(pixel_type)? {
        Channels::Luma => img.into_luma8().into_raw(),
        Channels::LumaAlpha => img.into_luma_alpha8().into_raw(),
        Channels::Rgb => img.into_rgb8().into_raw(),
        Channels::Rgba => img.into_rgba8().into_raw(),
    })
}

/// 将原始字节按像素类型包装为 DynamicImage
fn bytes_to_image(
    raw: Vec<u8>,
    (width, height): (u32, u32),
    pixel_type: &PixelType,
) -> Result<DynamicImage, DecompressError> {
    let img = match Channels::of(pixel_type)? {
        Channels::Luma => ImageBuffer::from_raw(width, height, raw).map(DynamicImage::ImageLuma8),
        Channels::LumaAlpha => {
            ImageBuffer::from_raw(width, height, raw).map(DynamicImage::ImageLumaA8)
        }
        Channels::Rgb => ImageBuffer::from_raw(width, height, raw).map(DynamicImage::ImageRgb8),
        Channels::Rgba => ImageBuffer::from_raw(width, height, raw).map(DynamicImage::ImageRgba8),
    };
    img.ok_or_else(|| DecompressError::ImageError("像素缓冲区大小与图像尺寸不一致".to_string()))
}

impl Codec for ImageCodec {
    fn mime_type(&self) -> &str {
        match self.format {
            ImageFormat::Png => "image/png",
            ImageFormat::Jpeg => "image/jpeg",
            ImageFormat::Bmp => "image/bmp",
            ImageFormat::Tiff => "image/tiff",
        }
    }

    fn decompress(
        &self,
        bytes: &[u8],
        dimensions: (u32, u32),
        pixel_type: &PixelType,
        out: &mut [u8],
    ) -> Result<(), DecompressError> {
        let img = image::load_from_memory_with_format(bytes, self.format.as_image_format())
            .map_err(|e| DecompressError::ImageError(format!("{e:?}")))?;
        let actual = (img.width(), img.height());
        if actual != dimensions {
            return Err(DecompressError::DimensionMismatch((dimensions, actual)));
        }
        let raw = image_to_bytes(img, pixel_type)?;
        if raw.len() != out.len() {
            return Err(DecompressError::SizeMismatch((out.len(), raw.len())));
        }
        out.copy_from_slice(&raw);
        Ok(())
    }

    fn compress(
        &self,
        raw: &[u8],
        dimensions: (u32, u32),
        pixel_type: &PixelType,
    ) -> Result<Vec<u8>, DecompressError> {
        let img = bytes_to_image(raw.to_vec(), dimensions, pixel_type)?;
        let mut cursor = Cursor::new(Vec::new());
        img.write_to(&mut cursor, self.format.as_image_format())
            .map_err(|e| DecompressError::ImageError(format!("{e:?}")))?;
        Ok(cursor.into_inner())
    }
}
