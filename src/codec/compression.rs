//! 块数据压缩模块
//!
//! 本模块提供了不依赖图像库的无损压缩编解码:
//!
//! - 无压缩
//! - LZW (TIFF 风格,基于 salzweg)
//! - Deflate (zlib 封装,基于 flate2)
//!
//! 标识值沿用 TIFF 6.0 的压缩标签取值。

use super::Codec;
use crate::raster::PixelType;
use num_enum::{FromPrimitive, IntoPrimitive};
use salzweg::decoder::{DecodingError, TiffStyleDecoder};
use salzweg::encoder::{EncodingError, TiffStyleEncoder};
use std::fmt;
use std::io::{self, Read, Write};

/// 解压缩过程中可能出现的错误
#[derive(Debug)]
pub enum DecompressError {
    /// LZW 解码过程中的错误
    LzwDecodeError(DecodingError),
    /// LZW 编码过程中的错误
    LzwEncodeError(EncodingError),
    /// 不支持的压缩方式
    CompressionNotSupported(Compression),
    /// 解码后的数据大小与目标缓冲区不一致,包含 (期望字节数, 实际字节数)
    SizeMismatch((usize, usize)),
    /// 解码后的图像尺寸与请求不一致,包含 (期望尺寸, 实际尺寸)
    DimensionMismatch(((u32, u32), (u32, u32))),
    /// 图像编解码器错误
    ImageError(String),
    /// 不支持的像素类型
    PixelTypeNotSupported(PixelType),
    /// IO 操作错误
    IoError(io::Error),
}

impl fmt::Display for DecompressError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl std::error::Error for DecompressError {}

/// 从标准 IO 错误转换
impl From<io::Error> for DecompressError {
    fn from(e: io::Error) -> Self {
        DecompressError::IoError(e)
    }
}

/// 支持的无损压缩方式
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy, IntoPrimitive, FromPrimitive)]
#[repr(u16)]
pub enum Compression {
    /// 无压缩
    Uncompressed = 1,
    /// LZW 压缩
    Lzw = 5,
    /// Deflate (zlib) 压缩
    Deflate = 8,

    /// 未知压缩方式
    #[num_enum(default)]
    Unknown = 0x0000,
}

impl Compression {
    /// 解码压缩的数据
    ///
    /// # 错误
    ///
    /// * 如果压缩方式不支持,返回 `CompressionNotSupported`
    /// * 解码过程中的错误会被转换为相应的 `DecompressError`
    pub fn decode(&self, bytes: &[u8]) -> Result<Vec<u8>, DecompressError> {
        match self {
            Self::Uncompressed => Ok(bytes.to_vec()),
            Self::Lzw => {
                TiffStyleDecoder::decode_to_vec(bytes).map_err(DecompressError::LzwDecodeError)
            }
            Self::Deflate => {
                let mut buf = vec![];
                flate2::read::ZlibDecoder::new(bytes).read_to_end(&mut buf)?;
                Ok(buf)
            }
            other => Err(DecompressError::CompressionNotSupported(*other)),
        }
    }

    /// 编码数据
    pub fn encode(&self, bytes: &[u8]) -> Result<Vec<u8>, DecompressError> {
        match self {
            Self::Uncompressed => Ok(bytes.to_vec()),
            Self::Lzw => {
                TiffStyleEncoder::encode_to_vec(bytes).map_err(DecompressError::LzwEncodeError)
            }
            Self::Deflate => {
                let mut encoder =
                    flate2::write::ZlibEncoder::new(Vec::new(), flate2::Compression::default());
                encoder.write_all(bytes)?;
                Ok(encoder.finish()?)
            }
            other => Err(DecompressError::CompressionNotSupported(*other)),
        }
    }
}

impl Codec for Compression {
    fn mime_type(&self) -> &str {
        match self {
            Self::Uncompressed => "application/octet-stream",
            Self::Lzw => "application/x-lzw",
            Self::Deflate => "application/zlib",
            Self::Unknown => "application/x-unknown",
        }
    }

    fn decompress(
        &self,
        bytes: &[u8],
        _dimensions: (u32, u32),
        _pixel_type: &PixelType,
        out: &mut [u8],
    ) -> Result<(), DecompressError> {
        let decoded = self.decode(bytes)?;
        if decoded.len() != out.len() {
            return Err(DecompressError::SizeMismatch((out.len(), decoded.len())));
        }
        out.copy_from_slice(&decoded);
        Ok(())
    }

    fn compress(
        &self,
        raw: &[u8],
        _dimensions: (u32, u32),
        _pixel_type: &PixelType,
    ) -> Result<Vec<u8>, DecompressError> {
        self.encode(raw)
    }
}
