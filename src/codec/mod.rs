//! 瓦片负载编解码模块
//!
//! 网络瓦片服务返回的数据是某种图像编码(PNG/JPEG/BMP/GeoTIFF 或无损压缩流),
//! 在合并进调用者请求的块之前必须解码为分辨率描述所要求的原始像素布局。
//! 适配器只通过 [`Codec`] 这个窄接口与编解码插件交互。

mod compression;
#[cfg(feature = "image")]
mod image;

pub use compression::{Compression, DecompressError};
#[cfg(feature = "image")]
pub use self::image::{ImageCodec, ImageFormat};

use crate::raster::PixelType;

/// 编解码插件接口
pub trait Codec: Send + Sync {
    /// 请求服务器时使用的 MIME 类型(WMS 的 FORMAT 参数)
    fn mime_type(&self) -> &str;

    /// 将编码后的字节解码到 `out`
    ///
    /// `out` 的长度必须正好是 `dimensions` 和 `pixel_type` 对应的原始像素大小。
    /// 失败时 `out` 的内容不被修改。
    fn decompress(
        &self,
        bytes: &[u8],
        dimensions: (u32, u32),
        pixel_type: &PixelType,
        out: &mut [u8],
    ) -> Result<(), DecompressError>;

    /// 将原始像素编码为字节
    fn compress(
        &self,
        raw: &[u8],
        dimensions: (u32, u32),
        pixel_type: &PixelType,
    ) -> Result<Vec<u8>, DecompressError>;
}
