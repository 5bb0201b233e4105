//! 这是一个按块访问多分辨率栅格数据的库
//!
//! 大型栅格文件通常按固定的块(行、条带、瓦片或整幅图像)存储,
//! 而调用者需要的分块方式往往与存储不同。本库提供:
//! - 单个分辨率层级的块级读写接口
//! - 在不同分块几何之间转换的块适配器
//! - 带缓存、请求合并和预取的 OGC 瓦片服务编辑器
//! - 选择文件实现的工厂注册表
//!
//! # 主要功能
//! - 行适配器:一次读取整个原生块,按行提供;按行写入,凑满一个原生块后写出一次
//! - 瓦片服务:在工作线程池上并发获取和解码瓦片,调用线程阻塞等待结果
//! - 获取失败的瓦片用占位图代替,协议错误保存在编辑器上交给下一次读取
//!
//! # 示例
//! ```rust
//! use blockraster::{
//!     AccessMode, BlockAdapter, BlockType, MemoryRaster, PixelType, ResolutionDescriptor,
//!     ResolutionEditor,
//! };
//!
//! let descriptor =
//!     ResolutionDescriptor::new(0, (2, 4), (2, 4), BlockType::Image, PixelType::gray8())?;
//! let raster = MemoryRaster::new("mem://demo", vec![descriptor])?;
//!
//! let mut writer = BlockAdapter::new(Box::new(raster.editor(0, AccessMode::CREATE)?), BlockType::Line)?;
//! for y in 0..4u8 {
//!     writer.write_block(0, y as u64, &[y * 2, y * 2 + 1])?;
//! }
//!
//! let mut reader = BlockAdapter::new(Box::new(raster.editor(0, AccessMode::READ)?), BlockType::Line)?;
//! let mut line = [0u8; 2];
//! reader.read_block(0, 3, &mut line)?;
//! assert_eq!(line, [6, 7]);
//! # Ok::<(), blockraster::BlockError>(())
//! ```

// 导出主要模块
pub mod adapter; // 块适配器
pub mod codec; // 瓦片负载编解码
pub mod factory; // 文件工厂
pub mod geometry; // 几何类型
pub mod indicator; // 块访问指示器
pub mod raster; // 栅格块数据
pub mod resolution; // 分辨率层级与编辑器
pub mod service; // OGC 瓦片服务

// 重新导出常用类型
pub use adapter::{AdapterKind, BlockAdapter};
pub use codec::{Codec, Compression, DecompressError};
pub use factory::{open_adapted, PageFileFactory, RasterFile, RasterFileCreator, RasterFileFactory};
pub use geometry::{PixelGrid, PixelRect, Region};
pub use indicator::{BlockAccessIndicator, BlockAccessListener};
pub use raster::{BlockBuffer, PixelType};
pub use resolution::{
    AccessMode, BlockError, BlockResult, BlockType, MemoryRaster, ResolutionDescriptor,
    ResolutionEditor,
};
pub use service::{OgcEndpoint, ServiceConfig, ServiceEditor, ServiceRasterFile, TileId};

#[cfg(feature = "http")]
pub use service::HttpTileSource;
#[cfg(feature = "image")]
pub use codec::ImageCodec;
