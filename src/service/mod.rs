//! OGC 瓦片服务模块
//!
//! 通过网络瓦片服务(WMS `GetMap`)按需获取栅格数据,提供与本地文件相同的块级读取接口。
//!
//! # 核心组件
//!
//! - [`ServiceRasterFile`] - 一个服务图层,包含若干逐级减半的分辨率层级
//! - [`ServiceEditor`] - 某个层级上的只读编辑器,负责缓存、合并请求和预取
//! - [`WorkerPool`] - 执行 [`BlockQuery`] 的有界工作线程池
//! - [`TileSource`] - 实际获取数据的接口,启用 `http` 特性时提供 `HttpTileSource`
//!
//! # 瓦片状态
//!
//! 每个瓦片只会经历 `不存在 -> 挂起 -> 就绪 -> 淘汰`,就绪之后数据不再改变。
//! 获取失败的瓦片以占位图的形式就绪,调用者不会因为单个瓦片失败而一直阻塞。

mod config;
mod editor;
#[cfg(feature = "http")]
mod http;
mod pool;
mod query;
mod source;
mod tile;
mod tile_map;

pub use config::ServiceConfig;
pub use editor::ServiceEditor;
#[cfg(feature = "http")]
pub use http::HttpTileSource;
pub use pool::{PoolError, TaskHandle, TaskStatus, WorkerPool};
pub use query::{BlockExtent, BlockQuery};
pub use source::{FetchError, OgcEndpoint, RequestContext, TileRequest, TileSource};
pub use tile::{Tile, TileData, TileId};

use crate::codec::Codec;
use crate::factory::{RasterFile, RasterFileCreator};
use crate::geometry::PixelGrid;
use crate::indicator::BlockAccessIndicator;
use crate::raster::PixelType;
use crate::resolution::{
    AccessMode, BlockError, BlockResult, BlockType, ResolutionDescriptor, ResolutionEditor,
};
use editor::ServiceShared;
use std::fmt;
use std::sync::Arc;
use tracing::*;

/// 一个网络瓦片服务图层
pub struct ServiceRasterFile {
    location: String,
    descriptors: Vec<ResolutionDescriptor>,
    levels: Vec<Arc<ServiceShared>>,
    pool: Arc<WorkerPool>,
    indicator: Option<Arc<BlockAccessIndicator>>,
}

impl ServiceRasterFile {
    /// 创建服务图层
    ///
    /// # 参数
    /// * `location` - 图层位置,只用于标识
    /// * `grid` - 原始分辨率下的像素网格和世界范围
    /// * `pixel_type` - 解码后的像素类型,必须按字节对齐
    /// * `levels` - 分辨率层级数量,每一级的尺寸是上一级的一半
    /// * `source` - 数据源
    /// * `codec` - 服务器返回数据的编解码器
    /// * `config` - 服务配置
    pub fn new(
        location: &str,
        grid: PixelGrid,
        pixel_type: PixelType,
        levels: usize,
        source: Arc<dyn TileSource>,
        codec: Arc<dyn Codec>,
        config: ServiceConfig,
    ) -> BlockResult<Self> {
        if !pixel_type.is_byte_aligned() {
            return Err(BlockError::NotSupported(format!(
                "瓦片服务只支持按字节对齐的像素: {pixel_type}"
            )));
        }
        let pool = Arc::new(WorkerPool::new(
            config.worker_count,
            config.max_pending_queries,
        )?);

        let mut descriptors = Vec::new();
        let mut shared = Vec::new();
        for level in 0..levels.max(1) {
            let level_grid = grid.downsampled(1 << level);
            let descriptor = ResolutionDescriptor::new(
                level as u16,
                level_grid.dimensions,
                config.block_size(),
                BlockType::Tile,
                pixel_type.clone(),
            )?;
            shared.push(ServiceShared::new(
                descriptor.clone(),
                level_grid,
                &config,
                Arc::clone(&source),
                Arc::clone(&codec),
                Arc::clone(&pool),
            ));
            descriptors.push(descriptor);
        }
        debug!("打开瓦片服务 {location}: {} 个层级", descriptors.len());
        Ok(Self {
            location: location.to_string(),
            descriptors,
            levels: shared,
            pool,
            indicator: None,
        })
    }

    /// 读取失败时通知指示器
    pub fn with_indicator(mut self, indicator: Arc<BlockAccessIndicator>) -> Self {
        self.indicator = Some(indicator);
        self
    }

    /// 打开某个层级的编辑器
    pub fn editor(&self, resolution: usize) -> BlockResult<ServiceEditor> {
        let shared = self.levels.get(resolution).ok_or_else(|| {
            BlockError::NotSupported(format!(
                "层级 {resolution} 超出范围 (共 {} 个层级)",
                self.levels.len()
            ))
        })?;
        let editor = ServiceEditor::new(Arc::clone(shared));
        Ok(match &self.indicator {
            Some(indicator) => editor.with_indicator(Arc::clone(indicator)),
            None => editor,
        })
    }

    /// 所有层级的请求上下文都被替换,缓存被清空
    pub fn context_changed(&self, context: RequestContext) -> BlockResult<()> {
        for level in &self.levels {
            level.context_changed(context.clone())?;
        }
        Ok(())
    }

    /// 取消所有层级上的预取
    pub fn cancel_look_ahead(&self) -> BlockResult<usize> {
        let mut cancelled = 0;
        for level in &self.levels {
            cancelled += level.cancel_look_ahead()?;
        }
        Ok(cancelled)
    }

    pub fn pool(&self) -> &WorkerPool {
        &self.pool
    }
}

impl fmt::Debug for ServiceRasterFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceRasterFile")
            .field("location", &self.location)
            .field("levels", &self.descriptors.len())
            .field("pool", &self.pool)
            .finish()
    }
}

impl RasterFile for ServiceRasterFile {
    fn location(&self) -> &str {
        &self.location
    }

    fn resolutions(&self) -> &[ResolutionDescriptor] {
        &self.descriptors
    }

    fn access_mode(&self) -> AccessMode {
        AccessMode::READ
    }

    fn create_editor(
        &self,
        resolution: usize,
        access: AccessMode,
    ) -> BlockResult<Box<dyn ResolutionEditor>> {
        if access.can_write() {
            return Err(BlockError::AccessDenied(access));
        }
        Ok(Box::new(self.editor(resolution)?))
    }
}

/// 以某个地址前缀识别的瓦片服务创建器
///
/// 图层的几何和像素类型在注册时给定,创建时不需要访问网络。
pub struct ServiceRasterCreator {
    prefix: String,
    grid: PixelGrid,
    pixel_type: PixelType,
    levels: usize,
    source: Arc<dyn TileSource>,
    codec: Arc<dyn Codec>,
    config: ServiceConfig,
}

impl ServiceRasterCreator {
    pub fn new(
        prefix: &str,
        grid: PixelGrid,
        pixel_type: PixelType,
        source: Arc<dyn TileSource>,
        codec: Arc<dyn Codec>,
    ) -> Self {
        Self {
            prefix: prefix.to_string(),
            grid,
            pixel_type,
            levels: 1,
            source,
            codec,
            config: ServiceConfig::default(),
        }
    }

    pub fn with_levels(mut self, levels: usize) -> Self {
        self.levels = levels.max(1);
        self
    }

    pub fn with_config(mut self, config: ServiceConfig) -> Self {
        self.config = config;
        self
    }
}

impl RasterFileCreator for ServiceRasterCreator {
    fn label(&self) -> &str {
        "OGC tile service"
    }

    fn is_kind_of(&self, location: &str) -> bool {
        location.starts_with(&self.prefix)
    }

    fn create(&self, location: &str, access: AccessMode) -> BlockResult<Box<dyn RasterFile>> {
        if access.can_write() {
            return Err(BlockError::AccessDenied(access));
        }
        Ok(Box::new(ServiceRasterFile::new(
            location,
            self.grid,
            self.pixel_type.clone(),
            self.levels,
            Arc::clone(&self.source),
            Arc::clone(&self.codec),
            self.config.clone(),
        )?))
    }
}
