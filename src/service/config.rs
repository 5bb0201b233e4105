//! 瓦片服务编辑器的配置

/// 瓦片服务配置
///
/// ```
/// use blockraster::service::ServiceConfig;
///
/// let config = ServiceConfig::default()
///     .with_worker_count(8)
///     .with_tile_size(256, 256)
///     .with_max_tiles_per_block(4, 4)
///     .with_cache_capacity(512);
/// assert_eq!(config.block_size(), (256, 256));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceConfig {
    /// 工作线程数量
    pub worker_count: usize,
    /// 服务器瓦片尺寸
    pub tile_size: (u32, u32),
    /// 编辑器原生块尺寸,默认与瓦片尺寸相同
    pub block_size: Option<(u32, u32)>,
    /// 一次请求最多合并的瓦片数 (水平, 垂直)
    pub max_tiles_per_block: (u32, u32),
    /// 缓存中最多保留的已就绪瓦片数
    pub cache_capacity: usize,
    /// 同时排队或执行的查询上限
    pub max_pending_queries: usize,
    /// 预先压缩好的占位图,格式与编解码器一致
    pub invalid_tile: Option<Vec<u8>>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            worker_count: 4,
            tile_size: (256, 256),
            block_size: None,
            max_tiles_per_block: (4, 4),
            cache_capacity: 256,
            max_pending_queries: 64,
            invalid_tile: None,
        }
    }
}

impl ServiceConfig {
    pub fn with_worker_count(mut self, worker_count: usize) -> Self {
        self.worker_count = worker_count.max(1);
        self
    }

    pub fn with_tile_size(mut self, width: u32, height: u32) -> Self {
        self.tile_size = (width.max(1), height.max(1));
        self
    }

    pub fn with_block_size(mut self, width: u32, height: u32) -> Self {
        self.block_size = Some((width.max(1), height.max(1)));
        self
    }

    pub fn with_max_tiles_per_block(mut self, width: u32, height: u32) -> Self {
        self.max_tiles_per_block = (width.max(1), height.max(1));
        self
    }

    pub fn with_cache_capacity(mut self, tiles: usize) -> Self {
        self.cache_capacity = tiles.max(1);
        self
    }

    pub fn with_max_pending_queries(mut self, queries: usize) -> Self {
        self.max_pending_queries = queries.max(1);
        self
    }

    pub fn with_invalid_tile(mut self, compressed: Vec<u8>) -> Self {
        self.invalid_tile = Some(compressed);
        self
    }

    /// 编辑器原生块尺寸
    pub fn block_size(&self) -> (u32, u32) {
        self.block_size.unwrap_or(self.tile_size)
    }
}
