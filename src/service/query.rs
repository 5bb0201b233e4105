//! 块查询模块
//!
//! 一个 [`BlockQuery`] 负责一次服务器请求:获取覆盖整个 [`BlockExtent`] 的图像,
//! 解码后切分到各个瓦片。获取失败时用占位图填充瓦片,保证等待者不会一直阻塞。

use super::editor::ServiceShared;
use super::pool::TaskHandle;
use super::source::FetchError;
use super::tile::{Tile, TileData, TileId};
use crate::geometry::{PixelRect, Region};
use crate::raster::BlockBuffer;
use crate::resolution::BlockError;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock, Weak};
use tracing::*;

/// 瓦片索引的闭区间边界框
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlockExtent {
    pub min_col: u64,
    pub min_row: u64,
    pub max_col: u64,
    pub max_row: u64,
    pub resolution: u16,
}

impl BlockExtent {
    /// 用左上和右下瓦片索引 (列, 行) 创建范围
    pub fn new(min: (u64, u64), max: (u64, u64), resolution: u16) -> Self {
        Self {
            min_col: min.0.min(max.0),
            min_row: min.1.min(max.1),
            max_col: min.0.max(max.0),
            max_row: min.1.max(max.1),
            resolution,
        }
    }

    /// 水平方向的瓦片数
    pub fn width(&self) -> u64 {
        self.max_col - self.min_col + 1
    }

    /// 垂直方向的瓦片数
    pub fn height(&self) -> u64 {
        self.max_row - self.min_row + 1
    }

    pub fn tile_count(&self) -> u64 {
        self.width() * self.height()
    }

    pub fn contains(&self, id: &TileId) -> bool {
        id.resolution == self.resolution
            && (self.min_col..=self.max_col).contains(&id.col)
            && (self.min_row..=self.max_row).contains(&id.row)
    }

    /// 范围内的所有瓦片,按行优先顺序
    pub fn tile_ids(&self) -> impl Iterator<Item = TileId> + '_ {
        (self.min_row..=self.max_row).flat_map(move |row| {
            (self.min_col..=self.max_col).map(move |col| TileId::new(col, row, self.resolution))
        })
    }

    /// 范围覆盖的像素矩形(不裁剪到栅格范围)
    pub fn pixel_rect(&self, tile_size: (u32, u32)) -> PixelRect {
        let (tw, th) = (tile_size.0 as u64, tile_size.1 as u64);
        PixelRect::new(
            self.min_col * tw,
            self.min_row * th,
            self.width() * tw,
            self.height() * th,
        )
    }
}

impl fmt::Display for BlockExtent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Extent({}: {},{} -> {},{})",
            self.resolution, self.min_col, self.min_row, self.max_col, self.max_row
        )
    }
}

/// 一次未完成的服务器请求
pub struct BlockQuery {
    extent: BlockExtent,
    bbox: Region<f64>,
    tiles: Vec<Arc<Tile>>,
    look_ahead: bool,
    demanded: AtomicBool,
    cancelled: AtomicBool,
    handle: OnceLock<TaskHandle>,
    editor: Weak<ServiceShared>,
}

impl BlockQuery {
    pub(crate) fn new(
        extent: BlockExtent,
        bbox: Region<f64>,
        tiles: Vec<Arc<Tile>>,
        look_ahead: bool,
        editor: Weak<ServiceShared>,
    ) -> Self {
        Self {
            extent,
            bbox,
            tiles,
            look_ahead,
            demanded: AtomicBool::new(!look_ahead),
            cancelled: AtomicBool::new(false),
            handle: OnceLock::new(),
            editor,
        }
    }

    pub fn extent(&self) -> &BlockExtent {
        &self.extent
    }

    pub fn bbox(&self) -> Region<f64> {
        self.bbox
    }

    /// 这个查询负责写入的瓦片
    pub fn tiles(&self) -> &[Arc<Tile>] {
        &self.tiles
    }

    pub fn owns(&self, tile: &Arc<Tile>) -> bool {
        self.tiles.iter().any(|t| Arc::ptr_eq(t, tile))
    }

    /// 是否由预取发起
    pub fn is_look_ahead(&self) -> bool {
        self.look_ahead
    }

    /// 有读取者在等待这个查询
    pub fn mark_demanded(&self) {
        self.demanded.store(true, Ordering::Release);
    }

    pub fn is_demanded(&self) -> bool {
        self.demanded.load(Ordering::Acquire)
    }

    /// 取消查询。已经开始的网络请求不会被中断,只是结果会被丢弃。
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
        if let Some(handle) = self.handle.get() {
            handle.cancel();
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    pub(crate) fn set_handle(&self, handle: TaskHandle) {
        let _ = self.handle.set(handle);
    }

    pub fn handle(&self) -> Option<&TaskHandle> {
        self.handle.get()
    }

    /// 在工作线程上执行查询
    pub(crate) fn run(self: Arc<Self>) {
        let Some(shared) = self.editor.upgrade() else {
            debug!("编辑器已关闭,丢弃查询 {}", self.extent);
            return;
        };
        if self.is_cancelled() {
            debug!("查询 {} 在开始前被取消", self.extent);
            shared.finish_query(&self);
            return;
        }

        let request = shared.request_for(&self.extent, self.bbox);
        trace!("获取 {} ({}x{})", self.extent, request.dimensions.0, request.dimensions.1);
        let fetched = shared.source().fetch(&request);
        if self.is_cancelled() {
            debug!("丢弃已取消查询 {} 的结果", self.extent);
            shared.finish_query(&self);
            return;
        }

        match fetched {
            Ok(bytes) => match shared.decode(request.dimensions, &bytes) {
                Ok(raw) => {
                    if let Err(e) = self.split_into_tiles(&shared, request.dimensions, raw) {
                        shared.store_error(e);
                        self.invalidate_tiles(&shared);
                    }
                }
                Err(e) => {
                    shared.store_error(e.into());
                    self.invalidate_tiles(&shared);
                }
            },
            Err(FetchError::Protocol(msg)) => {
                shared.store_error(BlockError::Protocol(msg));
                self.invalidate_tiles(&shared);
            }
            Err(e) => {
                warn!("瓦片获取失败 {}: {e:?}", self.extent);
                self.invalidate_tiles(&shared);
            }
        }
        shared.finish_query(&self);
    }

    /// 把覆盖整个范围的像素切分到各个瓦片
    fn split_into_tiles(
        &self,
        shared: &ServiceShared,
        dimensions: (u32, u32),
        raw: Vec<u8>,
    ) -> Result<(), BlockError> {
        if self.extent.tile_count() == 1 {
            if let Some(tile) = self.tiles.first() {
                tile.set_data(TileData::Fetched(Arc::from(raw)));
            }
            return Ok(());
        }
        let (tw, th) = shared.tile_size();
        let pixel_type = &shared.descriptor().pixel_type;
        let extent = BlockBuffer::new(dimensions, raw, pixel_type.clone())?;
        for tile in &self.tiles {
            let id = tile.id();
            let origin = (
                ((id.col - self.extent.min_col) * tw as u64) as u32,
                ((id.row - self.extent.min_row) * th as u64) as u32,
            );
            let mut buf = BlockBuffer::blank((tw, th), pixel_type.clone());
            buf.copy_region_from(&extent, origin, (0, 0), (tw, th))?;
            tile.set_data(TileData::Fetched(Arc::from(buf.as_slice())));
        }
        Ok(())
    }

    /// 用占位图填充所有还没有数据的瓦片
    fn invalidate_tiles(&self, shared: &ServiceShared) {
        let placeholder = shared.placeholder();
        for tile in &self.tiles {
            tile.set_data(TileData::Invalid(Arc::clone(&placeholder)));
        }
    }
}

impl fmt::Debug for BlockQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BlockQuery")
            .field("extent", &self.extent)
            .field("tiles", &self.tiles.len())
            .field("look_ahead", &self.look_ahead)
            .field("demanded", &self.is_demanded())
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}
