//! 瓦片服务编辑器
//!
//! 读取一个块时:
//! 1. 计算与块重叠的服务器瓦片
//! 2. 在瓦片表锁内查找缓存,合并到已有查询或创建新的查询
//! 3. 把新查询提交到工作线程池,然后阻塞等待所有相关查询完成
//! 4. 把瓦片数据复制到调用者的缓冲区
//!
//! 协议错误保存在编辑器上,由下一次 `read_block` 返回一次。

use super::config::ServiceConfig;
use super::pool::{TaskHandle, WorkerPool};
use super::query::{BlockExtent, BlockQuery};
use super::source::{RequestContext, TileRequest, TileSource};
use super::tile::{Tile, TileId};
use super::tile_map::TileMap;
use crate::codec::{Codec, DecompressError};
use crate::geometry::{PixelGrid, PixelRect, Region};
use crate::indicator::BlockAccessIndicator;
use crate::raster::copy_rect;
use crate::resolution::{
    AccessMode, BlockError, BlockResult, ResolutionDescriptor, ResolutionEditor,
};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, RwLock};
use tracing::*;

/// 一个分辨率层级上所有编辑器共享的状态
pub(crate) struct ServiceShared {
    descriptor: ResolutionDescriptor,
    grid: PixelGrid,
    tile_size: (u32, u32),
    max_tiles_per_block: (u32, u32),
    source: Arc<dyn TileSource>,
    codec: Arc<dyn Codec>,
    pool: Arc<WorkerPool>,
    tile_map: Mutex<TileMap>,
    error: Mutex<Option<BlockError>>,
    context: RwLock<RequestContext>,
    invalid_tile: Vec<u8>,
    placeholder: OnceLock<Arc<[u8]>>,
}

/// 一次获取的结果:需要的瓦片和需要等待的查询
struct Acquired {
    tiles: Vec<Arc<Tile>>,
    handles: Vec<TaskHandle>,
    submitted: usize,
}

impl ServiceShared {
    pub(crate) fn new(
        descriptor: ResolutionDescriptor,
        grid: PixelGrid,
        config: &ServiceConfig,
        source: Arc<dyn TileSource>,
        codec: Arc<dyn Codec>,
        pool: Arc<WorkerPool>,
    ) -> Arc<Self> {
        let tile_size = config.tile_size;
        let invalid_tile = match &config.invalid_tile {
            Some(bytes) => bytes.clone(),
            None => {
                let blank = vec![0u8; descriptor.pixel_type.bytes_per_row(tile_size.0) * tile_size.1 as usize];
                codec
                    .compress(&blank, tile_size, &descriptor.pixel_type)
                    .unwrap_or_else(|e| {
                        debug!("无法压缩空白占位图: {e:?}");
                        Vec::new()
                    })
            }
        };
        Arc::new(Self {
            grid,
            tile_size,
            max_tiles_per_block: config.max_tiles_per_block,
            source,
            codec,
            pool,
            tile_map: Mutex::new(TileMap::new(config.cache_capacity)),
            error: Mutex::new(None),
            context: RwLock::new(RequestContext::new()),
            invalid_tile,
            placeholder: OnceLock::new(),
            descriptor,
        })
    }

    pub(crate) fn descriptor(&self) -> &ResolutionDescriptor {
        &self.descriptor
    }

    pub(crate) fn tile_size(&self) -> (u32, u32) {
        self.tile_size
    }

    pub(crate) fn source(&self) -> &dyn TileSource {
        self.source.as_ref()
    }

    fn lock_map(&self) -> MutexGuard<'_, TileMap> {
        match self.tile_map.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// 构建服务器请求
    pub(crate) fn request_for(&self, extent: &BlockExtent, bbox: Region<f64>) -> TileRequest {
        let context = match self.context.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        };
        TileRequest {
            extent: *extent,
            bbox,
            dimensions: (
                (extent.width() * self.tile_size.0 as u64) as u32,
                (extent.height() * self.tile_size.1 as u64) as u32,
            ),
            format: self.codec.mime_type().to_string(),
            context,
        }
    }

    /// 把服务器返回的字节解码为原始像素
    pub(crate) fn decode(
        &self,
        dimensions: (u32, u32),
        bytes: &[u8],
    ) -> Result<Vec<u8>, DecompressError> {
        let pixel_type = &self.descriptor.pixel_type;
        let mut out = vec![0u8; pixel_type.bytes_per_row(dimensions.0) * dimensions.1 as usize];
        self.codec
            .decompress(bytes, dimensions, pixel_type, &mut out)?;
        Ok(out)
    }

    /// 解码后的占位图,第一次使用时解码
    pub(crate) fn placeholder(&self) -> Arc<[u8]> {
        let placeholder = self.placeholder.get_or_init(|| {
            let (tw, th) = self.tile_size;
            let pixel_type = &self.descriptor.pixel_type;
            let mut out = vec![0u8; pixel_type.bytes_per_row(tw) * th as usize];
            if !self.invalid_tile.is_empty() {
                if let Err(e) =
                    self.codec
                        .decompress(&self.invalid_tile, (tw, th), pixel_type, &mut out)
                {
                    warn!("占位图解码失败,使用空白瓦片: {e:?}");
                    out.fill(0);
                }
            }
            Arc::from(out)
        });
        Arc::clone(placeholder)
    }

    /// 保存一个协议错误,已经有错误时保留第一个
    pub(crate) fn store_error(&self, e: BlockError) {
        error!("瓦片服务错误: {e:?}");
        let mut slot = match self.error.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if slot.is_none() {
            *slot = Some(e);
        }
    }

    /// 取出保存的错误
    fn take_error(&self) -> BlockResult<()> {
        match self.error.lock()?.take() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// 查询结束:从列表中移除,并把仍在映射中的瓦片标记为就绪
    pub(crate) fn finish_query(&self, query: &Arc<BlockQuery>) {
        let mut map = self.lock_map();
        if !map.remove_query(query) {
            trace!("查询 {} 已不在列表中", query.extent());
        }
        for tile in query.tiles() {
            map.mark_ready(tile);
        }
    }

    fn tile_grid(&self) -> (u64, u64) {
        (
            self.descriptor.width().div_ceil(self.tile_size.0 as u64),
            self.descriptor.height().div_ceil(self.tile_size.1 as u64),
        )
    }

    fn tile_rect(&self, id: TileId) -> PixelRect {
        let (tw, th) = (self.tile_size.0 as u64, self.tile_size.1 as u64);
        PixelRect::new(id.col * tw, id.row * th, tw, th)
    }

    /// 与像素矩形重叠的瓦片
    fn tiles_overlapping(&self, rect: &PixelRect) -> Vec<TileId> {
        let Some(clip) = rect.intersect(&self.descriptor.raster_rect()) else {
            return Vec::new();
        };
        let (tw, th) = (self.tile_size.0 as u64, self.tile_size.1 as u64);
        BlockExtent::new(
            (clip.x / tw, clip.y / th),
            ((clip.right() - 1) / tw, (clip.bottom() - 1) / th),
            self.descriptor.resolution,
        )
        .tile_ids()
        .collect()
    }

    /// 把缺失的瓦片按 `max_tiles_per_block` 分组成若干请求范围
    fn plan_extents(&self, missing: &[TileId]) -> Vec<BlockExtent> {
        let (mw, mh) = (
            self.max_tiles_per_block.0 as u64,
            self.max_tiles_per_block.1 as u64,
        );
        let mut groups: BTreeMap<(u64, u64), BlockExtent> = BTreeMap::new();
        for id in missing {
            groups
                .entry((id.row / mh, id.col / mw))
                .and_modify(|extent| {
                    extent.min_col = extent.min_col.min(id.col);
                    extent.min_row = extent.min_row.min(id.row);
                    extent.max_col = extent.max_col.max(id.col);
                    extent.max_row = extent.max_row.max(id.row);
                })
                .or_insert_with(|| BlockExtent::new((id.col, id.row), (id.col, id.row), id.resolution));
        }
        groups.into_values().collect()
    }

    /// 在瓦片表锁内查找瓦片,合并到已有查询或提交新的查询
    fn acquire(self: &Arc<Self>, ids: &[TileId], look_ahead: bool) -> BlockResult<Acquired> {
        let mut map = self.tile_map.lock()?;
        let mut tiles = Vec::with_capacity(ids.len());
        let mut waits: Vec<Arc<BlockQuery>> = Vec::new();
        let mut missing = Vec::new();

        for id in ids {
            match map.get(id) {
                Some(tile) if tile.has_data() => tiles.push(tile),
                Some(tile) => match map.query_for(&tile) {
                    // 任务已结束却没有移出列表,说明它在执行中 panic 了
                    Some(query) if query.handle().is_some_and(|h| h.is_finished()) => {
                        warn!("查询 {} 异常结束,重新获取", query.extent());
                        map.remove_query(&query);
                        map.remove_tile(&tile);
                        missing.push(*id);
                    }
                    Some(query) => {
                        if !look_ahead {
                            query.mark_demanded();
                        }
                        if !waits.iter().any(|q| Arc::ptr_eq(q, &query)) {
                            trace!("瓦片 {id} 合并到已有查询 {}", query.extent());
                            waits.push(query);
                        }
                        tiles.push(tile);
                    }
                    None => {
                        map.remove_tile(&tile);
                        missing.push(*id);
                    }
                },
                None => missing.push(*id),
            }
        }

        let mut submitted = 0;
        for extent in self.plan_extents(&missing) {
            let query_tiles: Vec<Arc<Tile>> = missing
                .iter()
                .filter(|id| extent.contains(id))
                .map(|id| map.insert_pending(*id))
                .collect();
            let bbox = self.grid.world_region(&extent.pixel_rect(self.tile_size));
            let query = Arc::new(BlockQuery::new(
                extent,
                bbox,
                query_tiles.clone(),
                look_ahead,
                Arc::downgrade(self),
            ));
            let job = Arc::clone(&query);
            match self.pool.submit(move || job.run()) {
                Ok(handle) => {
                    query.set_handle(handle);
                    map.add_query(Arc::clone(&query));
                    debug!(
                        "提交查询 {extent} ({} 个瓦片{})",
                        query_tiles.len(),
                        if look_ahead { ", 预取" } else { "" }
                    );
                    tiles.extend(query_tiles);
                    waits.push(query);
                    submitted += 1;
                }
                Err(e) => {
                    error!("查询 {extent} 提交失败: {e:?}");
                    for tile in &query_tiles {
                        map.remove_tile(tile);
                    }
                    return Err(e.into());
                }
            }
        }

        let handles = waits.iter().filter_map(|q| q.handle().cloned()).collect();
        Ok(Acquired {
            tiles,
            handles,
            submitted,
        })
    }

    fn read_block(self: &Arc<Self>, pos_x: u64, pos_y: u64, out: &mut [u8]) -> BlockResult<()> {
        self.take_error()?;
        self.descriptor.check_position(pos_x, pos_y)?;
        self.descriptor.check_buffer(out.len())?;

        let block = self.descriptor.block_rect(pos_x, pos_y);
        let ids = self.tiles_overlapping(&block);
        let acquired = self.acquire(&ids, false)?;
        for handle in &acquired.handles {
            handle.wait();
        }
        self.take_error()?;

        let pixel_type = &self.descriptor.pixel_type;
        let block_row_size = self.descriptor.bytes_per_block_row();
        let tile_row_size = pixel_type.bytes_per_row(self.tile_size.0);
        let raster = self.descriptor.raster_rect();
        let mut assembled = vec![0u8; out.len()];
        for tile in &acquired.tiles {
            let data = tile
                .data()
                .ok_or(BlockError::TileUnavailable(tile.id()))?;
            let tile_rect = self.tile_rect(tile.id());
            let Some(area) = tile_rect
                .intersect(&block)
                .and_then(|area| area.intersect(&raster))
            else {
                continue;
            };
            copy_rect(
                data.bytes(),
                tile_row_size,
                ((area.x - tile_rect.x) as u32, (area.y - tile_rect.y) as u32),
                &mut assembled,
                block_row_size,
                ((area.x - block.x) as u32, (area.y - block.y) as u32),
                (area.width as u32, area.height as u32),
                pixel_type,
            )?;
        }
        out.copy_from_slice(&assembled);
        Ok(())
    }

    fn request_look_ahead(self: &Arc<Self>, ids: &[TileId]) -> BlockResult<usize> {
        let (cols, rows) = self.tile_grid();
        let limit = (self.max_tiles_per_block.0 * self.max_tiles_per_block.1) as usize;
        let mut wanted: Vec<TileId> = Vec::with_capacity(ids.len().min(limit));
        for id in ids {
            if id.resolution != self.descriptor.resolution || id.col >= cols || id.row >= rows {
                warn!("忽略无效的预取瓦片 {id}");
                continue;
            }
            if !wanted.contains(id) {
                wanted.push(*id);
            }
        }
        if wanted.len() > limit {
            debug!("预取 {} 个瓦片超过上限 {limit}", wanted.len());
            wanted.truncate(limit);
        }
        Ok(self.acquire(&wanted, true)?.submitted)
    }

    pub(crate) fn cancel_look_ahead(&self) -> BlockResult<usize> {
        let mut map = self.tile_map.lock()?;
        let removed = map.drain_queries(|q| q.is_look_ahead() && !q.is_demanded());
        for query in &removed {
            query.cancel();
        }
        if !removed.is_empty() {
            debug!("取消 {} 个预取查询", removed.len());
        }
        Ok(removed.len())
    }

    pub(crate) fn context_changed(&self, context: RequestContext) -> BlockResult<()> {
        *self.context.write()? = context;
        let mut map = self.tile_map.lock()?;
        let removed = map.clear();
        for query in &removed {
            if !query.is_demanded() {
                query.cancel();
            }
        }
        debug!(
            "请求上下文已改变,清空瓦片缓存 ({} 个查询)",
            removed.len()
        );
        Ok(())
    }
}

/// OGC 瓦片服务上某个分辨率层级的编辑器
///
/// 只读。克隆出的编辑器共享同一个瓦片缓存和查询列表,可以在不同线程上同时读取。
#[derive(Clone)]
pub struct ServiceEditor {
    shared: Arc<ServiceShared>,
    indicator: Option<Arc<BlockAccessIndicator>>,
}

impl ServiceEditor {
    pub(crate) fn new(shared: Arc<ServiceShared>) -> Self {
        Self {
            shared,
            indicator: None,
        }
    }

    /// 读写失败时通知指示器
    pub fn with_indicator(mut self, indicator: Arc<BlockAccessIndicator>) -> Self {
        self.indicator = Some(indicator);
        self
    }

    /// 与块重叠的服务器瓦片
    pub fn tiles_for_block(&self, pos_x: u64, pos_y: u64) -> BlockResult<Vec<TileId>> {
        self.shared.descriptor.check_position(pos_x, pos_y)?;
        Ok(self
            .shared
            .tiles_overlapping(&self.shared.descriptor.block_rect(pos_x, pos_y)))
    }

    /// 预取瓦片,不阻塞调用者
    ///
    /// 返回提交的查询数量。
    pub fn request_look_ahead(&self, ids: &[TileId]) -> BlockResult<usize> {
        self.shared.request_look_ahead(ids)
    }

    /// 取消还没有读取者等待的预取查询
    ///
    /// 已经开始的网络请求不会被中断,它们的结果到达后被丢弃。
    pub fn cancel_look_ahead(&self) -> BlockResult<usize> {
        self.shared.cancel_look_ahead()
    }

    /// 替换请求上下文并清空瓦片缓存
    pub fn context_changed(&self, context: RequestContext) -> BlockResult<()> {
        self.shared.context_changed(context)
    }

    /// 缓存中已就绪的瓦片数量
    pub fn cached_tiles(&self) -> usize {
        self.shared.lock_map().ready_count()
    }

    /// 尚未完成的查询数量
    pub fn outstanding_queries(&self) -> usize {
        self.shared.lock_map().queries().len()
    }
}

impl ResolutionEditor for ServiceEditor {
    fn descriptor(&self) -> &ResolutionDescriptor {
        &self.shared.descriptor
    }

    fn access_mode(&self) -> AccessMode {
        AccessMode::READ
    }

    fn read_block(&mut self, pos_x: u64, pos_y: u64, out: &mut [u8]) -> BlockResult<()> {
        let result = self.shared.read_block(pos_x, pos_y, out);
        if let (Err(e), Some(indicator)) = (&result, &self.indicator) {
            indicator.notify_read_error(self.shared.descriptor.resolution, (pos_x, pos_y), e);
        }
        result
    }

    fn write_block(&mut self, pos_x: u64, pos_y: u64, _data: &[u8]) -> BlockResult<()> {
        let e = BlockError::AccessDenied(AccessMode::READ_WRITE);
        if let Some(indicator) = &self.indicator {
            indicator.notify_write_error(self.shared.descriptor.resolution, (pos_x, pos_y), &e);
        }
        Err(e)
    }
}
