//! 瓦片映射模块
//!
//! 瓦片表、已就绪瓦片的 LRU 顺序和未完成的查询列表共用一把锁,
//! 由持有者(`ServiceShared`)放在同一个 `Mutex` 里。

use super::query::BlockQuery;
use super::tile::{Tile, TileId};
use lru::LruCache;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::*;

pub(crate) struct TileMap {
    tiles: HashMap<TileId, Arc<Tile>>,
    ready: LruCache<TileId, ()>,
    queries: Vec<Arc<BlockQuery>>,
    capacity: usize,
}

impl TileMap {
    pub fn new(capacity: usize) -> Self {
        Self {
            tiles: HashMap::new(),
            ready: LruCache::unbounded(),
            queries: Vec::new(),
            capacity: capacity.max(1),
        }
    }

    /// 查找瓦片,已就绪的瓦片同时被标记为最近使用
    pub fn get(&mut self, id: &TileId) -> Option<Arc<Tile>> {
        let tile = self.tiles.get(id)?;
        self.ready.promote(id);
        Some(Arc::clone(tile))
    }

    /// 插入一个挂起的瓦片
    pub fn insert_pending(&mut self, id: TileId) -> Arc<Tile> {
        let tile = Arc::new(Tile::new(id));
        if let Some(old) = self.tiles.insert(id, Arc::clone(&tile)) {
            debug!("替换瓦片 {}", old.id());
            self.ready.pop(&id);
        }
        tile
    }

    /// 把一个已写入数据的瓦片标记为就绪
    ///
    /// 只有映射里仍然是同一个瓦片对象时才生效,返回是否生效。
    pub fn mark_ready(&mut self, tile: &Arc<Tile>) -> bool {
        let id = tile.id();
        let mapped = matches!(self.tiles.get(&id), Some(current) if Arc::ptr_eq(current, tile));
        if !mapped || !tile.has_data() {
            return false;
        }
        self.ready.put(id, ());
        while self.ready.len() > self.capacity {
            if let Some((evicted, ())) = self.ready.pop_lru() {
                trace!("淘汰瓦片 {evicted}");
                self.tiles.remove(&evicted);
            }
        }
        true
    }

    /// 删除一个瓦片,只有映射里是同一个瓦片对象时才删除
    pub fn remove_tile(&mut self, tile: &Arc<Tile>) {
        let id = tile.id();
        if matches!(self.tiles.get(&id), Some(current) if Arc::ptr_eq(current, tile)) {
            self.tiles.remove(&id);
            self.ready.pop(&id);
        }
    }

    pub fn add_query(&mut self, query: Arc<BlockQuery>) {
        self.queries.push(query);
    }

    /// 从列表中移除查询,返回它是否还在列表中
    pub fn remove_query(&mut self, query: &Arc<BlockQuery>) -> bool {
        let before = self.queries.len();
        self.queries.retain(|q| !Arc::ptr_eq(q, query));
        before != self.queries.len()
    }

    /// 查找负责获取某个瓦片的查询
    pub fn query_for(&self, tile: &Arc<Tile>) -> Option<Arc<BlockQuery>> {
        self.queries.iter().find(|q| q.owns(tile)).cloned()
    }

    pub fn queries(&self) -> &[Arc<BlockQuery>] {
        &self.queries
    }

    /// 删除满足条件的查询以及它们负责的挂起瓦片,返回被删除的查询
    pub fn drain_queries<F>(&mut self, mut filter: F) -> Vec<Arc<BlockQuery>>
    where
        F: FnMut(&BlockQuery) -> bool,
    {
        let (removed, kept): (Vec<_>, Vec<_>) =
            self.queries.drain(..).partition(|q| filter(q.as_ref()));
        self.queries = kept;
        for query in &removed {
            for tile in query.tiles() {
                if !tile.has_data() {
                    self.remove_tile(tile);
                }
            }
        }
        removed
    }

    /// 清空所有瓦片和查询,返回被移除的查询
    pub fn clear(&mut self) -> Vec<Arc<BlockQuery>> {
        self.tiles.clear();
        self.ready.clear();
        std::mem::take(&mut self.queries)
    }

    pub fn len(&self) -> usize {
        self.tiles.len()
    }

    pub fn ready_count(&self) -> usize {
        self.ready.len()
    }
}
