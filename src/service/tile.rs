//! 服务瓦片模块
//!
//! [`Tile`] 是一个只能写入一次的单元:创建时为空(挂起),
//! 由 `BlockQuery` 任务写入一次数据后对所有读取者可见,之后不再改变。

use std::fmt;
use std::sync::{Arc, OnceLock};

/// 瓦片标识,由列、行和分辨率层级组成
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TileId {
    pub resolution: u16,
    pub row: u64,
    pub col: u64,
}

impl TileId {
    pub fn new(col: u64, row: u64, resolution: u16) -> Self {
        Self {
            resolution,
            row,
            col,
        }
    }
}

impl fmt::Display for TileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Tile({}/{}/{})", self.resolution, self.col, self.row)
    }
}

/// 瓦片的已解码像素数据
#[derive(Debug, Clone)]
pub enum TileData {
    /// 从服务器成功获取并解码的数据
    Fetched(Arc<[u8]>),
    /// 获取失败时替代的占位图
    Invalid(Arc<[u8]>),
}

impl TileData {
    pub fn bytes(&self) -> &[u8] {
        match self {
            TileData::Fetched(bytes) | TileData::Invalid(bytes) => bytes,
        }
    }

    pub fn is_invalid(&self) -> bool {
        matches!(self, TileData::Invalid(_))
    }
}

/// 一个网络瓦片
pub struct Tile {
    id: TileId,
    data: OnceLock<TileData>,
}

impl Tile {
    /// 创建一个挂起状态的瓦片
    pub fn new(id: TileId) -> Self {
        Self {
            id,
            data: OnceLock::new(),
        }
    }

    pub fn id(&self) -> TileId {
        self.id
    }

    /// 数据是否已经写入
    pub fn has_data(&self) -> bool {
        self.data.get().is_some()
    }

    /// 写入数据,只有第一次写入生效
    ///
    /// 返回本次写入是否生效。
    pub fn set_data(&self, data: TileData) -> bool {
        self.data.set(data).is_ok()
    }

    pub fn data(&self) -> Option<&TileData> {
        self.data.get()
    }
}

impl fmt::Debug for Tile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match self.data.get() {
            None => "pending",
            Some(TileData::Fetched(_)) => "fetched",
            Some(TileData::Invalid(_)) => "invalid",
        };
        f.debug_struct("Tile")
            .field("id", &self.id)
            .field("state", &state)
            .finish()
    }
}
