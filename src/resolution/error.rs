//! 块访问错误处理模块
//!
//! 本模块定义了所有 `read_block` / `write_block` 调用共用的错误类型 [`BlockError`]。
//!
//! # 错误分类
//!
//! ## 契约违反
//! - 乱序写入、未对齐的块位置、缓冲区大小错误
//! - 在没有相应访问权限时读写
//!
//! ## 数据访问错误
//! - 块位置超出栅格范围
//! - 瓦片不可用
//!
//! ## 数据处理错误
//! - 解码失败、服务器返回格式错误的响应
//!
//! ## 资源错误
//! - 工作线程池提交失败、互斥锁中毒、IO 错误

use super::AccessMode;
use crate::codec::DecompressError;
use crate::raster::RasterError;
use crate::service::{FetchError, PoolError, TileId};
use std::fmt;
use std::io;
use std::sync::PoisonError;

/// 块访问操作的通用结果类型
pub type BlockResult<T> = Result<T, BlockError>;

/// 块访问中所有可能出现的错误类型
#[derive(Debug)]
pub enum BlockError {
    /// 分辨率描述无效
    BadDescriptor(String),
    /// 访问模式不允许该操作,包含所需的访问模式
    AccessDenied(AccessMode),
    /// 块位置超出栅格范围,包含 (请求的位置, 栅格尺寸)
    BlockOutOfRange(((u64, u64), (u64, u64))),
    /// 块位置没有对齐到块边界,包含 (请求的位置, 块尺寸)
    Misaligned(((u64, u64), (u32, u32))),
    /// 缓冲区大小错误,包含 (期望字节数, 实际字节数)
    BufferSize((usize, usize)),
    /// 写入顺序错误,包含 (期望的行, 实际的行)
    OutOfOrderWrite((u64, u64)),
    /// 暂存缓冲区中有尚未写出的行,包含下一个待写入的行
    PendingWrite(u64),
    /// 数据解码错误
    Decompress(DecompressError),
    /// 栅格块处理错误
    Raster(RasterError),
    /// 网络或数据源读取失败
    Fetch(String),
    /// 服务器响应的协议或数据格式错误
    Protocol(String),
    /// 工作线程池错误
    Pool(PoolError),
    /// 瓦片在查询结束后仍然没有数据
    TileUnavailable(TileId),
    /// 没有能处理该位置的创建器
    NoCreator(String),
    /// 服务地址无法解析
    InvalidUrl(url::ParseError),
    /// 文件读取错误
    ReadError(io::Error),
    /// 互斥锁错误,包含错误描述
    MutexError(String),
    /// 不支持的操作,包含具体说明
    NotSupported(String),
}

impl fmt::Display for BlockError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl std::error::Error for BlockError {}

impl From<DecompressError> for BlockError {
    fn from(e: DecompressError) -> Self {
        BlockError::Decompress(e)
    }
}

impl From<RasterError> for BlockError {
    fn from(e: RasterError) -> Self {
        BlockError::Raster(e)
    }
}

impl From<PoolError> for BlockError {
    fn from(e: PoolError) -> Self {
        BlockError::Pool(e)
    }
}

/// 协议错误单独保留,其余的获取失败都归为 `Fetch`
impl From<FetchError> for BlockError {
    fn from(e: FetchError) -> Self {
        match e {
            FetchError::Protocol(msg) => BlockError::Protocol(msg),
            other => BlockError::Fetch(format!("{other}")),
        }
    }
}

impl From<url::ParseError> for BlockError {
    fn from(e: url::ParseError) -> Self {
        BlockError::InvalidUrl(e)
    }
}

impl From<io::Error> for BlockError {
    fn from(e: io::Error) -> Self {
        BlockError::ReadError(e)
    }
}

impl<T> From<PoisonError<T>> for BlockError {
    fn from(e: PoisonError<T>) -> Self {
        BlockError::MutexError(format!("{e:?}"))
    }
}
