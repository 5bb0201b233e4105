//! 分辨率层级与块级读写模块
//!
//! 本模块定义了栅格文件中单个分辨率层级的块级读写原语。
//!
//! # 核心组件
//!
//! - [`ResolutionDescriptor`] - 分辨率层级的不可变元数据
//! - [`ResolutionEditor`] - 按原生块读写某个层级的接口
//! - [`BlockType`] - 原生块的种类(行、条带、瓦片、整幅图像)
//! - [`AccessMode`] - 打开文件时确定的读写权限
//! - [`MemoryEditor`] - 基于内存的编辑器实现
//!
//! 编辑器不知道行与块之间的几何差异,这由 [`crate::adapter`] 负责。

use num_enum::{FromPrimitive, IntoPrimitive};
use std::fmt;

mod descriptor;
mod error;
mod memory;

pub use descriptor::ResolutionDescriptor;
pub use error::{BlockError, BlockResult};
pub use memory::{MemoryEditor, MemoryRaster, MemoryRasterCreator, MemoryStore};

/// 原生块的种类
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy, IntoPrimitive, FromPrimitive)]
#[repr(u8)]
pub enum BlockType {
    /// 单行,块高度为1,宽度为整幅图像
    Line = 0,
    /// 条带,宽度为整幅图像,高度为若干行
    Strip = 1,
    /// 瓦片,宽高都小于整幅图像
    #[num_enum(default)]
    Tile = 2,
    /// 整幅图像作为一个块
    Image = 3,
}

/// 读写权限,在构造时确定且之后不变
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AccessMode {
    pub read: bool,
    pub write: bool,
    pub create: bool,
}

impl AccessMode {
    /// 只读
    pub const READ: AccessMode = AccessMode {
        read: true,
        write: false,
        create: false,
    };
    /// 读写已有数据
    pub const READ_WRITE: AccessMode = AccessMode {
        read: true,
        write: true,
        create: false,
    };
    /// 创建新数据
    pub const CREATE: AccessMode = AccessMode {
        read: false,
        write: true,
        create: true,
    };

    /// 是否允许读取
    pub fn can_read(&self) -> bool {
        self.read
    }

    /// 是否允许写入(写入或创建权限)
    pub fn can_write(&self) -> bool {
        self.write || self.create
    }
}

impl fmt::Display for AccessMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let flag = |on: bool, c: char| if on { c } else { '-' };
        write!(
            f,
            "{}{}{}",
            flag(self.read, 'r'),
            flag(self.write, 'w'),
            flag(self.create, 'c')
        )
    }
}

/// 按原生块读写一个分辨率层级
///
/// 所有物理 IO 都经过这个接口。块位置是块左上角的像素坐标。
pub trait ResolutionEditor: Send {
    /// 该层级的分辨率描述
    fn descriptor(&self) -> &ResolutionDescriptor;

    /// 打开时确定的访问模式
    fn access_mode(&self) -> AccessMode;

    /// 读取一个原生块到 `out`
    ///
    /// `out` 的长度必须是 `descriptor().block_size_bytes()`。
    fn read_block(&mut self, pos_x: u64, pos_y: u64, out: &mut [u8]) -> BlockResult<()>;

    /// 写入一个完整的原生块
    fn write_block(&mut self, pos_x: u64, pos_y: u64, data: &[u8]) -> BlockResult<()>;
}

impl<E: ResolutionEditor + ?Sized> ResolutionEditor for Box<E> {
    fn descriptor(&self) -> &ResolutionDescriptor {
        (**self).descriptor()
    }

    fn access_mode(&self) -> AccessMode {
        (**self).access_mode()
    }

    fn read_block(&mut self, pos_x: u64, pos_y: u64, out: &mut [u8]) -> BlockResult<()> {
        (**self).read_block(pos_x, pos_y, out)
    }

    fn write_block(&mut self, pos_x: u64, pos_y: u64, data: &[u8]) -> BlockResult<()> {
        (**self).write_block(pos_x, pos_y, data)
    }
}
