//! 像素布局枚举
//!
//! 描述一个像素的样本如何组成颜色。适配器只关心位数,
//! 这些信息给编解码插件用来选择解码后的通道布局。

use num_enum::{FromPrimitive, IntoPrimitive};

/// 颜色模型
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy, IntoPrimitive, FromPrimitive)]
#[repr(u8)]
pub enum ColorModel {
    /// 灰度,0为黑色
    Gray = 1,
    /// RGB 三通道
    Rgb = 2,
    #[num_enum(default)]
    Unknown = 0xFF,
}

/// 样本的数值格式
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy, IntoPrimitive, FromPrimitive)]
#[repr(u8)]
pub enum SampleFormat {
    Unsigned = 1,
    Signed = 2,
    Float = 3,
    #[num_enum(default)]
    Unknown = 0xFF,
}

/// alpha 通道的含义
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy, IntoPrimitive, FromPrimitive)]
#[repr(u8)]
pub enum AlphaChannel {
    /// 颜色值已经乘过 alpha
    Premultiplied = 1,
    /// 颜色值与 alpha 相互独立
    Straight = 2,
    #[num_enum(default)]
    Unknown = 0xFF,
}
