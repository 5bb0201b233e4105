//! 块适配器模块
//!
//! [`BlockAdapter`] 包装一个 [`ResolutionEditor`],以不同于原生存储的分块几何
//! 重新提供 `read_block` / `write_block`,调用者不需要知道两者之间的差异。
//!
//! 适配策略在构造时根据原生块种类和要暴露的块种类选定:
//!
//! | 原生块 | 暴露块 | 策略 |
//! |---|---|---|
//! | 与暴露相同 | 任意 | [`AdapterKind::Passthrough`] |
//! | 覆盖整幅图像 | 行 | [`AdapterKind::ImageToLine`] |
//! | 整幅宽度的条带 | 行 | [`AdapterKind::StripToLine`] |
//! | 瓦片/条带/行 | 整幅图像 | [`AdapterKind::TileToImage`] |
//!
//! 一个适配器实例同一时间只能被一个线程使用。

mod line;
mod staging;
mod tile_to_image;

use crate::indicator::BlockAccessIndicator;
use crate::resolution::{
    AccessMode, BlockError, BlockResult, BlockType, ResolutionDescriptor, ResolutionEditor,
};
use line::LineAdapter;
use std::sync::Arc;
use tile_to_image::TileToImage;
use tracing::*;

/// 适配策略
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AdapterKind {
    /// 原生几何与暴露几何相同,直接转发
    Passthrough,
    /// 单个整幅图像块按行暴露
    ImageToLine,
    /// 多个条带按行暴露
    StripToLine,
    /// 多个瓦片拼接为一个整幅图像块
    TileToImage,
}

enum Strategy {
    Passthrough,
    Line(LineAdapter),
    TileToImage(TileToImage),
}

/// 块适配器
pub struct BlockAdapter {
    editor: Box<dyn ResolutionEditor>,
    exposed: ResolutionDescriptor,
    kind: AdapterKind,
    strategy: Strategy,
    indicator: Option<Arc<BlockAccessIndicator>>,
}

impl BlockAdapter {
    /// 包装一个编辑器,以 `exposed_type` 暴露块
    ///
    /// # 错误
    /// 没有适用的策略时返回 `NotSupported`
    pub fn new(editor: Box<dyn ResolutionEditor>, exposed_type: BlockType) -> BlockResult<Self> {
        let native = editor.descriptor();
        let (kind, exposed) = select_strategy(native, exposed_type)?;
        debug!("{native} -> {exposed}: {kind:?}");
        let strategy = match kind {
            AdapterKind::Passthrough => Strategy::Passthrough,
            AdapterKind::ImageToLine | AdapterKind::StripToLine => {
                Strategy::Line(LineAdapter::new())
            }
            AdapterKind::TileToImage => Strategy::TileToImage(TileToImage::new()),
        };
        Ok(Self {
            editor,
            exposed,
            kind,
            strategy,
            indicator: None,
        })
    }

    /// 读写失败时通知指示器
    pub fn with_indicator(mut self, indicator: Arc<BlockAccessIndicator>) -> Self {
        self.indicator = Some(indicator);
        self
    }

    pub fn kind(&self) -> AdapterKind {
        self.kind
    }

    /// 被包装编辑器的分辨率描述
    pub fn native_descriptor(&self) -> &ResolutionDescriptor {
        self.editor.descriptor()
    }

    /// 行适配器下一个应当写入的行
    pub fn next_line_to_write(&self) -> Option<u64> {
        match &self.strategy {
            Strategy::Line(line) => Some(line.next_line_to_write()),
            _ => None,
        }
    }

    fn read_exposed(&mut self, pos_x: u64, pos_y: u64, out: &mut [u8]) -> BlockResult<()> {
        if !self.editor.access_mode().can_read() {
            return Err(BlockError::AccessDenied(AccessMode::READ));
        }
        self.exposed.check_position(pos_x, pos_y)?;
        self.exposed.check_buffer(out.len())?;
        match &mut self.strategy {
            Strategy::Passthrough => self.editor.read_block(pos_x, pos_y, out),
            Strategy::Line(line) => line.read_line(self.editor.as_mut(), pos_y, out),
            Strategy::TileToImage(image) => image.read_image(self.editor.as_mut(), out),
        }
    }

    fn write_exposed(&mut self, pos_x: u64, pos_y: u64, data: &[u8]) -> BlockResult<()> {
        if !self.editor.access_mode().can_write() {
            return Err(BlockError::AccessDenied(AccessMode::READ_WRITE));
        }
        self.exposed.check_position(pos_x, pos_y)?;
        self.exposed.check_buffer(data.len())?;
        match &mut self.strategy {
            Strategy::Passthrough => self.editor.write_block(pos_x, pos_y, data),
            Strategy::Line(line) => line.write_line(self.editor.as_mut(), pos_y, data),
            Strategy::TileToImage(image) => image.write_image(self.editor.as_mut(), data),
        }
    }
}

impl ResolutionEditor for BlockAdapter {
    fn descriptor(&self) -> &ResolutionDescriptor {
        &self.exposed
    }

    fn access_mode(&self) -> AccessMode {
        self.editor.access_mode()
    }

    fn read_block(&mut self, pos_x: u64, pos_y: u64, out: &mut [u8]) -> BlockResult<()> {
        let result = self.read_exposed(pos_x, pos_y, out);
        if let Err(e) = &result {
            if let Some(indicator) = &self.indicator {
                indicator.notify_read_error(self.exposed.resolution, (pos_x, pos_y), e);
            }
        }
        result
    }

    fn write_block(&mut self, pos_x: u64, pos_y: u64, data: &[u8]) -> BlockResult<()> {
        let result = self.write_exposed(pos_x, pos_y, data);
        if let Err(e) = &result {
            if matches!(e, BlockError::Misaligned(_) | BlockError::BufferSize(_)) {
                error!("块写入违反调用约定: {e:?}");
            }
            if let Some(indicator) = &self.indicator {
                indicator.notify_write_error(self.exposed.resolution, (pos_x, pos_y), e);
            }
        }
        result
    }
}

/// 根据原生几何和要暴露的块种类选择策略,返回策略和暴露的描述
fn select_strategy(
    native: &ResolutionDescriptor,
    exposed_type: BlockType,
) -> BlockResult<(AdapterKind, ResolutionDescriptor)> {
    if native.block_type == exposed_type {
        return Ok((AdapterKind::Passthrough, native.clone()));
    }
    let to_u32 = |value: u64| {
        u32::try_from(value).map_err(|_| {
            BlockError::NotSupported(format!("栅格尺寸 {value} 超出单个块的范围"))
        })
    };
    let full_width = native.block_width as u64 >= native.width();

    match exposed_type {
        BlockType::Line if full_width => {
            let exposed = native.derive_exposed(to_u32(native.width())?, 1, BlockType::Line)?;
            let kind = if native.block_height as u64 >= native.height() {
                AdapterKind::ImageToLine
            } else {
                AdapterKind::StripToLine
            };
            Ok((kind, exposed))
        }
        BlockType::Image if native.pixel_type.is_byte_aligned() => {
            let exposed = native.derive_exposed(
                to_u32(native.width())?,
                to_u32(native.height())?,
                BlockType::Image,
            )?;
            Ok((AdapterKind::TileToImage, exposed))
        }
        _ => Err(BlockError::NotSupported(format!(
            "无法把 {:?} {}x{} 的块适配为 {exposed_type:?}",
            native.block_type, native.block_width, native.block_height
        ))),
    }
}
