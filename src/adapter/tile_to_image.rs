//! 瓦片到整幅图像的适配器
//!
//! 把按瓦片存储的层级作为一个覆盖整幅图像的块暴露出来。
//! 读取时逐个读取瓦片并拼接,写入时把图像切分为瓦片逐个写出,
//! 超出栅格范围的瓦片部分用0填充。

use super::staging::StagingBuffer;
use crate::raster::BlockBuffer;
use crate::resolution::{BlockResult, ResolutionEditor};
use tracing::*;

pub(super) struct TileToImage {
    staging: StagingBuffer,
}

impl TileToImage {
    pub fn new() -> Self {
        Self {
            staging: StagingBuffer::new("瓦片拼接"),
        }
    }

    pub fn read_image(&mut self, editor: &mut dyn ResolutionEditor, out: &mut [u8]) -> BlockResult<()> {
        let native = editor.descriptor().clone();
        let raster = native.raster_rect();
        let mut image = BlockBuffer::blank(
            (native.width() as u32, native.height() as u32),
            native.pixel_type.clone(),
        );

        for index in 0..native.block_count() as usize {
            let (bx, by) = native.block_origin(index);
            let tile = self.staging.acquire(
                (0, 0),
                (native.block_width, native.block_height),
                &native.pixel_type,
            );
            if let Err(e) = editor.read_block(bx, by, tile.as_mut_slice()) {
                self.staging.release();
                return Err(e);
            }
            let Some(area) = native.block_rect(bx, by).intersect(&raster) else {
                continue;
            };
            image.copy_region_from(
                tile,
                (0, 0),
                (bx as u32, by as u32),
                (area.width as u32, area.height as u32),
            )?;
        }
        self.staging.release();
        trace!("拼接了 {} 个瓦片", native.block_count());
        out.copy_from_slice(image.as_slice());
        Ok(())
    }

    pub fn write_image(&mut self, editor: &mut dyn ResolutionEditor, data: &[u8]) -> BlockResult<()> {
        let native = editor.descriptor().clone();
        let raster = native.raster_rect();
        let image = BlockBuffer::new(
            (native.width() as u32, native.height() as u32),
            data.to_vec(),
            native.pixel_type.clone(),
        )?;

        for index in 0..native.block_count() as usize {
            let (bx, by) = native.block_origin(index);
            let Some(area) = native.block_rect(bx, by).intersect(&raster) else {
                continue;
            };
            let tile = self.staging.acquire(
                (0, 0),
                (native.block_width, native.block_height),
                &native.pixel_type,
            );
            tile.clear();
            tile.copy_region_from(
                &image,
                (bx as u32, by as u32),
                (0, 0),
                (area.width as u32, area.height as u32),
            )?;
            if let Err(e) = editor.write_block(bx, by, tile.as_slice()) {
                self.staging.release();
                return Err(e);
            }
        }
        self.staging.release();
        debug!("切分写出了 {} 个瓦片", native.block_count());
        Ok(())
    }
}
