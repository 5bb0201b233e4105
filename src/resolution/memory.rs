//! 内存栅格模块
//!
//! 把每个分辨率层级的原生块保存在进程内存中。未写入过的块读出来是全0。
//! 多个编辑器可以同时打开同一个 [`MemoryRaster`],它们共享同一份块数据,
//! 因此"关闭后重新打开"只需要丢弃编辑器再创建一个新的。

use super::{AccessMode, BlockError, BlockResult, ResolutionDescriptor, ResolutionEditor};
use crate::factory::{RasterFile, RasterFileCreator};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};
use tracing::*;

/// `mem://` 位置前缀
pub const MEMORY_SCHEME: &str = "mem://";

/// 一个层级的块数据
#[derive(Debug)]
struct MemoryLevel {
    descriptor: ResolutionDescriptor,
    blocks: Vec<Option<Vec<u8>>>,
}

/// 内存中的多分辨率栅格
#[derive(Clone)]
pub struct MemoryRaster {
    location: String,
    access: AccessMode,
    descriptors: Vec<ResolutionDescriptor>,
    levels: Arc<Vec<Mutex<MemoryLevel>>>,
}

impl MemoryRaster {
    /// 创建一个新的内存栅格,每个描述对应一个分辨率层级
    ///
    /// # 错误
    /// 没有任何层级时返回 `BadDescriptor`
    pub fn new(location: &str, descriptors: Vec<ResolutionDescriptor>) -> BlockResult<Self> {
        if descriptors.is_empty() {
            return Err(BlockError::BadDescriptor("内存栅格至少需要一个层级".into()));
        }
        let levels = descriptors
            .iter()
            .map(|descriptor| {
                Mutex::new(MemoryLevel {
                    descriptor: descriptor.clone(),
                    blocks: vec![None; descriptor.block_count() as usize],
                })
            })
            .collect();
        Ok(Self {
            location: location.to_string(),
            access: AccessMode {
                read: true,
                write: true,
                create: true,
            },
            descriptors,
            levels: Arc::new(levels),
        })
    }

    /// 以指定访问模式共享同一份数据
    pub fn with_access(&self, access: AccessMode) -> Self {
        Self {
            access,
            ..self.clone()
        }
    }

    /// 打开某个层级的编辑器
    pub fn editor(&self, resolution: usize, access: AccessMode) -> BlockResult<MemoryEditor> {
        let descriptor = self
            .descriptors
            .get(resolution)
            .ok_or_else(|| {
                BlockError::NotSupported(format!(
                    "层级 {resolution} 超出范围 (共 {} 个层级)",
                    self.descriptors.len()
                ))
            })?
            .clone();
        if (access.can_read() && !self.access.can_read())
            || (access.can_write() && !self.access.can_write())
        {
            return Err(BlockError::AccessDenied(access));
        }
        Ok(MemoryEditor {
            descriptor,
            access,
            resolution,
            levels: Arc::clone(&self.levels),
        })
    }
}

impl fmt::Debug for MemoryRaster {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryRaster")
            .field("location", &self.location)
            .field("access", &self.access)
            .field("levels", &self.descriptors.len())
            .finish()
    }
}

impl RasterFile for MemoryRaster {
    fn location(&self) -> &str {
        &self.location
    }

    fn resolutions(&self) -> &[ResolutionDescriptor] {
        &self.descriptors
    }

    fn access_mode(&self) -> AccessMode {
        self.access
    }

    fn create_editor(
        &self,
        resolution: usize,
        access: AccessMode,
    ) -> BlockResult<Box<dyn ResolutionEditor>> {
        Ok(Box::new(self.editor(resolution, access)?))
    }
}

/// 内存栅格的某个层级上的编辑器
pub struct MemoryEditor {
    descriptor: ResolutionDescriptor,
    access: AccessMode,
    resolution: usize,
    levels: Arc<Vec<Mutex<MemoryLevel>>>,
}

impl ResolutionEditor for MemoryEditor {
    fn descriptor(&self) -> &ResolutionDescriptor {
        &self.descriptor
    }

    fn access_mode(&self) -> AccessMode {
        self.access
    }

    fn read_block(&mut self, pos_x: u64, pos_y: u64, out: &mut [u8]) -> BlockResult<()> {
        if !self.access.can_read() {
            return Err(BlockError::AccessDenied(AccessMode::READ));
        }
        self.descriptor.check_buffer(out.len())?;
        let index = self.descriptor.block_index(pos_x, pos_y)?;
        let level = self.levels[self.resolution].lock()?;
        match &level.blocks[index] {
            Some(block) => out.copy_from_slice(block),
            None => {
                trace!("内存块 ({pos_x}, {pos_y}) 尚未写入,返回全0");
                out.fill(0);
            }
        }
        Ok(())
    }

    fn write_block(&mut self, pos_x: u64, pos_y: u64, data: &[u8]) -> BlockResult<()> {
        if !self.access.can_write() {
            return Err(BlockError::AccessDenied(AccessMode::READ_WRITE));
        }
        self.descriptor.check_buffer(data.len())?;
        let index = self.descriptor.block_index(pos_x, pos_y)?;
        let mut level = self.levels[self.resolution].lock()?;
        debug_assert_eq!(level.descriptor, self.descriptor);
        level.blocks[index] = Some(data.to_vec());
        Ok(())
    }
}

/// 按位置索引的内存栅格集合
///
/// 在应用启动时创建一次,然后注入到 [`MemoryRasterCreator`]。
#[derive(Clone, Default)]
pub struct MemoryStore {
    rasters: Arc<Mutex<HashMap<String, MemoryRaster>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 创建并登记一个新的内存栅格,同一位置上已有的栅格会被替换
    pub fn create(
        &self,
        location: &str,
        descriptors: Vec<ResolutionDescriptor>,
    ) -> BlockResult<MemoryRaster> {
        let raster = MemoryRaster::new(location, descriptors)?;
        self.rasters
            .lock()?
            .insert(location.to_string(), raster.clone());
        debug!("创建内存栅格 {location}");
        Ok(raster)
    }

    /// 查找已登记的内存栅格
    pub fn get(&self, location: &str) -> BlockResult<Option<MemoryRaster>> {
        Ok(self.rasters.lock()?.get(location).cloned())
    }
}

/// `mem://` 位置的栅格文件创建器
#[derive(Clone, Default)]
pub struct MemoryRasterCreator {
    store: MemoryStore,
}

impl MemoryRasterCreator {
    pub fn new(store: MemoryStore) -> Self {
        Self { store }
    }
}

impl RasterFileCreator for MemoryRasterCreator {
    fn label(&self) -> &str {
        "Memory raster"
    }

    fn is_kind_of(&self, location: &str) -> bool {
        location.starts_with(MEMORY_SCHEME)
    }

    fn create(&self, location: &str, access: AccessMode) -> BlockResult<Box<dyn RasterFile>> {
        match self.store.get(location)? {
            Some(raster) => Ok(Box::new(raster.with_access(access))),
            None => Err(BlockError::NoCreator(format!("内存栅格不存在: {location}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raster::PixelType;
    use crate::resolution::BlockType;

    fn descriptor() -> ResolutionDescriptor {
        ResolutionDescriptor::new(0, (4, 4), (2, 2), BlockType::Tile, PixelType::gray8()).unwrap()
    }

    #[test]
    fn test_unwritten_block_reads_zero() {
        let raster = MemoryRaster::new("mem://a", vec![descriptor()]).unwrap();
        let mut editor = raster.editor(0, AccessMode::READ).unwrap();
        let mut out = vec![9; 4];
        editor.read_block(2, 2, &mut out).unwrap();
        assert_eq!(out, vec![0; 4]);
    }

    #[test]
    fn test_editors_share_blocks() {
        let raster = MemoryRaster::new("mem://a", vec![descriptor()]).unwrap();
        let mut writer = raster.editor(0, AccessMode::CREATE).unwrap();
        writer.write_block(2, 0, &[1, 2, 3, 4]).unwrap();
        drop(writer);

        let mut reader = raster.editor(0, AccessMode::READ).unwrap();
        let mut out = vec![0; 4];
        reader.read_block(2, 0, &mut out).unwrap();
        assert_eq!(out, vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_access_mode_is_enforced() {
        let raster = MemoryRaster::new("mem://a", vec![descriptor()]).unwrap();
        let mut reader = raster.editor(0, AccessMode::READ).unwrap();
        assert!(matches!(
            reader.write_block(0, 0, &[0; 4]),
            Err(BlockError::AccessDenied(_))
        ));
        let read_only = raster.with_access(AccessMode::READ);
        assert!(read_only.editor(0, AccessMode::READ_WRITE).is_err());
    }

    #[test]
    fn test_creator_matches_scheme() {
        let store = MemoryStore::new();
        store.create("mem://b", vec![descriptor()]).unwrap();
        let creator = MemoryRasterCreator::new(store);
        assert!(creator.is_kind_of("mem://b"));
        assert!(!creator.is_kind_of("http://b"));
        assert!(creator.create("mem://b", AccessMode::READ).is_ok());
        assert!(creator.create("mem://missing", AccessMode::READ).is_err());
    }
}
