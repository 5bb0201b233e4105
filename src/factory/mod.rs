//! 栅格文件工厂模块
//!
//! 根据位置(URL 或文件路径)选择能打开它的 [`RasterFileCreator`],
//! 并构建 "编辑器 -> 适配器" 的访问链。
//!
//! 工厂是一个显式的注册表对象,在应用启动时创建并注入,不使用全局状态。

mod page;

pub use page::{PageFile, PageFileCreator, PageFileFactory, WorldFileCreator, WorldTransform};

use crate::adapter::BlockAdapter;
use crate::resolution::{
    AccessMode, BlockError, BlockResult, BlockType, ResolutionDescriptor, ResolutionEditor,
};
use std::sync::Arc;
use tracing::*;

/// 一个打开的多分辨率栅格文件
pub trait RasterFile: Send + Sync {
    /// 文件位置
    fn location(&self) -> &str;

    /// 所有分辨率层级的描述,索引即层级
    fn resolutions(&self) -> &[ResolutionDescriptor];

    /// 打开文件时确定的访问模式
    fn access_mode(&self) -> AccessMode;

    /// 创建某个层级的原生编辑器
    fn create_editor(
        &self,
        resolution: usize,
        access: AccessMode,
    ) -> BlockResult<Box<dyn ResolutionEditor>>;
}

/// 某一种栅格文件的创建器
pub trait RasterFileCreator: Send + Sync {
    /// 用于日志和界面显示的名称
    fn label(&self) -> &str;

    /// 是否能处理该位置
    fn is_kind_of(&self, location: &str) -> bool;

    /// 打开该位置的栅格文件
    fn create(&self, location: &str, access: AccessMode) -> BlockResult<Box<dyn RasterFile>>;
}

/// 栅格文件创建器注册表
#[derive(Default, Clone)]
pub struct RasterFileFactory {
    creators: Vec<Arc<dyn RasterFileCreator>>,
}

impl RasterFileFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册一个创建器,先注册的优先
    pub fn register(&mut self, creator: Arc<dyn RasterFileCreator>) -> &mut Self {
        debug!("注册栅格文件创建器: {}", creator.label());
        self.creators.push(creator);
        self
    }

    /// 第一个能处理该位置的创建器
    pub fn find_creator_for(&self, location: &str) -> Option<&dyn RasterFileCreator> {
        self.creators
            .iter()
            .find(|creator| creator.is_kind_of(location))
            .map(|creator| creator.as_ref())
    }

    /// 打开栅格文件
    ///
    /// # 错误
    /// 没有能处理该位置的创建器时返回 `NoCreator`
    pub fn open(&self, location: &str, access: AccessMode) -> BlockResult<Box<dyn RasterFile>> {
        let creator = self
            .find_creator_for(location)
            .ok_or_else(|| BlockError::NoCreator(location.to_string()))?;
        debug!("用 {} 打开 {location} ({access})", creator.label());
        creator.create(location, access)
    }

    pub fn len(&self) -> usize {
        self.creators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.creators.is_empty()
    }
}

/// 打开某个层级,并以 `exposed` 块种类暴露
pub fn open_adapted(
    file: &dyn RasterFile,
    resolution: usize,
    exposed: BlockType,
    access: AccessMode,
) -> BlockResult<BlockAdapter> {
    let editor = file.create_editor(resolution, access)?;
    BlockAdapter::new(editor, exposed)
}
