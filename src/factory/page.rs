//! 页面文件模块
//!
//! 页面文件是栅格文件旁边的附属文件,提供栅格本身不包含的地理参考信息。
//! 目前支持 ESRI world file(`.wld`、`.tfw`、`.jgw`、`.pgw` 等)。

use crate::geometry::{PixelGrid, Point2D, Region};
use crate::resolution::{BlockError, BlockResult};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::*;

/// 像素坐标到世界坐标的仿射变换
///
/// `x = a * col + b * row + c`, `y = d * col + e * row + f`,
/// 其中 (col, row) 是像素中心。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WorldTransform {
    pub a: f64,
    pub b: f64,
    pub c: f64,
    pub d: f64,
    pub e: f64,
    pub f: f64,
}

impl WorldTransform {
    /// 像素坐标 (col, row) 对应的世界坐标
    pub fn apply(&self, col: f64, row: f64) -> Point2D<f64> {
        Point2D {
            x: self.a * col + self.b * row + self.c,
            y: self.d * col + self.e * row + self.f,
        }
    }

    /// 一幅尺寸为 `dimensions` 的栅格覆盖的世界范围(包含像素边缘)
    pub fn bounds(&self, dimensions: (u64, u64)) -> Region<f64> {
        let (w, h) = (dimensions.0 as f64, dimensions.1 as f64);
        let origin = self.apply(-0.5, -0.5);
        [(w - 0.5, -0.5), (-0.5, h - 0.5), (w - 0.5, h - 0.5)]
            .into_iter()
            .fold(
                Region::new(origin.x, origin.y, origin.x, origin.y),
                |region, (col, row)| region.extend(&self.apply(col, row)),
            )
    }
}

/// 一个栅格文件的页面信息
#[derive(Debug, Clone, PartialEq)]
pub struct PageFile {
    /// 栅格文件位置
    pub location: String,
    /// 页面文件路径
    pub source: PathBuf,
    pub transform: WorldTransform,
}

impl PageFile {
    pub fn bounds(&self, dimensions: (u64, u64)) -> Region<f64> {
        self.transform.bounds(dimensions)
    }

    /// 栅格的像素网格,供瓦片服务等需要世界坐标的组件使用
    pub fn pixel_grid(&self, dimensions: (u64, u64)) -> PixelGrid {
        PixelGrid::new(self.bounds(dimensions), dimensions)
    }
}

/// 某一种页面文件的创建器
pub trait PageFileCreator: Send + Sync {
    fn label(&self) -> &str;

    /// 栅格文件旁边是否有这种页面文件
    fn has_page_for(&self, raster_location: &str) -> bool;

    /// 读取栅格文件的页面文件
    fn create_for(&self, raster_location: &str) -> BlockResult<PageFile>;
}

/// 页面文件创建器注册表
#[derive(Default, Clone)]
pub struct PageFileFactory {
    creators: Vec<Arc<dyn PageFileCreator>>,
}

impl PageFileFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, creator: Arc<dyn PageFileCreator>) -> &mut Self {
        debug!("注册页面文件创建器: {}", creator.label());
        self.creators.push(creator);
        self
    }

    pub fn find_creator_for(&self, raster_location: &str) -> Option<&dyn PageFileCreator> {
        self.creators
            .iter()
            .find(|creator| creator.has_page_for(raster_location))
            .map(|creator| creator.as_ref())
    }

    /// 读取栅格文件的页面文件,没有时返回 None
    pub fn page_for(&self, raster_location: &str) -> BlockResult<Option<PageFile>> {
        match self.find_creator_for(raster_location) {
            Some(creator) => creator.create_for(raster_location).map(Some),
            None => Ok(None),
        }
    }
}

/// ESRI world file 创建器
#[derive(Debug, Default, Clone)]
pub struct WorldFileCreator;

impl WorldFileCreator {
    /// 栅格文件可能的 world file 路径,按优先顺序排列
    ///
    /// 对于 `a.tif` 依次是 `a.tfw`、`a.tifw`、`a.wld`。
    pub fn sidecar_candidates(raster_location: &str) -> Vec<PathBuf> {
        let path = Path::new(raster_location);
        let mut candidates = Vec::new();
        if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
            let ext = ext.to_ascii_lowercase();
            let mut chars = ext.chars();
            if let (Some(first), Some(last)) = (chars.next(), ext.chars().last()) {
                candidates.push(path.with_extension(format!("{first}{last}w")));
            }
            candidates.push(path.with_extension(format!("{ext}w")));
        }
        candidates.push(path.with_extension("wld"));
        candidates.dedup();
        candidates
    }

    fn find_sidecar(raster_location: &str) -> Option<PathBuf> {
        Self::sidecar_candidates(raster_location)
            .into_iter()
            .find(|candidate| candidate.is_file())
    }

    /// 解析 world file 的六行参数,顺序为 A D B E C F
    pub fn parse(text: &str) -> BlockResult<WorldTransform> {
        let values = text
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(|line| {
                line.parse::<f64>().map_err(|e| {
                    BlockError::BadDescriptor(format!("world file 参数无效 '{line}': {e:?}"))
                })
            })
            .collect::<BlockResult<Vec<f64>>>()?;
        if values.len() != 6 {
            return Err(BlockError::BadDescriptor(format!(
                "world file 需要6个参数, 实际 {} 个",
                values.len()
            )));
        }
        Ok(WorldTransform {
            a: values[0],
            d: values[1],
            b: values[2],
            e: values[3],
            c: values[4],
            f: values[5],
        })
    }
}

impl PageFileCreator for WorldFileCreator {
    fn label(&self) -> &str {
        "ESRI world file"
    }

    fn has_page_for(&self, raster_location: &str) -> bool {
        Self::find_sidecar(raster_location).is_some()
    }

    fn create_for(&self, raster_location: &str) -> BlockResult<PageFile> {
        let source = Self::find_sidecar(raster_location).ok_or_else(|| {
            BlockError::NoCreator(format!("没有找到 {raster_location} 的 world file"))
        })?;
        let text = std::fs::read_to_string(&source)?;
        let transform = Self::parse(&text)?;
        debug!("读取 world file {}", source.display());
        Ok(PageFile {
            location: raster_location.to_string(),
            source,
            transform,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WORLD_FILE: &str = "2.0\n0.0\n0.0\n-2.0\n101.0\n199.0\n";

    #[test]
    fn test_parse_and_bounds() {
        let transform = WorldFileCreator::parse(WORLD_FILE).unwrap();
        assert_eq!(transform.c, 101.0);
        assert_eq!(transform.e, -2.0);
        let bounds = transform.bounds((10, 5));
        assert_eq!(bounds, Region::new(100.0, 190.0, 120.0, 200.0));
    }

    #[test]
    fn test_parse_rejects_bad_input() {
        assert!(WorldFileCreator::parse("1\n2\n3").is_err());
        assert!(WorldFileCreator::parse("1\n0\n0\n-1\nx\n0").is_err());
    }

    #[test]
    fn test_sidecar_candidates() {
        let candidates = WorldFileCreator::sidecar_candidates("/data/a.TIF");
        assert_eq!(
            candidates,
            vec![
                PathBuf::from("/data/a.tfw"),
                PathBuf::from("/data/a.tifw"),
                PathBuf::from("/data/a.wld"),
            ]
        );
    }

    #[test]
    fn test_factory_reads_sidecar() {
        let dir = std::env::temp_dir().join(format!("blockraster-page-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let raster = dir.join("scene.png");
        std::fs::write(dir.join("scene.pgw"), WORLD_FILE).unwrap();

        let mut factory = PageFileFactory::new();
        factory.register(Arc::new(WorldFileCreator));
        let location = raster.to_str().unwrap();
        let page = factory.page_for(location).unwrap().unwrap();
        assert_eq!(page.source, dir.join("scene.pgw"));
        assert_eq!(page.pixel_grid((10, 5)).bounds, Region::new(100.0, 190.0, 120.0, 200.0));

        assert!(factory
            .page_for(dir.join("other.png").to_str().unwrap())
            .unwrap()
            .is_none());
        std::fs::remove_dir_all(&dir).unwrap();
    }
}
