//! 几何基本类型模块
//!
//! 提供世界坐标区域、像素矩形与两者之间的线性映射,
//! 供瓦片服务编辑器构建请求边界框使用。

mod primatives;

pub use primatives::{Interval, PixelRect, Point2D, Region};

/// 像素坐标与世界坐标之间的线性映射
///
/// 像素原点位于左上角,世界坐标 y 轴向上。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PixelGrid {
    /// 整幅栅格覆盖的世界坐标范围
    pub bounds: Region<f64>,
    /// 栅格尺寸 (宽度, 高度),单位为像素
    pub dimensions: (u64, u64),
}

impl PixelGrid {
    pub fn new(bounds: Region<f64>, dimensions: (u64, u64)) -> Self {
        Self { bounds, dimensions }
    }

    /// 每个像素在 x / y 方向上覆盖的世界坐标长度
    pub fn pixel_size(&self) -> (f64, f64) {
        (
            self.bounds.x.range() / self.dimensions.0.max(1) as f64,
            self.bounds.y.range() / self.dimensions.1.max(1) as f64,
        )
    }

    /// 将像素矩形转换为世界坐标区域
    pub fn world_region(&self, rect: &PixelRect) -> Region<f64> {
        let (sx, sy) = self.pixel_size();
        let min_x = self.bounds.x.min + rect.x as f64 * sx;
        let max_x = self.bounds.x.min + (rect.x + rect.width) as f64 * sx;
        // y 轴翻转:像素行 0 对应世界坐标的最大 y
        let max_y = self.bounds.y.max - rect.y as f64 * sy;
        let min_y = self.bounds.y.max - (rect.y + rect.height) as f64 * sy;
        Region::new(min_x, min_y, max_x, max_y)
    }

    /// 同一世界范围下,缩小 `factor` 倍后的像素网格
    pub fn downsampled(&self, factor: u64) -> Self {
        let factor = factor.max(1);
        Self {
            bounds: self.bounds,
            dimensions: (
                self.dimensions.0.div_ceil(factor).max(1),
                self.dimensions.1.div_ceil(factor).max(1),
            ),
        }
    }
}
