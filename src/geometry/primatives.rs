//! 几何模块的基本数据类型
//!
//! - `Point2D`: 表示二维平面上的点
//! - `Interval`: 表示一个闭区间
//! - `Region`: 表示二维平面上的矩形区域(世界坐标)
//! - `PixelRect`: 表示像素坐标下的矩形

use std::fmt;
use std::ops::Sub;

/// 表示二维平面上的点
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point2D<T> {
    pub x: T,
    pub y: T,
}

/// 表示一个区间
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Interval<T> {
    pub min: T,
    pub max: T,
}

impl<T> Interval<T> {
    /// 创建一个新的区间
    pub fn new(min: T, max: T) -> Self {
        Self { min, max }
    }
}

impl<T: Copy + Sub<Output = T>> Interval<T> {
    /// 计算区间的范围
    pub fn range(&self) -> T {
        self.max - self.min
    }
}

/// 表示二维区域
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Region<T> {
    pub x: Interval<T>,
    pub y: Interval<T>,
}

impl<T> Region<T> {
    /// 创建一个新的区域
    pub fn new(min_x: T, min_y: T, max_x: T, max_y: T) -> Self {
        Self {
            x: Interval::new(min_x, max_x),
            y: Interval::new(min_y, max_y),
        }
    }
}

impl Region<f64> {
    /// 扩展区域以包含指定点
    pub fn extend(self, point: &Point2D<f64>) -> Self {
        Self::new(
            self.x.min.min(point.x),
            self.y.min.min(point.y),
            self.x.max.max(point.x),
            self.y.max.max(point.y),
        )
    }
}

impl<T: Copy> Region<T> {
    /// 将区域转换为元组 (min_x, min_y, max_x, max_y)
    pub fn as_tuple(&self) -> (T, T, T, T) {
        (self.x.min, self.y.min, self.x.max, self.y.max)
    }
}

impl<T: fmt::Display> fmt::Display for Region<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Region({} -> {}, {} -> {})",
            self.x.min, self.x.max, self.y.min, self.y.max
        )
    }
}

/// 像素坐标下的矩形,原点位于左上角
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PixelRect {
    pub x: u64,
    pub y: u64,
    pub width: u64,
    pub height: u64,
}

impl PixelRect {
    pub fn new(x: u64, y: u64, width: u64, height: u64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn right(&self) -> u64 {
        self.x + self.width
    }

    pub fn bottom(&self) -> u64 {
        self.y + self.height
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// 计算两个矩形的交集,不相交时返回 None
    pub fn intersect(&self, other: &PixelRect) -> Option<PixelRect> {
        let x = self.x.max(other.x);
        let y = self.y.max(other.y);
        let right = self.right().min(other.right());
        let bottom = self.bottom().min(other.bottom());
        if right <= x || bottom <= y {
            return None;
        }
        Some(PixelRect::new(x, y, right - x, bottom - y))
    }
}

impl fmt::Display for PixelRect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "PixelRect({}, {}, {}x{})",
            self.x, self.y, self.width, self.height
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_intersect() {
        let a = PixelRect::new(0, 0, 10, 10);
        let b = PixelRect::new(5, 8, 10, 10);
        assert_eq!(a.intersect(&b), Some(PixelRect::new(5, 8, 5, 2)));
        assert_eq!(a.intersect(&PixelRect::new(10, 0, 1, 1)), None);
    }
}
