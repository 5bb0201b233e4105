//! 瓦片数据源模块
//!
//! - [`TileSource`] - 按请求获取一块编码后的图像数据
//! - [`TileRequest`] - 一次服务器请求的参数
//! - [`OgcEndpoint`] - 构建 WMS `GetMap` 请求地址
//! - [`RequestContext`] - 可在运行时替换的额外请求参数

use super::query::BlockExtent;
use crate::geometry::Region;
use crate::resolution::BlockResult;
use std::fmt;
use url::Url;

/// 获取瓦片数据时的错误
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    /// 暂时性错误,例如网络超时或服务器内部错误
    Transient(String),
    /// 服务器报告该区域没有数据
    NotAvailable(String),
    /// 服务器响应格式错误或协议错误
    Protocol(String),
}

impl fmt::Display for FetchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl std::error::Error for FetchError {}

/// 额外的请求参数,例如时间维度或样式
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestContext {
    params: Vec<(String, String)>,
}

impl RequestContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// 添加一个参数,同名参数会被覆盖
    pub fn with_param(mut self, key: &str, value: &str) -> Self {
        self.params.retain(|(k, _)| !k.eq_ignore_ascii_case(key));
        self.params.push((key.to_string(), value.to_string()));
        self
    }

    pub fn params(&self) -> &[(String, String)] {
        &self.params
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }
}

/// 一次服务器请求
#[derive(Debug, Clone, PartialEq)]
pub struct TileRequest {
    /// 请求覆盖的瓦片范围
    pub extent: BlockExtent,
    /// 对应的世界坐标边界框
    pub bbox: Region<f64>,
    /// 返回图像的像素尺寸
    pub dimensions: (u32, u32),
    /// 图像格式的 MIME 类型
    pub format: String,
    /// 额外参数
    pub context: RequestContext,
}

/// 瓦片数据源
///
/// 实现必须可以在多个工作线程上同时调用。
pub trait TileSource: Send + Sync {
    /// 获取覆盖整个请求范围的一幅编码图像
    fn fetch(&self, request: &TileRequest) -> Result<Vec<u8>, FetchError>;
}

/// OGC WMS 服务端点
#[derive(Debug, Clone, PartialEq)]
pub struct OgcEndpoint {
    pub base_url: Url,
    pub layers: String,
    pub srs: u16,
    pub version: String,
    pub format: Option<String>,
}

impl OgcEndpoint {
    /// 创建一个新的端点,默认 EPSG:4326, WMS 1.1.1
    pub fn new<U: AsRef<str>>(base_url: U, layers: &str) -> BlockResult<Self> {
        let base_url = Url::parse(base_url.as_ref())?;
        Ok(Self {
            base_url,
            layers: layers.to_string(),
            srs: 4326,
            version: "1.1.1".to_string(),
            format: None,
        })
    }

    pub fn with_srs(mut self, epsg: u16) -> Self {
        self.srs = epsg;
        self
    }

    pub fn with_version(mut self, version: &str) -> Self {
        self.version = version.to_string();
        self
    }

    /// 覆盖请求中的图像格式,默认使用编解码器的 MIME 类型
    pub fn with_format(mut self, mime_type: &str) -> Self {
        self.format = Some(mime_type.to_string());
        self
    }

    /// 构建 `GetMap` 请求地址,保留基础地址中已有的查询参数
    pub fn get_map_url(&self, request: &TileRequest) -> Url {
        let (min_x, min_y, max_x, max_y) = request.bbox.as_tuple();
        // WMS 1.3.0 使用 CRS 参数,之前的版本使用 SRS
        let srs_key = if self.version.starts_with("1.3") {
            "CRS"
        } else {
            "SRS"
        };
        let format = self.format.as_deref().unwrap_or(&request.format);

        let mut url = self.base_url.clone();
        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("SERVICE", "WMS")
                .append_pair("VERSION", &self.version)
                .append_pair("REQUEST", "GetMap")
                .append_pair("LAYERS", &self.layers)
                .append_pair("STYLES", "")
                .append_pair(srs_key, &format!("EPSG:{}", self.srs))
                .append_pair("BBOX", &format!("{min_x},{min_y},{max_x},{max_y}"))
                .append_pair("WIDTH", &request.dimensions.0.to_string())
                .append_pair("HEIGHT", &request.dimensions.1.to_string())
                .append_pair("FORMAT", format);
            for (key, value) in request.context.params() {
                query.append_pair(key, value);
            }
        }
        url
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> TileRequest {
        TileRequest {
            extent: BlockExtent::new((0, 0), (1, 0), 0),
            bbox: Region::new(0.0, 10.0, 20.0, 20.0),
            dimensions: (512, 256),
            format: "image/png".to_string(),
            context: RequestContext::new().with_param("TIME", "2024-01-01"),
        }
    }

    fn pairs(url: &Url) -> Vec<(String, String)> {
        url.query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect()
    }

    fn value<'a>(pairs: &'a [(String, String)], key: &str) -> Option<&'a str> {
        pairs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    #[test]
    fn test_get_map_url() {
        let endpoint = OgcEndpoint::new("https://example.com/wms", "roads")
            .unwrap()
            .with_srs(3857);
        let url = endpoint.get_map_url(&request());
        assert_eq!(url.host_str(), Some("example.com"));
        assert_eq!(url.path(), "/wms");
        let expected: Vec<(String, String)> = [
            ("SERVICE", "WMS"),
            ("VERSION", "1.1.1"),
            ("REQUEST", "GetMap"),
            ("LAYERS", "roads"),
            ("STYLES", ""),
            ("SRS", "EPSG:3857"),
            ("BBOX", "0,10,20,20"),
            ("WIDTH", "512"),
            ("HEIGHT", "256"),
            ("FORMAT", "image/png"),
            ("TIME", "2024-01-01"),
        ]
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
        assert_eq!(pairs(&url), expected);
        assert!(url.as_str().contains("FORMAT=image%2Fpng"));
    }

    #[test]
    fn test_version_13_uses_crs() {
        let endpoint = OgcEndpoint::new("https://example.com/wms?map=a", "a b&c")
            .unwrap()
            .with_version("1.3.0")
            .with_format("image/jpeg");
        let url = endpoint.get_map_url(&request());
        assert!(url.as_str().starts_with("https://example.com/wms?map=a&SERVICE=WMS"));

        let pairs = pairs(&url);
        assert_eq!(pairs[0], ("map".to_string(), "a".to_string()));
        assert_eq!(value(&pairs, "CRS"), Some("EPSG:4326"));
        assert_eq!(value(&pairs, "SRS"), None);
        // 图层名中的特殊字符不会拆出新的参数
        assert_eq!(value(&pairs, "LAYERS"), Some("a b&c"));
        assert_eq!(value(&pairs, "c"), None);
        assert_eq!(value(&pairs, "FORMAT"), Some("image/jpeg"));
    }

    #[test]
    fn test_invalid_base_url() {
        assert!(matches!(
            OgcEndpoint::new("not a url", "roads"),
            Err(crate::resolution::BlockError::InvalidUrl(_))
        ));
    }

    #[test]
    fn test_context_param_overrides() {
        let context = RequestContext::new()
            .with_param("time", "a")
            .with_param("TIME", "b");
        assert_eq!(context.params(), &[("TIME".to_string(), "b".to_string())]);
    }
}
