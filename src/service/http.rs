//! HTTP 瓦片数据源模块
//!
//! 每个工作线程持有自己的 HTTP 会话,同一线程上的请求复用连接,
//! 不同线程之间不共享会话。

use super::source::{FetchError, OgcEndpoint, TileRequest, TileSource};
use reqwest::blocking::Client;
use reqwest::header::CONTENT_TYPE;
use reqwest::StatusCode;
use std::cell::RefCell;
use std::time::Duration;
use tracing::*;

thread_local! {
    static SESSION: RefCell<Option<Client>> = const { RefCell::new(None) };
}

/// 在当前线程的 HTTP 会话上执行请求,第一次使用时创建会话
fn with_session<T>(f: impl FnOnce(&Client) -> Result<T, FetchError>) -> Result<T, FetchError> {
    SESSION.with(|cell| {
        let mut slot = cell.borrow_mut();
        let client = match slot.take() {
            Some(client) => client,
            None => {
                trace!("为当前线程创建 HTTP 会话");
                Client::builder()
                    .build()
                    .map_err(|e| FetchError::Transient(format!("{e:?}")))?
            }
        };
        let result = f(&client);
        *slot = Some(client);
        result
    })
}

/// 通过 WMS `GetMap` 获取数据的瓦片源
#[derive(Debug, Clone)]
pub struct HttpTileSource {
    endpoint: OgcEndpoint,
    timeout: Option<Duration>,
}

impl HttpTileSource {
    pub fn new(endpoint: OgcEndpoint) -> Self {
        Self {
            endpoint,
            timeout: None,
        }
    }

    /// 单个请求的超时时间,默认不限制
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn endpoint(&self) -> &OgcEndpoint {
        &self.endpoint
    }
}

impl TileSource for HttpTileSource {
    fn fetch(&self, request: &TileRequest) -> Result<Vec<u8>, FetchError> {
        let url = self.endpoint.get_map_url(request);
        debug!("GET {url}");
        with_session(|client| {
            let mut builder = client.get(url);
            if let Some(timeout) = self.timeout {
                builder = builder.timeout(timeout);
            }
            let response = builder
                .send()
                .map_err(|e| FetchError::Transient(format!("{e:?}")))?;

            let status = response.status();
            if status == StatusCode::NOT_FOUND || status == StatusCode::NO_CONTENT {
                return Err(FetchError::NotAvailable(format!("HTTP {status}")));
            }
            if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
                return Err(FetchError::Transient(format!("HTTP {status}")));
            }
            if !status.is_success() {
                return Err(FetchError::Protocol(format!("HTTP {status}")));
            }

            let content_type = response
                .headers()
                .get(CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .unwrap_or_default()
                .to_string();
            let bytes = response
                .bytes()
                .map_err(|e| FetchError::Transient(format!("{e:?}")))?;

            // WMS 服务器用 XML 格式的 ServiceException 报告请求错误
            if content_type.contains("xml") {
                let body = String::from_utf8_lossy(&bytes);
                let message: String = body.chars().take(256).collect();
                return Err(FetchError::Protocol(message));
            }
            Ok(bytes.to_vec())
        })
    }
}
