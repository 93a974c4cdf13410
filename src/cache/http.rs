//! Request/response values exchanged between the worker, the fetcher and
//! the cache store.

use reqwest::{Method, Url};
use serde::{Deserialize, Serialize};

use crate::error::FetchError;

/// How the page issued the request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestMode {
    /// Top-level page navigation
    Navigate,
    /// Anything else (fetch/XHR, subresources)
    #[default]
    Other,
}

/// An intercepted request
#[derive(Debug, Clone)]
pub struct Request {
    pub method: Method,
    pub url: Url,
    pub mode: RequestMode,
    pub headers: Vec<(String, String)>,
    pub body: Option<Vec<u8>>,
}

impl Request {
    /// Plain GET for a URL
    pub fn get(url: &str) -> Result<Self, FetchError> {
        Self::new(Method::GET, url)
    }

    /// Navigation GET for a URL
    pub fn navigate(url: &str) -> Result<Self, FetchError> {
        Ok(Self::get(url)?.with_mode(RequestMode::Navigate))
    }

    pub fn new(method: Method, url: &str) -> Result<Self, FetchError> {
        let url = Url::parse(url)
            .map_err(|e| FetchError::InvalidRequest(format!("{}: {}", url, e)))?;
        Ok(Self {
            method,
            url,
            mode: RequestMode::Other,
            headers: Vec::new(),
            body: None,
        })
    }

    pub fn with_mode(mut self, mode: RequestMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    pub fn with_body(mut self, body: Vec<u8>) -> Self {
        self.body = Some(body);
        self
    }

    pub fn is_navigation(&self) -> bool {
        self.mode == RequestMode::Navigate
    }
}

/// Where a response came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseSource {
    Network,
    Cache,
    OfflinePage,
    Synthetic,
}

/// A response handed back to the page
#[derive(Debug, Clone)]
pub struct Response {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
    pub source: ResponseSource,
}

impl Response {
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: body.into(),
            source: ResponseSource::Network,
        }
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    pub fn with_source(mut self, source: ResponseSource) -> Self {
        self.source = source;
        self
    }

    /// 2xx, mirroring `Response.ok`
    pub fn is_ok(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Synthetic 503 returned when neither network nor cache can answer
    pub fn service_unavailable() -> Self {
        Response::new(503, "Offline - content not available")
            .with_header("Content-Type", "text/plain")
            .with_source(ResponseSource::Synthetic)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_service_unavailable() {
        let res = Response::service_unavailable();
        assert_eq!(res.status, 503);
        assert!(!res.is_ok());
        assert_eq!(res.source, ResponseSource::Synthetic);
        assert_eq!(res.header("content-type"), Some("text/plain"));
    }

    #[test]
    fn test_invalid_url_rejected() {
        assert!(Request::get("not a url").is_err());
    }

    #[test]
    fn test_navigate_sets_mode() {
        let req = Request::navigate("http://localhost:3000/app").unwrap();
        assert!(req.is_navigation());
        assert_eq!(req.method, Method::GET);
    }
}
