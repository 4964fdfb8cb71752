//! Request/response tuples seen by the intermediary.
//!
//! The host hands every intercepted page request to the engine as a
//! [`Request`] and gets back a [`Response`] (or a pass-through decision).
//! Network responses use the same [`Response`] type, with the body already
//! materialized, so strategies can store and replay them unchanged.

use bytes::Bytes;
use std::borrow::Cow;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, CONTENT_LENGTH, CONTENT_TYPE, RANGE};
use reqwest::{Method, StatusCode};
use url::Url;

#[derive(Debug, Clone)]
pub struct Request {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
}

impl Request {
    pub fn new(method: Method, url: Url) -> Self {
        Self {
            method,
            url,
            headers: HeaderMap::new(),
        }
    }

    pub fn get(url: Url) -> Self {
        Self::new(Method::GET, url)
    }

    pub fn parse_get(url: &str) -> Result<Self, url::ParseError> {
        Ok(Self::get(Url::parse(url)?))
    }

    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn is_http(&self) -> bool {
        matches!(self.url.scheme(), "http" | "https")
    }

    /// Valor de la cabecera Range, si existe. Los bytes no UTF-8 se reemplazan,
    /// así una cabecera ilegible sigue presente y no se confunde con su ausencia.
    pub fn range(&self) -> Option<Cow<'_, str>> {
        self.headers
            .get(RANGE)
            .map(|v| String::from_utf8_lossy(v.as_bytes()))
    }

    pub fn accepts_html(&self) -> bool {
        self.headers
            .get(ACCEPT)
            .and_then(|v| v.to_str().ok())
            .map_or(false, |accept| accept.contains("text/html"))
    }

    /// Copia de la petición sin Range: para cachear siempre se pide el archivo completo.
    pub fn without_range(&self) -> Self {
        let mut full = self.clone();
        full.headers.remove(RANGE);
        full
    }
}

#[derive(Debug, Clone)]
pub struct Response {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl Response {
    pub fn new(status: StatusCode, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: body.into(),
        }
    }

    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn header(&self, name: &HeaderName) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn content_type(&self) -> Option<&str> {
        self.header(&CONTENT_TYPE)
    }

    /// Content-Length declarado por el origen (no la longitud real del cuerpo).
    pub fn declared_length(&self) -> Option<u64> {
        self.header(&CONTENT_LENGTH).and_then(|v| v.trim().parse().ok())
    }

    pub fn is_full(&self) -> bool {
        self.status == StatusCode::OK
    }

    pub fn is_partial(&self) -> bool {
        self.status == StatusCode::PARTIAL_CONTENT
    }

    /// 503 sintético cuando no hay red ni copia en caché.
    pub fn unavailable() -> Self {
        Self::new(StatusCode::SERVICE_UNAVAILABLE, "Service Unavailable")
            .with_header(CONTENT_TYPE, HeaderValue::from_static("text/plain"))
    }

    /// Página mínima para navegaciones HTML sin conexión.
    pub fn offline_page() -> Self {
        Self::new(
            StatusCode::SERVICE_UNAVAILABLE,
            "<!DOCTYPE html><html><head><title>Offline</title></head>\
             <body><h1>You are offline</h1><p>This page has not been saved for offline use yet.</p></body></html>",
        )
        .with_header(CONTENT_TYPE, HeaderValue::from_static("text/html; charset=utf-8"))
    }
}

/// Valor de cabecera numérico (Content-Length y similares).
pub(crate) fn number_header(value: u64) -> HeaderValue {
    HeaderValue::from(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_range_and_accept_helpers() {
        let req = Request::parse_get("https://example.com/audio/track.mp3?t=10")
            .unwrap()
            .with_header(RANGE, HeaderValue::from_static("bytes=0-"))
            .with_header(ACCEPT, HeaderValue::from_static("text/html,application/xhtml+xml"));

        assert_eq!(req.range().as_deref(), Some("bytes=0-"));
        assert!(req.accepts_html());
        assert!(req.is_http());
        assert_eq!(req.without_range().range(), None);
    }

    #[test]
    fn test_non_utf8_range_is_still_present() {
        let req = Request::parse_get("https://example.com/audio/track.mp3")
            .unwrap()
            .with_header(RANGE, HeaderValue::from_bytes(b"bytes=\xff-10").unwrap());

        let range = req.range().expect("range header present");
        assert!(range.starts_with("bytes="));
        assert_ne!(range, "bytes=-10");
    }

    #[test]
    fn test_declared_length_is_read_from_headers() {
        let resp = Response::new(StatusCode::OK, vec![0u8; 4])
            .with_header(CONTENT_LENGTH, number_header(10));
        assert_eq!(resp.declared_length(), Some(10));
        assert_eq!(resp.body.len(), 4);
        assert!(resp.is_full());
        assert!(!resp.is_partial());
    }

    #[test]
    fn test_non_http_scheme() {
        let req = Request::parse_get("chrome-extension://abc/script.js").unwrap();
        assert!(!req.is_http());
    }
}
