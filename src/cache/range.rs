//! Byte-range responses synthesized from a fully cached payload.

use bytes::Bytes;
use regex::Regex;
use reqwest::header::{HeaderValue, ACCEPT_RANGES, CONTENT_LENGTH, CONTENT_RANGE, CONTENT_TYPE};
use reqwest::StatusCode;
use std::sync::LazyLock;

use crate::http::{number_header, Response};
use crate::store::StoredEntry;

pub const DEFAULT_AUDIO_TYPE: &str = "audio/mpeg";

static RANGE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^bytes=(\d+)-(\d*)$").expect("valid range regex"));

/// Rango inclusivo `[start, end]` ya validado contra el tamaño total.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RangeSpec {
    pub start: u64,
    pub end: u64,
}

impl RangeSpec {
    /// Interpreta `bytes=<start>-<end>?`. Devuelve `None` si la cabecera no
    /// tiene esa forma o si no se cumple `start <= end < total`.
    pub fn parse(header: &str, total: u64) -> Option<Self> {
        let caps = RANGE_RE.captures(header.trim())?;
        let start: u64 = caps.get(1)?.as_str().parse().ok()?;
        let end: u64 = match caps.get(2).map(|m| m.as_str()) {
            Some("") | None => total.checked_sub(1)?,
            Some(raw) => raw.parse().ok()?,
        };

        if start >= total || end >= total || start > end {
            return None;
        }
        Some(Self { start, end })
    }

    #[allow(clippy::len_without_is_empty)]
    pub fn len(&self) -> u64 {
        self.end - self.start + 1
    }
}

fn content_type(entry: &StoredEntry) -> HeaderValue {
    entry
        .meta
        .content_type
        .as_deref()
        .and_then(|ct| HeaderValue::from_str(ct).ok())
        .unwrap_or_else(|| HeaderValue::from_static(DEFAULT_AUDIO_TYPE))
}

/// 416 con `Content-Range: bytes */<total>` y sin cuerpo.
pub fn not_satisfiable(total: u64) -> Response {
    let mut response = Response::new(StatusCode::RANGE_NOT_SATISFIABLE, Bytes::new());
    if let Ok(value) = HeaderValue::from_str(&format!("bytes */{}", total)) {
        response.headers.insert(CONTENT_RANGE, value);
    }
    response
}

/// Respuesta 206 para la cabecera Range dada, o 416 si no es satisfacible.
pub fn partial_response(entry: &StoredEntry, range_header: &str) -> Response {
    let total = entry.len();
    let Some(range) = RangeSpec::parse(range_header, total) else {
        return not_satisfiable(total);
    };

    let body = entry.body.slice(range.start as usize..=range.end as usize);
    let mut response = Response::new(StatusCode::PARTIAL_CONTENT, body)
        .with_header(CONTENT_TYPE, content_type(entry))
        .with_header(CONTENT_LENGTH, number_header(range.len()))
        .with_header(ACCEPT_RANGES, HeaderValue::from_static("bytes"));
    if let Ok(value) = HeaderValue::from_str(&format!("bytes {}-{}/{}", range.start, range.end, total)) {
        response.headers.insert(CONTENT_RANGE, value);
    }
    response
}

/// Sirve una entrada de audio cacheada, completa o por rango.
pub fn serve(entry: &StoredEntry, range_header: Option<&str>) -> Response {
    match range_header {
        Some(range) => partial_response(entry, range),
        None => Response::new(StatusCode::OK, entry.body.clone())
            .with_header(CONTENT_TYPE, content_type(entry))
            .with_header(CONTENT_LENGTH, number_header(entry.len()))
            .with_header(ACCEPT_RANGES, HeaderValue::from_static("bytes")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use pretty_assertions::assert_eq;

    fn cached(size: usize, content_type: Option<&'static str>) -> StoredEntry {
        let body: Vec<u8> = (0..size).map(|i| (i % 251) as u8).collect();
        let mut response = Response::new(StatusCode::OK, body);
        if let Some(ct) = content_type {
            response = response.with_header(CONTENT_TYPE, HeaderValue::from_static(ct));
        }
        StoredEntry::from_response("https://cdn/a.mp3", &response, Utc::now())
    }

    #[test]
    fn test_open_ended_range_covers_whole_payload() {
        let entry = cached(100, Some("audio/ogg"));
        let resp = partial_response(&entry, "bytes=0-");

        assert_eq!(resp.status, StatusCode::PARTIAL_CONTENT);
        assert_eq!(resp.header(&CONTENT_RANGE), Some("bytes 0-99/100"));
        assert_eq!(resp.header(&CONTENT_LENGTH), Some("100"));
        assert_eq!(resp.header(&ACCEPT_RANGES), Some("bytes"));
        assert_eq!(resp.content_type(), Some("audio/ogg"));
        assert_eq!(resp.body, entry.body);
    }

    #[test]
    fn test_bounded_range_is_byte_exact() {
        let entry = cached(100, None);
        let resp = partial_response(&entry, "bytes=10-19");

        assert_eq!(resp.status, StatusCode::PARTIAL_CONTENT);
        assert_eq!(resp.body.len(), 10);
        assert_eq!(&resp.body[..], &entry.body[10..20]);
        assert_eq!(resp.header(&CONTENT_RANGE), Some("bytes 10-19/100"));
        assert_eq!(resp.content_type(), Some(DEFAULT_AUDIO_TYPE));
    }

    #[test]
    fn test_start_past_end_of_payload_is_416() {
        let entry = cached(100, None);
        let resp = partial_response(&entry, "bytes=200-");

        assert_eq!(resp.status, StatusCode::RANGE_NOT_SATISFIABLE);
        assert_eq!(resp.header(&CONTENT_RANGE), Some("bytes */100"));
        assert!(resp.body.is_empty());
    }

    #[test]
    fn test_end_past_total_is_416() {
        let entry = cached(1000, None);
        let resp = partial_response(&entry, "bytes=900-1099");

        assert_eq!(resp.status, StatusCode::RANGE_NOT_SATISFIABLE);
        assert_eq!(resp.header(&CONTENT_RANGE), Some("bytes */1000"));
    }

    #[test]
    fn test_malformed_ranges_are_rejected() {
        for header in ["bytes=-500", "bytes=5-2", "items=0-1", "bytes=0-1,4-5", "garbage", "bytes=abc-"] {
            assert_eq!(RangeSpec::parse(header, 100), None, "{}", header);
        }
        assert_eq!(RangeSpec::parse("bytes=0-", 0), None);
        assert_eq!(RangeSpec::parse(" bytes=99-99 ", 100), Some(RangeSpec { start: 99, end: 99 }));
    }

    #[test]
    fn test_serve_without_range_returns_full_payload() {
        let entry = cached(64, Some("audio/mp4"));
        let resp = serve(&entry, None);

        assert_eq!(resp.status, StatusCode::OK);
        assert_eq!(resp.declared_length(), Some(64));
        assert_eq!(resp.body.len(), 64);
        assert_eq!(resp.content_type(), Some("audio/mp4"));
    }
}
