//! # Cache Store
//!
//! Key/value byte storage partitioned into named namespaces. Every entry
//! carries its metadata (status, content type, declared length) next to the
//! payload so it can be replayed as a [`Response`].
//!
//! Two backends are provided:
//!
//! - [`MemoryStore`]: `DashMap` based, lost on restart. Used by tests and by
//!   hosts that do not need durability.
//! - [`DiskStore`]: one directory per namespace, a body file plus a JSON
//!   sidecar per entry. Survives restarts, which is what allows the audio
//!   index to be rebuilt from the store contents.
//!
//! Both enforce the same invariant on `put`: the declared `content_length`
//! must equal the payload length, so a truncated transfer can never be stored.

pub mod disk;
pub mod memory;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use reqwest::header::{HeaderName, HeaderValue, CONTENT_LENGTH, CONTENT_TYPE};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

use crate::error::{StoreError, StoreResult};
use crate::http::{number_header, Response};

pub use disk::DiskStore;
pub use memory::MemoryStore;

/// Cabeceras del origen que se guardan junto al cuerpo.
const REPLAYED_HEADERS: &[&str] = &[
    "cache-control",
    "content-language",
    "etag",
    "last-modified",
    "accept-ranges",
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryMeta {
    pub key: String,
    pub status: u16,
    pub content_type: Option<String>,
    pub content_length: u64,
    #[serde(default)]
    pub headers: Vec<(String, String)>,
    pub stored_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct StoredEntry {
    pub meta: EntryMeta,
    pub body: Bytes,
}

impl StoredEntry {
    /// Construye una entrada a partir de una respuesta completa.
    ///
    /// La longitud declarada es siempre la del cuerpo materializado; la
    /// validación contra el Content-Length del origen se hace antes.
    pub fn from_response(key: &str, response: &Response, stored_at: DateTime<Utc>) -> Self {
        let headers = REPLAYED_HEADERS
            .iter()
            .filter_map(|name| {
                response
                    .headers
                    .get(*name)
                    .and_then(|v| v.to_str().ok())
                    .map(|v| (name.to_string(), v.to_string()))
            })
            .collect();

        Self {
            meta: EntryMeta {
                key: key.to_string(),
                status: response.status.as_u16(),
                content_type: response.content_type().map(str::to_string),
                content_length: response.body.len() as u64,
                headers,
                stored_at,
            },
            body: response.body.clone(),
        }
    }

    pub fn key(&self) -> &str {
        &self.meta.key
    }

    pub fn len(&self) -> u64 {
        self.body.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.body.is_empty()
    }

    pub fn check_length(&self) -> StoreResult<()> {
        let actual = self.len();
        if self.meta.content_length != actual {
            return Err(StoreError::LengthMismatch {
                declared: self.meta.content_length,
                actual,
            });
        }
        Ok(())
    }

    /// Reconstruye la respuesta tal y como se guardó.
    pub fn to_response(&self) -> Response {
        let status = StatusCode::from_u16(self.meta.status).unwrap_or(StatusCode::OK);
        let mut response = Response::new(status, self.body.clone());

        for (name, value) in &self.meta.headers {
            if let (Ok(name), Ok(value)) = (
                HeaderName::from_bytes(name.as_bytes()),
                HeaderValue::from_str(value),
            ) {
                response.headers.insert(name, value);
            }
        }
        if let Some(content_type) = self
            .meta
            .content_type
            .as_deref()
            .and_then(|ct| HeaderValue::from_str(ct).ok())
        {
            response.headers.insert(CONTENT_TYPE, content_type);
        }
        response
            .headers
            .insert(CONTENT_LENGTH, number_header(self.meta.content_length));
        response
    }
}

/// Almacenamiento por namespaces que provee el host.
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, namespace: &str, key: &str) -> StoreResult<Option<StoredEntry>>;

    /// Guarda (o sobrescribe) la entrada bajo `entry.meta.key`.
    async fn put(&self, namespace: &str, entry: StoredEntry) -> StoreResult<()>;

    /// Devuelve `true` si la entrada existía.
    async fn delete(&self, namespace: &str, key: &str) -> StoreResult<bool>;

    async fn keys(&self, namespace: &str) -> StoreResult<Vec<String>>;

    /// Longitud declarada de una entrada sin leer el payload.
    async fn entry_len(&self, namespace: &str, key: &str) -> StoreResult<Option<u64>>;

    async fn namespaces(&self) -> StoreResult<Vec<String>>;

    async fn delete_namespace(&self, namespace: &str) -> StoreResult<bool>;

    async fn contains(&self, namespace: &str, key: &str) -> StoreResult<bool> {
        Ok(self.entry_len(namespace, key).await?.is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::ETAG;

    #[test]
    fn test_entry_from_response_keeps_replayable_headers() {
        let response = Response::new(StatusCode::OK, "hello")
            .with_header(CONTENT_TYPE, HeaderValue::from_static("text/plain"))
            .with_header(ETAG, HeaderValue::from_static("\"v1\""))
            .with_header(
                HeaderName::from_static("set-cookie"),
                HeaderValue::from_static("session=secret"),
            );

        let entry = StoredEntry::from_response("https://example.com/a.txt", &response, Utc::now());
        assert_eq!(entry.meta.content_length, 5);
        assert!(entry.check_length().is_ok());

        let replay = entry.to_response();
        assert_eq!(replay.content_type(), Some("text/plain"));
        assert_eq!(replay.header(&ETAG), Some("\"v1\""));
        assert_eq!(replay.declared_length(), Some(5));
        assert!(replay.headers.get("set-cookie").is_none());
    }

    #[test]
    fn test_length_mismatch_is_detected() {
        let response = Response::new(StatusCode::OK, "abc");
        let mut entry = StoredEntry::from_response("k", &response, Utc::now());
        entry.meta.content_length = 10;
        assert!(matches!(
            entry.check_length(),
            Err(StoreError::LengthMismatch { declared: 10, actual: 3 })
        ));
    }
}
