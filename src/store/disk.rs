use async_trait::async_trait;
use bytes::Bytes;
use sha2::{Digest, Sha256};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::fs;
use tracing::{debug, info, warn};

use super::{CacheStore, EntryMeta, StoredEntry};
use crate::error::StoreResult;

const BODY_EXT: &str = "body";
const META_EXT: &str = "meta.json";

// Sufijo único para los temporales de escritura
static TMP_SEQ: AtomicU64 = AtomicU64::new(0);

/// Store en disco: un directorio por namespace, cuerpo + metadata JSON por entrada.
///
/// Los archivos se nombran con el SHA-256 de la clave; la clave real vive en la
/// metadata.
#[derive(Debug, Clone)]
pub struct DiskStore {
    root: PathBuf,
}

impl DiskStore {
    pub async fn new(root: PathBuf) -> StoreResult<Self> {
        fs::create_dir_all(&root).await?;
        info!("📁 Cache store inicializado en: {}", root.display());
        Ok(Self { root })
    }

    fn namespace_dir(&self, namespace: &str) -> PathBuf {
        self.root.join(urlencoding::encode(namespace).as_ref())
    }

    fn entry_paths(&self, namespace: &str, key: &str) -> (PathBuf, PathBuf) {
        let dir = self.namespace_dir(namespace);
        let stem = hex::encode(Sha256::digest(key.as_bytes()));
        (
            dir.join(format!("{}.{}", stem, BODY_EXT)),
            dir.join(format!("{}.{}", stem, META_EXT)),
        )
    }

    async fn read_meta(path: &Path) -> StoreResult<Option<EntryMeta>> {
        match fs::read(path).await {
            Ok(raw) => Ok(Some(serde_json::from_slice(&raw)?)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Escribe a un temporal propio de esta escritura y renombra, para no dejar
    /// archivos a medias.
    async fn write_atomic(path: &Path, contents: &[u8]) -> StoreResult<()> {
        let tmp = Self::tmp_path(path);
        if let Err(e) = fs::write(&tmp, contents).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(e.into());
        }
        if let Err(e) = fs::rename(&tmp, path).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(e.into());
        }
        Ok(())
    }

    fn tmp_path(path: &Path) -> PathBuf {
        let seq = TMP_SEQ.fetch_add(1, Ordering::Relaxed);
        let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("entry");
        path.with_file_name(format!("{}.{}.{}.tmp", name, std::process::id(), seq))
    }
}

fn not_found_is_false(result: std::io::Result<()>) -> StoreResult<bool> {
    match result {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e.into()),
    }
}

#[async_trait]
impl CacheStore for DiskStore {
    async fn get(&self, namespace: &str, key: &str) -> StoreResult<Option<StoredEntry>> {
        let (body_path, meta_path) = self.entry_paths(namespace, key);

        let Some(meta) = Self::read_meta(&meta_path).await? else {
            return Ok(None);
        };
        let body = match fs::read(&body_path).await {
            Ok(body) => Bytes::from(body),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                warn!("⚠️ Metadata sin cuerpo en {}: {}", namespace, key);
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };

        let entry = StoredEntry { meta, body };
        entry.check_length()?;
        Ok(Some(entry))
    }

    async fn put(&self, namespace: &str, entry: StoredEntry) -> StoreResult<()> {
        entry.check_length()?;
        fs::create_dir_all(self.namespace_dir(namespace)).await?;

        let (body_path, meta_path) = self.entry_paths(namespace, entry.key());
        // El cuerpo primero: una entrada solo es visible cuando su metadata existe
        Self::write_atomic(&body_path, &entry.body).await?;
        let meta = serde_json::to_vec_pretty(&entry.meta)?;
        Self::write_atomic(&meta_path, &meta).await?;

        debug!("💾 {} bytes guardados en {}: {}", entry.len(), namespace, entry.key());
        Ok(())
    }

    async fn delete(&self, namespace: &str, key: &str) -> StoreResult<bool> {
        let (body_path, meta_path) = self.entry_paths(namespace, key);
        let existed = not_found_is_false(fs::remove_file(&meta_path).await)?;
        not_found_is_false(fs::remove_file(&body_path).await)?;
        Ok(existed)
    }

    async fn keys(&self, namespace: &str) -> StoreResult<Vec<String>> {
        let dir = self.namespace_dir(namespace);
        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut keys = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let is_meta = path
                .file_name()
                .and_then(|n| n.to_str())
                .map_or(false, |n| n.ends_with(META_EXT));
            if !is_meta {
                continue;
            }

            match Self::read_meta(&path).await {
                Ok(Some(meta)) => keys.push(meta.key),
                Ok(None) => {}
                Err(e) => warn!("Metadata ilegible en {}: {}", path.display(), e),
            }
        }

        Ok(keys)
    }

    async fn entry_len(&self, namespace: &str, key: &str) -> StoreResult<Option<u64>> {
        let (_, meta_path) = self.entry_paths(namespace, key);
        Ok(Self::read_meta(&meta_path).await?.map(|meta| meta.content_length))
    }

    async fn namespaces(&self) -> StoreResult<Vec<String>> {
        let mut entries = fs::read_dir(&self.root).await?;
        let mut names = Vec::new();

        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_dir() {
                continue;
            }
            if let Some(raw) = entry.file_name().to_str() {
                match urlencoding::decode(raw) {
                    Ok(name) => names.push(name.into_owned()),
                    Err(_) => warn!("Directorio de namespace inválido: {}", raw),
                }
            }
        }

        Ok(names)
    }

    async fn delete_namespace(&self, namespace: &str) -> StoreResult<bool> {
        let dir = self.namespace_dir(namespace);
        let removed = not_found_is_false(fs::remove_dir_all(&dir).await)?;
        if removed {
            info!("🗑️ Namespace eliminado: {}", namespace);
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;
    use crate::http::Response;
    use chrono::Utc;
    use reqwest::header::{HeaderValue, CONTENT_TYPE};
    use reqwest::StatusCode;

    fn audio_entry(key: &str, len: usize) -> StoredEntry {
        let response = Response::new(StatusCode::OK, vec![7u8; len])
            .with_header(CONTENT_TYPE, HeaderValue::from_static("audio/mpeg"));
        StoredEntry::from_response(key, &response, Utc::now())
    }

    #[tokio::test]
    async fn test_disk_round_trip_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let key = "https://cdn.example.com/audio/gen/1.mp3";

        {
            let store = DiskStore::new(dir.path().to_path_buf()).await.unwrap();
            store.put("audio-cache", audio_entry(key, 2048)).await.unwrap();
        }

        let reopened = DiskStore::new(dir.path().to_path_buf()).await.unwrap();
        let entry = reopened.get("audio-cache", key).await.unwrap().unwrap();
        assert_eq!(entry.len(), 2048);
        assert_eq!(entry.meta.content_length, 2048);
        assert_eq!(entry.meta.content_type.as_deref(), Some("audio/mpeg"));
        assert_eq!(reopened.keys("audio-cache").await.unwrap(), vec![key.to_string()]);
        assert_eq!(reopened.entry_len("audio-cache", key).await.unwrap(), Some(2048));
    }

    #[tokio::test]
    async fn test_truncated_body_is_an_error_not_a_hit() {
        let dir = tempfile::tempdir().unwrap();
        let store = DiskStore::new(dir.path().to_path_buf()).await.unwrap();
        store.put("audio-cache", audio_entry("k", 100)).await.unwrap();

        let (body_path, _) = store.entry_paths("audio-cache", "k");
        fs::write(&body_path, vec![0u8; 10]).await.unwrap();

        assert!(matches!(
            store.get("audio-cache", "k").await,
            Err(StoreError::LengthMismatch { declared: 100, actual: 10 })
        ));
    }

    #[tokio::test]
    async fn test_long_keys_are_stored_under_fixed_length_names() {
        let dir = tempfile::tempdir().unwrap();
        let store = DiskStore::new(dir.path().to_path_buf()).await.unwrap();
        let key = format!(
            "https://cdn.example.com/audio/chapter-verse/{}/track.mp3",
            "psalm-23/verse-1/".repeat(16)
        );
        assert!(key.len() >= 300);

        store.put("audio-cache", audio_entry(&key, 2048)).await.unwrap();

        let entry = store.get("audio-cache", &key).await.unwrap().unwrap();
        assert_eq!(entry.len(), 2048);
        assert_eq!(store.keys("audio-cache").await.unwrap(), vec![key.clone()]);

        let (body_path, meta_path) = store.entry_paths("audio-cache", &key);
        assert!(body_path.file_name().unwrap().len() < 100);
        assert!(meta_path.file_name().unwrap().len() < 100);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_puts_of_same_key_leave_one_whole_entry() {
        let dir = tempfile::tempdir().unwrap();
        let store = DiskStore::new(dir.path().to_path_buf()).await.unwrap();

        let mut handles = Vec::new();
        for i in 0..16usize {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store.put("static-v1", audio_entry("shared", 512 + i * 64)).await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        // Cuerpo y metadata pueden venir de escrituras distintas, pero nunca de un archivo mezclado
        let body_len = fs::read(store.entry_paths("static-v1", "shared").0).await.unwrap().len();
        assert!((512..512 + 16 * 64).contains(&body_len));
        assert_eq!((body_len - 512) % 64, 0);

        let mut leftovers = fs::read_dir(store.namespace_dir("static-v1")).await.unwrap();
        while let Some(entry) = leftovers.next_entry().await.unwrap() {
            let name = entry.file_name().into_string().unwrap();
            assert!(!name.ends_with(".tmp"), "temporal sin renombrar: {}", name);
        }
    }

    #[tokio::test]
    async fn test_namespaces_and_delete() {
        let dir = tempfile::tempdir().unwrap();
        let store = DiskStore::new(dir.path().to_path_buf()).await.unwrap();
        store.put("static-v1", audio_entry("a", 1)).await.unwrap();
        store.put("audio-cache", audio_entry("b", 1)).await.unwrap();

        let mut names = store.namespaces().await.unwrap();
        names.sort();
        assert_eq!(names, vec!["audio-cache".to_string(), "static-v1".to_string()]);

        assert!(store.delete("audio-cache", "b").await.unwrap());
        assert!(store.get("audio-cache", "b").await.unwrap().is_none());
        assert!(store.delete_namespace("static-v1").await.unwrap());
        assert!(!store.delete_namespace("static-v1").await.unwrap());
    }
}
