use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::index::{AudioIndex, IndexRecord};
use crate::clock::Clock;
use crate::error::{CacheError, RejectReason, StoreResult};
use crate::http::Response;
use crate::store::{CacheStore, StoredEntry};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InsertOutcome {
    Stored { size: u64, evicted: Vec<String> },
    Rejected(RejectReason),
}

impl InsertOutcome {
    pub fn is_stored(&self) -> bool {
        matches!(self, InsertOutcome::Stored { .. })
    }
}

/// Resumen del namespace de audio para el plano de control.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioCacheStatus {
    pub count: usize,
    pub total_size: u64,
    pub quota: u64,
    pub entries: Vec<IndexRecord>,
}

/// Caché de audio con cuota en bytes y desalojo LRU.
///
/// El store y el índice se mutan siempre juntos y bajo `writer`, de modo que
/// inserciones y desalojos concurrentes no cobran dos veces la cuota ni
/// borran dos veces la misma entrada. Las lecturas no toman `writer`.
pub struct AudioCache {
    store: Arc<dyn CacheStore>,
    clock: Arc<dyn Clock>,
    namespace: String,
    quota: u64,
    min_bytes: u64,
    index: Mutex<AudioIndex>,
    writer: tokio::sync::Mutex<()>,
}

impl AudioCache {
    pub fn new(
        store: Arc<dyn CacheStore>,
        clock: Arc<dyn Clock>,
        namespace: impl Into<String>,
        quota: u64,
        min_bytes: u64,
    ) -> Self {
        Self {
            store,
            clock,
            namespace: namespace.into(),
            quota,
            min_bytes,
            index: Mutex::new(AudioIndex::new()),
            writer: tokio::sync::Mutex::new(()),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn quota(&self) -> u64 {
        self.quota
    }

    pub fn indexed_total(&self) -> u64 {
        self.index.lock().total_size()
    }

    pub fn indexed_len(&self) -> usize {
        self.index.lock().len()
    }

    /// Lee tamaños desde el store. Las claves ya conocidas conservan sus
    /// marcas de tiempo; las nuevas reciben `now`.
    async fn scan(&self, known: &HashMap<String, IndexRecord>) -> StoreResult<Vec<IndexRecord>> {
        let now = self.clock.now();
        let mut records = Vec::new();

        for key in self.store.keys(&self.namespace).await? {
            let Some(size) = self.store.entry_len(&self.namespace, &key).await? else {
                continue;
            };
            let record = match known.get(&key) {
                Some(previous) => IndexRecord {
                    size,
                    ..previous.clone()
                },
                None => IndexRecord::new(key, size, now),
            };
            records.push(record);
        }

        Ok(records)
    }

    /// Reconstruye el índice perezosamente tras un reinicio.
    async fn ensure_loaded(&self) -> StoreResult<()> {
        if self.index.lock().is_loaded() {
            return Ok(());
        }

        let _writer = self.writer.lock().await;
        if self.index.lock().is_loaded() {
            return Ok(());
        }

        let records = self.scan(&HashMap::new()).await?;
        let mut index = self.index.lock();
        index.load(records);
        info!(
            "📇 Índice de audio reconstruido: {} entradas, {} bytes",
            index.len(),
            index.total_size()
        );
        Ok(())
    }

    /// Busca una entrada y marca el acceso. Un fallo del store cuenta como miss.
    pub async fn lookup(&self, key: &str) -> Option<StoredEntry> {
        if let Err(e) = self.ensure_loaded().await {
            warn!("⚠️ No se pudo reconstruir el índice de audio: {}", e);
        }

        match self.store.get(&self.namespace, key).await {
            Ok(Some(entry)) => {
                self.touch(key);
                debug!("✅ Cache hit de audio: {}", key);
                Some(entry)
            }
            Ok(None) => {
                debug!("❌ Cache miss de audio: {}", key);
                None
            }
            Err(e) => {
                warn!("⚠️ Error leyendo audio cacheado {}: {}", key, e);
                None
            }
        }
    }

    /// Comprobación de presencia, sin tocar el índice.
    pub async fn contains(&self, key: &str) -> bool {
        match self.store.contains(&self.namespace, key).await {
            Ok(found) => found,
            Err(e) => {
                warn!("⚠️ Error consultando audio cacheado {}: {}", key, e);
                false
            }
        }
    }

    pub fn touch(&self, key: &str) {
        let now = self.clock.now();
        self.index.lock().touch(key, now);
    }

    /// Valida el payload, desaloja lo necesario y lo guarda.
    pub async fn insert(&self, key: &str, response: &Response) -> Result<InsertOutcome, CacheError> {
        // Se lee antes de materializar el cuerpo
        let expected = response.declared_length();

        if !response.is_full() {
            return Ok(self.reject(key, RejectReason::NotFull {
                status: response.status.as_u16(),
            }));
        }

        let actual = response.body.len() as u64;
        if let Some(expected) = expected {
            if expected != actual {
                return Ok(self.reject(key, RejectReason::Incomplete { expected, actual }));
            }
        }
        if actual < self.min_bytes {
            return Ok(self.reject(key, RejectReason::TooSmall {
                size: actual,
                minimum: self.min_bytes,
            }));
        }
        if actual > self.quota {
            return Ok(self.reject(key, RejectReason::OverQuota {
                size: actual,
                quota: self.quota,
            }));
        }

        self.ensure_loaded().await?;
        let _writer = self.writer.lock().await;

        let plan = self.index.lock().eviction_plan(actual, self.quota, Some(key));
        for victim in &plan {
            self.store.delete(&self.namespace, victim).await?;
            if let Some(record) = self.index.lock().remove(victim) {
                info!("🧹 Audio desalojado por cuota: {} ({} bytes)", victim, record.size);
            }
        }

        let now = self.clock.now();
        let entry = StoredEntry::from_response(key, response, now);
        if let Err(e) = self.store.put(&self.namespace, entry).await {
            // Mantener el índice en paso con lo que quede en el store
            self.index.lock().remove(key);
            if let Err(cleanup) = self.store.delete(&self.namespace, key).await {
                warn!("Error limpiando entrada fallida {}: {}", key, cleanup);
            }
            return Err(e.into());
        }

        let total = {
            let mut index = self.index.lock();
            index.insert(IndexRecord::new(key, actual, now));
            index.total_size()
        };
        info!(
            "💾 Audio cacheado: {} ({} bytes, total {}/{})",
            key, actual, total, self.quota
        );

        Ok(InsertOutcome::Stored {
            size: actual,
            evicted: plan,
        })
    }

    fn reject(&self, key: &str, reason: RejectReason) -> InsertOutcome {
        warn!("🚫 Audio no cacheado {}: {}", key, reason);
        InsertOutcome::Rejected(reason)
    }

    /// Reconstruye el índice desde el store y devuelve el resumen.
    pub async fn status(&self) -> StoreResult<AudioCacheStatus> {
        let _writer = self.writer.lock().await;

        let known: HashMap<String, IndexRecord> = self
            .index
            .lock()
            .records()
            .into_iter()
            .map(|record| (record.key.clone(), record))
            .collect();
        let records = self.scan(&known).await?;

        let mut index = self.index.lock();
        index.load(records);
        Ok(AudioCacheStatus {
            count: index.len(),
            total_size: index.total_size(),
            quota: self.quota,
            entries: index.records(),
        })
    }

    /// Borra el namespace completo y vacía el índice.
    pub async fn clear(&self) -> StoreResult<bool> {
        let _writer = self.writer.lock().await;
        let removed = self.store.delete_namespace(&self.namespace).await?;
        self.index.lock().clear();
        info!("🗑️ Caché de audio vaciada");
        Ok(removed)
    }
}
