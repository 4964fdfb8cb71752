//! # Strategy Module
//!
//! Routing of intercepted requests and the caching strategies behind each route.
//!
//! - [`router`]: pure classification of a request into a [`Route`]
//! - [`cache_first`]: immutable-ish static assets, served from the store when present
//! - [`network_first`]: verse/taxonomy data and HTML, store used as offline fallback
//! - [`audio`]: the audio handler, backed by the quota-bounded [`AudioCache`](crate::cache::AudioCache)
//!
//! Store failures are treated as misses everywhere in this module; they never
//! turn a good network response into an error.

pub mod audio;
pub mod cache_first;
pub mod network_first;
pub mod router;

use std::sync::Arc;
use tracing::{debug, warn};

use crate::clock::Clock;
use crate::http::{Request, Response};
use crate::network::Network;
use crate::store::{CacheStore, StoredEntry};

pub use audio::{AudioService, Preload};
pub use cache_first::cache_first;
pub use network_first::network_first;
pub use router::{classify, CacheNamespace, Route, RouterConfig};

/// Colaboradores compartidos por las estrategias sin cuota.
#[derive(Clone)]
pub struct StrategyContext {
    pub store: Arc<dyn CacheStore>,
    pub network: Arc<dyn Network>,
    pub clock: Arc<dyn Clock>,
}

impl StrategyContext {
    pub fn new(store: Arc<dyn CacheStore>, network: Arc<dyn Network>, clock: Arc<dyn Clock>) -> Self {
        Self { store, network, clock }
    }

    /// Copia cacheada de `key`; un error del store cuenta como miss.
    pub async fn cached(&self, namespace: &str, key: &str) -> Option<Response> {
        match self.store.get(namespace, key).await {
            Ok(Some(entry)) => {
                debug!("✅ Cache hit [{}]: {}", namespace, key);
                Some(entry.to_response())
            }
            Ok(None) => None,
            Err(e) => {
                warn!("⚠️ Error leyendo caché [{}] {}: {}", namespace, key, e);
                None
            }
        }
    }

    /// Guarda solo respuestas completas (200). Devuelve si quedó guardada.
    pub async fn store_full(&self, namespace: &str, key: &str, response: &Response) -> bool {
        if !response.is_full() {
            debug!("⏭️ No se cachea {} (estado {})", key, response.status);
            return false;
        }

        let entry = StoredEntry::from_response(key, response, self.clock.now());
        match self.store.put(namespace, entry).await {
            Ok(()) => {
                debug!("💾 Guardado en [{}]: {}", namespace, key);
                true
            }
            Err(e) => {
                warn!("⚠️ Error guardando en caché [{}] {}: {}", namespace, key, e);
                false
            }
        }
    }
}

/// Petición al shell de la página (`/` o `/index.html`).
pub(crate) fn is_shell(request: &Request) -> bool {
    matches!(request.url.path(), "/" | "/index.html")
}
