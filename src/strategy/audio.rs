use dashmap::DashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};
use url::Url;

use crate::cache::inflight::{InFlight, Joined, Publisher};
use crate::cache::{normalize_key, range, AudioCache, InsertOutcome};
use crate::clock::Clock;
use crate::cooldown::Cooldown;
use crate::error::{CacheError, FetchError};
use crate::http::{Request, Response};
use crate::network::Network;
use crate::tasks::BackgroundTasks;

type FetchOutcome = Result<Response, FetchError>;

/// Resultado de una precarga pedida por el plano de control.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Preload {
    /// Ya estaba en caché; solo se marcó el acceso.
    Cached,
    /// Se descargó y quedó guardado.
    Fetched,
    Failed(String),
}

/// Manejador de peticiones de audio.
///
/// Un hit se sirve desde la caché (con rango si se pidió) sin tocar la red.
/// Un miss descarga el archivo completo una sola vez por clave normalizada,
/// entrega la respuesta en cuanto llega y la guarda después, dentro de la
/// misma operación en vuelo.
#[derive(Clone)]
pub struct AudioService {
    cache: Arc<AudioCache>,
    network: Arc<dyn Network>,
    clock: Arc<dyn Clock>,
    inflight: Arc<InFlight<FetchOutcome>>,
    refetch_guards: Arc<DashMap<String, Cooldown>>,
    refetch_cooldown: chrono::Duration,
}

impl AudioService {
    pub fn new(
        cache: Arc<AudioCache>,
        network: Arc<dyn Network>,
        clock: Arc<dyn Clock>,
        tasks: BackgroundTasks,
        refetch_cooldown: chrono::Duration,
    ) -> Self {
        Self {
            cache,
            network,
            clock,
            inflight: Arc::new(InFlight::new(tasks)),
            refetch_guards: Arc::new(DashMap::new()),
            refetch_cooldown,
        }
    }

    pub fn cache(&self) -> &Arc<AudioCache> {
        &self.cache
    }

    pub fn in_flight(&self) -> usize {
        self.inflight.len()
    }

    /// Atiende una petición interceptada. Nunca falla: sin red ni caché, 503.
    pub async fn handle(&self, request: &Request) -> Response {
        let key = normalize_key(&request.url);

        if let Some(entry) = self.cache.lookup(&key).await {
            return range::serve(&entry, request.range().as_deref());
        }

        // Nunca se reenvía el Range del llamador: se quiere el archivo completo
        let joined = self.fetch_and_cache(&key, request.without_range());
        match joined.result().await {
            Some(Ok(response)) => response,
            Some(Err(e)) => {
                warn!("📴 Audio no disponible {}: {}", key, e);
                Response::unavailable()
            }
            None => {
                warn!("📴 Descarga de audio abandonada: {}", key);
                Response::unavailable()
            }
        }
    }

    /// Asegura que `url` quede en caché y espera a que termine la operación.
    pub async fn preload(&self, url: &Url) -> Preload {
        let key = normalize_key(url);

        if self.cache.contains(&key).await {
            self.cache.touch(&key);
            debug!("✅ Precarga desde caché: {}", key);
            return Preload::Cached;
        }

        let joined = self.fetch_and_cache(&key, Request::get(url.clone()));
        let output = joined.result().await;
        joined.wait_settled().await;
        let stored = self.cache.contains(&key).await;

        match output {
            Some(Ok(response)) if !response.status.is_success() => {
                Preload::Failed(format!("origin answered {}", response.status))
            }
            Some(Ok(_)) if stored => Preload::Fetched,
            Some(Ok(_)) => Preload::Failed("response could not be cached".to_string()),
            Some(Err(e)) => Preload::Failed(e.to_string()),
            None => Preload::Failed(FetchError::Abandoned.to_string()),
        }
    }

    pub async fn is_cached(&self, url: &Url) -> bool {
        self.cache.contains(&normalize_key(url)).await
    }

    fn fetch_and_cache(&self, key: &str, request: Request) -> Joined<FetchOutcome> {
        let service = self.clone();
        let owned_key = key.to_string();
        self.inflight.coalesce(key, move |publisher| async move {
            service.populate(owned_key, request, publisher).await
        })
    }

    /// Operación en vuelo: fetch, publicar, y poblar la caché.
    async fn populate(
        self,
        key: String,
        request: Request,
        publisher: Publisher<FetchOutcome>,
    ) -> Result<(), CacheError> {
        let fetched = self.network.fetch(&request).await;
        publisher.publish(fetched.clone());
        let response = fetched?;

        let full = if response.is_partial() {
            // El origen ignoró la petición sin rango
            if !self.allow_refetch(&key) {
                debug!("⏳ Refetch completo en cooldown: {}", key);
                return Ok(());
            }
            info!("🔁 Respuesta parcial, descargando archivo completo: {}", key);
            self.network.fetch(&request).await?
        } else {
            response
        };

        match self.cache.insert(&key, &full).await? {
            InsertOutcome::Stored { evicted, .. } if !evicted.is_empty() => {
                debug!("🧹 {} entradas desalojadas para {}", evicted.len(), key);
            }
            _ => {}
        }
        Ok(())
    }

    fn allow_refetch(&self, key: &str) -> bool {
        let now = self.clock.now();
        self.refetch_guards.retain(|_, guard| !guard.is_expired(now));

        let mut guard = self
            .refetch_guards
            .entry(key.to_string())
            .or_insert_with(|| Cooldown::new(self.refetch_cooldown));
        guard.try_enter(now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::manual::ManualClock;
    use crate::http::number_header;
    use crate::network::MockNetwork;
    use crate::store::MemoryStore;
    use crate::strategy::testing::{full_body, FakeOrigin};
    use pretty_assertions::assert_eq;
    use reqwest::header::{HeaderValue, CONTENT_LENGTH, CONTENT_RANGE, RANGE};
    use reqwest::StatusCode;
    use std::time::Duration;

    const URL: &str = "https://cdn.example.com/audio/john/3.mp3";

    struct Harness {
        service: AudioService,
        tasks: BackgroundTasks,
        clock: Arc<ManualClock>,
    }

    fn harness(network: Arc<dyn Network>) -> Harness {
        let clock = Arc::new(ManualClock::at_secs(1_000));
        let tasks = BackgroundTasks::new();
        let cache = Arc::new(AudioCache::new(
            Arc::new(MemoryStore::new()),
            clock.clone(),
            "audio-cache",
            100_000,
            16,
        ));
        let service = AudioService::new(cache, network, clock.clone(), tasks.clone(), chrono::Duration::seconds(30));
        Harness { service, tasks, clock }
    }

    fn partial(size: usize) -> Response {
        Response::new(StatusCode::PARTIAL_CONTENT, vec![9u8; size])
            .with_header(CONTENT_LENGTH, number_header(size as u64))
    }

    #[tokio::test]
    async fn test_concurrent_preloads_share_one_fetch() {
        let origin = Arc::new(
            FakeOrigin::new()
                .respond(URL, full_body(4_000))
                .with_delay(Duration::from_millis(30)),
        );
        let h = harness(origin.clone());
        let url = Url::parse(URL).unwrap();

        let preloads = (0..5).map(|_| {
            let service = h.service.clone();
            let url = url.clone();
            async move { service.preload(&url).await }
        });
        let results = futures::future::join_all(preloads).await;

        assert_eq!(origin.fetch_count(), 1);
        assert!(results.iter().all(|r| *r == Preload::Fetched));
        assert_eq!(h.service.preload(&url).await, Preload::Cached);
        h.tasks.settle().await;
        assert_eq!(h.service.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_miss_returns_network_response_and_caches_in_background() {
        // La descarga usa la URL original; la clave de caché no lleva query
        let seek_url = format!("{}?t=30", URL);
        let origin = Arc::new(FakeOrigin::new().respond(&seek_url, full_body(2_048)));
        let h = harness(origin.clone());
        let request = Request::parse_get(&seek_url)
            .unwrap()
            .with_header(RANGE, HeaderValue::from_static("bytes=100-"));

        let response = h.service.handle(&request).await;
        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(response.body.len(), 2_048);
        // El Range del llamador no llega al origen
        assert!(origin.seen.lock()[0].headers.get(RANGE).is_none());

        h.tasks.settle().await;
        assert!(h.service.is_cached(&Url::parse(URL).unwrap()).await);

        // Segunda vez: sale de la caché, recortado al rango
        let ranged = h.service.handle(&request).await;
        assert_eq!(origin.fetch_count(), 1);
        assert_eq!(ranged.status, StatusCode::PARTIAL_CONTENT);
        assert_eq!(ranged.body.len(), 1_948);
        assert_eq!(ranged.header(&CONTENT_RANGE), Some("bytes 100-2047/2048"));
    }

    #[tokio::test]
    async fn test_partial_response_triggers_full_refetch() {
        let origin = Arc::new(
            FakeOrigin::new()
                .respond(URL, partial(512))
                .respond(URL, full_body(3_000)),
        );
        let h = harness(origin.clone());

        let response = h.service.handle(&Request::parse_get(URL).unwrap()).await;
        assert_eq!(response.status, StatusCode::PARTIAL_CONTENT);

        h.tasks.settle().await;
        assert_eq!(origin.fetch_count(), 2);
        assert_eq!(h.service.cache().indexed_total(), 3_000);
    }

    #[tokio::test]
    async fn test_refetch_after_partial_respects_cooldown() {
        let origin = Arc::new(FakeOrigin::new().respond(URL, partial(512)));
        let h = harness(origin.clone());
        let request = Request::parse_get(URL).unwrap();

        // Primer 206: fetch + refetch (también parcial, no se guarda)
        h.service.handle(&request).await;
        h.tasks.settle().await;
        assert_eq!(origin.fetch_count(), 2);

        // Dentro del cooldown: solo el fetch en primer plano
        h.clock.advance_secs(10);
        h.service.handle(&request).await;
        h.tasks.settle().await;
        assert_eq!(origin.fetch_count(), 3);

        // Pasado el cooldown vuelve a intentarlo
        h.clock.advance_secs(60);
        h.service.handle(&request).await;
        h.tasks.settle().await;
        assert_eq!(origin.fetch_count(), 5);
        assert!(!h.service.is_cached(&Url::parse(URL).unwrap()).await);
    }

    #[tokio::test]
    async fn test_network_failure_yields_unavailable() {
        let mut mock = MockNetwork::new();
        mock.expect_fetch()
            .times(1)
            .returning(|_| Err(FetchError::Transport("connection refused".to_string())));
        let h = harness(Arc::new(mock));

        let response = h.service.handle(&Request::parse_get(URL).unwrap()).await;
        assert_eq!(response.status, StatusCode::SERVICE_UNAVAILABLE);

        h.tasks.settle().await;
        assert_eq!(h.service.in_flight(), 0);
        assert_eq!(h.tasks.snapshot().failed, 1);
    }

    #[tokio::test]
    async fn test_preload_reports_failures() {
        let missing = "https://cdn.example.com/audio/missing.mp3";
        let origin = Arc::new(
            FakeOrigin::new()
                .respond(missing, Response::new(StatusCode::NOT_FOUND, "not found"))
                .respond(URL, full_body(4)),
        );
        let h = harness(origin);

        assert_eq!(
            h.service.preload(&Url::parse(missing).unwrap()).await,
            Preload::Failed("origin answered 404 Not Found".to_string())
        );
        // 4 bytes quedan por debajo del mínimo
        assert_eq!(
            h.service.preload(&Url::parse(URL).unwrap()).await,
            Preload::Failed("response could not be cached".to_string())
        );
    }
}
