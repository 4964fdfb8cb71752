use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::{debug, info, warn};
use url::Url;

use crate::cache::AudioCache;
use crate::clock::Clock;
use crate::config::Config;
use crate::control::{self, ControlMessage, ControlResponse};
use crate::error::{CacheError, FetchError, RejectReason, StoreResult};
use crate::http::{Request, Response};
use crate::lifecycle::{Lifecycle, Namespaces};
use crate::network::Network;
use crate::store::{CacheStore, StoredEntry};
use crate::strategy::{
    cache_first, classify, network_first, AudioService, CacheNamespace, Route, RouterConfig, StrategyContext,
};
use crate::tasks::BackgroundTasks;

/// Decisión sobre una petición interceptada.
#[derive(Debug)]
pub enum Handled {
    /// No se intercepta; el host la envía por la red normal.
    Passthrough,
    Respond(Response),
}

/// Motor de caché: se construye una vez al arrancar y se comparte.
pub struct CacheEngine {
    router: RouterConfig,
    ctx: StrategyContext,
    audio: AudioService,
    lifecycle: Lifecycle,
    tasks: BackgroundTasks,
}

impl CacheEngine {
    pub fn new(
        config: &Config,
        store: Arc<dyn CacheStore>,
        network: Arc<dyn Network>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let namespaces = Namespaces::new(config.build_id.clone());
        let ctx = StrategyContext::new(store.clone(), network.clone(), clock.clone());
        let tasks = BackgroundTasks::new();

        let audio_cache = Arc::new(AudioCache::new(
            store,
            clock.clone(),
            namespaces.name(CacheNamespace::Audio),
            config.audio_quota_bytes,
            config.min_audio_bytes,
        ));
        let cooldown = chrono::Duration::from_std(config.refetch_cooldown)
            .context("refetch cooldown out of range")?;
        let audio = AudioService::new(audio_cache, network, clock, tasks.clone(), cooldown);

        let precache = config
            .precache_urls
            .iter()
            .map(|url| Url::parse(url).with_context(|| format!("Invalid precache URL: {}", url)))
            .collect::<Result<Vec<_>>>()?;
        let lifecycle = Lifecycle::new(namespaces, ctx.clone(), precache);

        info!(
            "⚙️ Motor de caché listo (build {}, cuota de audio {} bytes)",
            config.build_id, config.audio_quota_bytes
        );

        Ok(Self {
            router: config.router(),
            ctx,
            audio,
            lifecycle,
            tasks,
        })
    }

    pub fn audio(&self) -> &AudioService {
        &self.audio
    }

    pub fn lifecycle(&self) -> &Lifecycle {
        &self.lifecycle
    }

    pub fn tasks(&self) -> &BackgroundTasks {
        &self.tasks
    }

    fn namespace(&self, namespace: CacheNamespace) -> String {
        self.lifecycle.namespaces().name(namespace)
    }

    /// Atiende una petición interceptada.
    ///
    /// `Err` solo aparece cuando la estrategia decide propagar el fallo de red
    /// (assets no-HTML sin copia, API sin caché).
    pub async fn handle(&self, request: &Request) -> Result<Handled, FetchError> {
        let route = classify(request, &self.router);
        debug!("🧭 {} → {:?}", request.url, route);

        let response = match route {
            Route::Ignore => return Ok(Handled::Passthrough),
            Route::Audio => self.audio.handle(request).await,
            Route::NetworkOnly => self.ctx.network.fetch(request).await?,
            Route::CacheFirst(namespace) => cache_first(&self.ctx, &self.namespace(namespace), request).await?,
            Route::NetworkFirst { namespace, html } => {
                network_first(&self.ctx, &self.namespace(namespace), request, html).await?
            }
        };

        Ok(Handled::Respond(response))
    }

    pub async fn handle_message(&self, message: ControlMessage) -> Option<ControlResponse> {
        control::dispatch(self, message).await
    }

    /// Descarga y guarda un recurso en verse-data; el llamador espera el resultado.
    pub async fn precache_url(&self, url: &Url) -> Result<(), CacheError> {
        let response = self.ctx.network.fetch(&Request::get(url.clone())).await?;
        if !response.is_full() {
            return Err(CacheError::Rejected(RejectReason::NotFull {
                status: response.status.as_u16(),
            }));
        }

        let entry = StoredEntry::from_response(url.as_str(), &response, self.ctx.clock.now());
        self.ctx
            .store
            .put(&self.namespace(CacheNamespace::VerseData), entry)
            .await?;
        info!("📥 Recurso precacheado: {}", url);
        Ok(())
    }

    /// Borra todos los namespaces y vacía el índice de audio.
    pub async fn clear_all(&self) -> StoreResult<usize> {
        let audio_namespace = self.audio.cache().namespace().to_string();
        let mut cleared = 0;

        for name in self.ctx.store.namespaces().await? {
            if name == audio_namespace {
                continue;
            }
            if self.ctx.store.delete_namespace(&name).await? {
                cleared += 1;
            }
        }
        if self.audio.cache().clear().await? {
            cleared += 1;
        }

        warn!("🗑️ Todas las cachés eliminadas ({} namespaces)", cleared);
        Ok(cleared)
    }
}
