//! Versioned namespaces and the install/activate lifecycle.
//!
//! Static, dynamic and verse-data namespaces embed the build id, so a new
//! deployment never reads entries written by an older one. The audio
//! namespace name is stable and survives every deployment.
//!
//! A freshly installed version waits until the host releases its clients
//! before activating, unless `skip_waiting` asks for immediate activation.
//! Activation prunes every namespace that does not belong to the current
//! build (the audio namespace excepted).

use parking_lot::Mutex;
use serde::Serialize;
use tracing::{info, warn};
use url::Url;

use crate::error::{CacheError, RejectReason, StoreResult};
use crate::http::Request;
use crate::store::StoredEntry;
use crate::strategy::{CacheNamespace, StrategyContext};

pub const AUDIO_NAMESPACE: &str = "audio-cache";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Namespaces {
    build_id: String,
}

impl Namespaces {
    pub fn new(build_id: impl Into<String>) -> Self {
        Self {
            build_id: build_id.into(),
        }
    }

    pub fn build_id(&self) -> &str {
        &self.build_id
    }

    pub fn name(&self, namespace: CacheNamespace) -> String {
        match namespace {
            CacheNamespace::Static => format!("static-{}", self.build_id),
            CacheNamespace::Dynamic => format!("dynamic-{}", self.build_id),
            CacheNamespace::VerseData => format!("verse-data-{}", self.build_id),
            CacheNamespace::Audio => AUDIO_NAMESPACE.to_string(),
        }
    }

    /// `true` para los namespaces que la versión actual usa.
    pub fn is_current(&self, name: &str) -> bool {
        [
            CacheNamespace::Static,
            CacheNamespace::Dynamic,
            CacheNamespace::VerseData,
            CacheNamespace::Audio,
        ]
        .into_iter()
        .any(|namespace| self.name(namespace) == name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivationState {
    Installing,
    /// Instalada, esperando a que se liberen los clientes de la versión anterior.
    Waiting,
    Active,
}

#[derive(Debug)]
struct LifecycleState {
    activation: ActivationState,
    skip_waiting: bool,
}

pub struct Lifecycle {
    namespaces: Namespaces,
    ctx: StrategyContext,
    precache: Vec<Url>,
    state: Mutex<LifecycleState>,
}

impl Lifecycle {
    pub fn new(namespaces: Namespaces, ctx: StrategyContext, precache: Vec<Url>) -> Self {
        Self {
            namespaces,
            ctx,
            precache,
            state: Mutex::new(LifecycleState {
                activation: ActivationState::Installing,
                skip_waiting: false,
            }),
        }
    }

    pub fn namespaces(&self) -> &Namespaces {
        &self.namespaces
    }

    pub fn state(&self) -> ActivationState {
        self.state.lock().activation
    }

    /// Precachea el shell en el namespace estático. El primer fallo aborta la
    /// instalación; el host puede reintentarla.
    pub async fn install(&self) -> Result<usize, CacheError> {
        let namespace = self.namespaces.name(CacheNamespace::Static);
        info!("📦 Instalando build {} ({} URLs)", self.namespaces.build_id(), self.precache.len());

        for url in &self.precache {
            let response = self.ctx.network.fetch(&Request::get(url.clone())).await?;
            if !response.is_full() {
                return Err(CacheError::Rejected(RejectReason::NotFull {
                    status: response.status.as_u16(),
                }));
            }
            let entry = StoredEntry::from_response(url.as_str(), &response, self.ctx.clock.now());
            self.ctx.store.put(&namespace, entry).await?;
        }

        let skip = {
            let mut state = self.state.lock();
            if state.activation == ActivationState::Installing {
                state.activation = ActivationState::Waiting;
            }
            state.skip_waiting
        };
        info!("✅ Build {} instalado", self.namespaces.build_id());

        if skip {
            self.activate().await?;
        }
        Ok(self.precache.len())
    }

    /// Pide activar la versión sin esperar a que se cierren los clientes.
    pub async fn skip_waiting(&self) -> StoreResult<()> {
        let waiting = {
            let mut state = self.state.lock();
            state.skip_waiting = true;
            state.activation == ActivationState::Waiting
        };
        if waiting {
            self.activate().await?;
        }
        Ok(())
    }

    /// Política por defecto: el host avisa cuando la versión anterior ya no tiene clientes.
    pub async fn clients_released(&self) -> StoreResult<()> {
        if self.state() == ActivationState::Waiting {
            self.activate().await?;
        }
        Ok(())
    }

    /// Namespaces que pertenecen a otros builds.
    pub async fn stale_namespaces(&self) -> StoreResult<Vec<String>> {
        let mut stale = self.ctx.store.namespaces().await?;
        stale.retain(|name| !self.namespaces.is_current(name));
        Ok(stale)
    }

    /// Activa una versión instalada solo si no queda rastro de un build anterior:
    /// sin versión previa no hay clientes que esperar. Devuelve `true` si activó.
    pub async fn activate_if_unclaimed(&self) -> StoreResult<bool> {
        if self.state() != ActivationState::Waiting || !self.stale_namespaces().await?.is_empty() {
            return Ok(false);
        }
        self.activate().await?;
        Ok(true)
    }

    /// Toma el control: borra los namespaces de builds anteriores.
    pub async fn activate(&self) -> StoreResult<Vec<String>> {
        let mut pruned = Vec::new();
        for name in self.stale_namespaces().await? {
            match self.ctx.store.delete_namespace(&name).await {
                Ok(_) => {
                    info!("🗑️ Namespace obsoleto eliminado: {}", name);
                    pruned.push(name);
                }
                Err(e) => warn!("⚠️ No se pudo eliminar {}: {}", name, e),
            }
        }

        self.state.lock().activation = ActivationState::Active;
        info!("🚀 Build {} activo", self.namespaces.build_id());
        Ok(pruned)
    }
}
