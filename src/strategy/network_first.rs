use tracing::{debug, warn};

use super::StrategyContext;
use crate::error::FetchError;
use crate::http::{Request, Response};

/// Network-first: la red manda cuando responde; la caché cubre el modo offline.
pub async fn network_first(
    ctx: &StrategyContext,
    namespace: &str,
    request: &Request,
    html: bool,
) -> Result<Response, FetchError> {
    let key = request.url.as_str();

    match ctx.network.fetch(request).await {
        Ok(response) => {
            ctx.store_full(namespace, key, &response).await;
            Ok(response)
        }
        Err(e) => {
            warn!("📴 Red no disponible para {}: {}", key, e);
            if let Some(cached) = ctx.cached(namespace, key).await {
                debug!("📦 Sirviendo copia offline: {}", key);
                return Ok(cached);
            }
            if html || request.accepts_html() {
                return Ok(Response::offline_page());
            }
            Err(e)
        }
    }
}
