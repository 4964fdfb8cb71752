use tracing::{debug, warn};

use super::{is_shell, StrategyContext};
use crate::error::FetchError;
use crate::http::{Request, Response};

/// Documento raíz cacheado (`/` o `/index.html`) para el mismo origen.
async fn cached_shell(ctx: &StrategyContext, namespace: &str, request: &Request) -> Option<Response> {
    for path in ["/", "/index.html"] {
        let Ok(root) = request.url.join(path) else {
            continue;
        };
        if let Some(response) = ctx.cached(namespace, root.as_str()).await {
            return Some(response);
        }
    }
    None
}

/// Cache-first: un hit se sirve sin revalidar; un miss va a la red y se guarda
/// si la respuesta es completa.
pub async fn cache_first(ctx: &StrategyContext, namespace: &str, request: &Request) -> Result<Response, FetchError> {
    let key = request.url.as_str();
    if let Some(cached) = ctx.cached(namespace, key).await {
        return Ok(cached);
    }

    match ctx.network.fetch(request).await {
        Ok(response) => {
            ctx.store_full(namespace, key, &response).await;
            Ok(response)
        }
        Err(e) if is_shell(request) || request.accepts_html() => {
            warn!("📴 Sin red para {}, sirviendo shell: {}", key, e);
            match cached_shell(ctx, namespace, request).await {
                Some(shell) => Ok(shell),
                None => {
                    debug!("📴 Shell no cacheado, página offline");
                    Ok(Response::offline_page())
                }
            }
        }
        Err(e) => Err(e),
    }
}
