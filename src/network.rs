use async_trait::async_trait;
use std::time::Duration;
use tracing::debug;

use crate::error::FetchError;
use crate::http::{Request, Response};

/// Acceso al origen. El cuerpo llega completamente materializado.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Network: Send + Sync {
    async fn fetch(&self, request: &Request) -> Result<Response, FetchError>;
}

/// Cliente HTTP real sobre `reqwest`.
///
/// Solo se fija el timeout de conexión; la duración total de una descarga
/// queda en manos del transporte.
pub struct HttpNetwork {
    client: reqwest::Client,
}

impl HttpNetwork {
    pub fn new(connect_timeout: Duration, user_agent: &str) -> reqwest::Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .user_agent(user_agent)
            .build()?;

        Ok(Self { client })
    }
}

#[async_trait]
impl Network for HttpNetwork {
    async fn fetch(&self, request: &Request) -> Result<Response, FetchError> {
        debug!("🌐 {} {}", request.method, request.url);

        let response = self
            .client
            .request(request.method.clone(), request.url.clone())
            .headers(request.headers.clone())
            .send()
            .await?;

        let status = response.status();
        let headers = response.headers().clone();
        let body = response.bytes().await?;

        debug!("📥 {} {} ({} bytes)", status, request.url, body.len());
        Ok(Response {
            status,
            headers,
            body,
        })
    }
}
