//! Out-of-band control channel.
//!
//! The application sends `{"type": "...", ...}` envelopes; every message except
//! `SKIP_WAITING` and `CLIENTS_RELEASED` gets exactly one `{"type": "<TYPE>_RESULT", ...}` envelope
//! back. Failures are reported in the `error` field and never escape
//! [`dispatch`].

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use url::Url;

use crate::cache::AudioCacheStatus;
use crate::engine::CacheEngine;
use crate::strategy::Preload;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ControlMessage {
    #[serde(alias = "ACTIVATE_NOW")]
    SkipWaiting,
    /// El host avisa que la versión anterior ya no tiene clientes.
    ClientsReleased,
    CacheUrl { url: String },
    PreloadAudio { url: String },
    GetAudioCacheStatus,
    CheckAudioCached { url: String },
    ClearAllCaches,
    ClearAudioCache,
}

impl ControlMessage {
    pub fn parse(line: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(line)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ControlResponse {
    #[serde(rename_all = "camelCase")]
    CacheUrlResult {
        url: String,
        success: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    PreloadAudioResult {
        url: String,
        success: bool,
        from_cache: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    GetAudioCacheStatusResult {
        success: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        status: Option<AudioCacheStatus>,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    CheckAudioCachedResult { url: String, cached: bool },
    #[serde(rename_all = "camelCase")]
    ClearAllCachesResult {
        success: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    ClearAudioCacheResult {
        success: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    /// Envelope ilegible: no se pudo identificar el tipo de mensaje.
    Error { error: String },
}

impl ControlResponse {
    pub fn malformed(err: impl std::fmt::Display) -> Self {
        ControlResponse::Error {
            error: format!("malformed control message: {}", err),
        }
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|e| format!("{{\"type\":\"ERROR\",\"error\":\"{}\"}}", e))
    }
}

fn outcome<T, E: std::fmt::Display>(result: Result<T, E>) -> (bool, Option<String>) {
    match result {
        Ok(_) => (true, None),
        Err(e) => (false, Some(e.to_string())),
    }
}

/// Punto único de despacho del plano de control.
pub async fn dispatch(engine: &CacheEngine, message: ControlMessage) -> Option<ControlResponse> {
    debug!("📨 Mensaje de control: {:?}", message);

    let response = match message {
        ControlMessage::SkipWaiting => {
            if let Err(e) = engine.lifecycle().skip_waiting().await {
                warn!("⚠️ Activación inmediata falló: {}", e);
            }
            return None;
        }

        ControlMessage::ClientsReleased => {
            if let Err(e) = engine.lifecycle().clients_released().await {
                warn!("⚠️ Activación tras liberar clientes falló: {}", e);
            }
            return None;
        }

        ControlMessage::CacheUrl { url } => {
            let result = match Url::parse(&url) {
                Ok(parsed) => engine.precache_url(&parsed).await.map_err(|e| e.to_string()),
                Err(e) => Err(format!("invalid url: {}", e)),
            };
            let (success, error) = outcome(result);
            ControlResponse::CacheUrlResult { url, success, error }
        }

        ControlMessage::PreloadAudio { url } => {
            let preload = match Url::parse(&url) {
                Ok(parsed) => engine.audio().preload(&parsed).await,
                Err(e) => Preload::Failed(format!("invalid url: {}", e)),
            };
            let (success, from_cache, error) = match preload {
                Preload::Cached => (true, true, None),
                Preload::Fetched => (true, false, None),
                Preload::Failed(e) => (false, false, Some(e)),
            };
            ControlResponse::PreloadAudioResult {
                url,
                success,
                from_cache,
                error,
            }
        }

        ControlMessage::GetAudioCacheStatus => match engine.audio().cache().status().await {
            Ok(status) => ControlResponse::GetAudioCacheStatusResult {
                success: true,
                status: Some(status),
                error: None,
            },
            Err(e) => ControlResponse::GetAudioCacheStatusResult {
                success: false,
                status: None,
                error: Some(e.to_string()),
            },
        },

        ControlMessage::CheckAudioCached { url } => {
            let cached = match Url::parse(&url) {
                Ok(parsed) => engine.audio().is_cached(&parsed).await,
                Err(_) => false,
            };
            ControlResponse::CheckAudioCachedResult { url, cached }
        }

        ControlMessage::ClearAllCaches => {
            let (success, error) = outcome(engine.clear_all().await);
            ControlResponse::ClearAllCachesResult { success, error }
        }

        ControlMessage::ClearAudioCache => {
            let (success, error) = outcome(engine.audio().cache().clear().await);
            ControlResponse::ClearAudioCacheResult { success, error }
        }
    };

    Some(response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_message_envelopes_parse() {
        assert_eq!(
            ControlMessage::parse(r#"{"type":"PRELOAD_AUDIO","url":"https://cdn/a.mp3"}"#).unwrap(),
            ControlMessage::PreloadAudio {
                url: "https://cdn/a.mp3".to_string()
            }
        );
        assert_eq!(
            ControlMessage::parse(r#"{"type":"ACTIVATE_NOW"}"#).unwrap(),
            ControlMessage::SkipWaiting
        );
        assert_eq!(
            ControlMessage::parse(r#"{"type":"CLIENTS_RELEASED"}"#).unwrap(),
            ControlMessage::ClientsReleased
        );
        assert_eq!(
            ControlMessage::parse(r#"{"type":"GET_AUDIO_CACHE_STATUS"}"#).unwrap(),
            ControlMessage::GetAudioCacheStatus
        );
        assert!(ControlMessage::parse(r#"{"type":"REBOOT"}"#).is_err());
        assert!(ControlMessage::parse(r#"{"type":"CACHE_URL"}"#).is_err());
    }

    #[test]
    fn test_result_envelopes_serialize() {
        let preload = ControlResponse::PreloadAudioResult {
            url: "https://cdn/a.mp3".to_string(),
            success: true,
            from_cache: true,
            error: None,
        };
        assert_eq!(
            serde_json::to_value(&preload).unwrap(),
            json!({"type": "PRELOAD_AUDIO_RESULT", "url": "https://cdn/a.mp3", "success": true, "fromCache": true})
        );

        let cleared = ControlResponse::ClearAudioCacheResult {
            success: false,
            error: Some("disk full".to_string()),
        };
        assert_eq!(
            serde_json::to_value(&cleared).unwrap(),
            json!({"type": "CLEAR_AUDIO_CACHE_RESULT", "success": false, "error": "disk full"})
        );

        let malformed = ControlResponse::malformed("expected value");
        assert_eq!(
            serde_json::to_value(&malformed).unwrap()["type"],
            json!("ERROR")
        );
    }
}
