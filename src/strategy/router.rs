use reqwest::Method;
use serde::Serialize;

use crate::http::Request;

const AUDIO_EXTENSIONS: &[&str] = &["mp3", "m4a", "aac", "ogg", "oga", "opus", "wav", "flac", "weba"];
const VIDEO_EXTENSIONS: &[&str] = &["mp4", "webm", "mov", "m4v", "mkv", "avi"];
const STATIC_EXTENSIONS: &[&str] = &[
    "js", "mjs", "css", "png", "jpg", "jpeg", "gif", "svg", "webp", "ico", "woff", "woff2", "ttf", "otf", "eot",
    "json", "webmanifest",
];

/// Particiones lógicas del store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum CacheNamespace {
    Static,
    Dynamic,
    VerseData,
    Audio,
}

/// Decisión del router, tomada antes de cualquier I/O.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// Se deja pasar a la red normal, sin interceptar.
    Ignore,
    Audio,
    CacheFirst(CacheNamespace),
    NetworkFirst { namespace: CacheNamespace, html: bool },
    /// Datos del usuario: nunca se persisten.
    NetworkOnly,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouterConfig {
    pub api_prefix: String,
    pub verse_markers: Vec<String>,
    pub taxonomy_markers: Vec<String>,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            api_prefix: "/api/".to_string(),
            verse_markers: vec!["verses".to_string(), "verse".to_string()],
            taxonomy_markers: vec!["taxonomy".to_string(), "topics".to_string()],
        }
    }
}

fn extension(path: &str) -> Option<&str> {
    let file = path.rsplit('/').next()?;
    let (_, ext) = file.rsplit_once('.')?;
    (!ext.is_empty()).then_some(ext)
}

fn names_any(segments: &[&str], markers: &[String]) -> bool {
    segments
        .iter()
        .any(|segment| markers.iter().any(|marker| segment.eq_ignore_ascii_case(marker)))
}

/// Clasifica una petición. Función pura: no comparte estado entre llamadas.
pub fn classify(request: &Request, config: &RouterConfig) -> Route {
    if request.method != Method::GET || !request.is_http() {
        return Route::Ignore;
    }

    let path = request.url.path().to_ascii_lowercase();
    let ext = extension(&path);

    if ext.map_or(false, |e| AUDIO_EXTENSIONS.contains(&e)) {
        return Route::Audio;
    }
    if ext.map_or(false, |e| VIDEO_EXTENSIONS.contains(&e)) {
        return Route::Ignore;
    }

    if let Some(rest) = path.strip_prefix(&config.api_prefix.to_ascii_lowercase()) {
        let segments: Vec<&str> = rest.split('/').filter(|s| !s.is_empty()).collect();
        if names_any(&segments, &config.verse_markers) {
            return Route::NetworkFirst {
                namespace: CacheNamespace::VerseData,
                html: false,
            };
        }
        if names_any(&segments, &config.taxonomy_markers) {
            return Route::NetworkFirst {
                namespace: CacheNamespace::Static,
                html: false,
            };
        }
        return Route::NetworkOnly;
    }

    if ext.map_or(false, |e| STATIC_EXTENSIONS.contains(&e)) {
        return Route::CacheFirst(CacheNamespace::Static);
    }

    Route::NetworkFirst {
        namespace: CacheNamespace::Dynamic,
        html: request.accepts_html(),
    }
}
