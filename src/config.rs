use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::strategy::router::RouterConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Disk,
    Memory,
}

impl std::str::FromStr for StoreBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "disk" => Ok(StoreBackend::Disk),
            "memory" => Ok(StoreBackend::Memory),
            other => anyhow::bail!("Unknown store backend '{}', expected 'disk' or 'memory'", other),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    // Versionado
    pub build_id: String,

    // Almacenamiento
    pub store_backend: StoreBackend,
    pub cache_dir: PathBuf,

    // Audio
    pub audio_quota_bytes: u64,
    pub min_audio_bytes: u64,

    // Enrutado
    pub api_prefix: String,
    pub verse_path_markers: Vec<String>,
    pub taxonomy_path_markers: Vec<String>,

    // Instalación
    pub precache_urls: Vec<String>,

    // Red
    pub refetch_cooldown: Duration,
    pub connect_timeout: Duration,
    pub user_agent: String,
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

impl Config {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self::from_lookup(|name| std::env::var(name).ok())?;

        if config.store_backend == StoreBackend::Disk {
            std::fs::create_dir_all(&config.cache_dir)
                .with_context(|| format!("creating cache dir {}", config.cache_dir.display()))?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Construye la configuración a partir de una fuente de variables.
    pub fn from_lookup<F>(var: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let non_empty = |name: &str| var(name).filter(|v| !v.trim().is_empty());

        let duration = |name: &str, default: Duration| -> Result<Duration> {
            match non_empty(name) {
                Some(raw) => humantime::parse_duration(raw.trim())
                    .with_context(|| format!("{} must be a duration like '30s', got '{}'", name, raw)),
                None => Ok(default),
            }
        };
        let number = |name: &str, default: u64| -> Result<u64> {
            match non_empty(name) {
                Some(raw) => raw
                    .trim()
                    .parse()
                    .with_context(|| format!("{} must be a number of bytes, got '{}'", name, raw)),
                None => Ok(default),
            }
        };

        Ok(Self {
            build_id: non_empty("BUILD_ID").unwrap_or(defaults.build_id),
            store_backend: match non_empty("STORE_BACKEND") {
                Some(raw) => raw.parse()?,
                None => defaults.store_backend,
            },
            cache_dir: non_empty("CACHE_DIR").map(PathBuf::from).unwrap_or(defaults.cache_dir),

            audio_quota_bytes: number("AUDIO_QUOTA_BYTES", defaults.audio_quota_bytes)?,
            min_audio_bytes: number("MIN_AUDIO_BYTES", defaults.min_audio_bytes)?,

            api_prefix: non_empty("API_PREFIX").unwrap_or(defaults.api_prefix),
            verse_path_markers: non_empty("VERSE_PATH_MARKERS")
                .map(|raw| split_list(&raw))
                .unwrap_or(defaults.verse_path_markers),
            taxonomy_path_markers: non_empty("TAXONOMY_PATH_MARKERS")
                .map(|raw| split_list(&raw))
                .unwrap_or(defaults.taxonomy_path_markers),

            precache_urls: non_empty("PRECACHE_URLS")
                .map(|raw| split_list(&raw))
                .unwrap_or(defaults.precache_urls),

            refetch_cooldown: duration("REFETCH_COOLDOWN", defaults.refetch_cooldown)?,
            connect_timeout: duration("CONNECT_TIMEOUT", defaults.connect_timeout)?,
            user_agent: non_empty("USER_AGENT").unwrap_or(defaults.user_agent),
        })
    }

    /// Validates configuration values for correctness.
    ///
    /// # Validation Rules
    ///
    /// - Audio quota must be greater than 0
    /// - Minimum audio size must be below the quota
    /// - API prefix must start and end with `/`
    /// - Refetch cooldown must be greater than 0
    /// - Precache URLs must be absolute
    pub fn validate(&self) -> Result<()> {
        if self.audio_quota_bytes == 0 {
            anyhow::bail!("Audio quota must be greater than 0");
        }

        if self.min_audio_bytes >= self.audio_quota_bytes {
            anyhow::bail!(
                "Minimum audio size ({}) must be below the quota ({})",
                self.min_audio_bytes,
                self.audio_quota_bytes
            );
        }

        if !self.api_prefix.starts_with('/') || !self.api_prefix.ends_with('/') {
            anyhow::bail!("API prefix must start and end with '/', got: {}", self.api_prefix);
        }

        if self.refetch_cooldown.is_zero() {
            anyhow::bail!("Refetch cooldown must be greater than 0");
        }

        if self.build_id.trim().is_empty() {
            anyhow::bail!("Build id cannot be empty");
        }

        for url in &self.precache_urls {
            url::Url::parse(url).with_context(|| format!("Invalid precache URL: {}", url))?;
        }

        Ok(())
    }

    pub fn router(&self) -> RouterConfig {
        RouterConfig {
            api_prefix: self.api_prefix.clone(),
            verse_markers: self.verse_path_markers.clone(),
            taxonomy_markers: self.taxonomy_path_markers.clone(),
        }
    }

    /// Returns a summary of the current configuration for logging.
    pub fn summary(&self) -> String {
        format!(
            "Config Summary:\n  \
            Build: {}\n  \
            Store: {:?} at {}\n  \
            Audio: quota {:.1} MiB, min {} bytes\n  \
            Routing: api prefix {}, {} precache URLs\n  \
            Network: connect timeout {}, refetch cooldown {}",
            self.build_id,
            self.store_backend,
            self.cache_dir.display(),
            self.audio_quota_bytes as f64 / (1024.0 * 1024.0),
            self.min_audio_bytes,
            self.api_prefix,
            self.precache_urls.len(),
            humantime::format_duration(self.connect_timeout),
            humantime::format_duration(self.refetch_cooldown),
        )
    }
}

/// Default configuration values.
///
/// Used as fallbacks when environment variables are not provided.
impl Default for Config {
    fn default() -> Self {
        Self {
            build_id: env!("CARGO_PKG_VERSION").to_string(),

            store_backend: StoreBackend::Disk,
            cache_dir: "./cache".into(),

            audio_quota_bytes: 100 * 1024 * 1024, // 100 MiB
            min_audio_bytes: 1024,

            api_prefix: "/api/".to_string(),
            verse_path_markers: vec!["verses".to_string(), "verse".to_string()],
            taxonomy_path_markers: vec!["taxonomy".to_string(), "topics".to_string()],

            precache_urls: Vec::new(),

            refetch_cooldown: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
            user_agent: format!("offline-audio-cache/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn test_defaults_when_nothing_is_set() {
        let config = Config::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.audio_quota_bytes, 104_857_600);
        assert_eq!(config.api_prefix, "/api/");
        assert_eq!(config.store_backend, StoreBackend::Disk);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_overrides_are_parsed() {
        let config = Config::from_lookup(lookup(&[
            ("BUILD_ID", "2024-06-01"),
            ("STORE_BACKEND", "Memory"),
            ("AUDIO_QUOTA_BYTES", "300"),
            ("MIN_AUDIO_BYTES", "1"),
            ("REFETCH_COOLDOWN", "2m"),
            ("PRECACHE_URLS", "https://app.example.com/, https://app.example.com/index.html"),
            ("VERSE_PATH_MARKERS", " passages ,"),
        ]))
        .unwrap();

        assert_eq!(config.build_id, "2024-06-01");
        assert_eq!(config.store_backend, StoreBackend::Memory);
        assert_eq!(config.audio_quota_bytes, 300);
        assert_eq!(config.refetch_cooldown, Duration::from_secs(120));
        assert_eq!(config.precache_urls.len(), 2);
        assert_eq!(config.verse_path_markers, vec!["passages".to_string()]);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_values_are_reported() {
        assert!(Config::from_lookup(lookup(&[("AUDIO_QUOTA_BYTES", "lots")])).is_err());
        assert!(Config::from_lookup(lookup(&[("REFETCH_COOLDOWN", "soon")])).is_err());
        assert!(Config::from_lookup(lookup(&[("STORE_BACKEND", "s3")])).is_err());

        let config = Config::from_lookup(lookup(&[("API_PREFIX", "api")])).unwrap();
        assert!(config.validate().is_err());

        let config = Config::from_lookup(lookup(&[("MIN_AUDIO_BYTES", "200"), ("AUDIO_QUOTA_BYTES", "100")])).unwrap();
        assert!(config.validate().is_err());
    }
}
