//! # Cache Module
//!
//! Durable, size-bounded caching for large audio files.
//!
//! This module holds the pieces with real invariants to protect:
//!
//! - **Quota**: the audio namespace never holds more than its byte budget
//! - **LRU Eviction**: least recently accessed entries go first
//! - **Byte-exact ranges**: partial responses are sliced from the cached file
//! - **Coalescing**: concurrent requests for one file share one fetch
//!
//! ## Components
//!
//! ### [`index`] - Audio Cache Index
//! - In-memory `{key, size, cachedAt, lastAccessed}` per audio entry
//! - Not persisted; rebuilt lazily from the store after a restart
//!
//! ### [`audio`] - Quota Enforcer
//! - Validates payload completeness and size before accepting it
//! - Evicts oldest-accessed entries until the new payload fits
//! - Keeps store and index in lock-step
//!
//! ### [`inflight`] - In-Flight Coalescer
//! - One pending operation per normalized key
//! - Entry removed when the operation settles, success or failure
//!
//! ### [`range`] - Range Synthesizer
//! - `bytes=<start>-<end>?` against a fully cached payload
//! - 206 with exact slice, or 416 with `Content-Range: bytes */<total>`
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use offline_audio_cache::cache::{audio::AudioCache, normalize_key};
//! use offline_audio_cache::clock::SystemClock;
//! use offline_audio_cache::store::MemoryStore;
//! use std::sync::Arc;
//! use url::Url;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let cache = AudioCache::new(
//!     Arc::new(MemoryStore::new()),
//!     Arc::new(SystemClock),
//!     "audio-cache",
//!     100 * 1024 * 1024,
//!     1024,
//! );
//!
//! let url = Url::parse("https://cdn.example.com/audio/john/3.mp3?t=42")?;
//! if let Some(entry) = cache.lookup(&normalize_key(&url)).await {
//!     println!("cached: {} bytes", entry.len());
//! }
//! # Ok(())
//! # }
//! ```

pub mod audio;
pub mod index;
pub mod inflight;
pub mod range;

use url::Url;

pub use audio::{AudioCache, AudioCacheStatus, InsertOutcome};
pub use index::{AudioIndex, IndexRecord};
pub use inflight::InFlight;

/// Clave de caché para audio: la URL sin query ni fragmento, de modo que las
/// variantes de búsqueda/seek del mismo archivo colapsan en una sola entrada.
pub fn normalize_key(url: &Url) -> String {
    let mut key = url.clone();
    key.set_query(None);
    key.set_fragment(None);
    key.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_variants_collapse_to_one_key() {
        let a = Url::parse("https://cdn.example.com/audio/1.mp3?t=10").unwrap();
        let b = Url::parse("https://cdn.example.com/audio/1.mp3?start=30&x=1#frag").unwrap();
        let c = Url::parse("https://cdn.example.com/audio/1.mp3").unwrap();

        assert_eq!(normalize_key(&a), "https://cdn.example.com/audio/1.mp3");
        assert_eq!(normalize_key(&a), normalize_key(&b));
        assert_eq!(normalize_key(&b), normalize_key(&c));
    }
}
