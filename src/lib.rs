//! # Offline Audio Cache
//!
//! Request intermediary that keeps a web app usable offline. Every intercepted
//! request is classified and routed through a caching strategy; audio files
//! go to a quota-bounded, LRU-evicted namespace that serves byte-exact ranges
//! and coalesces concurrent downloads of the same file.
//!
//! The entry point is [`engine::CacheEngine`]: build it once with a store, a
//! network and a clock, then feed it requests ([`engine::CacheEngine::handle`])
//! and control messages ([`engine::CacheEngine::handle_message`]).

pub mod cache;
pub mod clock;
pub mod config;
pub mod control;
pub mod cooldown;
pub mod engine;
pub mod error;
pub mod http;
pub mod lifecycle;
pub mod network;
pub mod store;
pub mod strategy;
pub mod tasks;

pub use config::Config;
pub use engine::{CacheEngine, Handled};
