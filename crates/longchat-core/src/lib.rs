#![forbid(unsafe_code)]

//! Core: the virtual windowing engine for long chat transcripts.
//!
//! A chat page that keeps appending message elements eventually drowns the
//! browser in layout work. This crate keeps every message it has ever seen in
//! an ordered [`cache::MessageCache`], keeps only a contiguous
//! [`window::Window`] of them attached to the page, and swaps the rest for
//! sized placeholders so the scroll height does not move.
//!
//! The engine is host-driven: the embedding environment implements
//! [`host::HostDom`], pushes scroll events and mutation batches, and advances
//! a monotonic clock. Nothing here blocks, spawns, or reads wall-clock time.
//!
//! - [`manager::VirtualChatManager`] owns the cache, window, and container.
//! - [`virtualiser::Virtualiser`] owns discovery, timers, and navigation resets.
//! - [`mem_dom::MemoryDom`] is a deterministic in-memory host for tests.

pub mod cache;
pub mod config;
pub mod discovery;
pub mod error;
pub mod host;
pub mod ingest;
pub mod lifecycle;
pub mod logging;
pub mod manager;
pub mod mem_dom;
pub mod scroll;
pub mod stats;
pub mod sync;
pub mod timers;
pub mod virtualiser;
pub mod window;

// Re-export tracing macros at crate root for ergonomic use.
#[cfg(feature = "tracing")]
pub use logging::{debug, error, info, trace, warn};

pub use config::{ConfigError, Selectors, VirtualizerConfig};
pub use error::VirtualizerError;
pub use host::{HostDom, ScrollMetrics};
pub use manager::VirtualChatManager;
pub use virtualiser::Virtualiser;
