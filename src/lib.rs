//! Feed discovery and caching engine.
//!
//! Resolves user-supplied site URLs to RSS/Atom feed URLs, then fetches,
//! sanitizes, normalizes and caches feed content. Persistence and
//! scheduling stay outside, behind the traits in [`registry`].

pub mod config;
pub mod engine;
pub mod feed;
pub mod registry;
pub mod util;

pub use config::Config;
pub use engine::FeedEngine;
