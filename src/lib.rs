//! Feed Digest - An RSS/Atom Feed Aggregator
//!
//! Fetches a fixed set of feeds through a chain of fallback proxies,
//! normalizes their entries, caches the merged result and serves it
//! filtered and sorted over a small JSON API.

pub mod aggregator;
pub mod cache;
pub mod config;
pub mod debounce;
pub mod fetcher;
pub mod filter;
pub mod model;
pub mod parser;
pub mod routes;
pub mod time;
