//! Network access for the caching strategies.
//!
//! The strategies only see the [`Fetcher`] trait; [`HttpFetcher`] is the
//! reqwest-backed implementation used in production.

mod client;
mod fetcher;

pub use client::{is_hop_by_hop, HttpFetcher};
pub use fetcher::Fetcher;
