//! newsdesk
//!
//! News fetching, caching and payout analytics:
//! - GNews client with per-minute smoothing
//! - response cache with a daily request quota
//! - offline and degraded fallbacks backed by a local store
//! - payout aggregation and dashboard analytics
//! - a small local HTTP API

pub mod analytics;
pub mod auth;
pub mod cache;
pub mod client;
pub mod clock;
pub mod config;
pub mod enrich;
pub mod error;
pub mod export;
pub mod gateway;
pub mod metrics;
pub mod payout;
pub mod schemas;
pub mod server;
pub mod store;

pub use error::{NewsdeskError, Result};
