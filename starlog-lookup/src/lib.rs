//! # Starlog Lookup
//!
//! Remote reference lookups for the Starlog companion: system records,
//! body lists, valuations, and name search against an EDSM-compatible REST
//! API, fronted by a per-category TTL cache.
//!
//! The local exploration record is always authoritative for what the
//! commander has personally seen; this crate only supplies reference data
//! about places not yet visited. Everything degrades gracefully: a remote
//! failure yields the empty answer plus a recorded last error, never a
//! crash or a blocked caller.

#![deny(clippy::unwrap_used)]
#![deny(missing_docs)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod cache;
pub mod client;
pub mod error;
pub mod types;

pub use cache::{CacheStats, Category, LastError, LookupCache, LookupConfig};
pub use client::{EdsmClient, RemoteLookup};
pub use error::{LookupError, Result};
pub use types::{BodyRecord, Coords, SearchHit, SystemRecord, Valuation};
