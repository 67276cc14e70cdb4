//! Resolution cache for favicon fetches.
//!
//! Two tiers keyed by request (method, URL and the fixed header set):
//!
//! - Memory tier: `moka` cache weighted by body size
//! - Disk tier: SQLite via tokio-rusqlite, WAL mode, trimmed to a byte budget
//!   in least-recently-accessed order
//!
//! There is no TTL; icons change rarely and capacity eviction is enough.

pub mod connection;
pub mod hash;
pub mod layered;
pub mod migrations;
pub mod responses;

pub use crate::Error;

pub use connection::CacheDb;
pub use layered::{CacheStats, ResponseCache};
pub use responses::CachedResponse;
