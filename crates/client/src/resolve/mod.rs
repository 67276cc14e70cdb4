//! Icon resolution strategies.
//!
//! ### Order
//! 1. Icon link declared in the site's HTML
//! 2. Well-known paths on every scheme and host variant
//! 3. Public favicon lookup service
//!
//! The first candidate that fetches as a non-empty `image/*` response wins.

pub mod candidates;
pub mod chain;

pub use candidates::{WELL_KNOWN_PATHS, fallback_service_urls, standard_locations};
pub use chain::{ResolvedIcon, Strategy, StrategyChain};
