//! Core types and shared functionality for favr.
//!
//! This crate provides:
//! - The resolution cache (memory + SQLite disk tiers)
//! - Unified error types
//! - Configuration structures

pub mod cache;
pub mod config;
pub mod error;

pub use cache::{CacheDb, CacheStats, CachedResponse, ResponseCache};
pub use config::{AppConfig, ConfigError};
pub use error::Error;
