//! Client code for favr.
//!
//! This crate provides the favicon resolution pipeline: HTTP transport,
//! cached fetcher, icon link extraction, the strategy chain, and the bounded
//! task manager behind [`FaviconResolver`].

pub mod extract;
pub mod fetch;
pub mod resolve;
pub mod resolver;
pub mod tasks;

#[cfg(test)]
pub(crate) mod testing;

pub use extract::extract_icon_link;
pub use fetch::{FetchConfig, FetchResponse, HttpTransport, IconFetcher, ReqwestTransport};
pub use resolve::{ResolvedIcon, Strategy, StrategyChain};
pub use resolver::{BatchSummary, FaviconResolver, FetchTarget, IconResolved};
pub use tasks::{CancelToken, JobHandle, ShutdownReport, TaskManager};
