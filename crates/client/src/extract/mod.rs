//! Icon link extraction from page markup.
//!
//! ### Pattern pass
//! - Scans `<link>` tags with regexes; attribute order and quoting are free.
//! - Ranks `rel` values: explicit `icon` / `shortcut icon`, then
//!   `apple-touch-icon`, then any other `icon` token, then `mask-icon`.
//!
//! ### Href resolution
//! - `data:` URIs yield nothing.
//! - Absolute `http(s)` hrefs are returned unchanged, `//host/path` gets `https:`.
//! - Everything else joins against the page URL.

pub mod icon;

pub use icon::extract_icon_link;
