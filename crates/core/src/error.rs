//! Unified error types for favr.
//!
//! Every variant displays with a stable upper-snake code prefix so callers
//! (and MCP clients) can match on the category without parsing prose.

use rmcp::model::{ErrorCode, ErrorData as McpError};
use tokio_rusqlite::rusqlite;

/// Unified error types for favicon resolution.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Invalid input parameters (e.g., empty target list).
    #[error("INVALID_INPUT: {0}")]
    InvalidInput(String),

    /// Malformed or schemeless input that cannot be normalized.
    #[error("INVALID_URL: {0}")]
    InvalidUrl(String),

    /// Network/transport failure from the HTTP layer.
    #[error("TRANSPORT_ERROR: {0}")]
    TransportError(String),

    /// A single request exceeded its timeout.
    #[error("FETCH_TIMEOUT: {0}")]
    FetchTimeout(String),

    /// Response body exceeds the configured limit.
    #[error("FETCH_TOO_LARGE: {0}")]
    FetchTooLarge(String),

    /// Non-success HTTP status.
    #[error("HTTP_ERROR: status {status} for {url}")]
    HttpError { status: u16, url: String },

    /// Every strategy was tried and none yielded valid image bytes.
    #[error("NO_ICON_FOUND: {0}")]
    NoIconFound(String),

    /// Response received but it is empty or not an image.
    #[error("INVALID_IMAGE_DATA: {0}")]
    InvalidImageData(String),

    /// Page body could not be decoded as text.
    #[error("HTML_PARSE_FAILURE: {0}")]
    HtmlParseFailure(String),

    /// The job was cancelled before it could finish.
    #[error("CANCELLED")]
    Cancelled,

    /// The resolver is shutting down and accepts no new work.
    #[error("SHUTTING_DOWN")]
    ShuttingDown,

    /// Database operation failed.
    #[error("CACHE_ERROR: {0}")]
    Database(tokio_rusqlite::Error),

    /// Migration failed to apply.
    #[error("CACHE_ERROR: migration failed: {0}")]
    MigrationFailed(String),
}

impl Error {
    /// Whether the failure happened below HTTP (connect, DNS, TLS, unsupported URL).
    ///
    /// Only these qualify for the `www.` retry of the page fetch.
    pub fn is_transport(&self) -> bool {
        matches!(self, Error::TransportError(_) | Error::InvalidUrl(_))
    }
}

impl From<tokio_rusqlite::Error<Error>> for Error {
    fn from(err: tokio_rusqlite::Error<Error>) -> Self {
        match err {
            tokio_rusqlite::Error::Error(e) => e,
            tokio_rusqlite::Error::ConnectionClosed => Error::Database(tokio_rusqlite::Error::ConnectionClosed),
            tokio_rusqlite::Error::Close(c) => Error::Database(tokio_rusqlite::Error::Close(c)),
            _ => Error::Database(tokio_rusqlite::Error::ConnectionClosed),
        }
    }
}

impl From<tokio_rusqlite::Error<rusqlite::Error>> for Error {
    fn from(err: tokio_rusqlite::Error<rusqlite::Error>) -> Self {
        Error::Database(err)
    }
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Error::Database(tokio_rusqlite::Error::Error(err))
    }
}

impl From<Error> for McpError {
    fn from(err: Error) -> Self {
        let code = match &err {
            Error::InvalidInput(_) => -32602,
            Error::InvalidUrl(_) => -32003,
            Error::TransportError(_) => -32008,
            Error::FetchTimeout(_) => -32006,
            Error::FetchTooLarge(_) => -32007,
            Error::HttpError { .. } => -32008,
            Error::NoIconFound(_) => -32020,
            Error::InvalidImageData(_) => -32021,
            Error::HtmlParseFailure(_) => -32022,
            Error::Cancelled => -32023,
            Error::ShuttingDown => -32024,
            Error::Database(_) | Error::MigrationFailed(_) => -32002,
        };

        McpError { code: ErrorCode(code), message: err.to_string().into(), data: None }
    }
}
