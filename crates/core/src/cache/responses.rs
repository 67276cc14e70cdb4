//! Stored HTTP responses on the disk tier.
//!
//! Rows are keyed by [`compute_cache_key`](super::hash::compute_cache_key)
//! and carry a `last_accessed_at` stamp so the tier can be trimmed to a byte
//! budget in least-recently-used order.

use super::connection::CacheDb;
use crate::Error;
use bytes::Bytes;
use chrono::{SecondsFormat, Utc};
use tokio_rusqlite::params;
use tokio_rusqlite::rusqlite;

/// A response body kept by the resolution cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedResponse {
    pub key: String,
    pub method: String,
    pub url: String,
    pub content_type: Option<String>,
    pub status_code: u16,
    pub body: Bytes,
    pub stored_at: String,
}

impl CachedResponse {
    /// Build an entry stamped with the current time.
    pub fn new(key: String, url: impl Into<String>, content_type: Option<String>, status_code: u16, body: Bytes) -> Self {
        Self { key, method: "GET".into(), url: url.into(), content_type, status_code, body, stored_at: now_stamp() }
    }

    pub fn is_image(&self) -> bool {
        self.content_type
            .as_deref()
            .is_some_and(|ct| ct.trim().to_ascii_lowercase().starts_with("image/"))
    }
}

/// Whether `url`'s host is `domain` or one of its subdomains.
///
/// `a.com` matches `a.com` and `www.a.com` but not `ba.com`.
pub fn url_in_domain(url: &str, domain: &str) -> bool {
    let domain = domain.trim().trim_matches('.').to_ascii_lowercase();
    if domain.is_empty() {
        return false;
    }

    url::Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_ascii_lowercase))
        .is_some_and(|host| host == domain || host.strip_suffix(domain.as_str()).is_some_and(|p| p.ends_with('.')))
}

/// Fixed-width UTC timestamp; lexical order matches chronological order.
pub(crate) fn now_stamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Nanos, true)
}

impl CacheDb {
    /// Insert or replace a stored response.
    pub async fn put_response(&self, response: &CachedResponse) -> Result<(), Error> {
        let response = response.clone();
        self.conn
            .call(move |conn| -> Result<(), Error> {
                conn.execute(
                    "INSERT INTO responses (
                        key, method, url, content_type, status_code,
                        body, body_len, stored_at, last_accessed_at
                    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)
                    ON CONFLICT(key) DO UPDATE SET
                        method = excluded.method,
                        url = excluded.url,
                        content_type = excluded.content_type,
                        status_code = excluded.status_code,
                        body = excluded.body,
                        body_len = excluded.body_len,
                        stored_at = excluded.stored_at,
                        last_accessed_at = excluded.last_accessed_at",
                    params![
                        &response.key,
                        &response.method,
                        &response.url,
                        &response.content_type,
                        response.status_code as i64,
                        response.body.as_ref(),
                        response.body.len() as i64,
                        &response.stored_at,
                    ],
                )?;
                Ok(())
            })
            .await
            .map_err(Error::from)
    }

    /// Get a stored response by key, refreshing its access stamp.
    ///
    /// Returns None if the key doesn't exist.
    pub async fn get_response(&self, key: &str) -> Result<Option<CachedResponse>, Error> {
        let key = key.to_string();
        let accessed = now_stamp();
        self.conn
            .call(move |conn| -> Result<Option<CachedResponse>, Error> {
                let result = conn.query_row(
                    "SELECT key, method, url, content_type, status_code, body, stored_at
                     FROM responses WHERE key = ?1",
                    params![key],
                    |row| {
                        Ok(CachedResponse {
                            key: row.get(0)?,
                            method: row.get(1)?,
                            url: row.get(2)?,
                            content_type: row.get(3)?,
                            status_code: row.get::<_, i64>(4)? as u16,
                            body: Bytes::from(row.get::<_, Vec<u8>>(5)?),
                            stored_at: row.get(6)?,
                        })
                    },
                );

                match result {
                    Ok(response) => {
                        conn.execute(
                            "UPDATE responses SET last_accessed_at = ?2 WHERE key = ?1",
                            params![&response.key, accessed],
                        )?;
                        Ok(Some(response))
                    }
                    Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                    Err(e) => Err(e.into()),
                }
            })
            .await
            .map_err(Error::from)
    }

    /// Evict least recently accessed rows until the stored bodies fit in `max_bytes`.
    ///
    /// Returns the number of deleted entries.
    pub async fn evict_to_size(&self, max_bytes: u64) -> Result<u64, Error> {
        let max = max_bytes as i64;
        self.conn
            .call(move |conn| -> Result<u64, Error> {
                let total: i64 =
                    conn.query_row("SELECT COALESCE(SUM(body_len), 0) FROM responses", [], |row| row.get(0))?;
                if total <= max {
                    return Ok(0);
                }

                let mut victims = Vec::new();
                let mut remaining = total;
                {
                    let mut stmt = conn.prepare("SELECT key, body_len FROM responses ORDER BY last_accessed_at ASC")?;
                    let rows = stmt.query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))?;
                    for row in rows {
                        if remaining <= max {
                            break;
                        }
                        let (key, len) = row?;
                        remaining -= len;
                        victims.push(key);
                    }
                }

                let mut deleted = 0u64;
                for key in victims {
                    deleted += conn.execute("DELETE FROM responses WHERE key = ?1", params![key])? as u64;
                }
                Ok(deleted)
            })
            .await
            .map_err(Error::from)
    }

    /// Delete stored responses whose host is `domain` or a subdomain of it.
    ///
    /// Returns the number of deleted entries.
    pub async fn purge_responses_by_domain(&self, domain: &str) -> Result<u64, Error> {
        let domain = domain.to_string();
        let pattern = format!("%{}%", domain.trim().trim_matches('.'));
        self.conn
            .call(move |conn| -> Result<u64, Error> {
                let mut victims = Vec::new();
                {
                    let mut stmt = conn.prepare("SELECT key, url FROM responses WHERE url LIKE ?1")?;
                    let rows =
                        stmt.query_map(params![pattern], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?;
                    for row in rows {
                        let (key, url) = row?;
                        if url_in_domain(&url, &domain) {
                            victims.push(key);
                        }
                    }
                }

                let mut deleted = 0u64;
                for key in victims {
                    deleted += conn.execute("DELETE FROM responses WHERE key = ?1", params![key])? as u64;
                }
                Ok(deleted)
            })
            .await
            .map_err(Error::from)
    }

    /// Purge least recently accessed entries until count <= max_entries.
    ///
    /// Returns the number of deleted entries.
    pub async fn purge_lru_responses(&self, max_entries: usize) -> Result<u64, Error> {
        let max = max_entries as i64;
        self.conn
            .call(move |conn| -> Result<u64, Error> {
                let count: i64 = conn.query_row("SELECT COUNT(*) FROM responses", [], |row| row.get(0))?;
                if count <= max {
                    return Ok(0);
                }

                let deleted = conn.execute(
                    "DELETE FROM responses WHERE key IN (
                        SELECT key FROM responses ORDER BY last_accessed_at ASC LIMIT ?1
                    )",
                    params![count - max],
                )?;
                Ok(deleted as u64)
            })
            .await
            .map_err(Error::from)
    }

    /// Delete every stored response.
    pub async fn purge_all_responses(&self) -> Result<u64, Error> {
        self.conn
            .call(|conn| -> Result<u64, Error> { Ok(conn.execute("DELETE FROM responses", [])? as u64) })
            .await
            .map_err(Error::from)
    }

    /// Entry count and total body bytes on disk.
    pub async fn response_totals(&self) -> Result<(u64, u64), Error> {
        self.conn
            .call(|conn| -> Result<(u64, u64), Error> {
                let totals = conn.query_row(
                    "SELECT COUNT(*), COALESCE(SUM(body_len), 0) FROM responses",
                    [],
                    |row| Ok((row.get::<_, i64>(0)? as u64, row.get::<_, i64>(1)? as u64)),
                )?;
                Ok(totals)
            })
            .await
            .map_err(Error::from)
    }
}
