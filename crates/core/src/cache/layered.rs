//! Combined memory + disk resolution cache.
//!
//! Lookups go memory first, then disk; a disk hit is promoted back into
//! memory. Stores write through to both tiers and trim the disk tier to its
//! byte budget. Cache failures never fail a fetch: they are logged and
//! treated as a miss.

use super::connection::CacheDb;
use super::responses::{CachedResponse, url_in_domain};
use crate::Error;
use moka::future::Cache;
use serde::{Deserialize, Serialize};

/// Entry and byte counts for both tiers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema)]
pub struct CacheStats {
    pub memory_entries: u64,
    pub memory_bytes: u64,
    pub disk_entries: u64,
    pub disk_bytes: u64,
}

/// Resolution cache shared by every fetch of a resolver session.
#[derive(Clone, Debug)]
pub struct ResponseCache {
    memory: Cache<String, CachedResponse>,
    disk: Option<CacheDb>,
    disk_capacity: u64,
}

impl ResponseCache {
    /// Create a cache with both tiers.
    pub fn new(disk: CacheDb, memory_capacity: u64, disk_capacity: u64) -> Self {
        Self { memory: build_memory_tier(memory_capacity), disk: Some(disk), disk_capacity }
    }

    /// Create a memory-only cache.
    pub fn memory_only(memory_capacity: u64) -> Self {
        Self { memory: build_memory_tier(memory_capacity), disk: None, disk_capacity: 0 }
    }

    /// Look up a response by key. Empty bodies never count as hits.
    pub async fn get(&self, key: &str) -> Option<CachedResponse> {
        if let Some(hit) = self.memory.get(key).await
            && !hit.body.is_empty()
        {
            tracing::debug!(url = %hit.url, "memory cache hit");
            return Some(hit);
        }

        let disk = self.disk.as_ref()?;
        match disk.get_response(key).await {
            Ok(Some(hit)) if !hit.body.is_empty() => {
                tracing::debug!(url = %hit.url, "disk cache hit");
                self.memory.insert(key.to_string(), hit.clone()).await;
                Some(hit)
            }
            Ok(_) => None,
            Err(e) => {
                tracing::debug!(error = %e, "disk cache read failed; treating as miss");
                None
            }
        }
    }

    /// Store a response in both tiers.
    pub async fn put(&self, response: CachedResponse) {
        if response.body.is_empty() {
            return;
        }

        if let Some(disk) = &self.disk {
            if let Err(e) = disk.put_response(&response).await {
                tracing::debug!(url = %response.url, error = %e, "disk cache write failed");
            } else if let Err(e) = disk.evict_to_size(self.disk_capacity).await {
                tracing::debug!(error = %e, "disk cache eviction failed");
            }
        }

        self.memory.insert(response.key.clone(), response).await;
    }

    /// Drop every memory entry; the disk tier is untouched.
    pub fn invalidate_memory(&self) {
        self.memory.invalidate_all();
    }

    /// Delete every entry in both tiers.
    pub async fn purge_all(&self) -> Result<u64, Error> {
        let memory_entries = self.memory.entry_count();
        self.memory.invalidate_all();
        match &self.disk {
            Some(disk) => disk.purge_all_responses().await,
            None => Ok(memory_entries),
        }
    }

    /// Delete entries whose host is `domain` or a subdomain of it.
    ///
    /// Returns the disk tier's deletion count, or the memory tier's when
    /// there is no disk tier.
    pub async fn purge_by_domain(&self, domain: &str) -> Result<u64, Error> {
        let keys: Vec<_> = self
            .memory
            .iter()
            .filter(|(_, response)| url_in_domain(&response.url, domain))
            .map(|(key, _)| key)
            .collect();
        for key in &keys {
            self.memory.invalidate(key.as_str()).await;
        }

        match &self.disk {
            Some(disk) => disk.purge_responses_by_domain(domain).await,
            None => Ok(keys.len() as u64),
        }
    }

    /// Keep only the `max_entries` most recently accessed disk entries.
    pub async fn purge_lru(&self, max_entries: usize) -> Result<u64, Error> {
        match &self.disk {
            Some(disk) => disk.purge_lru_responses(max_entries).await,
            None => Ok(0),
        }
    }

    pub async fn stats(&self) -> Result<CacheStats, Error> {
        self.memory.run_pending_tasks().await;
        let (disk_entries, disk_bytes) = match &self.disk {
            Some(disk) => disk.response_totals().await?,
            None => (0, 0),
        };

        Ok(CacheStats {
            memory_entries: self.memory.entry_count(),
            memory_bytes: self.memory.weighted_size(),
            disk_entries,
            disk_bytes,
        })
    }
}

fn build_memory_tier(capacity: u64) -> Cache<String, CachedResponse> {
    Cache::builder()
        .max_capacity(capacity)
        .weigher(|_key: &String, value: &CachedResponse| u32::try_from(value.body.len()).unwrap_or(u32::MAX))
        .build()
}
