//! Redis cache for read-heavy public listings.
//!
//! Values are stored as JSON with a TTL. A failed read is treated as a miss so
//! a Redis outage degrades to hitting the database.

use anyhow::{Context, Result};
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use serde::{de::DeserializeOwned, Serialize};
use std::time::Duration;
use tracing::{debug, error, instrument, warn};

/// Redis cache client with connection pooling.
#[derive(Clone)]
pub struct RedisCache {
    conn: ConnectionManager,
    default_ttl: Duration,
}

impl RedisCache {
    pub async fn connect(redis_url: &str, default_ttl_seconds: u64) -> Result<Self> {
        let client = redis::Client::open(redis_url)
            .context("Failed to create Redis client")?;

        let conn = ConnectionManager::new(client)
            .await
            .context("Failed to connect to Redis")?;

        tracing::info!("Redis cache connected");

        Ok(Self {
            conn,
            default_ttl: Duration::from_secs(default_ttl_seconds),
        })
    }

    /// Fetch and decode a cached value; errors and undecodable entries are misses.
    #[instrument(skip(self), fields(cache_hit = false))]
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let mut conn = self.conn.clone();

        let raw = match conn.get::<_, Option<String>>(key).await {
            Ok(raw) => raw?,
            Err(e) => {
                error!(key = key, error = %e, "Redis get error");
                return None;
            }
        };

        match serde_json::from_str(&raw) {
            Ok(value) => {
                tracing::Span::current().record("cache_hit", true);
                debug!(key = key, "Cache hit");
                Some(value)
            }
            Err(e) => {
                warn!(key = key, error = %e, "Discarding undecodable cache entry");
                None
            }
        }
    }

    /// Store a value under the default TTL.
    #[instrument(skip(self, value))]
    pub async fn set<T: Serialize>(&self, key: &str, value: &T) -> Result<()> {
        let mut conn = self.conn.clone();
        let ttl = self.default_ttl;

        let data = serde_json::to_string(value)
            .context("Failed to serialize value for cache")?;

        conn.set_ex::<_, _, ()>(key, data, ttl.as_secs())
            .await
            .context("Failed to set cache value")?;

        debug!(key = key, ttl_secs = ttl.as_secs(), "Cached value");
        Ok(())
    }

    /// Delete every key matching `pattern`, walking the full SCAN cursor.
    #[instrument(skip(self))]
    pub async fn delete_pattern(&self, pattern: &str) -> Result<usize> {
        let mut conn = self.conn.clone();
        let mut cursor: u64 = 0;
        let mut deleted = 0usize;

        loop {
            let (next, keys): (u64, Vec<String>) = redis::cmd("SCAN")
                .cursor_arg(cursor)
                .arg("MATCH")
                .arg(pattern)
                .arg("COUNT")
                .arg(500)
                .query_async(&mut conn)
                .await
                .context("Failed to scan cache keys")?;

            if !keys.is_empty() {
                let n: usize = conn.del(&keys).await.context("Failed to delete cache keys")?;
                deleted += n;
            }

            if next == 0 {
                break;
            }
            cursor = next;
        }

        debug!(pattern = pattern, deleted = deleted, "Cache pattern delete");
        Ok(deleted)
    }

    /// Best-effort invalidation; failures are logged, never surfaced.
    pub async fn invalidate(&self, pattern: &str) {
        if let Err(e) = self.delete_pattern(pattern).await {
            warn!(pattern = pattern, error = %e, "Cache invalidation failed");
        }
    }

    /// Check if Redis is healthy.
    pub async fn health_check(&self) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .context("Redis health check failed")?;
        Ok(())
    }
}

/// Cache key builders for the public directories.
pub mod keys {
    use crate::domain::Role;

    fn directory_prefix(role: Role) -> &'static str {
        match role {
            Role::Seller => "sellers",
            Role::Designer => "designers",
            Role::Customer => "customers",
        }
    }

    /// One cached page of a public directory
    pub fn directory_page(role: Role, page: u32, per_page: u32) -> String {
        format!("{}:page:{}:{}", directory_prefix(role), page, per_page)
    }

    /// Every cached page of a directory
    pub fn directory_pattern(role: Role) -> String {
        format!("{}:page:*", directory_prefix(role))
    }
}

#[cfg(test)]
mod tests {
    use super::keys;
    use crate::domain::Role;

    #[test]
    fn directory_keys_match_their_pattern() {
        assert_eq!(keys::directory_page(Role::Seller, 2, 20), "sellers:page:2:20");
        assert_eq!(keys::directory_pattern(Role::Seller), "sellers:page:*");
        assert!(keys::directory_page(Role::Designer, 1, 10).starts_with("designers:page:"));
    }
}
