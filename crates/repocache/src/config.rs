use std::{env, time::Duration};

use repocache_core::cache::CachePolicy;

use crate::storage::CacheOptions;

/// Cache configuration loaded from environment variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Cache TTL in seconds, 0 disables expiration (default: 300)
    pub cache_ttl_seconds: u64,
    /// Maximum number of in-memory cache entries (default: 10,000)
    pub cache_max_entries: usize,
    /// Treat cache backend failures as misses (default: false)
    pub cache_fail_open: bool,
    /// Prefix applied to every Redis key (default: "repocache")
    pub cache_namespace: String,
    /// Redis connection URL (default: "redis://localhost:6379")
    /// Note: Only used when the `redis` feature is enabled.
    pub redis_url: String,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Environment variables:
    /// - `CACHE_TTL_SECONDS` - Cache TTL in seconds (default: 300)
    /// - `CACHE_MAX_ENTRIES` - Maximum cache entries (default: 10,000)
    /// - `CACHE_FAIL_OPEN` - `true`/`1`/`yes`/`on` to fail open (default: false)
    /// - `CACHE_NAMESPACE` - Redis key prefix (default: "repocache")
    /// - `REDIS_URL` - Redis connection URL (default: "redis://localhost:6379")
    pub fn from_env() -> Self {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    ///
    /// Unparsable values fall back to their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        Self {
            cache_ttl_seconds: lookup("CACHE_TTL_SECONDS")
                .and_then(|v| v.parse().ok())
                .unwrap_or(300),
            cache_max_entries: lookup("CACHE_MAX_ENTRIES")
                .and_then(|v| v.parse().ok())
                .unwrap_or(10_000),
            cache_fail_open: lookup("CACHE_FAIL_OPEN")
                .and_then(|v| parse_flag(&v))
                .unwrap_or(false),
            cache_namespace: lookup("CACHE_NAMESPACE").unwrap_or_else(|| "repocache".to_string()),
            redis_url: lookup("REDIS_URL")
                .unwrap_or_else(|| "redis://localhost:6379".to_string()),
        }
    }

    /// Get cache TTL as a Duration.
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_seconds)
    }

    /// Expiration policy for cached entries.
    pub fn cache_policy(&self) -> CachePolicy {
        match self.cache_ttl_seconds {
            0 => CachePolicy::NoExpiration,
            _ => CachePolicy::ttl(self.cache_ttl()),
        }
    }

    /// Options for a caching repository built from this configuration.
    pub fn cache_options(&self) -> CacheOptions {
        CacheOptions {
            policy: self.cache_policy(),
            fail_open: self.cache_fail_open,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::from_env()
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
