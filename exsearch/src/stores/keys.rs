//! Key layout for networked key-value backends.

/// Prefix of content cache keys.
pub const CACHE_KEY_PREFIX: &str = "URL:";

/// Glob matching every domain lock key.
pub const DOMAIN_LOCK_KEY_PATTERN: &str = "domain:*:data";

/// Returns the cache key for a request URL.
#[must_use]
pub fn cache_key(url: &str) -> String {
    format!("{CACHE_KEY_PREFIX}{url}")
}

/// Returns the lock key for an origin.
#[must_use]
pub fn domain_lock_key(origin: &str) -> String {
    format!("domain:{origin}:data")
}
