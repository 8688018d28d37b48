//! auth::cache
//!
//! In-memory credential cache with TTL.
//!
//! # Design
//!
//! Entries are keyed by (kind, remote URL). A credential handed out for an
//! attempt is held as *pending* for its kind; it only becomes a cached entry
//! when the attempt succeeds and the caller promotes it. Invalidating a kind
//! drops both its pending credential and every cached entry of that kind.
//!
//! Nothing is written to disk.
//!
//! # Example
//!
//! ```
//! use repoflow::auth::{CredentialCache, CredentialKind};
//! use repoflow::git::Credential;
//!
//! let mut cache = CredentialCache::new();
//! let url = "https://example.com/repo.git";
//! cache.record_attempt(CredentialKind::Normal, url, Credential::Default);
//! assert!(cache.get(CredentialKind::Normal, url).is_none());
//!
//! cache.promote(CredentialKind::Normal);
//! assert_eq!(cache.get(CredentialKind::Normal, url), Some(Credential::Default));
//! ```

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};

use super::CredentialKind;
use crate::git::Credential;

/// How long a stored credential is reused without asking again.
const CACHE_TTL_MINUTES: i64 = 15;

#[derive(Debug, Clone)]
struct CacheEntry {
    credential: Credential,
    cached_at: DateTime<Utc>,
}

impl CacheEntry {
    fn is_expired(&self, ttl: Duration) -> bool {
        Utc::now() - self.cached_at > ttl
    }
}

/// Credentials keyed by kind and URL.
#[derive(Debug)]
pub struct CredentialCache {
    entries: HashMap<(CredentialKind, String), CacheEntry>,
    pending: HashMap<CredentialKind, (String, Credential)>,
    ttl: Duration,
}

impl Default for CredentialCache {
    fn default() -> Self {
        Self::with_ttl(Duration::minutes(CACHE_TTL_MINUTES))
    }
}

impl CredentialCache {
    /// Create an empty cache with the default TTL.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty cache with a custom TTL.
    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            entries: HashMap::new(),
            pending: HashMap::new(),
            ttl,
        }
    }

    /// A live cached credential for `url`.
    pub fn get(&self, kind: CredentialKind, url: &str) -> Option<Credential> {
        self.entries
            .get(&(kind, url.to_string()))
            .filter(|e| !e.is_expired(self.ttl))
            .map(|e| e.credential.clone())
    }

    /// Remember `credential` as the one being tried for `kind`.
    pub fn record_attempt(&mut self, kind: CredentialKind, url: &str, credential: Credential) {
        self.pending.insert(kind, (url.to_string(), credential));
    }

    /// Move the pending credential of `kind` into the cache.
    ///
    /// Returns `false` if nothing was pending.
    pub fn promote(&mut self, kind: CredentialKind) -> bool {
        match self.pending.remove(&kind) {
            Some((url, credential)) => {
                self.entries.insert(
                    (kind, url),
                    CacheEntry {
                        credential,
                        cached_at: Utc::now(),
                    },
                );
                true
            }
            None => false,
        }
    }

    /// Drop everything held for `kind`. Returns the number of cached entries removed.
    pub fn invalidate(&mut self, kind: CredentialKind) -> usize {
        self.pending.remove(&kind);
        let before = self.entries.len();
        self.entries.retain(|(k, _), _| *k != kind);
        before - self.entries.len()
    }

    /// Remove expired entries.
    pub fn prune_expired(&mut self) -> usize {
        let ttl = self.ttl;
        let before = self.entries.len();
        self.entries.retain(|_, e| !e.is_expired(ttl));
        before - self.entries.len()
    }

    /// Number of cached entries, including expired ones.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the cache holds no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
