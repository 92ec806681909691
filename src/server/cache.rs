use std::num::NonZeroUsize;
use std::time::Duration;

use lru::LruCache;
use parking_lot::Mutex;
use time::OffsetDateTime;

use crate::types::UserContext;

#[derive(Debug, Clone)]
struct CacheEntry {
    user: UserContext,
    expires_at: OffsetDateTime,
    cached_at: OffsetDateTime,
}

/// Validated-token cache with TTL and strict LRU eviction.
///
/// Keys are raw token strings, so two tokens of the same user are cached
/// separately. An entry expires at `now + ttl`, or earlier when the token
/// itself expires first. Reads and writes both count as use.
///
/// Every operation holds a single mutex for its whole read-modify-write
/// sequence and never awaits while holding it.
#[derive(Debug)]
pub struct TokenCache {
    entries: Mutex<LruCache<String, CacheEntry>>,
    ttl: Duration,
}

impl TokenCache {
    /// A `max_size` of 0 is treated as 1.
    #[must_use]
    pub fn new(ttl: Duration, max_size: usize) -> Self {
        let capacity = NonZeroUsize::new(max_size).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
            ttl,
        }
    }

    /// Cached user for `token`, promoting it to most recently used.
    ///
    /// An expired entry is removed and reported as a miss.
    #[must_use]
    pub fn get(&self, token: &str) -> Option<UserContext> {
        self.get_at(token, OffsetDateTime::now_utc())
    }

    /// Cache `user` for `token`.
    ///
    /// Inserting a new key at capacity evicts exactly the least recently
    /// used entry; overwriting an existing key evicts nothing.
    pub fn set(&self, token: &str, user: UserContext, token_expires_at: Option<OffsetDateTime>) {
        self.set_at(token, user, token_expires_at, OffsetDateTime::now_utc());
    }

    pub fn delete(&self, token: &str) {
        self.entries.lock().pop(token);
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    /// Remove every expired entry and return how many were removed.
    pub fn cleanup(&self) -> usize {
        self.cleanup_at(OffsetDateTime::now_utc())
    }

    #[must_use]
    pub fn size(&self) -> usize {
        self.entries.lock().len()
    }

    #[must_use]
    pub fn max_size(&self) -> usize {
        self.entries.lock().cap().get()
    }

    #[must_use]
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    fn get_at(&self, token: &str, now: OffsetDateTime) -> Option<UserContext> {
        let mut entries = self.entries.lock();
        let age = match entries.get(token) {
            None => return None,
            Some(entry) if now <= entry.expires_at => return Some(entry.user.clone()),
            Some(entry) => now - entry.cached_at,
        };
        entries.pop(token);
        tracing::trace!(
            age_secs = age.whole_seconds(),
            "Dropped expired token cache entry"
        );
        None
    }

    fn set_at(
        &self,
        token: &str,
        user: UserContext,
        token_expires_at: Option<OffsetDateTime>,
        now: OffsetDateTime,
    ) {
        let ttl = time::Duration::try_from(self.ttl).unwrap_or(time::Duration::MAX);
        let mut expires_at = now.saturating_add(ttl);
        if let Some(token_expiry) = token_expires_at {
            expires_at = expires_at.min(token_expiry);
        }

        let entry = CacheEntry {
            user,
            expires_at,
            cached_at: now,
        };

        let mut entries = self.entries.lock();
        if let Some((evicted, _)) = entries.push(token.to_string(), entry) {
            if evicted != token {
                tracing::trace!(size = entries.len(), "Evicted least recently used token");
            }
        }
    }

    fn cleanup_at(&self, now: OffsetDateTime) -> usize {
        let mut entries = self.entries.lock();
        let expired: Vec<String> = entries
            .iter()
            .filter(|(_, entry)| now > entry.expires_at)
            .map(|(token, _)| token.clone())
            .collect();
        for token in &expired {
            entries.pop(token);
        }
        if !expired.is_empty() {
            tracing::trace!(removed = expired.len(), "Removed expired token cache entries");
        }
        expired.len()
    }

    #[cfg(test)]
    fn contains(&self, token: &str) -> bool {
        self.entries.lock().contains(token)
    }
}
