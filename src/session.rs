use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::types::TokenResponse;

/// Lifetime assumed for an access token stored without an explicit expiry.
pub const DEFAULT_TOKEN_LIFETIME_SECS: i64 = 3600;

/// A token counts as expired this many seconds before its actual expiry.
pub const EXPIRY_BUFFER_SECS: i64 = 60;

const ACCESS_TOKEN_KEY: &str = "aether_access_token";
const REFRESH_TOKEN_KEY: &str = "aether_refresh_token";
const EXPIRES_AT_KEY: &str = "aether_expires_at";

/// Consumer-provided token storage.
///
/// The default is [`MemoryStorage`]; implement this trait to keep tokens in an
/// encrypted file, the platform keychain, etc.
///
/// # Example
///
/// ```rust,ignore
/// struct KeyringStorage { service: String }
///
/// impl TokenStorage for KeyringStorage {
///     fn get(&self, key: &str) -> Option<String> {
///         keyring::Entry::new(&self.service, key).ok()?.get_password().ok()
///     }
///     fn set(&self, key: &str, value: &str) {
///         if let Ok(entry) = keyring::Entry::new(&self.service, key) {
///             let _ = entry.set_password(value);
///         }
///     }
///     fn remove(&self, key: &str) {
///         if let Ok(entry) = keyring::Entry::new(&self.service, key) {
///             let _ = entry.delete_credential();
///         }
///     }
/// }
/// ```
pub trait TokenStorage: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;

    fn set(&self, key: &str, value: &str);

    /// Removing a missing key is a no-op.
    fn remove(&self, key: &str);
}

/// In-process storage, scoped to the owning [`SessionManager`].
#[derive(Debug, Default)]
pub struct MemoryStorage {
    data: RwLock<HashMap<String, String>>,
}

impl MemoryStorage {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl TokenStorage for MemoryStorage {
    fn get(&self, key: &str) -> Option<String> {
        self.data.read().get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) {
        self.data.write().insert(key.to_string(), value.to_string());
    }

    fn remove(&self, key: &str) {
        self.data.write().remove(key);
    }
}

/// Client-side store for the current access token, refresh token and expiry.
///
/// Expiry is kept as unix seconds, computed as `now + expires_in` when the
/// token is stored.
#[derive(Clone)]
pub struct SessionManager {
    storage: Arc<dyn TokenStorage>,
}

impl Default for SessionManager {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager")
            .field("authenticated", &self.is_authenticated())
            .finish_non_exhaustive()
    }
}

impl SessionManager {
    #[must_use]
    pub fn new() -> Self {
        Self::with_storage(Arc::new(MemoryStorage::new()))
    }

    #[must_use]
    pub fn with_storage(storage: Arc<dyn TokenStorage>) -> Self {
        Self { storage }
    }

    /// Store the access token, refresh token and derived expiry of a token response.
    pub fn set_tokens(&self, tokens: &TokenResponse) {
        self.set_tokens_at(tokens, unix_now());
    }

    /// Store only an access token, e.g. when no refresh token was issued.
    ///
    /// Any stored refresh token is left untouched.
    pub fn set_access_token(&self, token: &str, expires_in: i64) {
        self.set_access_token_at(token, expires_in, unix_now());
    }

    #[must_use]
    pub fn access_token(&self) -> Option<String> {
        self.storage.get(ACCESS_TOKEN_KEY)
    }

    #[must_use]
    pub fn refresh_token(&self) -> Option<String> {
        self.storage.get(REFRESH_TOKEN_KEY)
    }

    /// Expiry in unix seconds. An unparsable stored value reads as absent.
    #[must_use]
    pub fn expires_at(&self) -> Option<i64> {
        self.storage
            .get(EXPIRES_AT_KEY)
            .and_then(|v| v.parse().ok())
    }

    /// True if an access token is stored and is not within
    /// [`EXPIRY_BUFFER_SECS`] of its expiry.
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.is_authenticated_at(unix_now())
    }

    pub fn clear(&self) {
        self.storage.remove(ACCESS_TOKEN_KEY);
        self.storage.remove(REFRESH_TOKEN_KEY);
        self.storage.remove(EXPIRES_AT_KEY);
    }

    fn set_tokens_at(&self, tokens: &TokenResponse, now: i64) {
        self.storage.set(ACCESS_TOKEN_KEY, &tokens.access_token);
        self.storage.set(REFRESH_TOKEN_KEY, &tokens.refresh_token);
        self.store_expiry(tokens.expires_in, now);
    }

    fn set_access_token_at(&self, token: &str, expires_in: i64, now: i64) {
        self.storage.set(ACCESS_TOKEN_KEY, token);
        self.store_expiry(expires_in, now);
    }

    fn store_expiry(&self, expires_in: i64, now: i64) {
        let expires_at = now.saturating_add(expires_in.max(0));
        self.storage.set(EXPIRES_AT_KEY, &expires_at.to_string());
    }

    fn is_authenticated_at(&self, now: i64) -> bool {
        if self.access_token().is_none() {
            return false;
        }
        match self.expires_at() {
            Some(expires_at) => now < expires_at.saturating_sub(EXPIRY_BUFFER_SECS),
            None => false,
        }
    }
}

pub(crate) fn unix_now() -> i64 {
    time::OffsetDateTime::now_utc().unix_timestamp()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(expires_in: i64) -> TokenResponse {
        TokenResponse {
            access_token: "access-1".into(),
            refresh_token: "refresh-1".into(),
            expires_in,
        }
    }

    #[test]
    fn test_not_authenticated_without_token() {
        let session = SessionManager::new();
        assert!(!session.is_authenticated());
        assert!(!session.is_authenticated_at(0));
    }

    #[test]
    fn test_set_tokens_stores_all_values() {
        let session = SessionManager::new();
        session.set_tokens_at(&tokens(3600), 1_000);

        assert_eq!(session.access_token().as_deref(), Some("access-1"));
        assert_eq!(session.refresh_token().as_deref(), Some("refresh-1"));
        assert_eq!(session.expires_at(), Some(4_600));
    }

    #[test]
    fn test_expiry_buffer() {
        let session = SessionManager::new();
        session.set_tokens_at(&tokens(3600), 1_000);

        assert!(session.is_authenticated_at(1_000));
        assert!(session.is_authenticated_at(4_539));
        assert!(!session.is_authenticated_at(4_540));
        assert!(!session.is_authenticated_at(4_600));
    }

    #[test]
    fn test_short_lived_token_is_never_authenticated() {
        let session = SessionManager::new();
        session.set_tokens_at(&tokens(30), 1_000);
        assert!(!session.is_authenticated_at(1_000));
    }

    #[test]
    fn test_negative_expires_in_is_clamped() {
        let session = SessionManager::new();
        session.set_tokens_at(&tokens(-50), 1_000);
        assert_eq!(session.expires_at(), Some(1_000));
    }

    #[test]
    fn test_set_access_token_keeps_refresh_token() {
        let session = SessionManager::new();
        session.set_tokens_at(&tokens(3600), 1_000);
        session.set_access_token_at("access-2", 600, 2_000);

        assert_eq!(session.access_token().as_deref(), Some("access-2"));
        assert_eq!(session.refresh_token().as_deref(), Some("refresh-1"));
        assert_eq!(session.expires_at(), Some(2_600));
    }

    #[test]
    fn test_extreme_stored_expiry_does_not_overflow() {
        let storage = Arc::new(MemoryStorage::new());
        storage.set(ACCESS_TOKEN_KEY, "token");
        storage.set(EXPIRES_AT_KEY, &i64::MIN.to_string());
        let session = SessionManager::with_storage(storage.clone());

        assert!(!session.is_authenticated());
        assert!(!session.is_authenticated_at(i64::MIN));

        storage.set(EXPIRES_AT_KEY, &i64::MAX.to_string());
        assert!(session.is_authenticated_at(i64::MAX - EXPIRY_BUFFER_SECS - 1));
    }

    #[test]
    fn test_missing_expiry_is_not_authenticated() {
        let storage = Arc::new(MemoryStorage::new());
        storage.set(ACCESS_TOKEN_KEY, "token");
        let session = SessionManager::with_storage(storage);

        assert!(!session.is_authenticated_at(0));
    }

    #[test]
    fn test_garbage_expiry_reads_as_absent() {
        let storage = Arc::new(MemoryStorage::new());
        storage.set(ACCESS_TOKEN_KEY, "token");
        storage.set(EXPIRES_AT_KEY, "soon");
        let session = SessionManager::with_storage(storage);

        assert_eq!(session.expires_at(), None);
        assert!(!session.is_authenticated());
    }

    #[test]
    fn test_clear_removes_everything() {
        let session = SessionManager::new();
        session.set_tokens(&tokens(3600));
        assert!(session.is_authenticated());

        session.clear();

        assert!(session.access_token().is_none());
        assert!(session.refresh_token().is_none());
        assert!(session.expires_at().is_none());
        assert!(!session.is_authenticated());
    }

    #[test]
    fn test_custom_storage_is_shared() {
        let storage = Arc::new(MemoryStorage::new());
        let first = SessionManager::with_storage(storage.clone());
        let second = SessionManager::with_storage(storage);

        first.set_access_token("shared", DEFAULT_TOKEN_LIFETIME_SECS);

        assert_eq!(second.access_token().as_deref(), Some("shared"));
        assert!(second.is_authenticated());
    }
}
