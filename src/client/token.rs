//! Bearer token lifecycle for the signed client
//!
//! The platform issues short-lived tokens against client credentials. The
//! cache hands out a token only while it is comfortably inside its expiry
//! window, and refreshes are serialized behind a mutex so concurrent
//! callers share a single in-flight refresh instead of stampeding the
//! token endpoint.

use serde::Deserialize;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, MutexGuard};

/// Margin subtracted from the reported expiry before a token is
/// considered stale
pub const TOKEN_EXPIRY_SAFETY_MARGIN: Duration = Duration::from_secs(30);

/// Token grant payload from `/v1.0/token`
#[derive(Debug, Clone, Deserialize)]
pub struct TokenGrant {
    pub access_token: String,
    /// Remaining validity in seconds
    pub expire_time: u64,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub uid: Option<String>,
}

/// A cached token with its absolute expiry instant
#[derive(Debug, Clone)]
pub struct CachedToken {
    pub access_token: String,
    expires_at: Instant,
}

impl CachedToken {
    pub fn from_grant(grant: &TokenGrant) -> Self {
        Self {
            access_token: grant.access_token.clone(),
            expires_at: Instant::now() + Duration::from_secs(grant.expire_time),
        }
    }

    /// Valid only while now is before expiry minus the safety margin
    pub fn is_valid(&self) -> bool {
        Instant::now() + TOKEN_EXPIRY_SAFETY_MARGIN < self.expires_at
    }
}

/// Mutex-guarded token slot shared by all callers of one client
#[derive(Debug, Default)]
pub struct TokenCache {
    slot: Mutex<Option<CachedToken>>,
}

impl TokenCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lock the slot; the guard is held across a refresh so only one
    /// refresh request is ever in flight
    pub async fn lock(&self) -> MutexGuard<'_, Option<CachedToken>> {
        self.slot.lock().await
    }

    /// Drop any cached token, forcing the next caller to refresh
    pub async fn invalidate(&self) {
        *self.slot.lock().await = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grant(expire_time: u64) -> TokenGrant {
        TokenGrant {
            access_token: "tok".to_string(),
            expire_time,
            refresh_token: None,
            uid: None,
        }
    }

    #[test]
    fn fresh_token_is_valid() {
        assert!(CachedToken::from_grant(&grant(7200)).is_valid());
    }

    #[test]
    fn token_inside_safety_margin_is_stale() {
        // Expires in 10s, margin is 30s
        assert!(!CachedToken::from_grant(&grant(10)).is_valid());
    }

    #[tokio::test]
    async fn invalidate_clears_the_slot() {
        let cache = TokenCache::new();
        *cache.lock().await = Some(CachedToken::from_grant(&grant(7200)));
        cache.invalidate().await;
        assert!(cache.lock().await.is_none());
    }
}
