//! Verification token registry.
//!
//! Maps one-time verification tokens to the job awaiting confirmation.
//! Entries are created by the Telegram verification adapter and removed by
//! the confirmation webhook or the periodic expiry sweep. The registry is
//! constructed once at startup and handed to both sides explicitly.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use dashmap::DashMap;
use tracing::debug;

use clypr_bridge_protocol::JobId;

/// A job waiting for an out-of-band confirmation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingVerification {
    pub job_id: JobId,
    /// Milliseconds since the epoch.
    pub expires_at_ms: u64,
}

impl PendingVerification {
    pub fn is_expired_at(&self, now_ms: u64) -> bool {
        self.expires_at_ms <= now_ms
    }
}

/// Current time in milliseconds since the epoch.
pub fn now_ms() -> u64 {
    u64::try_from(Utc::now().timestamp_millis()).unwrap_or_default()
}

/// Concurrency-safe token store. Clones share the same entries.
#[derive(Debug, Clone, Default)]
pub struct TokenRegistry {
    entries: Arc<DashMap<String, PendingVerification>>,
}

impl TokenRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite the entry for `token`.
    pub fn register(&self, token: impl Into<String>, job_id: JobId, expires_at_ms: u64) {
        self.entries.insert(
            token.into(),
            PendingVerification {
                job_id,
                expires_at_ms,
            },
        );
    }

    /// Look up a live entry. Expired entries are never returned, swept or not.
    pub fn resolve(&self, token: &str) -> Option<PendingVerification> {
        self.resolve_at(token, now_ms())
    }

    pub fn resolve_at(&self, token: &str, now_ms: u64) -> Option<PendingVerification> {
        self.peek(token).filter(|entry| !entry.is_expired_at(now_ms))
    }

    /// Look up an entry regardless of expiry.
    pub fn peek(&self, token: &str) -> Option<PendingVerification> {
        self.entries.get(token).map(|entry| *entry.value())
    }

    /// Remove the entry for `token`, returning it.
    pub fn consume(&self, token: &str) -> Option<PendingVerification> {
        self.entries.remove(token).map(|(_, entry)| entry)
    }

    /// Remove every entry with `expires_at_ms <= now_ms`. Returns how many went.
    pub fn sweep(&self, now_ms: u64) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired_at(now_ms));
        before.saturating_sub(self.entries.len())
    }

    /// First registered token that occurs inside `text`.
    ///
    /// Longer tokens are tried first so a token that contains another one
    /// wins over its substring.
    pub fn find_in_text(&self, text: &str) -> Option<String> {
        let mut tokens: Vec<String> = self.entries.iter().map(|e| e.key().clone()).collect();
        tokens.sort_by_key(|t| std::cmp::Reverse(t.len()));
        tokens
            .into_iter()
            .find(|token| !token.is_empty() && text.contains(token.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Spawn the periodic expiry sweep. Returns its handle for shutdown.
pub fn spawn_expiry_sweep(
    registry: TokenRegistry,
    interval: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            let removed = registry.sweep(now_ms());
            if removed > 0 {
                debug!(removed, remaining = registry.len(), "Swept expired verification tokens");
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_resolve_consume() {
        let registry = TokenRegistry::new();
        registry.register("abc123", 7, 10_000);

        assert_eq!(
            registry.resolve_at("abc123", 5_000),
            Some(PendingVerification {
                job_id: 7,
                expires_at_ms: 10_000
            })
        );
        assert_eq!(registry.consume("abc123").map(|e| e.job_id), Some(7));
        assert!(registry.resolve_at("abc123", 5_000).is_none());
        assert!(registry.peek("abc123").is_none());
        assert!(registry.consume("abc123").is_none());
    }

    #[test]
    fn register_overwrites() {
        let registry = TokenRegistry::new();
        registry.register("t", 1, 100);
        registry.register("t", 2, 200);
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.peek("t").unwrap().job_id, 2);
    }

    #[test]
    fn expired_entries_never_resolve_even_before_sweep() {
        let registry = TokenRegistry::new();
        registry.register("t", 1, 1_000);

        assert!(registry.resolve_at("t", 999).is_some());
        assert!(registry.resolve_at("t", 1_000).is_none());
        assert!(registry.resolve_at("t", 5_000).is_none());
        // Still present until swept.
        assert!(registry.peek("t").is_some());
    }

    #[test]
    fn sweep_removes_only_expired() {
        let registry = TokenRegistry::new();
        registry.register("old", 1, 1_000);
        registry.register("edge", 2, 2_000);
        registry.register("fresh", 3, 3_000);

        assert_eq!(registry.sweep(2_000), 2);
        assert!(registry.peek("old").is_none());
        assert!(registry.peek("edge").is_none());
        assert!(registry.peek("fresh").is_some());
    }

    #[test]
    fn find_in_text_prefers_longest_match() {
        let registry = TokenRegistry::new();
        registry.register("abc", 1, u64::MAX);
        registry.register("abc123", 2, u64::MAX);

        assert_eq!(
            registry.find_in_text("my code is abc123 thanks").as_deref(),
            Some("abc123")
        );
        assert_eq!(registry.find_in_text("abc!").as_deref(), Some("abc"));
        assert!(registry.find_in_text("nothing here").is_none());
    }

    #[test]
    fn clones_share_entries() {
        let registry = TokenRegistry::new();
        let other = registry.clone();
        registry.register("t", 1, u64::MAX);
        assert!(other.resolve("t").is_some());
    }

    #[tokio::test]
    async fn sweep_task_evicts_expired_entries() {
        let registry = TokenRegistry::new();
        registry.register("stale", 1, 1);
        registry.register("live", 2, u64::MAX);

        let handle = spawn_expiry_sweep(registry.clone(), Duration::from_secs(60));
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert!(registry.peek("stale").is_none());
        assert!(registry.peek("live").is_some());
        handle.abort();
    }
}
