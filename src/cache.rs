//! Local expiring cache, used as both the short-term pending-work queue
//! and the per-IP connection-count store.
//!
//! Grounded in `original_source/pkg/servers/apiserver/server.go`
//! (`Pop` skipping `conntrack_`-prefixed keys) and
//! `pkg/crawler/connection/tracker.go`, backing store modeled after
//! `github.com/tb0hdan/memcache`'s `map` + `sync.RWMutex` contract.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

pub const CONNTRACK_PREFIX: &str = "conntrack_";

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires_at: Instant,
}

/// Single-writer-safe expiring string map.
pub struct LocalCache {
    entries: Mutex<HashMap<String, Entry>>,
}

impl Default for LocalCache {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalCache {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Insert `key` with `value`, expiring after `ttl`. Never blocks
    /// beyond acquiring the internal mutex.
    pub fn set_ex(&self, key: impl Into<String>, value: impl Into<String>, ttl: Duration) {
        let mut guard = self.entries.lock();
        guard.insert(
            key.into(),
            Entry {
                value: value.into(),
                expires_at: Instant::now() + ttl,
            },
        );
    }

    /// Read `key`, treating expired entries as absent (lazy expiry).
    pub fn get_ex(&self, key: &str) -> Option<(String, Instant)> {
        let guard = self.entries.lock();
        let entry = guard.get(key)?;
        if entry.expires_at <= Instant::now() {
            return None;
        }
        Some((entry.value.clone(), entry.expires_at))
    }

    pub fn delete(&self, key: &str) {
        self.entries.lock().remove(key);
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of live (non-expired) keys, to keep lock hold times short.
    pub fn keys_snapshot(&self) -> Vec<String> {
        let now = Instant::now();
        let guard = self.entries.lock();
        guard
            .iter()
            .filter(|(_, e)| e.expires_at > now)
            .map(|(k, _)| k.clone())
            .collect()
    }

    /// Remove and return an arbitrary non-`conntrack_` key, or an
    /// empty string if none exists. Ordering is unspecified.
    pub fn pop(&self) -> String {
        let candidate = {
            let guard = self.entries.lock();
            let now = Instant::now();
            guard
                .iter()
                .find(|(k, e)| e.expires_at > now && !k.starts_with(CONNTRACK_PREFIX))
                .map(|(k, _)| k.clone())
        };

        match candidate {
            Some(key) => {
                self.delete(&key);
                key
            }
            None => String::new(),
        }
    }

    /// Prune all expired entries. Callers MAY run this periodically;
    /// reads already treat expired entries as absent.
    pub fn sweep_expired(&self) {
        let now = Instant::now();
        self.entries.lock().retain(|_, e| e.expires_at > now);
    }

    /// Bump a per-IP connection counter, matching
    /// `connection.Tracker.Check`'s `conntrack_<ip>` bookkeeping.
    pub fn track_connection(&self, ip: &str, window: Duration, max_per_window: i64) -> bool {
        let key = format!("{CONNTRACK_PREFIX}{ip}");
        let mut guard = self.entries.lock();
        let now = Instant::now();

        match guard.get(&key) {
            Some(entry) if entry.expires_at > now => {
                let count: i64 = entry.value.parse().unwrap_or(0);
                if count > max_per_window {
                    return false;
                }
                let expires_at = entry.expires_at;
                guard.insert(
                    key,
                    Entry {
                        value: (count + 1).to_string(),
                        expires_at,
                    },
                );
            }
            _ => {
                guard.insert(
                    key,
                    Entry {
                        value: "1".to_string(),
                        expires_at: now + window,
                    },
                );
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pop_never_returns_conntrack_keys() {
        let cache = LocalCache::new();
        cache.set_ex("conntrack_1.2.3.4", "5", Duration::from_secs(60));
        assert_eq!(cache.pop(), String::new());
    }

    #[test]
    fn pop_returns_and_removes_a_domain_key() {
        let cache = LocalCache::new();
        cache.set_ex("example.com", "1", Duration::from_secs(60));
        let popped = cache.pop();
        assert_eq!(popped, "example.com");
        assert_eq!(cache.len(), 0);
    }

    #[test]
    fn idempotent_upload_within_ttl() {
        let cache = LocalCache::new();
        cache.set_ex("example.com", "1", Duration::from_secs(60));
        cache.set_ex("example.com", "1", Duration::from_secs(60));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn expired_entries_are_invisible_to_reads() {
        let cache = LocalCache::new();
        cache.set_ex("example.com", "1", Duration::from_millis(1));
        std::thread::sleep(Duration::from_millis(20));
        assert!(cache.get_ex("example.com").is_none());
        assert_eq!(cache.pop(), String::new());
    }

    #[test]
    fn track_connection_rejects_past_threshold() {
        let cache = LocalCache::new();
        // Each accepted call bumps the counter by one; the limit check
        // compares the *existing* count against the threshold before
        // incrementing, so the (threshold + 1)th call is the first
        // rejection, matching `connection.Tracker.Check`.
        for _ in 0..33 {
            assert!(cache.track_connection("1.2.3.4", Duration::from_secs(300), 32));
        }
        assert!(!cache.track_connection("1.2.3.4", Duration::from_secs(300), 32));
    }
}
