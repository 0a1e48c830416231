// src/health/memo.rs
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};

/// Process-wide map from upstream identity (`host:port`) to a down flag.
///
/// Shared across all rules that may route to the same upstream, so a
/// connect failure observed by one rule takes the service out of rotation
/// for every rule. Entries are independent per identity; reads and writes of
/// a flag are plain atomics, no global lock.
#[derive(Debug, Default)]
pub struct ServiceMemo {
    flags: DashMap<String, ServiceFlag>,
}

#[derive(Debug, Default)]
struct ServiceFlag {
    down: AtomicBool,
    marked_at: AtomicI64,
}

impl ServiceMemo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_down(&self, identity: &str) -> bool {
        self.flags
            .get(identity)
            .map(|flag| flag.down.load(Ordering::SeqCst))
            .unwrap_or(false)
    }

    /// Idempotent; safe under concurrent callers. No TTL is stored here;
    /// recovery is driven externally by the one-shot recovery timer.
    pub fn mark_down(&self, identity: &str, down: bool) {
        let entry = self.flags.entry(identity.to_string()).or_default();
        entry.down.store(down, Ordering::SeqCst);
        entry
            .marked_at
            .store(Utc::now().timestamp(), Ordering::SeqCst);
    }

    /// Per-identity state dump for logs and operator inspection.
    pub fn status(&self) -> Vec<String> {
        self.flags
            .iter()
            .map(|entry| {
                let marked = DateTime::<Utc>::from_timestamp(
                    entry.value().marked_at.load(Ordering::SeqCst),
                    0,
                )
                .map(|t| t.to_rfc3339())
                .unwrap_or_default();
                format!(
                    "{}:down({}):marked_at({})",
                    entry.key(),
                    entry.value().down.load(Ordering::SeqCst),
                    marked
                )
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_identity_is_up() {
        let memo = ServiceMemo::new();
        assert!(!memo.is_down("example.com:80"));
    }

    #[test]
    fn test_mark_down_is_idempotent() {
        let memo = ServiceMemo::new();
        memo.mark_down("example.com:80", true);
        memo.mark_down("example.com:80", true);
        assert!(memo.is_down("example.com:80"));

        memo.mark_down("example.com:80", false);
        memo.mark_down("example.com:80", false);
        assert!(!memo.is_down("example.com:80"));
    }

    #[test]
    fn test_identities_are_independent() {
        let memo = ServiceMemo::new();
        memo.mark_down("a:80", true);
        assert!(memo.is_down("a:80"));
        assert!(!memo.is_down("b:80"));
    }
}
