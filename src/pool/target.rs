// src/pool/target.rs
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use url::Url;

pub const MAX_EFFECTIVE_WEIGHT: i32 = 1000;

/// Service identity of an upstream endpoint, shared with the service memo so
/// every rule routing to the same host+port sees the same down flag.
pub fn service_identity(url: &Url) -> String {
    format!(
        "{}:{}",
        url.host_str().unwrap_or("unknown"),
        url.port_or_known_default().unwrap_or(80)
    )
}

/// One upstream endpoint candidate: immutable identity plus the mutable
/// selection state carried between `select_active_target` calls.
///
/// `current_weight` is the smoothing counter of the weighted round-robin; it
/// persists for the lifetime of the target, including while the target is
/// down (frozen, never reset).
#[derive(Debug)]
pub struct Target {
    pub id: String,
    pub url: Url,

    current_weight: AtomicI32,
    effective_weight: AtomicI32,
    api_down: AtomicBool,
}

impl Target {
    pub fn new(url: Url) -> Self {
        Self::with_weight(url, 1)
    }

    pub fn with_weight(url: Url, weight: i32) -> Self {
        let id = service_identity(&url);
        Self {
            id,
            url,
            current_weight: AtomicI32::new(1),
            effective_weight: AtomicI32::new(weight.clamp(1, MAX_EFFECTIVE_WEIGHT)),
            api_down: AtomicBool::new(false),
        }
    }

    pub fn current_weight(&self) -> i32 {
        self.current_weight.load(Ordering::SeqCst)
    }

    pub fn effective_weight(&self) -> i32 {
        self.effective_weight.load(Ordering::SeqCst)
    }

    /// Adjust the effective weight by `delta`, reverting the adjustment if it
    /// would exceed [`MAX_EFFECTIVE_WEIGHT`]. Returns the resulting weight.
    ///
    /// Operator/controller hook; nothing in the forwarding path calls this.
    pub fn add_weight(&self, delta: i32) -> i32 {
        let weight = self.effective_weight.fetch_add(delta, Ordering::SeqCst) + delta;
        if weight > MAX_EFFECTIVE_WEIGHT {
            return self.effective_weight.fetch_sub(delta, Ordering::SeqCst) - delta;
        }
        weight
    }

    /// Set or clear the api-scoped down flag. Never touches the service memo.
    pub fn mark_api_down(&self, down: bool) {
        self.api_down.store(down, Ordering::SeqCst);
    }

    pub fn is_api_down(&self) -> bool {
        self.api_down.load(Ordering::SeqCst)
    }

    /// One selection-scan step: current += effective. Returns the new current
    /// weight and the effective weight that was added.
    pub(crate) fn advance(&self) -> (i32, i32) {
        let effective = self.effective_weight.load(Ordering::SeqCst);
        let current = self.current_weight.fetch_add(effective, Ordering::SeqCst) + effective;
        (current, effective)
    }

    /// Settle the scan winner: current -= total of active effective weights.
    pub(crate) fn settle(&self, total: i32) {
        self.current_weight.fetch_sub(total, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target(weight: i32) -> Target {
        Target::with_weight("http://127.0.0.1:8080".parse().unwrap(), weight)
    }

    #[test]
    fn test_identity_uses_known_default_port() {
        let t = Target::new("http://example.com/".parse().unwrap());
        assert_eq!(t.id, "example.com:80");
        let t = Target::new("https://example.com/".parse().unwrap());
        assert_eq!(t.id, "example.com:443");
    }

    #[test]
    fn test_initial_weights() {
        let t = target(3);
        assert_eq!(t.current_weight(), 1);
        assert_eq!(t.effective_weight(), 3);
    }

    #[test]
    fn test_add_weight_reverts_past_cap() {
        let t = target(1);
        assert_eq!(t.add_weight(10), 11);
        assert_eq!(t.add_weight(2000), 11);
        assert_eq!(t.effective_weight(), 11);
        assert_eq!(t.add_weight(MAX_EFFECTIVE_WEIGHT - 11), MAX_EFFECTIVE_WEIGHT);
    }

    #[test]
    fn test_api_down_flag() {
        let t = target(1);
        assert!(!t.is_api_down());
        t.mark_api_down(true);
        assert!(t.is_api_down());
        t.mark_api_down(false);
        assert!(!t.is_api_down());
    }
}
