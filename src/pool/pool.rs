// src/pool/pool.rs
use super::target::Target;
use crate::health::ServiceMemo;
use arc_swap::ArcSwap;
use std::sync::Arc;
use url::Url;

/// Ordered collection of targets belonging to one forwarding rule.
///
/// The target list is copy-on-write: appends and wholesale replacements swap
/// in a new list, so a selection scan in flight keeps iterating the list it
/// loaded and never observes a partially-built one.
pub struct TargetPool {
    targets: ArcSwap<Vec<Arc<Target>>>,
    memo: Arc<ServiceMemo>,
}

impl TargetPool {
    pub fn new(memo: Arc<ServiceMemo>) -> Self {
        Self {
            targets: ArcSwap::from_pointee(Vec::new()),
            memo,
        }
    }

    pub fn from_targets(targets: Vec<Target>, memo: Arc<ServiceMemo>) -> Self {
        Self {
            targets: ArcSwap::from_pointee(targets.into_iter().map(Arc::new).collect()),
            memo,
        }
    }

    pub fn add_target(&self, target: Target) {
        let target = Arc::new(target);
        self.targets.rcu(|current| {
            let mut next = Vec::clone(current.as_ref());
            next.push(Arc::clone(&target));
            next
        });
    }

    /// Replace the whole pool. Live targets are never removed one by one; the
    /// rule's list is rebuilt wholesale and the old one dropped.
    pub fn replace_targets(&self, targets: Vec<Target>) {
        self.targets
            .store(Arc::new(targets.into_iter().map(Arc::new).collect()));
    }

    pub fn targets(&self) -> Arc<Vec<Arc<Target>>> {
        self.targets.load_full()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.load().is_empty()
    }

    fn is_active(&self, target: &Target) -> bool {
        !(self.memo.is_down(&target.id) || target.is_api_down())
    }

    /// Smooth weighted round-robin over the currently active targets.
    ///
    /// Every active target's current weight grows by its effective weight,
    /// the strictly greatest current weight wins (ties keep the earliest
    /// candidate), and the winner pays back the sum of active effective
    /// weights. Deterministic, O(n), no randomness; concurrent scans may
    /// interleave their increments, which only perturbs the smoothing.
    pub fn select_active_target(&self) -> Option<Arc<Target>> {
        let targets = self.targets.load();

        let mut total = 0;
        let mut best: Option<(&Arc<Target>, i32)> = None;
        for peer in targets.iter() {
            if !self.is_active(peer) {
                continue;
            }
            let (current, effective) = peer.advance();
            total += effective;
            best = match best {
                Some((_, best_current)) if best_current >= current => best,
                _ => Some((peer, current)),
            };
        }

        let (winner, _) = best?;
        winner.settle(total);
        Some(Arc::clone(winner))
    }

    /// Adjust one target's effective weight by `delta` (clamped revert above
    /// the cap). Operator hook, no automatic caller in the forwarding path.
    pub fn update_weight(&self, url: &Url, delta: i32) {
        if let Some(target) = self.targets.load().iter().find(|t| t.url == *url) {
            target.add_weight(delta);
        }
    }

    /// Per-target state dump for logs and operator inspection.
    pub fn status(&self) -> Vec<String> {
        self.targets
            .load()
            .iter()
            .map(|t| {
                format!(
                    "{}:down({}):effective_weight({}):current_weight({})",
                    t.url,
                    !self.is_active(t),
                    t.effective_weight(),
                    t.current_weight()
                )
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn url(port: u16) -> Url {
        format!("http://127.0.0.1:{}/", port).parse().unwrap()
    }

    fn pool_with_weights(weights: &[i32]) -> (TargetPool, Arc<ServiceMemo>) {
        let memo = Arc::new(ServiceMemo::new());
        let targets = weights
            .iter()
            .enumerate()
            .map(|(i, w)| Target::with_weight(url(8000 + i as u16), *w))
            .collect();
        (TargetPool::from_targets(targets, Arc::clone(&memo)), memo)
    }

    fn select_id(pool: &TargetPool) -> String {
        pool.select_active_target().expect("target expected").id.clone()
    }

    #[test]
    fn test_weighted_sequence_for_weights_three_and_one() {
        let (pool, _memo) = pool_with_weights(&[3, 1]);
        let heavy = url(8000).to_string();
        let light = url(8001).to_string();

        let picked: Vec<String> = (0..4)
            .map(|_| pool.select_active_target().unwrap().url.to_string())
            .collect();
        assert_eq!(picked, vec![heavy.clone(), heavy.clone(), light, heavy]);
    }

    #[test]
    fn test_winner_pays_back_total_and_losers_keep_growing() {
        let (pool, _memo) = pool_with_weights(&[3, 1]);
        let targets = pool.targets();
        let before: Vec<i32> = targets.iter().map(|t| t.current_weight()).collect();

        let winner = pool.select_active_target().unwrap();
        let total: i32 = targets.iter().map(|t| t.effective_weight()).sum();

        for (i, t) in targets.iter().enumerate() {
            let expected = if t.id == winner.id {
                before[i] + t.effective_weight() - total
            } else {
                before[i] + t.effective_weight()
            };
            assert_eq!(t.current_weight(), expected);
        }
    }

    #[test]
    fn test_api_down_excluded_immediately_and_state_frozen() {
        let (pool, _memo) = pool_with_weights(&[1, 1]);
        let targets = pool.targets();
        targets[0].mark_api_down(true);

        let frozen = targets[0].current_weight();
        for _ in 0..5 {
            assert_eq!(select_id(&pool), targets[1].id);
        }
        // weight state of the down target is frozen, not reset
        assert_eq!(targets[0].current_weight(), frozen);

        targets[0].mark_api_down(false);
        let picked: Vec<String> = (0..2).map(|_| select_id(&pool)).collect();
        assert!(picked.contains(&targets[0].id));
    }

    #[test]
    fn test_service_down_shared_across_pools() {
        let memo = Arc::new(ServiceMemo::new());
        let shared = url(9000);
        let pool_a = TargetPool::from_targets(vec![Target::new(shared.clone())], Arc::clone(&memo));
        let pool_b = TargetPool::from_targets(vec![Target::new(shared.clone())], Arc::clone(&memo));

        memo.mark_down(&crate::pool::service_identity(&shared), true);
        assert!(pool_a.select_active_target().is_none());
        assert!(pool_b.select_active_target().is_none());

        memo.mark_down(&crate::pool::service_identity(&shared), false);
        assert!(pool_a.select_active_target().is_some());
        assert!(pool_b.select_active_target().is_some());
    }

    #[test]
    fn test_empty_and_exhausted_pools_yield_none() {
        let memo = Arc::new(ServiceMemo::new());
        let empty = TargetPool::new(Arc::clone(&memo));
        assert!(empty.select_active_target().is_none());

        let (pool, _memo) = pool_with_weights(&[1, 1]);
        for t in pool.targets().iter() {
            t.mark_api_down(true);
        }
        assert!(pool.select_active_target().is_none());
    }

    #[test]
    fn test_copy_on_write_append() {
        let (pool, _memo) = pool_with_weights(&[1]);
        let snapshot = pool.targets();
        pool.add_target(Target::new(url(8100)));
        // the earlier snapshot is untouched; new loads see both targets
        assert_eq!(snapshot.len(), 1);
        assert_eq!(pool.targets().len(), 2);
    }

    proptest! {
        // One full rotation of sum(weights) selections picks every target
        // exactly weight-many times.
        #[test]
        fn prop_selection_counts_match_weights(weights in prop::collection::vec(1i32..=5, 2..=4)) {
            let (pool, _memo) = pool_with_weights(&weights);
            let period: i32 = weights.iter().sum();

            let mut counts = vec![0i32; weights.len()];
            for _ in 0..period {
                let picked = pool.select_active_target().unwrap();
                let idx = pool
                    .targets()
                    .iter()
                    .position(|t| t.id == picked.id)
                    .unwrap();
                counts[idx] += 1;
            }
            prop_assert_eq!(counts, weights);
        }
    }
}
