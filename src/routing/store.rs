// src/routing/store.rs
use super::table::RouteTable;
use arc_swap::ArcSwap;
use std::sync::Arc;
use tracing::info;
use url::Url;

/// Holder of the installed routing snapshot.
///
/// The external configuration feed builds a brand-new [`RouteTable`] off the
/// critical path and installs it here with a single atomic pointer replace.
/// Readers in flight keep whichever snapshot they already loaded; a torn
/// table cannot be observed. Installs are serialized by the feed, reads are
/// lock-free and unbounded.
pub struct RouteStore {
    snapshot: ArcSwap<RouteTable>,
}

impl RouteStore {
    pub fn new(initial: RouteTable) -> Self {
        Self {
            snapshot: ArcSwap::from_pointee(initial),
        }
    }

    pub fn install(&self, table: RouteTable) {
        self.snapshot.store(Arc::new(table));
        info!("routing table snapshot installed");
    }

    pub fn current(&self) -> Arc<RouteTable> {
        self.snapshot.load_full()
    }

    pub fn resolve(&self, path: &str) -> Vec<Url> {
        self.snapshot.load().resolve(path)
    }
}

impl Default for RouteStore {
    fn default() -> Self {
        Self::new(RouteTable::new())
    }
}
