// src/reactor/trade.rs
use arc_swap::ArcSwap;
use hyper::body::Bytes;
use hyper::header;
use hyper::http::request::Parts;
use hyper::{Body, HeaderMap, Request, Version};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use std::time::{Duration, Instant};
use tracing::debug;
use uuid::Uuid;

/// High-water mark for retained inbound body bytes.
pub const MAX_RETAINED_SIZE: usize = 8 * 1024;

/// Connection-persistence semantics of a message head.
pub(crate) fn is_keep_alive(version: Version, headers: &HeaderMap) -> bool {
    let connection = headers
        .get(header::CONNECTION)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.to_ascii_lowercase())
        .unwrap_or_default();
    match version {
        Version::HTTP_10 => connection.contains("keep-alive"),
        _ => !connection.contains("close"),
    }
}

/// One inbound/outbound exchange.
///
/// The inbound request is buffered once at entry so every reactor in the
/// chain can replay it without re-reading the wire. Halt hooks run exactly
/// once, on explicit halt or on drop, so an exchange torn down early (client
/// went away, the response future was dropped) still releases what it holds.
pub struct Trade {
    id: Uuid,
    parts: Parts,
    body: ArcSwap<Bytes>,
    inbound_bytes: u64,
    outbound_bytes: AtomicU64,

    keep_alive: OnceLock<bool>,
    outbound_done: AtomicBool,
    halted: AtomicBool,
    halt_hooks: Mutex<Vec<Box<dyn FnOnce() + Send>>>,
    started: Instant,
}

impl Trade {
    /// Read the inbound request off the wire and buffer it for replay.
    pub async fn buffer(request: Request<Body>) -> Result<Self, hyper::Error> {
        let (parts, body) = request.into_parts();
        let bytes = hyper::body::to_bytes(body).await?;
        let inbound_bytes = bytes.len() as u64;
        Ok(Self {
            id: Uuid::new_v4(),
            parts,
            body: ArcSwap::from_pointee(bytes),
            inbound_bytes,
            outbound_bytes: AtomicU64::new(0),
            keep_alive: OnceLock::new(),
            outbound_done: AtomicBool::new(false),
            halted: AtomicBool::new(false),
            halt_hooks: Mutex::new(Vec::new()),
            started: Instant::now(),
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn parts(&self) -> &Parts {
        &self.parts
    }

    pub fn method(&self) -> &hyper::Method {
        &self.parts.method
    }

    pub fn uri(&self) -> &hyper::Uri {
        &self.parts.uri
    }

    pub fn path(&self) -> &str {
        crate::rule::path_of(&self.parts.uri)
    }

    /// A cheap replayable copy of the buffered inbound body.
    pub fn replay_body(&self) -> Bytes {
        (*self.body.load_full()).clone()
    }

    pub fn inbound_bytes(&self) -> u64 {
        self.inbound_bytes
    }

    pub fn add_outbound_bytes(&self, n: u64) {
        self.outbound_bytes.fetch_add(n, Ordering::Relaxed);
    }

    pub fn outbound_bytes(&self) -> u64 {
        self.outbound_bytes.load(Ordering::Relaxed)
    }

    /// Whether the client asked for a persistent connection.
    ///
    /// Decided once per exchange on first read; replays keep the answer even
    /// if the head is inspected again later.
    pub fn client_keep_alive(&self) -> bool {
        *self
            .keep_alive
            .get_or_init(|| is_keep_alive(self.parts.version, &self.parts.headers))
    }

    pub fn has_outbound(&self) -> bool {
        self.outbound_done.load(Ordering::SeqCst)
    }

    pub fn mark_outbound(&self) {
        self.outbound_done.store(true, Ordering::SeqCst);
    }

    /// Release retained inbound bytes above the high-water mark once they
    /// have been flushed upstream and replay is no longer needed.
    pub fn release_buffered(&self, high_water: usize) {
        let retained = self.body.load().len();
        if retained > high_water {
            debug!(trade = %self.id, retained, high_water, "releasing buffered inbound body");
            self.body.store(Arc::new(Bytes::new()));
        }
    }

    /// Register a completion hook. Runs exactly once: at explicit `halt()`,
    /// or on drop if the exchange ends early. Registering on an already
    /// halted trade runs the hook immediately.
    pub fn do_on_halt<F>(&self, hook: F)
    where
        F: FnOnce() + Send + 'static,
    {
        if self.halted.load(Ordering::SeqCst) {
            hook();
            return;
        }
        self.halt_hooks.lock().unwrap().push(Box::new(hook));
    }

    pub fn halt(&self) {
        if self.halted.swap(true, Ordering::SeqCst) {
            return;
        }
        let hooks = std::mem::take(&mut *self.halt_hooks.lock().unwrap());
        for hook in hooks {
            hook();
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }
}

impl Drop for Trade {
    fn drop(&mut self) {
        self.halt();
    }
}
