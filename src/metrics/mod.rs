// src/metrics/mod.rs
mod collector;

pub use collector::{BizMemo, MetricsCollector, MetricsRegistry, RelayResult};
