// src/pool/mod.rs
mod pool;
mod target;

pub use pool::TargetPool;
pub use target::{service_identity, Target, MAX_EFFECTIVE_WEIGHT};
