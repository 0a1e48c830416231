// src/health/mod.rs
mod memo;
mod recovery;

pub use memo::ServiceMemo;
pub use recovery::{RecoveryTimer, DEFAULT_RECOVERY_PERIOD};
