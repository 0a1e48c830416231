// src/rule/mod.rs
mod matcher;

pub use matcher::{path_of, MatchRule, RoutingInfo};
