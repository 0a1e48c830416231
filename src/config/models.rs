// src/config/models.rs
use anyhow::{bail, Result};
use hyper::Method;
use serde::Deserialize;
use std::net::SocketAddr;
use std::time::Duration;
use url::Url;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default = "default_listen")]
    pub listen: SocketAddr,

    #[serde(default)]
    pub metrics: MetricsConfig,

    #[serde(default)]
    pub relay: RelayConfig,

    pub rules: Vec<RuleConfig>,
}

impl Config {
    pub fn validate(&self) -> Result<()> {
        if self.rules.is_empty() {
            bail!("at least one forwarding rule is required");
        }
        for rule in &self.rules {
            if !rule.path.starts_with('/') {
                bail!("rule '{}': path must start with '/'", rule.service);
            }
            if let Some(method) = &rule.method {
                if Method::from_bytes(method.as_bytes()).is_err() {
                    bail!("rule '{}': invalid method '{}'", rule.service, method);
                }
            }
            if rule.targets.is_empty() {
                bail!("rule '{}': at least one target is required", rule.service);
            }
            for target in &rule.targets {
                if target.weight < 1 || target.weight > 1000 {
                    bail!(
                        "rule '{}': target {} weight must be in 1..=1000",
                        rule.service,
                        target.url
                    );
                }
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_metrics_port")]
    pub port: u16,

    #[serde(default = "default_metrics_path")]
    pub path: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            port: default_metrics_port(),
            path: default_metrics_path(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RelayConfig {
    /// Fixed recovery period for the one-shot down-flag reset, in seconds.
    #[serde(default = "default_recovery_secs")]
    pub recovery_secs: u64,

    /// High-water mark for retained inbound body bytes.
    #[serde(default = "default_buffer_high_water")]
    pub buffer_high_water: usize,
}

impl RelayConfig {
    pub fn recovery_period(&self) -> Duration {
        Duration::from_secs(self.recovery_secs)
    }
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            recovery_secs: default_recovery_secs(),
            buffer_high_water: default_buffer_high_water(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RuleConfig {
    /// Service name, used as the telemetry label for this rule.
    pub service: String,

    #[serde(default)]
    pub method: Option<String>,

    /// Path prefix this rule claims.
    pub path: String,

    /// Routing-table priority level; lower levels are consulted first.
    #[serde(default = "default_priority")]
    pub priority: i32,

    #[serde(default)]
    pub disable_buffer_release: bool,

    pub targets: Vec<TargetConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TargetConfig {
    pub url: Url,

    #[serde(default = "default_weight")]
    pub weight: i32,
}

fn default_listen() -> SocketAddr {
    "0.0.0.0:8080".parse().unwrap()
}

fn default_metrics_port() -> u16 {
    9090
}

fn default_metrics_path() -> String {
    "/metrics".to_string()
}

fn default_recovery_secs() -> u64 {
    20
}

fn default_buffer_high_water() -> usize {
    8 * 1024
}

fn default_priority() -> i32 {
    1
}

fn default_weight() -> i32 {
    1
}
