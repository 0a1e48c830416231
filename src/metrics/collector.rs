// src/metrics/collector.rs
use crate::rule::RoutingInfo;
use anyhow::Result;
use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGauge, Opts, Registry, TextEncoder,
};
use std::sync::Arc;
use std::time::Duration;

pub struct MetricsRegistry {
    registry: Registry,
    collector: Arc<MetricsCollector>,
}

impl MetricsRegistry {
    pub fn new() -> Result<Self> {
        let registry = Registry::new();
        let collector = Arc::new(MetricsCollector::new(&registry)?);

        Ok(Self {
            registry,
            collector,
        })
    }

    pub fn collector(&self) -> Arc<MetricsCollector> {
        self.collector.clone()
    }

    pub fn gather(&self) -> Vec<u8> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer).unwrap();
        buffer
    }
}

/// Business outcome of one forwarded request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayResult {
    RelaySuccess,
    RelayFailure,
    ConnectFailure,
}

impl RelayResult {
    fn as_str(&self) -> &'static str {
        match self {
            RelayResult::RelaySuccess => "relay_success",
            RelayResult::RelayFailure => "relay_failure",
            RelayResult::ConnectFailure => "connect_failure",
        }
    }
}

/// Business-outcome recorder: (service, routing info, outcome, elapsed)
/// tuples per forwarded request. Fire-and-forget, never blocking.
pub struct BizMemo {
    results_total: IntCounterVec,
    result_duration_seconds: HistogramVec,
}

impl BizMemo {
    fn new(registry: &Registry) -> Result<Self> {
        let results_total = IntCounterVec::new(
            Opts::new("gw_biz_results_total", "Business outcomes per relay"),
            &["service", "method", "path", "result"],
        )?;
        registry.register(Box::new(results_total.clone()))?;

        let result_duration_seconds = HistogramVec::new(
            HistogramOpts::new(
                "gw_biz_result_duration_seconds",
                "Relay duration grouped by business outcome",
            ),
            &["service", "result"],
        )?;
        registry.register(Box::new(result_duration_seconds.clone()))?;

        Ok(Self {
            results_total,
            result_duration_seconds,
        })
    }

    pub fn inc_biz_result(
        &self,
        service: &str,
        info: &RoutingInfo,
        result: RelayResult,
        elapsed: Duration,
    ) {
        self.results_total
            .with_label_values(&[service, &info.method, &info.path, result.as_str()])
            .inc();
        self.result_duration_seconds
            .with_label_values(&[service, result.as_str()])
            .observe(elapsed.as_secs_f64());
    }
}

pub struct MetricsCollector {
    // Gateway-level request metrics
    pub requests_total: IntCounterVec,
    pub request_duration_seconds: HistogramVec,

    // Per-operation relay metrics
    pub relay_duration_seconds: HistogramVec,
    pub upstream_inbound_bytes: HistogramVec,
    pub upstream_outbound_bytes: HistogramVec,

    // Selection / circuit state
    pub no_target_total: IntCounterVec,
    pub target_down_total: IntCounterVec,

    // System metrics
    pub active_exchanges: IntGauge,

    pub biz: BizMemo,
}

impl MetricsCollector {
    pub fn new(registry: &Registry) -> Result<Self> {
        let requests_total = IntCounterVec::new(
            Opts::new("gw_requests_total", "Total number of inbound requests"),
            &["method", "status_code"],
        )?;
        registry.register(Box::new(requests_total.clone()))?;

        let request_duration_seconds = HistogramVec::new(
            HistogramOpts::new(
                "gw_request_duration_seconds",
                "Inbound request duration in seconds",
            ),
            &["method", "status_code"],
        )?;
        registry.register(Box::new(request_duration_seconds.clone()))?;

        let relay_duration_seconds = HistogramVec::new(
            HistogramOpts::new(
                "gw_relay_duration_seconds",
                "Upstream exchange duration in seconds",
            ),
            &["operation"],
        )?;
        registry.register(Box::new(relay_duration_seconds.clone()))?;

        let upstream_inbound_bytes = HistogramVec::new(
            HistogramOpts::new(
                "gw_upstream_inbound_bytes",
                "Bytes received from upstream per exchange",
            ),
            &["operation"],
        )?;
        registry.register(Box::new(upstream_inbound_bytes.clone()))?;

        let upstream_outbound_bytes = HistogramVec::new(
            HistogramOpts::new(
                "gw_upstream_outbound_bytes",
                "Bytes sent to upstream per exchange",
            ),
            &["operation"],
        )?;
        registry.register(Box::new(upstream_outbound_bytes.clone()))?;

        let no_target_total = IntCounterVec::new(
            Opts::new(
                "gw_no_target_total",
                "Matched requests that found no active target",
            ),
            &["service"],
        )?;
        registry.register(Box::new(no_target_total.clone()))?;

        let target_down_total = IntCounterVec::new(
            Opts::new(
                "gw_target_down_total",
                "Down-markings by scope (api or service)",
            ),
            &["service", "scope"],
        )?;
        registry.register(Box::new(target_down_total.clone()))?;

        let active_exchanges =
            IntGauge::new("gw_active_exchanges", "Exchanges currently in flight")?;
        registry.register(Box::new(active_exchanges.clone()))?;

        let biz = BizMemo::new(registry)?;

        Ok(Self {
            requests_total,
            request_duration_seconds,
            relay_duration_seconds,
            upstream_inbound_bytes,
            upstream_outbound_bytes,
            no_target_total,
            target_down_total,
            active_exchanges,
            biz,
        })
    }

    pub fn record_request(&self, method: &str, status_code: u16, duration: Duration) {
        let status = status_code.to_string();
        self.requests_total
            .with_label_values(&[method, &status])
            .inc();
        self.request_duration_seconds
            .with_label_values(&[method, &status])
            .observe(duration.as_secs_f64());
    }

    pub fn record_relay(
        &self,
        operation: &str,
        duration: Duration,
        inbound_bytes: usize,
        outbound_bytes: usize,
    ) {
        self.relay_duration_seconds
            .with_label_values(&[operation])
            .observe(duration.as_secs_f64());
        self.upstream_inbound_bytes
            .with_label_values(&[operation])
            .observe(inbound_bytes as f64);
        self.upstream_outbound_bytes
            .with_label_values(&[operation])
            .observe(outbound_bytes as f64);
    }

    pub fn record_no_target(&self, service: &str) {
        self.no_target_total.with_label_values(&[service]).inc();
    }

    pub fn record_down_mark(&self, service: &str, scope: &str) {
        self.target_down_total
            .with_label_values(&[service, scope])
            .inc();
    }
}
