// src/reactor/forward.rs
// Match -> select target -> forward -> classify outcome.
use super::trade::{is_keep_alive, Trade};
use super::{RelayError, TradeReactor};
use crate::health::{RecoveryTimer, ServiceMemo};
use crate::metrics::{MetricsCollector, RelayResult};
use crate::pool::{Target, TargetPool};
use crate::rule::{MatchRule, RoutingInfo};
use async_trait::async_trait;
use hyper::body::Bytes;
use hyper::client::HttpConnector;
use hyper::header::{self, HeaderValue};
use hyper::http::response;
use hyper::{Body, Client, Request, Response, StatusCode};
use hyper_tls::HttpsConnector;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn, Instrument};

pub type HttpClient = Client<HttpsConnector<HttpConnector>>;

/// Shared upstream client. The connector decides connection features per
/// target scheme (plain or TLS); pooling and reuse live inside the client.
pub fn http_client() -> HttpClient {
    Client::builder().build::<_, Body>(HttpsConnector::new())
}

/// Retention policy for the trade's buffered inbound body after it has been
/// flushed upstream.
#[derive(Debug, Clone)]
pub struct BufferPolicy {
    pub disable_release: bool,
    pub high_water: usize,
}

impl Default for BufferPolicy {
    fn default() -> Self {
        Self {
            disable_release: false,
            high_water: super::MAX_RETAINED_SIZE,
        }
    }
}

/// One routing rule's forwarding behavior: evaluate the match rule, pick an
/// active target, relay the exchange and react to the outcome.
pub struct ForwardReactor {
    service: String,
    rule: MatchRule,
    pool: TargetPool,
    memo: Arc<ServiceMemo>,
    recovery: RecoveryTimer,
    client: HttpClient,
    metrics: Arc<MetricsCollector>,
    buffer: BufferPolicy,
}

impl ForwardReactor {
    pub fn new(
        service: impl Into<String>,
        rule: MatchRule,
        pool: TargetPool,
        memo: Arc<ServiceMemo>,
        recovery: RecoveryTimer,
        client: HttpClient,
        metrics: Arc<MetricsCollector>,
        buffer: BufferPolicy,
    ) -> Self {
        Self {
            service: service.into(),
            rule,
            pool,
            memo,
            recovery,
            client,
            metrics,
            buffer,
        }
    }

    pub fn pool(&self) -> &TargetPool {
        &self.pool
    }

    async fn forward(
        &self,
        trade: &Trade,
        target: Arc<Target>,
    ) -> Result<Option<Response<Body>>, RelayError> {
        let operation = self.rule.operation_name(trade.uri()).to_string();
        let span = tracing::info_span!(
            "relay",
            service = %self.service,
            operation = %operation,
            target = %target.url,
            method = %trade.method(),
            trade = %trade.id(),
        );

        async {
            let info = RoutingInfo::of(trade.method(), trade.uri());
            let started = Instant::now();

            let upstream_body = trade.replay_body();
            let request_bytes = upstream_body.len();
            let request = self.upstream_request(trade, &target, upstream_body)?;

            match self.client.request(request).await {
                Err(err) if err.is_connect() => {
                    // Connect failures condemn the whole service, for every
                    // rule that routes to this upstream identity.
                    self.memo.mark_down(&target.id, true);
                    self.metrics.record_down_mark(&self.service, "service");
                    warn!(upstream = %target.id, %err, "COMMUNICATION_FAILURE, marking service down");

                    let memo = Arc::clone(&self.memo);
                    let identity = target.id.clone();
                    let period = self.recovery.period().as_secs();
                    self.recovery.schedule(move || {
                        memo.mark_down(&identity, false);
                        info!(
                            upstream = %identity,
                            period_secs = period,
                            "reset service down flag after communication failure"
                        );
                    });

                    self.metrics.biz.inc_biz_result(
                        &self.service,
                        &info,
                        RelayResult::ConnectFailure,
                        started.elapsed(),
                    );
                    Err(RelayError::UpstreamUnreachable(err.to_string()))
                }
                Err(err) => Err(RelayError::Exchange(err)),
                Ok(response) => {
                    let status = response.status();

                    if status == StatusCode::NOT_FOUND {
                        // Request-URI unknown to this target service; let a
                        // later reactor try.
                        info!(target = %target.url, "API_NOT_SUPPORTED, passing trade to next reactor");
                        return Ok(None);
                    }

                    if status.is_server_error() {
                        self.on_server_error(&target, status);
                        self.metrics.biz.inc_biz_result(
                            &self.service,
                            &info,
                            RelayResult::RelayFailure,
                            started.elapsed(),
                        );
                        return Err(RelayError::UpstreamServerError(status));
                    }

                    // Success: buffer the upstream response once, so it can
                    // be observed for bookkeeping and replayed downstream
                    // without re-issuing the upstream call.
                    let (parts, body) = response.into_parts();
                    let body = hyper::body::to_bytes(body).await?;
                    let elapsed = started.elapsed();

                    self.metrics
                        .record_relay(&operation, elapsed, body.len(), request_bytes);
                    self.metrics.biz.inc_biz_result(
                        &self.service,
                        &info,
                        RelayResult::RelaySuccess,
                        elapsed,
                    );
                    trade.add_outbound_bytes(body.len() as u64);

                    let service = self.service.clone();
                    let upstream = target.url.to_string();
                    let trade_id = trade.id();
                    let request_total = trade.inbound_bytes();
                    let response_total = body.len() as u64;
                    trade.do_on_halt(move || {
                        info!(
                            trade = %trade_id,
                            service = %service,
                            forward_to = %upstream,
                            cost_secs = started.elapsed().as_secs_f32(),
                            request_bytes = request_total,
                            response_bytes = response_total,
                            "FORWARD_SUCCESS"
                        );
                    });

                    if self.buffer.disable_release {
                        debug!(rule = %self.rule, "buffer release disabled for this rule");
                    } else {
                        trade.release_buffered(self.buffer.high_water);
                    }

                    Ok(Some(self.sendback_response(trade, parts, body)))
                }
            }
        }
        .instrument(span)
        .await
    }

    fn on_server_error(&self, target: &Arc<Target>, status: StatusCode) {
        // Local scope only: this rule stops selecting the target, other
        // rules keep it.
        target.mark_api_down(true);
        self.metrics.record_down_mark(&self.service, "api");
        warn!(
            target = %target.url,
            %status,
            rule = %self.rule,
            "SERVER_ERROR, marking matched apis down"
        );

        let peer = Arc::clone(target);
        let rule = self.rule.summary();
        let period = self.recovery.period().as_secs();
        self.recovery.schedule(move || {
            peer.mark_api_down(false);
            info!(
                target = %peer.url,
                rule = %rule,
                period_secs = period,
                "reset api down flag after server error"
            );
        });
    }

    /// Build the upstream-bound request copy: original head and replayed
    /// body, with persistence forced when the client did not ask for it so
    /// the upstream connection can be pooled either way.
    fn upstream_request(
        &self,
        trade: &Trade,
        target: &Target,
        body: Bytes,
    ) -> Result<Request<Body>, RelayError> {
        let path_and_query = trade
            .uri()
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or("/");
        let uri: hyper::Uri = format!(
            "{}{}",
            target.url.as_str().trim_end_matches('/'),
            path_and_query
        )
        .parse()
        .map_err(|err: hyper::http::uri::InvalidUri| {
            RelayError::BadTarget(target.url.to_string(), err.to_string())
        })?;

        let mut request = Request::builder()
            .method(trade.method().clone())
            .uri(uri)
            .body(Body::from(body))?;
        *request.headers_mut() = trade.parts().headers.clone();

        if !trade.client_keep_alive() {
            request
                .headers_mut()
                .insert(header::CONNECTION, HeaderValue::from_static("keep-alive"));
            debug!("forcing keep-alive on upstream request");
        }
        Ok(request)
    }

    /// Build the client-bound response copy: if the client did not ask for
    /// persistence it observes a closing response, whatever the upstream
    /// answered.
    fn sendback_response(
        &self,
        trade: &Trade,
        mut parts: response::Parts,
        body: Bytes,
    ) -> Response<Body> {
        if !trade.client_keep_alive() && is_keep_alive(parts.version, &parts.headers) {
            parts
                .headers
                .insert(header::CONNECTION, HeaderValue::from_static("close"));
            debug!("forcing close on sendback response");
        }
        Response::from_parts(parts, Body::from(body))
    }
}

#[async_trait]
impl TradeReactor for ForwardReactor {
    fn name(&self) -> &str {
        &self.service
    }

    async fn react(&self, trade: &Trade) -> Result<Option<Response<Body>>, RelayError> {
        if trade.has_outbound() {
            return Ok(None);
        }
        if !self.rule.matches(trade.method(), trade.uri()) {
            return Ok(None);
        }

        let Some(target) = self.pool.select_active_target() else {
            warn!(
                service = %self.service,
                trade = %trade.id(),
                rule = %self.rule,
                "NONE_TARGET to forward"
            );
            self.metrics.record_no_target(&self.service);
            return Ok(None);
        };

        debug!(service = %self.service, target = %target.url, trade = %trade.id(), "forwarding");
        self.forward(trade, target).await
    }
}
