// src/server/handler.rs
use hyper::{Body, Request, Response, StatusCode};
use std::sync::Arc;
use tower::Service;
use tracing::{error, warn};

use crate::metrics::MetricsCollector;
use crate::reactor::{ReactorChain, Trade};

/// Gateway-level caller of the reactor chain.
///
/// Soft exhaustion (no reactor produced an outbound) becomes the default
/// failure response here; hard relay errors are mapped through the
/// error-to-response conversion. Either way the client gets an answer and
/// the connection stays usable.
#[derive(Clone)]
pub struct RequestHandler {
    chain: Arc<ReactorChain>,
    metrics: Arc<MetricsCollector>,
}

impl RequestHandler {
    pub fn new(chain: Arc<ReactorChain>, metrics: Arc<MetricsCollector>) -> Self {
        Self { chain, metrics }
    }
}

impl Service<Request<Body>> for RequestHandler {
    type Response = Response<Body>;
    type Error = Box<dyn std::error::Error + Send + Sync>;
    type Future = futures::future::BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(
        &mut self,
        _cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Result<(), Self::Error>> {
        std::task::Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: Request<Body>) -> Self::Future {
        let chain = self.chain.clone();
        let metrics = self.metrics.clone();

        Box::pin(async move {
            metrics.active_exchanges.inc();
            let method = req.method().clone();

            let result = async {
                let trade = Trade::buffer(req).await.map_err(|e| {
                    error!(%e, "failed to read inbound request");
                    Box::new(e) as Box<dyn std::error::Error + Send + Sync>
                })?;

                let response = match chain.dispatch(&trade).await {
                    Ok(Some(response)) => response,
                    Ok(None) => {
                        warn!(
                            trade = %trade.id(),
                            path = %trade.path(),
                            "no reactor produced an outbound for trade"
                        );
                        Response::builder()
                            .status(StatusCode::SERVICE_UNAVAILABLE)
                            .body(Body::from("no forward rule produced a response"))
                            .unwrap()
                    }
                    Err(err) => {
                        error!(trade = %trade.id(), %err, "relay failed");
                        Response::from(err)
                    }
                };

                metrics.record_request(
                    method.as_str(),
                    response.status().as_u16(),
                    trade.elapsed(),
                );
                trade.halt();
                Ok(response)
            }
            .await;

            metrics.active_exchanges.dec();
            result
        })
    }
}
