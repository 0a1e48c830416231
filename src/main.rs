// src/main.rs
use anyhow::{Context, Result};
use hyper::{Body, Method, Request, Response, Server, StatusCode};
use std::collections::BTreeMap;
use std::collections::HashMap;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{error, info};

use rust_gateway::{
    config::{self, Config},
    health::{RecoveryTimer, ServiceMemo},
    metrics::{MetricsCollector, MetricsRegistry},
    pool::{Target, TargetPool},
    reactor::{http_client, BufferPolicy, ForwardReactor, HttpClient, ReactorChain, TradeReactor},
    routing::{RouteDescriptor, RouteStore, RouteTable},
    rule::MatchRule,
    server::{RequestHandler, ServerBuilder},
};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("rust_gateway=debug".parse()?)
                .add_directive("hyper=info".parse()?),
        )
        .init();

    // Load configuration
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config.yaml".to_string());

    info!("Loading configuration from: {}", config_path);
    let config = config::load_config(&config_path).await?;

    // Initialize metrics
    let metrics_registry = MetricsRegistry::new()?;
    let metrics = metrics_registry.collector();

    // Shared health state and the one recovery timer both scopes use
    let memo = Arc::new(ServiceMemo::new());
    let recovery = RecoveryTimer::new(config.relay.recovery_period());
    let client = http_client();

    // Build the routing snapshot off the critical path, install it whole.
    // The external configuration feed replaces it the same way at runtime.
    let store = Arc::new(RouteStore::default());
    store.install(build_route_table(&config));

    let chain = Arc::new(build_chain(
        &config, &store, &memo, &recovery, &client, &metrics,
    )?);

    // Start metrics server if enabled
    if config.metrics.enabled {
        let metrics_addr: SocketAddr = ([0, 0, 0, 0], config.metrics.port).into();
        start_metrics_server(metrics_addr, metrics_registry, config.metrics.path.clone()).await?;
    }

    let handler = RequestHandler::new(chain, metrics);

    info!("Starting gateway on {}", config.listen);
    ServerBuilder::new(config.listen)
        .with_handler(handler)
        .serve()
        .await?;

    Ok(())
}

/// Collect every rule's targets into one leveled snapshot. Rules sharing a
/// target at the same priority merge their descriptor records under one key.
fn build_route_table(config: &Config) -> RouteTable {
    let mut grouped: BTreeMap<(i32, String), Vec<RouteDescriptor>> = BTreeMap::new();
    for rule in &config.rules {
        for target in &rule.targets {
            let descriptor = RouteDescriptor {
                method: rule.method.clone(),
                path: rule.path.clone(),
            };
            grouped
                .entry((rule.priority, target.url.to_string()))
                .or_default()
                .push(descriptor);
        }
    }

    let mut table = RouteTable::new();
    for ((priority, key), descriptors) in grouped {
        table.add_or_update_rule(priority, key, descriptors);
    }
    table
}

/// One forward reactor per configured rule, its pool fed from the installed
/// routing snapshot.
fn build_chain(
    config: &Config,
    store: &RouteStore,
    memo: &Arc<ServiceMemo>,
    recovery: &RecoveryTimer,
    client: &HttpClient,
    metrics: &Arc<MetricsCollector>,
) -> Result<ReactorChain> {
    let mut reactors: Vec<Arc<dyn TradeReactor>> = Vec::new();

    for rule_cfg in &config.rules {
        let method = rule_cfg
            .method
            .as_deref()
            .map(|m| Method::from_bytes(m.as_bytes()))
            .transpose()
            .with_context(|| format!("rule '{}': invalid method", rule_cfg.service))?;
        let rule = MatchRule::new(method, rule_cfg.path.clone());

        let weights: HashMap<String, i32> = rule_cfg
            .targets
            .iter()
            .map(|t| (t.url.to_string(), t.weight))
            .collect();

        let candidates = store.resolve(&rule_cfg.path);
        let targets: Vec<Target> = candidates
            .into_iter()
            .map(|url| {
                let weight = weights.get(url.as_str()).copied().unwrap_or(1);
                Target::with_weight(url, weight)
            })
            .collect();
        let pool = TargetPool::from_targets(targets, Arc::clone(memo));

        info!(
            service = %rule_cfg.service,
            rule = %rule,
            targets = ?pool.status(),
            "configured forward reactor"
        );

        reactors.push(Arc::new(ForwardReactor::new(
            rule_cfg.service.clone(),
            rule,
            pool,
            Arc::clone(memo),
            recovery.clone(),
            client.clone(),
            Arc::clone(metrics),
            BufferPolicy {
                disable_release: rule_cfg.disable_buffer_release,
                high_water: config.relay.buffer_high_water,
            },
        )));
    }

    Ok(ReactorChain::new(reactors))
}

async fn start_metrics_server(
    addr: SocketAddr,
    registry: MetricsRegistry,
    path: String,
) -> Result<()> {
    let registry = Arc::new(registry);
    let metrics_path = Arc::new(path); // keep this for logging
    let service_path = metrics_path.clone(); // clone for the service closure

    let make_service = hyper::service::make_service_fn(move |_| {
        let registry = registry.clone();
        let path = service_path.clone();

        async move {
            Ok::<_, Infallible>(hyper::service::service_fn(move |req: Request<Body>| {
                let registry = registry.clone();
                let path = path.clone();

                async move {
                    if req.uri().path() == path.as_str() {
                        let metrics = registry.gather();
                        Ok::<_, Infallible>(
                            Response::builder()
                                .status(StatusCode::OK)
                                .header("Content-Type", "text/plain; version=0.0.4")
                                .body(Body::from(metrics))
                                .unwrap(),
                        )
                    } else {
                        Ok::<_, Infallible>(
                            Response::builder()
                                .status(StatusCode::NOT_FOUND)
                                .body(Body::from("Not Found"))
                                .unwrap(),
                        )
                    }
                }
            }))
        }
    });

    let server = Server::bind(&addr).serve(make_service);

    info!(
        "Metrics server listening on http://{}{}",
        addr,
        metrics_path.as_str()
    );

    tokio::spawn(async move {
        if let Err(e) = server.await {
            error!("Metrics server error: {}", e);
        }
    });

    Ok(())
}
