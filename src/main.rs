// src/main.rs
use anyhow::{Context, Result};
use healthd::{
    config::{self, Config, StoreConfig},
    metrics::MetricsRegistry,
    orchestrator::Orchestrator,
    registry::CheckerRegistry,
    scheduler::Scheduler,
    server::{HealthHandler, ServerBuilder},
    store::{CacheStore, FileStore, MemoryStore},
};
use hyper::{Body, Request, Response, Server, StatusCode};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("healthd=debug".parse()?)
                .add_directive("hyper=info".parse()?),
        )
        .init();

    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config.yaml".to_string());

    info!("Loading configuration from: {}", config_path);
    let config = config::load_config(&config_path).await?;

    let metrics_registry = MetricsRegistry::new()?;
    let metrics = metrics_registry.collector();

    let store = open_store(&config).await?;
    let registry = CheckerRegistry::from_config(&config.modules, config.engine.probe_timeout())
        .context("Failed to build health checkers")?;

    let orchestrator = Orchestrator::new(registry, store.clone())
        .with_metrics(metrics.clone())
        .with_probe_timeout(config.engine.probe_timeout())
        .with_max_parallel(config.engine.max_parallel_probes);

    let scheduler = if config.jobs.enabled {
        let scheduler = Arc::new(
            Scheduler::new(orchestrator.clone(), store.clone(), config.jobs.clone())
                .with_metrics(metrics.clone()),
        );
        scheduler.clone().start();
        Some(scheduler)
    } else {
        warn!("Scheduled jobs are disabled; the cache is only refreshed by requests");
        None
    };

    if config.metrics.enabled {
        let metrics_addr: SocketAddr = ([0, 0, 0, 0], config.metrics.port).into();
        start_metrics_server(metrics_addr, metrics_registry, config.metrics.path.clone()).await?;
    }

    info!(
        "Starting health service instance {} on {}",
        config.instance_id, config.server.bind
    );
    ServerBuilder::new(config.server.bind)
        .with_handler(HealthHandler::new(orchestrator))
        .serve_until(shutdown_signal())
        .await?;

    if let Some(scheduler) = scheduler {
        scheduler.shutdown();
    }
    info!("Health service stopped");

    Ok(())
}

async fn open_store(config: &Config) -> Result<Arc<dyn CacheStore>> {
    let store: Arc<dyn CacheStore> = match &config.store {
        StoreConfig::Memory => {
            info!("Using in-memory health cache");
            Arc::new(MemoryStore::new(config.instance_id.clone()))
        }
        StoreConfig::File { path } => {
            info!("Using file health cache at {}", path.display());
            Arc::new(
                FileStore::open(path, config.instance_id.clone())
                    .await
                    .with_context(|| format!("Failed to open cache at {}", path.display()))?,
            )
        }
    };
    Ok(store)
}

async fn start_metrics_server(
    addr: SocketAddr,
    registry: MetricsRegistry,
    path: String,
) -> Result<()> {
    let registry = Arc::new(registry);
    let metrics_path = Arc::new(path);
    let service_path = metrics_path.clone();

    let make_service = hyper::service::make_service_fn(move |_| {
        let registry = registry.clone();
        let path = service_path.clone();

        async move {
            Ok::<_, Infallible>(hyper::service::service_fn(move |req: Request<Body>| {
                let registry = registry.clone();
                let path = path.clone();

                async move {
                    if req.uri().path() != path.as_str() {
                        let mut response = Response::new(Body::from("Not Found"));
                        *response.status_mut() = StatusCode::NOT_FOUND;
                        return Ok::<_, Infallible>(response);
                    }

                    let mut response = Response::new(Body::from(registry.gather()));
                    response.headers_mut().insert(
                        hyper::header::CONTENT_TYPE,
                        hyper::header::HeaderValue::from_static("text/plain; version=0.0.4"),
                    );
                    Ok(response)
                }
            }))
        }
    });

    let server = Server::try_bind(&addr)
        .with_context(|| format!("Failed to bind metrics server on {}", addr))?
        .serve(make_service);

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

// Graceful shutdown handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
