use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use datafile_collector::api::{self, state::AppState};
use datafile_collector::collect::{ClientFactory, ConnectionManager};
use datafile_collector::config::Config;
use datafile_collector::messaging::MessageRouterSource;
use datafile_collector::observability::Counters;
use datafile_collector::publish::{PublishedFileCache, Publisher};
use datafile_collector::worker::{JobRunner, Scheduler};
use tokio::net::TcpListener;
use tracing::{info, warn};

type AnyError = Box<dyn std::error::Error + Send + Sync + 'static>;

pub async fn run(address: Option<SocketAddr>, idle: bool) -> Result<(), AnyError> {
    info!("Loading configuration");
    let config = Config::load().map_err(|e| format!("Failed to load config: {}", e))?;
    let address = address.unwrap_or(config.server.bind_addr);

    let scheduler = Arc::new(build_scheduler(&config)?);
    if !idle {
        scheduler.start();
    }

    let app = api::router(AppState::new(Arc::clone(&scheduler)));
    let listener = TcpListener::bind(address).await?;
    info!(%address, "Datafile collector listening");

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    let outcome = scheduler.stop().await;
    info!(cancelled_jobs = outcome.cancelled_jobs, "Collector shut down");
    Ok(())
}

fn build_scheduler(config: &Config) -> Result<Scheduler, AnyError> {
    let counters = Arc::new(Counters::new());
    let cache = Arc::new(PublishedFileCache::new(
        config.collector.published_cache_capacity,
    ));
    let connections = Arc::new(ConnectionManager::new(config.http.pool_size));

    let factory = ClientFactory::new(config.collect_settings(), connections)?;
    let publisher = Publisher::new(config.publish_config()?, cache, Arc::clone(&counters))?;
    let runner = JobRunner::new(
        Arc::new(factory),
        Arc::new(publisher),
        counters,
        config.collector.collected_files_path.clone(),
    );

    let source = MessageRouterSource::new(
        config.event_source_url()?,
        Duration::from_millis(config.event_source.request_timeout_ms),
    )?;

    Ok(Scheduler::new(
        config.collector.scheduler(),
        Arc::new(runner),
        Arc::new(source),
    ))
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
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
