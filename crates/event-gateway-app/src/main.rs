// File: src/main.rs
//
// Service binary: wire the three cores together and run until signalled

mod config;
mod handlers;

use std::sync::Arc;
use std::time::Duration;

use diesel::r2d2::{ConnectionManager, Pool};
use diesel::PgConnection;
use dotenvy::dotenv;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

use event_gateway_broker::fleet::ListenerFleet;
use event_gateway_core::error::{GatewayError, GatewayResult};
use event_gateway_core::handler::{EventHandler, HandlerRegistry};
use event_gateway_core::retry::RetryPolicy;
use event_gateway_ingest::pipeline::GatewayPipeline;
use event_gateway_ingest::publisher::StreamPublisher;
use event_gateway_ingest::store::RawEventStore;
use event_gateway_metrics::aggregator::QueryAggregator;
use event_gateway_metrics::position::RedisPositionStore;
use event_gateway_metrics::tailer::LogTailer;
use event_gateway_streams::enrichment::{CachedUnitLookup, DieselUnitLookup};
use event_gateway_streams::orchestrator::{StreamOrchestrator, StreamProcessor};
use event_gateway_streams::processors::{UnitPositionProcessor, UnitStatusProcessor};
use event_gateway_streams::template::ProcessorTemplate;

use crate::config::AppConfig;
use crate::handlers::{DefaultEventHandler, UnitPositionHandler};

#[tokio::main]
async fn main() {
    dotenv().ok();
    init_tracing();

    if let Err(error) = run().await {
        tracing::error!(error = %error, "fatal startup error");
        std::process::exit(1);
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if std::env::var("LOG_FORMAT").as_deref() == Ok("json") {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn run() -> GatewayResult<()> {
    let config = AppConfig::from_env()?;
    tracing::info!(
        addresses = config.gateway.addresses.len(),
        multicast = config.gateway.is_multicast(),
        concurrency = %config.gateway.concurrency,
        query_monitor = config.query_monitor.is_some(),
        "event gateway starting"
    );

    // Shared infrastructure
    let pool = Arc::new(
        Pool::builder()
            .max_size(config.pool_size)
            .build(ConnectionManager::<PgConnection>::new(&config.database_url))
            .map_err(|e| GatewayError::configuration(format!("database pool: {}", e)))?,
    );
    let redis_client = redis::Client::open(config.redis_url.as_str())
        .map_err(|e| GatewayError::configuration(format!("redis client: {}", e)))?;
    let redis = redis::aio::ConnectionManager::new(redis_client).await?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // Gateway core: store, handlers, pipeline, fleet
    let store = Arc::new(RawEventStore::new(Arc::clone(&pool)));
    let publisher = Arc::new(StreamPublisher::new(redis.clone()));
    let position_addresses: Vec<String> = config
        .gateway
        .addresses
        .iter()
        .filter(|address| address.to_lowercase().contains("position"))
        .cloned()
        .collect();
    let mut handlers: Vec<Arc<dyn EventHandler>> = Vec::new();
    if !position_addresses.is_empty() {
        handlers.push(Arc::new(UnitPositionHandler::for_addresses(position_addresses)));
    }
    handlers.push(Arc::new(DefaultEventHandler));
    let registry = Arc::new(HandlerRegistry::new(handlers)?);
    let retry = Arc::new(RetryPolicy::new(
        config.gateway.retry_attempts,
        config.gateway.retry_delay_ms,
    ));
    let pipeline = Arc::new(GatewayPipeline::new(
        store,
        registry,
        publisher,
        config.gateway.stream_mapping.clone(),
        retry,
        shutdown_rx.clone(),
    ));
    pipeline.set_ack_disabled(config.gateway.ack_disabled);
    if config.gateway.ack_disabled {
        tracing::warn!("acknowledge-disabled mode is on; broker messages will be redelivered indefinitely");
    }

    let fleet = Arc::new(ListenerFleet::new(config.gateway.clone(), pipeline.clone()));
    fleet.start_all().await?;

    // Stream core: processors bound to consumer groups
    let lookup = Arc::new(CachedUnitLookup::new(Arc::new(DieselUnitLookup::new(
        Arc::clone(&pool),
    ))));
    let processors: Vec<Arc<dyn StreamProcessor>> = vec![
        Arc::new(ProcessorTemplate::new(
            UnitPositionProcessor::new(Arc::clone(&pool), config.positions_stream.clone()),
            lookup.clone(),
        )),
        Arc::new(ProcessorTemplate::new(
            UnitStatusProcessor::new(Arc::clone(&pool), config.statuses_stream.clone()),
            lookup,
        )),
    ];
    let orchestrator = StreamOrchestrator::new(
        redis.clone(),
        config::consumer_name(),
        processors,
        shutdown_rx.clone(),
    );
    let processor_handles = orchestrator.start().await?;

    // Query-metrics core, only when a log path is configured
    let tailer_handle = match &config.query_monitor {
        Some(monitor) => {
            let aggregator = Arc::new(QueryAggregator::new(
                redis.clone(),
                monitor.ttl,
                monitor.max_samples,
            ));
            let positions = Arc::new(RedisPositionStore::new(redis.clone()));
            let tailer = Arc::new(LogTailer::new(
                monitor.log_file_path.clone(),
                monitor.poll_interval,
                positions,
                aggregator,
            ));
            Some(tailer.spawn(shutdown_rx.clone()))
        }
        None => None,
    };

    tracing::info!("event gateway running");
    tokio::signal::ctrl_c()
        .await
        .map_err(|e| GatewayError::transport(format!("signal handler: {}", e)))?;
    tracing::info!("shutdown signal received");

    let _ = shutdown_tx.send(true);
    fleet.stop_all().await;
    for handle in processor_handles {
        let _ = handle.await;
    }
    if let Some(handle) = tailer_handle {
        // The tailer suspends only between polls; give it its 5 seconds
        if tokio::time::timeout(Duration::from_secs(5), handle).await.is_err() {
            tracing::warn!("log tailer did not stop within its grace period");
        }
    }
    tracing::info!("event gateway stopped");
    Ok(())
}
