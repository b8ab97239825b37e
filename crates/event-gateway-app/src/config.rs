// File: src/config.rs
//
// Process-level configuration assembled from the environment

use event_gateway_core::config::{env_utils, GatewayConfig, QueryMonitorConfig};
use event_gateway_core::error::GatewayResult;

/// Everything the binary needs, validated before anything starts.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub redis_url: String,
    pub pool_size: u32,
    pub gateway: GatewayConfig,
    /// Stream the unit-position processor consumes.
    pub positions_stream: String,
    /// Stream the unit-status processor consumes.
    pub statuses_stream: String,
    /// Present only when a query log path is configured; the metrics
    /// core stays off otherwise.
    pub query_monitor: Option<QueryMonitorConfig>,
}

impl AppConfig {
    pub fn from_env() -> GatewayResult<Self> {
        let query_monitor = if std::env::var("QUERY_LOG_FILE_PATH").is_ok() {
            Some(QueryMonitorConfig::from_env()?)
        } else {
            None
        };

        Ok(Self {
            database_url: env_utils::required("DATABASE_URL")?,
            redis_url: env_utils::or_default("REDIS_URL", "redis://127.0.0.1:6379".to_string())?,
            pool_size: env_utils::or_default("DATABASE_POOL_SIZE", 10)?,
            gateway: GatewayConfig::from_env()?,
            positions_stream: env_utils::or_default(
                "STREAM_UNIT_POSITIONS",
                "stream-unit-positions".to_string(),
            )?,
            statuses_stream: env_utils::or_default(
                "STREAM_UNIT_STATUSES",
                "stream-unit-statuses".to_string(),
            )?,
            query_monitor,
        })
    }
}

/// Name this instance presents as its stream-bus consumer.
pub fn consumer_name() -> String {
    std::env::var("HOSTNAME")
        .ok()
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| format!("consumer-{}", uuid::Uuid::new_v4().simple()))
}
