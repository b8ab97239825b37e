// File: src/config/mod.rs
//
// Typed runtime configuration for the gateway, broker, and metrics cores

pub mod env_utils;

use std::collections::HashMap;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{GatewayError, GatewayResult};

/// Listener concurrency expressed as a `"min-max"` range, e.g. `"3-10"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConcurrencyRange {
    pub min: u32,
    pub max: u32,
}

impl ConcurrencyRange {
    pub fn new(min: u32, max: u32) -> GatewayResult<Self> {
        if min == 0 || max < min {
            return Err(GatewayError::configuration(format!(
                "invalid concurrency range {}-{}: min must be >= 1 and max >= min",
                min, max
            )));
        }
        Ok(Self { min, max })
    }
}

impl FromStr for ConcurrencyRange {
    type Err = GatewayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (min, max) = s
            .split_once('-')
            .ok_or_else(|| GatewayError::configuration(format!("concurrency '{}' is not of the form min-max", s)))?;
        let parse = |part: &str| {
            part.trim()
                .parse::<u32>()
                .map_err(|e| GatewayError::configuration(format!("concurrency '{}': {}", s, e)))
        };
        Self::new(parse(min)?, parse(max)?)
    }
}

impl std::fmt::Display for ConcurrencyRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}", self.min, self.max)
    }
}

/// Broker connection and reconnection tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtemisConfig {
    pub host: String,
    pub port: u16,
    pub user: Option<String>,
    pub password: Option<String>,
    /// Initial reconnect backoff.
    pub retry_interval: Duration,
    pub retry_multiplier: f64,
    pub max_retry_interval: Duration,
    /// Negative means retry forever.
    pub reconnect_attempts: i32,
    pub failure_check_period: Duration,
    pub connection_ttl: Duration,
    pub recovery_interval: Duration,
}

impl Default for ArtemisConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 61613,
            user: None,
            password: None,
            retry_interval: Duration::from_millis(500),
            retry_multiplier: 2.0,
            max_retry_interval: Duration::from_millis(30_000),
            reconnect_attempts: -1,
            failure_check_period: Duration::from_millis(30_000),
            connection_ttl: Duration::from_millis(60_000),
            recovery_interval: Duration::from_millis(5_000),
        }
    }
}

impl ArtemisConfig {
    pub fn from_env() -> GatewayResult<Self> {
        let defaults = Self::default();
        Ok(Self {
            host: env_utils::or_default("ARTEMIS_HOST", defaults.host)?,
            port: env_utils::or_default("ARTEMIS_PORT", defaults.port)?,
            user: env_utils::optional("ARTEMIS_USER")?,
            password: env_utils::optional("ARTEMIS_PASSWORD")?,
            retry_interval: env_utils::duration_ms_or("GATEWAY_ARTEMIS_RETRY_INTERVAL_MS", 500)?,
            retry_multiplier: env_utils::or_default("GATEWAY_ARTEMIS_RETRY_MULTIPLIER", 2.0)?,
            max_retry_interval: env_utils::duration_ms_or("GATEWAY_ARTEMIS_MAX_RETRY_INTERVAL_MS", 30_000)?,
            reconnect_attempts: env_utils::or_default("GATEWAY_ARTEMIS_RECONNECT_ATTEMPTS", -1)?,
            failure_check_period: env_utils::duration_ms_or("GATEWAY_ARTEMIS_FAILURE_CHECK_PERIOD_MS", 30_000)?,
            connection_ttl: env_utils::duration_ms_or("GATEWAY_ARTEMIS_CONNECTION_TTL_MS", 60_000)?,
            recovery_interval: env_utils::duration_ms_or("GATEWAY_ARTEMIS_RECOVERY_INTERVAL_MS", 5_000)?,
        })
    }
}

/// Configuration of the gateway core: which addresses to consume, how,
/// and where each one forwards on the stream bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Ordered list of broker addresses to bind.
    pub addresses: Vec<String>,
    /// Empty means anycast; non-empty selects durable multicast via FQQN.
    pub subscriber_name: String,
    pub concurrency: ConcurrencyRange,
    pub retry_attempts: u32,
    pub retry_delay_ms: u64,
    /// Address -> stream name on the bus.
    pub stream_mapping: HashMap<String, String>,
    pub artemis: ArtemisConfig,
    /// Development aid: suppress acknowledgement after processing so the
    /// broker keeps redelivering. Never enable outside a debugging
    /// session.
    pub ack_disabled: bool,
}

impl GatewayConfig {
    pub fn from_env() -> GatewayResult<Self> {
        let config = Self {
            addresses: env_utils::list("GATEWAY_ADDRESSES")?,
            subscriber_name: env_utils::or_default("GATEWAY_SUBSCRIBER_NAME", String::new())?,
            concurrency: env_utils::or_default("GATEWAY_CONCURRENCY", ConcurrencyRange { min: 1, max: 1 })?,
            retry_attempts: env_utils::or_default("GATEWAY_RETRY_ATTEMPTS", 3)?,
            retry_delay_ms: env_utils::or_default("GATEWAY_RETRY_DELAY_MS", 5000)?,
            stream_mapping: env_utils::pair_map("GATEWAY_STREAM_MAPPING")?,
            artemis: ArtemisConfig::from_env()?,
            ack_disabled: env_utils::bool_or("GATEWAY_ACK_DISABLED", false),
        };
        config.validate()?;
        Ok(config)
    }

    /// Fail fast on missing or contradictory settings, before any
    /// listener binds.
    pub fn validate(&self) -> GatewayResult<()> {
        if self.addresses.is_empty() {
            return Err(GatewayError::configuration("GATEWAY_ADDRESSES must list at least one address"));
        }
        if self.retry_attempts < 1 {
            return Err(GatewayError::configuration("GATEWAY_RETRY_ATTEMPTS must be >= 1"));
        }
        for address in &self.addresses {
            if !self.stream_mapping.contains_key(address) {
                return Err(GatewayError::configuration(format!(
                    "address '{}' has no stream mapping (GATEWAY_STREAM_MAPPING)",
                    address
                )));
            }
        }
        Ok(())
    }

    /// Whether listeners bind durable multicast subscriptions.
    pub fn is_multicast(&self) -> bool {
        !self.subscriber_name.is_empty()
    }

    pub fn stream_for(&self, address: &str) -> Option<&str> {
        self.stream_mapping.get(address).map(String::as_str)
    }
}

/// Configuration of the query-metrics core.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryMonitorConfig {
    pub log_file_path: PathBuf,
    pub poll_interval: Duration,
    pub ttl: Duration,
    pub max_samples: usize,
}

impl QueryMonitorConfig {
    pub fn from_env() -> GatewayResult<Self> {
        let log_file_path: String = env_utils::required("QUERY_LOG_FILE_PATH")?;
        let ttl_days: u64 = env_utils::or_default("QUERY_MONITOR_TTL_DAYS", 15)?;
        Ok(Self {
            log_file_path: PathBuf::from(log_file_path),
            poll_interval: env_utils::duration_ms_or("QUERY_MONITOR_POLL_INTERVAL_MS", 1000)?,
            ttl: Duration::from_secs(ttl_days * 24 * 3600),
            max_samples: env_utils::or_default("QUERY_MONITOR_MAX_SAMPLES", 1000)?,
        })
    }
}
