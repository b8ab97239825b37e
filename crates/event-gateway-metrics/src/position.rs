// File: src/position.rs
//
// Durable read offset of the log tailer

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;

use event_gateway_core::error::GatewayResult;

/// Key the tailer's read offset lives under.
pub const POSITION_KEY: &str = "logprocessor:position";

/// The offset must survive at least a month-long outage.
pub const MIN_POSITION_TTL: Duration = Duration::from_secs(30 * 24 * 3600);

/// Durable storage for the tailer's read offset.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PositionStore: Send + Sync {
    async fn load(&self) -> GatewayResult<Option<u64>>;

    async fn save(&self, position: u64) -> GatewayResult<()>;
}

/// Key/value-store implementation, TTL-refreshed on every save.
#[derive(Clone)]
pub struct RedisPositionStore {
    redis: ConnectionManager,
    ttl: Duration,
}

impl RedisPositionStore {
    pub fn new(redis: ConnectionManager) -> Self {
        Self::with_ttl(redis, MIN_POSITION_TTL)
    }

    pub fn with_ttl(redis: ConnectionManager, ttl: Duration) -> Self {
        Self {
            redis,
            ttl: ttl.max(MIN_POSITION_TTL),
        }
    }
}

#[async_trait]
impl PositionStore for RedisPositionStore {
    async fn load(&self) -> GatewayResult<Option<u64>> {
        let mut conn = self.redis.clone();
        let value: Option<String> = conn.get(POSITION_KEY).await?;
        Ok(value.and_then(|v| v.parse().ok()))
    }

    async fn save(&self, position: u64) -> GatewayResult<()> {
        let mut conn = self.redis.clone();
        conn.set_ex::<_, _, ()>(POSITION_KEY, position, self.ttl.as_secs()).await?;
        Ok(())
    }
}
