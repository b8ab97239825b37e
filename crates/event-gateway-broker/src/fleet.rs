// File: src/fleet.rs
//
// Lifecycle of the listener fleet: one worker pool per configured address

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;

use event_gateway_core::config::GatewayConfig;
use event_gateway_core::error::{GatewayError, GatewayResult};

use crate::listener::{AddressListener, ListenerState, MessageSink};

/// Grace period for workers to drain on stop before they are aborted.
const STOP_GRACE: Duration = Duration::from_secs(10);

/// Observable snapshot of one worker.
#[derive(Debug, Clone, Serialize)]
pub struct ListenerStatus {
    pub address: String,
    pub worker: u32,
    pub running: bool,
    pub in_flight: usize,
    pub last_error: Option<String>,
}

/// Observable snapshot of the fleet.
#[derive(Debug, Clone, Serialize)]
pub struct FleetStatus {
    pub mode: &'static str,
    pub listeners: Vec<ListenerStatus>,
}

struct RunningFleet {
    shutdown_tx: watch::Sender<bool>,
    handles: Vec<JoinHandle<()>>,
    states: Vec<Arc<ListenerState>>,
}

/// The set of broker consumers, one worker pool per configured address.
///
/// The pool is sized at the upper bound of the configured concurrency
/// range; each worker holds its own session, so ordering is preserved
/// per worker exactly as the broker preserves it per session.
pub struct ListenerFleet {
    sink: Arc<dyn MessageSink>,
    config: Mutex<GatewayConfig>,
    running: Mutex<Option<RunningFleet>>,
}

impl ListenerFleet {
    pub fn new(config: GatewayConfig, sink: Arc<dyn MessageSink>) -> Self {
        Self {
            sink,
            config: Mutex::new(config),
            running: Mutex::new(None),
        }
    }

    /// Bind one worker pool per configured address. Idempotent: calling
    /// on an already-started fleet is an error so that `reconfigure`
    /// stays the only path that restarts.
    pub async fn start_all(&self) -> GatewayResult<()> {
        let config = self.config.lock().await.clone();
        config.validate()?;

        let mut running = self.running.lock().await;
        if running.is_some() {
            return Err(GatewayError::configuration("listener fleet already started"));
        }

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let subscriber = if config.is_multicast() {
            Some(config.subscriber_name.clone())
        } else {
            None
        };

        let mut handles = Vec::new();
        let mut states = Vec::new();
        for address in &config.addresses {
            for worker in 0..config.concurrency.max {
                let listener = AddressListener::new(
                    address.clone(),
                    worker,
                    subscriber.clone(),
                    config.artemis.clone(),
                    Arc::clone(&self.sink),
                    shutdown_rx.clone(),
                );
                states.push(Arc::clone(&listener.state));
                handles.push(tokio::spawn(listener.run()));
            }
        }
        tracing::info!(
            addresses = config.addresses.len(),
            workers_per_address = config.concurrency.max,
            mode = if config.is_multicast() { "durable-multicast" } else { "anycast" },
            "listener fleet started"
        );

        *running = Some(RunningFleet { shutdown_tx, handles, states });
        Ok(())
    }

    /// Quiesce all workers: signal shutdown, wait up to the grace
    /// period, then abort stragglers.
    pub async fn stop_all(&self) {
        let fleet = match self.running.lock().await.take() {
            Some(fleet) => fleet,
            None => return,
        };
        let _ = fleet.shutdown_tx.send(true);

        let deadline = tokio::time::Instant::now() + STOP_GRACE;
        for mut handle in fleet.handles {
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            if tokio::time::timeout(remaining, &mut handle).await.is_err() {
                tracing::warn!(grace = ?STOP_GRACE, "worker did not drain in time, aborting");
                handle.abort();
            }
        }
        tracing::info!("listener fleet stopped");
    }

    /// Atomic stop + apply + start. When the new configuration cannot be
    /// started the previous one is restored and the error surfaced.
    pub async fn reconfigure(&self, new_config: GatewayConfig) -> GatewayResult<()> {
        self.stop_all().await;

        let previous = {
            let mut config = self.config.lock().await;
            std::mem::replace(&mut *config, new_config)
        };

        if let Err(error) = self.start_all().await {
            tracing::error!(error = %error, "reconfigure failed, restoring previous configuration");
            {
                let mut config = self.config.lock().await;
                *config = previous;
            }
            self.start_all().await?;
            return Err(error);
        }
        Ok(())
    }

    pub async fn status(&self) -> FleetStatus {
        let config = self.config.lock().await;
        let mode = if config.is_multicast() { "durable-multicast" } else { "anycast" };
        drop(config);

        let listeners = match &*self.running.lock().await {
            Some(fleet) => fleet
                .states
                .iter()
                .map(|state| ListenerStatus {
                    address: state.address.clone(),
                    worker: state.worker,
                    running: state.is_running(),
                    in_flight: state.in_flight(),
                    last_error: state.last_error(),
                })
                .collect(),
            None => Vec::new(),
        };
        FleetStatus { mode, listeners }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::HashMap;

    use event_gateway_core::config::{ArtemisConfig, ConcurrencyRange};

    use crate::connection::InboundMessage;

    struct NullSink;

    #[async_trait]
    impl MessageSink for NullSink {
        async fn on_message(&self, _address: &str, _message: &InboundMessage) -> GatewayResult<()> {
            Ok(())
        }
    }

    fn test_config() -> GatewayConfig {
        GatewayConfig {
            addresses: vec!["ADDR_X".to_string()],
            subscriber_name: String::new(),
            concurrency: ConcurrencyRange { min: 1, max: 2 },
            retry_attempts: 3,
            retry_delay_ms: 10,
            stream_mapping: HashMap::from([("ADDR_X".to_string(), "stream-x".to_string())]),
            artemis: ArtemisConfig {
                // Point at a closed port so sessions fail fast in tests
                host: "127.0.0.1".to_string(),
                port: 1,
                retry_interval: Duration::from_millis(10),
                max_retry_interval: Duration::from_millis(20),
                ..ArtemisConfig::default()
            },
            ack_disabled: false,
        }
    }

    #[tokio::test]
    async fn start_is_not_idempotent() {
        let fleet = ListenerFleet::new(test_config(), Arc::new(NullSink));
        fleet.start_all().await.unwrap();
        assert!(fleet.start_all().await.is_err());
        fleet.stop_all().await;
    }

    #[tokio::test]
    async fn status_reports_one_entry_per_worker() {
        let fleet = ListenerFleet::new(test_config(), Arc::new(NullSink));
        fleet.start_all().await.unwrap();
        let status = fleet.status().await;
        assert_eq!(status.mode, "anycast");
        assert_eq!(status.listeners.len(), 2);
        fleet.stop_all().await;
        assert!(fleet.status().await.listeners.is_empty());
    }

    #[tokio::test]
    async fn reconfigure_restores_previous_on_invalid_config() {
        let fleet = ListenerFleet::new(test_config(), Arc::new(NullSink));
        fleet.start_all().await.unwrap();

        let mut bad = test_config();
        bad.addresses.push("UNMAPPED".to_string());
        assert!(fleet.reconfigure(bad).await.is_err());

        // Previous configuration is running again
        let status = fleet.status().await;
        assert_eq!(status.listeners.len(), 2);
        assert!(status.listeners.iter().all(|l| l.address == "ADDR_X"));
        fleet.stop_all().await;
    }

    #[tokio::test]
    async fn stop_without_start_is_a_noop() {
        let fleet = ListenerFleet::new(test_config(), Arc::new(NullSink));
        fleet.stop_all().await;
    }
}
