// File: src/listener.rs
//
// One consumer worker: a reconnecting subscription on a single address

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::watch;

use event_gateway_core::config::ArtemisConfig;
use event_gateway_core::error::{GatewayError, GatewayResult};
use event_gateway_core::retry::interruptible_sleep;

use crate::connection::{InboundMessage, StompConnection};
use crate::reconnect::ReconnectSchedule;

/// Receiver of messages delivered by a listener. The gateway pipeline
/// implements this; an `Ok` return acknowledges the message, any error
/// rejects it so the broker redelivers.
#[async_trait]
pub trait MessageSink: Send + Sync {
    async fn on_message(&self, address: &str, message: &InboundMessage) -> GatewayResult<()>;
}

/// Shared, observable state of one worker.
#[derive(Debug)]
pub struct ListenerState {
    pub address: String,
    pub worker: u32,
    running: AtomicBool,
    in_flight: AtomicUsize,
    last_error: Mutex<Option<String>>,
}

impl ListenerState {
    pub fn new(address: String, worker: u32) -> Self {
        Self {
            address,
            worker,
            running: AtomicBool::new(false),
            in_flight: AtomicUsize::new(0),
            last_error: Mutex::new(None),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Relaxed)
    }

    pub fn last_error(&self) -> Option<String> {
        self.last_error.lock().expect("listener state lock poisoned").clone()
    }

    fn record_error(&self, error: &GatewayError) {
        *self.last_error.lock().expect("listener state lock poisoned") = Some(error.to_string());
    }
}

/// A single consumer task bound to one address.
///
/// The task owns its connection: on any transport error it tears the
/// session down and reconnects on the exponential-backoff schedule,
/// pausing consumption rather than failing the process.
pub struct AddressListener {
    pub state: Arc<ListenerState>,
    address: String,
    subscriber_name: Option<String>,
    artemis: ArtemisConfig,
    sink: Arc<dyn MessageSink>,
    shutdown: watch::Receiver<bool>,
}

impl AddressListener {
    pub fn new(
        address: String,
        worker: u32,
        subscriber_name: Option<String>,
        artemis: ArtemisConfig,
        sink: Arc<dyn MessageSink>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        let state = Arc::new(ListenerState::new(address.clone(), worker));
        Self {
            state,
            address,
            subscriber_name,
            artemis,
            sink,
            shutdown,
        }
    }

    /// Drive the listener until shutdown or reconnect-budget exhaustion.
    pub async fn run(mut self) {
        self.state.running.store(true, Ordering::Relaxed);
        let mut schedule = ReconnectSchedule::from_config(&self.artemis);

        while !*self.shutdown.borrow() {
            let mut subscribed = false;
            match self.run_session(&mut schedule, &mut subscribed).await {
                Ok(()) => break, // clean shutdown
                Err(error) => {
                    self.state.record_error(&error);
                    tracing::warn!(
                        address = %self.address,
                        worker = self.state.worker,
                        error = %error,
                        "broker session lost, scheduling reconnect"
                    );
                }
            }
            // An established session that died restarts on the recovery
            // interval; failed connection attempts follow the backoff
            // schedule.
            let delay = if subscribed {
                Some(self.artemis.recovery_interval)
            } else {
                schedule.next_backoff()
            };
            match delay {
                None => {
                    tracing::error!(
                        address = %self.address,
                        worker = self.state.worker,
                        "reconnect attempts exhausted, listener stopping"
                    );
                    break;
                }
                Some(delay) => {
                    if interruptible_sleep(delay, &mut self.shutdown).await.is_err() {
                        break;
                    }
                }
            }
        }
        self.state.running.store(false, Ordering::Relaxed);
    }

    async fn run_session(
        &mut self,
        schedule: &mut ReconnectSchedule,
        subscribed: &mut bool,
    ) -> GatewayResult<()> {
        let client_id = self
            .subscriber_name
            .as_ref()
            .map(|subscriber| format!("{}-{}-{}", subscriber, self.address, self.state.worker));
        let mut connection = StompConnection::connect(&self.artemis, client_id.as_deref()).await?;
        let subscription_id = format!("sub-{}-{}", self.address, self.state.worker);
        connection
            .subscribe(&subscription_id, &self.address, self.subscriber_name.as_deref())
            .await?;
        *subscribed = true;
        schedule.reset(&self.artemis);
        tracing::info!(
            address = %self.address,
            worker = self.state.worker,
            multicast = self.subscriber_name.is_some(),
            "listener subscribed"
        );

        loop {
            let message = tokio::select! {
                _ = self.shutdown.changed() => {
                    if *self.shutdown.borrow() {
                        connection.disconnect().await;
                        return Ok(());
                    }
                    continue;
                }
                received = connection.receive() => received?,
            };

            self.state.in_flight.fetch_add(1, Ordering::Relaxed);
            let outcome = self.sink.on_message(&self.address, &message).await;
            self.state.in_flight.fetch_sub(1, Ordering::Relaxed);

            match outcome {
                Ok(()) => connection.ack(&message.ack_id).await?,
                Err(GatewayError::RedeliveryForced) => {
                    // Expected when acknowledgement is deliberately
                    // suppressed; not a real failure.
                    tracing::debug!(
                        address = %self.address,
                        message_id = message.message_id.as_deref().unwrap_or("<none>"),
                        "acknowledge suppressed, message stays pending"
                    );
                    connection.nack(&message.ack_id).await?;
                }
                Err(error) => {
                    self.state.record_error(&error);
                    tracing::error!(
                        address = %self.address,
                        worker = self.state.worker,
                        message_id = message.message_id.as_deref().unwrap_or("<none>"),
                        error = %error,
                        "message processing failed, rejecting for redelivery"
                    );
                    connection.nack(&message.ack_id).await?;
                }
            }
        }
    }
}
