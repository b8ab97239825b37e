// File: src/connection.rs
//
// A single STOMP 1.2 session against the Artemis broker

use std::time::Instant;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_util::codec::Framed;

use event_gateway_core::config::ArtemisConfig;
use event_gateway_core::error::{GatewayError, GatewayResult};

use crate::frame::{commands, StompCodec, StompFrame};

/// A text message delivered on a subscription, with everything the
/// pipeline needs to process and then acknowledge it.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    /// Broker-assigned id, when present. The pipeline synthesizes a
    /// deterministic fallback otherwise.
    pub message_id: Option<String>,
    /// Token to pass back in ACK/NACK.
    pub ack_id: String,
    pub destination: String,
    pub body: String,
    pub redelivered: bool,
}

/// One connected, subscribed STOMP session.
///
/// Acknowledgement mode is always `client-individual`: an ACK commits a
/// single message, a NACK returns it to the broker for redelivery. That
/// is the transacted-session contract the gateway pipeline relies on.
pub struct StompConnection {
    framed: Framed<TcpStream, StompCodec>,
    config: ArtemisConfig,
    last_received: Instant,
    last_sent: Instant,
}

impl StompConnection {
    /// Open a TCP connection and perform the STOMP handshake.
    ///
    /// `client_id` is required by the broker for durable subscriptions;
    /// pass the subscriber name so re-connects resume the same
    /// subscription state.
    pub async fn connect(config: &ArtemisConfig, client_id: Option<&str>) -> GatewayResult<Self> {
        let stream = TcpStream::connect((config.host.as_str(), config.port))
            .await
            .map_err(|e| GatewayError::transport(format!("connect {}:{}: {}", config.host, config.port, e)))?;
        let mut framed = Framed::new(stream, StompCodec);

        let mut connect = StompFrame::new(commands::CONNECT)
            .header("accept-version", "1.2")
            .header("host", config.host.clone())
            .header(
                "heart-beat",
                format!(
                    "{},{}",
                    config.failure_check_period.as_millis(),
                    config.connection_ttl.as_millis()
                ),
            );
        if let Some(user) = &config.user {
            connect = connect.header("login", user.clone());
        }
        if let Some(password) = &config.password {
            connect = connect.header("passcode", password.clone());
        }
        if let Some(client_id) = client_id {
            connect = connect.header("client-id", client_id);
        }
        framed.send(connect).await?;

        // The broker answers CONNECTED or ERROR before anything else
        let reply = tokio::time::timeout(config.connection_ttl, framed.next())
            .await
            .map_err(|_| GatewayError::transport("timed out waiting for CONNECTED"))?
            .ok_or_else(|| GatewayError::transport("connection closed during handshake"))??;
        match reply.command() {
            Some(commands::CONNECTED) => {
                tracing::debug!(
                    host = %config.host,
                    port = config.port,
                    version = reply.get_header("version").unwrap_or("?"),
                    "broker session established"
                );
            }
            Some(commands::ERROR) => {
                return Err(GatewayError::transport(format!(
                    "broker refused connection: {}",
                    reply.get_header("message").unwrap_or(&reply.body_text())
                )));
            }
            other => {
                return Err(GatewayError::transport(format!(
                    "unexpected handshake frame {:?}",
                    other
                )));
            }
        }

        let now = Instant::now();
        Ok(Self {
            framed,
            config: config.clone(),
            last_received: now,
            last_sent: now,
        })
    }

    /// Bind a subscription on `address`.
    ///
    /// With a subscriber name the destination is the fully-qualified
    /// queue name `ADDRESS::SUBSCRIBER.ADDRESS` on the multicast
    /// address, marked durable so the broker retains messages while the
    /// consumer is away. Without one it is the plain anycast address.
    pub async fn subscribe(
        &mut self,
        subscription_id: &str,
        address: &str,
        subscriber_name: Option<&str>,
    ) -> GatewayResult<()> {
        let mut subscribe = StompFrame::new(commands::SUBSCRIBE)
            .header("id", subscription_id)
            .header("ack", "client-individual");
        match subscriber_name {
            Some(subscriber) if !subscriber.is_empty() => {
                let queue = format!("{}.{}", subscriber, address);
                subscribe = subscribe
                    .header("destination", format!("{}::{}", address, queue))
                    .header("subscription-type", "MULTICAST")
                    .header("durable-subscription-name", queue);
            }
            _ => {
                subscribe = subscribe
                    .header("destination", address)
                    .header("subscription-type", "ANYCAST");
            }
        }
        self.send_frame(subscribe).await
    }

    /// Wait for the next MESSAGE, transparently answering heartbeats.
    ///
    /// Errors when the broker goes silent past the connection TTL or the
    /// stream closes; the listener reconnects on any error here.
    pub async fn receive(&mut self) -> GatewayResult<InboundMessage> {
        loop {
            if self.last_received.elapsed() > self.config.connection_ttl {
                return Err(GatewayError::transport(format!(
                    "no traffic from broker for {:?}, declaring connection dead",
                    self.config.connection_ttl
                )));
            }
            if self.last_sent.elapsed() >= self.config.failure_check_period {
                self.framed.send(StompFrame::Heartbeat).await?;
                self.last_sent = Instant::now();
            }

            let frame = match tokio::time::timeout(self.config.failure_check_period, self.framed.next()).await {
                Err(_) => continue,
                Ok(None) => return Err(GatewayError::transport("broker closed the connection")),
                Ok(Some(frame)) => frame?,
            };
            self.last_received = Instant::now();

            match frame.command() {
                None => continue, // heartbeat
                Some(commands::MESSAGE) => {
                    let ack_id = frame
                        .get_header("ack")
                        .or_else(|| frame.get_header("message-id"))
                        .ok_or_else(|| GatewayError::transport("MESSAGE frame without ack id"))?
                        .to_string();
                    return Ok(InboundMessage {
                        message_id: frame.get_header("message-id").map(str::to_string),
                        ack_id,
                        destination: frame.get_header("destination").unwrap_or_default().to_string(),
                        body: frame.body_text(),
                        redelivered: frame
                            .get_header("redelivered")
                            .map(|v| v.eq_ignore_ascii_case("true"))
                            .unwrap_or(false),
                    });
                }
                Some(commands::ERROR) => {
                    return Err(GatewayError::transport(format!(
                        "broker error: {}",
                        frame.get_header("message").unwrap_or(&frame.body_text())
                    )));
                }
                Some(commands::RECEIPT) => continue,
                Some(other) => {
                    tracing::debug!(command = other, "ignoring unexpected frame");
                }
            }
        }
    }

    /// Acknowledge one message (session commit).
    pub async fn ack(&mut self, ack_id: &str) -> GatewayResult<()> {
        self.send_frame(StompFrame::new(commands::ACK).header("id", ack_id)).await
    }

    /// Reject one message (session rollback); the broker redelivers.
    pub async fn nack(&mut self, ack_id: &str) -> GatewayResult<()> {
        self.send_frame(StompFrame::new(commands::NACK).header("id", ack_id)).await
    }

    /// Graceful teardown; errors are ignored because the socket may
    /// already be gone.
    pub async fn disconnect(mut self) {
        let _ = self.framed.send(StompFrame::new(commands::DISCONNECT)).await;
        let _ = self.framed.close().await;
    }

    async fn send_frame(&mut self, frame: StompFrame) -> GatewayResult<()> {
        self.framed.send(frame).await?;
        self.last_sent = Instant::now();
        Ok(())
    }
}
