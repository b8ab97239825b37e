// File: src/handlers.rs
//
// The handlers this deployment registers with the gateway

use async_trait::async_trait;

use event_gateway_core::error::GatewayResult;
use event_gateway_core::event::GatewayEvent;
use event_gateway_core::handler::EventHandler;

/// Mandatory catch-all: every event type without a dedicated handler
/// lands here. It only observes; a raw event is already persisted and
/// will be forwarded regardless, and a default-handler failure must
/// never block the pipeline.
pub struct DefaultEventHandler;

#[async_trait]
impl EventHandler for DefaultEventHandler {
    fn event_types(&self) -> Vec<String> {
        Vec::new()
    }

    fn name(&self) -> &str {
        "default"
    }

    async fn handle(&self, event: &GatewayEvent) -> GatewayResult<()> {
        tracing::debug!(
            message_id = %event.message_id,
            event_type = %event.event_type,
            payload_bytes = event.payload.len(),
            "event observed by default handler"
        );
        Ok(())
    }
}

/// Sanity checks position payloads as they pass through the gateway so
/// malformed producers surface early, before the stream processors see
/// their records.
pub struct UnitPositionHandler {
    event_types: Vec<String>,
}

impl UnitPositionHandler {
    pub fn for_addresses(addresses: impl IntoIterator<Item = String>) -> Self {
        Self {
            event_types: addresses.into_iter().collect(),
        }
    }
}

#[async_trait]
impl EventHandler for UnitPositionHandler {
    fn event_types(&self) -> Vec<String> {
        self.event_types.clone()
    }

    fn name(&self) -> &str {
        "unit-positions"
    }

    async fn handle(&self, event: &GatewayEvent) -> GatewayResult<()> {
        let payload: serde_json::Value = serde_json::from_str(&event.payload)?;
        if payload.get("unit_number").is_none() {
            tracing::warn!(
                message_id = %event.message_id,
                event_type = %event.event_type,
                "position event without unit_number, downstream will reject it"
            );
        }
        Ok(())
    }
}
