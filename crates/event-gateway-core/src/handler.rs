// File: src/handler.rs
//
// Typed event handlers and the registry that routes raw events to them

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::{GatewayError, GatewayResult};
use crate::event::GatewayEvent;

/// A typed consumer of raw gateway events.
///
/// Handlers are values: they declare the event types they support up
/// front and are handed to [`HandlerRegistry::new`] in declaration
/// order. A handler with an empty `event_types()` list is the
/// catch-all; exactly one must be present.
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Event types this handler claims. Empty means catch-all.
    fn event_types(&self) -> Vec<String>;

    /// Conflict-resolution priority; higher wins. Ties break by
    /// declaration order, later registration winning.
    fn priority(&self) -> i32 {
        0
    }

    fn name(&self) -> &str;

    async fn handle(&self, event: &GatewayEvent) -> GatewayResult<()>;
}

/// O(1) dispatch from event type to handler, case-insensitive.
///
/// Built once at construction; lookups never fail because unknown
/// types resolve to the mandatory default handler.
pub struct HandlerRegistry {
    by_type: HashMap<String, Arc<dyn EventHandler>>,
    default: Arc<dyn EventHandler>,
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("by_type", &self.by_type.keys().collect::<Vec<_>>())
            .field("default", &self.default.name())
            .finish()
    }
}

impl HandlerRegistry {
    /// Build the registry from handlers in declaration order.
    ///
    /// Fails with a configuration error unless exactly one handler
    /// declares the empty set. When two handlers claim the same type,
    /// the one with the higher (priority, declaration index) wins and
    /// the displaced claim is logged.
    pub fn new(handlers: Vec<Arc<dyn EventHandler>>) -> GatewayResult<Self> {
        let mut default: Option<Arc<dyn EventHandler>> = None;
        let mut by_type: HashMap<String, (i32, usize, Arc<dyn EventHandler>)> = HashMap::new();

        for (index, handler) in handlers.into_iter().enumerate() {
            let types = handler.event_types();
            if types.is_empty() {
                if let Some(existing) = &default {
                    return Err(GatewayError::configuration(format!(
                        "two catch-all handlers declared: '{}' and '{}'",
                        existing.name(),
                        handler.name()
                    )));
                }
                default = Some(handler);
                continue;
            }
            for event_type in types {
                let key = event_type.to_lowercase();
                let previous = by_type
                    .get(&key)
                    .map(|(priority, index, existing)| (*priority, *index, existing.name().to_string()));
                match previous {
                    Some((prev_priority, prev_index, prev_name)) => {
                        if (handler.priority(), index) >= (prev_priority, prev_index) {
                            tracing::warn!(
                                event_type = %event_type,
                                winner = %handler.name(),
                                displaced = %prev_name,
                                "duplicate handler claim; later/higher-priority registration wins"
                            );
                            by_type.insert(key, (handler.priority(), index, Arc::clone(&handler)));
                        } else {
                            tracing::warn!(
                                event_type = %event_type,
                                winner = %prev_name,
                                displaced = %handler.name(),
                                "duplicate handler claim; existing higher-priority registration kept"
                            );
                        }
                    }
                    None => {
                        by_type.insert(key, (handler.priority(), index, Arc::clone(&handler)));
                    }
                }
            }
        }

        let default = default.ok_or_else(|| {
            GatewayError::configuration("no catch-all handler declared (empty event_types set)")
        })?;

        Ok(Self {
            by_type: by_type
                .into_iter()
                .map(|(k, (_, _, h))| (k, h))
                .collect(),
            default,
        })
    }

    /// Case-insensitive lookup; unknown types get the default handler.
    pub fn get(&self, event_type: &str) -> &Arc<dyn EventHandler> {
        self.by_type
            .get(&event_type.to_lowercase())
            .unwrap_or(&self.default)
    }

    /// Event types with a dedicated (non-default) handler.
    pub fn registered_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.by_type.keys().cloned().collect();
        types.sort();
        types
    }
}
