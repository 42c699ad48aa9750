//! Inbound event dispatch
//!
//! Maps event names to decode-and-handle closures. Unknown events are
//! ignored; a payload that fails to decode, or a handler that panics, is
//! logged and counted but never reaches the socket read loop.

use crate::error::SyncError;
use crate::metrics::SyncMetrics;
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{debug, error, warn};

type Handler = Arc<dyn Fn(Value) -> Result<(), SyncError> + Send + Sync>;

struct Registration {
    once: bool,
    handler: Handler,
}

/// What happened to one inbound event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    Handled,
    /// No handler registered for this name
    Unhandled,
    /// Event arrived without a payload
    MissingPayload,
    /// Decode failed or the handler panicked
    Failed,
}

pub struct EventRegistry {
    handlers: RwLock<HashMap<String, Registration>>,
    metrics: SyncMetrics,
}

impl EventRegistry {
    pub fn new(metrics: SyncMetrics) -> Self {
        Self {
            handlers: RwLock::new(HashMap::new()),
            metrics,
        }
    }

    /// Register a typed handler. Replaces any previous handler for `event`.
    ///
    /// A `once` handler is removed on its first delivery, whether or not
    /// the payload decodes.
    pub fn register<T, F>(&self, event: &str, once: bool, handler: F)
    where
        T: DeserializeOwned,
        F: Fn(T) + Send + Sync + 'static,
    {
        let name = event.to_string();
        let handler: Handler = Arc::new(move |payload: Value| {
            let decoded: T = serde_json::from_value(payload).map_err(|source| SyncError::Decode {
                event: name.clone(),
                source,
            })?;
            handler(decoded);
            Ok(())
        });

        let previous = self
            .handlers
            .write()
            .insert(event.to_string(), Registration { once, handler });
        if previous.is_some() {
            debug!(event, "Replaced inbound handler");
        }
    }

    pub fn unregister(&self, event: &str) -> bool {
        self.handlers.write().remove(event).is_some()
    }

    pub fn is_registered(&self, event: &str) -> bool {
        self.handlers.read().contains_key(event)
    }

    /// Route one inbound event. Never returns an error.
    pub fn dispatch(&self, event: &str, payload: Option<Value>) -> DispatchOutcome {
        let handler = {
            let handlers = self.handlers.read();
            match handlers.get(event) {
                Some(registration) if registration.once => None,
                Some(registration) => Some(Arc::clone(&registration.handler)),
                None => {
                    debug!(event, "Ignoring unhandled inbound event");
                    return DispatchOutcome::Unhandled;
                }
            }
        };

        // once-only handlers are taken out under the write lock so a
        // concurrent delivery cannot run them twice
        let handler = match handler {
            Some(handler) => handler,
            None => match self.handlers.write().remove(event) {
                Some(registration) => registration.handler,
                None => return DispatchOutcome::Unhandled,
            },
        };

        self.metrics.record_inbound(event);

        let Some(payload) = payload else {
            warn!(event, "Inbound event without payload ignored");
            return DispatchOutcome::MissingPayload;
        };

        match catch_unwind(AssertUnwindSafe(|| handler(payload))) {
            Ok(Ok(())) => DispatchOutcome::Handled,
            Ok(Err(e)) => {
                warn!(event, error = %e, "Failed to decode inbound event");
                self.metrics.record_decode_failure(event);
                self.metrics.record_error(e.error_type_label());
                DispatchOutcome::Failed
            }
            Err(_) => {
                error!(event, "Inbound handler panicked");
                DispatchOutcome::Failed
            }
        }
    }
}
