//! The tracer service object.
//!
//! Owns the trace configuration and the listener registry, and stamps
//! both into every context it creates. Constructed once at process start
//! and passed explicitly — tests get fully isolated tracers.

use std::sync::Arc;

use crate::config::TraceConfig;

use super::context::{ContextSnapshot, TraceContext};
use super::listener::{DebugLogListener, ListenerRegistry};

pub struct Tracer {
    config: TraceConfig,
    listeners: Arc<ListenerRegistry>,
}

impl Tracer {
    pub fn new(config: TraceConfig) -> Self {
        Self::with_listeners(config, Arc::new(ListenerRegistry::new()))
    }

    /// Build a tracer around an existing listener registry.
    pub fn with_listeners(config: TraceConfig, listeners: Arc<ListenerRegistry>) -> Self {
        if config.debug_spans {
            listeners.add("debug-log", Arc::new(DebugLogListener));
        }
        Self { config, listeners }
    }

    pub fn config(&self) -> &TraceConfig {
        &self.config
    }

    /// Listener registry shared by all contexts this tracer creates.
    /// Listeners added or removed here take effect immediately, including
    /// for contexts already in flight.
    pub fn listeners(&self) -> &Arc<ListenerRegistry> {
        &self.listeners
    }

    /// Context for a new logical trace. The sampling mode decides whether
    /// it reports spans or only keeps propagation consistent.
    pub fn new_trace(&self) -> TraceContext {
        if self.config.samples() {
            TraceContext::reporting(self.listeners.clone())
        } else {
            TraceContext::propagation_only(self.listeners.clone())
        }
    }

    /// Context continuing a trace captured elsewhere: an async fork from
    /// this process, or an inbound carrier from another one.
    pub fn continue_trace(&self, snapshot: ContextSnapshot) -> TraceContext {
        TraceContext::continued(snapshot, self.listeners.clone())
    }

    /// Capture a context for handoff to another execution unit. Sugar for
    /// [`TraceContext::capture`].
    pub fn fork(&self, context: &TraceContext) -> ContextSnapshot {
        context.capture()
    }
}

impl std::fmt::Debug for Tracer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tracer")
            .field("config", &self.config)
            .field("listeners", &self.listeners.len())
            .finish()
    }
}
