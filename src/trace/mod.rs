//! Distributed tracing: spans, trace contexts, the thread-local holder,
//! lifecycle listeners, and cross-process propagation.
//!
//! The span tree for one inbound request typically looks like:
//!
//! ```text
//! request (Entry)                      <- context root
//!   ├── cache.get (Local)
//!   └── orders.place (Local)
//!         └── db.insert (Exit)
//! ```
//!
//! Contexts are owned by one execution unit; [`TraceContext::capture`]
//! hands a trace to another unit as a fresh, independently owned context
//! that shares only the trace id and parent linkage.

pub mod context;
pub mod holder;
pub mod id;
pub mod listener;
pub mod propagation;
pub mod span;
pub mod tracer;

pub use context::{ContextSnapshot, TraceContext};
pub use id::{SpanId, SpanIdGenerator, TraceId};
pub use listener::{DebugLogListener, JsonlSpanWriter, ListenerRegistry, SpanListener};
pub use propagation::{
    extract, inject, TraceState, SAMPLED_KEY, SPAN_ID_KEY, TRACE_ID_KEY, TRACE_STATE_KEY,
};
pub use span::{Span, SpanKind, SpanRecord};
pub use tracer::Tracer;
