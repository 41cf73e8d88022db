//! Filament — an embeddable instrumentation engine.
//!
//! Two halves, one safety rule. The `intercept` half wraps chosen calls
//! with before/after hooks behind a process-wide interceptor registry;
//! the `trace` half models distributed trace spans, contexts and
//! propagation. The safety rule is fail-open: a failure anywhere inside
//! the observability path is logged and swallowed, and the host call
//! executes as if no instrumentation were present.
//!
//! How a call site is located and rewritten is deliberately out of scope:
//! an external weaving mechanism (decorators, middleware, generated
//! wrappers) drives [`InterceptEngine::on_enter`] and
//! [`InterceptEngine::on_exit`] around the real call.

pub mod config;
pub mod error;
pub mod intercept;
pub mod trace;

pub use config::{SamplingMode, TraceConfig};
pub use error::{FilamentError, Result};
pub use intercept::{
    AttachmentSlot, CallContext, CallError, ConstructContext, ConstructInterceptor, Decision,
    InterceptEngine, Interceptor, InterceptorRegistry, OperationId,
};
pub use trace::{
    ContextSnapshot, ListenerRegistry, Span, SpanId, SpanKind, SpanListener, SpanRecord,
    TraceContext, TraceId, TraceState, Tracer,
};
