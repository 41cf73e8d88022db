//! Call interception: the decision/context model, the interceptor
//! contract, the process-wide registry, and the fail-open engine boundary.
//!
//! Flow: the external weaving mechanism calls
//! [`InterceptEngine::on_enter`] with a call's identity, receiver and
//! arguments; the engine resolves (or reuses) the interceptor, builds a
//! [`CallContext`], and returns the interceptor's [`Decision`]. After the
//! real call the mechanism hands the outcome to
//! [`InterceptEngine::on_exit`], which forwards it into the same context
//! for the after-hook — unless the decision was [`Decision::SkipLeave`].

pub mod context;
pub mod decision;
pub mod engine;
pub mod interceptor;
pub mod registry;

pub use context::{AttachmentSlot, CallContext, CallError, ConstructContext, OperationId};
pub use decision::Decision;
pub use engine::InterceptEngine;
pub use interceptor::{
    AfterOnly, BeforeOnly, ConstructInterceptor, Handler, Interceptor, ReplacementInterceptor,
    Replacing,
};
pub use registry::InterceptorRegistry;
