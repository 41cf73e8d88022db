//! The interception engine boundary.
//!
//! The weaving mechanism (decorators, middleware, explicit wrappers —
//! whatever the host platform offers) calls [`InterceptEngine::on_enter`]
//! before the real call and [`InterceptEngine::on_exit`] after it. The one
//! safety invariant everything else hangs off: a failing interceptor must
//! never crash or stall the host call. Hook errors and hook panics are
//! caught right here, logged with the interceptor and operation identity,
//! and swallowed.

use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use tracing::warn;

use super::context::{CallContext, CallError, ConstructContext, OperationId};
use super::decision::Decision;
use super::interceptor::Handler;
use super::registry::InterceptorRegistry;

/// Entry point for the external call-interception mechanism.
pub struct InterceptEngine {
    registry: Arc<InterceptorRegistry>,
}

impl InterceptEngine {
    pub fn new(registry: Arc<InterceptorRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<InterceptorRegistry> {
        &self.registry
    }

    /// Enter hook. Builds the per-invocation context, resolves (or
    /// reuses) the interceptor, and asks it for a decision.
    ///
    /// The caller must re-read `args` from the returned context before
    /// running the real call: a before-hook may have rewritten them.
    pub fn on_enter(
        &self,
        operation: OperationId,
        receiver: Option<Box<dyn Any>>,
        args: Vec<Box<dyn Any>>,
    ) -> (Decision, CallContext) {
        let mut ctx = CallContext::new(operation, receiver, args);

        let Some(Handler::Method(interceptor)) =
            self.registry.get_or_create(ctx.operation().name())
        else {
            return (Decision::Continue, ctx);
        };

        let decision = match catch_unwind(AssertUnwindSafe(|| interceptor.before(&mut ctx))) {
            Ok(Ok(decision)) => decision,
            Ok(Err(err)) => {
                warn!(
                    operation = %ctx.operation(),
                    error = %err,
                    "interceptor before-hook failed; continuing"
                );
                Decision::Continue
            }
            Err(payload) => {
                warn!(
                    operation = %ctx.operation(),
                    panic = panic_message(&payload),
                    "interceptor before-hook panicked; continuing"
                );
                Decision::Continue
            }
        };

        (decision, ctx)
    }

    /// Exit hook. Records the real call's outcome and elapsed time into
    /// the context, then runs the after-hook.
    ///
    /// The caller must invoke this even when the real call raised an
    /// error — unless the enter decision was [`Decision::SkipLeave`] — and
    /// must re-read the (possibly overwritten) return value afterwards.
    pub fn on_exit(
        &self,
        ctx: &mut CallContext,
        return_value: Option<Box<dyn Any>>,
        error: Option<CallError>,
    ) {
        if let Some(value) = return_value {
            ctx.set_return_value(value);
        }
        ctx.set_error(error);
        ctx.record_elapsed();

        let Some(Handler::Method(interceptor)) =
            self.registry.get_or_create(ctx.operation().name())
        else {
            return;
        };

        match catch_unwind(AssertUnwindSafe(|| interceptor.after(ctx))) {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                warn!(
                    operation = %ctx.operation(),
                    error = %err,
                    "interceptor after-hook failed; outcome delivered unchanged"
                );
            }
            Err(payload) => {
                warn!(
                    operation = %ctx.operation(),
                    panic = panic_message(&payload),
                    "interceptor after-hook panicked; outcome delivered unchanged"
                );
            }
        }
    }

    /// Construction hook, fired once at the end of an object's
    /// construction with the fully built receiver.
    pub fn on_construct(
        &self,
        operation: &OperationId,
        receiver: &mut dyn Any,
        args: &mut [Box<dyn Any>],
    ) {
        let Some(Handler::Construct(interceptor)) = self.registry.get_or_create(operation.name())
        else {
            return;
        };

        let mut ctx = ConstructContext::new(operation, receiver, args);
        match catch_unwind(AssertUnwindSafe(|| interceptor.on_construct(&mut ctx))) {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                warn!(
                    operation = %operation,
                    error = %err,
                    "construct interceptor failed; instance left untouched"
                );
            }
            Err(payload) => {
                warn!(
                    operation = %operation,
                    panic = panic_message(&payload),
                    "construct interceptor panicked; instance left untouched"
                );
            }
        }
    }
}

/// Best-effort extraction of a panic payload message for the log line.
fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s
    } else {
        "<non-string panic payload>"
    }
}
