//! The interceptor contract.
//!
//! All method-level shapes (before-only, after-only, around, replacement)
//! are polymorphic over the single [`Interceptor`] trait; construct
//! interceptors have a distinct lifecycle and their own trait. Hooks
//! return `anyhow::Result` — whatever they raise is logged at the engine
//! boundary and swallowed, never forwarded to the host call path.

use std::any::Any;
use std::sync::Arc;

use anyhow::Result;

use super::context::{CallContext, ConstructContext};
use super::decision::Decision;

/// A method interceptor. Process-wide: at most one live instance per
/// operation identity, created lazily by the registry and kept until
/// process shutdown. Implementations are stateless with respect to any
/// single call; shared resources (metric handles etc.) belong in fields
/// initialized by [`Interceptor::init`].
pub trait Interceptor: Send + Sync {
    /// One-time initialization, run before the instance is published.
    /// A failure here poisons the identity: interception for it decays to
    /// a no-op instead of retrying on every call.
    fn init(&mut self) -> Result<()> {
        Ok(())
    }

    /// Runs before the real call. The returned [`Decision`] controls
    /// whether [`Interceptor::after`] fires for this invocation.
    fn before(&self, _ctx: &mut CallContext) -> Result<Decision> {
        Ok(Decision::Continue)
    }

    /// Runs after the real call, on success and on error alike. The
    /// context is fully populated at this point: timing, return value,
    /// thrown error.
    fn after(&self, _ctx: &mut CallContext) -> Result<()> {
        Ok(())
    }
}

/// Fired once, at the end of an object's construction, with the fully
/// constructed receiver and the constructor arguments. Used to attach
/// auxiliary per-instance state rather than to wrap behavior.
pub trait ConstructInterceptor: Send + Sync {
    /// One-time initialization; same poisoning semantics as
    /// [`Interceptor::init`].
    fn init(&mut self) -> Result<()> {
        Ok(())
    }

    fn on_construct(&self, ctx: &mut ConstructContext<'_>) -> Result<()>;
}

/// An interceptor that runs only at exit and unconditionally replaces the
/// return value. Wrap it in [`Replacing`] to register it.
pub trait ReplacementInterceptor: Send + Sync {
    fn init(&mut self) -> Result<()> {
        Ok(())
    }

    /// Produce the value the caller will observe instead of the real
    /// call's result.
    fn replacement(&self, ctx: &CallContext) -> Result<Box<dyn Any>>;
}

/// Adapter turning a [`ReplacementInterceptor`] into a method interceptor.
pub struct Replacing<I>(pub I);

impl<I: ReplacementInterceptor> Interceptor for Replacing<I> {
    fn init(&mut self) -> Result<()> {
        self.0.init()
    }

    fn after(&self, ctx: &mut CallContext) -> Result<()> {
        let value = self.0.replacement(ctx)?;
        ctx.set_return_value(value);
        Ok(())
    }
}

/// Before-only shape: runs logic ahead of the call and always yields
/// [`Decision::Continue`].
pub struct BeforeOnly<F>(pub F);

impl<F> Interceptor for BeforeOnly<F>
where
    F: Fn(&mut CallContext) -> Result<()> + Send + Sync,
{
    fn before(&self, ctx: &mut CallContext) -> Result<Decision> {
        (self.0)(ctx)?;
        Ok(Decision::Continue)
    }
}

/// After-only shape: observes or rewrites the outcome, regardless of
/// success or failure of the real call.
pub struct AfterOnly<F>(pub F);

impl<F> Interceptor for AfterOnly<F>
where
    F: Fn(&mut CallContext) -> Result<()> + Send + Sync,
{
    fn after(&self, ctx: &mut CallContext) -> Result<()> {
        (self.0)(ctx)
    }
}

/// A live, initialized interceptor as stored by the registry.
#[derive(Clone)]
pub enum Handler {
    Method(Arc<dyn Interceptor>),
    Construct(Arc<dyn ConstructInterceptor>),
}

impl Handler {
    pub fn as_method(&self) -> Option<&Arc<dyn Interceptor>> {
        match self {
            Handler::Method(i) => Some(i),
            Handler::Construct(_) => None,
        }
    }

    pub fn as_construct(&self) -> Option<&Arc<dyn ConstructInterceptor>> {
        match self {
            Handler::Construct(i) => Some(i),
            Handler::Method(_) => None,
        }
    }
}

impl std::fmt::Debug for Handler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Handler::Method(_) => f.write_str("Handler::Method"),
            Handler::Construct(_) => f.write_str("Handler::Construct"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intercept::context::OperationId;

    fn ctx() -> CallContext {
        CallContext::new(OperationId::new("t::op"), None, vec![Box::new(1u32)])
    }

    struct Doubler;

    impl ReplacementInterceptor for Doubler {
        fn replacement(&self, ctx: &CallContext) -> Result<Box<dyn Any>> {
            let n = ctx.arg::<u32>(0).copied().unwrap_or(0);
            Ok(Box::new(n * 2))
        }
    }

    #[test]
    fn replacing_adapter_overwrites_return_slot() {
        let interceptor = Replacing(Doubler);
        let mut ctx = ctx();
        ctx.set_return_value(Box::new(1u32));
        interceptor.after(&mut ctx).unwrap();
        assert_eq!(ctx.return_value_as::<u32>(), Some(&2));
    }

    #[test]
    fn before_only_always_continues() {
        let interceptor = BeforeOnly(|ctx: &mut CallContext| {
            ctx.set_user_state(Box::new("seen"));
            Ok(())
        });
        let mut ctx = ctx();
        let decision = interceptor.before(&mut ctx).unwrap();
        assert_eq!(decision, Decision::Continue);
        assert_eq!(ctx.user_state::<&str>(), Some(&"seen"));
        // default after-hook is a no-op
        interceptor.after(&mut ctx).unwrap();
    }

    #[test]
    fn after_only_leaves_before_at_default() {
        let interceptor = AfterOnly(|ctx: &mut CallContext| {
            ctx.set_return_value(Box::new("rewritten"));
            Ok(())
        });
        let mut ctx = ctx();
        assert_eq!(interceptor.before(&mut ctx).unwrap(), Decision::Continue);
        interceptor.after(&mut ctx).unwrap();
        assert_eq!(ctx.return_value_as::<&str>(), Some(&"rewritten"));
    }
}
