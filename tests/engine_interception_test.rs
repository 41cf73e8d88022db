//! End-to-end interception scenarios: the weaving mechanism's view of
//! on_enter/on_exit, decision semantics, and the fail-open boundary.

use std::any::Any;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::anyhow;
use filament::intercept::{AfterOnly, ReplacementInterceptor, Replacing};
use filament::{
    CallContext, CallError, Decision, InterceptEngine, Interceptor, InterceptorRegistry,
    OperationId,
};

/// Route `tracing` output through the test harness; filter via `RUST_LOG`.
fn init_tracing() {
    static INIT: std::sync::Once = std::sync::Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// Simulates the external weaving mechanism around a real call.
/// Returns the value the caller would observe.
fn weave_call(
    engine: &InterceptEngine,
    operation: &str,
    args: Vec<Box<dyn Any>>,
    real_call: impl FnOnce(&CallContext) -> Box<dyn Any>,
) -> Box<dyn Any> {
    let (decision, mut ctx) = engine.on_enter(OperationId::new(operation), None, args);
    // the real call always executes, using the (possibly rewritten) args
    let result = real_call(&ctx);
    if decision == Decision::SkipLeave {
        return result;
    }
    engine.on_exit(&mut ctx, Some(result), None);
    ctx.take_return_value().expect("return slot populated")
}

struct SkipOnBadArgs {
    after_calls: Arc<AtomicUsize>,
}

impl Interceptor for SkipOnBadArgs {
    fn before(&self, ctx: &mut CallContext) -> anyhow::Result<Decision> {
        match ctx.arg::<u32>(0) {
            Some(_) => Ok(Decision::Continue),
            None => Ok(Decision::SkipLeave),
        }
    }

    fn after(&self, _ctx: &mut CallContext) -> anyhow::Result<()> {
        self.after_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

struct ThrowsOnEnter;

impl Interceptor for ThrowsOnEnter {
    fn before(&self, _ctx: &mut CallContext) -> anyhow::Result<Decision> {
        Err(anyhow!("interceptor blew up"))
    }
}

struct ArgRewriter;

impl Interceptor for ArgRewriter {
    fn before(&self, ctx: &mut CallContext) -> anyhow::Result<Decision> {
        ctx.replace_arg(0, Box::new(100u32));
        Ok(Decision::Continue)
    }
}

struct TimingRecorder {
    observed_elapsed: Arc<AtomicUsize>,
}

impl Interceptor for TimingRecorder {
    fn before(&self, ctx: &mut CallContext) -> anyhow::Result<Decision> {
        ctx.set_user_state(Box::new("enter-state".to_string()));
        Ok(Decision::Continue)
    }

    fn after(&self, ctx: &mut CallContext) -> anyhow::Result<()> {
        assert_eq!(
            ctx.user_state::<String>().map(String::as_str),
            Some("enter-state"),
            "user state must survive from enter to exit"
        );
        if ctx.elapsed().is_some() {
            self.observed_elapsed.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }
}

#[test]
fn test_skip_leave_suppresses_after_hook_but_not_the_call() {
    init_tracing();
    let after_calls = Arc::new(AtomicUsize::new(0));
    let registry = Arc::new(InterceptorRegistry::new());
    let counter = after_calls.clone();
    registry
        .register_method("svc::parse", move || {
            Ok(Box::new(SkipOnBadArgs {
                after_calls: counter.clone(),
            }))
        })
        .unwrap();
    let engine = InterceptEngine::new(registry);

    // malformed args: SkipLeave, real call still runs, result observable
    let result = weave_call(&engine, "svc::parse", vec![Box::new("not-a-u32")], |_| {
        Box::new("real-result".to_string())
    });
    assert_eq!(
        result.downcast_ref::<String>().map(String::as_str),
        Some("real-result")
    );
    assert_eq!(after_calls.load(Ordering::SeqCst), 0);

    // well-formed args: after-hook fires
    weave_call(&engine, "svc::parse", vec![Box::new(3u32)], |_| {
        Box::new("ok".to_string())
    });
    assert_eq!(after_calls.load(Ordering::SeqCst), 1);
}

#[test]
fn test_throwing_interceptor_leaves_result_unchanged() {
    init_tracing();
    let registry = Arc::new(InterceptorRegistry::new());
    registry
        .register_method("svc::fragile", || Ok(Box::new(ThrowsOnEnter)))
        .unwrap();
    let engine = InterceptEngine::new(registry);

    let result = weave_call(&engine, "svc::fragile", vec![], |_| Box::new(41i64));
    assert_eq!(result.downcast_ref::<i64>(), Some(&41));
}

#[test]
fn test_rewritten_args_are_visible_to_the_real_call() {
    init_tracing();
    let registry = Arc::new(InterceptorRegistry::new());
    registry
        .register_method("svc::rewrite", || Ok(Box::new(ArgRewriter)))
        .unwrap();
    let engine = InterceptEngine::new(registry);

    let result = weave_call(&engine, "svc::rewrite", vec![Box::new(1u32)], |ctx| {
        // the mechanism re-reads args from the context after on_enter
        Box::new(*ctx.arg::<u32>(0).unwrap())
    });
    assert_eq!(result.downcast_ref::<u32>(), Some(&100));
}

#[test]
fn test_after_hook_sees_timing_and_user_state() {
    init_tracing();
    let observed = Arc::new(AtomicUsize::new(0));
    let registry = Arc::new(InterceptorRegistry::new());
    let counter = observed.clone();
    registry
        .register_method("svc::timed", move || {
            Ok(Box::new(TimingRecorder {
                observed_elapsed: counter.clone(),
            }))
        })
        .unwrap();
    let engine = InterceptEngine::new(registry);

    weave_call(&engine, "svc::timed", vec![], |_| Box::new(()));
    assert_eq!(observed.load(Ordering::SeqCst), 1);
}

#[test]
fn test_after_only_interceptor_observes_call_error() {
    init_tracing();
    let registry = Arc::new(InterceptorRegistry::new());
    registry
        .register_method("svc::failing", || {
            Ok(Box::new(AfterOnly(|ctx: &mut CallContext| {
                let error = ctx.error().expect("error recorded");
                assert_eq!(error.type_name(), "TimeoutError");
                ctx.set_user_state(Box::new(true));
                Ok(())
            })))
        })
        .unwrap();
    let engine = InterceptEngine::new(registry);

    let (_, mut ctx) = engine.on_enter(OperationId::new("svc::failing"), None, vec![]);
    engine.on_exit(
        &mut ctx,
        None,
        Some(CallError::new("TimeoutError", "deadline exceeded")),
    );
    assert_eq!(ctx.user_state::<bool>(), Some(&true));
    assert!(ctx.return_value().is_none());
}

struct HandleCache;

impl filament::ConstructInterceptor for HandleCache {
    fn on_construct(&self, ctx: &mut filament::ConstructContext<'_>) -> anyhow::Result<()> {
        let pool_size = ctx.arg::<usize>(0).copied().unwrap_or(0);
        let client = ctx
            .receiver_as_mut::<Client>()
            .ok_or_else(|| anyhow!("unexpected receiver type"))?;
        client.slot.set(Box::new(pool_size * 2));
        Ok(())
    }
}

#[derive(Default)]
struct Client {
    slot: filament::AttachmentSlot,
}

#[test]
fn test_construct_interceptor_attaches_per_instance_state() {
    init_tracing();
    let registry = Arc::new(InterceptorRegistry::new());
    registry
        .register_construct("svc::Client::new", || Ok(Box::new(HandleCache)))
        .unwrap();
    let engine = InterceptEngine::new(registry);

    let mut client = Client::default();
    let mut args: Vec<Box<dyn Any>> = vec![Box::new(8usize)];
    engine.on_construct(
        &OperationId::new("svc::Client::new"),
        &mut client,
        &mut args,
    );
    assert_eq!(client.slot.get::<usize>(), Some(&16));
}

#[test]
fn test_construct_interceptor_failure_leaves_instance_untouched() {
    init_tracing();
    let registry = Arc::new(InterceptorRegistry::new());
    registry
        .register_construct("svc::Client::new", || Ok(Box::new(HandleCache)))
        .unwrap();
    let engine = InterceptEngine::new(registry);

    // wrong receiver type: the interceptor errors, the engine swallows it
    let mut not_a_client = String::from("something else");
    let mut args: Vec<Box<dyn Any>> = vec![Box::new(8usize)];
    engine.on_construct(
        &OperationId::new("svc::Client::new"),
        &mut not_a_client,
        &mut args,
    );
    assert_eq!(not_a_client, "something else");
}

struct CannedValue;

impl ReplacementInterceptor for CannedValue {
    fn replacement(&self, _ctx: &CallContext) -> anyhow::Result<Box<dyn Any>> {
        Ok(Box::new("replacement".to_string()))
    }
}

#[test]
fn test_replacement_interceptor_overwrites_return_value() {
    init_tracing();
    let registry = Arc::new(InterceptorRegistry::new());
    registry
        .register_method("svc::replaced", || Ok(Box::new(Replacing(CannedValue))))
        .unwrap();
    let engine = InterceptEngine::new(registry);

    let result = weave_call(&engine, "svc::replaced", vec![], |_| {
        Box::new("original".to_string())
    });
    assert_eq!(
        result.downcast_ref::<String>().map(String::as_str),
        Some("replacement")
    );
}
