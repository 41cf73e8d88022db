//! Thread-local holder for the current trace context.
//!
//! Each execution unit holds at most one active context. Every accessor
//! tolerates an empty slot: call sites get no-op spans instead of errors,
//! so instrumentation degrades silently when no tracer is active.
//!
//! The slot must be cleared (or the context finished) when the unit of
//! work completes, otherwise pooled threads leak contexts into unrelated
//! work — `current()` guards against the worst of it by dropping contexts
//! that are already finished.

use std::cell::RefCell;

use super::context::TraceContext;
use super::span::Span;

thread_local! {
    static CURRENT: RefCell<Option<TraceContext>> = const { RefCell::new(None) };
}

/// Make `context` the current context for this execution unit, replacing
/// any previous one.
pub fn attach(context: TraceContext) {
    CURRENT.with(|slot| {
        *slot.borrow_mut() = Some(context);
    });
}

/// The current context, if one is attached and still live. A finished
/// context is stale: it is dropped from the slot and `None` is returned.
pub fn current() -> Option<TraceContext> {
    CURRENT.with(|slot| {
        let mut slot = slot.borrow_mut();
        match slot.as_ref() {
            Some(context) if context.is_finished() => {
                *slot = None;
                None
            }
            Some(context) => Some(context.clone()),
            None => None,
        }
    })
}

/// Clear the slot. Call on unit-of-work completion.
pub fn clear() {
    CURRENT.with(|slot| {
        *slot.borrow_mut() = None;
    });
}

/// The span at the top of the current context's stack, or a no-op span
/// when there is no current context or no active span.
pub fn active_span() -> Span {
    current()
        .and_then(|context| context.current_span())
        .unwrap_or_else(Span::noop)
}

/// Open a child of the currently active span. With an active context but
/// an empty stack this creates a root span; with no context at all it
/// returns a no-op span that accepts every call and mutates nothing.
pub fn child_span(name: impl Into<String>) -> Span {
    match current() {
        Some(context) => match context.current_span() {
            Some(active) => active.new_child(name),
            None => context.new_span(name),
        },
        None => Span::noop(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trace::listener::ListenerRegistry;
    use std::sync::Arc;

    fn fresh_context() -> TraceContext {
        TraceContext::reporting(Arc::new(ListenerRegistry::new()))
    }

    // Each #[test] runs on its own thread, so the thread-local slot is
    // isolated per test.

    #[test]
    fn empty_slot_degrades_to_noop() {
        assert!(current().is_none());
        assert!(!active_span().is_recording());
        let span = child_span("db");
        assert!(!span.is_recording());
        span.tag("stmt", "select 1");
        span.finish(); // accepted, touches nothing
    }

    #[test]
    fn attach_then_clear() {
        let context = fresh_context();
        attach(context.clone());
        assert_eq!(current().unwrap().trace_id(), context.trace_id());
        clear();
        assert!(current().is_none());
    }

    #[test]
    fn finished_context_is_stale() {
        let context = fresh_context();
        attach(context.clone());
        context.finish();
        assert!(current().is_none());
        // the stale guard also emptied the slot
        attach(fresh_context());
        assert!(current().is_some());
    }

    #[test]
    fn child_span_with_active_context() {
        let context = fresh_context();
        attach(context.clone());
        let root = context.new_span("request");
        let child = child_span("db");
        assert_eq!(child.parent_span_id(), root.span_id());
        child.finish();
        root.finish();
        clear();
    }
}
