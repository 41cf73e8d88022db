//! Trace contexts: the per-unit-of-work container for one logical trace.
//!
//! A context owns the LIFO stack of active spans, the span-id generator,
//! and the propagated trace state. Two variants exist behind the same
//! type: a *reporting* context whose spans reach listeners, and a
//! *propagation-only* context whose spans exist purely to keep
//! parent/child id generation consistent when sampling is off.
//!
//! A context is owned by exactly one execution unit. To continue a trace
//! on another unit, [`TraceContext::capture`] produces a `Send`
//! [`ContextSnapshot`] from which the receiving unit builds a fresh,
//! independently owned context sharing the trace id.

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;

use tracing::{debug, warn};

use super::id::{SpanId, SpanIdGenerator, TraceId};
use super::listener::ListenerRegistry;
use super::propagation::TraceState;
use super::span::{Span, SpanState};

pub(crate) struct ContextInner {
    pub(crate) trace_id: TraceId,
    generator: SpanIdGenerator,
    pub(crate) stack: Vec<Rc<RefCell<SpanState>>>,
    pub(crate) finished: bool,
    pub(crate) reporting: bool,
    inconsistent: bool,
    trace_state: Arc<TraceState>,
    pub(crate) listeners: Arc<ListenerRegistry>,
    /// Parent id seeded by a fork/continuation: root-level spans in this
    /// context become children of the span that spawned it.
    seed_parent: Option<SpanId>,
}

impl ContextInner {
    /// Pop a finished span off the stack. Out-of-order finishes and
    /// empty-stack pops are internal inconsistencies: log, flag, and keep
    /// going — never throw.
    pub(crate) fn pop_finished(&mut self, state: &Rc<RefCell<SpanState>>) {
        match self.stack.last() {
            None => {
                warn!(
                    trace_id = %self.trace_id,
                    span_id = %state.borrow().span_id,
                    "span finished but the context stack is empty"
                );
                self.inconsistent = true;
            }
            Some(top) if Rc::ptr_eq(top, state) => {
                self.stack.pop();
            }
            Some(top) => {
                warn!(
                    trace_id = %self.trace_id,
                    finished = %state.borrow().span_id,
                    expected = %top.borrow().span_id,
                    "out-of-order span finish; stack left as-is"
                );
                self.inconsistent = true;
            }
        }
    }
}

/// Snapshot of a context for async forking and cross-process
/// continuation. `Send` by construction: the receiving execution unit
/// builds its own context from it.
#[derive(Debug, Clone)]
pub struct ContextSnapshot {
    pub trace_id: TraceId,
    /// Span that spawned the continuation; root spans of the continued
    /// context become its children.
    pub parent_span_id: Option<SpanId>,
    pub trace_state: Arc<TraceState>,
    /// Trace-wide sampling decision.
    pub sampled: bool,
}

/// Handle onto one trace context. Clones share the same context.
#[derive(Clone)]
pub struct TraceContext {
    inner: Rc<RefCell<ContextInner>>,
}

impl TraceContext {
    fn build(
        trace_id: TraceId,
        reporting: bool,
        trace_state: Arc<TraceState>,
        listeners: Arc<ListenerRegistry>,
        seed_parent: Option<SpanId>,
    ) -> Self {
        Self {
            inner: Rc::new(RefCell::new(ContextInner {
                trace_id,
                generator: SpanIdGenerator::new(),
                stack: Vec::new(),
                finished: false,
                reporting,
                inconsistent: false,
                trace_state,
                listeners,
                seed_parent,
            })),
        }
    }

    /// Fresh reporting context for a new logical trace.
    pub fn reporting(listeners: Arc<ListenerRegistry>) -> Self {
        Self::build(
            TraceId::generate(),
            true,
            TraceState::shared_empty(),
            listeners,
            None,
        )
    }

    /// Fresh propagation-only context: spans keep ids consistent but are
    /// never reported.
    pub fn propagation_only(listeners: Arc<ListenerRegistry>) -> Self {
        Self::build(
            TraceId::generate(),
            false,
            TraceState::shared_empty(),
            listeners,
            None,
        )
    }

    /// Continue a trace captured elsewhere (async fork or inbound
    /// propagation). Shares the trace id, starts a fresh stack.
    pub fn continued(snapshot: ContextSnapshot, listeners: Arc<ListenerRegistry>) -> Self {
        Self::build(
            snapshot.trace_id,
            snapshot.sampled,
            snapshot.trace_state,
            listeners,
            snapshot.parent_span_id,
        )
    }

    pub fn trace_id(&self) -> TraceId {
        self.inner.borrow().trace_id.clone()
    }

    pub fn is_reporting(&self) -> bool {
        self.inner.borrow().reporting
    }

    pub fn is_finished(&self) -> bool {
        self.inner.borrow().finished
    }

    /// Flag set when a span protocol violation was observed (out-of-order
    /// finish, pop on empty stack).
    pub fn is_inconsistent(&self) -> bool {
        self.inner.borrow().inconsistent
    }

    /// Current depth of the active span stack.
    pub fn depth(&self) -> usize {
        self.inner.borrow().stack.len()
    }

    /// Total number of span ids this context has minted.
    pub fn spans_issued(&self) -> u32 {
        self.inner.borrow().generator.issued()
    }

    pub fn trace_state(&self) -> Arc<TraceState> {
        self.inner.borrow().trace_state.clone()
    }

    pub fn set_trace_state(&self, trace_state: Arc<TraceState>) {
        self.inner.borrow_mut().trace_state = trace_state;
    }

    /// Create a span and push it onto the stack. The parent defaults to
    /// the current top of the stack (or the fork seed for root spans).
    pub fn new_span(&self, name: impl Into<String>) -> Span {
        new_span_on(&self.inner, name.into(), None, None)
    }

    /// Create a span with an explicit parent and/or explicit id.
    pub fn new_span_with(
        &self,
        name: impl Into<String>,
        parent: Option<SpanId>,
        explicit_id: Option<SpanId>,
    ) -> Span {
        new_span_on(&self.inner, name.into(), parent, explicit_id)
    }

    /// Handle onto the span at the top of the stack. `None` once the
    /// context is finished or the stack is empty.
    pub fn current_span(&self) -> Option<Span> {
        let inner = self.inner.borrow();
        if inner.finished {
            return None;
        }
        inner
            .stack
            .last()
            .map(|top| Span::from_parts(Rc::downgrade(&self.inner), top.clone()))
    }

    /// Capture a `Send` snapshot for async forking: same trace id, the
    /// current span as parent, the propagated trace state, and the
    /// trace-wide sampling decision.
    pub fn capture(&self) -> ContextSnapshot {
        let inner = self.inner.borrow();
        let parent_span_id = inner
            .stack
            .last()
            .map(|top| top.borrow().span_id.clone())
            .or_else(|| inner.seed_parent.clone());
        ContextSnapshot {
            trace_id: inner.trace_id.clone(),
            parent_span_id,
            trace_state: inner.trace_state.clone(),
            sampled: inner.reporting,
        }
    }

    /// Finish the context. Any span still open is considered leaked and
    /// is discarded — the stack is force-cleared and no new spans are
    /// accepted afterwards. Idempotent.
    pub fn finish(&self) {
        let mut inner = self.inner.borrow_mut();
        if inner.finished {
            debug!(trace_id = %inner.trace_id, "context already finished");
            return;
        }
        if !inner.stack.is_empty() {
            warn!(
                trace_id = %inner.trace_id,
                leaked = inner.stack.len(),
                "context finished with open spans; discarding them"
            );
            for state in inner.stack.drain(..) {
                state.borrow_mut().phase = super::span::SpanPhase::Finished;
            }
        }
        inner.finished = true;
    }
}

impl std::fmt::Debug for TraceContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.borrow();
        f.debug_struct("TraceContext")
            .field("trace_id", &inner.trace_id)
            .field("depth", &inner.stack.len())
            .field("reporting", &inner.reporting)
            .field("finished", &inner.finished)
            .finish()
    }
}

/// Create a span on a context, pushing it onto the stack at creation.
/// Returns a no-op span when the context is already finished.
pub(crate) fn new_span_on(
    inner: &Rc<RefCell<ContextInner>>,
    name: String,
    parent: Option<SpanId>,
    explicit_id: Option<SpanId>,
) -> Span {
    let mut ctx = inner.borrow_mut();
    if ctx.finished {
        warn!(
            trace_id = %ctx.trace_id,
            span = %name,
            "span requested on a finished context; returning no-op span"
        );
        return Span::noop();
    }

    let parent = parent
        .or_else(|| ctx.stack.last().map(|top| top.borrow().span_id.clone()))
        .or_else(|| ctx.seed_parent.clone());
    let span_id = explicit_id.unwrap_or_else(|| ctx.generator.next());
    let state = Rc::new(RefCell::new(SpanState::new(
        ctx.trace_id.clone(),
        span_id,
        parent,
        name,
    )));
    ctx.stack.push(state.clone());
    Span::from_parts(Rc::downgrade(inner), state)
}
