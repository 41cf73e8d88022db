//! Spans: timed, tagged units of work within a trace.
//!
//! A [`Span`] is a cheap handle onto state owned by its trace context.
//! The state machine is `Created -> Started -> Finished`; `Finished` is
//! terminal and `finish()` is idempotent. Pushing onto the context stack
//! happens at *creation* — `start()` only sets the start timestamp and
//! fires lifecycle listeners.
//!
//! A no-op span ([`Span::noop`]) accepts every call and touches nothing.
//! Call sites never need to care whether a tracer is active.

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::context::ContextInner;
use super::id::{SpanId, TraceId};

/// What side of a cross-process boundary a span sits on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpanKind {
    /// Service entry point (inbound request).
    Entry,
    /// Outbound call to another process.
    Exit,
    /// Work local to the current process.
    #[default]
    Local,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SpanPhase {
    Created,
    Started,
    Finished,
}

pub(crate) struct SpanState {
    pub(crate) trace_id: TraceId,
    pub(crate) span_id: SpanId,
    pub(crate) parent_span_id: Option<SpanId>,
    pub(crate) name: String,
    pub(crate) kind: SpanKind,
    pub(crate) component: Option<String>,
    pub(crate) tags: Vec<(String, String)>,
    pub(crate) error: Option<String>,
    pub(crate) created_at: SystemTime,
    pub(crate) start_us: u64,
    pub(crate) end_us: u64,
    pub(crate) phase: SpanPhase,
}

impl SpanState {
    pub(crate) fn new(
        trace_id: TraceId,
        span_id: SpanId,
        parent_span_id: Option<SpanId>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            trace_id,
            span_id,
            parent_span_id,
            name: name.into(),
            kind: SpanKind::default(),
            component: None,
            tags: Vec::new(),
            error: None,
            created_at: SystemTime::now(),
            start_us: 0,
            end_us: 0,
            phase: SpanPhase::Created,
        }
    }
}

/// Immutable snapshot of a span, handed to lifecycle listeners and
/// exporters.
#[derive(Debug, Clone, Serialize)]
pub struct SpanRecord {
    pub trace_id: TraceId,
    pub span_id: SpanId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_span_id: Option<SpanId>,
    pub name: String,
    pub kind: SpanKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub component: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<(String, String)>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Start time in microseconds since Unix epoch (0 if never started).
    pub start_time_unix_micros: u64,
    /// End time in microseconds since Unix epoch (0 until finished).
    pub end_time_unix_micros: u64,
    pub duration_us: u64,
    /// Creation time, human-readable.
    #[serde(serialize_with = "serialize_system_time")]
    pub timestamp: SystemTime,
}

impl SpanRecord {
    pub(crate) fn from_state(state: &SpanState) -> Self {
        Self {
            trace_id: state.trace_id.clone(),
            span_id: state.span_id.clone(),
            parent_span_id: state.parent_span_id.clone(),
            name: state.name.clone(),
            kind: state.kind,
            component: state.component.clone(),
            tags: state.tags.clone(),
            error: state.error.clone(),
            start_time_unix_micros: state.start_us,
            end_time_unix_micros: state.end_us,
            duration_us: state.end_us.saturating_sub(state.start_us),
            timestamp: state.created_at,
        }
    }
}

/// Handle onto one span. Clones refer to the same underlying span.
#[derive(Clone)]
pub struct Span {
    ctx: Weak<RefCell<ContextInner>>,
    state: Option<Rc<RefCell<SpanState>>>,
}

impl Span {
    pub(crate) fn from_parts(
        ctx: Weak<RefCell<ContextInner>>,
        state: Rc<RefCell<SpanState>>,
    ) -> Self {
        Self {
            ctx,
            state: Some(state),
        }
    }

    /// A detached span that accepts every operation and records nothing.
    /// Returned wherever no trace context is active.
    pub fn noop() -> Self {
        Self {
            ctx: Weak::new(),
            state: None,
        }
    }

    /// Whether this span records anything at all.
    pub fn is_recording(&self) -> bool {
        self.state.is_some()
    }

    pub fn span_id(&self) -> Option<SpanId> {
        self.state.as_ref().map(|s| s.borrow().span_id.clone())
    }

    pub fn parent_span_id(&self) -> Option<SpanId> {
        self.state
            .as_ref()
            .and_then(|s| s.borrow().parent_span_id.clone())
    }

    pub fn trace_id(&self) -> Option<TraceId> {
        self.state.as_ref().map(|s| s.borrow().trace_id.clone())
    }

    pub fn is_finished(&self) -> bool {
        self.state
            .as_ref()
            .map(|s| s.borrow().phase == SpanPhase::Finished)
            .unwrap_or(false)
    }

    /// Set the start timestamp and fire `on_span_started`. Creation
    /// already pushed the span onto its context's stack; starting twice
    /// is ignored.
    pub fn start(&self) {
        let Some(state_rc) = &self.state else { return };
        {
            let mut state = state_rc.borrow_mut();
            if state.phase != SpanPhase::Created {
                debug!(span_id = %state.span_id, "span already started");
                return;
            }
            state.phase = SpanPhase::Started;
            state.start_us = now_micros();
        }
        if let Some(ctx) = self.ctx.upgrade() {
            let (reporting, listeners) = {
                let inner = ctx.borrow();
                (inner.reporting, inner.listeners.clone())
            };
            if reporting {
                listeners.notify_started(&SpanRecord::from_state(&state_rc.borrow()));
            }
        }
    }

    pub fn set_kind(&self, kind: SpanKind) {
        self.mutate(|state| state.kind = kind);
    }

    pub fn set_component(&self, component: impl Into<String>) {
        let component = component.into();
        self.mutate(|state| state.component = Some(component));
    }

    /// Attach a free-form string tag.
    pub fn tag(&self, key: impl Into<String>, value: impl Into<String>) {
        let (key, value) = (key.into(), value.into());
        self.mutate(|state| state.tags.push((key, value)));
    }

    /// Record an error against this span.
    pub fn record_error(&self, error: impl fmt::Display) {
        let text = error.to_string();
        self.mutate(|state| state.error = Some(text));
    }

    fn mutate(&self, apply: impl FnOnce(&mut SpanState)) {
        let Some(state_rc) = &self.state else { return };
        let mut state = state_rc.borrow_mut();
        if state.phase == SpanPhase::Finished {
            debug!(span_id = %state.span_id, "ignoring mutation of finished span");
            return;
        }
        apply(&mut state);
    }

    /// Create a child span on the same context, pushed onto its stack.
    pub fn new_child(&self, name: impl Into<String>) -> Span {
        let Some(state_rc) = &self.state else {
            return Span::noop();
        };
        let Some(ctx) = self.ctx.upgrade() else {
            return Span::noop();
        };
        let parent = Some(state_rc.borrow().span_id.clone());
        super::context::new_span_on(&ctx, name.into(), parent, None)
    }

    /// Finish the span: set the end timestamp, notify listeners, and pop
    /// it from the owning context's stack. Idempotent — a second call
    /// neither corrupts the stack nor re-emits the span.
    pub fn finish(&self) {
        let Some(state_rc) = &self.state else { return };
        {
            let mut state = state_rc.borrow_mut();
            if state.phase == SpanPhase::Finished {
                debug!(span_id = %state.span_id, "span already finished");
                return;
            }
            if state.start_us == 0 {
                // Finished without an explicit start.
                state.start_us = now_micros();
            }
            state.phase = SpanPhase::Finished;
            state.end_us = now_micros();
        }

        let record = SpanRecord::from_state(&state_rc.borrow());
        if let Some(ctx) = self.ctx.upgrade() {
            let (reporting, listeners) = {
                let mut inner = ctx.borrow_mut();
                inner.pop_finished(state_rc);
                (inner.reporting, inner.listeners.clone())
            };
            // Listeners are notified even when the pop was inconsistent;
            // forward progress beats a perfect stack.
            if reporting {
                listeners.notify_finished(&record);
            }
        }
    }

    /// Snapshot of the span's current state. `None` for no-op spans.
    pub fn record(&self) -> Option<SpanRecord> {
        self.state
            .as_ref()
            .map(|s| SpanRecord::from_state(&s.borrow()))
    }
}

impl fmt::Debug for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.state {
            None => f.write_str("Span::noop"),
            Some(state) => {
                let state = state.borrow();
                f.debug_struct("Span")
                    .field("trace_id", &state.trace_id)
                    .field("span_id", &state.span_id)
                    .field("name", &state.name)
                    .field("phase", &state.phase)
                    .finish()
            }
        }
    }
}

pub(crate) fn now_micros() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_micros() as u64)
        .unwrap_or(0)
}

/// Serialize SystemTime as an RFC3339 string.
fn serialize_system_time<S>(time: &SystemTime, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    use chrono::{DateTime, Utc};
    let datetime: DateTime<Utc> = (*time).into();
    serializer.serialize_str(&datetime.to_rfc3339())
}
