//! Cross-process propagation: the trace-state text codec and the generic
//! carrier inject/extract pair.
//!
//! The wire form of trace state is `k1=v1,k2=v2,...` — ASCII, comma and
//! equals separated, no escaping. Values containing the delimiters are
//! rejected at `set` time rather than silently corrupting the text;
//! malformed entries on the inbound side are skipped. This keeps wire
//! compatibility with existing producers.

use std::sync::Arc;

use once_cell::sync::Lazy;
use serde::Serialize;
use tracing::{trace, warn};

use super::context::{ContextSnapshot, TraceContext};
use super::id::{SpanId, TraceId};

/// Carrier key for the trace id.
pub const TRACE_ID_KEY: &str = "filament-trace-id";
/// Carrier key for the current span id.
pub const SPAN_ID_KEY: &str = "filament-span-id";
/// Carrier key for the sampling decision (`1` or `0`).
pub const SAMPLED_KEY: &str = "filament-sampled";
/// Carrier key for the trace-state blob.
pub const TRACE_STATE_KEY: &str = "filament-trace-state";

static EMPTY: Lazy<Arc<TraceState>> = Lazy::new(|| {
    Arc::new(TraceState {
        entries: Vec::new(),
        text: String::new(),
    })
});

/// Ordered string-to-string attributes propagated with a trace.
///
/// The serialized text is recomputed on every mutation, so `text()` is
/// always current and costs nothing to read (cache-through, not lazy).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TraceState {
    entries: Vec<(String, String)>,
    #[serde(skip)]
    text: String,
}

impl TraceState {
    /// The shared empty instance. Decoding blank input returns this
    /// without allocating.
    pub fn shared_empty() -> Arc<TraceState> {
        EMPTY.clone()
    }

    /// Parse `k1=v1,k2=v2,...`. Malformed entries are skipped; duplicate
    /// keys keep the last value; blank input yields the shared empty
    /// instance.
    pub fn decode(text: &str) -> Arc<TraceState> {
        if text.trim().is_empty() {
            return Self::shared_empty();
        }

        let mut state = TraceState {
            entries: Vec::new(),
            text: String::new(),
        };
        for part in text.split(',') {
            let part = part.trim();
            if part.is_empty() {
                continue;
            }
            match part.split_once('=') {
                Some((key, value)) if !key.trim().is_empty() => {
                    state.upsert(key.trim(), value.trim());
                }
                _ => {
                    trace!(entry = %part, "skipping malformed trace-state entry");
                }
            }
        }
        if state.entries.is_empty() {
            return Self::shared_empty();
        }
        state.rebuild_text();
        Arc::new(state)
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Set or remove a key. `None` removes. Keys and values containing
    /// the wire delimiters (`,`, `=`) are rejected with a warning — the
    /// format defines no escaping.
    pub fn set(&mut self, key: &str, value: Option<&str>) {
        match value {
            None => {
                self.entries.retain(|(k, _)| k != key);
            }
            Some(value) => {
                if key.contains([',', '=']) || value.contains([',', '=']) {
                    warn!(key = %key, "rejecting trace-state entry containing wire delimiters");
                    return;
                }
                self.upsert(key, value);
            }
        }
        self.rebuild_text();
    }

    /// The serialized `k=v,...` form, kept current on every mutation.
    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    fn upsert(&mut self, key: &str, value: &str) {
        match self.entries.iter_mut().find(|(k, _)| k == key) {
            Some(slot) => slot.1 = value.to_string(),
            None => self.entries.push((key.to_string(), value.to_string())),
        }
    }

    fn rebuild_text(&mut self) {
        let parts: Vec<String> = self
            .entries
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect();
        self.text = parts.join(",");
    }
}

/// Write the current trace identity into a caller-supplied carrier.
///
/// The setter capability decouples the engine from any transport's header
/// representation: HTTP headers, message properties, anything.
pub fn inject<C>(context: &TraceContext, carrier: &mut C, mut set: impl FnMut(&mut C, &str, &str)) {
    set(carrier, TRACE_ID_KEY, context.trace_id().as_str());
    if let Some(span_id) = context.current_span().and_then(|span| span.span_id()) {
        set(carrier, SPAN_ID_KEY, span_id.as_str());
    }
    set(
        carrier,
        SAMPLED_KEY,
        if context.is_reporting() { "1" } else { "0" },
    );
    let trace_state = context.trace_state();
    if !trace_state.is_empty() {
        set(carrier, TRACE_STATE_KEY, trace_state.text());
    }
}

/// Read trace identity out of a carrier. Returns `None` when no (valid)
/// trace id is present; malformed span ids degrade to a missing parent
/// rather than failing the extraction.
pub fn extract<C>(
    carrier: &C,
    get: impl Fn(&C, &str) -> Option<String>,
) -> Option<ContextSnapshot> {
    let trace_id = match TraceId::from_hex(&get(carrier, TRACE_ID_KEY)?) {
        Ok(id) => id,
        Err(err) => {
            trace!(error = %err, "ignoring carrier with malformed trace id");
            return None;
        }
    };
    let parent_span_id = get(carrier, SPAN_ID_KEY).and_then(|text| SpanId::from_hex(&text).ok());
    let sampled = get(carrier, SAMPLED_KEY)
        .map(|value| value != "0")
        .unwrap_or(true);
    let trace_state = get(carrier, TRACE_STATE_KEY)
        .map(|text| TraceState::decode(&text))
        .unwrap_or_else(TraceState::shared_empty);

    Some(ContextSnapshot {
        trace_id,
        parent_span_id,
        trace_state,
        sampled,
    })
}
