//! Span lifecycle listeners.
//!
//! Listeners observe span starts and finishes — debug logging, file
//! export, metric counting. They can be added and removed at runtime
//! (toggled by configuration) and may be invoked from any execution unit.
//! A listener failure is logged and swallowed: observers must never take
//! the host down.

use std::fs::OpenOptions;
use std::io::Write;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::{Arc, PoisonError, RwLock};

use tracing::{debug, warn};

use super::span::SpanRecord;

/// Observer of span lifecycle events. Default implementations make both
/// hooks optional.
pub trait SpanListener: Send + Sync {
    fn on_span_started(&self, _span: &SpanRecord) {}
    fn on_span_finished(&self, _span: &SpanRecord) {}
}

/// Dynamic set of named listeners.
#[derive(Default)]
pub struct ListenerRegistry {
    listeners: RwLock<Vec<(String, Arc<dyn SpanListener>)>>,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a listener under `name`, replacing any existing listener with
    /// the same name.
    pub fn add(&self, name: impl Into<String>, listener: Arc<dyn SpanListener>) {
        let name = name.into();
        let mut listeners = self
            .listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(slot) = listeners.iter_mut().find(|(n, _)| *n == name) {
            debug!(listener = %name, "replacing span listener");
            slot.1 = listener;
        } else {
            listeners.push((name, listener));
        }
    }

    /// Remove the listener registered under `name`. Returns whether one
    /// was present.
    pub fn remove(&self, name: &str) -> bool {
        let mut listeners = self
            .listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let before = listeners.len();
        listeners.retain(|(n, _)| n != name);
        listeners.len() != before
    }

    pub fn len(&self) -> usize {
        self.listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn notify_started(&self, record: &SpanRecord) {
        self.each(record, |listener, record| listener.on_span_started(record));
    }

    pub fn notify_finished(&self, record: &SpanRecord) {
        self.each(record, |listener, record| {
            listener.on_span_finished(record)
        });
    }

    fn each(&self, record: &SpanRecord, call: fn(&dyn SpanListener, &SpanRecord)) {
        let snapshot: Vec<(String, Arc<dyn SpanListener>)> = self
            .listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        for (name, listener) in snapshot {
            if catch_unwind(AssertUnwindSafe(|| call(listener.as_ref(), record))).is_err() {
                warn!(listener = %name, span_id = %record.span_id, "span listener panicked; ignored");
            }
        }
    }
}

impl std::fmt::Debug for ListenerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenerRegistry")
            .field("count", &self.len())
            .finish()
    }
}

/// Logs span lifecycle events through `tracing` at debug level.
pub struct DebugLogListener;

impl SpanListener for DebugLogListener {
    fn on_span_started(&self, span: &SpanRecord) {
        debug!(
            trace_id = %span.trace_id,
            span_id = %span.span_id,
            name = %span.name,
            "span started"
        );
    }

    fn on_span_finished(&self, span: &SpanRecord) {
        debug!(
            trace_id = %span.trace_id,
            span_id = %span.span_id,
            name = %span.name,
            duration_us = span.duration_us,
            "span finished"
        );
    }
}

/// Appends finished spans as JSON lines to a file. Write failures are
/// logged and dropped; exporting is best-effort by design.
pub struct JsonlSpanWriter {
    path: PathBuf,
}

impl JsonlSpanWriter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }

    fn append(&self, record: &SpanRecord) -> crate::error::Result<()> {
        let line = serde_json::to_string(record)?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(file, "{line}")?;
        Ok(())
    }
}

impl SpanListener for JsonlSpanWriter {
    fn on_span_finished(&self, span: &SpanRecord) {
        if let Err(err) = self.append(span) {
            warn!(path = %self.path.display(), error = %err, "failed to write span record");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trace::id::{SpanId, TraceId};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::SystemTime;

    fn record() -> SpanRecord {
        SpanRecord {
            trace_id: TraceId::generate(),
            span_id: SpanId::generate(),
            parent_span_id: None,
            name: "test".into(),
            kind: Default::default(),
            component: None,
            tags: vec![],
            error: None,
            start_time_unix_micros: 1,
            end_time_unix_micros: 2,
            duration_us: 1,
            timestamp: SystemTime::now(),
        }
    }

    struct Counting(Arc<AtomicUsize>);

    impl SpanListener for Counting {
        fn on_span_finished(&self, _span: &SpanRecord) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct Exploding;

    impl SpanListener for Exploding {
        fn on_span_finished(&self, _span: &SpanRecord) {
            panic!("listener bug");
        }
    }

    #[test]
    fn add_replace_remove() {
        let registry = ListenerRegistry::new();
        let count = Arc::new(AtomicUsize::new(0));
        registry.add("counter", Arc::new(Counting(count.clone())));
        registry.add("counter", Arc::new(Counting(count.clone())));
        assert_eq!(registry.len(), 1);
        assert!(registry.remove("counter"));
        assert!(!registry.remove("counter"));
        assert!(registry.is_empty());
    }

    #[test]
    fn panicking_listener_does_not_block_others() {
        let registry = ListenerRegistry::new();
        let count = Arc::new(AtomicUsize::new(0));
        registry.add("exploding", Arc::new(Exploding));
        registry.add("counter", Arc::new(Counting(count.clone())));
        registry.notify_finished(&record());
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn jsonl_writer_appends_one_line_per_span() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("spans.jsonl");
        let writer = JsonlSpanWriter::new(&path);
        writer.on_span_finished(&record());
        writer.on_span_finished(&record());

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        for line in lines {
            let parsed: serde_json::Value = serde_json::from_str(line).unwrap();
            assert_eq!(parsed["name"], "test");
            assert!(parsed["trace_id"].is_string());
        }
    }

    #[test]
    fn jsonl_writer_swallows_write_failures() {
        // A directory path cannot be opened for append; must not panic.
        let dir = tempfile::tempdir().unwrap();
        let writer = JsonlSpanWriter::new(dir.path());
        writer.on_span_finished(&record());
    }

    #[test]
    fn append_failure_surfaces_as_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let writer = JsonlSpanWriter::new(dir.path());
        let err = writer.append(&record()).unwrap_err();
        assert!(matches!(err, crate::error::FilamentError::Io(_)));
    }
}
