//! Trace and span identifiers.
//!
//! Both ids are lowercase hex derived from UUID v7, so they sort roughly
//! by creation time and are globally unique — a forked context can mint
//! span ids without coordinating with its origin.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::FilamentError;

/// Stable identifier for one logical trace (32-char hex).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TraceId(String);

impl TraceId {
    pub fn generate() -> Self {
        Self(hex::encode(Uuid::now_v7().as_bytes()))
    }

    pub fn from_hex(text: &str) -> Result<Self, FilamentError> {
        if text.len() == 32 && text.bytes().all(|b| b.is_ascii_hexdigit()) {
            Ok(Self(text.to_ascii_lowercase()))
        } else {
            Err(FilamentError::MalformedTraceId(text.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TraceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier for one span (16-char hex, the low 8 bytes of a UUID v7).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SpanId(String);

impl SpanId {
    pub fn generate() -> Self {
        let uuid = Uuid::now_v7();
        Self(hex::encode(&uuid.as_bytes()[8..16]))
    }

    pub fn from_hex(text: &str) -> Result<Self, FilamentError> {
        if text.len() == 16 && text.bytes().all(|b| b.is_ascii_hexdigit()) {
            Ok(Self(text.to_ascii_lowercase()))
        } else {
            Err(FilamentError::MalformedSpanId(text.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SpanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Span id source owned by a single trace context.
///
/// Ids are globally unique, so the generator's only state is a counter
/// used for diagnostics (how many spans a context has minted).
#[derive(Debug, Default)]
pub struct SpanIdGenerator {
    issued: u32,
}

impl SpanIdGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next(&mut self) -> SpanId {
        self.issued += 1;
        SpanId::generate()
    }

    pub fn issued(&self) -> u32 {
        self.issued
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_ids_have_expected_shape() {
        let trace_id = TraceId::generate();
        assert_eq!(trace_id.as_str().len(), 32);
        assert!(trace_id.as_str().bytes().all(|b| b.is_ascii_hexdigit()));

        let span_id = SpanId::generate();
        assert_eq!(span_id.as_str().len(), 16);
        assert!(span_id.as_str().bytes().all(|b| b.is_ascii_hexdigit()));
    }

    #[test]
    fn ids_round_trip_through_hex() {
        let trace_id = TraceId::generate();
        assert_eq!(TraceId::from_hex(trace_id.as_str()).unwrap(), trace_id);

        let span_id = SpanId::generate();
        assert_eq!(SpanId::from_hex(span_id.as_str()).unwrap(), span_id);
    }

    #[test]
    fn malformed_ids_are_rejected() {
        assert!(TraceId::from_hex("not-hex").is_err());
        assert!(TraceId::from_hex(&"a".repeat(31)).is_err());
        assert!(SpanId::from_hex("0123").is_err());
        assert!(SpanId::from_hex("zzzzzzzzzzzzzzzz").is_err());
    }

    #[test]
    fn generator_counts_issued_ids() {
        let mut generator = SpanIdGenerator::new();
        let a = generator.next();
        let b = generator.next();
        assert_ne!(a, b);
        assert_eq!(generator.issued(), 2);
    }
}
