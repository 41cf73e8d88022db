//! Plain configuration values read when constructing tracers and engines.
//!
//! Filament does not own a config file format. Hosts deserialize these
//! structs from whatever source they already use (CLI flags, env, files)
//! and hand them over at construction time.

use serde::{Deserialize, Serialize};

/// Trace sampling mode.
///
/// `None` does not disable tracing entirely: contexts are still created in
/// propagation-only mode so parent/child ids stay consistent across
/// process boundaries, but no span is ever reported to listeners.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SamplingMode {
    /// Every trace is reported.
    #[default]
    Full,
    /// No trace is reported; propagation stays consistent.
    None,
}

/// Configuration for the tracing side of the engine.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TraceConfig {
    /// Sampling decision applied when a new trace is created.
    #[serde(default)]
    pub sampling: SamplingMode,

    /// When true, a debug-logging span listener is registered at startup.
    #[serde(default)]
    pub debug_spans: bool,
}

impl TraceConfig {
    /// Whether a freshly created trace should report its spans.
    pub fn samples(&self) -> bool {
        self.sampling == SamplingMode::Full
    }
}
