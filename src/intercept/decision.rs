//! The enter-time verdict controlling whether the after-hook runs.

use serde::{Deserialize, Serialize};

/// Decision returned by an interceptor's before-hook.
///
/// The real call always executes regardless of the decision; interception
/// only controls its own after-hook. This is the one lever an interceptor
/// has over the engine's control flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    /// Run the after-hook once the real call has executed.
    #[default]
    Continue,

    /// Skip the after-hook for this invocation. Used when the before-hook
    /// already knows post-processing is pointless (e.g. malformed
    /// arguments). The real call still runs normally.
    SkipLeave,
}

impl Decision {
    /// Whether the after-hook should run for this invocation.
    pub fn runs_after_hook(&self) -> bool {
        matches!(self, Decision::Continue)
    }
}
