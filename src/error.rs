//! Error taxonomy for the assessor lookup flow.
//!
//! Request-body validation happens in the HTTP layer before a browser
//! context is acquired, so it is not represented here. Extraction is
//! best-effort and never produces an error at all.

use crate::assessor::controls::ControlRole;

/// Failures that can abort a property lookup.
#[derive(Debug, thiserror::Error)]
pub enum LookupError {
    /// The form page did not expose enough dropdown controls to classify.
    #[error("expected at least three dropdown controls, found {found}")]
    Resolution { found: usize },

    /// No option matched the caller's target and no non-empty fallback existed.
    #[error("no selectable option for {role} matching \"{target}\"")]
    OptionNotFound { role: ControlRole, target: String },

    /// The page (or a required element) failed to appear within its bound.
    #[error("{what} (bound: {timeout_ms}ms)")]
    Navigation { what: String, timeout_ms: u64 },

    /// Any other browser-level failure (context creation, script execution).
    #[error(transparent)]
    Browser(#[from] anyhow::Error),
}

impl LookupError {
    /// Short machine-readable category, used as the `error` field of
    /// 500 responses.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Resolution { .. } => "control_resolution_failed",
            Self::OptionNotFound { .. } => "option_not_found",
            Self::Navigation { .. } => "navigation_timeout",
            Self::Browser(_) => "browser_error",
        }
    }
}
