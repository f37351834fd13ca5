//! Signature-based filter over the raw query string.
//!
//! This module is "core-only": it knows nothing about axum. The middleware in
//! `middleware::appfilter` calls [`evaluate`] before any route runs.
//!
//! The filter looks at the undecoded query string only. Form bodies are never
//! inspected here, so `%27` in a body reaches the handler even when `'` is a
//! configured signature.

use tracing::{debug, warn};

/// Filter settings, built once at startup and shared read-only.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterConfig {
    // If false, `evaluate` always passes.
    pub enabled: bool,
    // Literal substrings, checked in this order.
    pub signatures: Vec<String>,
}

impl FilterConfig {
    pub fn new(enabled: bool, signatures: Vec<String>) -> Self {
        Self {
            enabled,
            signatures,
        }
    }

    /// True when `evaluate` can never block.
    pub fn is_inert(&self) -> bool {
        !self.enabled || self.signatures.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterVerdict {
    Pass,
    Blocked { signature: String },
}

impl FilterVerdict {
    pub fn is_blocked(&self) -> bool {
        matches!(self, Self::Blocked { .. })
    }
}

/// Check `raw_args` against the configured signatures.
///
/// The first signature found as a substring wins.
pub fn evaluate(raw_args: Option<&str>, config: &FilterConfig) -> FilterVerdict {
    if config.is_inert() {
        return FilterVerdict::Pass;
    }

    let Some(args) = raw_args else {
        return FilterVerdict::Pass;
    };

    for signature in &config.signatures {
        // The query string may carry `pass=`, so it is never logged.
        debug!(signature = %signature, "testing signature");
        if args.contains(signature.as_str()) {
            warn!(signature = %signature, "forbidden signature found in query string");
            return FilterVerdict::Blocked {
                signature: signature.clone(),
            };
        }
    }

    FilterVerdict::Pass
}
