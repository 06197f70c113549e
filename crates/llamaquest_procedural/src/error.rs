//! # Parameter Errors
//!
//! Raised when a tunable table handed to the generator cannot produce a
//! well-formed world.

use thiserror::Error;

/// A generation parameter failed validation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid {section} parameters: {reason}")]
pub struct InvalidParams {
    /// Which table was rejected (e.g. `noise`, `biomes`).
    pub section: &'static str,
    /// Human readable reason.
    pub reason: String,
}

impl InvalidParams {
    /// Creates a new validation error.
    #[must_use]
    pub fn new(section: &'static str, reason: impl Into<String>) -> Self {
        Self {
            section,
            reason: reason.into(),
        }
    }
}
