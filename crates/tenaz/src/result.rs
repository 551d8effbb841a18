//! Result and error types for Tenaz.
//!
//! Two layers live here:
//!
//! - [`TenazError`]: construction and configuration failures (empty chains,
//!   invalid retry policies, unreadable config or reference images). These
//!   are returned as `Err` from builders and loaders.
//! - [`ErrorKind`]: the runtime failure taxonomy of an interaction. These are
//!   never returned as `Err`; they travel inside an `InteractionResult`
//!   together with the full attempt log.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Result type for Tenaz operations
pub type TenazResult<T> = Result<T, TenazError>;

/// Errors that can occur while building requests or loading resources
#[derive(Debug, Error)]
pub enum TenazError {
    /// A locator chain must contain at least one locator
    #[error("Locator chain must not be empty")]
    EmptyChain,

    /// A locator value was empty or otherwise unusable
    #[error("Invalid locator {strategy}: {message}")]
    InvalidLocator {
        /// Strategy name
        strategy: String,
        /// Error message
        message: String,
    },

    /// Retry policy violates its invariants
    #[error("Invalid retry policy: {message}")]
    InvalidPolicy {
        /// Error message
        message: String,
    },

    /// Engine configuration violates its invariants
    #[error("Invalid configuration: {message}")]
    InvalidConfig {
        /// Error message
        message: String,
    },

    /// A resolver was handed a strategy it does not handle
    #[error("Strategy {strategy} is not supported by the {resolver} resolver")]
    UnsupportedStrategy {
        /// Strategy name
        strategy: String,
        /// Resolver name
        resolver: &'static str,
    },

    /// Reference image lookup failed
    #[error("Reference image not found: {name}")]
    ReferenceImageMissing {
        /// Image name
        name: String,
    },

    /// No text recognizer is configured for description-based visual lookups
    #[error("No text recognizer configured")]
    RecognizerMissing,

    /// Image decoding or processing error
    #[error("Image processing failed: {message}")]
    ImageProcessing {
        /// Error message
        message: String,
    },

    /// Tracing subscriber could not be installed
    #[error("Telemetry setup failed: {message}")]
    Telemetry {
        /// Error message
        message: String,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml_ng::Error),
}

impl From<image::ImageError> for TenazError {
    fn from(err: image::ImageError) -> Self {
        Self::ImageProcessing {
            message: err.to_string(),
        }
    }
}

/// Runtime failure taxonomy for an interaction request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    /// No candidate resolved within budget
    NotFound,
    /// A structural query matched more than one node after narrowing
    Ambiguous,
    /// Resolved, but the element failed its pre-action checks
    NotInteractable,
    /// Resolved element detached between resolution and action
    Stale,
    /// The underlying action call raised an error
    DriverError,
    /// The outer retry budget was consumed
    Exhausted,
    /// The caller's cancellation token fired at a checkpoint
    Cancelled,
    /// The action was issued but its post-condition did not hold
    Unverified,
}

impl ErrorKind {
    /// Get the canonical upper-case name
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::NotFound => "NOT_FOUND",
            Self::Ambiguous => "AMBIGUOUS",
            Self::NotInteractable => "NOT_INTERACTABLE",
            Self::Stale => "STALE",
            Self::DriverError => "DRIVER_ERROR",
            Self::Exhausted => "EXHAUSTED",
            Self::Cancelled => "CANCELLED",
            Self::Unverified => "UNVERIFIED",
        }
    }

    /// Whether the outer retry wrapper may run another pass after this failure.
    ///
    /// Driver errors and unverified actions abort: the action may already
    /// have taken effect, and repeating it would act twice.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::NotFound | Self::Ambiguous | Self::NotInteractable | Self::Stale
        )
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
