//! Error types for the OpenStack operator
//!
//! The condition store and readiness aggregator never fail; errors only come
//! from collaborators: the Kubernetes API, sub-resource status documents and
//! user-supplied templates.

use std::time::Duration;
use thiserror::Error;

/// Unified error type for the operator
#[derive(Error, Debug)]
pub enum Error {
    // =========================================================================
    // Internal Errors
    // =========================================================================
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    // =========================================================================
    // Kubernetes Errors
    // =========================================================================
    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    #[error("Resource not found: {kind}/{name}")]
    ResourceNotFound { kind: String, name: String },

    /// A write was based on a stale resourceVersion
    #[error("Conflicting update on {kind}/{name}: object was modified since it was read")]
    Conflict { kind: String, name: String },

    // =========================================================================
    // Sub-resource Errors
    // =========================================================================
    #[error("Template for {subsystem} targets {found}, operator supports {expected}")]
    IncompatibleTemplate {
        subsystem: String,
        found: String,
        expected: String,
    },

    #[error("Malformed status on {kind}/{name}: {reason}")]
    MalformedStatus {
        kind: String,
        name: String,
        reason: String,
    },

    // =========================================================================
    // Parse Errors
    // =========================================================================
    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    // =========================================================================
    // IO Errors
    // =========================================================================
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Action to take on error during reconciliation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorAction {
    /// Requeue with exponential backoff
    RequeueWithBackoff,
    /// Requeue after specific duration
    RequeueAfter(Duration),
    /// Don't requeue, wait for changes
    NoRequeue,
}

impl Error {
    /// Determine what action to take for this error
    pub fn action(&self) -> ErrorAction {
        match self {
            // Transient errors - retry with backoff
            Error::Kube(_) | Error::Conflict { .. } => ErrorAction::RequeueWithBackoff,

            // Sub-resource is mid-rollout or its operator is lagging
            Error::MalformedStatus { .. } | Error::ResourceNotFound { .. } => {
                ErrorAction::RequeueAfter(Duration::from_secs(30))
            }

            // Fixed only by a spec edit, which triggers a new reconcile anyway
            Error::Configuration(_) | Error::IncompatibleTemplate { .. } => ErrorAction::NoRequeue,

            // All other errors - retry with backoff
            _ => ErrorAction::RequeueWithBackoff,
        }
    }

    /// Short label used for metrics
    pub fn metric_label(&self) -> &'static str {
        match self {
            Error::Internal(_) => "internal",
            Error::Configuration(_) => "configuration",
            Error::Kube(_) => "kube",
            Error::ResourceNotFound { .. } => "not_found",
            Error::Conflict { .. } => "conflict",
            Error::IncompatibleTemplate { .. } => "incompatible_template",
            Error::MalformedStatus { .. } => "malformed_status",
            Error::JsonParse(_) => "json",
            Error::Yaml(_) => "yaml",
            Error::Io(_) => "io",
        }
    }
}

/// Result type alias for the operator
pub type Result<T> = std::result::Result<T, Error>;
