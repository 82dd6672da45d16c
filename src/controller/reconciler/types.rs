//! # Reconciler Types
//!
//! The reconciler context and the error taxonomy of a convergence pass.

use crate::config::ControllerConfig;
use crate::controller::applier::Applier;
use crate::controller::events::EventSink;
use crate::controller::reconciler::finalizer::{CleanupHook, NoopCleanup};
use crate::controller::registry::ComponentRegistry;
use crate::controller::store::{ObjectStore, StoreError};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Category of a pass-level error
///
/// Carried explicitly by every [`ReconcilerError`] so the Ready condition reason
/// never depends on error message text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    Validation,
    Decode,
    Build,
    Ownership,
    Apply,
    HealthProcess,
    Conflict,
    Store,
    Cleanup,
    Internal,
}

impl ErrorCategory {
    /// Metric label
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCategory::Validation => "validation",
            ErrorCategory::Decode => "decode",
            ErrorCategory::Build => "build",
            ErrorCategory::Ownership => "ownership",
            ErrorCategory::Apply => "apply",
            ErrorCategory::HealthProcess => "health",
            ErrorCategory::Conflict => "conflict",
            ErrorCategory::Store => "store",
            ErrorCategory::Cleanup => "cleanup",
            ErrorCategory::Internal => "internal",
        }
    }

    /// Ready condition reason for a pass that failed with this category
    pub fn ready_reason(self) -> &'static str {
        match self {
            ErrorCategory::Validation => "ValidationFailed",
            ErrorCategory::Decode => "DecodeFailed",
            ErrorCategory::Build => "BuildFailed",
            ErrorCategory::Ownership => "OwnershipFailed",
            ErrorCategory::Apply => "ApplyFailed",
            ErrorCategory::HealthProcess => "HealthCheckFailed",
            ErrorCategory::Conflict
            | ErrorCategory::Store
            | ErrorCategory::Cleanup
            | ErrorCategory::Internal => "ReconcileFailed",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned from a convergence pass
#[derive(Debug, Error)]
pub enum ReconcilerError {
    /// Duplicate or empty component names and similar spec problems
    #[error("ValidationFailed: {0}")]
    Validation(String),

    #[error("DecodeFailed: component '{component}': {message}")]
    Decode { component: String, message: String },

    /// Unknown type, builder failure or malformed builder output
    #[error("BuildFailed: component '{component}': {message}")]
    Build { component: String, message: String },

    #[error("OwnershipFailed: {object}: {message}")]
    Ownership { object: String, message: String },

    #[error("ApplyFailed: {object}: {source}")]
    Apply {
        object: String,
        #[source]
        source: StoreError,
    },

    /// The health probe could not run; an unready target is not an error
    #[error("HealthCheckFailed: component '{component}': {message}")]
    HealthProcess { component: String, message: String },

    /// Optimistic-concurrency failure on an Application write
    #[error("StatusConflict: {0}")]
    Conflict(#[source] StoreError),

    #[error("StoreFailed: {context}: {source}")]
    Store {
        context: String,
        #[source]
        source: StoreError,
    },

    #[error("CleanupFailed: {0}")]
    Cleanup(String),

    #[error("InternalError: {0}")]
    Internal(String),
}

impl ReconcilerError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            ReconcilerError::Validation(_) => ErrorCategory::Validation,
            ReconcilerError::Decode { .. } => ErrorCategory::Decode,
            ReconcilerError::Build { .. } => ErrorCategory::Build,
            ReconcilerError::Ownership { .. } => ErrorCategory::Ownership,
            ReconcilerError::Apply { .. } => ErrorCategory::Apply,
            ReconcilerError::HealthProcess { .. } => ErrorCategory::HealthProcess,
            ReconcilerError::Conflict(_) => ErrorCategory::Conflict,
            ReconcilerError::Store { .. } => ErrorCategory::Store,
            ReconcilerError::Cleanup(_) => ErrorCategory::Cleanup,
            ReconcilerError::Internal(_) => ErrorCategory::Internal,
        }
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, ReconcilerError::Conflict(_))
    }

    /// Wrap a store error, keeping conflicts distinguishable
    pub fn from_store(context: impl Into<String>, source: StoreError) -> Self {
        if source.is_conflict() {
            ReconcilerError::Conflict(source)
        } else {
            ReconcilerError::Store {
                context: context.into(),
                source,
            }
        }
    }
}

/// Reconciler context shared by every pass
pub struct Reconciler {
    pub(crate) store: Arc<dyn ObjectStore>,
    pub(crate) registry: Arc<ComponentRegistry>,
    pub(crate) events: Arc<dyn EventSink>,
    pub(crate) cleanup: Arc<dyn CleanupHook>,
    pub(crate) config: ControllerConfig,
    pub(crate) applier: Applier,
}

impl fmt::Debug for Reconciler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reconciler")
            .field("registry", &self.registry.type_names())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Reconciler {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        registry: Arc<ComponentRegistry>,
        events: Arc<dyn EventSink>,
        config: ControllerConfig,
    ) -> Self {
        let applier = Applier::new(Arc::clone(&store), config.field_manager.clone());
        Self {
            store,
            registry,
            events,
            cleanup: Arc::new(NoopCleanup),
            config,
            applier,
        }
    }

    /// Run `hook` before the finalizer is released on deletion
    #[must_use]
    pub fn with_cleanup(mut self, hook: Arc<dyn CleanupHook>) -> Self {
        self.cleanup = hook;
        self
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }
}
