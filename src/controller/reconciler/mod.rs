//! # Reconciler
//!
//! The convergence pass for `Application` resources and its supporting stages.

mod apply;
mod build;
mod finalizer;
mod phase;
mod reconcile;
mod status;
mod types;
mod validation;

pub use apply::{apply_components, ApplyVerdict};
pub use build::{build_components, stamp_labels, BuiltComponent};
pub use finalizer::{add_finalizer, finalize, has_finalizer, CleanupHook, NoopCleanup};
pub use phase::{compute_phase, ReadyState};
pub use reconcile::reconcile;
pub use status::{next_status, persist_status_if_changed, write_status};
pub use types::{ErrorCategory, Reconciler, ReconcilerError};
pub use validation::validate_components;
