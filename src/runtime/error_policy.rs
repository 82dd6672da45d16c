//! # Error Policy
//!
//! Requeue decisions for failed passes and logging of controller stream errors.

use crate::controller::reconciler::{Reconciler, ReconcilerError};
use crate::crd::Application;
use crate::observability;
use kube::runtime::controller::{self, Action};
use kube::runtime::watcher;
use kube::ResourceExt;
use std::sync::Arc;
use tracing::{debug, error, warn};

/// Requeue delay after a failed pass
///
/// A status write conflict gets the short conflict delay so the next pass
/// re-reads fresh state quickly; every other error waits the default delay.
pub fn error_policy(app: Arc<Application>, error: &ReconcilerError, ctx: Arc<Reconciler>) -> Action {
    let name = app.name_any();
    let namespace = app.namespace().unwrap_or_default();

    let error_span = tracing::span!(
        tracing::Level::ERROR,
        "controller.watch.reconciliation_error",
        resource.name = %name,
        resource.namespace = %namespace,
        category = %error.category()
    );
    let _error_guard = error_span.enter();

    if error.is_conflict() {
        warn!("Status conflict for {}/{}, retrying shortly: {}", namespace, name, error);
        observability::metrics::increment_requeues_total("conflict");
        Action::requeue(ctx.config().conflict_requeue())
    } else {
        error!("Reconciliation error for {}/{}: {}", namespace, name, error);
        observability::metrics::increment_requeues_total("error");
        Action::requeue(ctx.config().reconcile_requeue())
    }
}

/// Log an error surfaced by the controller stream
///
/// Reconciler failures were already handled by [`error_policy`].
pub fn log_controller_error(error: &controller::Error<ReconcilerError, watcher::Error>) {
    match error {
        controller::Error::ObjectNotFound(reference) => {
            // Deleted between the trigger and the pass
            debug!("Application {} not found in cache, skipping", reference);
        }
        controller::Error::ReconcilerFailed(_, reference) => {
            debug!("Pass for {} failed, requeued by error policy", reference);
        }
        controller::Error::QueueError(watch_error) => {
            warn!("Watch stream error, the watcher will retry: {}", watch_error);
        }
        other => {
            error!("Controller stream error: {}", other);
        }
    }
}
