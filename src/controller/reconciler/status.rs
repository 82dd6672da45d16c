//! # Status Persistence
//!
//! Assembles the status sub-document and writes it only when its content
//! changed. Writes are guarded by the Application's resourceVersion; a conflict
//! is surfaced, never retried within the pass.

use crate::constants::CONDITION_READY;
use crate::controller::reconciler::phase::ReadyState;
use crate::controller::reconciler::ReconcilerError;
use crate::controller::store::ObjectStore;
use crate::crd::{Application, ApplicationStatus, ComponentStatus, Phase};
use crate::observability;
use kube::ResourceExt;
use tracing::{debug, info, warn};

/// Status as it should be persisted after this pass
///
/// Conditions other than Ready are carried over from the previous status.
pub fn next_status(
    app: &Application,
    phase: Phase,
    ready: ReadyState,
    components: Vec<ComponentStatus>,
) -> ApplicationStatus {
    let previous = app.status.as_ref();
    let ready = ready.into_condition(previous.and_then(|s| s.condition(CONDITION_READY)));

    let mut conditions: Vec<_> = previous
        .map(|s| {
            s.conditions
                .iter()
                .filter(|c| c.r#type != CONDITION_READY)
                .cloned()
                .collect()
        })
        .unwrap_or_default();
    conditions.push(ready);

    ApplicationStatus {
        phase: Some(phase),
        conditions,
        components,
        observed_generation: app.metadata.generation,
    }
}

/// Write `status` unless it is equivalent to the persisted one
///
/// Returns whether a write happened.
pub async fn persist_status_if_changed(
    store: &dyn ObjectStore,
    app: &Application,
    status: &ApplicationStatus,
) -> Result<bool, ReconcilerError> {
    if app
        .status
        .as_ref()
        .is_some_and(|current| current.is_equivalent(status))
    {
        debug!(
            resource.name = %app.name_any(),
            "Skipping status update - status unchanged"
        );
        return Ok(false);
    }

    write_status(store, app, status).await?;
    Ok(true)
}

/// Write `status` unconditionally
pub async fn write_status(
    store: &dyn ObjectStore,
    app: &Application,
    status: &ApplicationStatus,
) -> Result<(), ReconcilerError> {
    match store.patch_status(app, status).await {
        Ok(()) => {
            observability::metrics::increment_status_writes();
            info!(
                resource.namespace = %app.namespace().unwrap_or_default(),
                resource.name = %app.name_any(),
                phase = %status.phase.map_or("unknown", Phase::as_str),
                "Updated status"
            );
            Ok(())
        }
        Err(e) if e.is_conflict() => {
            observability::metrics::increment_status_conflicts();
            warn!(
                resource.name = %app.name_any(),
                "Status write conflicted with a concurrent update"
            );
            Err(ReconcilerError::Conflict(e))
        }
        // Deleted during the pass; there is nothing left to report on
        Err(e) if e.is_not_found() => {
            debug!(resource.name = %app.name_any(), "Application gone before status write");
            Ok(())
        }
        Err(e) => Err(ReconcilerError::from_store("writing status", e)),
    }
}
