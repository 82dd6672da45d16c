//! # Status/Health Aggregator
//!
//! Folds per-object apply outcomes and per-component health signals into one
//! readiness verdict and a human-readable message per component.
//!
//! A component that failed or went pending earlier in the pass, or never had its
//! primary resource recorded, is not ready and is not probed again. Every other
//! component is judged structurally first (replica counts, conditions) and only
//! then by its type's application-level probe.

mod readiness;
mod statuses;

pub use readiness::{structural_readiness, Readiness};
pub use statuses::ComponentStatuses;

use crate::controller::reconciler::{BuiltComponent, Reconciler, ReconcilerError};
use crate::controller::task::{run_tasks, HealthCheckTask, Task, TaskContext, TaskListOutcome};
use crate::crd::Application;
use std::sync::Arc;
use tracing::debug;

/// Aggregate readiness of an Application after one pass
#[derive(Debug, Default)]
pub struct HealthVerdict {
    pub all_ready: bool,
    pub needs_requeue: bool,
    /// A probe could not run; the first such error of the pass
    pub first_error: Option<ReconcilerError>,
}

/// Check every built component
pub async fn aggregate_health(
    reconciler: &Reconciler,
    app: &Application,
    built: &mut [BuiltComponent<'_>],
    statuses: &mut ComponentStatuses,
) -> Result<HealthVerdict, ReconcilerError> {
    let mut verdict = HealthVerdict {
        all_ready: true,
        ..Default::default()
    };
    let health_tasks: [Arc<dyn Task>; 1] = [Arc::new(HealthCheckTask)];

    for component in built.iter_mut() {
        if !check_component(reconciler, app, component, statuses, &health_tasks, &mut verdict)
            .await?
        {
            verdict.all_ready = false;
            verdict.needs_requeue = true;
        }
    }

    // Components that never produced a built entry cannot be ready
    if !statuses.all_healthy() {
        verdict.all_ready = false;
        verdict.needs_requeue = true;
    }

    Ok(verdict)
}

/// Returns whether the component is ready
async fn check_component(
    reconciler: &Reconciler,
    app: &Application,
    component: &mut BuiltComponent<'_>,
    statuses: &mut ComponentStatuses,
    health_tasks: &[Arc<dyn Task>],
    verdict: &mut HealthVerdict,
) -> Result<bool, ReconcilerError> {
    let name = component.spec.name.clone();

    if statuses.is_failed(&name) || statuses.is_pending(&name) {
        debug!(component = %name, "Skipping health check after earlier failure or pending task");
        return Ok(false);
    }
    if !statuses.get(&name).is_some_and(|s| s.has_resource_identity()) {
        statuses.set_health(&name, false, "Primary resource has not been recorded");
        return Ok(false);
    }

    let live = match reconciler.store.get_object(&component.primary).await {
        Ok(Some(live)) => live,
        Ok(None) => {
            statuses.set_health(
                &name,
                false,
                format!("{} {} not found", component.primary.kind, component.primary.name),
            );
            return Ok(false);
        }
        Err(e) => {
            let error = ReconcilerError::HealthProcess {
                component: name.clone(),
                message: format!("reading {}: {e}", component.primary),
            };
            statuses.mark_failed(&name, error.to_string());
            verdict.first_error.get_or_insert(error);
            return Ok(false);
        }
    };

    let readiness = structural_readiness(&live);
    if !readiness.ready {
        debug!(component = %name, "Not structurally ready: {}", readiness.message);
        statuses.set_health(&name, false, readiness.message);
        return Ok(false);
    }

    let BuiltComponent {
        spec,
        component_type,
        config,
        objects,
        outcomes,
        primary,
    } = component;
    let outcome = {
        let mut ctx = TaskContext {
            app,
            component: *spec,
            config: &*config,
            status: statuses.entry_mut(&name)?,
            objects,
            outcomes,
            primary: Some(&*primary),
            applier: &reconciler.applier,
            probe: component_type.probe.as_ref(),
            store: reconciler.store.as_ref(),
            events: reconciler.events.as_ref(),
        };
        run_tasks(health_tasks, &mut ctx).await?
    };

    match outcome {
        TaskListOutcome::Complete => Ok(true),
        TaskListOutcome::Pending { message, .. } => {
            debug!(component = %name, "Not ready: {}", message);
            Ok(false)
        }
        TaskListOutcome::Failed { error, .. } => {
            statuses.mark_failed(&name, error.to_string());
            verdict.first_error.get_or_insert(error);
            Ok(false)
        }
    }
}
