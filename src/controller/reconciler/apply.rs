//! # Apply
//!
//! Runs each built component's task list: the apply task followed by the post-apply
//! tasks registered for its type. Individual object failures do not stop the
//! remaining objects or components; the first failure is kept for the pass.

use crate::controller::health::ComponentStatuses;
use crate::controller::reconciler::build::BuiltComponent;
use crate::controller::reconciler::{Reconciler, ReconcilerError};
use crate::controller::task::{run_tasks, ApplyTask, Task, TaskContext, TaskListOutcome};
use crate::crd::Application;
use std::sync::Arc;
use tracing::debug;

/// Result of applying every component
#[derive(Debug, Default)]
pub struct ApplyVerdict {
    pub first_error: Option<ReconcilerError>,
    /// Some task asked for a later pass
    pub needs_requeue: bool,
}

/// Apply all components in declaration order
///
/// An `Err` is fatal (such as an ownership failure): the affected component is
/// marked failed and no further component is applied.
pub async fn apply_components(
    reconciler: &Reconciler,
    app: &Application,
    built: &mut [BuiltComponent<'_>],
    statuses: &mut ComponentStatuses,
) -> Result<ApplyVerdict, ReconcilerError> {
    let mut verdict = ApplyVerdict::default();

    for component in built.iter_mut() {
        let name = component.spec.name.clone();
        let mut tasks: Vec<Arc<dyn Task>> = vec![Arc::new(ApplyTask)];
        tasks.extend(component.component_type.post_apply_tasks.iter().cloned());

        let outcome = {
            let BuiltComponent {
                spec,
                component_type,
                config,
                objects,
                outcomes,
                primary,
            } = component;
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
            run_tasks(&tasks, &mut ctx).await
        };

        match outcome {
            Ok(TaskListOutcome::Complete) => {
                debug!(component = %name, "Component tasks complete");
            }
            Ok(TaskListOutcome::Pending { task, message }) => {
                debug!(component = %name, task, "Component tasks pending");
                statuses.mark_pending(&name, message);
                verdict.needs_requeue = true;
            }
            Ok(TaskListOutcome::Failed { task, error }) => {
                statuses.mark_failed(&name, error.to_string());
                if verdict.first_error.is_none() {
                    verdict.first_error = Some(error);
                } else {
                    debug!(component = %name, task, "Keeping first pass error, later failure: {}", error);
                }
            }
            Err(error) => {
                statuses.mark_failed(&name, error.to_string());
                return Err(error);
            }
        }
    }

    Ok(verdict)
}
