//! # Task Framework
//!
//! An ordered list of idempotent steps executed per component against a shared
//! [`TaskContext`].
//!
//! - `Complete` and `Skipped` continue with the next task.
//! - `Pending` stops the list: the component needs a later pass, it has not failed.
//! - `Failed` stops the list: this pass failed for the component.
//!
//! A failed result always carries its cause (`TaskResult::Failed(ReconcilerError)`),
//! so a task cannot report failure without a reason. An `Err` returned from a task
//! is fatal and aborts the whole pass.
//!
//! The same list is re-run on every pass until it completes, so every task must
//! reach the same terminal result when run against already-converged state.

use crate::controller::applier::{ApplyOutcome, ApplyOutcomes, Applier};
use crate::controller::desired::DesiredObjectSet;
use crate::controller::events::{ControllerEvent, EventSink};
use crate::controller::reconciler::ReconcilerError;
use crate::controller::registry::{ComponentContext, DecodedConfig, HealthProbe};
use crate::controller::store::{ObjectKey, ObjectStore};
use crate::crd::{Application, ComponentSpec, ComponentStatus};
use async_trait::async_trait;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::api::DynamicObject;
use kube::{Resource, ResourceExt};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

/// Result of one task
#[derive(Debug)]
pub enum TaskResult {
    Complete,
    Skipped,
    Pending(String),
    Failed(ReconcilerError),
}

/// Result of a whole task list
#[derive(Debug)]
pub enum TaskListOutcome {
    Complete,
    Pending {
        task: &'static str,
        message: String,
    },
    Failed {
        task: &'static str,
        error: ReconcilerError,
    },
}

/// State shared by the tasks of one component in one pass
pub struct TaskContext<'a> {
    pub app: &'a Application,
    pub component: &'a ComponentSpec,
    pub config: &'a DecodedConfig,
    pub status: &'a mut ComponentStatus,
    pub objects: &'a mut DesiredObjectSet,
    pub outcomes: &'a mut ApplyOutcomes,
    /// Primary resource of the component, once recorded
    pub primary: Option<&'a ObjectKey>,
    pub applier: &'a Applier,
    pub probe: &'a dyn HealthProbe,
    pub store: &'a dyn ObjectStore,
    pub events: &'a dyn EventSink,
}

impl fmt::Debug for TaskContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskContext")
            .field("component", &self.component.name)
            .field("objects", &self.objects.len())
            .field("outcomes", &self.outcomes.len())
            .finish_non_exhaustive()
    }
}

impl TaskContext<'_> {
    /// View handed to builders and probes
    pub fn component_context(&self) -> ComponentContext<'_> {
        ComponentContext {
            store: self.store,
            owner: self.app,
            component: self.component,
            primary: self.primary,
        }
    }
}

/// One idempotent step of a component pass
#[async_trait]
pub trait Task: Send + Sync {
    fn name(&self) -> &'static str;

    async fn run(&self, ctx: &mut TaskContext<'_>) -> Result<TaskResult, ReconcilerError>;
}

/// Run `tasks` in order, stopping at the first `Pending` or `Failed`
pub async fn run_tasks(
    tasks: &[Arc<dyn Task>],
    ctx: &mut TaskContext<'_>,
) -> Result<TaskListOutcome, ReconcilerError> {
    for task in tasks {
        let name = task.name();
        match task.run(ctx).await? {
            TaskResult::Complete => {
                debug!(component = %ctx.component.name, task = name, "Task complete");
            }
            TaskResult::Skipped => {
                debug!(component = %ctx.component.name, task = name, "Task skipped");
            }
            TaskResult::Pending(message) => {
                debug!(component = %ctx.component.name, task = name, "Task pending: {}", message);
                return Ok(TaskListOutcome::Pending {
                    task: name,
                    message,
                });
            }
            TaskResult::Failed(error) => {
                warn!(component = %ctx.component.name, task = name, "Task failed: {}", error);
                return Ok(TaskListOutcome::Failed { task: name, error });
            }
        }
    }
    Ok(TaskListOutcome::Complete)
}

/// Applies every object of the component's desired set
///
/// Each object gets the Application as controller owner before it is applied.
/// Failing to attach the owner aborts the pass. A failed apply is recorded and
/// the remaining objects are still applied; the first failure becomes the
/// task's error.
#[derive(Debug, Clone, Copy, Default)]
pub struct ApplyTask;

#[async_trait]
impl Task for ApplyTask {
    fn name(&self) -> &'static str {
        "apply"
    }

    async fn run(&self, ctx: &mut TaskContext<'_>) -> Result<TaskResult, ReconcilerError> {
        if ctx.objects.is_empty() {
            return Ok(TaskResult::Skipped);
        }

        let owner = controller_owner_reference(ctx.app)?;
        let app_namespace = ctx.app.namespace().unwrap_or_default();
        let mut first_error: Option<ReconcilerError> = None;

        for (key, obj) in ctx.objects.iter_mut() {
            if let Err(error) = set_owner_reference(obj, key, &owner, &app_namespace) {
                ctx.events.publish(
                    ctx.app,
                    ControllerEvent::warning("OwnershipFailed", error.to_string()),
                );
                return Err(error);
            }

            match ctx.applier.apply(key, obj).await {
                Ok(operation) => {
                    ctx.outcomes
                        .insert(key.clone(), ApplyOutcome::applied(operation));
                }
                Err(error) => {
                    warn!(component = %ctx.component.name, object = %key, "Apply failed: {}", error);
                    ctx.outcomes.insert(key.clone(), ApplyOutcome::failed(&error));
                    let error = ReconcilerError::Apply {
                        object: key.to_string(),
                        source: error,
                    };
                    ctx.events.publish(
                        ctx.app,
                        ControllerEvent::warning("ApplyFailed", error.to_string()),
                    );
                    if first_error.is_none() {
                        ctx.status.health = false;
                        ctx.status.message = error.to_string();
                        first_error = Some(error);
                    } else {
                        debug!("Keeping first apply error, later failure: {}", error);
                    }
                }
            }
        }

        Ok(match first_error {
            Some(error) => TaskResult::Failed(error),
            None => TaskResult::Complete,
        })
    }
}

/// Runs the component type's application-level health probe
///
/// An unready target is `Pending`; only a probe that cannot run is `Failed`.
#[derive(Debug, Clone, Copy, Default)]
pub struct HealthCheckTask;

#[async_trait]
impl Task for HealthCheckTask {
    fn name(&self) -> &'static str {
        "health-check"
    }

    async fn run(&self, ctx: &mut TaskContext<'_>) -> Result<TaskResult, ReconcilerError> {
        let report = {
            let probe_ctx = ctx.component_context();
            ctx.probe.check_app_health(&probe_ctx, ctx.config).await
        };

        match report {
            Ok(report) if report.healthy => {
                ctx.status.health = true;
                ctx.status.message = report.message;
                Ok(TaskResult::Complete)
            }
            Ok(report) => {
                ctx.status.health = false;
                ctx.status.message.clone_from(&report.message);
                Ok(TaskResult::Pending(report.message))
            }
            Err(error) => Ok(TaskResult::Failed(ReconcilerError::HealthProcess {
                component: ctx.component.name.clone(),
                message: format!("{error:#}"),
            })),
        }
    }
}

fn controller_owner_reference(app: &Application) -> Result<OwnerReference, ReconcilerError> {
    app.controller_owner_ref(&())
        .ok_or_else(|| ReconcilerError::Ownership {
            object: format!(
                "Application {}/{}",
                app.namespace().unwrap_or_default(),
                app.name_any()
            ),
            message: "owner has no name or uid".to_string(),
        })
}

/// Make `owner` the controller owner of `obj`, replacing any earlier reference to it
pub fn set_owner_reference(
    obj: &mut DynamicObject,
    key: &ObjectKey,
    owner: &OwnerReference,
    owner_namespace: &str,
) -> Result<(), ReconcilerError> {
    // Garbage collection ignores owners in another namespace
    if key.namespace != owner_namespace {
        return Err(ReconcilerError::Ownership {
            object: key.to_string(),
            message: format!(
                "object namespace '{}' differs from owner namespace '{}'",
                key.namespace, owner_namespace
            ),
        });
    }

    let references = obj.metadata.owner_references.get_or_insert_with(Vec::new);
    if let Some(other) = references
        .iter()
        .find(|r| r.controller == Some(true) && r.uid != owner.uid)
    {
        return Err(ReconcilerError::Ownership {
            object: key.to_string(),
            message: format!(
                "object is already controlled by {} {}",
                other.kind, other.name
            ),
        });
    }
    references.retain(|r| r.uid != owner.uid);
    references.push(owner.clone());
    Ok(())
}
