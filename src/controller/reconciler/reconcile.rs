//! # Convergence Pass
//!
//! One pass fetches the Application fresh, then:
//!
//! 1. releases the finalizer on deletion, after cleanup
//! 2. validates components and seeds their statuses (no mutation on failure)
//! 3. marks an Application without components Available
//! 4. registers the finalizer, deferring all other work to the next pass
//! 5. records `Processing` on the first pass
//! 6. builds, applies and health-checks every component
//! 7. computes the phase and persists status only if it changed
//!
//! Passes for the same Application are serialized by the controller runtime.

use crate::controller::events::ControllerEvent;
use crate::controller::health::{aggregate_health, ComponentStatuses};
use crate::controller::reconciler::apply::apply_components;
use crate::controller::reconciler::build::build_components;
use crate::controller::reconciler::finalizer::{add_finalizer, finalize, has_finalizer};
use crate::controller::reconciler::phase::{compute_phase, ReadyState};
use crate::controller::reconciler::status::{next_status, persist_status_if_changed, write_status};
use crate::controller::reconciler::{Reconciler, ReconcilerError};
use crate::crd::{Application, Phase};
use crate::observability;
use kube::runtime::controller::Action;
use kube::{Resource, ResourceExt};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, info_span, warn, Instrument};

/// Message for components left unchecked after a build or apply failure
const NOT_CHECKED_MESSAGE: &str = "Not checked: the pass stopped at an earlier error";

/// Controller entry point for one Application
pub async fn reconcile(
    app: Arc<Application>,
    ctx: Arc<Reconciler>,
) -> Result<Action, ReconcilerError> {
    let namespace = app.namespace().unwrap_or_default();
    let name = app.name_any();
    let span = info_span!(
        "controller.reconcile",
        resource.namespace = %namespace,
        resource.name = %name
    );

    observability::metrics::increment_reconciliations();
    let start = Instant::now();
    let result = ctx.reconcile_pass(&namespace, &name).instrument(span).await;
    observability::metrics::observe_reconciliation_duration(start.elapsed().as_secs_f64());

    if let Err(error) = &result {
        observability::metrics::increment_reconciliation_errors(error.category().as_str());
    }
    result
}

impl Reconciler {
    /// Run one convergence pass for `namespace/name`
    pub async fn reconcile_pass(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Action, ReconcilerError> {
        let app = match self
            .store
            .get_application(namespace, name)
            .await
            .map_err(|e| ReconcilerError::from_store("fetching Application", e))?
        {
            Some(app) => app,
            None => {
                debug!("Application no longer exists, nothing to reconcile");
                return Ok(Action::await_change());
            }
        };

        // Deletion needs no component statuses, so an invalid spec cannot block it
        if app.meta().deletion_timestamp.is_some() {
            finalize(self.store.as_ref(), self.cleanup.as_ref(), &app).await?;
            return Ok(Action::await_change());
        }

        let mut statuses = match ComponentStatuses::initialize(&app) {
            Ok(statuses) => statuses,
            Err(error) => {
                warn!("Rejected Application spec: {}", error);
                self.events.publish(
                    &app,
                    ControllerEvent::warning(error.category().ready_reason(), error.to_string()),
                );
                return Err(error);
            }
        };

        if statuses.is_empty() {
            let status = next_status(
                &app,
                Phase::Available,
                ReadyState::for_phase(Phase::Available, None, &[]),
                Vec::new(),
            );
            persist_status_if_changed(self.store.as_ref(), &app, &status).await?;
            return Ok(Action::await_change());
        }

        if !has_finalizer(&app) {
            add_finalizer(self.store.as_ref(), &app).await?;
            observability::metrics::increment_requeues_total("finalizer-added");
            return Ok(Action::requeue(self.config.progress_requeue()));
        }

        let previous_phase = app.status.as_ref().and_then(|s| s.phase);
        if matches!(previous_phase, None | Some(Phase::Pending)) {
            info!("Starting reconciliation");
            let status = next_status(
                &app,
                Phase::Processing,
                ReadyState::for_phase(Phase::Processing, None, &[]),
                statuses.to_sorted_vec(),
            );
            write_status(self.store.as_ref(), &app, &status).await?;
            observability::metrics::increment_requeues_total("processing");
            return Ok(Action::requeue(self.config.progress_requeue()));
        }

        let (first_error, all_ready, needs_requeue) =
            self.converge_components(&app, &mut statuses).await;

        let phase = compute_phase(
            previous_phase,
            first_error.as_ref().map(ReconcilerError::category),
            all_ready,
        );
        if previous_phase != Some(phase) {
            self.publish_phase_change(&app, previous_phase, phase);
        }

        let ready = ReadyState::for_phase(phase, first_error.as_ref(), &statuses.unready_names());
        let status = next_status(&app, phase, ready, statuses.to_sorted_vec());
        // A failed write outranks the pass error: the next pass must re-read first
        if let Err(write_error) =
            persist_status_if_changed(self.store.as_ref(), &app, &status).await
        {
            if let Some(error) = &first_error {
                warn!("Status write failed after pass error {}: {}", error, write_error);
            }
            return Err(write_error);
        }

        if let Some(error) = first_error {
            return Err(error);
        }
        if !all_ready || needs_requeue {
            debug!("Components not ready, requeueing");
            observability::metrics::increment_requeues_total("not-ready");
            return Ok(Action::requeue(self.config.reconcile_requeue()));
        }
        Ok(Action::await_change())
    }

    /// Build, apply and health-check every component
    ///
    /// Returns the first error of the pass, whether all components are ready and
    /// whether a later pass is needed.
    async fn converge_components(
        &self,
        app: &Application,
        statuses: &mut ComponentStatuses,
    ) -> (Option<ReconcilerError>, bool, bool) {
        let mut built = match build_components(self, app, statuses).await {
            Ok(built) => built,
            Err(error) => {
                statuses.mark_all_not_ready(NOT_CHECKED_MESSAGE);
                return (Some(error), false, true);
            }
        };

        let applied = match apply_components(self, app, &mut built, statuses).await {
            Ok(verdict) => verdict,
            Err(error) => {
                statuses.mark_all_not_ready(NOT_CHECKED_MESSAGE);
                return (Some(error), false, true);
            }
        };
        if let Some(error) = applied.first_error {
            statuses.mark_all_not_ready(NOT_CHECKED_MESSAGE);
            return (Some(error), false, true);
        }

        match aggregate_health(self, app, &mut built, statuses).await {
            Ok(health) => (
                health.first_error,
                health.all_ready && !applied.needs_requeue,
                health.needs_requeue || applied.needs_requeue,
            ),
            Err(error) => (Some(error), false, true),
        }
    }

    fn publish_phase_change(&self, app: &Application, previous: Option<Phase>, phase: Phase) {
        let message = match previous {
            Some(previous) => format!("Phase changed from {previous} to {phase}"),
            None => format!("Phase changed to {phase}"),
        };
        info!("{}", message);
        let event = if phase == Phase::Failed {
            ControllerEvent::warning("PhaseChanged", message)
        } else {
            ControllerEvent::normal("PhaseChanged", message)
        };
        self.events.publish(app, event);
    }
}
