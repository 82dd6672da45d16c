//! # Phase Computation
//!
//! The overall phase and Ready condition are pure functions of the previous
//! phase, the first error of the pass and the aggregate readiness verdict.
//!
//! ```text
//! Pending -> Processing -> Applying -> { Available, Degraded, Failed }
//! ```
//!
//! Failed and Degraded recover on a later pass once their causes clear.

use crate::constants::CONDITION_READY;
use crate::controller::reconciler::{ErrorCategory, ReconcilerError};
use crate::crd::{Condition, Phase};

/// Phase after a pass
///
/// Any error wins over readiness. Losing readiness after the Application was
/// healthy is `Degraded`; still converging for the first time is `Applying`.
pub fn compute_phase(
    previous: Option<Phase>,
    error: Option<ErrorCategory>,
    all_ready: bool,
) -> Phase {
    if error.is_some() {
        return Phase::Failed;
    }
    if all_ready {
        return Phase::Available;
    }
    match previous {
        Some(Phase::Available | Phase::Degraded) => Phase::Degraded,
        _ => Phase::Applying,
    }
}

/// Ready condition content without its transition time
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadyState {
    pub ready: bool,
    pub reason: &'static str,
    pub message: String,
}

impl ReadyState {
    pub fn for_phase(phase: Phase, error: Option<&ReconcilerError>, unready: &[String]) -> Self {
        match (phase, error) {
            (Phase::Failed, Some(error)) => Self {
                ready: false,
                reason: error.category().ready_reason(),
                message: error.to_string(),
            },
            (Phase::Failed, None) => Self {
                ready: false,
                reason: "ReconcileFailed",
                message: "Reconciliation failed".to_string(),
            },
            (Phase::Available, _) => Self {
                ready: true,
                reason: "ComponentsReady",
                message: "All components are ready".to_string(),
            },
            (Phase::Degraded, _) => Self {
                ready: false,
                reason: "ComponentsDegraded",
                message: not_ready_message(unready),
            },
            (Phase::Applying, _) => Self {
                ready: false,
                reason: "ComponentsProgressing",
                message: not_ready_message(unready),
            },
            (Phase::Processing | Phase::Pending, _) => Self {
                ready: false,
                reason: "Processing",
                message: "Reconciliation started".to_string(),
            },
        }
    }

    /// Build the condition, keeping `previous`'s timestamp when nothing changed
    pub fn into_condition(self, previous: Option<&Condition>) -> Condition {
        let mut condition = Condition {
            r#type: CONDITION_READY.to_string(),
            status: if self.ready { "True" } else { "False" }.to_string(),
            last_transition_time: None,
            reason: Some(self.reason.to_string()),
            message: Some(self.message),
        };
        condition.last_transition_time = match previous {
            Some(previous) if previous.same_content(&condition) => {
                previous.last_transition_time.clone()
            }
            _ => Some(chrono::Utc::now().to_rfc3339()),
        };
        condition
    }
}

fn not_ready_message(unready: &[String]) -> String {
    if unready.is_empty() {
        "Waiting for components to become ready".to_string()
    } else {
        format!("Components not ready: {}", unready.join(", "))
    }
}
