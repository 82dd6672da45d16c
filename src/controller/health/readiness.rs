//! Structural readiness of live objects, judged from their cluster-visible status.

use kube::api::DynamicObject;
use serde_json::Value;

/// Structural readiness of one live object
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Readiness {
    pub ready: bool,
    pub message: String,
}

impl Readiness {
    fn ready(message: impl Into<String>) -> Self {
        Self {
            ready: true,
            message: message.into(),
        }
    }

    fn not_ready(message: impl Into<String>) -> Self {
        Self {
            ready: false,
            message: message.into(),
        }
    }
}

/// Judge readiness from the object's status sub-document
///
/// Workload kinds compare replica counts and require the latest generation to be
/// observed. Jobs must have completed. Any other kind with a `Ready` or
/// `Available` condition follows that condition; kinds without one are ready
/// as soon as they exist.
pub fn structural_readiness(obj: &DynamicObject) -> Readiness {
    let kind = obj.types.as_ref().map_or("", |t| t.kind.as_str());
    let status = obj.data.get("status").unwrap_or(&Value::Null);

    match kind {
        "Deployment" | "StatefulSet" | "ReplicaSet" => replica_readiness(obj, status),
        "DaemonSet" => daemon_set_readiness(obj, status),
        "Job" => job_readiness(status),
        _ => condition_readiness(kind, status),
    }
}

fn int_at(value: &Value, path: &[&str]) -> Option<i64> {
    path.iter()
        .try_fold(value, |current, key| current.get(key))
        .and_then(Value::as_i64)
}

fn generation_observed(obj: &DynamicObject, status: &Value) -> bool {
    match (obj.metadata.generation, int_at(status, &["observedGeneration"])) {
        (Some(generation), Some(observed)) => observed >= generation,
        (Some(_), None) => false,
        (None, _) => true,
    }
}

fn replica_readiness(obj: &DynamicObject, status: &Value) -> Readiness {
    if !generation_observed(obj, status) {
        return Readiness::not_ready("Waiting for the latest generation to be observed");
    }

    let desired = int_at(&obj.data, &["spec", "replicas"]).unwrap_or(1);
    let ready = int_at(status, &["readyReplicas"]).unwrap_or(0);
    // ReplicaSets do not report updated replicas
    let updated = int_at(status, &["updatedReplicas"]).unwrap_or(ready);

    if updated < desired {
        Readiness::not_ready(format!("{updated}/{desired} replicas updated"))
    } else if ready < desired {
        Readiness::not_ready(format!("{ready}/{desired} replicas ready"))
    } else {
        Readiness::ready(format!("{ready}/{desired} replicas ready"))
    }
}

fn daemon_set_readiness(obj: &DynamicObject, status: &Value) -> Readiness {
    if !generation_observed(obj, status) {
        return Readiness::not_ready("Waiting for the latest generation to be observed");
    }

    let desired = int_at(status, &["desiredNumberScheduled"]).unwrap_or(0);
    let ready = int_at(status, &["numberReady"]).unwrap_or(0);
    let updated = int_at(status, &["updatedNumberScheduled"]).unwrap_or(ready);

    if updated < desired {
        Readiness::not_ready(format!("{updated}/{desired} pods updated"))
    } else if ready < desired {
        Readiness::not_ready(format!("{ready}/{desired} pods ready"))
    } else {
        Readiness::ready(format!("{ready}/{desired} pods ready"))
    }
}

fn job_readiness(status: &Value) -> Readiness {
    if let Some(failed) = find_condition(status, "Failed").filter(|c| is_true(c)) {
        return Readiness::not_ready(format!("Job failed: {}", condition_message(failed)));
    }
    let complete = find_condition(status, "Complete").is_some_and(is_true);
    if complete || int_at(status, &["succeeded"]).unwrap_or(0) > 0 {
        Readiness::ready("Job completed")
    } else {
        Readiness::not_ready("Job is running")
    }
}

fn condition_readiness(kind: &str, status: &Value) -> Readiness {
    let condition = find_condition(status, "Ready").or_else(|| find_condition(status, "Available"));
    match condition {
        Some(c) if is_true(c) => Readiness::ready(format!("{kind} is ready")),
        Some(c) => Readiness::not_ready(format!("{kind} is not ready: {}", condition_message(c))),
        None => Readiness::ready(format!("{kind} exists")),
    }
}

fn find_condition<'a>(status: &'a Value, condition_type: &str) -> Option<&'a Value> {
    status
        .get("conditions")
        .and_then(Value::as_array)
        .and_then(|conditions| {
            conditions
                .iter()
                .find(|c| c.get("type").and_then(Value::as_str) == Some(condition_type))
        })
}

fn is_true(condition: &Value) -> bool {
    condition.get("status").and_then(Value::as_str) == Some("True")
}

fn condition_message(condition: &Value) -> &str {
    condition
        .get("message")
        .and_then(Value::as_str)
        .or_else(|| condition.get("reason").and_then(Value::as_str))
        .unwrap_or("no detail")
}
