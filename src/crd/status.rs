//! # Application Status
//!
//! Status types for tracking reconciliation phase, conditions and per-component health.
//! The shape of these types is the controller's externally visible contract.

use schemars::{JsonSchema, Schema, SchemaGenerator};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fmt;

/// Status of the Application resource
#[derive(Debug, Clone, Deserialize, Serialize, Default, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationStatus {
    /// Current phase of reconciliation
    #[serde(default)]
    pub phase: Option<Phase>,
    /// Conditions represent the latest available observations
    #[serde(default)]
    pub conditions: Vec<Condition>,
    /// One entry per declared component, sorted by name
    #[serde(default)]
    pub components: Vec<ComponentStatus>,
    /// Generation of the spec this status was computed from
    #[serde(default)]
    pub observed_generation: Option<i64>,
}

impl ApplicationStatus {
    /// Find a condition by type
    pub fn condition(&self, condition_type: &str) -> Option<&Condition> {
        self.conditions.iter().find(|c| c.r#type == condition_type)
    }

    /// Compare two statuses ignoring condition transition timestamps
    pub fn is_equivalent(&self, other: &ApplicationStatus) -> bool {
        self.phase == other.phase
            && self.observed_generation == other.observed_generation
            && self.components == other.components
            && self.conditions.len() == other.conditions.len()
            && self
                .conditions
                .iter()
                .zip(&other.conditions)
                .all(|(a, b)| a.same_content(b))
    }
}

/// Overall reconciliation phase
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
pub enum Phase {
    Pending,
    Processing,
    Applying,
    Available,
    Degraded,
    Failed,
}

impl Phase {
    pub fn as_str(self) -> &'static str {
        match self {
            Phase::Pending => "Pending",
            Phase::Processing => "Processing",
            Phase::Applying => "Applying",
            Phase::Available => "Available",
            Phase::Degraded => "Degraded",
            Phase::Failed => "Failed",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl JsonSchema for Phase {
    fn schema_name() -> Cow<'static, str> {
        Cow::Borrowed("Phase")
    }

    fn json_schema(_gen: &mut SchemaGenerator) -> Schema {
        // Plain string enum keeps the CRD schema structural
        let schema_value = serde_json::json!({
            "type": "string",
            "enum": ["Pending", "Processing", "Applying", "Available", "Degraded", "Failed"],
            "description": "Reconciliation phase of the Application."
        });
        Schema::try_from(schema_value).expect("Failed to create Schema for Phase")
    }
}

/// Condition represents a condition of a resource
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    /// Type of condition
    pub r#type: String,
    /// Status of the condition (True, False, Unknown)
    pub status: String,
    /// Last transition time
    #[serde(default)]
    pub last_transition_time: Option<String>,
    /// Reason for the condition
    #[serde(default)]
    pub reason: Option<String>,
    /// Message describing the condition
    #[serde(default)]
    pub message: Option<String>,
}

impl Condition {
    /// Equality on everything except `last_transition_time`
    pub fn same_content(&self, other: &Condition) -> bool {
        self.r#type == other.r#type
            && self.status == other.status
            && self.reason == other.reason
            && self.message == other.message
    }
}

/// Observed state of one component
#[derive(Debug, Clone, Deserialize, Serialize, Default, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ComponentStatus {
    /// Component name (matches `spec.components[].name`)
    pub name: String,
    /// Kind of the component's primary resource
    #[serde(default)]
    pub resource_kind: Option<String>,
    /// API version of the component's primary resource
    #[serde(default)]
    pub api_version: Option<String>,
    /// Name of the component's primary resource
    #[serde(default)]
    pub resource_name: Option<String>,
    /// Namespace of the component's primary resource
    #[serde(default)]
    pub namespace: Option<String>,
    /// Whether the component is healthy
    #[serde(default)]
    pub health: bool,
    /// Human-readable detail
    #[serde(default)]
    pub message: String,
}

impl ComponentStatus {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// True when the primary resource identity was recorded
    pub fn has_resource_identity(&self) -> bool {
        self.resource_kind.is_some()
            && self.api_version.is_some()
            && self.resource_name.is_some()
            && self.namespace.is_some()
    }
}
