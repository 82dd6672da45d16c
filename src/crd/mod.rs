//! # Custom Resource Definitions
//!
//! CRD types for the Application Controller.
//!
//! An `Application` declares a list of typed components. Each component's
//! configuration is opaque to the controller and is decoded by the component
//! type registered under its `type` tag.

mod status;

pub use status::*;

use schemars::{JsonSchema, Schema, SchemaGenerator};
use serde::{Deserialize, Serialize};

/// Application Custom Resource Definition
///
/// # Example
///
/// ```yaml
/// apiVersion: apps.convergence.io/v1alpha1
/// kind: Application
/// metadata:
///   name: shop
///   namespace: default
/// spec:
///   components:
///     - name: web
///       type: webservice
///       config:
///         image: nginx:1.27
///         port: 80
/// ```
#[derive(kube::CustomResource, Debug, Clone, Deserialize, Serialize, JsonSchema)]
#[kube(
    kind = "Application",
    group = "apps.convergence.io",
    version = "v1alpha1",
    namespaced,
    status = "ApplicationStatus",
    shortname = "capp",
    printcolumn = r#"{"name":"Phase", "type":"string", "jsonPath":".status.phase"}, {"name":"Ready", "type":"string", "jsonPath":".status.conditions[?(@.type==\"Ready\")].status"}, {"name":"Reason", "type":"string", "jsonPath":".status.conditions[?(@.type==\"Ready\")].reason"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationSpec {
    /// Components making up the application
    /// Names must be unique and non-empty
    #[serde(default)]
    pub components: Vec<ComponentSpec>,
}

/// One named, typed unit of an Application
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ComponentSpec {
    /// Component name, unique within the Application
    pub name: String,
    /// Component type tag; selects the decoder, builder and health probe
    #[serde(rename = "type")]
    pub r#type: String,
    /// Type-specific configuration, decoded by the component type
    #[serde(default)]
    #[schemars(schema_with = "preserve_unknown_fields")]
    pub config: serde_json::Value,
}

impl ComponentSpec {
    pub fn new(name: impl Into<String>, r#type: impl Into<String>, config: serde_json::Value) -> Self {
        Self {
            name: name.into(),
            r#type: r#type.into(),
            config,
        }
    }
}

/// Structural schema for opaque configuration payloads
fn preserve_unknown_fields(_gen: &mut SchemaGenerator) -> Schema {
    let schema_value = serde_json::json!({
        "type": "object",
        "x-kubernetes-preserve-unknown-fields": true,
        "description": "Component configuration; shape depends on the component type."
    });
    Schema::try_from(schema_value).expect("Failed to create Schema for component config")
}
