//! # Web Service
//!
//! A stateless HTTP workload: one Deployment, plus a ClusterIP Service when a
//! port is configured. The Deployment is the primary resource; readiness is
//! judged from its replica counts.

use crate::controller::registry::{
    config_as, AlwaysHealthy, Builder, ComponentContext, ComponentType, DecodedConfig,
    JsonConfigDecoder, ResourceIdentity,
};
use anyhow::{Context, Result};
use async_trait::async_trait;
use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec};
use k8s_openapi::api::core::v1::{
    Container, ContainerPort, PodSpec, PodTemplateSpec, Service, ServicePort, ServiceSpec,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::api::{DynamicObject, ObjectMeta};
use kube::ResourceExt;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

pub const TYPE_NAME: &str = "webservice";

/// Configuration of a `webservice` component
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct WebServiceConfig {
    /// Container image
    pub image: String,
    #[serde(default = "default_replicas")]
    pub replicas: i32,
    /// Container port; a Service is created when set
    #[serde(default)]
    pub port: Option<i32>,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

fn default_replicas() -> i32 {
    1
}

pub fn component_type() -> ComponentType {
    ComponentType::new(
        TYPE_NAME,
        ResourceIdentity::new("apps/v1", "Deployment"),
        Arc::new(JsonConfigDecoder::<WebServiceConfig>::new()),
        Arc::new(WebServiceBuilder),
        Arc::new(AlwaysHealthy),
    )
}

#[derive(Debug, Clone, Copy, Default)]
pub struct WebServiceBuilder;

#[async_trait]
impl Builder for WebServiceBuilder {
    async fn build_objects(
        &self,
        ctx: &ComponentContext<'_>,
        config: &DecodedConfig,
    ) -> Result<Vec<DynamicObject>> {
        let config = config_as::<WebServiceConfig>(config)?;
        if config.image.trim().is_empty() {
            anyhow::bail!("image cannot be empty");
        }
        if config.replicas < 0 {
            anyhow::bail!("replicas cannot be negative (got {})", config.replicas);
        }

        let app_name = ctx.owner.name_any();
        let name = format!("{}-{}", app_name, ctx.component.name);
        let namespace = ctx.owner.namespace();
        let selector = BTreeMap::from([
            ("app.kubernetes.io/part-of".to_string(), app_name),
            (
                "app.kubernetes.io/instance".to_string(),
                ctx.component.name.clone(),
            ),
        ]);

        let mut objects = vec![to_dynamic(&deployment(&name, namespace.clone(), &selector, config))?];
        if let Some(port) = config.port {
            objects.push(to_dynamic(&service(&name, namespace, &selector, port))?);
        }
        Ok(objects)
    }
}

fn deployment(
    name: &str,
    namespace: Option<String>,
    selector: &BTreeMap<String, String>,
    config: &WebServiceConfig,
) -> Deployment {
    let env = config
        .env
        .iter()
        .map(|(name, value)| k8s_openapi::api::core::v1::EnvVar {
            name: name.clone(),
            value: Some(value.clone()),
            ..Default::default()
        })
        .collect::<Vec<_>>();

    Deployment {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace,
            ..Default::default()
        },
        spec: Some(DeploymentSpec {
            replicas: Some(config.replicas),
            selector: LabelSelector {
                match_labels: Some(selector.clone()),
                ..Default::default()
            },
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(selector.clone()),
                    ..Default::default()
                }),
                spec: Some(PodSpec {
                    containers: vec![Container {
                        name: "app".to_string(),
                        image: Some(config.image.clone()),
                        ports: config.port.map(|port| {
                            vec![ContainerPort {
                                container_port: port,
                                name: Some("http".to_string()),
                                ..Default::default()
                            }]
                        }),
                        env: (!env.is_empty()).then_some(env),
                        ..Default::default()
                    }],
                    ..Default::default()
                }),
            },
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn service(
    name: &str,
    namespace: Option<String>,
    selector: &BTreeMap<String, String>,
    port: i32,
) -> Service {
    Service {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace,
            ..Default::default()
        },
        spec: Some(ServiceSpec {
            selector: Some(selector.clone()),
            ports: Some(vec![ServicePort {
                name: Some("http".to_string()),
                port,
                target_port: Some(IntOrString::String("http".to_string())),
                ..Default::default()
            }]),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Convert a typed object into a dynamic one, keeping apiVersion and kind
fn to_dynamic<K: Serialize>(obj: &K) -> Result<DynamicObject> {
    let value = serde_json::to_value(obj).context("Failed to serialize built object")?;
    serde_json::from_value(value).context("Failed to convert built object")
}
