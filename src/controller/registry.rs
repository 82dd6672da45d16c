//! # Component Type Registry
//!
//! Maps a component `type` tag to the capability bundle that knows how to decode,
//! build and probe components of that type.
//!
//! The registry is populated once at process start and shared read-only
//! (`Arc<ComponentRegistry>`) by every convergence pass. The pass never inspects a
//! decoded configuration itself; only the decoder, builder and probe registered
//! under the same tag do.

use crate::controller::store::{ObjectKey, ObjectStore};
use crate::controller::task::Task;
use crate::crd::{Application, ComponentSpec};
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use kube::api::DynamicObject;
use serde::de::DeserializeOwned;
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;
use thiserror::Error;

/// Type-erased, decoded component configuration
pub type DecodedConfig = Arc<dyn Any + Send + Sync>;

/// Borrow the concrete configuration type out of a [`DecodedConfig`]
pub fn config_as<T: 'static>(config: &DecodedConfig) -> Result<&T> {
    config.downcast_ref::<T>().ok_or_else(|| {
        anyhow!(
            "decoded configuration is not a {}",
            std::any::type_name::<T>()
        )
    })
}

/// Everything a builder or probe may consult about the component it serves
#[derive(Clone, Copy)]
pub struct ComponentContext<'a> {
    pub store: &'a dyn ObjectStore,
    pub owner: &'a Application,
    pub component: &'a ComponentSpec,
    /// Primary resource of the component; `None` while building
    pub primary: Option<&'a ObjectKey>,
}

impl fmt::Debug for ComponentContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentContext")
            .field("component", &self.component.name)
            .field("primary", &self.primary)
            .finish_non_exhaustive()
    }
}

/// Decodes the opaque `config` payload of a component
pub trait ConfigDecoder: Send + Sync {
    fn decode(&self, component_type: &str, raw: &serde_json::Value) -> Result<DecodedConfig>;
}

/// Decoder that deserializes the payload into `T` with serde
///
/// A missing payload is decoded as an empty object so types with defaults work.
pub struct JsonConfigDecoder<T> {
    _marker: PhantomData<fn() -> T>,
}

impl<T> JsonConfigDecoder<T> {
    pub fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<T> Default for JsonConfigDecoder<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for JsonConfigDecoder<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "JsonConfigDecoder<{}>", std::any::type_name::<T>())
    }
}

impl<T> ConfigDecoder for JsonConfigDecoder<T>
where
    T: DeserializeOwned + Send + Sync + 'static,
{
    fn decode(&self, component_type: &str, raw: &serde_json::Value) -> Result<DecodedConfig> {
        let raw = if raw.is_null() {
            serde_json::Value::Object(serde_json::Map::new())
        } else {
            raw.clone()
        };
        let config: T = serde_json::from_value(raw)
            .with_context(|| format!("invalid configuration for component type '{component_type}'"))?;
        Ok(Arc::new(config))
    }
}

/// Produces the desired child objects of a component
#[async_trait]
pub trait Builder: Send + Sync {
    /// Every returned object must carry apiVersion, kind, name and namespace
    async fn build_objects(
        &self,
        ctx: &ComponentContext<'_>,
        config: &DecodedConfig,
    ) -> Result<Vec<DynamicObject>>;
}

/// Outcome of an application-level health probe
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthReport {
    pub healthy: bool,
    pub message: String,
}

impl HealthReport {
    pub fn healthy(message: impl Into<String>) -> Self {
        Self {
            healthy: true,
            message: message.into(),
        }
    }

    pub fn unhealthy(message: impl Into<String>) -> Self {
        Self {
            healthy: false,
            message: message.into(),
        }
    }
}

/// Application-level readiness check for a component
///
/// `Err` means the probe itself could not run; an unready target is an
/// `Ok` report with `healthy == false`.
#[async_trait]
pub trait HealthProbe: Send + Sync {
    async fn check_app_health(
        &self,
        ctx: &ComponentContext<'_>,
        config: &DecodedConfig,
    ) -> Result<HealthReport>;
}

/// Probe for types without application-level checks
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysHealthy;

#[async_trait]
impl HealthProbe for AlwaysHealthy {
    async fn check_app_health(
        &self,
        _ctx: &ComponentContext<'_>,
        _config: &DecodedConfig,
    ) -> Result<HealthReport> {
        Ok(HealthReport::healthy("Component is ready"))
    }
}

/// apiVersion/kind of the resource that represents a component
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceIdentity {
    pub api_version: String,
    pub kind: String,
}

impl ResourceIdentity {
    pub fn new(api_version: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            api_version: api_version.into(),
            kind: kind.into(),
        }
    }
}

/// Capability bundle registered under one component type tag
pub struct ComponentType {
    pub type_name: String,
    /// The built object of this apiVersion/kind is the component's primary resource
    pub primary: ResourceIdentity,
    pub decoder: Arc<dyn ConfigDecoder>,
    pub builder: Arc<dyn Builder>,
    pub probe: Arc<dyn HealthProbe>,
    /// Tasks run after the component's objects are applied
    pub post_apply_tasks: Vec<Arc<dyn Task>>,
}

impl fmt::Debug for ComponentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentType")
            .field("type_name", &self.type_name)
            .field("primary", &self.primary)
            .field("post_apply_tasks", &self.post_apply_tasks.len())
            .finish_non_exhaustive()
    }
}

impl ComponentType {
    pub fn new(
        type_name: impl Into<String>,
        primary: ResourceIdentity,
        decoder: Arc<dyn ConfigDecoder>,
        builder: Arc<dyn Builder>,
        probe: Arc<dyn HealthProbe>,
    ) -> Self {
        Self {
            type_name: type_name.into(),
            primary,
            decoder,
            builder,
            probe,
            post_apply_tasks: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_post_apply_task(mut self, task: Arc<dyn Task>) -> Self {
        self.post_apply_tasks.push(task);
        self
    }
}

/// Errors raised while populating the registry
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("component type '{0}' is already registered")]
    DuplicateType(String),
    #[error("component type name cannot be empty")]
    EmptyTypeName,
}

/// Immutable lookup table from type tag to [`ComponentType`]
#[derive(Debug, Default)]
pub struct ComponentRegistry {
    types: HashMap<String, Arc<ComponentType>>,
}

impl ComponentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, component_type: ComponentType) -> Result<(), RegistryError> {
        if component_type.type_name.is_empty() {
            return Err(RegistryError::EmptyTypeName);
        }
        if self.types.contains_key(&component_type.type_name) {
            return Err(RegistryError::DuplicateType(component_type.type_name));
        }
        self.types.insert(
            component_type.type_name.clone(),
            Arc::new(component_type),
        );
        Ok(())
    }

    pub fn get(&self, type_name: &str) -> Option<Arc<ComponentType>> {
        self.types.get(type_name).cloned()
    }

    /// Registered type tags, sorted
    pub fn type_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.types.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}
