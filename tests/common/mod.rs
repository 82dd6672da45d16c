//! Shared fixtures for convergence pass tests: an in-memory object store, an
//! event recorder and a few small component types.

#![allow(dead_code, reason = "Not every test binary uses every fixture")]

use anyhow::{anyhow, Result};
use application_controller::config::ControllerConfig;
use application_controller::controller::events::{ControllerEvent, EventSink};
use application_controller::controller::reconciler::{CleanupHook, Reconciler, ReconcilerError};
use application_controller::controller::registry::{
    config_as, Builder, ComponentContext, ComponentRegistry, ComponentType, DecodedConfig,
    HealthProbe, HealthReport, JsonConfigDecoder, ResourceIdentity,
};
use application_controller::controller::store::{ObjectKey, ObjectStore, StoreError};
use application_controller::controller::task::{Task, TaskContext, TaskResult};
use application_controller::crd::{Application, ApplicationSpec, ApplicationStatus, ComponentSpec};
use async_trait::async_trait;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use kube::api::{DynamicObject, ObjectMeta};
use kube::core::TypeMeta;
use kube::ResourceExt;
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

pub const NAMESPACE: &str = "default";
pub const APP_NAME: &str = "shop";

#[derive(Default)]
struct State {
    version: u64,
    applications: BTreeMap<(String, String), Application>,
    objects: BTreeMap<ObjectKey, DynamicObject>,
    fail_apply: BTreeSet<String>,
    conflict_next_status: bool,
    reject_next_status: bool,
    status_writes: usize,
    finalizer_writes: usize,
    apply_calls: usize,
}

impl State {
    fn next_version(&mut self) -> String {
        self.version += 1;
        self.version.to_string()
    }
}

/// In-memory store with resourceVersion preconditions and apply no-op detection
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn insert_application(&self, mut app: Application) {
        let mut state = self.state.lock().unwrap();
        app.metadata.resource_version = Some(state.next_version());
        let key = (app.namespace().unwrap_or_default(), app.name_any());
        state.applications.insert(key, app);
    }

    pub fn application(&self) -> Option<Application> {
        let state = self.state.lock().unwrap();
        state
            .applications
            .get(&(NAMESPACE.to_string(), APP_NAME.to_string()))
            .cloned()
    }

    pub fn status(&self) -> Option<ApplicationStatus> {
        self.application().and_then(|app| app.status)
    }

    /// Replace the declared components, bumping generation and version
    pub fn set_components(&self, components: Vec<ComponentSpec>) {
        let mut state = self.state.lock().unwrap();
        let version = state.next_version();
        if let Some(app) = state
            .applications
            .get_mut(&(NAMESPACE.to_string(), APP_NAME.to_string()))
        {
            app.spec.components = components;
            app.metadata.generation = Some(app.metadata.generation.unwrap_or(0) + 1);
            app.metadata.resource_version = Some(version);
        }
    }

    /// Request deletion the way the API server does: set the timestamp, keep the object
    pub fn mark_deleted(&self) {
        let mut state = self.state.lock().unwrap();
        let version = state.next_version();
        if let Some(app) = state
            .applications
            .get_mut(&(NAMESPACE.to_string(), APP_NAME.to_string()))
        {
            app.metadata.deletion_timestamp =
                Some(serde_json::from_value::<Time>(serde_json::json!("2026-01-01T00:00:00Z")).unwrap());
            app.metadata.resource_version = Some(version);
        }
    }

    pub fn object(&self, key: &ObjectKey) -> Option<DynamicObject> {
        self.state.lock().unwrap().objects.get(key).cloned()
    }

    pub fn object_count(&self) -> usize {
        self.state.lock().unwrap().objects.len()
    }

    /// Replace the status sub-document of a child object, bumping its version
    pub fn set_object_status(&self, key: &ObjectKey, status: serde_json::Value) {
        let mut state = self.state.lock().unwrap();
        let version = state.next_version();
        if let Some(obj) = state.objects.get_mut(key) {
            obj.data["status"] = status;
            obj.metadata.resource_version = Some(version);
        }
    }

    pub fn fail_apply_for(&self, name: &str) {
        self.state.lock().unwrap().fail_apply.insert(name.to_string());
    }

    pub fn conflict_on_next_status_write(&self) {
        self.state.lock().unwrap().conflict_next_status = true;
    }

    pub fn reject_next_status_write(&self) {
        self.state.lock().unwrap().reject_next_status = true;
    }

    pub fn status_writes(&self) -> usize {
        self.state.lock().unwrap().status_writes
    }

    pub fn finalizer_writes(&self) -> usize {
        self.state.lock().unwrap().finalizer_writes
    }

    pub fn apply_calls(&self) -> usize {
        self.state.lock().unwrap().apply_calls
    }
}

fn application_key(app: &Application) -> (String, String) {
    (app.namespace().unwrap_or_default(), app.name_any())
}

fn check_version(stored: &Application, app: &Application) -> Result<(), StoreError> {
    if stored.metadata.resource_version == app.metadata.resource_version {
        Ok(())
    } else {
        Err(StoreError::Conflict(format!("Application {}", app.name_any())))
    }
}

fn without_status(data: &serde_json::Value) -> serde_json::Value {
    let mut data = data.clone();
    if let Some(map) = data.as_object_mut() {
        map.remove("status");
    }
    data
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn get_application(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<Application>, StoreError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .applications
            .get(&(namespace.to_string(), name.to_string()))
            .cloned())
    }

    async fn patch_finalizers(
        &self,
        app: &Application,
        finalizers: Vec<String>,
    ) -> Result<(), StoreError> {
        let mut state = self.state.lock().unwrap();
        let key = application_key(app);
        let version = state.next_version();
        let stored = state
            .applications
            .get_mut(&key)
            .ok_or_else(|| StoreError::NotFound(app.name_any()))?;
        check_version(stored, app)?;

        stored.metadata.finalizers = Some(finalizers);
        stored.metadata.resource_version = Some(version);
        let release = stored.metadata.deletion_timestamp.is_some()
            && stored.finalizers().is_empty();
        state.finalizer_writes += 1;
        if release {
            state.applications.remove(&key);
        }
        Ok(())
    }

    async fn patch_status(
        &self,
        app: &Application,
        status: &ApplicationStatus,
    ) -> Result<(), StoreError> {
        let mut state = self.state.lock().unwrap();
        if std::mem::take(&mut state.conflict_next_status) {
            return Err(StoreError::Conflict(format!(
                "Application {} status",
                app.name_any()
            )));
        }
        if std::mem::take(&mut state.reject_next_status) {
            return Err(StoreError::Invalid("status is read-only".to_string()));
        }
        let key = application_key(app);
        let version = state.next_version();
        let stored = state
            .applications
            .get_mut(&key)
            .ok_or_else(|| StoreError::NotFound(app.name_any()))?;
        check_version(stored, app)?;

        stored.status = Some(status.clone());
        stored.metadata.resource_version = Some(version);
        state.status_writes += 1;
        Ok(())
    }

    async fn get_object(&self, key: &ObjectKey) -> Result<Option<DynamicObject>, StoreError> {
        Ok(self.state.lock().unwrap().objects.get(key).cloned())
    }

    async fn apply_object(
        &self,
        key: &ObjectKey,
        obj: &DynamicObject,
        _field_manager: &str,
    ) -> Result<DynamicObject, StoreError> {
        let mut state = self.state.lock().unwrap();
        state.apply_calls += 1;
        if state.fail_apply.contains(&key.name) {
            return Err(StoreError::Invalid(format!("admission webhook denied {}", key.name)));
        }

        if let Some(existing) = state.objects.get(key) {
            let unchanged = existing.metadata.labels == obj.metadata.labels
                && existing.metadata.owner_references == obj.metadata.owner_references
                && without_status(&existing.data) == without_status(&obj.data);
            if unchanged {
                return Ok(existing.clone());
            }
        }

        let mut stored = obj.clone();
        if let Some(status) = state.objects.get(key).and_then(|o| o.data.get("status")).cloned() {
            stored.data["status"] = status;
        }
        stored.metadata.resource_version = Some(state.next_version());
        state.objects.insert(key.clone(), stored.clone());
        Ok(stored)
    }
}

/// Event sink that keeps every event
#[derive(Default)]
pub struct RecordingEvents {
    events: Mutex<Vec<ControllerEvent>>,
}

impl RecordingEvents {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn reasons(&self) -> Vec<String> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .map(|e| e.reason.clone())
            .collect()
    }
}

impl EventSink for RecordingEvents {
    fn publish(&self, _app: &Application, event: ControllerEvent) {
        self.events.lock().unwrap().push(event);
    }
}

/// Cleanup hook counting its invocations
#[derive(Default)]
pub struct CountingCleanup {
    pub calls: AtomicUsize,
}

#[async_trait]
impl CleanupHook for CountingCleanup {
    async fn cleanup(&self, _app: &Application) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct ValueConfig {
    value: String,
}

pub fn config_map(name: &str, namespace: Option<String>, value: &str) -> DynamicObject {
    DynamicObject {
        types: Some(TypeMeta {
            api_version: "v1".to_string(),
            kind: "ConfigMap".to_string(),
        }),
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace,
            ..Default::default()
        },
        data: serde_json::json!({ "data": { "value": value } }),
    }
}

/// One ConfigMap named `<app>-<component>`
struct ConfigMapBuilder;

#[async_trait]
impl Builder for ConfigMapBuilder {
    async fn build_objects(
        &self,
        ctx: &ComponentContext<'_>,
        config: &DecodedConfig,
    ) -> Result<Vec<DynamicObject>> {
        let config = config_as::<ValueConfig>(config)?;
        let name = format!("{}-{}", ctx.owner.name_any(), ctx.component.name);
        Ok(vec![config_map(&name, ctx.owner.namespace(), &config.value)])
    }
}

/// Two ConfigMaps named `<app>-<component>-x` and `<app>-<component>-y`
struct PairBuilder;

#[async_trait]
impl Builder for PairBuilder {
    async fn build_objects(
        &self,
        ctx: &ComponentContext<'_>,
        config: &DecodedConfig,
    ) -> Result<Vec<DynamicObject>> {
        let config = config_as::<ValueConfig>(config)?;
        let base = format!("{}-{}", ctx.owner.name_any(), ctx.component.name);
        Ok(vec![
            config_map(&format!("{base}-x"), ctx.owner.namespace(), &config.value),
            config_map(&format!("{base}-y"), ctx.owner.namespace(), &config.value),
        ])
    }
}

/// A Service without a namespace
struct NamespacelessBuilder;

#[async_trait]
impl Builder for NamespacelessBuilder {
    async fn build_objects(
        &self,
        ctx: &ComponentContext<'_>,
        _config: &DecodedConfig,
    ) -> Result<Vec<DynamicObject>> {
        Ok(vec![DynamicObject {
            types: Some(TypeMeta {
                api_version: "v1".to_string(),
                kind: "Service".to_string(),
            }),
            metadata: ObjectMeta {
                name: Some(ctx.component.name.clone()),
                ..Default::default()
            },
            data: serde_json::json!({ "spec": { "ports": [{ "port": 80 }] } }),
        }])
    }
}

/// One ConfigMap placed outside the Application's namespace
struct ForeignNamespaceBuilder;

#[async_trait]
impl Builder for ForeignNamespaceBuilder {
    async fn build_objects(
        &self,
        ctx: &ComponentContext<'_>,
        config: &DecodedConfig,
    ) -> Result<Vec<DynamicObject>> {
        let config = config_as::<ValueConfig>(config)?;
        let name = format!("{}-{}", ctx.owner.name_any(), ctx.component.name);
        Ok(vec![config_map(&name, Some("elsewhere".to_string()), &config.value)])
    }
}

/// Probe that cannot reach its target
struct UnreachableProbe;

#[async_trait]
impl HealthProbe for UnreachableProbe {
    async fn check_app_health(
        &self,
        _ctx: &ComponentContext<'_>,
        _config: &DecodedConfig,
    ) -> Result<HealthReport> {
        Err(anyhow!("health endpoint unreachable"))
    }
}

/// Post-apply task that never finishes
struct AwaitMigrationTask;

#[async_trait]
impl Task for AwaitMigrationTask {
    fn name(&self) -> &'static str {
        "await-migration"
    }

    async fn run(&self, _ctx: &mut TaskContext<'_>) -> Result<TaskResult, ReconcilerError> {
        Ok(TaskResult::Pending("Waiting for schema migration".to_string()))
    }
}

/// Probe whose verdict the test controls
pub struct SwitchProbe {
    pub healthy: Arc<AtomicBool>,
}

#[async_trait]
impl HealthProbe for SwitchProbe {
    async fn check_app_health(
        &self,
        _ctx: &ComponentContext<'_>,
        _config: &DecodedConfig,
    ) -> Result<HealthReport> {
        Ok(if self.healthy.load(Ordering::SeqCst) {
            HealthReport::healthy("Component is ready")
        } else {
            HealthReport::unhealthy("Warming up")
        })
    }
}

/// Registry with the `configmap`, `pair`, `broken`, `unreachable`, `foreign`
/// and `migrating` test types
pub fn test_registry(healthy: Arc<AtomicBool>) -> ComponentRegistry {
    let probe: Arc<dyn HealthProbe> = Arc::new(SwitchProbe { healthy });
    let mut registry = ComponentRegistry::new();
    registry
        .register(ComponentType::new(
            "configmap",
            ResourceIdentity::new("v1", "ConfigMap"),
            Arc::new(JsonConfigDecoder::<ValueConfig>::new()),
            Arc::new(ConfigMapBuilder),
            Arc::clone(&probe),
        ))
        .unwrap();
    registry
        .register(ComponentType::new(
            "pair",
            ResourceIdentity::new("v1", "ConfigMap"),
            Arc::new(JsonConfigDecoder::<ValueConfig>::new()),
            Arc::new(PairBuilder),
            Arc::clone(&probe),
        ))
        .unwrap();
    registry
        .register(ComponentType::new(
            "broken",
            ResourceIdentity::new("v1", "Service"),
            Arc::new(JsonConfigDecoder::<serde_json::Value>::new()),
            Arc::new(NamespacelessBuilder),
            Arc::clone(&probe),
        ))
        .unwrap();
    registry
        .register(ComponentType::new(
            "unreachable",
            ResourceIdentity::new("v1", "ConfigMap"),
            Arc::new(JsonConfigDecoder::<ValueConfig>::new()),
            Arc::new(ConfigMapBuilder),
            Arc::new(UnreachableProbe),
        ))
        .unwrap();
    registry
        .register(ComponentType::new(
            "foreign",
            ResourceIdentity::new("v1", "ConfigMap"),
            Arc::new(JsonConfigDecoder::<ValueConfig>::new()),
            Arc::new(ForeignNamespaceBuilder),
            probe,
        ))
        .unwrap();
    // The probe would fail if it ran; the pending task must skip it
    registry
        .register(
            ComponentType::new(
                "migrating",
                ResourceIdentity::new("v1", "ConfigMap"),
                Arc::new(JsonConfigDecoder::<ValueConfig>::new()),
                Arc::new(ConfigMapBuilder),
                Arc::new(UnreachableProbe),
            )
            .with_post_apply_task(Arc::new(AwaitMigrationTask)),
        )
        .unwrap();
    registry
}

/// Test harness around one Application
pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub events: Arc<RecordingEvents>,
    pub healthy: Arc<AtomicBool>,
    pub cleanup: Arc<CountingCleanup>,
    pub reconciler: Arc<Reconciler>,
}

impl Harness {
    pub fn new(components: Vec<ComponentSpec>) -> Self {
        let healthy = Arc::new(AtomicBool::new(true));
        Self::with_registry(components, test_registry(Arc::clone(&healthy)), healthy)
    }

    pub fn with_registry(
        components: Vec<ComponentSpec>,
        registry: ComponentRegistry,
        healthy: Arc<AtomicBool>,
    ) -> Self {
        let store = MemoryStore::new();
        store.insert_application(application(components));
        let events = RecordingEvents::new();
        let cleanup = Arc::new(CountingCleanup::default());
        let reconciler = Reconciler::new(
            Arc::clone(&store) as Arc<dyn ObjectStore>,
            Arc::new(registry),
            Arc::clone(&events) as Arc<dyn EventSink>,
            ControllerConfig::default(),
        )
        .with_cleanup(Arc::clone(&cleanup) as Arc<dyn CleanupHook>);

        Self {
            store,
            events,
            healthy,
            cleanup,
            reconciler: Arc::new(reconciler),
        }
    }

    pub async fn pass(
        &self,
    ) -> Result<kube::runtime::controller::Action, application_controller::controller::reconciler::ReconcilerError>
    {
        self.reconciler.reconcile_pass(NAMESPACE, APP_NAME).await
    }

    /// Register the finalizer and record Processing
    pub async fn bootstrap(&self) {
        self.pass().await.unwrap();
        self.pass().await.unwrap();
    }
}

pub fn application(components: Vec<ComponentSpec>) -> Application {
    let mut app = Application::new(APP_NAME, ApplicationSpec { components });
    app.metadata.namespace = Some(NAMESPACE.to_string());
    app.metadata.uid = Some("uid-shop".to_string());
    app.metadata.generation = Some(1);
    app
}

pub fn component(name: &str, r#type: &str, value: &str) -> ComponentSpec {
    ComponentSpec::new(name, r#type, serde_json::json!({ "value": value }))
}

pub fn config_map_key(name: &str) -> ObjectKey {
    ObjectKey::new("v1", "ConfigMap", NAMESPACE, name)
}
