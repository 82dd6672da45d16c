//! # Object Store
//!
//! The seam between the reconciler and the Kubernetes API.
//!
//! Everything the reconciler reads or writes goes through [`ObjectStore`], so the
//! whole convergence pass can run against the real API server ([`KubeStore`]) or
//! an in-memory store in tests. Writes to the Application carry the
//! `resourceVersion` read at the start of the pass; a concurrent writer surfaces
//! as [`StoreError::Conflict`].

use crate::crd::{Application, ApplicationStatus};
use async_trait::async_trait;
use kube::api::{Api, DynamicObject, GroupVersionKind, Patch, PatchParams};
use kube::discovery::{ApiResource, Scope};
use kube::{Client, ResourceExt};
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::debug;

/// Errors returned by the object store
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("object not found: {0}")]
    NotFound(String),
    #[error("conflict writing {0}: the object was modified concurrently")]
    Conflict(String),
    #[error("invalid object: {0}")]
    Invalid(String),
    #[error("store request failed: {0}")]
    Api(#[from] kube::Error),
}

impl StoreError {
    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound(_))
    }

    /// Classify a raw client error, keeping 404/409 distinguishable
    fn from_kube(error: kube::Error, target: &str) -> Self {
        match error {
            kube::Error::Api(ae) if ae.code == 404 => StoreError::NotFound(target.to_string()),
            kube::Error::Api(ae) if ae.code == 409 => StoreError::Conflict(target.to_string()),
            other => StoreError::Api(other),
        }
    }
}

/// Composite identity of a child object: group-version-kind plus namespace/name
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectKey {
    pub api_version: String,
    pub kind: String,
    pub namespace: String,
    pub name: String,
}

impl ObjectKey {
    pub fn new(
        api_version: impl Into<String>,
        kind: impl Into<String>,
        namespace: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            api_version: api_version.into(),
            kind: kind.into(),
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Derive the key from a built object
    ///
    /// Fails with a short description of the first missing identity field.
    pub fn from_object(obj: &DynamicObject) -> Result<Self, String> {
        let types = obj
            .types
            .as_ref()
            .ok_or_else(|| "object has no apiVersion/kind".to_string())?;
        if types.api_version.is_empty() {
            return Err("object has an empty apiVersion".to_string());
        }
        if types.kind.is_empty() {
            return Err("object has an empty kind".to_string());
        }
        let name = obj
            .metadata
            .name
            .as_deref()
            .filter(|n| !n.is_empty())
            .ok_or_else(|| format!("{} object has no name", types.kind))?;
        let namespace = obj
            .metadata
            .namespace
            .as_deref()
            .filter(|n| !n.is_empty())
            .ok_or_else(|| format!("{} {} has no namespace", types.kind, name))?;

        Ok(Self::new(&types.api_version, &types.kind, namespace, name))
    }

    /// Group-version-kind of the object
    pub fn gvk(&self) -> GroupVersionKind {
        let (group, version) = split_api_version(&self.api_version);
        GroupVersionKind::gvk(group, version, &self.kind)
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{} {}/{}",
            self.api_version, self.kind, self.namespace, self.name
        )
    }
}

/// Split "group/version" (or core "version") into its parts
pub fn split_api_version(api_version: &str) -> (&str, &str) {
    match api_version.split_once('/') {
        Some((group, version)) => (group, version),
        None => ("", api_version),
    }
}

/// Store primitives used by a convergence pass
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Fetch the Application; `Ok(None)` when it no longer exists
    async fn get_application(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<Application>, StoreError>;

    /// Replace the finalizer list, guarded by the Application's resourceVersion
    async fn patch_finalizers(
        &self,
        app: &Application,
        finalizers: Vec<String>,
    ) -> Result<(), StoreError>;

    /// Write the status sub-document, guarded by the Application's resourceVersion
    async fn patch_status(
        &self,
        app: &Application,
        status: &ApplicationStatus,
    ) -> Result<(), StoreError>;

    /// Fetch a child object; `Ok(None)` when absent
    async fn get_object(&self, key: &ObjectKey) -> Result<Option<DynamicObject>, StoreError>;

    /// Server-side apply with forced field ownership
    async fn apply_object(
        &self,
        key: &ObjectKey,
        obj: &DynamicObject,
        field_manager: &str,
    ) -> Result<DynamicObject, StoreError>;
}

/// [`ObjectStore`] backed by the Kubernetes API server
pub struct KubeStore {
    client: Client,
    // Discovery results keyed by "apiVersion/kind"
    resources: RwLock<HashMap<String, (ApiResource, bool)>>,
}

impl fmt::Debug for KubeStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KubeStore").finish_non_exhaustive()
    }
}

impl KubeStore {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            resources: RwLock::new(HashMap::new()),
        }
    }

    fn applications(&self, namespace: &str) -> Api<Application> {
        Api::namespaced(self.client.clone(), namespace)
    }

    /// Resolve the dynamic API for a child object via discovery
    async fn dynamic_api(&self, key: &ObjectKey) -> Result<Api<DynamicObject>, StoreError> {
        let cache_key = format!("{}/{}", key.api_version, key.kind);

        let cached = self.resources.read().await.get(&cache_key).cloned();
        let (resource, namespaced) = match cached {
            Some(entry) => entry,
            None => {
                let (resource, capabilities) =
                    kube::discovery::pinned_kind(&self.client, &key.gvk())
                        .await
                        .map_err(|e| StoreError::from_kube(e, &key.to_string()))?;
                let namespaced = matches!(capabilities.scope, Scope::Namespaced);
                debug!(
                    "Discovered {} (plural={}, namespaced={})",
                    cache_key, resource.plural, namespaced
                );
                self.resources
                    .write()
                    .await
                    .insert(cache_key, (resource.clone(), namespaced));
                (resource, namespaced)
            }
        };

        Ok(if namespaced {
            Api::namespaced_with(self.client.clone(), &key.namespace, &resource)
        } else {
            Api::all_with(self.client.clone(), &resource)
        })
    }
}

/// Merge-patch metadata carrying the resourceVersion precondition
fn version_guard(app: &Application) -> serde_json::Value {
    serde_json::json!({ "resourceVersion": app.resource_version() })
}

#[async_trait]
impl ObjectStore for KubeStore {
    async fn get_application(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<Application>, StoreError> {
        self.applications(namespace)
            .get_opt(name)
            .await
            .map_err(|e| StoreError::from_kube(e, &format!("Application {namespace}/{name}")))
    }

    async fn patch_finalizers(
        &self,
        app: &Application,
        finalizers: Vec<String>,
    ) -> Result<(), StoreError> {
        let namespace = app.namespace().unwrap_or_default();
        let name = app.name_any();
        let mut metadata = version_guard(app);
        metadata["finalizers"] = serde_json::json!(finalizers);
        let patch = serde_json::json!({ "metadata": metadata });

        self.applications(&namespace)
            .patch(&name, &PatchParams::default(), &Patch::Merge(&patch))
            .await
            .map_err(|e| StoreError::from_kube(e, &format!("Application {namespace}/{name}")))?;
        Ok(())
    }

    async fn patch_status(
        &self,
        app: &Application,
        status: &ApplicationStatus,
    ) -> Result<(), StoreError> {
        let namespace = app.namespace().unwrap_or_default();
        let name = app.name_any();
        let patch = serde_json::json!({
            "metadata": version_guard(app),
            "status": status
        });

        self.applications(&namespace)
            .patch_status(&name, &PatchParams::default(), &Patch::Merge(&patch))
            .await
            .map_err(|e| {
                StoreError::from_kube(e, &format!("Application {namespace}/{name} status"))
            })?;
        Ok(())
    }

    async fn get_object(&self, key: &ObjectKey) -> Result<Option<DynamicObject>, StoreError> {
        let api = self.dynamic_api(key).await?;
        api.get_opt(&key.name)
            .await
            .map_err(|e| StoreError::from_kube(e, &key.to_string()))
    }

    async fn apply_object(
        &self,
        key: &ObjectKey,
        obj: &DynamicObject,
        field_manager: &str,
    ) -> Result<DynamicObject, StoreError> {
        let api = self.dynamic_api(key).await?;
        api.patch(
            &key.name,
            &PatchParams::apply(field_manager).force(),
            &Patch::Apply(obj),
        )
        .await
        .map_err(|e| StoreError::from_kube(e, &key.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kube::api::ObjectMeta;
    use kube::core::TypeMeta;

    fn object(api_version: &str, kind: &str, ns: Option<&str>, name: Option<&str>) -> DynamicObject {
        DynamicObject {
            types: Some(TypeMeta {
                api_version: api_version.to_string(),
                kind: kind.to_string(),
            }),
            metadata: ObjectMeta {
                name: name.map(str::to_string),
                namespace: ns.map(str::to_string),
                ..Default::default()
            },
            data: serde_json::json!({}),
        }
    }

    #[test]
    fn test_key_from_complete_object() {
        let key =
            ObjectKey::from_object(&object("apps/v1", "Deployment", Some("prod"), Some("web")))
                .unwrap();
        assert_eq!(key, ObjectKey::new("apps/v1", "Deployment", "prod", "web"));
        assert_eq!(key.to_string(), "apps/v1/Deployment prod/web");
    }

    #[test]
    fn test_key_requires_namespace() {
        let err = ObjectKey::from_object(&object("v1", "Service", None, Some("web"))).unwrap_err();
        assert_eq!(err, "Service web has no namespace");
    }

    #[test]
    fn test_key_requires_name() {
        let err =
            ObjectKey::from_object(&object("v1", "Service", Some("default"), None)).unwrap_err();
        assert_eq!(err, "Service object has no name");
    }

    #[test]
    fn test_key_requires_type_meta() {
        let mut obj = object("v1", "Service", Some("default"), Some("web"));
        obj.types = None;
        assert!(ObjectKey::from_object(&obj).is_err());
    }

    #[test]
    fn test_gvk_for_core_and_grouped_versions() {
        let core = ObjectKey::new("v1", "Service", "default", "web").gvk();
        assert_eq!(core.group, "");
        assert_eq!(core.version, "v1");

        let grouped = ObjectKey::new("apps/v1", "Deployment", "default", "web").gvk();
        assert_eq!(grouped.group, "apps");
        assert_eq!(grouped.version, "v1");
        assert_eq!(grouped.kind, "Deployment");
    }

    #[test]
    fn test_keys_order_by_type_then_identity() {
        let mut keys = vec![
            ObjectKey::new("v1", "Service", "default", "b"),
            ObjectKey::new("apps/v1", "Deployment", "default", "a"),
            ObjectKey::new("v1", "Service", "default", "a"),
        ];
        keys.sort();
        assert_eq!(keys[0].kind, "Deployment");
        assert_eq!(keys[1].name, "a");
        assert_eq!(keys[2].name, "b");
    }
}
