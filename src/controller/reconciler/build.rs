//! # Build
//!
//! Decode, resolve and build every declared component into its desired object
//! set. Any failure for any component aborts the pass; that component's status
//! is marked failed first so the cause is persisted.

use crate::constants::{LABEL_COMPONENT, LABEL_INSTANCE, LABEL_MANAGED_BY, LABEL_PART_OF, MANAGED_BY};
use crate::controller::applier::ApplyOutcomes;
use crate::controller::desired::DesiredObjectSet;
use crate::controller::events::ControllerEvent;
use crate::controller::health::ComponentStatuses;
use crate::controller::reconciler::{Reconciler, ReconcilerError};
use crate::controller::registry::{ComponentContext, ComponentType, DecodedConfig};
use crate::controller::store::ObjectKey;
use crate::crd::{Application, ComponentSpec};
use kube::api::DynamicObject;
use kube::ResourceExt;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

/// A component whose desired objects were built this pass
pub struct BuiltComponent<'a> {
    pub spec: &'a ComponentSpec,
    pub component_type: Arc<ComponentType>,
    pub config: DecodedConfig,
    pub objects: DesiredObjectSet,
    pub outcomes: ApplyOutcomes,
    /// Key of the component's primary resource within `objects`
    pub primary: ObjectKey,
}

impl fmt::Debug for BuiltComponent<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BuiltComponent")
            .field("component", &self.spec.name)
            .field("type", &self.component_type.type_name)
            .field("objects", &self.objects.len())
            .field("primary", &self.primary)
            .finish_non_exhaustive()
    }
}

/// Build every component in declaration order
pub async fn build_components<'a>(
    reconciler: &Reconciler,
    app: &'a Application,
    statuses: &mut ComponentStatuses,
) -> Result<Vec<BuiltComponent<'a>>, ReconcilerError> {
    let mut built = Vec::with_capacity(app.spec.components.len());
    let mut all_keys: BTreeSet<ObjectKey> = BTreeSet::new();

    for spec in &app.spec.components {
        let result = build_component(reconciler, app, spec)
            .await
            .and_then(|component| {
                claim_keys(spec, &component.objects, &mut all_keys)?;
                Ok(component)
            });

        match result {
            Ok(component) => {
                statuses.record_identity(&spec.name, &component.primary)?;
                debug!(
                    component = %spec.name,
                    objects = component.objects.len(),
                    primary = %component.primary,
                    "Built component"
                );
                built.push(component);
            }
            Err(error) => {
                warn!(component = %spec.name, "Build failed: {}", error);
                statuses.mark_failed(&spec.name, error.to_string());
                reconciler.events.publish(
                    app,
                    ControllerEvent::warning(error.category().ready_reason(), error.to_string()),
                );
                return Err(error);
            }
        }
    }

    Ok(built)
}

async fn build_component<'a>(
    reconciler: &Reconciler,
    app: &Application,
    spec: &'a ComponentSpec,
) -> Result<BuiltComponent<'a>, ReconcilerError> {
    let build_error = |message: String| ReconcilerError::Build {
        component: spec.name.clone(),
        message,
    };

    let component_type = reconciler.registry.get(&spec.r#type).ok_or_else(|| {
        build_error(format!(
            "UnknownComponentType: no component type registered as '{}'",
            spec.r#type
        ))
    })?;

    let config = component_type
        .decoder
        .decode(&spec.r#type, &spec.config)
        .map_err(|e| ReconcilerError::Decode {
            component: spec.name.clone(),
            message: format!("{e:#}"),
        })?;

    let ctx = ComponentContext {
        store: reconciler.store.as_ref(),
        owner: app,
        component: spec,
        primary: None,
    };
    let built = component_type
        .builder
        .build_objects(&ctx, &config)
        .await
        .map_err(|e| build_error(format!("{e:#}")))?;

    let mut objects = DesiredObjectSet::new();
    for mut obj in built {
        let key = ObjectKey::from_object(&obj)
            .map_err(|detail| build_error(format!("InvalidBuiltObject: {detail}")))?;
        stamp_labels(&mut obj, app, spec);
        objects
            .insert(key, obj)
            .map_err(|key| build_error(format!("DuplicateBuiltObject: {key}")))?;
    }

    let identity = &component_type.primary;
    let primary = objects
        .keys()
        .find(|k| k.api_version == identity.api_version && k.kind == identity.kind)
        .cloned()
        .ok_or_else(|| {
            build_error(format!(
                "MissingPrimaryResource: no {}/{} object was built",
                identity.api_version, identity.kind
            ))
        })?;

    Ok(BuiltComponent {
        spec,
        component_type,
        config,
        objects,
        outcomes: BTreeMap::new(),
        primary,
    })
}

/// Reserve the component's keys; two components may not build the same object
fn claim_keys(
    spec: &ComponentSpec,
    objects: &DesiredObjectSet,
    all_keys: &mut BTreeSet<ObjectKey>,
) -> Result<(), ReconcilerError> {
    for key in objects.keys() {
        if !all_keys.insert(key.clone()) {
            return Err(ReconcilerError::Build {
                component: spec.name.clone(),
                message: format!("DuplicateBuiltObject: {key} is also built by another component"),
            });
        }
    }
    Ok(())
}

/// Stamp the fixed label set onto a child object
pub fn stamp_labels(obj: &mut DynamicObject, app: &Application, spec: &ComponentSpec) {
    let labels = obj.labels_mut();
    labels.insert(LABEL_PART_OF.to_string(), app.name_any());
    labels.insert(LABEL_COMPONENT.to_string(), spec.r#type.clone());
    labels.insert(LABEL_INSTANCE.to_string(), spec.name.clone());
    labels.insert(LABEL_MANAGED_BY.to_string(), MANAGED_BY.to_string());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::ApplicationSpec;
    use kube::api::ObjectMeta;

    #[test]
    fn test_stamp_labels_overrides_builder_values() {
        let app = Application::new("shop", ApplicationSpec { components: vec![] });
        let spec = ComponentSpec::new("web", "webservice", serde_json::Value::Null);
        let mut obj = DynamicObject {
            types: None,
            metadata: ObjectMeta {
                labels: Some(BTreeMap::from([
                    ("team".to_string(), "payments".to_string()),
                    (LABEL_MANAGED_BY.to_string(), "helm".to_string()),
                ])),
                ..Default::default()
            },
            data: serde_json::json!({}),
        };

        stamp_labels(&mut obj, &app, &spec);

        let labels = obj.metadata.labels.unwrap();
        assert_eq!(labels[LABEL_PART_OF], "shop");
        assert_eq!(labels[LABEL_COMPONENT], "webservice");
        assert_eq!(labels[LABEL_INSTANCE], "web");
        assert_eq!(labels[LABEL_MANAGED_BY], MANAGED_BY);
        assert_eq!(labels["team"], "payments");
    }
}
