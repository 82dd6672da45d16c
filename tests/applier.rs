//! # Applier Tests
//!
//! Idempotent apply classification and per-object outcomes of the apply task.

mod common;

use application_controller::controller::applier::{ApplyOperation, ApplyOutcomes, Applier};
use application_controller::controller::desired::DesiredObjectSet;
use application_controller::controller::events::EventSink;
use application_controller::controller::registry::{AlwaysHealthy, DecodedConfig};
use application_controller::controller::store::ObjectStore;
use application_controller::controller::task::{ApplyTask, Task, TaskContext, TaskResult};
use application_controller::crd::ComponentStatus;
use common::{application, component, config_map, config_map_key, MemoryStore, RecordingEvents};
use std::sync::Arc;

#[tokio::test]
async fn test_apply_reports_created_then_unchanged_then_updated() {
    let store = MemoryStore::new();
    let applier = Applier::new(Arc::clone(&store) as Arc<dyn ObjectStore>, "test-manager");
    let key = config_map_key("settings");
    let desired = config_map("settings", Some("default".to_string()), "v1");

    assert_eq!(applier.apply(&key, &desired).await.unwrap(), ApplyOperation::Created);
    assert_eq!(applier.apply(&key, &desired).await.unwrap(), ApplyOperation::Unchanged);

    let changed = config_map("settings", Some("default".to_string()), "v2");
    assert_eq!(applier.apply(&key, &changed).await.unwrap(), ApplyOperation::Updated);
    assert_eq!(applier.apply(&key, &changed).await.unwrap(), ApplyOperation::Unchanged);
}

#[tokio::test]
async fn test_apply_task_records_every_outcome_and_keeps_first_error() {
    let store = MemoryStore::new();
    store.fail_apply_for("web-x");
    let events = RecordingEvents::new();
    let applier = Applier::new(Arc::clone(&store) as Arc<dyn ObjectStore>, "test-manager");

    let app = application(vec![component("web", "pair", "v1")]);
    let spec = app.spec.components[0].clone();
    let config: DecodedConfig = Arc::new(());
    let mut status = ComponentStatus::new("web");
    let mut objects = DesiredObjectSet::new();
    for name in ["web-x", "web-y"] {
        objects
            .insert(
                config_map_key(name),
                config_map(name, Some("default".to_string()), "v1"),
            )
            .unwrap();
    }
    let mut outcomes = ApplyOutcomes::new();

    let result = {
        let mut ctx = TaskContext {
            app: &app,
            component: &spec,
            config: &config,
            status: &mut status,
            objects: &mut objects,
            outcomes: &mut outcomes,
            primary: None,
            applier: &applier,
            probe: &AlwaysHealthy,
            store: store.as_ref(),
            events: events.as_ref() as &dyn EventSink,
        };
        ApplyTask.run(&mut ctx).await.unwrap()
    };

    let TaskResult::Failed(error) = result else {
        panic!("expected the apply task to fail");
    };
    assert!(error.to_string().contains("web-x"));

    let failed = &outcomes[&config_map_key("web-x")];
    assert!(!failed.is_success());
    assert_eq!(failed.operation, ApplyOperation::None);
    let applied = &outcomes[&config_map_key("web-y")];
    assert!(applied.is_success());
    assert_eq!(applied.operation, ApplyOperation::Created);

    assert!(!status.health);
    assert!(status.message.contains("web-x"));
    assert_eq!(events.reasons(), vec!["ApplyFailed".to_string()]);

    let stored = store.object(&config_map_key("web-y")).unwrap();
    assert_eq!(stored.metadata.owner_references.unwrap()[0].name, "shop");
}
