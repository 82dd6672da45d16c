//! # Finalizer
//!
//! Finalizer-gated deletion. The finalizer is registered before any child object
//! is applied; on deletion the cleanup hook runs and the finalizer is released.
//! Child objects themselves are removed by garbage collection through their
//! controller owner reference.

use crate::constants::APPLICATION_FINALIZER;
use crate::controller::reconciler::ReconcilerError;
use crate::controller::store::ObjectStore;
use crate::crd::Application;
use async_trait::async_trait;
use kube::ResourceExt;
use tracing::info;

/// Cleanup run before the finalizer is removed
#[async_trait]
pub trait CleanupHook: Send + Sync {
    async fn cleanup(&self, app: &Application) -> anyhow::Result<()>;
}

/// Cleanup hook for deployments that rely on garbage collection alone
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopCleanup;

#[async_trait]
impl CleanupHook for NoopCleanup {
    async fn cleanup(&self, _app: &Application) -> anyhow::Result<()> {
        Ok(())
    }
}

pub fn has_finalizer(app: &Application) -> bool {
    app.finalizers().iter().any(|f| f == APPLICATION_FINALIZER)
}

/// Register the finalizer, keeping any finalizers owned by others
pub async fn add_finalizer(
    store: &dyn ObjectStore,
    app: &Application,
) -> Result<(), ReconcilerError> {
    let mut finalizers = app.finalizers().to_vec();
    finalizers.push(APPLICATION_FINALIZER.to_string());

    info!(
        resource.namespace = %app.namespace().unwrap_or_default(),
        resource.name = %app.name_any(),
        "Adding finalizer"
    );
    store
        .patch_finalizers(app, finalizers)
        .await
        .map_err(|e| ReconcilerError::from_store("adding finalizer", e))
}

/// Run cleanup and release the finalizer
///
/// A missing finalizer means cleanup already ran; nothing is done.
pub async fn finalize(
    store: &dyn ObjectStore,
    cleanup: &dyn CleanupHook,
    app: &Application,
) -> Result<(), ReconcilerError> {
    if !has_finalizer(app) {
        return Ok(());
    }

    info!(
        resource.namespace = %app.namespace().unwrap_or_default(),
        resource.name = %app.name_any(),
        "Deletion requested, running cleanup"
    );
    cleanup
        .cleanup(app)
        .await
        .map_err(|e| ReconcilerError::Cleanup(format!("{e:#}")))?;

    let finalizers: Vec<String> = app
        .finalizers()
        .iter()
        .filter(|f| f.as_str() != APPLICATION_FINALIZER)
        .cloned()
        .collect();

    match store.patch_finalizers(app, finalizers).await {
        Ok(()) => {
            info!(resource.name = %app.name_any(), "Finalizer removed");
            Ok(())
        }
        // Already gone once the last finalizer was dropped elsewhere
        Err(e) if e.is_not_found() => Ok(()),
        Err(e) => Err(ReconcilerError::from_store("removing finalizer", e)),
    }
}
