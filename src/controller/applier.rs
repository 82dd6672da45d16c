//! # Idempotent Applier
//!
//! Applies one desired object with server-side apply, claiming exclusive ownership
//! of the fields it sets and forcing ownership transfer from any other manager.
//!
//! The live object is read before the apply and its `resourceVersion` compared
//! with the version returned by the apply. An apply that changes nothing leaves
//! the version untouched, so the outcome is reported as `Unchanged`; a missing
//! live object means `Created`. `None` is only reported when the store returns
//! no version token to compare. Store errors are returned as-is and never retried
//! here; the next convergence pass is the retry.

use crate::controller::store::{ObjectKey, ObjectStore, StoreError};
use crate::observability;
use kube::api::DynamicObject;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// What an apply did to the live object
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOperation {
    Created,
    Updated,
    Unchanged,
    /// The store did not report enough to tell
    None,
}

impl ApplyOperation {
    pub fn as_str(self) -> &'static str {
        match self {
            ApplyOperation::Created => "created",
            ApplyOperation::Updated => "updated",
            ApplyOperation::Unchanged => "unchanged",
            ApplyOperation::None => "none",
        }
    }
}

impl fmt::Display for ApplyOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-object apply result
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplyOutcome {
    pub operation: ApplyOperation,
    pub error: Option<String>,
}

impl ApplyOutcome {
    pub fn applied(operation: ApplyOperation) -> Self {
        Self {
            operation,
            error: None,
        }
    }

    pub fn failed(error: &StoreError) -> Self {
        Self {
            operation: ApplyOperation::None,
            error: Some(error.to_string()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Apply outcomes keyed identically to the desired object set
pub type ApplyOutcomes = BTreeMap<ObjectKey, ApplyOutcome>;

/// Applies desired objects through the object store
#[derive(Clone)]
pub struct Applier {
    store: Arc<dyn ObjectStore>,
    field_manager: String,
}

impl fmt::Debug for Applier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Applier")
            .field("field_manager", &self.field_manager)
            .finish_non_exhaustive()
    }
}

impl Applier {
    pub fn new(store: Arc<dyn ObjectStore>, field_manager: impl Into<String>) -> Self {
        Self {
            store,
            field_manager: field_manager.into(),
        }
    }

    pub fn field_manager(&self) -> &str {
        &self.field_manager
    }

    /// Apply `obj` under `key`
    pub async fn apply(
        &self,
        key: &ObjectKey,
        obj: &DynamicObject,
    ) -> Result<ApplyOperation, StoreError> {
        let before = self.store.get_object(key).await?;
        let after = self
            .store
            .apply_object(key, obj, &self.field_manager)
            .await?;

        let operation = classify(before.as_ref(), &after);
        debug!(object = %key, operation = %operation, "Applied object");
        observability::metrics::increment_objects_applied(operation.as_str());
        Ok(operation)
    }
}

/// Compare resource versions before and after an apply
pub fn classify(before: Option<&DynamicObject>, after: &DynamicObject) -> ApplyOperation {
    let Some(after_version) = after.metadata.resource_version.as_deref() else {
        return ApplyOperation::None;
    };
    match before {
        None => ApplyOperation::Created,
        Some(before) => match before.metadata.resource_version.as_deref() {
            None => ApplyOperation::None,
            Some(v) if v == after_version => ApplyOperation::Unchanged,
            Some(_) => ApplyOperation::Updated,
        },
    }
}
