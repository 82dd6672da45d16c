//! Pass-scoped component status map.

use crate::controller::reconciler::{validate_components, ReconcilerError};
use crate::controller::store::ObjectKey;
use crate::crd::{Application, ComponentStatus};
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// Working ComponentStatus entries of one convergence pass
///
/// Holds exactly one entry per declared component, seeded from the previous
/// status so an unchanged pass reproduces it exactly. Once a component is marked
/// failed or pending, later generic updates leave its message alone.
#[derive(Debug, Clone, Default)]
pub struct ComponentStatuses {
    entries: BTreeMap<String, ComponentStatus>,
    failed: BTreeSet<String>,
    pending: BTreeSet<String>,
}

impl ComponentStatuses {
    /// Validate the declared components and seed one entry per name
    pub fn initialize(app: &Application) -> Result<Self, ReconcilerError> {
        validate_components(&app.spec.components)?;

        let previous: HashMap<&str, &ComponentStatus> = app
            .status
            .as_ref()
            .map(|s| s.components.iter().map(|c| (c.name.as_str(), c)).collect())
            .unwrap_or_default();

        let entries = app
            .spec
            .components
            .iter()
            .map(|component| {
                let status = previous.get(component.name.as_str()).map_or_else(
                    || ComponentStatus {
                        message: "Initializing".to_string(),
                        ..ComponentStatus::new(&component.name)
                    },
                    |s| (*s).clone(),
                );
                (component.name.clone(), status)
            })
            .collect();

        Ok(Self {
            entries,
            failed: BTreeSet::new(),
            pending: BTreeSet::new(),
        })
    }

    pub fn get(&self, name: &str) -> Option<&ComponentStatus> {
        self.entries.get(name)
    }

    pub fn entry_mut(&mut self, name: &str) -> Result<&mut ComponentStatus, ReconcilerError> {
        self.entries.get_mut(name).ok_or_else(|| {
            ReconcilerError::Internal(format!("no status entry for component '{name}'"))
        })
    }

    /// Record the primary resource identity of a component
    pub fn record_identity(&mut self, name: &str, key: &ObjectKey) -> Result<(), ReconcilerError> {
        let status = self.entry_mut(name)?;
        status.api_version = Some(key.api_version.clone());
        status.resource_kind = Some(key.kind.clone());
        status.resource_name = Some(key.name.clone());
        status.namespace = Some(key.namespace.clone());
        Ok(())
    }

    /// Record a specific failure for this pass
    pub fn mark_failed(&mut self, name: &str, message: impl Into<String>) {
        if let Some(status) = self.entries.get_mut(name) {
            status.health = false;
            status.message = message.into();
            self.failed.insert(name.to_string());
        }
    }

    /// Record that a task asked for a later pass
    pub fn mark_pending(&mut self, name: &str, message: impl Into<String>) {
        if self.failed.contains(name) {
            return;
        }
        if let Some(status) = self.entries.get_mut(name) {
            status.health = false;
            status.message = message.into();
            self.pending.insert(name.to_string());
        }
    }

    pub fn is_failed(&self, name: &str) -> bool {
        self.failed.contains(name)
    }

    pub fn is_pending(&self, name: &str) -> bool {
        self.pending.contains(name)
    }

    /// Set health unless a failure was already recorded this pass
    pub fn set_health(&mut self, name: &str, healthy: bool, message: impl Into<String>) {
        if self.failed.contains(name) {
            return;
        }
        if let Some(status) = self.entries.get_mut(name) {
            status.health = healthy;
            status.message = message.into();
        }
    }

    /// Mark every component without a recorded failure as not ready
    pub fn mark_all_not_ready(&mut self, message: &str) {
        for (name, status) in &mut self.entries {
            if self.failed.contains(name) || self.pending.contains(name) {
                status.health = false;
                continue;
            }
            status.health = false;
            message.clone_into(&mut status.message);
        }
    }

    pub fn all_healthy(&self) -> bool {
        self.entries.values().all(|s| s.health)
    }

    /// Names of components that are not healthy, sorted
    pub fn unready_names(&self) -> Vec<String> {
        self.entries
            .values()
            .filter(|s| !s.health)
            .map(|s| s.name.clone())
            .collect()
    }

    /// Entries sorted by component name, ready for persistence
    pub fn to_sorted_vec(&self) -> Vec<ComponentStatus> {
        self.entries.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
