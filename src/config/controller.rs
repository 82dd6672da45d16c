//! # Reconciliation Settings
//!
//! Field ownership and convergence delays used by every pass.

use super::env_var_or_default;
use crate::constants::{
    DEFAULT_CONFLICT_REQUEUE_SECS, DEFAULT_FIELD_MANAGER, DEFAULT_PROGRESS_REQUEUE_SECS,
    DEFAULT_RECONCILE_REQUEUE_SECS,
};
use std::time::Duration;

/// Controller configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerConfig {
    /// Field manager name claimed by server-side apply
    pub field_manager: String,
    /// Delay before the next pass while anything is outstanding (seconds)
    pub reconcile_requeue_secs: u64,
    /// Delay after a status write conflict (seconds)
    pub conflict_requeue_secs: u64,
    /// Delay after a progress-only pass such as finalizer registration (seconds)
    pub progress_requeue_secs: u64,
    /// Restrict the watch to one namespace; all namespaces when `None`
    pub watch_namespace: Option<String>,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            field_manager: DEFAULT_FIELD_MANAGER.to_string(),
            reconcile_requeue_secs: DEFAULT_RECONCILE_REQUEUE_SECS,
            conflict_requeue_secs: DEFAULT_CONFLICT_REQUEUE_SECS,
            progress_requeue_secs: DEFAULT_PROGRESS_REQUEUE_SECS,
            watch_namespace: None,
        }
    }
}

impl ControllerConfig {
    /// Load configuration from environment variables with defaults
    pub fn from_env() -> Self {
        let field_manager = std::env::var("FIELD_MANAGER")
            .ok()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| DEFAULT_FIELD_MANAGER.to_string());
        let watch_namespace = std::env::var("WATCH_NAMESPACE")
            .ok()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty());

        Self {
            field_manager,
            reconcile_requeue_secs: env_var_or_default(
                "RECONCILE_REQUEUE_SECS",
                DEFAULT_RECONCILE_REQUEUE_SECS,
            ),
            conflict_requeue_secs: env_var_or_default(
                "CONFLICT_REQUEUE_SECS",
                DEFAULT_CONFLICT_REQUEUE_SECS,
            ),
            progress_requeue_secs: env_var_or_default(
                "PROGRESS_REQUEUE_SECS",
                DEFAULT_PROGRESS_REQUEUE_SECS,
            ),
            watch_namespace,
        }
    }

    pub fn reconcile_requeue(&self) -> Duration {
        Duration::from_secs(self.reconcile_requeue_secs)
    }

    pub fn conflict_requeue(&self) -> Duration {
        Duration::from_secs(self.conflict_requeue_secs)
    }

    pub fn progress_requeue(&self) -> Duration {
        Duration::from_secs(self.progress_requeue_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ControllerConfig::default();
        assert_eq!(config.field_manager, "application-controller");
        assert_eq!(config.reconcile_requeue(), Duration::from_secs(30));
        assert_eq!(config.conflict_requeue(), Duration::from_secs(2));
        assert!(config.conflict_requeue() < config.reconcile_requeue());
        assert!(config.watch_namespace.is_none());
    }
}
