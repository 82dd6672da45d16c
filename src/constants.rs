//! # Constants
//!
//! Default values and well-known names used across the controller.

/// Name the controller applies child objects under (server-side apply field manager)
pub const DEFAULT_FIELD_MANAGER: &str = "application-controller";

/// Finalizer registered on every Application before any child object is applied
pub const APPLICATION_FINALIZER: &str = "apps.convergence.io/finalizer";

/// Default convergence delay when a pass leaves outstanding work (seconds)
pub const DEFAULT_RECONCILE_REQUEUE_SECS: u64 = 30;

/// Convergence delay after an optimistic-concurrency conflict on status write (seconds)
pub const DEFAULT_CONFLICT_REQUEUE_SECS: u64 = 2;

/// Delay after a pass that only registered the finalizer or recorded Processing (seconds)
pub const DEFAULT_PROGRESS_REQUEUE_SECS: u64 = 1;

/// Default HTTP port for metrics and probes
pub const DEFAULT_METRICS_PORT: u16 = 8080;

/// Default server startup timeout (seconds)
pub const DEFAULT_SERVER_STARTUP_TIMEOUT_SECS: u64 = 10;

/// Default server readiness poll interval (milliseconds)
pub const DEFAULT_SERVER_POLL_INTERVAL_MS: u64 = 50;

// Labels stamped onto every child object
pub const LABEL_PART_OF: &str = "app.kubernetes.io/part-of";
pub const LABEL_COMPONENT: &str = "app.kubernetes.io/component";
pub const LABEL_INSTANCE: &str = "app.kubernetes.io/instance";
pub const LABEL_MANAGED_BY: &str = "app.kubernetes.io/managed-by";

/// Value of the managed-by label
pub const MANAGED_BY: &str = "application-controller";

/// Condition type carried in the Application status
pub const CONDITION_READY: &str = "Ready";
