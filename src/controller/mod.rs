//! # Controller
//!
//! The convergence engine for `Application` resources.
//!
//! - `store` - Object store seam over the Kubernetes API
//! - `applier` - Idempotent server-side apply of one child object
//! - `desired` - Keyed set of desired child objects
//! - `task` - Ordered, idempotent per-component tasks
//! - `health` - Structural and application-level readiness aggregation
//! - `registry` - Component type registry (decoder, builder, probe)
//! - `events` - Best-effort event publishing
//! - `reconciler` - The convergence pass itself

pub mod applier;
pub mod desired;
pub mod events;
pub mod health;
pub mod reconciler;
pub mod registry;
pub mod store;
pub mod task;
