//! Application Controller Library
//!
//! The convergence engine for `Application` resources, usable both by the
//! controller binary and by tests that drive passes against an in-memory store.

pub mod components;
pub mod config;
pub mod constants;
pub mod controller;
pub mod crd;
pub mod observability;
pub mod runtime;
pub mod server;

// Re-export CRD types for convenience
pub use crd::*;
