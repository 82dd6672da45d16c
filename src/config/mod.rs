//! # Controller Configuration
//!
//! Controller-level configuration loaded from environment variables.
//!
//! All settings have defaults in [`crate::constants`] and can be overridden through
//! the environment (typically populated from a ConfigMap via `envFrom`).

mod controller;
mod server;

pub use controller::ControllerConfig;
pub use server::ServerConfig;

/// Load configuration from environment variables with defaults
pub fn load_config() -> (ControllerConfig, ServerConfig) {
    (ControllerConfig::from_env(), ServerConfig::from_env())
}

/// Read environment variable or return default value
///
/// Unparseable values fall back to the default.
pub(crate) fn env_var_or_default<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}
