//! # Component Types
//!
//! Component types shipped with the controller. Each registers a decoder, a
//! builder and a health probe under its type tag.

pub mod webservice;

use crate::controller::registry::{ComponentRegistry, RegistryError};

/// Registry holding every built-in component type
pub fn builtin_registry() -> Result<ComponentRegistry, RegistryError> {
    let mut registry = ComponentRegistry::new();
    registry.register(webservice::component_type())?;
    Ok(registry)
}
