//! # Validation
//!
//! Spec checks that must pass before a convergence pass mutates anything.
//!
//! Component names become the value of the instance label on every child object,
//! so they must also be valid Kubernetes label values.

use crate::controller::reconciler::ReconcilerError;
use crate::crd::ComponentSpec;
use regex::Regex;
use std::collections::HashSet;
use std::sync::LazyLock;

/// Maximum length of a Kubernetes label value
const MAX_LABEL_VALUE_LEN: usize = 63;

static LABEL_VALUE_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9]([-A-Za-z0-9_.]*[A-Za-z0-9])?$")
        .expect("label value regex must compile")
});

/// Validate the declared components of an Application
///
/// Rejects empty and duplicate names, empty types and names that are not valid
/// label values. The first problem found is reported.
pub fn validate_components(components: &[ComponentSpec]) -> Result<(), ReconcilerError> {
    let mut seen = HashSet::with_capacity(components.len());

    for (index, component) in components.iter().enumerate() {
        let name = component.name.as_str();
        if name.trim().is_empty() {
            return Err(ReconcilerError::Validation(format!(
                "component at index {index} has an empty name"
            )));
        }
        if !seen.insert(name) {
            return Err(ReconcilerError::Validation(format!(
                "duplicate component name '{name}'"
            )));
        }
        validate_label_value(name)?;

        if component.r#type.trim().is_empty() {
            return Err(ReconcilerError::Validation(format!(
                "component '{name}' has an empty type"
            )));
        }
    }

    Ok(())
}

fn validate_label_value(name: &str) -> Result<(), ReconcilerError> {
    if name.len() > MAX_LABEL_VALUE_LEN {
        return Err(ReconcilerError::Validation(format!(
            "component name '{}' exceeds maximum length of {} characters (got {})",
            name,
            MAX_LABEL_VALUE_LEN,
            name.len()
        )));
    }
    if !LABEL_VALUE_REGEX.is_match(name) {
        return Err(ReconcilerError::Validation(format!(
            "component name '{name}' must be alphanumeric, '-', '_' or '.', and start and end with an alphanumeric character"
        )));
    }
    Ok(())
}
