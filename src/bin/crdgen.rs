//! Prints the Application CustomResourceDefinition as YAML.

use anyhow::Result;
use application_controller::Application;
use kube::CustomResourceExt;

fn main() -> Result<()> {
    print!("{}", serde_yaml::to_string(&Application::crd())?);
    Ok(())
}
