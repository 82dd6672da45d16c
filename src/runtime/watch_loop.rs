//! # Watch Loop
//!
//! Drives the kube-runtime controller: Application changes and changes to owned
//! Deployments and Services trigger passes, one at a time per Application.

use crate::controller::reconciler::{reconcile, Reconciler};
use crate::crd::Application;
use crate::runtime::error_policy::{error_policy, log_controller_error};
use crate::server::ServerState;
use anyhow::Result;
use futures::StreamExt;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::Service;
use kube::runtime::controller::Controller;
use kube::runtime::watcher;
use kube::{Api, Client};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::{debug, info};

/// Run the controller until a shutdown signal arrives
pub async fn run_watch_loop(
    client: Client,
    applications: Api<Application>,
    reconciler: Arc<Reconciler>,
    server_state: Arc<ServerState>,
) -> Result<()> {
    let (deployments, services): (Api<Deployment>, Api<Service>) =
        match reconciler.config().watch_namespace.as_deref() {
            Some(namespace) => (
                Api::namespaced(client.clone(), namespace),
                Api::namespaced(client, namespace),
            ),
            None => (Api::all(client.clone()), Api::all(client)),
        };

    info!("Starting watch loop for Application resources");
    Controller::new(applications, watcher::Config::default().any_semantic())
        .owns(deployments, watcher::Config::default())
        .owns(services, watcher::Config::default())
        .shutdown_on_signal()
        .run(reconcile, error_policy, reconciler)
        .for_each(|result| async move {
            match result {
                Ok((reference, action)) => {
                    debug!("Reconciled {}: {:?}", reference, action);
                }
                Err(error) => log_controller_error(&error),
            }
        })
        .await;

    server_state.is_ready.store(false, Ordering::Relaxed);
    info!("Watch loop stopped");
    Ok(())
}
