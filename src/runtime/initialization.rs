//! # Initialization
//!
//! Controller initialization logic including rustls setup, tracing, metrics,
//! server startup, Kubernetes client setup and the component type registry.

use crate::components;
use crate::config::{ControllerConfig, ServerConfig};
use crate::constants;
use crate::controller::events::KubeEventSink;
use crate::controller::reconciler::Reconciler;
use crate::controller::store::KubeStore;
use crate::crd::Application;
use crate::observability;
use crate::server::{start_server, ServerState};
use anyhow::{Context, Result};
use kube::api::{Api, ListParams};
use kube::Client;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{error, info};

/// Initialization result containing all necessary components for the controller
pub struct InitializationResult {
    /// Kubernetes client
    pub client: Client,
    /// API for the Application CRD, scoped to the watch namespace
    pub applications: Api<Application>,
    /// Reconciler context
    pub reconciler: Arc<Reconciler>,
    /// Server state for health checks
    pub server_state: Arc<ServerState>,
}

/// Initialize the controller runtime
///
/// This function handles:
/// - rustls crypto provider setup
/// - Tracing subscriber setup
/// - Metrics registration
/// - HTTP server startup
/// - Kubernetes client creation
/// - Component type registry and reconciler setup
pub async fn initialize() -> Result<InitializationResult> {
    // Required for rustls 0.23+ when no default provider is selected via features
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_existing| anyhow::anyhow!("Failed to install rustls crypto provider"))?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "application_controller=info".into()),
        )
        .init();

    info!("Starting Application Controller v{}", env!("CARGO_PKG_VERSION"));

    let (controller_config, server_config) = crate::config::load_config();
    info!(
        "Configuration: field_manager={}, requeue={}s, conflict_requeue={}s, watch_namespace={}",
        controller_config.field_manager,
        controller_config.reconcile_requeue_secs,
        controller_config.conflict_requeue_secs,
        controller_config.watch_namespace.as_deref().unwrap_or("<all>")
    );

    observability::metrics::register_metrics()?;

    let server_state = Arc::new(ServerState {
        is_ready: Arc::new(AtomicBool::new(false)),
    });

    let server_state_clone = Arc::clone(&server_state);
    let server_port = server_config.metrics_port;
    let server_handle = tokio::spawn(async move {
        if let Err(e) = start_server(server_port, server_state_clone).await {
            error!("HTTP server error: {}", e);
        }
    });

    // Readiness probes must pass before passes start
    wait_for_server_ready(&server_config, &server_state, &server_handle).await?;

    let client = Client::try_default()
        .await
        .context("Failed to create Kubernetes client")?;

    let applications: Api<Application> = match controller_config.watch_namespace.as_deref() {
        Some(namespace) => Api::namespaced(client.clone(), namespace),
        None => Api::all(client.clone()),
    };

    let reconciler = Arc::new(build_reconciler(client.clone(), controller_config)?);

    log_startup_summary(&applications).await?;

    info!("Controller initialized, starting watch loop...");

    Ok(InitializationResult {
        client,
        applications,
        reconciler,
        server_state,
    })
}

/// Wire the store, event sink and built-in component types into a reconciler
fn build_reconciler(client: Client, config: ControllerConfig) -> Result<Reconciler> {
    let registry = components::builtin_registry().context("Failed to register component types")?;
    info!("Registered component types: {}", registry.type_names().join(", "));

    let store = Arc::new(KubeStore::new(client.clone()));
    let events = Arc::new(KubeEventSink::new(client, constants::DEFAULT_FIELD_MANAGER));
    Ok(Reconciler::new(store, Arc::new(registry), events, config))
}

/// Wait for the HTTP server to become ready
async fn wait_for_server_ready(
    config: &ServerConfig,
    server_state: &Arc<ServerState>,
    server_handle: &tokio::task::JoinHandle<()>,
) -> Result<()> {
    let startup_timeout = config.startup_timeout();
    let poll_interval = config.poll_interval();
    let start_time = std::time::Instant::now();

    loop {
        if server_handle.is_finished() {
            return Err(anyhow::anyhow!("HTTP server failed to start"));
        }

        // Set by start_server once bound
        if server_state.is_ready.load(Ordering::Relaxed) {
            info!("HTTP server is ready and accepting connections");
            break;
        }

        if start_time.elapsed() > startup_timeout {
            return Err(anyhow::anyhow!(
                "HTTP server failed to become ready within {} seconds",
                startup_timeout.as_secs()
            ));
        }

        tokio::time::sleep(poll_interval).await;
    }

    Ok(())
}

/// Check the CRD is queryable and log existing Applications by namespace
async fn log_startup_summary(applications: &Api<Application>) -> Result<()> {
    let list = applications
        .list(&ListParams::default())
        .await
        .context("Application CRD is not queryable; is it installed?")?;

    let mut by_namespace: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for item in &list.items {
        by_namespace
            .entry(item.metadata.namespace.clone().unwrap_or_default())
            .or_default()
            .push(item.metadata.name.clone().unwrap_or_default());
    }

    info!(
        "Found {} existing Application resources in {} namespaces",
        list.items.len(),
        by_namespace.len()
    );
    for (namespace, mut names) in by_namespace {
        names.sort();
        let shown = if names.len() <= 3 {
            names.join(", ")
        } else {
            format!("{}, ... ({} total)", names[..3].join(", "), names.len())
        };
        info!("  {}: {}", namespace, shown);
    }
    Ok(())
}
