//! # Application Controller
//!
//! A Kubernetes controller that converges multi-component `Application`
//! resources toward their declared state.
//!
//! ## Overview
//!
//! For every `Application` the controller:
//!
//! 1. **Builds** the child objects of each declared component through the
//!    component type registered under its `type` tag
//! 2. **Applies** them with server-side apply, owning the fields it sets
//! 3. **Checks health** structurally (replica counts, conditions) and through
//!    the component type's probe
//! 4. **Reports** an overall phase and a Ready condition, writing status only
//!    when it changed
//!
//! Deletion is gated by a finalizer; child objects are garbage collected
//! through their owner reference.

use anyhow::Result;
use application_controller::runtime::initialization::initialize;
use application_controller::runtime::watch_loop::run_watch_loop;

#[tokio::main]
async fn main() -> Result<()> {
    let init_result = initialize().await?;

    run_watch_loop(
        init_result.client,
        init_result.applications,
        init_result.reconciler,
        init_result.server_state,
    )
    .await
}
