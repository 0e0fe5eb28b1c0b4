//! State and synchronisation engine for a staff-graded assignment widget.
//!
//! The host page hands over one JSON snapshot; [`Widget`] owns everything
//! derived from it and talks to the server through a [`Gateway`].

pub(crate) mod core;
pub mod errors;
pub mod model;
pub mod schemas;
pub mod services;
pub mod store;
pub mod validation;
pub mod widget;

#[cfg(test)]
mod test_support;

use std::sync::Arc;

use anyhow::Context;

pub use errors::{EngineError, GatewayError, ModalError, ModelError, UploadError};
pub use model::{ContentHash, FileList, FileRecord, ModuleId, SelectedFile, Submission};
pub use services::gateway::Gateway;
pub use services::grading::GradingConsole;
pub use services::http_gateway::HttpGateway;
pub use services::modal::{Dialog, ModalCoordinator, ModalState};
pub use services::upload::{UploadCoordinator, UploadState, UploadTarget};
pub use store::SubmissionStore;
pub use widget::Widget;

use crate::core::{config::Settings, telemetry};

/// Headless entry point: loads the snapshot named by `SGA_SNAPSHOT_PATH`,
/// initialises a widget against the configured handlers and prints its view.
pub async fn run() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = Settings::load()?;
    telemetry::init_tracing(&settings)?;
    core::metrics::init(&settings)?;

    let path = settings
        .headless()
        .snapshot_path
        .clone()
        .context("SGA_SNAPSHOT_PATH must point at a widget snapshot")?;
    let data_state = tokio::fs::read_to_string(&path)
        .await
        .with_context(|| format!("Failed to read snapshot {path}"))?;

    let gateway: Arc<dyn Gateway> = Arc::new(HttpGateway::from_settings(settings.gateway())?);
    let staff = settings.headless().staff;
    let mut widget = Widget::initialize(&data_state, staff, gateway)?;

    tracing::info!(
        base_url = %settings.gateway().base_url,
        environment = %settings.runtime().environment.as_str(),
        staff,
        "Widget ready"
    );

    if staff {
        if let Err(err) = widget.open_grading().await {
            tracing::error!(error = %err, "Failed to load grading set");
        }
    }

    let view = widget.view().context("Widget has no submission to render")?;
    println!("{}", serde_json::to_string_pretty(&view)?);

    if let Some(rendered) = core::metrics::render() {
        tracing::info!(metrics = %rendered, "Metrics snapshot");
    }

    Ok(())
}
