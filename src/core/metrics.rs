use std::sync::OnceLock;

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use crate::core::config::Settings;

static PROM_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

pub(crate) fn init(settings: &Settings) -> anyhow::Result<()> {
    if !settings.telemetry().prometheus_enabled {
        return Ok(());
    }

    let handle = PrometheusBuilder::new().install_recorder()?;
    let _ = PROM_HANDLE.set(handle);

    metrics::describe_counter!("uploads_total", "File transfers by outcome");
    metrics::describe_counter!("grade_entries_total", "Grade entries by status");
    metrics::describe_counter!("bulk_operations_total", "Confirmed bulk staff operations");
    metrics::describe_histogram!("upload_bytes", "Size of confirmed uploads");
    Ok(())
}

/// Text exposition of everything recorded so far, if a recorder is installed.
pub(crate) fn render() -> Option<String> {
    PROM_HANDLE.get().map(|handle| handle.render())
}
