use std::sync::OnceLock;

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use crate::core::config::Settings;

static PROM_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

pub(crate) fn init(settings: &Settings) -> anyhow::Result<()> {
    if !settings.telemetry().prometheus_enabled || PROM_HANDLE.get().is_some() {
        return Ok(());
    }

    let handle = PrometheusBuilder::new().install_recorder()?;
    let _ = PROM_HANDLE.set(handle);
    Ok(())
}

pub(crate) fn render() -> Option<String> {
    PROM_HANDLE.get().map(|handle| handle.render())
}

pub(crate) fn record_answer(outcome: &'static str) {
    metrics::counter!("exam_answers_total", "outcome" => outcome).increment(1);
}

pub(crate) fn record_session_submitted() {
    metrics::counter!("exam_sessions_submitted_total").increment(1);
}

pub(crate) fn record_generation(status: &'static str) {
    metrics::counter!("exam_generation_requests_total", "status" => status).increment(1);
}

pub(crate) fn record_upload(files: usize) {
    metrics::counter!("record_uploads_total").increment(1);
    metrics::histogram!("record_upload_files").record(files as f64);
}

/// `route` is the matched pattern (`/api/v1/records/:record_id`), never the raw URI.
pub(crate) fn record_http_request(method: &str, route: String, status: u16, seconds: f64) {
    let method = method.to_string();
    let status = status.to_string();
    metrics::counter!(
        "http_requests_total",
        "method" => method.clone(),
        "route" => route.clone(),
        "status" => status.clone()
    )
    .increment(1);
    metrics::histogram!(
        "http_request_duration_seconds",
        "method" => method,
        "route" => route,
        "status" => status
    )
    .record(seconds);
}
