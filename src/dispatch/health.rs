use crate::config::SinkConfig;
use reqwest::StatusCode;
use std::time::Duration;
use tracing::debug;

const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Probe a sink's health endpoint, derived from its delivery endpoint by
/// substituting `/health` for `/analyze`. Anything but a `200 OK` within
/// the probe timeout counts as unhealthy.
pub async fn is_sink_healthy(client: &reqwest::Client, sink: &SinkConfig) -> bool {
    let url = sink.endpoint.replacen("/analyze", "/health", 1);

    match client.get(url).timeout(PROBE_TIMEOUT).send().await {
        Ok(response) => response.status() == StatusCode::OK,
        Err(e) => {
            debug!(sink = %sink.id, error = %e, "Health probe failed");
            false
        }
    }
}
