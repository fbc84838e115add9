use crate::dispatch::FanoutScheduler;
use crate::model::LogPacket;
use crate::queue::RetryQueue;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

/// Shared state for the distributor HTTP surface.
#[derive(Clone)]
pub struct AppState {
    pub fanout: Arc<FanoutScheduler>,
    pub queue: Arc<RetryQueue>,
}

/// POST /logs
///
/// Acknowledges a packet as soon as it parses; delivery happens in a
/// detached task so ingress latency never depends on sink latency. Sink
/// failures are invisible to the emitter.
pub async fn ingest_packet(State(state): State<AppState>, body: Bytes) -> Response {
    let packet: LogPacket = match serde_json::from_slice(&body) {
        Ok(packet) => packet,
        Err(e) => {
            warn!(error = %e, "Failed to decode log packet");
            return (StatusCode::BAD_REQUEST, "Invalid JSON").into_response();
        }
    };

    info!(
        packet_id = %packet.packet_id,
        agent_id = %packet.agent_id,
        messages = packet.messages.len(),
        "Received log packet"
    );

    let fanout = Arc::clone(&state.fanout);
    tokio::spawn(fanout.process_batch(packet.messages));

    (StatusCode::OK, "Log packet received successfully").into_response()
}

/// GET /health
pub async fn health_check() -> &'static str {
    "Distributor is healthy"
}

#[derive(Debug, Serialize)]
pub struct QueueStatusResponse {
    pub queue_size: usize,
    /// Age of the oldest queued message, empty when the queue is empty.
    pub oldest_message_age: String,
    pub timestamp: String,
}

/// GET /queue
pub async fn queue_status(State(state): State<AppState>) -> Json<QueueStatusResponse> {
    let stats = state.queue.stats().await;
    let now = Utc::now();

    let oldest_message_age = stats
        .oldest
        .map(|queued_at| format_age(now - queued_at))
        .unwrap_or_default();

    Json(QueueStatusResponse {
        queue_size: stats.len,
        oldest_message_age,
        timestamp: now.to_rfc3339(),
    })
}

fn format_age(age: chrono::Duration) -> String {
    let secs = age.num_seconds().max(0);
    let hours = secs / 3600;
    let minutes = (secs % 3600) / 60;
    let seconds = secs % 60;

    if hours > 0 {
        format!("{}h{}m{}s", hours, minutes, seconds)
    } else if minutes > 0 {
        format!("{}m{}s", minutes, seconds)
    } else {
        format!("{}s", seconds)
    }
}
