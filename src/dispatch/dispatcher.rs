use crate::config::SinkConfig;
use crate::model::LogMessage;
use reqwest::header::CONTENT_TYPE;
use reqwest::StatusCode;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, error, info, warn};

const USER_AGENT: &str = "log-distributor/1.0";

#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}

/// Final state of one message's in-line dispatch against one sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// The sink accepted the message with `200 OK`.
    Delivered,
    /// The sink rejected the payload with a non-429 client error. The
    /// message is done; another sink would replay the same rejection.
    Rejected,
    /// Every attempt failed on a retryable error. The message belongs in
    /// the retry queue.
    Exhausted,
}

enum AttemptOutcome {
    Delivered,
    Retryable,
    Rejected(StatusCode),
}

/// Sends individual log messages to sinks. One pooled client is shared by
/// every in-flight dispatch; timeouts are applied per request.
pub struct Dispatcher {
    client: reqwest::Client,
}

impl Dispatcher {
    pub fn new() -> Result<Self, DispatchError> {
        let client = reqwest::Client::builder().user_agent(USER_AGENT).build()?;
        Ok(Self { client })
    }

    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }

    /// Deliver `message` to `sink` with the sink's in-line retry policy:
    /// `retry_count + 1` attempts, exponential backoff between them.
    pub async fn dispatch(&self, message: &LogMessage, sink: &SinkConfig) -> DeliveryOutcome {
        let payload = match serde_json::to_vec(message) {
            Ok(payload) => payload,
            Err(e) => {
                error!(id = %message.id, error = %e, "Failed to serialize log message");
                return DeliveryOutcome::Rejected;
            }
        };

        let timeout = sink.attempt_timeout();

        for attempt in 0..=sink.retry_count {
            if attempt > 0 {
                info!(
                    id = %message.id,
                    sink = %sink.id,
                    attempt = attempt + 1,
                    attempts_total = sink.retry_count + 1,
                    "Retrying log message"
                );
            }

            match self.attempt(&payload, &message.id, sink, timeout).await {
                AttemptOutcome::Delivered => return DeliveryOutcome::Delivered,
                AttemptOutcome::Rejected(status) => {
                    warn!(
                        id = %message.id,
                        sink = %sink.id,
                        status = status.as_u16(),
                        "Sink rejected log message, not retrying"
                    );
                    return DeliveryOutcome::Rejected;
                }
                AttemptOutcome::Retryable => {
                    if attempt < sink.retry_count {
                        let backoff = Duration::from_secs(2u64.saturating_pow(attempt));
                        debug!(
                            id = %message.id,
                            backoff_secs = backoff.as_secs(),
                            "Waiting before retry"
                        );
                        tokio::time::sleep(backoff).await;
                    }
                }
            }
        }

        warn!(
            id = %message.id,
            sink = %sink.id,
            attempts = sink.retry_count + 1,
            "Exhausted retries for log message"
        );
        DeliveryOutcome::Exhausted
    }

    /// One delivery attempt with no retry loop, used by the queue worker.
    /// Returns true only on `200 OK`.
    pub async fn attempt_once(&self, message: &LogMessage, sink: &SinkConfig) -> bool {
        let payload = match serde_json::to_vec(message) {
            Ok(payload) => payload,
            Err(e) => {
                error!(id = %message.id, error = %e, "Failed to serialize log message");
                return false;
            }
        };

        matches!(
            self.attempt(&payload, &message.id, sink, sink.attempt_timeout())
                .await,
            AttemptOutcome::Delivered
        )
    }

    async fn attempt(
        &self,
        payload: &[u8],
        log_id: &str,
        sink: &SinkConfig,
        timeout: Duration,
    ) -> AttemptOutcome {
        let started = Instant::now();
        let result = self
            .client
            .post(&sink.endpoint)
            .timeout(timeout)
            .header(CONTENT_TYPE, "application/json")
            .header("X-Log-ID", log_id)
            .header("X-Analyzer-ID", sink.id.as_str())
            .body(payload.to_vec())
            .send()
            .await;

        match result {
            Err(e) => {
                warn!(id = %log_id, sink = %sink.id, error = %e, "Network error sending log message");
                AttemptOutcome::Retryable
            }
            Ok(response) => {
                let status = response.status();
                if status == StatusCode::OK {
                    debug!(
                        id = %log_id,
                        sink = %sink.id,
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        "Delivered log message"
                    );
                    AttemptOutcome::Delivered
                } else if status == StatusCode::TOO_MANY_REQUESTS {
                    warn!(id = %log_id, sink = %sink.id, "Sink is rate limiting");
                    AttemptOutcome::Retryable
                } else if status.is_client_error() {
                    AttemptOutcome::Rejected(status)
                } else {
                    warn!(
                        id = %log_id,
                        sink = %sink.id,
                        status = status.as_u16(),
                        "Sink returned non-OK status"
                    );
                    AttemptOutcome::Retryable
                }
            }
        }
    }
}
