use crate::config::{DistributorConfig, SinkConfig};
use crate::dispatch::{Dispatcher, WeightedSelector};
use crate::queue::RetryQueue;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info};

/// Pause between queue passes. A recovered sink therefore receives its
/// first queued message at most one interval after recovery.
pub const CYCLE_INTERVAL: Duration = Duration::from_secs(2);

/// Background loop that re-dispatches queued messages, one untried sink per
/// message per cycle. Runs unbounded by the dispatch semaphore, with at
/// most one outstanding POST at a time.
pub async fn run_queue_worker(
    queue: Arc<RetryQueue>,
    config: Arc<DistributorConfig>,
    dispatcher: Arc<Dispatcher>,
    selector: Arc<WeightedSelector>,
) {
    loop {
        sleep(CYCLE_INTERVAL).await;

        // The lock covers the whole pass, including delivery attempts.
        // Dispatcher pushes and /queue reads wait until the pass finishes.
        let mut entries = queue.lock().await;
        if entries.is_empty() {
            continue;
        }

        debug!(pending = entries.len(), "Starting retry queue pass");

        let current: Vec<_> = entries.drain(..).collect();
        let mut kept = Vec::with_capacity(current.len());

        for mut entry in current {
            let candidates: Vec<&SinkConfig> = config
                .analyzers
                .iter()
                .filter(|sink| !entry.tried_sinks.contains(&sink.id))
                .collect();

            match selector.pick(&candidates) {
                // Every sink has been tried; the entry waits for one to
                // recover out-of-band. Nothing to record.
                None => kept.push(entry),
                Some(sink) => {
                    if dispatcher.attempt_once(&entry.message, sink).await {
                        info!(
                            id = %entry.message.id,
                            sink = %sink.id,
                            queue_attempts = entry.attempts,
                            "Delivered queued log message"
                        );
                    } else {
                        entry.tried_sinks.insert(sink.id.clone());
                        entry.attempts += 1;
                        entry.last_attempt = Utc::now();
                        kept.push(entry);
                    }
                }
            }
        }

        *entries = kept;
    }
}
