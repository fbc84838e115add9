use crate::config::{DistributorConfig, SinkConfig};
use crate::dispatch::dispatcher::{DeliveryOutcome, Dispatcher};
use crate::dispatch::health::is_sink_healthy;
use crate::dispatch::selector::WeightedSelector;
use crate::model::LogMessage;
use crate::queue::{QueuedMessage, RetryQueue};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};

/// Fans a packet's messages out to per-message dispatch tasks.
///
/// A semaphore of `max_concurrency` permits provides backpressure: tasks
/// park until a slot frees, so a single slow sink cannot occupy the whole
/// process. The queue worker runs outside this gate.
pub struct FanoutScheduler {
    config: Arc<DistributorConfig>,
    dispatcher: Arc<Dispatcher>,
    selector: Arc<WeightedSelector>,
    queue: Arc<RetryQueue>,
    slots: Arc<Semaphore>,
}

impl FanoutScheduler {
    pub fn new(
        config: Arc<DistributorConfig>,
        dispatcher: Arc<Dispatcher>,
        selector: Arc<WeightedSelector>,
        queue: Arc<RetryQueue>,
    ) -> Self {
        let slots = Arc::new(Semaphore::new(config.max_concurrency));
        Self {
            config,
            dispatcher,
            selector,
            queue,
            slots,
        }
    }

    /// Dispatch every message of one packet concurrently and wait for all
    /// of them to settle (delivered, rejected, or enqueued). The ingress
    /// handler spawns this and does not await it.
    pub async fn process_batch(self: Arc<Self>, messages: Vec<LogMessage>) {
        if messages.is_empty() {
            return;
        }

        debug!(count = messages.len(), "Dispatching log messages in parallel");

        let mut handles = Vec::with_capacity(messages.len());
        for message in messages {
            let scheduler = Arc::clone(&self);
            handles.push(tokio::spawn(async move {
                let _permit = scheduler
                    .slots
                    .clone()
                    .acquire_owned()
                    .await
                    .expect("dispatch semaphore closed");
                scheduler.dispatch_one(message).await;
            }));
        }

        for handle in handles {
            if let Err(e) = handle.await {
                error!(error = %e, "Dispatch task panicked");
            }
        }

        debug!("Completed processing log message batch");
    }

    async fn dispatch_one(&self, message: LogMessage) {
        let candidates = self.initial_candidates().await;

        let Some(sink) = self.selector.pick(&candidates) else {
            // Unreachable with a validated config; load rejects empty sink
            // lists.
            warn!(id = %message.id, "No sinks available for log message");
            return;
        };

        debug!(
            id = %message.id,
            sink = %sink.id,
            weight = sink.weight,
            "Selected sink for log message"
        );

        match self.dispatcher.dispatch(&message, sink).await {
            DeliveryOutcome::Delivered | DeliveryOutcome::Rejected => {}
            DeliveryOutcome::Exhausted => {
                let sink_id = sink.id.clone();
                info!(id = %message.id, sink = %sink_id, "Queueing log message for reroute");
                self.queue.push(QueuedMessage::new(message, sink_id)).await;
            }
        }
    }

    /// Candidates for initial dispatch: the full sink set, narrowed to
    /// probe-healthy sinks when probing is enabled. An empty probe result
    /// falls back to the full set so the message still gets an attempt.
    async fn initial_candidates(&self) -> Vec<&SinkConfig> {
        let all: Vec<&SinkConfig> = self.config.analyzers.iter().collect();
        if !self.config.probe_health {
            return all;
        }

        let mut healthy = Vec::with_capacity(all.len());
        for sink in &all {
            if is_sink_healthy(self.dispatcher.client(), sink).await {
                healthy.push(*sink);
            }
        }

        if healthy.is_empty() {
            warn!("No sinks passed the health probe, falling back to full set");
            all
        } else {
            healthy
        }
    }
}
