use crate::config::DistributorConfig;
use crate::dispatch::{Dispatcher, FanoutScheduler, WeightedSelector};
use crate::queue::{run_queue_worker, RetryQueue};
use axum::routing::{get, post};
use axum::Router;
use std::net::SocketAddr;
use std::sync::Arc;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tracing::info;

use super::api::{health_check, ingest_packet, queue_status, AppState};

#[derive(Error, Debug)]
pub enum ServerError {
    #[error("server I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("dispatch error: {0}")]
    Dispatch(#[from] crate::dispatch::dispatcher::DispatchError),
}

/// Wires the distributor components together: shared config, one pooled
/// dispatcher, one selector, one retry queue, and the fan-out scheduler on
/// top of them.
pub struct Distributor {
    config: Arc<DistributorConfig>,
    queue: Arc<RetryQueue>,
    dispatcher: Arc<Dispatcher>,
    selector: Arc<WeightedSelector>,
    fanout: Arc<FanoutScheduler>,
}

impl Distributor {
    pub fn new(config: DistributorConfig) -> Result<Self, ServerError> {
        let config = Arc::new(config);
        let dispatcher = Arc::new(Dispatcher::new()?);
        let selector = Arc::new(WeightedSelector::new());
        let queue = Arc::new(RetryQueue::new());
        let fanout = Arc::new(FanoutScheduler::new(
            Arc::clone(&config),
            Arc::clone(&dispatcher),
            Arc::clone(&selector),
            Arc::clone(&queue),
        ));

        Ok(Self {
            config,
            queue,
            dispatcher,
            selector,
            fanout,
        })
    }

    pub fn config(&self) -> &DistributorConfig {
        &self.config
    }

    pub fn router(&self) -> Router {
        let state = AppState {
            fanout: Arc::clone(&self.fanout),
            queue: Arc::clone(&self.queue),
        };

        Router::new()
            .route("/logs", post(ingest_packet))
            .route("/health", get(health_check))
            .route("/queue", get(queue_status))
            .with_state(state)
    }

    /// Start the background reroute loop. The task runs for the lifetime of
    /// the process; the handle is returned for callers that want to await
    /// or abort it in tests.
    pub fn spawn_queue_worker(&self) -> JoinHandle<()> {
        tokio::spawn(run_queue_worker(
            Arc::clone(&self.queue),
            Arc::clone(&self.config),
            Arc::clone(&self.dispatcher),
            Arc::clone(&self.selector),
        ))
    }
}

/// Bind the ingress port and serve forever. Bind failure propagates so the
/// process can exit non-zero.
pub async fn run_server(config: DistributorConfig) -> Result<(), ServerError> {
    let distributor = Distributor::new(config)?;
    distributor.spawn_queue_worker();

    let addr = SocketAddr::from(([0, 0, 0, 0], distributor.config().port));
    let listener = TcpListener::bind(addr).await?;

    info!(addr = %addr, "Distributor server listening");
    info!("Health check available at /health");
    info!("Log endpoint available at /logs");

    axum::serve(listener, distributor.router()).await?;

    Ok(())
}
