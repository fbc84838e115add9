use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Top-level distributor configuration, loaded from a JSON file at startup
/// and immutable afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DistributorConfig {
    /// Port the ingress HTTP server listens on.
    pub port: u16,

    /// Process-wide cap on concurrent in-line dispatch tasks.
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,

    /// When set, probe each sink's health endpoint before initial selection.
    /// Selection falls back to the full sink set if nothing probes healthy.
    #[serde(default)]
    pub probe_health: bool,

    pub analyzers: Vec<SinkConfig>,

    /// Sum of all sink weights, computed at load time.
    #[serde(skip)]
    pub total_weight: f64,
}

fn default_max_concurrency() -> usize {
    10
}

/// A backend sink (called "analyzer" on the wire).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SinkConfig {
    pub id: String,

    /// Relative share of traffic. Zero is allowed; selection then skips the
    /// sink except as a last-resort fallback.
    pub weight: f64,

    /// Legacy flag from older configs. Parsed but never consulted; every
    /// configured sink is a candidate.
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// HTTP URL messages are POSTed to, e.g. "http://analyzer1:8080/analyze".
    pub endpoint: String,

    /// Per-attempt timeout in milliseconds. Zero means the 10 s default.
    #[serde(default)]
    pub timeout: u64,

    /// Additional attempts after the first.
    #[serde(default)]
    pub retry_count: u32,
}

fn default_enabled() -> bool {
    true
}

impl SinkConfig {
    /// Per-attempt timeout, with the fallback applied.
    pub fn attempt_timeout(&self) -> Duration {
        if self.timeout == 0 {
            Duration::from_secs(10)
        } else {
            Duration::from_millis(self.timeout)
        }
    }
}
