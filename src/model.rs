use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A single log entry. The distributor treats everything except `id` as
/// opaque payload; `id` is echoed in delivery headers for traceability.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogMessage {
    pub id: String,

    pub timestamp: DateTime<Utc>,

    /// Severity: DEBUG, INFO, WARN, ERROR or FATAL. Carried as-is.
    pub level: String,

    /// Application or service that produced the entry.
    pub source: String,

    /// Actual log content.
    pub message: String,

    /// Additional context.
    pub metadata: HashMap<String, String>,
}

/// A collection of log messages from one agent. The envelope is the unit of
/// ingress; it is discarded after parsing and sinks see individual messages.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogPacket {
    pub packet_id: String,
    pub agent_id: String,
    pub timestamp: DateTime<Utc>,
    pub messages: Vec<LogMessage>,
}
