use serde::{Deserialize, Serialize};

use super::payload::Payload;

/// Runtime status of one source. Only the owning poller writes it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceState {
    pub loading: bool,
    pub error: Option<String>,
    pub data: Option<Payload>,
    pub updated_at: Option<u64>,
    pub last_success_at: Option<u64>,
    pub last_failure_at: Option<u64>,
    pub consecutive_failures: u32,
    pub last_latency_ms: Option<u64>,
}

impl SourceState {
    /// Equality that ignores timestamps and latency.
    pub fn same_content(&self, other: &SourceState) -> bool {
        self.loading == other.loading
            && self.error == other.error
            && self.data == other.data
            && self.consecutive_failures == other.consecutive_failures
    }

    pub fn has_failed(&self) -> bool {
        self.error.is_some()
    }

    pub fn health_status(&self) -> SourceHealthStatus {
        match (&self.error, &self.data) {
            (None, Some(_)) => SourceHealthStatus::Healthy,
            (None, None) => SourceHealthStatus::Pending,
            (Some(_), Some(_)) => SourceHealthStatus::Degraded,
            (Some(_), None) => SourceHealthStatus::Offline,
        }
    }

    pub fn health(&self, source_id: &str) -> SourceHealth {
        SourceHealth {
            source_id: source_id.to_string(),
            status: self.health_status(),
            last_success: self.last_success_at,
            last_failure: self.last_failure_at,
            fail_count: self.consecutive_failures,
            latency_ms: self.last_latency_ms,
            message: self.error.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceHealthStatus {
    Pending,
    Healthy,
    /// Failing, still serving the last good data.
    Degraded,
    Offline,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceHealth {
    pub source_id: String,
    pub status: SourceHealthStatus,
    pub last_success: Option<u64>,
    pub last_failure: Option<u64>,
    pub fail_count: u32,
    pub latency_ms: Option<u64>,
    pub message: Option<String>,
}
