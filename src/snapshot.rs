use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::derived;
use crate::types::metric::DerivedMetric;
use crate::types::source::{SourceHealth, SourceState};

/// Page-level status. Only `TotalOutage` warrants a full-screen error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PageStatus {
    /// Nothing has settled yet.
    Loading,
    Ready,
    PartialOutage { failed: Vec<String> },
    TotalOutage,
}

/// What one dashboard panel should render.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PanelState {
    Loading,
    Ready,
    /// Showing last good data while the source is failing.
    Stale { error: String },
    Error { message: String },
    Empty,
}

/// Immutable point-in-time view of every source and derived metric.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub sources: BTreeMap<String, SourceState>,
    pub metrics: BTreeMap<String, DerivedMetric>,
    pub last_updated: u64,
    pub is_refreshing: bool,
    pub page_status: PageStatus,
}

impl Snapshot {
    pub fn empty() -> Self {
        Self {
            sources: BTreeMap::new(),
            metrics: BTreeMap::new(),
            last_updated: 0,
            is_refreshing: false,
            page_status: PageStatus::Loading,
        }
    }

    /// Deep equality of everything except timestamps and latency.
    pub fn same_content(&self, other: &Snapshot) -> bool {
        self.is_refreshing == other.is_refreshing
            && self.metrics == other.metrics
            && self.sources.len() == other.sources.len()
            && self
                .sources
                .iter()
                .zip(other.sources.iter())
                .all(|((a_id, a), (b_id, b))| a_id == b_id && a.same_content(b))
    }

    pub fn source(&self, id: &str) -> Option<&SourceState> {
        self.sources.get(id)
    }

    pub fn metric(&self, name: &str) -> Option<&DerivedMetric> {
        self.metrics.get(name)
    }

    pub fn health(&self) -> Vec<SourceHealth> {
        self.sources
            .iter()
            .map(|(id, state)| state.health(id))
            .collect()
    }

    pub fn is_total_outage(&self) -> bool {
        self.page_status == PageStatus::TotalOutage
    }

    pub fn panel(&self, id: &str) -> Option<PanelState> {
        let state = self.sources.get(id)?;
        let panel = match (&state.data, &state.error) {
            (Some(_), Some(error)) => PanelState::Stale {
                error: error.clone(),
            },
            (Some(payload), None) if is_empty_body(&payload.body) => {
                if state.loading {
                    PanelState::Loading
                } else {
                    PanelState::Empty
                }
            }
            (Some(_), None) => PanelState::Ready,
            (None, Some(error)) => PanelState::Error {
                message: error.clone(),
            },
            (None, None) if state.loading => PanelState::Loading,
            (None, None) => PanelState::Empty,
        };
        Some(panel)
    }
}

fn is_empty_body(body: &Value) -> bool {
    match body {
        Value::Null => true,
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
        _ => false,
    }
}

fn page_status(states: &BTreeMap<String, SourceState>) -> PageStatus {
    if states.is_empty() {
        return PageStatus::Ready;
    }
    let failed: Vec<String> = states
        .iter()
        .filter(|(_, s)| s.has_failed())
        .map(|(id, _)| id.clone())
        .collect();
    if failed.len() == states.len() {
        return PageStatus::TotalOutage;
    }
    if !failed.is_empty() {
        return PageStatus::PartialOutage { failed };
    }
    if states.values().all(|s| s.data.is_none()) {
        return PageStatus::Loading;
    }
    PageStatus::Ready
}

/// Pure assembly of a snapshot from source states and derived metrics.
pub fn assemble(
    states: BTreeMap<String, SourceState>,
    metrics: BTreeMap<String, DerivedMetric>,
    now: u64,
) -> Snapshot {
    let is_refreshing = states.values().any(|s| s.loading);
    let page_status = page_status(&states);
    Snapshot {
        sources: states,
        metrics,
        last_updated: now,
        is_refreshing,
        page_status,
    }
}

/// Rebuilds snapshots and remembers the last one published.
pub struct SnapshotAssembler {
    last: Option<Arc<Snapshot>>,
}

impl Default for SnapshotAssembler {
    fn default() -> Self {
        Self::new()
    }
}

impl SnapshotAssembler {
    pub fn new() -> Self {
        Self { last: None }
    }

    /// The last published snapshot, or an empty one before the first publish.
    pub fn last(&self) -> Arc<Snapshot> {
        self.last
            .clone()
            .unwrap_or_else(|| Arc::new(Snapshot::empty()))
    }

    /// Assemble from `states`. Returns `None` when the result matches the last
    /// published snapshot in content.
    pub fn next(&mut self, states: BTreeMap<String, SourceState>, now: u64) -> Option<Arc<Snapshot>> {
        let metrics = derived::compute_all(&states);
        let candidate = assemble(states, metrics, now);
        if self
            .last
            .as_ref()
            .is_some_and(|last| candidate.same_content(last))
        {
            return None;
        }
        let next = Arc::new(candidate);
        self.last = Some(Arc::clone(&next));
        Some(next)
    }
}
