use serde::Serialize;
use tokio::sync::broadcast;
use tracing::debug;

use crate::snapshot::Snapshot;
use crate::types::source::SourceHealth;

/// Event names as constants. Presentation code subscribes by these names.
pub mod event_names {
    pub const SNAPSHOT_CHANGED: &str = "snapshot:changed";
    pub const SOURCE_HEALTH_CHANGE: &str = "source:health-change";
    pub const OUTAGE_STARTED: &str = "dashboard:outage-started";
    pub const OUTAGE_CLEARED: &str = "dashboard:outage-cleared";
}

const EVENT_CAPACITY: usize = 64;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum DashboardEvent {
    SnapshotChanged { last_updated: u64 },
    SourceHealthChange(SourceHealth),
    OutageStarted { failed: Vec<String> },
    OutageCleared,
}

impl DashboardEvent {
    pub fn name(&self) -> &'static str {
        match self {
            DashboardEvent::SnapshotChanged { .. } => event_names::SNAPSHOT_CHANGED,
            DashboardEvent::SourceHealthChange(_) => event_names::SOURCE_HEALTH_CHANGE,
            DashboardEvent::OutageStarted { .. } => event_names::OUTAGE_STARTED,
            DashboardEvent::OutageCleared => event_names::OUTAGE_CLEARED,
        }
    }
}

/// Events implied by moving from `prev` to `next`, snapshot change first.
pub fn diff_events(prev: &Snapshot, next: &Snapshot) -> Vec<DashboardEvent> {
    let mut events = vec![DashboardEvent::SnapshotChanged {
        last_updated: next.last_updated,
    }];

    for (id, state) in &next.sources {
        let before = prev.sources.get(id).map(|s| s.health_status());
        let after = state.health_status();
        if before != Some(after) {
            events.push(DashboardEvent::SourceHealthChange(state.health(id)));
        }
    }

    match (prev.is_total_outage(), next.is_total_outage()) {
        (false, true) => events.push(DashboardEvent::OutageStarted {
            failed: next.sources.keys().cloned().collect(),
        }),
        (true, false) => events.push(DashboardEvent::OutageCleared),
        _ => {}
    }
    events
}

/// Fan-out of dashboard events to any number of subscribers.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<DashboardEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(EVENT_CAPACITY);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DashboardEvent> {
        self.tx.subscribe()
    }

    /// Publish an event. Having no subscribers is not an error.
    pub fn emit(&self, event: DashboardEvent) {
        let name = event.name();
        match self.tx.send(event) {
            Ok(receivers) => debug!(event = name, receivers, "Emitted dashboard event"),
            Err(_) => debug!(event = name, "No subscribers for dashboard event"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::event_names::*;
    use super::*;
    use crate::snapshot::assemble;
    use crate::types::source::{SourceHealthStatus, SourceState};
    use std::collections::BTreeMap;

    fn snapshot(entries: Vec<(&str, SourceState)>) -> Snapshot {
        let states = entries
            .into_iter()
            .map(|(id, s)| (id.to_string(), s))
            .collect();
        assemble(states, BTreeMap::new(), 1)
    }

    fn failed() -> SourceState {
        SourceState {
            error: Some("down".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn event_names_match_subscription_contract() {
        assert_eq!(SNAPSHOT_CHANGED, "snapshot:changed");
        assert_eq!(SOURCE_HEALTH_CHANGE, "source:health-change");
        assert_eq!(OUTAGE_STARTED, "dashboard:outage-started");
        assert_eq!(OUTAGE_CLEARED, "dashboard:outage-cleared");
    }

    #[test]
    fn events_serialize_with_type_tag() {
        let json = serde_json::to_value(DashboardEvent::OutageStarted {
            failed: vec!["alerts".to_string()],
        })
        .unwrap();
        assert_eq!(json["type"], "outage_started");
        assert_eq!(json["payload"]["failed"][0], "alerts");
    }

    #[test]
    fn diff_reports_health_transitions_and_outage() {
        let prev = snapshot(vec![("a", SourceState::default()), ("b", SourceState::default())]);
        let next = snapshot(vec![("a", failed()), ("b", failed())]);
        let events = diff_events(&prev, &next);

        assert_eq!(events[0].name(), SNAPSHOT_CHANGED);
        let health: Vec<_> = events
            .iter()
            .filter_map(|e| match e {
                DashboardEvent::SourceHealthChange(h) => Some(h),
                _ => None,
            })
            .collect();
        assert_eq!(health.len(), 2);
        assert!(health.iter().all(|h| h.status == SourceHealthStatus::Offline));
        assert!(matches!(events.last(), Some(DashboardEvent::OutageStarted { .. })));

        let recovered = diff_events(&next, &prev);
        assert!(recovered.contains(&DashboardEvent::OutageCleared));
    }

    #[test]
    fn unchanged_health_emits_only_snapshot_change() {
        let a = snapshot(vec![("a", failed()), ("b", SourceState::default())]);
        let b = snapshot(vec![("a", failed()), ("b", SourceState::default())]);
        let events = diff_events(&a, &b);
        assert_eq!(events.len(), 1);
    }

    #[tokio::test]
    async fn bus_delivers_to_subscribers_and_tolerates_none() {
        let bus = EventBus::new();
        bus.emit(DashboardEvent::OutageCleared);

        let mut rx = bus.subscribe();
        bus.emit(DashboardEvent::SnapshotChanged { last_updated: 3 });
        let event = rx.recv().await.unwrap();
        assert_eq!(event, DashboardEvent::SnapshotChanged { last_updated: 3 });
    }
}
