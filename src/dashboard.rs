use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::clock::now_ms;
use crate::config::EngineConfig;
use crate::events::{diff_events, DashboardEvent, EventBus};
use crate::http::{build_client, HttpSource};
use crate::orchestrator::Orchestrator;
use crate::snapshot::{Snapshot, SnapshotAssembler};
use crate::source::MetricSource;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

struct Publisher {
    orchestrator: Orchestrator,
    assembler: Mutex<SnapshotAssembler>,
    snapshots: watch::Sender<Arc<Snapshot>>,
    events: EventBus,
}

impl Publisher {
    /// Reassemble from current source states and publish if the content changed.
    fn publish(&self) -> bool {
        // Held from reading states through send so publishes never reorder.
        let mut assembler = lock(&self.assembler);
        let states = self.orchestrator.states();
        let prev = assembler.last();
        let Some(next) = assembler.next(states, now_ms()) else {
            return false;
        };
        for event in diff_events(&prev, &next) {
            self.events.emit(event);
        }
        debug!(
            last_updated = next.last_updated,
            refreshing = next.is_refreshing,
            "Published snapshot"
        );
        self.snapshots.send_replace(next);
        true
    }
}

/// Read-only facade the presentation layer mounts, reads and subscribes to.
pub struct Dashboard {
    publisher: Arc<Publisher>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl Dashboard {
    pub fn new(orchestrator: Orchestrator) -> Self {
        let (snapshots, _) = watch::channel(Arc::new(Snapshot::empty()));
        Self {
            publisher: Arc::new(Publisher {
                orchestrator,
                assembler: Mutex::new(SnapshotAssembler::new()),
                snapshots,
                events: EventBus::new(),
            }),
            task: Mutex::new(None),
        }
    }

    /// Wire one HTTP source per configured entry against a shared client.
    pub fn from_config(config: &EngineConfig) -> Result<Self, String> {
        config.validate()?;
        let client = build_client(config)?;
        let mut orchestrator = Orchestrator::new(Duration::from_millis(config.fetch_timeout_ms));
        for spec in &config.sources {
            let source = HttpSource::from_spec(client.clone(), config, spec);
            orchestrator.register_source(
                Arc::new(source) as Arc<dyn MetricSource>,
                Duration::from_millis(spec.interval_ms),
            )?;
        }
        info!(
            base_url = %config.api_base_url,
            sources = config.sources.len(),
            "Dashboard configured"
        );
        Ok(Self::new(orchestrator))
    }

    pub fn source_ids(&self) -> Vec<String> {
        self.publisher.orchestrator.source_ids()
    }

    pub fn is_mounted(&self) -> bool {
        lock(&self.task).is_some()
    }

    /// Start every poller and republish on each source state change.
    /// Must be called within a tokio runtime. Mounting twice is a no-op.
    pub fn mount(&self) {
        let mut task = lock(&self.task);
        if task.is_some() {
            return;
        }
        let publisher = Arc::clone(&self.publisher);
        let mut changes = publisher.orchestrator.subscribe_changes();
        *task = Some(tokio::spawn(async move {
            while changes.changed().await.is_ok() {
                publisher.publish();
            }
        }));
        drop(task);

        self.publisher.orchestrator.start_all();
        self.publisher.publish();
        info!("Dashboard mounted");
    }

    /// Stop every poller and the publisher task. Safe to call repeatedly.
    pub fn unmount(&self) {
        let Some(handle) = lock(&self.task).take() else {
            return;
        };
        handle.abort();
        self.publisher.orchestrator.stop_all();
        self.publisher.publish();
        info!("Dashboard unmounted");
    }

    /// The latest published snapshot.
    pub fn snapshot(&self) -> Arc<Snapshot> {
        self.publisher.snapshots.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Arc<Snapshot>> {
        self.publisher.snapshots.subscribe()
    }

    pub fn events(&self) -> broadcast::Receiver<DashboardEvent> {
        self.publisher.events.subscribe()
    }

    /// Refresh every source, then publish. Never fails.
    pub async fn refresh_all(&self) {
        self.publisher.orchestrator.refresh_all().await;
        self.publisher.publish();
    }

    pub async fn refresh_source(&self, id: &str) -> Result<(), String> {
        self.publisher.orchestrator.refresh_source(id).await?;
        self.publisher.publish();
        Ok(())
    }
}

impl Drop for Dashboard {
    fn drop(&mut self) {
        if let Some(handle) = lock(&self.task).take() {
            handle.abort();
            self.publisher.orchestrator.stop_all();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::derived::metric_names;
    use crate::snapshot::PageStatus;
    use crate::test_support::ScriptedSource;
    use crate::types::metric::{Band, Confidence};
    use serde_json::json;

    fn dashboard_with(sources: Vec<Arc<ScriptedSource>>) -> Dashboard {
        let mut orch = Orchestrator::new(Duration::from_secs(1));
        for source in sources {
            orch.register_source(source as Arc<dyn MetricSource>, Duration::from_secs(30))
                .unwrap();
        }
        Dashboard::new(orch)
    }

    fn drain(rx: &mut broadcast::Receiver<DashboardEvent>) -> Vec<DashboardEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[test]
    fn snapshot_before_any_refresh_is_empty() {
        let dash = dashboard_with(vec![]);
        let snapshot = dash.snapshot();
        assert!(snapshot.sources.is_empty());
        assert_eq!(snapshot.page_status, PageStatus::Loading);
        assert!(!dash.is_mounted());
    }

    #[tokio::test]
    async fn alerts_network_error_leaves_the_rest_of_the_page_working() {
        let alerts = Arc::new(ScriptedSource::new("alerts").fail("network error"));
        let overview = Arc::new(
            ScriptedSource::new("overview").ok(json!({"system_health": {"overall_score": 92.5}})),
        );
        let dash = dashboard_with(vec![alerts, overview]);

        dash.refresh_all().await;
        let snapshot = dash.snapshot();

        let alerts = snapshot.source("alerts").unwrap();
        assert_eq!(alerts.error.as_deref(), Some("network error"));
        assert!(!alerts.loading);
        assert!(!snapshot.is_total_outage());
        assert_eq!(
            snapshot.page_status,
            PageStatus::PartialOutage {
                failed: vec!["alerts".to_string()]
            }
        );

        let health = snapshot.metric(metric_names::HEALTH_SCORE).unwrap();
        assert_eq!(health.value, 92.5);
        assert_eq!(health.band, Some(Band::Success));
        let active = snapshot.metric(metric_names::ACTIVE_ALERTS).unwrap();
        assert_eq!(active.confidence, Confidence::Default);
        assert_eq!(active.value, 0.0);
    }

    #[tokio::test]
    async fn refresh_all_is_idempotent_for_unchanged_data() {
        let overview = Arc::new(ScriptedSource::new("overview").ok(json!({"x": 1})));
        let dash = dashboard_with(vec![overview.clone()]);
        let mut rx = dash.subscribe();

        dash.refresh_all().await;
        assert!(rx.has_changed().unwrap());
        let first = rx.borrow_and_update().clone();

        dash.refresh_all().await;
        assert_eq!(overview.calls(), 2);
        assert!(!rx.has_changed().unwrap());
        assert!(Arc::ptr_eq(&first, &dash.snapshot()));
    }

    #[tokio::test]
    async fn total_outage_is_announced_once() {
        let a = Arc::new(ScriptedSource::new("a").fail("down"));
        let b = Arc::new(ScriptedSource::new("b").fail("down"));
        let dash = dashboard_with(vec![a, b]);
        let mut events = dash.events();

        dash.refresh_all().await;
        assert!(dash.snapshot().is_total_outage());
        let first = drain(&mut events);
        assert!(first
            .iter()
            .any(|e| matches!(e, DashboardEvent::OutageStarted { .. })));
        assert_eq!(
            first
                .iter()
                .filter(|e| matches!(e, DashboardEvent::SourceHealthChange(_)))
                .count(),
            2
        );

        // Failure count moves, so the snapshot changes, but health and outage do not.
        dash.refresh_all().await;
        let second = drain(&mut events);
        assert_eq!(second.len(), 1);
        assert!(matches!(second[0], DashboardEvent::SnapshotChanged { .. }));
    }

    #[tokio::test]
    async fn unknown_source_refresh_is_an_error() {
        let dash = dashboard_with(vec![Arc::new(ScriptedSource::new("overview").ok(json!({})))]);
        let err = dash.refresh_source("weather").await.unwrap_err();
        assert!(err.contains("weather"));
    }

    #[tokio::test]
    async fn refresh_source_publishes_that_source() {
        let overview = Arc::new(ScriptedSource::new("overview").ok(json!({"x": 1})));
        let alerts = Arc::new(ScriptedSource::new("alerts").ok(json!([])));
        let dash = dashboard_with(vec![overview, alerts.clone()]);

        dash.refresh_source("overview").await.unwrap();
        let snapshot = dash.snapshot();
        assert!(snapshot.source("overview").unwrap().data.is_some());
        assert!(snapshot.source("alerts").unwrap().data.is_none());
        assert_eq!(alerts.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn mounted_dashboard_publishes_polled_data() {
        let overview = Arc::new(ScriptedSource::new("overview").ok(json!({"x": 1})));
        let dash = dashboard_with(vec![overview.clone()]);
        let mut rx = dash.subscribe();

        dash.mount();
        dash.mount();
        assert!(dash.is_mounted());

        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                rx.changed().await.unwrap();
                let snapshot = rx.borrow_and_update().clone();
                if snapshot
                    .source("overview")
                    .is_some_and(|s| s.data.is_some() && !s.loading)
                {
                    break;
                }
            }
        })
        .await
        .unwrap();
        assert!(!dash.snapshot().is_refreshing);

        dash.unmount();
        dash.unmount();
        assert!(!dash.is_mounted());
        let calls = overview.calls();
        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(overview.calls(), calls);
    }

    #[test]
    fn from_config_registers_every_configured_source() {
        let dash = Dashboard::from_config(&EngineConfig::default()).unwrap();
        assert_eq!(
            dash.source_ids(),
            vec!["alerts", "audits", "buildings", "compliance", "overview", "realtime"]
        );
    }
}
