use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::poller::SourcePoller;
use crate::source::MetricSource;
use crate::types::source::SourceState;

/// Owns every source poller, keyed by source id.
pub struct Orchestrator {
    pollers: BTreeMap<String, SourcePoller>,
    fetch_timeout: Duration,
    changes: Arc<watch::Sender<u64>>,
}

impl Orchestrator {
    pub fn new(fetch_timeout: Duration) -> Self {
        let (changes, _) = watch::channel(0);
        Self {
            pollers: BTreeMap::new(),
            fetch_timeout,
            changes: Arc::new(changes),
        }
    }

    pub fn register_source(
        &mut self,
        source: Arc<dyn MetricSource>,
        interval: Duration,
    ) -> Result<(), String> {
        let id = source.id().to_string();
        if self.pollers.contains_key(&id) {
            return Err(format!("Source '{}' is already registered", id));
        }
        let poller = SourcePoller::new(source, interval, self.fetch_timeout, Arc::clone(&self.changes));
        self.pollers.insert(id.clone(), poller);
        debug!(source = %id, interval_ms = interval.as_millis() as u64, "Registered source");
        Ok(())
    }

    pub fn source_ids(&self) -> Vec<String> {
        self.pollers.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.pollers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pollers.is_empty()
    }

    pub fn start_all(&self) {
        for poller in self.pollers.values() {
            poller.start();
        }
        info!(sources = self.pollers.len(), "Started all sources");
    }

    pub fn stop_all(&self) {
        for poller in self.pollers.values() {
            poller.stop();
        }
        info!(sources = self.pollers.len(), "Stopped all sources");
    }

    /// Refresh every source and wait until all of them have settled.
    /// Never fails: per-source failures land in each source's state.
    pub async fn refresh_all(&self) {
        let tickets: Vec<(&SourcePoller, u64)> = self
            .pollers
            .values()
            .map(|poller| (poller, poller.dispatch_now()))
            .collect();
        for (poller, seq) in tickets {
            poller.wait_settled(seq).await;
        }
        let failed = self.failed_sources();
        if failed.is_empty() {
            debug!("Refresh-all settled cleanly");
        } else {
            warn!(failed = ?failed, "Refresh-all settled with failing sources");
        }
    }

    pub async fn refresh_source(&self, id: &str) -> Result<(), String> {
        let poller = self
            .pollers
            .get(id)
            .ok_or_else(|| format!("Unknown source: '{}'", id))?;
        poller.refresh_now().await;
        Ok(())
    }

    pub fn state(&self, id: &str) -> Option<SourceState> {
        self.pollers.get(id).map(SourcePoller::state)
    }

    /// Point-in-time copy of every source's state. Each state is read under its own lock.
    pub fn states(&self) -> BTreeMap<String, SourceState> {
        self.pollers
            .iter()
            .map(|(id, poller)| (id.clone(), poller.state()))
            .collect()
    }

    pub fn is_any_source_loading(&self) -> bool {
        self.pollers.values().any(|p| p.state().loading)
    }

    /// True only when at least one source is registered and every one of them is erroring.
    pub fn have_all_sources_failed(&self) -> bool {
        !self.pollers.is_empty() && self.pollers.values().all(|p| p.state().has_failed())
    }

    pub fn failed_sources(&self) -> Vec<String> {
        self.pollers
            .iter()
            .filter(|(_, p)| p.state().has_failed())
            .map(|(id, _)| id.clone())
            .collect()
    }

    /// Watch a counter that increments whenever any source state changes.
    pub fn subscribe_changes(&self) -> watch::Receiver<u64> {
        self.changes.subscribe()
    }
}
