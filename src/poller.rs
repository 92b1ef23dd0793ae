use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::clock::now_ms;
use crate::envelope;
use crate::source::MetricSource;
use crate::types::payload::Payload;
use crate::types::source::SourceState;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

#[derive(Debug, Default)]
struct Flight {
    /// Sequence number of the fetch currently in flight, if any.
    current: Option<u64>,
    issued: u64,
    /// Bumped by `stop()`. A fetch only applies if the epoch it was issued under is still current.
    epoch: u64,
}

struct Shared {
    id: String,
    flight: Mutex<Flight>,
    state: Mutex<SourceState>,
    settled: watch::Sender<u64>,
    changes: Arc<watch::Sender<u64>>,
}

impl Shared {
    fn notify_changed(&self) {
        self.changes.send_modify(|version| *version = version.wrapping_add(1));
    }

    fn settle(&self, seq: u64, epoch: u64, outcome: Result<Payload, String>, latency: Duration) {
        let applied = {
            let mut flight = lock(&self.flight);
            if flight.current == Some(seq) {
                flight.current = None;
            }
            if flight.epoch == epoch {
                let now = now_ms();
                let mut state = lock(&self.state);
                state.loading = false;
                state.last_latency_ms = Some(latency.as_millis() as u64);
                match outcome {
                    Ok(payload) => {
                        state.data = Some(payload);
                        state.error = None;
                        state.updated_at = Some(now);
                        state.last_success_at = Some(now);
                        state.consecutive_failures = 0;
                        debug!(source = %self.id, seq, latency_ms = latency.as_millis() as u64, "Source fetch succeeded");
                    }
                    Err(message) => {
                        warn!(source = %self.id, seq, error = %message, "Source fetch failed");
                        state.error = Some(message);
                        state.last_failure_at = Some(now);
                        state.consecutive_failures = state.consecutive_failures.saturating_add(1);
                    }
                }
                true
            } else {
                debug!(source = %self.id, seq, "Dropping result that arrived after stop");
                false
            }
        };
        if applied {
            self.notify_changed();
        }
        self.settled.send_modify(|done| *done = (*done).max(seq));
    }
}

/// Polls one source on a fixed interval and on demand.
///
/// At most one fetch is in flight per source; concurrent refresh requests join it.
/// Failures are recorded in the state and never surface to the caller.
pub struct SourcePoller {
    source: Arc<dyn MetricSource>,
    interval: Duration,
    timeout: Duration,
    shared: Arc<Shared>,
    timer: Mutex<Option<JoinHandle<()>>>,
}

impl SourcePoller {
    pub fn new(
        source: Arc<dyn MetricSource>,
        interval: Duration,
        timeout: Duration,
        changes: Arc<watch::Sender<u64>>,
    ) -> Self {
        let (settled, _) = watch::channel(0);
        let shared = Arc::new(Shared {
            id: source.id().to_string(),
            flight: Mutex::new(Flight::default()),
            state: Mutex::new(SourceState::default()),
            settled,
            changes,
        });
        Self {
            source,
            interval: interval.max(Duration::from_millis(1)),
            timeout: timeout.max(Duration::from_millis(1)),
            shared,
            timer: Mutex::new(None),
        }
    }

    pub fn id(&self) -> &str {
        &self.shared.id
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn state(&self) -> SourceState {
        lock(&self.shared.state).clone()
    }

    pub fn is_running(&self) -> bool {
        lock(&self.timer)
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Fetch now and keep fetching every `interval`, whatever each fetch's outcome.
    /// Must be called from within a tokio runtime. Calling it on a running poller does nothing.
    pub fn start(&self) {
        let mut timer = lock(&self.timer);
        if timer.as_ref().is_some_and(|handle| !handle.is_finished()) {
            return;
        }

        dispatch(&self.shared, &self.source, self.timeout);

        let shared = Arc::clone(&self.shared);
        let source = Arc::clone(&self.source);
        let interval = self.interval;
        let timeout = self.timeout;
        *timer = Some(tokio::spawn(async move {
            let first = tokio::time::Instant::now() + interval;
            let mut ticker = tokio::time::interval_at(first, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                dispatch(&shared, &source, timeout);
            }
        }));
        info!(source = %self.shared.id, interval_ms = interval.as_millis() as u64, "Poller started");
    }

    /// Cancel the timer. Results of fetches still in flight are discarded. Idempotent.
    pub fn stop(&self) {
        if let Some(handle) = lock(&self.timer).take() {
            handle.abort();
            info!(source = %self.shared.id, "Poller stopped");
        }
        let was_loading = {
            let mut flight = lock(&self.shared.flight);
            flight.epoch += 1;
            flight.current = None;
            let mut state = lock(&self.shared.state);
            std::mem::replace(&mut state.loading, false)
        };
        if was_loading {
            self.shared.notify_changed();
        }
    }

    /// Issue a fetch unless one is already in flight. Returns the sequence number to wait on.
    pub fn dispatch_now(&self) -> u64 {
        dispatch(&self.shared, &self.source, self.timeout)
    }

    /// Resolve once the fetch numbered `seq` (or a later one) has settled.
    pub async fn wait_settled(&self, seq: u64) {
        let mut settled = self.shared.settled.subscribe();
        // The sender lives in `shared`, which `self` keeps alive.
        let _ = settled.wait_for(|done| *done >= seq).await;
    }

    /// Out-of-band refresh that leaves the timer alone. Never fails; see `state()` for the outcome.
    pub async fn refresh_now(&self) {
        let seq = self.dispatch_now();
        self.wait_settled(seq).await;
    }
}

impl Drop for SourcePoller {
    fn drop(&mut self) {
        if let Some(handle) = lock(&self.timer).take() {
            handle.abort();
        }
    }
}

fn dispatch(shared: &Arc<Shared>, source: &Arc<dyn MetricSource>, timeout: Duration) -> u64 {
    let (seq, epoch) = {
        let mut flight = lock(&shared.flight);
        if let Some(seq) = flight.current {
            debug!(source = %shared.id, seq, "Joining in-flight fetch");
            return seq;
        }
        flight.issued += 1;
        let seq = flight.issued;
        flight.current = Some(seq);
        lock(&shared.state).loading = true;
        (seq, flight.epoch)
    };
    shared.notify_changed();

    let shared = Arc::clone(shared);
    let source = Arc::clone(source);
    tokio::spawn(async move {
        let started = Instant::now();
        // The fetch runs on its own task so a panicking source still settles `seq`.
        let fetch = tokio::spawn(async move { tokio::time::timeout(timeout, source.fetch()).await });
        let outcome = match fetch.await {
            Ok(Ok(Ok(raw))) => envelope::normalize(raw),
            Ok(Ok(Err(e))) => Err(e),
            Ok(Err(_)) => Err(format!("request timed out after {}ms", timeout.as_millis())),
            Err(e) if e.is_panic() => Err("fetch task panicked".to_string()),
            Err(e) => Err(format!("fetch task failed: {}", e)),
        };
        shared.settle(seq, epoch, outcome, started.elapsed());
    });
    seq
}
