use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::{json, Value};

use crate::source::{FetchFuture, MetricSource};

#[derive(Clone)]
struct Step {
    delay: Duration,
    result: Result<Value, String>,
    panics: bool,
}

/// In-memory source that replays a script of responses. The last step repeats forever.
pub struct ScriptedSource {
    id: String,
    steps: Mutex<VecDeque<Step>>,
    last: Mutex<Option<Step>>,
    calls: AtomicUsize,
    in_flight: Arc<AtomicUsize>,
    max_in_flight: Arc<AtomicUsize>,
}

struct InFlightGuard(Arc<AtomicUsize>);

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl ScriptedSource {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            steps: Mutex::new(VecDeque::new()),
            last: Mutex::new(None),
            calls: AtomicUsize::new(0),
            in_flight: Arc::new(AtomicUsize::new(0)),
            max_in_flight: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn ok(self, data: Value) -> Self {
        self.step(Duration::ZERO, Ok(wrap(data)))
    }

    pub fn ok_after(self, delay: Duration, data: Value) -> Self {
        self.step(delay, Ok(wrap(data)))
    }

    pub fn raw(self, body: Value) -> Self {
        self.step(Duration::ZERO, Ok(body))
    }

    pub fn fail(self, message: &str) -> Self {
        self.step(Duration::ZERO, Err(message.to_string()))
    }

    /// The fetch future panics when polled.
    pub fn panics(self) -> Self {
        self.push(Step {
            delay: Duration::ZERO,
            result: Err("unreachable".to_string()),
            panics: true,
        })
    }

    fn step(self, delay: Duration, result: Result<Value, String>) -> Self {
        self.push(Step {
            delay,
            result,
            panics: false,
        })
    }

    fn push(self, step: Step) -> Self {
        self.steps.lock().unwrap().push_back(step);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn next_step(&self) -> Step {
        let mut steps = self.steps.lock().unwrap();
        let mut last = self.last.lock().unwrap();
        if let Some(step) = steps.pop_front() {
            *last = Some(step.clone());
            return step;
        }
        last.clone().unwrap_or(Step {
            delay: Duration::ZERO,
            result: Err("no scripted response".to_string()),
            panics: false,
        })
    }
}

impl MetricSource for ScriptedSource {
    fn id(&self) -> &str {
        &self.id
    }

    fn fetch(&self) -> FetchFuture<'_> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let step = self.next_step();
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        let guard = InFlightGuard(Arc::clone(&self.in_flight));
        let id = self.id.clone();
        Box::pin(async move {
            let _guard = guard;
            if !step.delay.is_zero() {
                tokio::time::sleep(step.delay).await;
            }
            if step.panics {
                panic!("scripted source '{}' panicked", id);
            }
            step.result
        })
    }
}

pub fn wrap(data: Value) -> Value {
    json!({"success": true, "data": data})
}
