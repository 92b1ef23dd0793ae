pub mod clock;
pub mod coerce;
pub mod config;
pub mod dashboard;
pub mod derived;
pub mod envelope;
pub mod events;
pub mod http;
pub mod orchestrator;
pub mod poller;
pub mod reconcile;
pub mod snapshot;
pub mod source;
pub mod types;

#[cfg(test)]
mod test_support;

pub use config::EngineConfig;
pub use dashboard::Dashboard;
pub use snapshot::Snapshot;

use tracing_subscriber::EnvFilter;

/// Initialize structured logging with tracing.
/// Respects RUST_LOG env var; defaults to `info` level for the energywatch crate.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("energywatch=info"));

    // try_init: the host application may already own the global subscriber.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .try_init();
}
