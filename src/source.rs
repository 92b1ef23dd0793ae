use std::future::Future;
use std::pin::Pin;

use serde_json::Value;

pub type FetchFuture<'a> = Pin<Box<dyn Future<Output = Result<Value, String>> + Send + 'a>>;

/// One logical data feed. `fetch` is the only place in the engine allowed to fail;
/// the poller owning the source catches everything it returns.
pub trait MetricSource: Send + Sync {
    fn id(&self) -> &str;

    /// Fetch the raw, still-enveloped response body.
    fn fetch(&self) -> FetchFuture<'_>;
}

/// Source ids of the standard dashboard catalog.
pub mod source_ids {
    pub const OVERVIEW: &str = "overview";
    pub const REALTIME: &str = "realtime";
    pub const ALERTS: &str = "alerts";
    pub const BUILDINGS: &str = "buildings";
    pub const COMPLIANCE: &str = "compliance";
    pub const AUDITS: &str = "audits";
}
