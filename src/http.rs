use std::time::Duration;

use serde_json::Value;
use tracing::debug;

use crate::config::{EngineConfig, SourceSpec};
use crate::source::{FetchFuture, MetricSource};

const USER_AGENT: &str = concat!("energywatch/", env!("CARGO_PKG_VERSION"));

/// Build the client shared by every HTTP source.
pub fn build_client(config: &EngineConfig) -> Result<reqwest::Client, String> {
    reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .connect_timeout(Duration::from_millis(config.fetch_timeout_ms))
        .build()
        .map_err(|e| format!("Failed to build HTTP client: {}", e))
}

/// A source backed by one REST GET against the dashboard backend.
pub struct HttpSource {
    id: String,
    client: reqwest::Client,
    path: String,
    url: String,
    query: Vec<(String, String)>,
    token: Option<String>,
}

impl HttpSource {
    pub fn from_spec(client: reqwest::Client, config: &EngineConfig, spec: &SourceSpec) -> Self {
        Self {
            id: spec.id.clone(),
            client,
            path: spec.path.clone(),
            url: join_url(&config.api_base_url, &spec.path),
            query: spec
                .query
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            token: config.auth_token.clone(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn query(&self) -> &[(String, String)] {
        &self.query
    }

    async fn get_json(&self) -> Result<Value, String> {
        let mut request = self.client.get(&self.url);
        if !self.query.is_empty() {
            request = request.query(&self.query);
        }
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| format!("Failed to fetch {}: {}", self.path, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(format!("HTTP {} from {}", status, self.path));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| format!("Invalid JSON from {}: {}", self.path, e))?;
        debug!(source = %self.id, url = %self.url, "Fetched source payload");
        Ok(body)
    }
}

impl MetricSource for HttpSource {
    fn id(&self) -> &str {
        &self.id
    }

    fn fetch(&self) -> FetchFuture<'_> {
        Box::pin(self.get_json())
    }
}

fn join_url(base: &str, path: &str) -> String {
    let base = base.trim_end_matches('/');
    let path = path.trim_start_matches('/');
    if path.is_empty() {
        base.to_string()
    } else {
        format!("{}/{}", base, path)
    }
}
