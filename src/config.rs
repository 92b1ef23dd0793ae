use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::source::source_ids;

pub const DEFAULT_API_URL: &str = "http://localhost:3000/api";
pub const DEFAULT_FETCH_TIMEOUT_MS: u64 = 10_000;

const ENV_API_URL: &str = "ENERGYWATCH_API_URL";
const ENV_API_TOKEN: &str = "ENERGYWATCH_API_TOKEN";
const ENV_FETCH_TIMEOUT: &str = "ENERGYWATCH_FETCH_TIMEOUT_MS";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceSpec {
    pub id: String,
    pub path: String,
    #[serde(default)]
    pub query: BTreeMap<String, String>,
    pub interval_ms: u64,
}

impl SourceSpec {
    fn new(id: &str, path: &str, interval_ms: u64) -> Self {
        Self {
            id: id.to_string(),
            path: path.to_string(),
            query: BTreeMap::new(),
            interval_ms,
        }
    }

    /// The dashboard's standard sources and their refresh cadence.
    pub fn defaults() -> Vec<SourceSpec> {
        let mut alerts = SourceSpec::new(source_ids::ALERTS, "/alerts", 30_000);
        alerts.query.insert("status".to_string(), "active".to_string());
        vec![
            SourceSpec::new(source_ids::OVERVIEW, "/dashboard/overview", 30_000),
            SourceSpec::new(source_ids::REALTIME, "/dashboard/real-time", 10_000),
            alerts,
            SourceSpec::new(source_ids::BUILDINGS, "/buildings", 60_000),
            SourceSpec::new(source_ids::COMPLIANCE, "/compliance/overview", 120_000),
            SourceSpec::new(source_ids::AUDITS, "/audits", 120_000),
        ]
    }

    fn interval_env_key(&self) -> String {
        format!(
            "ENERGYWATCH_{}_INTERVAL_MS",
            self.id.to_ascii_uppercase().replace('-', "_")
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineConfig {
    pub api_base_url: String,
    pub auth_token: Option<String>,
    pub fetch_timeout_ms: u64,
    pub sources: Vec<SourceSpec>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_URL.to_string(),
            auth_token: None,
            fetch_timeout_ms: DEFAULT_FETCH_TIMEOUT_MS,
            sources: SourceSpec::defaults(),
        }
    }
}

impl EngineConfig {
    /// Build from process environment variables.
    pub fn from_env() -> Result<Self, String> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from a `.env` file plus the process environment. Process variables win,
    /// matching dotenv semantics. A missing file is not an error.
    pub fn load(env_path: &Path) -> Result<Self, String> {
        let mut file_vars = HashMap::new();
        if env_path.exists() {
            let iter = dotenvy::from_path_iter(env_path)
                .map_err(|e| format!("Failed to read {}: {}", env_path.display(), e))?;
            for item in iter {
                let (key, value) = item.map_err(|e| e.to_string())?;
                file_vars.insert(key, value);
            }
            debug!(path = %env_path.display(), vars = file_vars.len(), "Loaded env file");
        }
        Self::from_lookup(|key| {
            std::env::var(key)
                .ok()
                .or_else(|| file_vars.get(key).cloned())
        })
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, String>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = EngineConfig::default();
        if let Some(url) = lookup(ENV_API_URL).filter(|v| !v.trim().is_empty()) {
            config.api_base_url = url.trim().to_string();
        }
        config.auth_token = lookup(ENV_API_TOKEN).filter(|v| !v.trim().is_empty());
        if let Some(raw) = lookup(ENV_FETCH_TIMEOUT) {
            config.fetch_timeout_ms = parse_millis(ENV_FETCH_TIMEOUT, &raw)?;
        }
        for spec in &mut config.sources {
            let key = spec.interval_env_key();
            if let Some(raw) = lookup(&key) {
                spec.interval_ms = parse_millis(&key, &raw)?;
            }
        }
        config.validate()?;
        Ok(config)
    }

    /// Deep-merge a JSON patch into this config and return the validated result.
    pub fn apply_patch(&self, patch_json: &str) -> Result<EngineConfig, String> {
        let mut current = serde_json::to_value(self).map_err(|e| e.to_string())?;
        let patch: serde_json::Value =
            serde_json::from_str(patch_json).map_err(|e| e.to_string())?;
        merge_json(&mut current, &patch);
        let merged: EngineConfig = serde_json::from_value(current).map_err(|e| e.to_string())?;
        merged.validate()?;
        Ok(merged)
    }

    pub fn validate(&self) -> Result<(), String> {
        let url = self.api_base_url.trim();
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(format!(
                "Invalid API base URL: '{}'. Must start with http:// or https://",
                self.api_base_url
            ));
        }
        if self.fetch_timeout_ms == 0 {
            return Err("fetchTimeoutMs must be greater than 0".to_string());
        }
        let mut seen = HashSet::new();
        for spec in &self.sources {
            if spec.id.trim().is_empty() {
                return Err("Source id must not be empty".to_string());
            }
            if !seen.insert(spec.id.as_str()) {
                return Err(format!("Duplicate source id: '{}'", spec.id));
            }
            if spec.interval_ms == 0 {
                return Err(format!("Source '{}' has a zero refresh interval", spec.id));
            }
        }
        Ok(())
    }
}

fn parse_millis(key: &str, raw: &str) -> Result<u64, String> {
    match raw.trim().parse::<u64>() {
        Ok(0) => Err(format!("{} must be greater than 0", key)),
        Ok(ms) => Ok(ms),
        Err(_) => Err(format!("{} must be a whole number of milliseconds, got '{}'", key, raw)),
    }
}

fn merge_json(base: &mut serde_json::Value, patch: &serde_json::Value) {
    if let (serde_json::Value::Object(base_map), serde_json::Value::Object(patch_map)) =
        (base, patch)
    {
        for (key, value) in patch_map {
            if value.is_object() && base_map.get(key).is_some_and(|v| v.is_object()) {
                if let Some(existing) = base_map.get_mut(key) {
                    merge_json(existing, value);
                }
            } else {
                base_map.insert(key.clone(), value.clone());
            }
        }
    }
}
