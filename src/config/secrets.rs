// src/config/secrets.rs
//! Ordered secret lookup.
//!
//! Sources are consulted front to back: the hosted platform's secret store
//! (Shuttle) first, then the process environment (populated from `.env` by
//! `dotenvy` at startup). A blank value counts as absent.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;

use crate::error::{PipelineError, Result};

pub const GNEWS_API_KEY: &str = "API_KEY";
pub const OPENAI_API_KEY: &str = "OPENAI_API_KEY";
pub const GOOGLE_APPLICATION_CREDENTIALS: &str = "GOOGLE_APPLICATION_CREDENTIALS";
pub const GCP_PROJECT_ID: &str = "GCP_PROJECT_ID";
pub const DATASET_ID: &str = "DATASET_ID";
pub const TABLE_ID: &str = "TABLE_ID";

/// One place secrets can come from.
pub trait SecretSource: Send + Sync {
    fn name(&self) -> &'static str;
    fn lookup(&self, key: &str) -> Option<String>;
}

/// Process environment.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnvSecrets;

impl SecretSource for EnvSecrets {
    fn name(&self) -> &'static str {
        "env"
    }

    fn lookup(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}

/// Fixed key/value map. Used by tests and by callers that already hold the values.
#[derive(Debug, Clone, Default)]
pub struct MapSecrets(HashMap<String, String>);

impl MapSecrets {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: &str, value: &str) -> Self {
        self.0.insert(key.to_string(), value.to_string());
        self
    }
}

impl SecretSource for MapSecrets {
    fn name(&self) -> &'static str {
        "map"
    }

    fn lookup(&self, key: &str) -> Option<String> {
        self.0.get(key).cloned()
    }
}

impl SecretSource for shuttle_runtime::SecretStore {
    fn name(&self) -> &'static str {
        "shuttle"
    }

    fn lookup(&self, key: &str) -> Option<String> {
        self.get(key)
    }
}

/// Which optional features have the secrets they need.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct Capabilities {
    pub has_fetch: bool,
    pub has_llm: bool,
    pub has_warehouse: bool,
}

#[derive(Clone)]
pub struct SecretResolver {
    sources: Vec<Arc<dyn SecretSource>>,
}

impl std::fmt::Debug for SecretResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self.sources.iter().map(|s| s.name()).collect();
        f.debug_struct("SecretResolver").field("sources", &names).finish()
    }
}

impl SecretResolver {
    pub fn new(sources: Vec<Arc<dyn SecretSource>>) -> Self {
        Self { sources }
    }

    /// Environment only (CLI, local dashboard runs).
    pub fn from_env() -> Self {
        Self::new(vec![Arc::new(EnvSecrets)])
    }

    /// Hosted store first, environment as fallback.
    pub fn with_hosted<S: SecretSource + 'static>(hosted: S) -> Self {
        Self::new(vec![Arc::new(hosted), Arc::new(EnvSecrets)])
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.sources.iter().find_map(|src| {
            src.lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        })
    }

    /// Like [`get`](Self::get) but absence is a `ConfigMissing` error.
    pub fn require(&self, key: &str) -> Result<String> {
        self.get(key)
            .ok_or_else(|| PipelineError::ConfigMissing(key.to_string()))
    }

    pub fn has(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn capabilities(&self) -> Capabilities {
        Capabilities {
            has_fetch: self.has(GNEWS_API_KEY),
            has_llm: self.has(OPENAI_API_KEY),
            has_warehouse: self.has(GOOGLE_APPLICATION_CREDENTIALS) && self.has(GCP_PROJECT_ID),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolver(first: MapSecrets, second: MapSecrets) -> SecretResolver {
        SecretResolver::new(vec![Arc::new(first), Arc::new(second)])
    }

    #[test]
    fn earlier_source_wins() {
        let r = resolver(
            MapSecrets::new().with("API_KEY", "hosted"),
            MapSecrets::new().with("API_KEY", "local"),
        );
        assert_eq!(r.get("API_KEY").as_deref(), Some("hosted"));
    }

    #[test]
    fn blank_values_fall_through() {
        let r = resolver(
            MapSecrets::new().with("API_KEY", "   "),
            MapSecrets::new().with("API_KEY", "local"),
        );
        assert_eq!(r.get("API_KEY").as_deref(), Some("local"));
    }

    #[test]
    fn missing_key_is_none_and_require_reports_config_missing() {
        let r = resolver(MapSecrets::new(), MapSecrets::new());
        assert!(r.get("OPENAI_API_KEY").is_none());
        let err = r.require("OPENAI_API_KEY").unwrap_err();
        assert!(matches!(err, PipelineError::ConfigMissing(ref k) if k == "OPENAI_API_KEY"));
    }

    #[test]
    fn capabilities_follow_secrets() {
        let r = SecretResolver::new(vec![Arc::new(
            MapSecrets::new()
                .with(GNEWS_API_KEY, "k")
                .with(GOOGLE_APPLICATION_CREDENTIALS, "/tmp/key.json"),
        )]);
        let caps = r.capabilities();
        assert!(caps.has_fetch);
        assert!(!caps.has_llm);
        // project id is missing
        assert!(!caps.has_warehouse);
    }
}
