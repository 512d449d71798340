// src/config/settings.rs
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::{env, fs};

pub const DEFAULT_SETTINGS_PATH: &str = "config/dashboard.toml";
pub const ENV_SETTINGS_PATH: &str = "DASHBOARD_CONFIG_PATH";

pub const DEFAULT_GNEWS_BASE_URL: &str = "https://gnews.io/api/v4";
pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}
fn default_gnews_base_url() -> String {
    DEFAULT_GNEWS_BASE_URL.to_string()
}
fn default_fetch_timeout_secs() -> u64 {
    15
}
fn default_openai_base_url() -> String {
    DEFAULT_OPENAI_BASE_URL.to_string()
}
fn default_llm_model() -> String {
    "gpt-3.5-turbo".to_string()
}
fn default_llm_timeout_secs() -> u64 {
    20
}
fn default_llm_max_input_chars() -> usize {
    500
}
fn default_warehouse_location() -> String {
    "asia-south1".to_string()
}
fn default_max_items() -> usize {
    50
}

/// Non-secret tunables. Every field has a default so a missing or partial
/// `config/dashboard.toml` is fine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Directory holding the CSV files the dashboard can browse.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    #[serde(default = "default_gnews_base_url")]
    pub gnews_base_url: String,
    #[serde(default = "default_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,
    #[serde(default = "default_openai_base_url")]
    pub openai_base_url: String,
    #[serde(default = "default_llm_model")]
    pub llm_model: String,
    #[serde(default = "default_llm_timeout_secs")]
    pub llm_timeout_secs: u64,
    /// Prefix of the article text sent to the LLM (characters).
    #[serde(default = "default_llm_max_input_chars")]
    pub llm_max_input_chars: usize,
    /// Custom weights for the local model; the bundled model is used when absent.
    #[serde(default)]
    pub model_path: Option<PathBuf>,
    /// Region used when a warehouse dataset has to be created.
    #[serde(default = "default_warehouse_location")]
    pub warehouse_location: String,
    #[serde(default = "default_max_items")]
    pub default_max_items: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            gnews_base_url: default_gnews_base_url(),
            fetch_timeout_secs: default_fetch_timeout_secs(),
            openai_base_url: default_openai_base_url(),
            llm_model: default_llm_model(),
            llm_timeout_secs: default_llm_timeout_secs(),
            llm_max_input_chars: default_llm_max_input_chars(),
            model_path: None,
            warehouse_location: default_warehouse_location(),
            default_max_items: default_max_items(),
        }
    }
}

impl Settings {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let data = fs::read_to_string(path)
            .with_context(|| format!("reading settings from {}", path.display()))?;
        let cfg: Settings = toml::from_str(&data)
            .with_context(|| format!("parsing settings in {}", path.display()))?;
        Ok(cfg.sanitized())
    }

    /// Load using env var + fallbacks:
    /// 1) $DASHBOARD_CONFIG_PATH (must exist)
    /// 2) config/dashboard.toml
    /// 3) built-in defaults
    ///
    /// Env overrides (`DATA_DIR`, `GNEWS_BASE_URL`, `OPENAI_BASE_URL`, `LLM_MODEL`)
    /// are applied last.
    pub fn load_default() -> anyhow::Result<Self> {
        let base = match env::var(ENV_SETTINGS_PATH) {
            Ok(p) => {
                let pb = PathBuf::from(p);
                if !pb.exists() {
                    anyhow::bail!("{ENV_SETTINGS_PATH} points to non-existent path");
                }
                Self::load_from_file(&pb)?
            }
            Err(_) => {
                let p = PathBuf::from(DEFAULT_SETTINGS_PATH);
                if p.exists() {
                    Self::load_from_file(&p)?
                } else {
                    Self::default()
                }
            }
        };
        Ok(base.with_env_overrides())
    }

    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(v) = env::var("DATA_DIR") {
            self.data_dir = PathBuf::from(v);
        }
        if let Ok(v) = env::var("GNEWS_BASE_URL") {
            self.gnews_base_url = v;
        }
        if let Ok(v) = env::var("OPENAI_BASE_URL") {
            self.openai_base_url = v;
        }
        if let Ok(v) = env::var("LLM_MODEL") {
            self.llm_model = v;
        }
        self.sanitized()
    }

    fn sanitized(mut self) -> Self {
        if self.fetch_timeout_secs == 0 {
            self.fetch_timeout_secs = default_fetch_timeout_secs();
        }
        if self.llm_timeout_secs == 0 {
            self.llm_timeout_secs = default_llm_timeout_secs();
        }
        if self.llm_max_input_chars == 0 {
            self.llm_max_input_chars = default_llm_max_input_chars();
        }
        if self.default_max_items == 0 {
            self.default_max_items = default_max_items();
        }
        self.gnews_base_url = self.gnews_base_url.trim_end_matches('/').to_string();
        self.openai_base_url = self.openai_base_url.trim_end_matches('/').to_string();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("dashboard.toml");
        fs::write(
            &p,
            r#"
data_dir = "/srv/news"
llm_timeout_secs = 0
gnews_base_url = "http://127.0.0.1:9000/api/v4/"
"#,
        )
        .unwrap();

        let s = Settings::load_from_file(&p).unwrap();
        assert_eq!(s.data_dir, PathBuf::from("/srv/news"));
        assert_eq!(s.gnews_base_url, "http://127.0.0.1:9000/api/v4");
        // zero is replaced by the default
        assert_eq!(s.llm_timeout_secs, 20);
        assert_eq!(s.llm_max_input_chars, 500);
        assert_eq!(s.warehouse_location, "asia-south1");
    }

    #[test]
    fn broken_toml_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("dashboard.toml");
        fs::write(&p, "data_dir = [").unwrap();
        assert!(Settings::load_from_file(&p).is_err());
    }
}
