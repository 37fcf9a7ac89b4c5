// crates/engine/src/config.rs
//! Engine configuration: TOML file, then `GENSTREAM_*` environment overrides.

use std::path::{Path, PathBuf};
use std::time::Duration;

use genstream_core::{ChatDefaults, ReportDefaults};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

const DEFAULT_BASE_URL: &str = "http://127.0.0.1:8000";
const DEFAULT_FRAME_INTERVAL_MS: u64 = 16;
const DEFAULT_PERSIST_DELAY_MS: u64 = 350;
const DEFAULT_REPORT_CACHE_CAPACITY: usize = 20;

const ENV_REPORT_URL: &str = "GENSTREAM_REPORT_URL";
const ENV_CHAT_URL: &str = "GENSTREAM_CHAT_URL";
const ENV_FEEDBACK_URL: &str = "GENSTREAM_FEEDBACK_URL";
const ENV_DATA_DIR: &str = "GENSTREAM_DATA_DIR";
const ENV_FRAME_INTERVAL_MS: &str = "GENSTREAM_FRAME_INTERVAL_MS";
const ENV_PERSIST_DELAY_MS: &str = "GENSTREAM_PERSIST_DELAY_MS";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub report_url: String,
    pub chat_url: String,
    pub feedback_url: String,
    pub data_dir: PathBuf,
    /// Output-notification coalescing window.
    pub frame_interval_ms: u64,
    /// Durable-write debounce.
    pub persist_delay_ms: u64,
    pub report_cache_capacity: usize,
    /// Skip undecodable report frames instead of ending the stream.
    pub tolerate_malformed_report_frames: bool,
    pub report_defaults: ReportDefaults,
    pub chat_defaults: ChatDefaults,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            report_url: format!("{DEFAULT_BASE_URL}/api/bazi/report/stream"),
            chat_url: format!("{DEFAULT_BASE_URL}/api/bazi/general-chat/stream"),
            feedback_url: format!("{DEFAULT_BASE_URL}/api/bazi/feedback"),
            data_dir: default_data_dir(),
            frame_interval_ms: DEFAULT_FRAME_INTERVAL_MS,
            persist_delay_ms: DEFAULT_PERSIST_DELAY_MS,
            report_cache_capacity: DEFAULT_REPORT_CACHE_CAPACITY,
            tolerate_malformed_report_frames: false,
            report_defaults: ReportDefaults::default(),
            chat_defaults: ChatDefaults::default(),
        }
    }
}

impl EngineConfig {
    /// Load from an optional TOML file, apply environment overrides, validate.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env(|var| std::env::var(var).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Apply overrides from `lookup` (the process environment in production).
    /// Blank values are ignored.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<(), ConfigError> {
        let get = |var: &str| lookup(var).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        if let Some(v) = get(ENV_REPORT_URL) {
            self.report_url = v;
        }
        if let Some(v) = get(ENV_CHAT_URL) {
            self.chat_url = v;
        }
        if let Some(v) = get(ENV_FEEDBACK_URL) {
            self.feedback_url = v;
        }
        if let Some(v) = get(ENV_DATA_DIR) {
            self.data_dir = PathBuf::from(v);
        }
        if let Some(v) = get(ENV_FRAME_INTERVAL_MS) {
            self.frame_interval_ms = parse_env(ENV_FRAME_INTERVAL_MS, v)?;
        }
        if let Some(v) = get(ENV_PERSIST_DELAY_MS) {
            self.persist_delay_ms = parse_env(ENV_PERSIST_DELAY_MS, v)?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.frame_interval_ms == 0 {
            return Err(ConfigError::Invalid("frame_interval_ms must be non-zero".into()));
        }
        if self.persist_delay_ms == 0 {
            return Err(ConfigError::Invalid("persist_delay_ms must be non-zero".into()));
        }
        if self.report_cache_capacity == 0 {
            return Err(ConfigError::Invalid("report_cache_capacity must be non-zero".into()));
        }
        for (name, url) in [
            ("report_url", &self.report_url),
            ("chat_url", &self.chat_url),
            ("feedback_url", &self.feedback_url),
        ] {
            if reqwest::Url::parse(url).is_err() {
                return Err(ConfigError::Invalid(format!("{name} is not a valid URL: {url}")));
            }
        }
        Ok(())
    }

    pub fn frame_interval(&self) -> Duration {
        Duration::from_millis(self.frame_interval_ms)
    }

    pub fn persist_delay(&self) -> Duration {
        Duration::from_millis(self.persist_delay_ms)
    }
}

fn parse_env<T: std::str::FromStr>(var: &'static str, value: String) -> Result<T, ConfigError> {
    value.parse().map_err(|_| ConfigError::Env { var, value })
}

fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("genstream")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |k| map.get(k).cloned()
    }

    #[test]
    fn test_defaults_are_valid() {
        let config = EngineConfig::default();
        config.validate().unwrap();
        assert_eq!(config.persist_delay(), Duration::from_millis(350));
        assert_eq!(config.frame_interval(), Duration::from_millis(16));
        assert!(config.data_dir.ends_with("genstream"));
        assert!(!config.tolerate_malformed_report_frames);
    }

    #[test]
    fn test_env_overrides() {
        let mut config = EngineConfig::default();
        config
            .apply_env(env(&[
                ("GENSTREAM_CHAT_URL", "http://example.test/chat"),
                ("GENSTREAM_PERSIST_DELAY_MS", " 500 "),
                ("GENSTREAM_DATA_DIR", ""),
            ]))
            .unwrap();
        assert_eq!(config.chat_url, "http://example.test/chat");
        assert_eq!(config.persist_delay_ms, 500);
        assert_eq!(config.data_dir, EngineConfig::default().data_dir);
    }

    #[test]
    fn test_bad_env_value_rejected() {
        let mut config = EngineConfig::default();
        let err = config
            .apply_env(env(&[("GENSTREAM_FRAME_INTERVAL_MS", "fast")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Env { var: "GENSTREAM_FRAME_INTERVAL_MS", .. }));
    }

    #[test]
    fn test_validate_rejects_zero_delay() {
        let config = EngineConfig {
            persist_delay_ms: 0,
            ..EngineConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_toml_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
report_url = "http://localhost:9000/report"
report_cache_capacity = 5

[report_defaults]
tone = "neutral"
"#
        )
        .unwrap();
        let config = EngineConfig::from_file(file.path()).unwrap();
        assert_eq!(config.report_url, "http://localhost:9000/report");
        assert_eq!(config.report_cache_capacity, 5);
        assert_eq!(config.report_defaults.tone, "neutral");
        assert_eq!(config.report_defaults.language, "zh-CN");
        assert_eq!(config.chat_defaults.llm_provider, "openai");
    }

    #[test]
    fn test_malformed_toml_reports_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "report_url = ").unwrap();
        let err = EngineConfig::from_file(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }
}
