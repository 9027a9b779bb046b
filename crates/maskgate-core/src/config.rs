//! Configuration resolution for maskgate.
//!
//! Implements hierarchical config resolution:
//! 1. Built-in defaults
//! 2. Global config (~/.config/maskgate/settings.json)
//! 3. Project config (.maskgate/settings.json)
//! 4. Environment variables
//! 5. CLI arguments (highest priority, applied by the caller)

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Complete maskgate configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub evaluator: EvaluatorConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Free-form parameters handed to definition factories.
    #[serde(default)]
    pub params: ConfigParams,
}

/// Evaluation and compilation behaviour.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EvaluatorConfig {
    /// Resolve unknown permissions to denied instead of failing.
    pub allow_unknown: bool,
    /// Upper bound on analysis passes during role compilation.
    pub max_analysis_passes: u32,
}

impl Default for EvaluatorConfig {
    fn default() -> Self {
        Self {
            allow_unknown: false,
            max_analysis_passes: 2,
        }
    }
}

/// Logging output.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

/// Read-only key/value parameters.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(transparent)]
pub struct ConfigParams(serde_json::Map<String, serde_json::Value>);

impl ConfigParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.0.get(key)
    }

    /// Interpret a parameter as a flag. Missing keys are `false`; numbers and
    /// strings follow the usual truthiness rules.
    pub fn flag(&self, key: &str) -> bool {
        match self.0.get(key) {
            Some(serde_json::Value::Bool(b)) => *b,
            Some(serde_json::Value::Number(n)) => n.as_f64().is_some_and(|v| v != 0.0),
            Some(serde_json::Value::String(s)) => !(s.is_empty() || s == "0" || s == "false"),
            Some(serde_json::Value::Array(a)) => !a.is_empty(),
            Some(serde_json::Value::Object(o)) => !o.is_empty(),
            Some(serde_json::Value::Null) | None => false,
        }
    }

    /// Set a parameter.
    #[must_use]
    pub fn with(mut self, key: &str, value: serde_json::Value) -> Self {
        self.0.insert(key.to_string(), value);
        self
    }

    fn extend(&mut self, other: Self) {
        self.0.extend(other.0);
    }
}

/// Load configuration with hierarchical resolution.
pub fn load_config(project_dir: Option<&Path>) -> Result<Config> {
    let mut config = Config::default();

    // Load global config
    if let Some(global_path) = global_config_path()
        && global_path.exists()
    {
        let global = load_config_file(&global_path)?;
        merge_config(&mut config, global);
    }

    // Load project config
    if let Some(dir) = project_dir {
        let project_path = dir.join(".maskgate").join("settings.json");
        if project_path.exists() {
            let project = load_config_file(&project_path)?;
            merge_config(&mut config, project);
        }
    }

    apply_env_overrides(&mut config);

    Ok(config)
}

/// Get the global config file path.
pub fn global_config_path() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .ok()
            .map(|h| PathBuf::from(h).join(".maskgate").join("settings.json"))
    }
    #[cfg(target_os = "macos")]
    {
        std::env::var("HOME")
            .ok()
            .map(|h| PathBuf::from(h).join("Library/Application Support/maskgate/settings.json"))
    }
    #[cfg(target_os = "linux")]
    {
        std::env::var("XDG_CONFIG_HOME")
            .ok()
            .map(PathBuf::from)
            .or_else(|| std::env::var("HOME").ok().map(|h| PathBuf::from(h).join(".config")))
            .map(|p| p.join("maskgate").join("settings.json"))
    }
    #[cfg(not(any(target_os = "windows", target_os = "macos", target_os = "linux")))]
    {
        None
    }
}

/// Read a single settings file.
pub fn load_config_file(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::Config(format!("Failed to read config file {}: {}", path.display(), e))
    })?;
    serde_json::from_str(&content).map_err(|e| {
        Error::Config(format!("Failed to parse config file {}: {}", path.display(), e))
    })
}

fn merge_config(base: &mut Config, overlay: Config) {
    base.evaluator = overlay.evaluator;
    base.logging = overlay.logging;
    base.params.extend(overlay.params);
}

fn apply_env_overrides(config: &mut Config) {
    if let Ok(val) = std::env::var("MASKGATE_ALLOW_UNKNOWN")
        && let Ok(b) = val.parse()
    {
        config.evaluator.allow_unknown = b;
    }
    if let Ok(val) = std::env::var("MASKGATE_MAX_PASSES")
        && let Ok(n) = val.parse()
    {
        config.evaluator.max_analysis_passes = n;
    }
    if let Ok(val) = std::env::var("MASKGATE_LOG_LEVEL") {
        config.logging.level = val;
    }
    if let Ok(val) = std::env::var("MASKGATE_LOG_JSON")
        && let Ok(b) = val.parse()
    {
        config.logging.json = b;
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn default_config_runs_two_passes() {
        let config = Config::default();
        assert_eq!(config.evaluator.max_analysis_passes, 2);
        assert!(!config.evaluator.allow_unknown);
    }

    #[test]
    fn project_settings_override_defaults() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join(".maskgate")).unwrap();
        std::fs::write(
            dir.path().join(".maskgate").join("settings.json"),
            r#"{"evaluator": {"allow_unknown": true}, "params": {"api_enabled": 1}}"#,
        )
        .unwrap();

        let config = load_config_file(&dir.path().join(".maskgate/settings.json")).unwrap();
        assert!(config.evaluator.allow_unknown);
        assert_eq!(config.evaluator.max_analysis_passes, 2);
        assert!(config.params.flag("api_enabled"));
    }

    #[test]
    fn malformed_settings_are_config_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "{ not json").unwrap();
        let err = load_config_file(&path).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn params_flag_truthiness() {
        let params = ConfigParams::new()
            .with("on", serde_json::json!(true))
            .with("zero", serde_json::json!(0))
            .with("word", serde_json::json!("false"))
            .with("name", serde_json::json!("yes"));
        assert!(params.flag("on"));
        assert!(!params.flag("zero"));
        assert!(!params.flag("word"));
        assert!(params.flag("name"));
        assert!(!params.flag("missing"));
    }
}
