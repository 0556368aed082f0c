//! Platform configuration with TOML file support.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use agora_types::{ModuleId, PlatformParams, UserId};
use agora_utils::LogFormat;

use crate::NodeError;

/// Configuration of an Agora platform instance.
///
/// Can be loaded from a TOML file via [`PlatformConfig::from_toml_file`] or
/// built programmatically (e.g. for tests).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PlatformConfig {
    /// Data directory for the LMDB environment.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// LMDB map size in MiB.
    #[serde(default = "default_map_size_mb")]
    pub lmdb_map_size_mb: usize,

    /// Log format: "human" or "json".
    #[serde(default)]
    pub log_format: LogFormat,

    /// Log level filter, e.g. "info" or "debug,agora_review=trace".
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Seconds between posting scheduler passes.
    #[serde(default = "default_scheduler_tick_secs")]
    pub scheduler_tick_secs: u64,

    /// Whether to collect Prometheus metrics.
    #[serde(default)]
    pub enable_metrics: bool,

    /// Modules whose finalization settles an escrow hold, mapped to the
    /// account that receives released funds.
    #[serde(default)]
    pub escrow_modules: BTreeMap<String, String>,

    /// Engine parameters.
    #[serde(default)]
    pub params: PlatformParams,
}

// ── Serde default helpers ──────────────────────────────────────────────

fn default_data_dir() -> PathBuf {
    PathBuf::from("./agora_data")
}

fn default_map_size_mb() -> usize {
    1024
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_scheduler_tick_secs() -> u64 {
    60
}

// ── Impl ───────────────────────────────────────────────────────────────

impl PlatformConfig {
    /// Load configuration from a TOML file.
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, NodeError> {
        let content =
            std::fs::read_to_string(path).map_err(|e| NodeError::Config(e.to_string()))?;
        Self::from_toml_str(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml_str(s: &str) -> Result<Self, NodeError> {
        let config: Self = toml::from_str(s).map_err(|e| NodeError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize the configuration to a TOML string.
    pub fn to_toml_string(&self) -> Result<String, NodeError> {
        toml::to_string_pretty(self).map_err(|e| NodeError::Config(e.to_string()))
    }

    pub fn validate(&self) -> Result<(), NodeError> {
        if self.scheduler_tick_secs == 0 {
            return Err(NodeError::Config("scheduler_tick_secs must be positive".into()));
        }
        let q = &self.params.quorum;
        if q.target_min > q.target_max {
            return Err(NodeError::Config(format!(
                "quorum target_min {} exceeds target_max {}",
                q.target_min, q.target_max
            )));
        }
        if let Some((module, _)) = self.escrow_modules.iter().find(|(_, payee)| payee.trim().is_empty()) {
            return Err(NodeError::Config(format!("escrow module {module} has no payee")));
        }
        Ok(())
    }

    pub fn scheduler_tick(&self) -> Duration {
        Duration::from_secs(self.scheduler_tick_secs)
    }

    pub fn map_size_bytes(&self) -> usize {
        self.lmdb_map_size_mb.saturating_mul(1024 * 1024)
    }

    /// Escrow-settled modules with their payee accounts.
    pub fn escrow_payees(&self) -> impl Iterator<Item = (ModuleId, UserId)> + '_ {
        self.escrow_modules
            .iter()
            .map(|(module, payee)| (ModuleId::new(module.as_str()), UserId::new(payee.as_str())))
    }
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            lmdb_map_size_mb: default_map_size_mb(),
            log_format: LogFormat::default(),
            log_level: default_log_level(),
            scheduler_tick_secs: default_scheduler_tick_secs(),
            enable_metrics: false,
            escrow_modules: BTreeMap::new(),
            params: PlatformParams::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_round_trips_through_toml() {
        let mut config = PlatformConfig::default();
        config
            .escrow_modules
            .insert("promotions".into(), "platform".into());
        let toml_str = config.to_toml_string().unwrap();
        let parsed = PlatformConfig::from_toml_str(&toml_str).expect("should parse");
        assert_eq!(parsed, config);
    }

    #[test]
    fn minimal_toml_uses_defaults() {
        let config = PlatformConfig::from_toml_str("").expect("empty toml should use defaults");
        assert_eq!(config.scheduler_tick_secs, 60);
        assert_eq!(config.log_format, LogFormat::Human);
        assert_eq!(config.params.quorum.min_pool_size, 3);
        assert_eq!(config.params.posting.cutover, "20:00");
    }

    #[test]
    fn partial_toml_overrides() {
        let toml = r#"
            log_format = "json"
            scheduler_tick_secs = 5

            [escrow_modules]
            promotions = "platform"

            [params.quorum]
            target_max = 0.9

            [params.quorum.tau_by_module]
            jobs = 0.75

            [params.posting]
            cutover = "06:30"
            utc_offset_minutes = 330
        "#;
        let config = PlatformConfig::from_toml_str(toml).expect("should parse");
        assert_eq!(config.log_format, LogFormat::Json);
        assert_eq!(config.scheduler_tick(), Duration::from_secs(5));
        assert_eq!(config.params.quorum.target_max, 0.9);
        assert_eq!(config.params.quorum.target_min, 0.6);
        assert_eq!(config.params.quorum.tau_by_module.get("jobs"), Some(&0.75));
        assert_eq!(config.params.posting.utc_offset_minutes, 330);
        let payees: Vec<_> = config.escrow_payees().collect();
        assert_eq!(payees, vec![(ModuleId::new("promotions"), UserId::new("platform"))]);
    }

    #[test]
    fn inconsistent_values_are_rejected() {
        assert!(matches!(
            PlatformConfig::from_toml_str("scheduler_tick_secs = 0"),
            Err(NodeError::Config(_))
        ));
        let toml = r#"
            [params.quorum]
            target_min = 0.9
            target_max = 0.7
        "#;
        assert!(matches!(PlatformConfig::from_toml_str(toml), Err(NodeError::Config(_))));
        let toml = r#"
            [escrow_modules]
            rentals = " "
        "#;
        assert!(matches!(PlatformConfig::from_toml_str(toml), Err(NodeError::Config(_))));
    }

    #[test]
    fn missing_file_returns_config_error() {
        let result = PlatformConfig::from_toml_file("/nonexistent/agora.toml");
        assert!(matches!(result, Err(NodeError::Config(_))));
    }
}
