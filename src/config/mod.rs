//! Configuration management for the authorization engine

use crate::policy::{MatchStrategy, PageAccessGate};
use anyhow::{Context, Result};
use std::env;
use std::path::PathBuf;

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Database configuration; absent when `DATABASE_URL` is unset
    pub database: Option<DatabaseConfig>,
    /// Logging and metrics configuration
    pub telemetry: TelemetryConfig,
    /// Page gate configuration
    pub page_access: PageAccessConfig,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
}

#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub service_name: String,
    /// "json" for structured output, anything else for human-readable
    pub log_format: String,
    pub metrics_enabled: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service_name: "kroolo-authz".to_string(),
            log_format: "pretty".to_string(),
            metrics_enabled: false,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct PageAccessConfig {
    /// JSON rule file; the built-in table is used when unset
    pub rules_path: Option<PathBuf>,
    pub strategy: MatchStrategy,
}

impl PageAccessConfig {
    pub fn build_gate(&self) -> crate::error::Result<PageAccessGate> {
        match &self.rules_path {
            Some(path) => PageAccessGate::from_file(path, self.strategy),
            None => Ok(PageAccessGate::with_default_rules(self.strategy)),
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup<F>(var: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let database = match var("DATABASE_URL") {
            Some(url) => Some(DatabaseConfig {
                url,
                max_connections: var("DATABASE_MAX_CONNECTIONS")
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(10),
                min_connections: var("DATABASE_MIN_CONNECTIONS")
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(2),
            }),
            None => None,
        };

        let defaults = TelemetryConfig::default();
        let telemetry = TelemetryConfig {
            service_name: var("SERVICE_NAME").unwrap_or(defaults.service_name),
            log_format: var("LOG_FORMAT").unwrap_or(defaults.log_format),
            metrics_enabled: var("METRICS_ENABLED")
                .map(|s| s.to_lowercase() == "true")
                .unwrap_or(defaults.metrics_enabled),
        };

        let strategy = match var("PAGE_MATCH_STRATEGY") {
            Some(raw) => raw
                .parse::<MatchStrategy>()
                .context("Invalid PAGE_MATCH_STRATEGY")?,
            None => MatchStrategy::default(),
        };
        let page_access = PageAccessConfig {
            rules_path: var("PAGE_ACCESS_RULES_PATH").map(PathBuf::from),
            strategy,
        };

        Ok(Self {
            database,
            telemetry,
            page_access,
        })
    }

    /// Database settings, for commands that need the store.
    pub fn require_database(&self) -> Result<&DatabaseConfig> {
        self.database.as_ref().context("DATABASE_URL is required")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<Config> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = load(&[]).unwrap();
        assert!(config.database.is_none());
        assert!(config.require_database().is_err());
        assert_eq!(config.telemetry.log_format, "pretty");
        assert!(!config.telemetry.metrics_enabled);
        assert_eq!(config.page_access.strategy, MatchStrategy::FirstMatch);
        assert!(config.page_access.rules_path.is_none());
    }

    #[test]
    fn test_database_settings() {
        let config = load(&[
            ("DATABASE_URL", "mysql://root@localhost:4000/kroolo"),
            ("DATABASE_MAX_CONNECTIONS", "25"),
            ("DATABASE_MIN_CONNECTIONS", "not-a-number"),
        ])
        .unwrap();

        let db = config.require_database().unwrap();
        assert_eq!(db.url, "mysql://root@localhost:4000/kroolo");
        assert_eq!(db.max_connections, 25);
        assert_eq!(db.min_connections, 2);
    }

    #[test]
    fn test_page_access_settings() {
        let config = load(&[
            ("PAGE_MATCH_STRATEGY", "longest_prefix"),
            ("PAGE_ACCESS_RULES_PATH", "/etc/kroolo/pages.json"),
        ])
        .unwrap();

        assert_eq!(config.page_access.strategy, MatchStrategy::LongestPrefix);
        assert_eq!(
            config.page_access.rules_path,
            Some(PathBuf::from("/etc/kroolo/pages.json"))
        );
    }

    #[test]
    fn test_invalid_strategy_is_rejected() {
        let err = load(&[("PAGE_MATCH_STRATEGY", "priority")]).unwrap_err();
        assert!(err.to_string().contains("PAGE_MATCH_STRATEGY"));
    }

    #[test]
    fn test_telemetry_settings() {
        let config = load(&[("LOG_FORMAT", "json"), ("METRICS_ENABLED", "TRUE")]).unwrap();
        assert_eq!(config.telemetry.log_format, "json");
        assert!(config.telemetry.metrics_enabled);
    }

    #[test]
    fn test_default_gate_when_no_rules_file() {
        let gate = PageAccessConfig::default().build_gate().unwrap();
        assert!(!gate.rules().is_empty());
    }

    #[test]
    fn test_missing_rules_file_is_an_error() {
        let config = PageAccessConfig {
            rules_path: Some(PathBuf::from("/nonexistent/kroolo-pages.json")),
            strategy: MatchStrategy::FirstMatch,
        };
        assert!(config.build_gate().is_err());
    }
}
