// Copyright (c) 2025 SOLARE S.R.O.
//
// This file is part of HausBridge.
//
// Licensed under the Creative Commons Attribution-NonCommercial-NoDerivatives 4.0 International
// (CC BY-NC-ND 4.0). You may use and share this file for non-commercial purposes only and you may not
// create derivatives. See <https://creativecommons.org/licenses/by-nc-nd/4.0/>.
//
// This software is provided "AS IS", without warranty of any kind.
//
// For commercial licensing, please contact: info@solare.cz

use anyhow::{Context, Result};
use hausbridge_core::ValidationResult;
use hausbridge_plugins::PluginKind;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::{info, warn};

/// Main application configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub plugins: PluginsConfig,
    #[serde(default)]
    pub system: SystemConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Base URL of the gateway REST API
    #[serde(default = "default_gateway_url")]
    pub base_url: String,
    /// Bearer token (usually provided through HAUSBRIDGE_GATEWAY_TOKEN)
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
}

impl GatewayConfig {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            base_url: default_gateway_url(),
            token: None,
            max_retries: default_max_retries(),
            retry_delay_ms: default_retry_delay_ms(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_listen_port")]
    pub listen_port: u16,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            listen_port: default_listen_port(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PluginsConfig {
    /// Plugins to load, by name
    #[serde(default = "default_enabled_plugins")]
    pub enabled: Vec<String>,
    /// Directory where plugin configs are persisted
    #[serde(default = "default_config_dir")]
    pub config_dir: String,
}

impl Default for PluginsConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled_plugins(),
            config_dir: default_config_dir(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default = "default_metrics_flush_interval")]
    pub metrics_flush_interval_secs: u64,
    /// Log gateway calls instead of sending them
    #[serde(default)]
    pub dry_run: bool,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            metrics_flush_interval_secs: default_metrics_flush_interval(),
            dry_run: false,
        }
    }
}

fn default_gateway_url() -> String {
    "http://localhost:8080".to_owned()
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_delay_ms() -> u64 {
    500
}

fn default_true() -> bool {
    true
}

fn default_listen_port() -> u16 {
    8099
}

fn default_enabled_plugins() -> Vec<String> {
    PluginKind::all()
        .iter()
        .map(|kind| kind.config_name().to_owned())
        .collect()
}

fn default_config_dir() -> String {
    "/data/plugins".to_owned()
}

fn default_log_level() -> String {
    "info".to_owned()
}

fn default_metrics_flush_interval() -> u64 {
    30
}

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

impl AppConfig {
    /// Load configuration.
    ///
    /// Order: explicit path, HA addon options (/data/options.json),
    /// config.toml, config.json, then defaults. Environment overrides
    /// are applied on top of whichever source was used.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let mut config = Self::load_file(explicit)?;
        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    fn load_file(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            let config = Self::from_file(path)?;
            info!("✅ Loaded configuration from {}", path.display());
            return Ok(config);
        }

        for candidate in ["/data/options.json", "config.toml", "config.json"] {
            let path = Path::new(candidate);
            if path.exists() {
                let config = Self::from_file(path)?;
                info!("✅ Loaded configuration from {}", candidate);
                return Ok(config);
            }
        }

        warn!("No configuration file found, using defaults with environment overrides");
        Ok(Self::default())
    }

    /// Parse a config file; `.toml` files as TOML, everything else as JSON
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;

        if path.extension().is_some_and(|ext| ext == "toml") {
            toml::from_str(&content).with_context(|| format!("Failed to parse {}", path.display()))
        } else {
            serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse {}", path.display()))
        }
    }

    /// Apply `HAUSBRIDGE_*` overrides from `lookup`
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup("HAUSBRIDGE_GATEWAY_URL") {
            self.gateway.base_url = url;
        }
        if let Some(token) = lookup("HAUSBRIDGE_GATEWAY_TOKEN")
            && !token.trim().is_empty()
        {
            self.gateway.token = Some(token);
        }
        if let Some(port) = lookup("HAUSBRIDGE_API_PORT")
            && let Ok(port) = port.parse::<u16>()
        {
            self.api.listen_port = port;
        }
        if let Some(dry_run) = lookup("HAUSBRIDGE_DRY_RUN")
            && let Ok(enabled) = dry_run.parse::<bool>()
        {
            self.system.dry_run = enabled;
        }
    }

    /// Validate configuration with detailed error reporting
    pub fn validate_detailed(&self) -> ValidationResult {
        let mut result = ValidationResult::success();

        let url = &self.gateway.base_url;
        if !url.starts_with("http://") && !url.starts_with("https://") {
            if self.system.dry_run {
                result.add_warning("gateway.base_url", "Not an HTTP URL (ignored in dry run)");
            } else {
                result.add_error(
                    "gateway.base_url",
                    format!("'{url}' must start with http:// or https://"),
                );
            }
        }
        if self.gateway.token.is_none() && !self.system.dry_run {
            result.add_warning("gateway.token", "No gateway token configured");
        }
        if self.gateway.max_retries == 0 {
            result.add_error("gateway.max_retries", "Must be at least 1");
        }

        if self.api.enabled && self.api.listen_port == 0 {
            result.add_error("api.listen_port", "Port must be greater than 0");
        }

        if self.plugins.enabled.is_empty() {
            result.add_warning("plugins.enabled", "No plugins enabled");
        }
        let mut seen = Vec::new();
        for (idx, name) in self.plugins.enabled.iter().enumerate() {
            match name.parse::<PluginKind>() {
                Ok(kind) if seen.contains(&kind) => result.add_warning(
                    format!("plugins.enabled[{idx}]"),
                    format!("Plugin '{name}' listed twice"),
                ),
                Ok(kind) => seen.push(kind),
                Err(_) => result.add_error(
                    format!("plugins.enabled[{idx}]"),
                    format!(
                        "Unknown plugin '{name}' (available: {})",
                        default_enabled_plugins().join(", ")
                    ),
                ),
            }
        }
        if self.plugins.config_dir.trim().is_empty() {
            result.add_error("plugins.config_dir", "Config directory cannot be empty");
        }

        if !LOG_LEVELS.contains(&self.system.log_level.to_lowercase().as_str()) {
            result.add_error(
                "system.log_level",
                format!(
                    "Invalid log level '{}' (must be one of: {})",
                    self.system.log_level,
                    LOG_LEVELS.join(", ")
                ),
            );
        }
        if self.system.metrics_flush_interval_secs == 0 {
            result.add_error(
                "system.metrics_flush_interval_secs",
                "Flush interval must be greater than 0",
            );
        }

        result
    }

    /// Validate configuration, failing on the first set of errors
    pub fn validate(&self) -> Result<()> {
        let result = self.validate_detailed();
        for warning in &result.warnings {
            warn!("⚠️ Config: {}: {}", warning.field, warning.message);
        }
        if result.has_errors() {
            let messages: Vec<String> = result
                .errors
                .iter()
                .map(|e| format!("{}: {}", e.field, e.message))
                .collect();
            anyhow::bail!("Invalid configuration: {}", messages.join("; "));
        }
        Ok(())
    }

    /// Enabled plugins, in configured order without duplicates
    pub fn enabled_plugins(&self) -> Result<Vec<PluginKind>> {
        let mut kinds = Vec::new();
        for name in &self.plugins.enabled {
            let kind: PluginKind = name.parse()?;
            if !kinds.contains(&kind) {
                kinds.push(kind);
            }
        }
        Ok(kinds)
    }
}
