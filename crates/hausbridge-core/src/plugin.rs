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

//! The plugin lifecycle contract.
//!
//! A plugin is registered with the [`PluginHost`](crate::host::PluginHost), which
//! - serves `config_description`, `get_config` and `set_config` as JSON,
//! - fans every [`GatewayEvent`] out to `handle_event`,
//! - runs `run` as a background task, restarting it after errors.

use crate::config_description::{ConfigField, validate_config};
use crate::errors::{PluginError, PluginResult};
use crate::gateway::GatewayApi;
use crate::metrics::MetricQueue;
use crate::shutdown::Shutdown;
use crate::types::GatewayEvent;
use crate::validation::ValidationResult;
use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::warn;

/// Trait implemented by every integration plugin
#[async_trait]
pub trait Plugin: Send + Sync {
    /// Unique plugin identifier
    fn name(&self) -> &str;

    fn version(&self) -> &str;

    /// Fields accepted by `set_config`
    fn config_description(&self) -> Vec<ConfigField>;

    fn get_config(&self) -> PluginResult<Value>;

    /// Validate and apply a new configuration. Running tasks pick it up.
    fn set_config(&self, config: Value) -> PluginResult<()>;

    /// Gateway event callback. Must not block; queue work for `run` instead.
    fn handle_event(&self, event: &GatewayEvent);

    /// Background task. Returns when `ctx.shutdown` fires.
    async fn run(&self, ctx: PluginContext) -> PluginResult<()>;
}

/// Host resources handed to a plugin's background task
#[derive(Clone)]
pub struct PluginContext {
    pub gateway: Arc<dyn GatewayApi>,
    pub shutdown: Shutdown,
    pub metrics: Arc<MetricQueue>,
}

impl fmt::Debug for PluginContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginContext")
            .field("gateway", &self.gateway.name())
            .field("shutdown", &self.shutdown.is_shutdown())
            .field("metrics", &self.metrics.len())
            .finish()
    }
}

/// Name and version as listed by the host API
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PluginInfo {
    pub name: String,
    pub version: String,
}

/// Validate `config` against `description`, then deserialize it.
///
/// Missing optional fields fall back to the target type's serde defaults.
pub fn parse_config<T: DeserializeOwned>(
    description: &[ConfigField],
    config: Value,
) -> PluginResult<T> {
    parse_config_with(description, config, |_| ValidationResult::success())
}

/// Like [`parse_config`], followed by a plugin-specific `check` of the parsed value
pub fn parse_config_with<T: DeserializeOwned>(
    description: &[ConfigField],
    config: Value,
    check: impl FnOnce(&T) -> ValidationResult,
) -> PluginResult<T> {
    let mut result = validate_config(description, &config);
    if result.has_errors() {
        return Err(PluginError::InvalidConfig(result));
    }

    let parsed: T = serde_json::from_value(config)?;
    result.merge(check(&parsed));
    if result.has_errors() {
        return Err(PluginError::InvalidConfig(result));
    }

    for warning in &result.warnings {
        warn!("⚠️ Config: {}: {}", warning.field, warning.message);
    }
    Ok(parsed)
}

/// Current plugin configuration, published to running tasks.
#[derive(Debug)]
pub struct ConfigCell<T> {
    tx: watch::Sender<Arc<T>>,
}

impl<T> ConfigCell<T> {
    pub fn new(initial: T) -> Self {
        let (tx, _rx) = watch::channel(Arc::new(initial));
        Self { tx }
    }

    pub fn get(&self) -> Arc<T> {
        self.tx.borrow().clone()
    }

    pub fn set(&self, config: T) {
        self.tx.send_replace(Arc::new(config));
    }

    /// Receiver that is notified on every `set`
    pub fn subscribe(&self) -> watch::Receiver<Arc<T>> {
        self.tx.subscribe()
    }
}

impl<T: Serialize> ConfigCell<T> {
    pub fn to_json(&self) -> PluginResult<Value> {
        Ok(serde_json::to_value(&*self.get())?)
    }
}

impl<T: Default> Default for ConfigCell<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}
