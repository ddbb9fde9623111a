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

//! HTTP/REST energy meter poller.
//!
//! Fetches a JSON document from the meter every `poll_interval_secs` and maps
//! selected fields (JSON pointers) onto gateway sensors.

use async_trait::async_trait;
use chrono::Utc;
use hausbridge_core::{
    ConfigCell, ConfigField, GatewayApi, GatewayEvent, Metric, MetricQueue, Plugin,
    PluginContext, PluginError, PluginResult, PluginStatus, SensorRegistration, SensorValue,
    ValidationResult, parse_config_with,
};
use parking_lot::Mutex;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::collections::{BTreeMap, HashSet};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

pub const PLUGIN_NAME: &str = "energy_meter";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldMapping {
    /// JSON pointer into the meter response, e.g. "/emeters/0/power"
    pub pointer: String,
    /// Gateway sensor name
    pub name: String,
    #[serde(default = "default_quantity")]
    pub quantity: String,
    #[serde(default = "default_unit")]
    pub unit: String,
    #[serde(default = "default_factor")]
    pub factor: f64,
}

fn default_quantity() -> String {
    "power".to_owned()
}

fn default_unit() -> String {
    "watt".to_owned()
}

fn default_factor() -> f64 {
    1.0
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnergyMeterConfig {
    #[serde(default)]
    pub url: String,
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    #[serde(default)]
    pub auth_token: Option<String>,
    #[serde(default)]
    pub fields: Vec<FieldMapping>,
}

fn default_poll_interval_secs() -> u64 {
    10
}

impl Default for EnergyMeterConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            poll_interval_secs: default_poll_interval_secs(),
            auth_token: None,
            fields: Vec::new(),
        }
    }
}

impl EnergyMeterConfig {
    fn validate(&self) -> ValidationResult {
        let mut result = ValidationResult::success();
        if !self.url.starts_with("http://") && !self.url.starts_with("https://") {
            result.add_error("url", "must start with http:// or https://");
        }
        if self.poll_interval_secs == 0 {
            result.add_error("poll_interval_secs", "must be greater than 0");
        }
        let mut names = HashSet::new();
        for (idx, field) in self.fields.iter().enumerate() {
            if !field.pointer.is_empty() && !field.pointer.starts_with('/') {
                result.add_error(format!("fields[{idx}].pointer"), "must start with '/'");
            }
            if !names.insert(field.name.as_str()) {
                result.add_error(format!("fields[{idx}].name"), "duplicate sensor name");
            }
        }
        if self.fields.is_empty() {
            result.add_warning("fields", "no fields mapped, nothing will be pushed");
        }
        result
    }
}

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("meter returned status {0}")]
    Status(u16),
}

impl From<FetchError> for PluginError {
    fn from(e: FetchError) -> Self {
        PluginError::Device(e.to_string())
    }
}

/// Pick mapped values out of a meter response, scaled by `factor`.
///
/// Returns `(field index, value)`; unresolvable or non-numeric fields are skipped.
pub fn extract_values(fields: &[FieldMapping], body: &Value) -> Vec<(usize, f64)> {
    fields
        .iter()
        .enumerate()
        .filter_map(|(idx, field)| {
            let raw = body.pointer(&field.pointer)?;
            let value = match raw {
                Value::Number(n) => n.as_f64(),
                Value::String(s) => s.trim().parse::<f64>().ok(),
                _ => None,
            };
            if value.is_none() {
                debug!("⚡ [METER] No numeric value at {}", field.pointer);
            }
            value.map(|v| (idx, v * field.factor))
        })
        .collect()
}

#[derive(Debug)]
struct Registered {
    fields: Vec<FieldMapping>,
    sensor_ids: Vec<u32>,
}

#[derive(Debug)]
pub struct EnergyMeterPlugin {
    config: ConfigCell<EnergyMeterConfig>,
    client: Client,
    registered: tokio::sync::Mutex<Option<Registered>>,
    online: Mutex<Option<bool>>,
}

impl EnergyMeterPlugin {
    pub fn new() -> Self {
        Self {
            config: ConfigCell::default(),
            client: Client::builder()
                .timeout(Duration::from_secs(10))
                .build()
                .unwrap_or_default(),
            registered: tokio::sync::Mutex::new(None),
            online: Mutex::new(None),
        }
    }

    pub fn is_online(&self) -> Option<bool> {
        *self.online.lock()
    }

    async fn fetch(&self, config: &EnergyMeterConfig) -> Result<Value, FetchError> {
        let mut request = self.client.get(&config.url);
        if let Some(token) = config.auth_token.as_deref().filter(|t| !t.is_empty()) {
            request = request.bearer_auth(token);
        }
        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(FetchError::Status(response.status().as_u16()));
        }
        Ok(response.json().await?)
    }

    /// Sensor ids for the current mapping, registering them if the mapping changed
    async fn sensor_ids(
        &self,
        gateway: &dyn GatewayApi,
        fields: &[FieldMapping],
    ) -> PluginResult<Vec<u32>> {
        let mut registered = self.registered.lock().await;
        if let Some(current) = registered.as_ref()
            && current.fields == fields
        {
            return Ok(current.sensor_ids.clone());
        }

        let mut sensor_ids = Vec::with_capacity(fields.len());
        for field in fields {
            let id = gateway
                .register_sensor(&SensorRegistration {
                    name: field.name.clone(),
                    physical_quantity: field.quantity.clone(),
                    unit: field.unit.clone(),
                })
                .await?;
            sensor_ids.push(id);
        }
        info!("⚡ [METER] Registered {} sensors", sensor_ids.len());

        *registered = Some(Registered {
            fields: fields.to_vec(),
            sensor_ids: sensor_ids.clone(),
        });
        Ok(sensor_ids)
    }

    async fn set_online(&self, gateway: &dyn GatewayApi, online: bool, details: Value) {
        let changed = self.online.lock().replace(online) != Some(online);
        if !changed {
            return;
        }
        let status = if online { "online" } else { "offline" };
        info!("⚡ [METER] Meter is {}", status);
        let status = PluginStatus::new(PLUGIN_NAME, "meter", status).with_details(details);
        if let Err(e) = gateway.report_status(&status).await {
            warn!("⚠️ [METER] Failed to report status: {}", e);
        }
    }

    /// One poll round; returns the number of values pushed
    pub async fn poll_once(
        &self,
        gateway: &dyn GatewayApi,
        metrics: &MetricQueue,
    ) -> PluginResult<usize> {
        let config = self.config.get();
        if config.url.is_empty() {
            return Ok(0);
        }

        let body = match self.fetch(&config).await {
            Ok(body) => body,
            Err(e) => {
                self.set_online(gateway, false, json!({ "error": e.to_string() }))
                    .await;
                return Err(e.into());
            }
        };
        self.set_online(gateway, true, json!({ "url": config.url }))
            .await;

        let sensor_ids = self.sensor_ids(gateway, &config.fields).await?;
        let extracted = extract_values(&config.fields, &body);
        if extracted.is_empty() {
            return Ok(0);
        }

        let values: Vec<SensorValue> = extracted
            .iter()
            .map(|&(idx, value)| SensorValue {
                sensor_id: sensor_ids[idx],
                value,
            })
            .collect();
        gateway.set_sensor_values(&values).await?;

        metrics.push(Metric {
            source: PLUGIN_NAME.to_owned(),
            metric_type: "energy_meter".to_owned(),
            timestamp: Utc::now(),
            tags: BTreeMap::from([("url".to_owned(), config.url.clone())]),
            values: extracted
                .iter()
                .map(|&(idx, value)| (config.fields[idx].name.clone(), value))
                .collect(),
        });

        debug!("⚡ [METER] Pushed {} values", values.len());
        Ok(values.len())
    }
}

impl Default for EnergyMeterPlugin {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Plugin for EnergyMeterPlugin {
    fn name(&self) -> &str {
        PLUGIN_NAME
    }

    fn version(&self) -> &str {
        env!("CARGO_PKG_VERSION")
    }

    fn config_description(&self) -> Vec<ConfigField> {
        vec![
            ConfigField::str("url", "Meter JSON endpoint").required(),
            ConfigField::int("poll_interval_secs", "Polling interval"),
            ConfigField::password("auth_token", "Bearer token sent to the meter"),
            ConfigField::repeated(
                "fields",
                vec![
                    ConfigField::str("pointer", "JSON pointer to the value").required(),
                    ConfigField::str("name", "Gateway sensor name").required(),
                    ConfigField::str("quantity", "Physical quantity"),
                    ConfigField::str("unit", "Unit of measurement"),
                    ConfigField::float("factor", "Multiplier applied to the raw value"),
                ],
                "Meter fields pushed as sensors",
            ),
        ]
    }

    fn get_config(&self) -> PluginResult<Value> {
        self.config.to_json()
    }

    fn set_config(&self, config: Value) -> PluginResult<()> {
        let parsed: EnergyMeterConfig =
            parse_config_with(&self.config_description(), config, EnergyMeterConfig::validate)?;
        self.config.set(parsed);
        Ok(())
    }

    fn handle_event(&self, _event: &GatewayEvent) {}

    async fn run(&self, ctx: PluginContext) -> PluginResult<()> {
        let mut shutdown = ctx.shutdown.clone();
        info!("⚡ [METER] Poller started");

        loop {
            if let Err(e) = self.poll_once(ctx.gateway.as_ref(), &ctx.metrics).await {
                warn!("⚠️ [METER] Poll failed: {}", e);
            }

            let interval = Duration::from_secs(self.config.get().poll_interval_secs.max(1));
            if !shutdown.sleep(interval).await {
                break;
            }
        }
        Ok(())
    }
}
