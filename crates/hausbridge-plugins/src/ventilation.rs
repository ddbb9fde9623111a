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

//! Ventilation boost driven by humidity sensors.
//!
//! Readings arrive as `sensor_value` events; a periodic evaluation switches a
//! boost output on above the trigger humidity and off again once humidity has
//! dropped below `trigger - hysteresis` for at least the minimum boost time.

use async_trait::async_trait;
use hausbridge_core::{
    ConfigCell, ConfigField, GatewayApi, GatewayEvent, Plugin, PluginContext, PluginResult,
    PluginStatus, ValidationResult, parse_config_with,
};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tracing::{debug, error, info};

pub const PLUGIN_NAME: &str = "ventilation";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VentilationConfig {
    #[serde(default)]
    pub humidity_sensor_ids: Vec<u32>,
    #[serde(default)]
    pub boost_output_id: Option<u32>,
    /// Relative humidity (%) that starts a boost
    #[serde(default = "default_trigger_humidity")]
    pub trigger_humidity: f64,
    #[serde(default = "default_hysteresis")]
    pub hysteresis: f64,
    #[serde(default = "default_min_boost_secs")]
    pub min_boost_secs: u64,
    #[serde(default = "default_max_boost_secs")]
    pub max_boost_secs: u64,
    #[serde(default = "default_evaluate_interval_secs")]
    pub evaluate_interval_secs: u64,
    #[serde(default = "default_max_reading_age_secs")]
    pub max_reading_age_secs: u64,
}

fn default_trigger_humidity() -> f64 {
    70.0
}

fn default_hysteresis() -> f64 {
    5.0
}

fn default_min_boost_secs() -> u64 {
    600
}

fn default_max_boost_secs() -> u64 {
    3600
}

fn default_evaluate_interval_secs() -> u64 {
    30
}

fn default_max_reading_age_secs() -> u64 {
    300
}

impl Default for VentilationConfig {
    fn default() -> Self {
        Self {
            humidity_sensor_ids: Vec::new(),
            boost_output_id: None,
            trigger_humidity: default_trigger_humidity(),
            hysteresis: default_hysteresis(),
            min_boost_secs: default_min_boost_secs(),
            max_boost_secs: default_max_boost_secs(),
            evaluate_interval_secs: default_evaluate_interval_secs(),
            max_reading_age_secs: default_max_reading_age_secs(),
        }
    }
}

impl VentilationConfig {
    fn validate(&self) -> ValidationResult {
        let mut result = ValidationResult::success();
        if !(0.0..=100.0).contains(&self.trigger_humidity) {
            result.add_error("trigger_humidity", "must be between 0 and 100");
        }
        if self.hysteresis < 0.0 {
            result.add_error("hysteresis", "must not be negative");
        }
        if self.max_boost_secs < self.min_boost_secs {
            result.add_error("max_boost_secs", "must be at least min_boost_secs");
        }
        if self.evaluate_interval_secs == 0 {
            result.add_error("evaluate_interval_secs", "must be greater than 0");
        }
        if self.boost_output_id.is_none() {
            result.add_warning("boost_output_id", "no boost output, plugin stays idle");
        }
        result
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VentilationDecision {
    StartBoost,
    KeepBoost,
    StopBoost,
    Idle,
}

/// Decision table.
///
/// `max_humidity` is the highest fresh reading, `boost_elapsed` is `Some`
/// while boosting.
pub fn evaluate(
    config: &VentilationConfig,
    max_humidity: Option<f64>,
    boost_elapsed: Option<Duration>,
) -> VentilationDecision {
    let Some(elapsed) = boost_elapsed else {
        return match max_humidity {
            Some(humidity) if humidity >= config.trigger_humidity => VentilationDecision::StartBoost,
            _ => VentilationDecision::Idle,
        };
    };

    if elapsed >= Duration::from_secs(config.max_boost_secs) {
        return VentilationDecision::StopBoost;
    }

    let dried = max_humidity.is_none_or(|h| h < config.trigger_humidity - config.hysteresis);
    if dried && elapsed >= Duration::from_secs(config.min_boost_secs) {
        VentilationDecision::StopBoost
    } else {
        VentilationDecision::KeepBoost
    }
}

#[derive(Debug, Clone, Copy)]
struct Reading {
    value: f64,
    at: Instant,
}

#[derive(Debug, Clone, Copy)]
struct Boost {
    output_id: u32,
    started: Instant,
}

#[derive(Debug, Default)]
pub struct VentilationPlugin {
    config: ConfigCell<VentilationConfig>,
    readings: Mutex<HashMap<u32, Reading>>,
    boost: Mutex<Option<Boost>>,
}

impl VentilationPlugin {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_boosting(&self) -> bool {
        self.boost.lock().is_some()
    }

    /// Highest reading of the configured sensors that is not stale
    pub fn max_fresh_humidity(&self) -> Option<f64> {
        let config = self.config.get();
        let max_age = Duration::from_secs(config.max_reading_age_secs);
        let readings = self.readings.lock();
        config
            .humidity_sensor_ids
            .iter()
            .filter_map(|id| readings.get(id))
            .filter(|r| r.at.elapsed() <= max_age)
            .map(|r| r.value)
            .reduce(f64::max)
    }

    /// One evaluation round
    pub async fn tick(&self, gateway: &dyn GatewayApi) -> VentilationDecision {
        let config = self.config.get();
        let current = *self.boost.lock();

        // Output changed while boosting: release the old one first
        if let Some(boost) = current
            && config.boost_output_id != Some(boost.output_id)
        {
            self.stop_boost(gateway, boost, None).await;
            return VentilationDecision::StopBoost;
        }

        let Some(output_id) = config.boost_output_id else {
            return VentilationDecision::Idle;
        };

        let humidity = self.max_fresh_humidity();
        let decision = evaluate(&config, humidity, current.map(|b| b.started.elapsed()));
        debug!(
            "💨 [VENTILATION] humidity={:?} boosting={} -> {:?}",
            humidity,
            current.is_some(),
            decision
        );

        match (decision, current) {
            (VentilationDecision::StartBoost, _) => {
                match gateway.set_output(output_id, true).await {
                    Ok(()) => {
                        info!("💨 [VENTILATION] Boost started at {:?}% humidity", humidity);
                        *self.boost.lock() = Some(Boost {
                            output_id,
                            started: Instant::now(),
                        });
                        report_mode(gateway, output_id, "boost", humidity).await;
                    }
                    Err(e) => error!("❌ [VENTILATION] Failed to start boost: {}", e),
                }
            }
            (VentilationDecision::StopBoost, Some(boost)) => {
                self.stop_boost(gateway, boost, humidity).await;
            }
            _ => {}
        }
        decision
    }

    async fn stop_boost(&self, gateway: &dyn GatewayApi, boost: Boost, humidity: Option<f64>) {
        match gateway.set_output(boost.output_id, false).await {
            Ok(()) => {
                info!(
                    "💨 [VENTILATION] Boost stopped after {}s",
                    boost.started.elapsed().as_secs()
                );
                *self.boost.lock() = None;
                report_mode(gateway, boost.output_id, "normal", humidity).await;
            }
            Err(e) => error!("❌ [VENTILATION] Failed to stop boost: {}", e),
        }
    }
}

async fn report_mode(gateway: &dyn GatewayApi, output_id: u32, mode: &str, humidity: Option<f64>) {
    let status = PluginStatus::new(PLUGIN_NAME, format!("output_{output_id}"), mode)
        .with_details(json!({ "humidity": humidity }));
    if let Err(e) = gateway.report_status(&status).await {
        error!("❌ [VENTILATION] Failed to report status: {}", e);
    }
}

#[async_trait]
impl Plugin for VentilationPlugin {
    fn name(&self) -> &str {
        PLUGIN_NAME
    }

    fn version(&self) -> &str {
        env!("CARGO_PKG_VERSION")
    }

    fn config_description(&self) -> Vec<ConfigField> {
        vec![
            ConfigField::int_list("humidity_sensor_ids", "Gateway humidity sensors to watch"),
            ConfigField::int("boost_output_id", "Output that switches the fan to boost"),
            ConfigField::float("trigger_humidity", "Humidity (%) that starts a boost"),
            ConfigField::float("hysteresis", "Drop below trigger (%) needed to stop"),
            ConfigField::int("min_boost_secs", "Minimum boost duration"),
            ConfigField::int("max_boost_secs", "Maximum boost duration"),
            ConfigField::int("evaluate_interval_secs", "Evaluation interval"),
            ConfigField::int("max_reading_age_secs", "Ignore readings older than this"),
        ]
    }

    fn get_config(&self) -> PluginResult<Value> {
        self.config.to_json()
    }

    fn set_config(&self, config: Value) -> PluginResult<()> {
        let parsed: VentilationConfig =
            parse_config_with(&self.config_description(), config, VentilationConfig::validate)?;
        self.config.set(parsed);
        Ok(())
    }

    fn handle_event(&self, event: &GatewayEvent) {
        let GatewayEvent::SensorValue { sensor_id, value } = *event else {
            return;
        };
        if !self.config.get().humidity_sensor_ids.contains(&sensor_id) {
            return;
        }
        self.readings.lock().insert(
            sensor_id,
            Reading {
                value,
                at: Instant::now(),
            },
        );
    }

    async fn run(&self, ctx: PluginContext) -> PluginResult<()> {
        let mut shutdown = ctx.shutdown.clone();
        info!("💨 [VENTILATION] Started");

        loop {
            self.tick(ctx.gateway.as_ref()).await;

            let interval = Duration::from_secs(self.config.get().evaluate_interval_secs.max(1));
            if !shutdown.sleep(interval).await {
                break;
            }
        }

        let boost = *self.boost.lock();
        if let Some(boost) = boost {
            self.stop_boost(ctx.gateway.as_ref(), boost, None).await;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hausbridge_core::{GatewayCall, PluginError, RecordingGateway};

    fn config() -> VentilationConfig {
        VentilationConfig {
            humidity_sensor_ids: vec![1, 2],
            boost_output_id: Some(9),
            min_boost_secs: 600,
            max_boost_secs: 3600,
            ..VentilationConfig::default()
        }
    }

    fn mins(m: u64) -> Option<Duration> {
        Some(Duration::from_secs(m * 60))
    }

    #[test]
    fn test_start_boost_at_trigger() {
        assert_eq!(evaluate(&config(), Some(70.0), None), VentilationDecision::StartBoost);
        assert_eq!(evaluate(&config(), Some(69.9), None), VentilationDecision::Idle);
        assert_eq!(evaluate(&config(), None, None), VentilationDecision::Idle);
    }

    #[test]
    fn test_max_boost_always_stops() {
        assert_eq!(evaluate(&config(), Some(95.0), mins(60)), VentilationDecision::StopBoost);
    }

    #[test]
    fn test_hysteresis_band_keeps_boost() {
        // 66% is below the trigger but inside the hysteresis band
        assert_eq!(evaluate(&config(), Some(66.0), mins(20)), VentilationDecision::KeepBoost);
        assert_eq!(evaluate(&config(), Some(64.9), mins(20)), VentilationDecision::StopBoost);
    }

    #[test]
    fn test_min_boost_holds_even_when_dry() {
        assert_eq!(evaluate(&config(), Some(40.0), mins(5)), VentilationDecision::KeepBoost);
        assert_eq!(evaluate(&config(), None, mins(5)), VentilationDecision::KeepBoost);
        assert_eq!(evaluate(&config(), None, mins(10)), VentilationDecision::StopBoost);
    }

    #[test]
    fn test_rejects_inverted_boost_limits() {
        let plugin = VentilationPlugin::new();
        let result = plugin.set_config(serde_json::json!({
            "boost_output_id": 3,
            "min_boost_secs": 100,
            "max_boost_secs": 50
        }));
        assert!(matches!(result, Err(PluginError::InvalidConfig(_))));
    }

    #[test]
    fn test_ignores_unconfigured_sensors() {
        let plugin = VentilationPlugin::new();
        plugin
            .set_config(serde_json::json!({ "humidity_sensor_ids": [1], "boost_output_id": 9 }))
            .unwrap();

        plugin.handle_event(&GatewayEvent::SensorValue {
            sensor_id: 5,
            value: 99.0,
        });
        assert_eq!(plugin.max_fresh_humidity(), None);

        plugin.handle_event(&GatewayEvent::SensorValue {
            sensor_id: 1,
            value: 55.0,
        });
        assert_eq!(plugin.max_fresh_humidity(), Some(55.0));
    }

    #[tokio::test]
    async fn test_tick_boost_cycle() {
        let gateway = RecordingGateway::new();
        let plugin = VentilationPlugin::new();
        plugin
            .set_config(serde_json::json!({
                "humidity_sensor_ids": [1, 2],
                "boost_output_id": 9,
                "min_boost_secs": 0
            }))
            .unwrap();

        plugin.handle_event(&GatewayEvent::SensorValue {
            sensor_id: 2,
            value: 81.0,
        });
        assert_eq!(plugin.tick(&gateway).await, VentilationDecision::StartBoost);
        assert!(plugin.is_boosting());

        plugin.handle_event(&GatewayEvent::SensorValue {
            sensor_id: 2,
            value: 50.0,
        });
        assert_eq!(plugin.tick(&gateway).await, VentilationDecision::StopBoost);
        assert!(!plugin.is_boosting());

        assert_eq!(gateway.output_calls(), vec![(9, true), (9, false)]);
        let modes: Vec<String> = gateway
            .calls()
            .into_iter()
            .filter_map(|call| match call {
                GatewayCall::ReportStatus(status) => Some(status.status),
                _ => None,
            })
            .collect();
        assert_eq!(modes, vec!["boost", "normal"]);
    }

    #[tokio::test]
    async fn test_failed_start_retries_next_tick() {
        let gateway = RecordingGateway::new();
        let plugin = VentilationPlugin::new();
        plugin
            .set_config(serde_json::json!({ "humidity_sensor_ids": [1], "boost_output_id": 9 }))
            .unwrap();
        plugin.handle_event(&GatewayEvent::SensorValue {
            sensor_id: 1,
            value: 90.0,
        });

        gateway.fail_next(1);
        plugin.tick(&gateway).await;
        assert!(!plugin.is_boosting());

        plugin.tick(&gateway).await;
        assert!(plugin.is_boosting());
    }
}
