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

//! Wire types shared between plugins and the gateway API.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// Request to register a plugin-provided sensor with the gateway
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorRegistration {
    /// Display name, unique per plugin (e.g. "grid_power")
    pub name: String,
    /// Physical quantity, e.g. "power", "energy", "humidity", "temperature"
    pub physical_quantity: String,
    /// Unit of measurement, e.g. "watt", "kilowatt_hour", "percent"
    pub unit: String,
}

/// A single sensor reading pushed to the gateway
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SensorValue {
    pub sensor_id: u32,
    pub value: f64,
}

/// Device status reported by a plugin (e.g. ventilation mode, meter online state)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PluginStatus {
    pub plugin: String,
    pub device: String,
    pub status: String,
    #[serde(default)]
    pub details: Value,
    pub timestamp: DateTime<Utc>,
}

impl PluginStatus {
    pub fn new(plugin: impl Into<String>, device: impl Into<String>, status: impl Into<String>) -> Self {
        Self {
            plugin: plugin.into(),
            device: device.into(),
            status: status.into(),
            details: Value::Null,
            timestamp: Utc::now(),
        }
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = details;
        self
    }
}

/// Metric sample queued by plugins and flushed to the gateway in batches
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metric {
    /// Plugin that produced the metric
    pub source: String,
    /// Metric family, e.g. "energy"
    pub metric_type: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
    pub values: BTreeMap<String, f64>,
}

/// Logical shutter state as reported by the gateway
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShutterStatus {
    Up,
    Down,
    GoingUp,
    GoingDown,
    Stopped,
}

/// Direction of travel of a moving shutter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShutterDirection {
    Up,
    Down,
}

impl ShutterDirection {
    pub fn opposite(self) -> Self {
        match self {
            Self::Up => Self::Down,
            Self::Down => Self::Up,
        }
    }
}

impl ShutterStatus {
    /// Direction of travel, `None` unless the shutter is moving
    pub fn direction(self) -> Option<ShutterDirection> {
        match self {
            Self::GoingUp => Some(ShutterDirection::Up),
            Self::GoingDown => Some(ShutterDirection::Down),
            Self::Up | Self::Down | Self::Stopped => None,
        }
    }

    pub fn is_moving(self) -> bool {
        self.direction().is_some()
    }

    pub fn all() -> &'static [ShutterStatus] {
        &[
            Self::Up,
            Self::Down,
            Self::GoingUp,
            Self::GoingDown,
            Self::Stopped,
        ]
    }
}

impl fmt::Display for ShutterStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Up => "up",
            Self::Down => "down",
            Self::GoingUp => "going_up",
            Self::GoingDown => "going_down",
            Self::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// Events delivered by the gateway to every plugin
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GatewayEvent {
    /// An output (relay, light) changed state
    OutputStatus { output_id: u32, on: bool },
    /// A shutter reported a new logical state
    ShutterChange { shutter_id: u32, state: ShutterStatus },
    /// A gateway sensor reported a new value
    SensorValue { sensor_id: u32, value: f64 },
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_gateway_event_wire_format() {
        let event: GatewayEvent = serde_json::from_value(json!({
            "type": "shutter_change",
            "shutter_id": 3,
            "state": "going_down"
        }))
        .unwrap();

        assert_eq!(
            event,
            GatewayEvent::ShutterChange {
                shutter_id: 3,
                state: ShutterStatus::GoingDown
            }
        );
    }

    #[test]
    fn test_shutter_direction() {
        assert_eq!(
            ShutterStatus::GoingUp.direction(),
            Some(ShutterDirection::Up)
        );
        assert_eq!(ShutterStatus::Stopped.direction(), None);
        assert!(!ShutterStatus::Down.is_moving());
        assert_eq!(ShutterDirection::Up.opposite(), ShutterDirection::Down);
    }
}
