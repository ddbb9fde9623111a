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

use super::topics::{is_valid_filter, is_valid_topic, topic_matches};
use hausbridge_core::{ConfigField, ValidationResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorMapping {
    /// Topic filter, may contain `+`/`#`
    pub topic: String,
    pub name: String,
    #[serde(default = "default_quantity")]
    pub quantity: String,
    #[serde(default = "default_unit")]
    pub unit: String,
    /// Pointer into a JSON payload; plain numeric payloads need none
    #[serde(default)]
    pub json_pointer: Option<String>,
    #[serde(default = "default_factor")]
    pub factor: f64,
}

fn default_quantity() -> String {
    "generic".to_owned()
}

fn default_unit() -> String {
    "none".to_owned()
}

fn default_factor() -> f64 {
    1.0
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputMapping {
    pub output_id: u32,
    pub command_topic: String,
    #[serde(default)]
    pub state_topic: Option<String>,
    #[serde(default = "default_payload_on")]
    pub payload_on: String,
    #[serde(default = "default_payload_off")]
    pub payload_off: String,
    /// Publish commands as retained messages
    #[serde(default)]
    pub retain: bool,
}

fn default_payload_on() -> String {
    "ON".to_owned()
}

fn default_payload_off() -> String {
    "OFF".to_owned()
}

impl OutputMapping {
    /// Decode a state payload, case-insensitively
    pub fn parse_state(&self, payload: &str) -> Option<bool> {
        let payload = payload.trim();
        if payload.eq_ignore_ascii_case(&self.payload_on) {
            Some(true)
        } else if payload.eq_ignore_ascii_case(&self.payload_off) {
            Some(false)
        } else {
            None
        }
    }

    pub fn payload_for(&self, on: bool) -> &str {
        if on { &self.payload_on } else { &self.payload_off }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MqttBridgeConfig {
    #[serde(default)]
    pub broker_host: String,
    #[serde(default = "default_broker_port")]
    pub broker_port: u16,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default = "default_client_id")]
    pub client_id: String,
    #[serde(default = "default_keep_alive_secs")]
    pub keep_alive_secs: u64,
    #[serde(default)]
    pub sensors: Vec<SensorMapping>,
    #[serde(default)]
    pub outputs: Vec<OutputMapping>,
}

fn default_broker_port() -> u16 {
    1883
}

fn default_client_id() -> String {
    "hausbridge".to_owned()
}

fn default_keep_alive_secs() -> u64 {
    30
}

impl Default for MqttBridgeConfig {
    fn default() -> Self {
        Self {
            broker_host: String::new(),
            broker_port: default_broker_port(),
            username: None,
            password: None,
            client_id: default_client_id(),
            keep_alive_secs: default_keep_alive_secs(),
            sensors: Vec::new(),
            outputs: Vec::new(),
        }
    }
}

/// What an incoming MQTT message means for the gateway
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BridgeAction {
    /// Value for `sensors[index]`, already scaled
    SensorValue { index: usize, value: f64 },
    OutputState { output_id: u32, on: bool },
}

pub fn config_description() -> Vec<ConfigField> {
    vec![
        ConfigField::str("broker_host", "MQTT broker host").required(),
        ConfigField::int("broker_port", "MQTT broker port").max_value(u64::from(u16::MAX)),
        ConfigField::str("username", "Broker username"),
        ConfigField::password("password", "Broker password"),
        ConfigField::str("client_id", "MQTT client id"),
        ConfigField::int("keep_alive_secs", "Keep-alive interval"),
        ConfigField::repeated(
            "sensors",
            vec![
                ConfigField::str("topic", "Topic filter (+ and # allowed)").required(),
                ConfigField::str("name", "Gateway sensor name").required(),
                ConfigField::str("quantity", "Physical quantity"),
                ConfigField::str("unit", "Unit of measurement"),
                ConfigField::str("json_pointer", "Pointer into a JSON payload"),
                ConfigField::float("factor", "Multiplier applied to the value"),
            ],
            "MQTT topics pushed as gateway sensors",
        ),
        ConfigField::repeated(
            "outputs",
            vec![
                ConfigField::int("output_id", "Gateway output id").required(),
                ConfigField::str("command_topic", "Topic commands are published to").required(),
                ConfigField::str("state_topic", "Topic the device reports its state on"),
                ConfigField::str("payload_on", "Payload meaning on"),
                ConfigField::str("payload_off", "Payload meaning off"),
                ConfigField::bool("retain", "Publish commands as retained messages"),
            ],
            "Gateway outputs mirrored to MQTT devices",
        ),
    ]
}

impl MqttBridgeConfig {
    pub fn validate(&self) -> ValidationResult {
        let mut result = ValidationResult::success();
        if self.keep_alive_secs < 5 {
            result.add_error("keep_alive_secs", "must be at least 5");
        }
        for (idx, sensor) in self.sensors.iter().enumerate() {
            if !is_valid_filter(&sensor.topic) {
                result.add_error(format!("sensors[{idx}].topic"), "invalid topic filter");
            }
            if let Some(pointer) = &sensor.json_pointer
                && !pointer.is_empty()
                && !pointer.starts_with('/')
            {
                result.add_error(format!("sensors[{idx}].json_pointer"), "must start with '/'");
            }
        }
        let mut output_ids = BTreeSet::new();
        for (idx, output) in self.outputs.iter().enumerate() {
            if !output_ids.insert(output.output_id) {
                result.add_error(format!("outputs[{idx}].output_id"), "duplicate output id");
            }
            if !is_valid_topic(&output.command_topic) {
                result.add_error(
                    format!("outputs[{idx}].command_topic"),
                    "must be a topic without wildcards",
                );
            }
            if let Some(state_topic) = &output.state_topic
                && !is_valid_filter(state_topic)
            {
                result.add_error(format!("outputs[{idx}].state_topic"), "invalid topic filter");
            }
            if output.payload_on.eq_ignore_ascii_case(&output.payload_off) {
                result.add_error(
                    format!("outputs[{idx}].payload_off"),
                    "must differ from payload_on",
                );
            }
        }
        result
    }

    /// Filters to subscribe to, deduplicated
    pub fn subscriptions(&self) -> Vec<String> {
        let topics: BTreeSet<&str> = self
            .sensors
            .iter()
            .map(|s| s.topic.as_str())
            .chain(self.outputs.iter().filter_map(|o| o.state_topic.as_deref()))
            .collect();
        topics.into_iter().map(str::to_owned).collect()
    }

    pub fn output(&self, output_id: u32) -> Option<&OutputMapping> {
        self.outputs.iter().find(|o| o.output_id == output_id)
    }

    /// Map an incoming message.
    ///
    /// The first matching sensor that yields a number wins. Payloads no sensor
    /// can read are tried against the output state topics.
    pub fn route(&self, topic: &str, payload: &[u8]) -> Option<BridgeAction> {
        let payload = std::str::from_utf8(payload).ok()?;

        let sensor_value = self
            .sensors
            .iter()
            .enumerate()
            .filter(|(_, s)| topic_matches(&s.topic, topic))
            .find_map(|(index, sensor)| {
                parse_number(payload, sensor.json_pointer.as_deref()).map(|value| {
                    BridgeAction::SensorValue {
                        index,
                        value: value * sensor.factor,
                    }
                })
            });
        if sensor_value.is_some() {
            return sensor_value;
        }

        self.outputs
            .iter()
            .filter(|o| o.state_topic.as_deref().is_some_and(|f| topic_matches(f, topic)))
            .find_map(|o| {
                o.parse_state(payload).map(|on| BridgeAction::OutputState {
                    output_id: o.output_id,
                    on,
                })
            })
    }
}

/// Plain number, or a number (or numeric string) inside a JSON payload
fn parse_number(payload: &str, pointer: Option<&str>) -> Option<f64> {
    let payload = payload.trim();
    let pointer = pointer.filter(|p| !p.is_empty());
    if pointer.is_none()
        && let Ok(value) = payload.parse::<f64>()
    {
        return Some(value);
    }

    let json: Value = serde_json::from_str(payload).ok()?;
    let value = match pointer {
        Some(pointer) => json.pointer(pointer)?,
        None => &json,
    };
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
