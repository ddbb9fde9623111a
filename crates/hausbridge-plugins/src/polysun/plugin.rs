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

use super::controller::{ShutterOutputs, ShutterTransition, TransitionQueue, apply_transition};
use async_trait::async_trait;
use hausbridge_core::{
    ConfigCell, ConfigField, GatewayEvent, Plugin, PluginContext, PluginResult, ShutterStatus,
    ValidationResult, parse_config_with,
};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

pub const PLUGIN_NAME: &str = "polysun";

const IDLE_WAIT: Duration = Duration::from_secs(1);
const RETRY_DELAY: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PolysunConfig {
    #[serde(default)]
    pub shutters: Vec<ShutterOutputs>,
}

impl PolysunConfig {
    pub fn shutter(&self, shutter_id: u32) -> Option<&ShutterOutputs> {
        self.shutters.iter().find(|s| s.shutter_id == shutter_id)
    }

    fn validate(&self) -> ValidationResult {
        let mut result = ValidationResult::success();
        let mut seen = HashSet::new();
        for (idx, shutter) in self.shutters.iter().enumerate() {
            if !seen.insert(shutter.shutter_id) {
                result.add_error(format!("shutters[{idx}].shutter_id"), "duplicate shutter id");
            }
            if shutter.up_output_id == shutter.down_output_id {
                result.add_error(
                    format!("shutters[{idx}].down_output_id"),
                    "must differ from up_output_id",
                );
            }
        }
        result
    }
}

/// Shutter control through a pair of relay outputs per shutter
#[derive(Debug, Default)]
pub struct PolysunPlugin {
    config: ConfigCell<PolysunConfig>,
    states: Mutex<HashMap<u32, ShutterStatus>>,
    queue: Arc<TransitionQueue>,
}

impl PolysunPlugin {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn queue(&self) -> &TransitionQueue {
        &self.queue
    }

    /// Last state reported for a shutter
    pub fn shutter_state(&self, shutter_id: u32) -> ShutterStatus {
        self.states
            .lock()
            .get(&shutter_id)
            .copied()
            .unwrap_or(ShutterStatus::Stopped)
    }
}

#[async_trait]
impl Plugin for PolysunPlugin {
    fn name(&self) -> &str {
        PLUGIN_NAME
    }

    fn version(&self) -> &str {
        env!("CARGO_PKG_VERSION")
    }

    fn config_description(&self) -> Vec<ConfigField> {
        vec![ConfigField::repeated(
            "shutters",
            vec![
                ConfigField::int("shutter_id", "Gateway shutter id").required(),
                ConfigField::int("up_output_id", "Relay output that moves the shutter up")
                    .required(),
                ConfigField::int("down_output_id", "Relay output that moves the shutter down")
                    .required(),
            ],
            "Shutters and their relay outputs",
        )]
    }

    fn get_config(&self) -> PluginResult<Value> {
        self.config.to_json()
    }

    fn set_config(&self, config: Value) -> PluginResult<()> {
        let parsed: PolysunConfig =
            parse_config_with(&self.config_description(), config, PolysunConfig::validate)?;
        info!("🪟 [POLYSUN] {} shutters configured", parsed.shutters.len());
        self.config.set(parsed);
        Ok(())
    }

    fn handle_event(&self, event: &GatewayEvent) {
        let GatewayEvent::ShutterChange { shutter_id, state } = *event else {
            return;
        };

        let previous = self
            .states
            .lock()
            .insert(shutter_id, state)
            .unwrap_or(ShutterStatus::Stopped);
        if previous == state {
            return;
        }

        self.queue.push(ShutterTransition {
            shutter_id,
            from: previous,
            to: state,
        });
    }

    async fn run(&self, ctx: PluginContext) -> PluginResult<()> {
        let mut shutdown = ctx.shutdown.clone();
        info!("🪟 [POLYSUN] Transition worker started");

        while !shutdown.is_shutdown() {
            let Some(transition) = self.queue.pop() else {
                tokio::select! {
                    _ = tokio::time::timeout(IDLE_WAIT, self.queue.notified()) => {}
                    () = shutdown.wait() => break,
                }
                continue;
            };

            let config = self.config.get();
            let Some(outputs) = config.shutter(transition.shutter_id) else {
                info!(
                    "🪟 [POLYSUN] Shutter {} is not configured, dropping {} -> {}",
                    transition.shutter_id, transition.from, transition.to
                );
                continue;
            };

            match apply_transition(ctx.gateway.as_ref(), outputs, transition).await {
                Ok(()) => debug!("✅ [POLYSUN] Shutter {} now {}", transition.shutter_id, transition.to),
                Err(e) => {
                    error!(
                        "❌ [POLYSUN] Shutter {} transition {} -> {} failed: {}",
                        transition.shutter_id, transition.from, transition.to, e
                    );
                    self.queue.push_front(transition);
                    if !shutdown.sleep(RETRY_DELAY).await {
                        break;
                    }
                    warn!("🔄 [POLYSUN] Retrying shutter {}", transition.shutter_id);
                }
            }
        }

        info!("🪟 [POLYSUN] Transition worker stopped ({} pending)", self.queue.len());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hausbridge_core::PluginError;
    use serde_json::json;

    #[test]
    fn test_rejects_shared_relay() {
        let plugin = PolysunPlugin::new();
        let result = plugin.set_config(json!({
            "shutters": [{ "shutter_id": 1, "up_output_id": 5, "down_output_id": 5 }]
        }));

        match result {
            Err(PluginError::InvalidConfig(validation)) => {
                assert_eq!(validation.errors[0].field, "shutters[0].down_output_id");
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_rejects_duplicate_shutter() {
        let plugin = PolysunPlugin::new();
        let result = plugin.set_config(json!({
            "shutters": [
                { "shutter_id": 1, "up_output_id": 5, "down_output_id": 6 },
                { "shutter_id": 1, "up_output_id": 7, "down_output_id": 8 }
            ]
        }));
        assert!(matches!(result, Err(PluginError::InvalidConfig(_))));
    }

    #[test]
    fn test_rejects_negative_output_id_with_path() {
        let plugin = PolysunPlugin::new();
        let result = plugin.set_config(json!({
            "shutters": [{ "shutter_id": 1, "up_output_id": -5, "down_output_id": 6 }]
        }));

        match result {
            Err(PluginError::InvalidConfig(validation)) => {
                assert_eq!(validation.errors.len(), 1);
                assert_eq!(validation.errors[0].field, "shutters[0].up_output_id");
            }
            other => panic!("unexpected result: {other:?}"),
        }
        assert!(plugin.get_config().unwrap()["shutters"].as_array().unwrap().is_empty());
    }

    #[test]
    fn test_handle_event_queues_transition_from_previous_state() {
        let plugin = PolysunPlugin::new();
        let change = |state| GatewayEvent::ShutterChange {
            shutter_id: 3,
            state,
        };

        plugin.handle_event(&change(ShutterStatus::GoingUp));
        plugin.handle_event(&change(ShutterStatus::GoingUp));
        plugin.handle_event(&change(ShutterStatus::Up));

        assert_eq!(plugin.queue().len(), 2);
        assert_eq!(
            plugin.queue().pop(),
            Some(ShutterTransition {
                shutter_id: 3,
                from: ShutterStatus::Stopped,
                to: ShutterStatus::GoingUp,
            })
        );
        assert_eq!(plugin.shutter_state(3), ShutterStatus::Up);
    }

    #[test]
    fn test_ignores_other_events() {
        let plugin = PolysunPlugin::new();
        plugin.handle_event(&GatewayEvent::OutputStatus {
            output_id: 1,
            on: true,
        });
        assert!(plugin.queue().is_empty());
    }
}
