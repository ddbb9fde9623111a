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

//! MQTT bridge plugin
//!
//! Subscribes to configured topics on an MQTT broker and forwards sensor
//! readings and device output states to the gateway. Gateway output changes
//! are published back to the devices' command topics.

mod config;
mod topics;

pub use config::{BridgeAction, MqttBridgeConfig, OutputMapping, SensorMapping};
pub use topics::{is_valid_filter, is_valid_topic, topic_matches};

use async_trait::async_trait;
use hausbridge_core::{
    ConfigCell, ConfigField, GatewayApi, GatewayEvent, Plugin, PluginContext, PluginError,
    PluginResult, SensorRegistration, SensorValue, parse_config_with,
};
use parking_lot::Mutex;
use rumqttc::{
    AsyncClient, ConnectionError, Event, MqttOptions, Packet, Publish, QoS, SubscribeFilter,
};
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

pub const PLUGIN_NAME: &str = "mqtt_bridge";

const RECONNECT_DELAY: Duration = Duration::from_secs(5);
const REQUEST_CAPACITY: usize = 64;
/// Incoming messages waiting for the gateway
const FORWARD_CAPACITY: usize = 256;

enum Disconnect {
    Shutdown,
    Reconfigure,
    Failed(ConnectionError),
}

/// Message published to a device's command topic
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    pub topic: String,
    pub payload: String,
    pub retain: bool,
}

#[derive(Debug)]
struct Registered {
    sensors: Vec<SensorMapping>,
    sensor_ids: Vec<u32>,
}

pub struct MqttBridgePlugin {
    config: ConfigCell<MqttBridgeConfig>,
    client: Mutex<Option<AsyncClient>>,
    /// Last state reported by each device over MQTT
    device_states: Mutex<HashMap<u32, bool>>,
    registered: tokio::sync::Mutex<Option<Registered>>,
}

impl std::fmt::Debug for MqttBridgePlugin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MqttBridgePlugin")
            .field("config", &self.config)
            .field("connected", &self.client.lock().is_some())
            .field("device_states", &self.device_states)
            .finish_non_exhaustive()
    }
}

impl Default for MqttBridgePlugin {
    fn default() -> Self {
        Self::new()
    }
}

impl MqttBridgePlugin {
    pub fn new() -> Self {
        Self {
            config: ConfigCell::default(),
            client: Mutex::new(None),
            device_states: Mutex::new(HashMap::new()),
            registered: tokio::sync::Mutex::new(None),
        }
    }

    pub fn device_state(&self, output_id: u32) -> Option<bool> {
        self.device_states.lock().get(&output_id).copied()
    }

    fn mqtt_options(config: &MqttBridgeConfig) -> MqttOptions {
        let mut options =
            MqttOptions::new(&config.client_id, &config.broker_host, config.broker_port);
        options.set_keep_alive(Duration::from_secs(config.keep_alive_secs.max(5)));
        if let Some(username) = config.username.as_deref().filter(|u| !u.is_empty()) {
            options.set_credentials(username, config.password.clone().unwrap_or_default());
        }
        options
    }

    /// Command to publish for a gateway output change, if any
    pub fn command_for(&self, output_id: u32, on: bool) -> Option<Command> {
        let config = self.config.get();
        let output = config.output(output_id)?;
        if self.device_state(output_id) == Some(on) {
            debug!(
                "📡 [MQTT] Output {} already {} on the device, not echoing",
                output_id, on
            );
            return None;
        }
        Some(Command {
            topic: output.command_topic.clone(),
            payload: output.payload_for(on).to_owned(),
            retain: output.retain,
        })
    }

    fn publish(&self, command: Command) -> PluginResult<()> {
        let client = self.client.lock();
        let client = client
            .as_ref()
            .ok_or_else(|| PluginError::Mqtt("not connected".to_owned()))?;
        client
            .try_publish(command.topic, QoS::AtLeastOnce, command.retain, command.payload)
            .map_err(|e| PluginError::Mqtt(e.to_string()))
    }

    async fn sensor_ids(
        &self,
        gateway: &dyn GatewayApi,
        sensors: &[SensorMapping],
    ) -> PluginResult<Vec<u32>> {
        let mut registered = self.registered.lock().await;
        if let Some(current) = registered.as_ref()
            && current.sensors == sensors
        {
            return Ok(current.sensor_ids.clone());
        }

        let mut sensor_ids = Vec::with_capacity(sensors.len());
        for sensor in sensors {
            let id = gateway
                .register_sensor(&SensorRegistration {
                    name: sensor.name.clone(),
                    physical_quantity: sensor.quantity.clone(),
                    unit: sensor.unit.clone(),
                })
                .await?;
            sensor_ids.push(id);
        }
        info!("📡 [MQTT] Registered {} sensors", sensor_ids.len());

        *registered = Some(Registered {
            sensors: sensors.to_vec(),
            sensor_ids: sensor_ids.clone(),
        });
        Ok(sensor_ids)
    }

    /// Forward one incoming message to the gateway
    pub async fn handle_message(
        &self,
        gateway: &dyn GatewayApi,
        topic: &str,
        payload: &[u8],
    ) -> PluginResult<()> {
        let config = self.config.get();
        let Some(action) = config.route(topic, payload) else {
            debug!("📡 [MQTT] Ignoring message on {}", topic);
            return Ok(());
        };

        match action {
            BridgeAction::SensorValue { index, value } => {
                let sensor_ids = self.sensor_ids(gateway, &config.sensors).await?;
                gateway
                    .set_sensor_values(&[SensorValue {
                        sensor_id: sensor_ids[index],
                        value,
                    }])
                    .await?;
            }
            BridgeAction::OutputState { output_id, on } => {
                self.device_states.lock().insert(output_id, on);
                gateway.set_output(output_id, on).await?;
            }
        }
        Ok(())
    }

    /// Forward queued messages in arrival order until the sender is dropped
    async fn forward_messages(&self, gateway: &dyn GatewayApi, mut rx: mpsc::Receiver<Publish>) {
        while let Some(publish) = rx.recv().await {
            if let Err(e) = self
                .handle_message(gateway, &publish.topic, &publish.payload)
                .await
            {
                warn!("⚠️ [MQTT] Failed to forward {}: {}", publish.topic, e);
            }
        }
    }

    async fn connection(
        &self,
        ctx: &PluginContext,
        config: &MqttBridgeConfig,
        config_rx: &mut tokio::sync::watch::Receiver<std::sync::Arc<MqttBridgeConfig>>,
    ) -> Disconnect {
        let mut shutdown = ctx.shutdown.clone();
        let (client, mut eventloop) = AsyncClient::new(Self::mqtt_options(config), REQUEST_CAPACITY);
        *self.client.lock() = Some(client.clone());
        info!(
            "📡 [MQTT] Connecting to {}:{}",
            config.broker_host, config.broker_port
        );

        // Gateway calls run beside the event loop so keep-alives are not held up
        let (forward_tx, forward_rx) = mpsc::channel(FORWARD_CAPACITY);
        let forward = self.forward_messages(ctx.gateway.as_ref(), forward_rx);
        tokio::pin!(forward);

        let reason = loop {
            tokio::select! {
                event = eventloop.poll() => match event {
                    Ok(Event::Incoming(Packet::ConnAck(_))) => {
                        info!("✅ [MQTT] Connected to {}", config.broker_host);
                        let filters: Vec<SubscribeFilter> = config
                            .subscriptions()
                            .into_iter()
                            .map(|topic| SubscribeFilter::new(topic, QoS::AtLeastOnce))
                            .collect();
                        if !filters.is_empty()
                            && let Err(e) = client.try_subscribe_many(filters)
                        {
                            error!("❌ [MQTT] Subscribe failed: {}", e);
                        }
                    }
                    Ok(Event::Incoming(Packet::Publish(publish))) => {
                        if let Err(e) = forward_tx.try_send(publish) {
                            warn!("⚠️ [MQTT] Gateway is behind, dropping message: {}", e);
                        }
                    }
                    Ok(_) => {}
                    Err(e) => break Disconnect::Failed(e),
                },
                // Pending while `forward_tx` is alive
                () = &mut forward => {}
                _ = config_rx.changed() => break Disconnect::Reconfigure,
                () = shutdown.wait() => break Disconnect::Shutdown,
            }
        };

        *self.client.lock() = None;
        if !matches!(reason, Disconnect::Failed(_)) {
            let _ = client.try_disconnect();
        }
        reason
    }
}

#[async_trait]
impl Plugin for MqttBridgePlugin {
    fn name(&self) -> &str {
        PLUGIN_NAME
    }

    fn version(&self) -> &str {
        env!("CARGO_PKG_VERSION")
    }

    fn config_description(&self) -> Vec<ConfigField> {
        config::config_description()
    }

    fn get_config(&self) -> PluginResult<Value> {
        self.config.to_json()
    }

    fn set_config(&self, config: Value) -> PluginResult<()> {
        let parsed: MqttBridgeConfig =
            parse_config_with(&self.config_description(), config, MqttBridgeConfig::validate)?;
        self.config.set(parsed);
        Ok(())
    }

    fn handle_event(&self, event: &GatewayEvent) {
        let GatewayEvent::OutputStatus { output_id, on } = *event else {
            return;
        };
        let Some(command) = self.command_for(output_id, on) else {
            return;
        };

        debug!("📡 [MQTT] {} <- {}", command.topic, command.payload);
        let topic = command.topic.clone();
        if let Err(e) = self.publish(command) {
            warn!("⚠️ [MQTT] Command for output {} on {} dropped: {}", output_id, topic, e);
        }
    }

    async fn run(&self, ctx: PluginContext) -> PluginResult<()> {
        let mut shutdown = ctx.shutdown.clone();
        let mut config_rx = self.config.subscribe();

        while !shutdown.is_shutdown() {
            let config = config_rx.borrow_and_update().clone();
            if config.broker_host.is_empty() {
                debug!("📡 [MQTT] No broker configured");
                tokio::select! {
                    _ = config_rx.changed() => continue,
                    () = shutdown.wait() => break,
                }
            }

            match self.connection(&ctx, &config, &mut config_rx).await {
                Disconnect::Shutdown => break,
                Disconnect::Reconfigure => {
                    info!("🔄 [MQTT] Configuration changed, reconnecting");
                    *self.registered.lock().await = None;
                }
                Disconnect::Failed(e) => {
                    error!(
                        "❌ [MQTT] Connection to {} lost: {}. Reconnecting in {:?}",
                        config.broker_host, e, RECONNECT_DELAY
                    );
                    if !shutdown.sleep(RECONNECT_DELAY).await {
                        break;
                    }
                }
            }
        }

        info!("📡 [MQTT] Bridge stopped");
        Ok(())
    }
}
