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

use crate::errors::{GatewayError, GatewayResult};
use crate::types::{Metric, PluginStatus, SensorRegistration, SensorValue};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use tracing::info;

/// Host-provided API that plugins push data through
#[async_trait]
pub trait GatewayApi: Send + Sync {
    /// Switch a gateway output on or off
    async fn set_output(&self, output_id: u32, on: bool) -> GatewayResult<()>;

    /// Register a sensor and return the gateway's id for it.
    /// Registering the same name twice returns the same id.
    async fn register_sensor(&self, registration: &SensorRegistration) -> GatewayResult<u32>;

    async fn set_sensor_values(&self, values: &[SensorValue]) -> GatewayResult<()>;

    async fn report_status(&self, status: &PluginStatus) -> GatewayResult<()>;

    async fn send_metrics(&self, metrics: &[Metric]) -> GatewayResult<()>;

    /// Name for logging
    fn name(&self) -> &str;
}

/// A call recorded by [`RecordingGateway`]
#[derive(Debug, Clone, PartialEq)]
pub enum GatewayCall {
    SetOutput { output_id: u32, on: bool },
    RegisterSensor(SensorRegistration),
    SetSensorValues(Vec<SensorValue>),
    ReportStatus(PluginStatus),
    SendMetrics(Vec<Metric>),
}

#[derive(Debug, Default)]
struct RecordingState {
    calls: Vec<GatewayCall>,
    sensor_ids: HashMap<String, u32>,
    outputs: HashMap<u32, bool>,
    failures_remaining: u32,
}

/// In-memory gateway that logs and records every call.
///
/// Used for `--dry-run` and as the gateway double in tests.
#[derive(Debug, Default)]
pub struct RecordingGateway {
    state: Mutex<RecordingState>,
}

impl RecordingGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `count` calls fail with an API error
    pub fn fail_next(&self, count: u32) {
        self.state.lock().failures_remaining = count;
    }

    pub fn calls(&self) -> Vec<GatewayCall> {
        self.state.lock().calls.clone()
    }

    /// Only the `set_output` calls, in order
    pub fn output_calls(&self) -> Vec<(u32, bool)> {
        self.state
            .lock()
            .calls
            .iter()
            .filter_map(|call| match call {
                GatewayCall::SetOutput { output_id, on } => Some((*output_id, *on)),
                _ => None,
            })
            .collect()
    }

    /// Last known state of an output
    pub fn output_state(&self, output_id: u32) -> Option<bool> {
        self.state.lock().outputs.get(&output_id).copied()
    }

    fn record(&self, call: GatewayCall) -> GatewayResult<()> {
        let mut state = self.state.lock();
        if state.failures_remaining > 0 {
            state.failures_remaining -= 1;
            return Err(GatewayError::ApiError {
                status: 503,
                message: "simulated failure".to_owned(),
            });
        }
        if let GatewayCall::SetOutput { output_id, on } = call {
            state.outputs.insert(output_id, on);
        }
        state.calls.push(call);
        Ok(())
    }
}

#[async_trait]
impl GatewayApi for RecordingGateway {
    async fn set_output(&self, output_id: u32, on: bool) -> GatewayResult<()> {
        info!("🧪 [DRY RUN] set_output({output_id}, {on})");
        self.record(GatewayCall::SetOutput { output_id, on })
    }

    async fn register_sensor(&self, registration: &SensorRegistration) -> GatewayResult<u32> {
        self.record(GatewayCall::RegisterSensor(registration.clone()))?;
        let mut state = self.state.lock();
        let next_id = u32::try_from(state.sensor_ids.len()).unwrap_or(u32::MAX);
        let id = *state
            .sensor_ids
            .entry(registration.name.clone())
            .or_insert(next_id);
        info!("🧪 [DRY RUN] register_sensor({}) -> {id}", registration.name);
        Ok(id)
    }

    async fn set_sensor_values(&self, values: &[SensorValue]) -> GatewayResult<()> {
        info!("🧪 [DRY RUN] set_sensor_values({} values)", values.len());
        self.record(GatewayCall::SetSensorValues(values.to_vec()))
    }

    async fn report_status(&self, status: &PluginStatus) -> GatewayResult<()> {
        info!(
            "🧪 [DRY RUN] report_status({}/{} = {})",
            status.plugin, status.device, status.status
        );
        self.record(GatewayCall::ReportStatus(status.clone()))
    }

    async fn send_metrics(&self, metrics: &[Metric]) -> GatewayResult<()> {
        info!("🧪 [DRY RUN] send_metrics({} metrics)", metrics.len());
        self.record(GatewayCall::SendMetrics(metrics.to_vec()))
    }

    fn name(&self) -> &str {
        "dry-run"
    }
}
