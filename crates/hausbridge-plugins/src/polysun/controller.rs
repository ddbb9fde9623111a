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

use super::state::{Relay, plan_transition};
use hausbridge_core::{GatewayApi, GatewayResult, ShutterStatus};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tokio::sync::Notify;
use tracing::debug;

/// Relay outputs wired to one shutter
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShutterOutputs {
    pub shutter_id: u32,
    pub up_output_id: u32,
    pub down_output_id: u32,
}

impl ShutterOutputs {
    pub fn output_for(&self, relay: Relay) -> u32 {
        match relay {
            Relay::Up => self.up_output_id,
            Relay::Down => self.down_output_id,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShutterTransition {
    pub shutter_id: u32,
    pub from: ShutterStatus,
    pub to: ShutterStatus,
}

/// Pending transitions, drained by a single worker
#[derive(Debug, Default)]
pub struct TransitionQueue {
    items: Mutex<VecDeque<ShutterTransition>>,
    notify: Notify,
}

impl TransitionQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, transition: ShutterTransition) {
        self.items.lock().push_back(transition);
        self.notify.notify_one();
    }

    /// Put a transition back so it is retried before anything newer
    pub fn push_front(&self, transition: ShutterTransition) {
        self.items.lock().push_front(transition);
    }

    pub fn pop(&self) -> Option<ShutterTransition> {
        self.items.lock().pop_front()
    }

    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }

    /// Resolves on the next push
    pub async fn notified(&self) {
        self.notify.notified().await;
    }
}

/// Drive the relays of one shutter through a transition
pub async fn apply_transition(
    gateway: &dyn GatewayApi,
    outputs: &ShutterOutputs,
    transition: ShutterTransition,
) -> GatewayResult<()> {
    debug!(
        "🪟 [POLYSUN] Shutter {}: {} -> {}",
        transition.shutter_id, transition.from, transition.to
    );
    for command in plan_transition(transition.from, transition.to) {
        gateway
            .set_output(outputs.output_for(command.relay), command.on)
            .await?;
    }
    Ok(())
}
