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

//! HausBridge Plugins
//!
//! Integration plugins for the home-automation gateway:
//!
//! - **polysun**: shutter control through up/down relay outputs
//! - **ventilation**: humidity-triggered fan boost
//! - **energy_meter**: HTTP/REST meter poller
//! - **mqtt_bridge**: MQTT sensor and device bridge

pub mod energy_meter;
pub mod mqtt_bridge;
pub mod polysun;
pub mod ventilation;

pub use energy_meter::EnergyMeterPlugin;
pub use mqtt_bridge::MqttBridgePlugin;
pub use polysun::PolysunPlugin;
pub use ventilation::VentilationPlugin;

use hausbridge_core::{Plugin, PluginError};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Plugins shipped with HausBridge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PluginKind {
    Polysun,
    Ventilation,
    EnergyMeter,
    MqttBridge,
}

impl PluginKind {
    /// Name used in configuration and the host API
    pub fn config_name(&self) -> &'static str {
        match self {
            Self::Polysun => polysun::PLUGIN_NAME,
            Self::Ventilation => ventilation::PLUGIN_NAME,
            Self::EnergyMeter => energy_meter::PLUGIN_NAME,
            Self::MqttBridge => mqtt_bridge::PLUGIN_NAME,
        }
    }

    pub fn all() -> &'static [PluginKind] {
        &[
            Self::Polysun,
            Self::Ventilation,
            Self::EnergyMeter,
            Self::MqttBridge,
        ]
    }
}

impl fmt::Display for PluginKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.config_name())
    }
}

impl FromStr for PluginKind {
    type Err = PluginError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase().replace('-', "_");
        Self::all()
            .iter()
            .copied()
            .find(|kind| kind.config_name() == normalized)
            .ok_or_else(|| PluginError::UnknownPlugin(s.to_owned()))
    }
}

/// Factory function to create a plugin instance of the given kind
pub fn create_plugin(kind: PluginKind) -> Arc<dyn Plugin> {
    match kind {
        PluginKind::Polysun => Arc::new(PolysunPlugin::new()),
        PluginKind::Ventilation => Arc::new(VentilationPlugin::new()),
        PluginKind::EnergyMeter => Arc::new(EnergyMeterPlugin::new()),
        PluginKind::MqttBridge => Arc::new(MqttBridgePlugin::new()),
    }
}
