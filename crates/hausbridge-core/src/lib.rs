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

//! HausBridge Core
//!
//! Host contract shared by all HausBridge plugins:
//!
//! - **Gateway API**: [`GatewayApi`] trait, the REST [`HttpGatewayClient`]
//!   and the in-memory [`RecordingGateway`] used for dry runs
//! - **Plugin contract**: [`Plugin`] trait, config descriptions and validation
//! - **Runtime**: [`PluginHost`] with task supervision, metric flushing
//!   and config persistence

pub mod client;
pub mod config_description;
pub mod errors;
pub mod gateway;
pub mod host;
pub mod metrics;
pub mod plugin;
pub mod shutdown;
pub mod store;
pub mod types;
pub mod validation;

pub use client::HttpGatewayClient;
pub use config_description::{ConfigField, FieldType, validate_config};
pub use errors::{GatewayError, GatewayResult, PluginError, PluginResult};
pub use gateway::{GatewayApi, GatewayCall, RecordingGateway};
pub use host::{HostSettings, PluginHost};
pub use metrics::MetricQueue;
pub use plugin::{
    ConfigCell, Plugin, PluginContext, PluginInfo, parse_config, parse_config_with,
};
pub use shutdown::Shutdown;
pub use store::PluginConfigStore;
pub use types::*;
pub use validation::{ValidationIssue, ValidationResult, ValidationSeverity};
