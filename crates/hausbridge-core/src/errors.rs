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

use crate::validation::ValidationResult;
use thiserror::Error;

/// Gateway API error types
#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Gateway API returned error status {status}: {message}")]
    ApiError { status: u16, message: String },

    #[error("Not found on gateway: {0}")]
    NotFound(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Authentication failed")]
    AuthenticationFailed,

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

pub type GatewayResult<T> = Result<T, GatewayError>;

/// Errors raised by plugins and the plugin host
#[derive(Error, Debug)]
pub enum PluginError {
    #[error("invalid configuration: {}", summarize(.0))]
    InvalidConfig(ValidationResult),

    #[error("unknown plugin: {0}")]
    UnknownPlugin(String),

    #[error("gateway call failed: {0}")]
    Gateway(#[from] GatewayError),

    #[error("device request failed: {0}")]
    Device(String),

    #[error("MQTT error: {0}")]
    Mqtt(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("config persistence error: {0}")]
    Io(#[from] std::io::Error),
}

pub type PluginResult<T> = Result<T, PluginError>;

fn summarize(result: &ValidationResult) -> String {
    result
        .errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_config_message_lists_fields() {
        let mut result = ValidationResult::success();
        result.add_error("shutters[0].up_output_id", "expected an integer");
        result.add_error("url", "required field is missing");

        let err = PluginError::InvalidConfig(result);
        assert_eq!(
            err.to_string(),
            "invalid configuration: shutters[0].up_output_id: expected an integer; url: required field is missing"
        );
    }
}
