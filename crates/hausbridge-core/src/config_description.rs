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

//! Plugin configuration descriptions.
//!
//! Every plugin publishes a list of [`ConfigField`]s through
//! `get_config_description`. The host validates incoming `set_config`
//! payloads against that list before the plugin deserializes them.

use crate::validation::ValidationResult;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Type of a configuration field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FieldType {
    Str,
    /// Like `Str`, but masked in user interfaces
    Password,
    Int,
    Float,
    Bool,
    /// List of integers, e.g. sensor ids
    IntList,
    /// One of a fixed set of string values
    Enum { choices: Vec<String> },
    /// Nested group of fields; `repeat` turns it into a list of groups
    Section {
        #[serde(default)]
        repeat: bool,
        content: Vec<ConfigField>,
    },
}

/// A single configuration field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigField {
    pub name: String,
    #[serde(flatten)]
    pub field_type: FieldType,
    pub description: String,
    /// Missing required fields are rejected; optional ones fall back to defaults
    #[serde(default)]
    pub required: bool,
    /// Upper bound for `int` and `int_list` values (which are never negative)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<u64>,
}

/// Bound of integer fields unless overridden with [`ConfigField::max_value`]
pub const DEFAULT_INT_MAX: u64 = 4_294_967_295;

impl ConfigField {
    fn new(name: &str, field_type: FieldType, description: &str) -> Self {
        Self {
            name: name.to_owned(),
            field_type,
            description: description.to_owned(),
            required: false,
            max: None,
        }
    }

    pub fn str(name: &str, description: &str) -> Self {
        Self::new(name, FieldType::Str, description)
    }

    pub fn password(name: &str, description: &str) -> Self {
        Self::new(name, FieldType::Password, description)
    }

    pub fn int(name: &str, description: &str) -> Self {
        Self::new(name, FieldType::Int, description).max_value(DEFAULT_INT_MAX)
    }

    pub fn float(name: &str, description: &str) -> Self {
        Self::new(name, FieldType::Float, description)
    }

    pub fn bool(name: &str, description: &str) -> Self {
        Self::new(name, FieldType::Bool, description)
    }

    pub fn int_list(name: &str, description: &str) -> Self {
        Self::new(name, FieldType::IntList, description).max_value(DEFAULT_INT_MAX)
    }

    pub fn choice(name: &str, choices: &[&str], description: &str) -> Self {
        Self::new(
            name,
            FieldType::Enum {
                choices: choices.iter().map(|c| (*c).to_owned()).collect(),
            },
            description,
        )
    }

    /// A list of sections (e.g. one entry per shutter)
    pub fn repeated(name: &str, content: Vec<ConfigField>, description: &str) -> Self {
        Self::new(
            name,
            FieldType::Section {
                repeat: true,
                content,
            },
            description,
        )
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn max_value(mut self, max: u64) -> Self {
        self.max = Some(max);
        self
    }
}

/// Validate a JSON config against a plugin's description.
///
/// Unknown keys produce warnings, everything else is an error.
pub fn validate_config(description: &[ConfigField], config: &Value) -> ValidationResult {
    let mut result = ValidationResult::success();
    validate_object(description, config, "", &mut result);
    result
}

fn join_path(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_owned()
    } else {
        format!("{prefix}.{name}")
    }
}

fn validate_object(
    fields: &[ConfigField],
    value: &Value,
    prefix: &str,
    result: &mut ValidationResult,
) {
    let Some(object) = value.as_object() else {
        let field = if prefix.is_empty() { "config" } else { prefix };
        result.add_error(field, "expected an object");
        return;
    };

    for field in fields {
        let path = join_path(prefix, &field.name);
        match object.get(&field.name) {
            None | Some(Value::Null) => {
                if field.required {
                    result.add_error(path, "required field is missing");
                }
            }
            Some(value) => validate_value(field, value, &path, result),
        }
    }

    for key in object.keys() {
        if !fields.iter().any(|f| &f.name == key) {
            result.add_warning(join_path(prefix, key), "unknown field is ignored");
        }
    }
}

fn validate_value(field: &ConfigField, value: &Value, path: &str, result: &mut ValidationResult) {
    match &field.field_type {
        FieldType::Str | FieldType::Password => {
            if !value.is_string() {
                result.add_error(path, "expected a string");
            } else if field.required && value.as_str().is_some_and(|s| s.trim().is_empty()) {
                result.add_error(path, "must not be empty");
            }
        }
        FieldType::Int => check_int(value, field.max, path, result),
        FieldType::Float => {
            if !value.is_number() {
                result.add_error(path, "expected a number");
            }
        }
        FieldType::Bool => {
            if !value.is_boolean() {
                result.add_error(path, "expected true or false");
            }
        }
        FieldType::IntList => match value.as_array() {
            Some(items) => {
                for (idx, item) in items.iter().enumerate() {
                    check_int(item, field.max, &format!("{path}[{idx}]"), result);
                }
            }
            None => result.add_error(path, "expected a list"),
        },
        FieldType::Enum { choices } => match value.as_str() {
            Some(s) if choices.iter().any(|c| c == s) => {}
            Some(s) => result.add_error(
                path,
                format!("'{s}' is not one of: {}", choices.join(", ")),
            ),
            None => result.add_error(path, "expected a string"),
        },
        FieldType::Section {
            repeat: true,
            content,
        } => match value.as_array() {
            Some(items) => {
                for (idx, item) in items.iter().enumerate() {
                    validate_object(content, item, &format!("{path}[{idx}]"), result);
                }
            }
            None => result.add_error(path, "expected a list"),
        },
        FieldType::Section {
            repeat: false,
            content,
        } => validate_object(content, value, path, result),
    }
}

fn check_int(value: &Value, max: Option<u64>, path: &str, result: &mut ValidationResult) {
    match value.as_u64() {
        Some(n) => {
            if let Some(max) = max
                && n > max
            {
                result.add_error(path, format!("must be at most {max}"));
            }
        }
        None if value.is_i64() => result.add_error(path, "must not be negative"),
        None => result.add_error(path, "expected an integer"),
    }
}
