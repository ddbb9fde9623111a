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

//! Polysun shutter plugin
//!
//! Translates the gateway's logical shutter states into relay commands on
//! an up/down output pair, one transition at a time.

mod controller;
mod plugin;
mod state;

pub use controller::{ShutterOutputs, ShutterTransition, TransitionQueue, apply_transition};
pub use plugin::{PLUGIN_NAME, PolysunConfig, PolysunPlugin};
pub use state::{Relay, RelayCommand, plan_transition};
