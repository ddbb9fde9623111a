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

//! Relay plan for a shutter state transition.
//!
//! A shutter is driven by two relay outputs emulating push buttons. The
//! matching relay is held on while the shutter travels; an explicit stop is a
//! short pulse on the opposite relay.

use hausbridge_core::{ShutterDirection, ShutterStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Relay {
    Up,
    Down,
}

impl From<ShutterDirection> for Relay {
    fn from(direction: ShutterDirection) -> Self {
        match direction {
            ShutterDirection::Up => Self::Up,
            ShutterDirection::Down => Self::Down,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelayCommand {
    pub relay: Relay,
    pub on: bool,
}

impl RelayCommand {
    pub fn on(relay: Relay) -> Self {
        Self { relay, on: true }
    }

    pub fn off(relay: Relay) -> Self {
        Self { relay, on: false }
    }
}

/// Commands that move the relays from `from` to `to`, in order.
///
/// Every non-empty plan starts by switching both relays off.
pub fn plan_transition(from: ShutterStatus, to: ShutterStatus) -> Vec<RelayCommand> {
    if from == to {
        return Vec::new();
    }

    let mut commands = vec![RelayCommand::off(Relay::Up), RelayCommand::off(Relay::Down)];

    // Reversal: the shutter counts as stopped before the new direction
    let from = if from.is_moving() && to.is_moving() {
        ShutterStatus::Stopped
    } else {
        from
    };

    match to {
        ShutterStatus::GoingUp => commands.push(RelayCommand::on(Relay::Up)),
        ShutterStatus::GoingDown => commands.push(RelayCommand::on(Relay::Down)),
        ShutterStatus::Up | ShutterStatus::Down => {}
        ShutterStatus::Stopped => {
            if let Some(direction) = from.direction() {
                let relay = Relay::from(direction.opposite());
                commands.push(RelayCommand::on(relay));
                commands.push(RelayCommand::off(relay));
            }
        }
    }

    commands
}
