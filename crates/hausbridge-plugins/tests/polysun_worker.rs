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

//! Polysun transition worker driven through the plugin host

use hausbridge_core::{
    GatewayEvent, HostSettings, Plugin, PluginHost, RecordingGateway, ShutterStatus,
};
use hausbridge_plugins::PolysunPlugin;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

fn shutter(state: ShutterStatus) -> GatewayEvent {
    GatewayEvent::ShutterChange {
        shutter_id: 1,
        state,
    }
}

async fn wait_for_outputs(gateway: &RecordingGateway, count: usize) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while gateway.output_calls().len() < count {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();
}

fn host_with(gateway: Arc<RecordingGateway>, plugin: Arc<PolysunPlugin>) -> PluginHost {
    plugin
        .set_config(json!({
            "shutters": [{ "shutter_id": 1, "up_output_id": 10, "down_output_id": 11 }]
        }))
        .unwrap();
    let mut host = PluginHost::new(gateway, HostSettings::default());
    host.register(plugin);
    host
}

#[tokio::test]
async fn test_move_then_stop() {
    let gateway = Arc::new(RecordingGateway::new());
    let plugin = Arc::new(PolysunPlugin::new());
    let host = host_with(gateway.clone(), plugin.clone());
    host.start();

    host.dispatch(&shutter(ShutterStatus::GoingDown));
    host.dispatch(&shutter(ShutterStatus::Stopped));
    wait_for_outputs(&gateway, 7).await;
    host.shutdown().await;

    assert_eq!(
        gateway.output_calls(),
        vec![
            (10, false),
            (11, false),
            (11, true),
            (10, false),
            (11, false),
            (10, true),
            (10, false),
        ]
    );
    assert_eq!(gateway.output_state(10), Some(false));
    assert_eq!(gateway.output_state(11), Some(false));
}

#[tokio::test]
async fn test_failed_transition_is_retried() {
    let gateway = Arc::new(RecordingGateway::new());
    let plugin = Arc::new(PolysunPlugin::new());
    let host = host_with(gateway.clone(), plugin.clone());

    gateway.fail_next(1);
    host.dispatch(&shutter(ShutterStatus::GoingUp));
    host.start();

    wait_for_outputs(&gateway, 3).await;
    host.shutdown().await;

    assert_eq!(gateway.output_calls(), vec![(10, false), (11, false), (10, true)]);
    assert!(plugin.queue().is_empty());
}

#[tokio::test]
async fn test_unconfigured_shutter_is_dropped() {
    let gateway = Arc::new(RecordingGateway::new());
    let plugin = Arc::new(PolysunPlugin::new());
    let host = host_with(gateway.clone(), plugin.clone());
    host.start();

    host.dispatch(&GatewayEvent::ShutterChange {
        shutter_id: 2,
        state: ShutterStatus::GoingUp,
    });
    host.dispatch(&shutter(ShutterStatus::GoingUp));
    wait_for_outputs(&gateway, 3).await;
    host.shutdown().await;

    assert_eq!(gateway.output_calls(), vec![(10, false), (11, false), (10, true)]);
}
