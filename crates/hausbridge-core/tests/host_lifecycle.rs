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

//! Integration tests for the plugin host
//!
//! Covers: config set/persist/reload, event fan-out, task restart after
//! errors, and shutdown of running tasks.

use async_trait::async_trait;
use hausbridge_core::{
    ConfigCell, ConfigField, GatewayEvent, HostSettings, Plugin, PluginConfigStore,
    PluginContext, PluginError, PluginHost, PluginResult, RecordingGateway, parse_config,
};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use tempfile::TempDir;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct CounterConfig {
    #[serde(default)]
    label: String,
    #[serde(default)]
    step: u32,
}

/// Test plugin that fails its first `failures` runs, then idles until shutdown
#[derive(Debug)]
struct CounterPlugin {
    config: ConfigCell<CounterConfig>,
    runs: AtomicU32,
    failures: u32,
    events: Mutex<Vec<GatewayEvent>>,
}

impl CounterPlugin {
    fn new(failures: u32) -> Self {
        Self {
            config: ConfigCell::default(),
            runs: AtomicU32::new(0),
            failures,
            events: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl Plugin for CounterPlugin {
    fn name(&self) -> &str {
        "counter"
    }

    fn version(&self) -> &str {
        "1.0.0"
    }

    fn config_description(&self) -> Vec<ConfigField> {
        vec![
            ConfigField::str("label", "Label").required(),
            ConfigField::int("step", "Step"),
        ]
    }

    fn get_config(&self) -> PluginResult<Value> {
        self.config.to_json()
    }

    fn set_config(&self, config: Value) -> PluginResult<()> {
        let parsed: CounterConfig = parse_config(&self.config_description(), config)?;
        self.config.set(parsed);
        Ok(())
    }

    fn handle_event(&self, event: &GatewayEvent) {
        self.events.lock().push(event.clone());
    }

    async fn run(&self, mut ctx: PluginContext) -> PluginResult<()> {
        let run = self.runs.fetch_add(1, Ordering::SeqCst) + 1;
        if run <= self.failures {
            return Err(PluginError::Device(format!("run {run} failed")));
        }
        ctx.shutdown.wait().await;
        Ok(())
    }
}

fn fast_settings() -> HostSettings {
    HostSettings {
        metrics_flush_interval: Duration::from_millis(20),
        restart_delay: Duration::from_millis(10),
        shutdown_timeout: Duration::from_secs(1),
        ..HostSettings::default()
    }
}

#[tokio::test]
async fn test_set_config_persists_and_reloads() {
    let dir = TempDir::new().unwrap();
    let gateway = Arc::new(RecordingGateway::new());

    let mut host = PluginHost::new(gateway.clone(), fast_settings())
        .with_store(PluginConfigStore::new(dir.path()));
    host.register(Arc::new(CounterPlugin::new(0)));

    host.set_config("counter", json!({ "label": "kitchen", "step": 2 }))
        .unwrap();
    assert!(dir.path().join("counter.json").exists());

    // A fresh host picks the saved config up
    let mut restarted = PluginHost::new(gateway, fast_settings())
        .with_store(PluginConfigStore::new(dir.path()));
    restarted.register(Arc::new(CounterPlugin::new(0)));
    restarted.load_persisted_configs();

    let config = restarted.get_config("counter").unwrap();
    assert_eq!(config["label"], "kitchen");
    assert_eq!(config["step"], 2);
}

#[tokio::test]
async fn test_invalid_config_is_not_persisted() {
    let dir = TempDir::new().unwrap();
    let mut host = PluginHost::new(Arc::new(RecordingGateway::new()), fast_settings())
        .with_store(PluginConfigStore::new(dir.path()));
    host.register(Arc::new(CounterPlugin::new(0)));

    let result = host.set_config("counter", json!({ "step": "many" }));

    match result {
        Err(PluginError::InvalidConfig(validation)) => {
            let fields: Vec<&str> = validation.errors.iter().map(|e| e.field.as_str()).collect();
            assert_eq!(fields, vec!["label", "step"]);
        }
        other => panic!("unexpected result: {other:?}"),
    }
    assert!(!dir.path().join("counter.json").exists());
    assert_eq!(host.get_config("counter").unwrap()["label"], "");
}

#[tokio::test]
async fn test_rejected_config_keeps_previous_file() {
    let dir = TempDir::new().unwrap();
    let mut host = PluginHost::new(Arc::new(RecordingGateway::new()), fast_settings())
        .with_store(PluginConfigStore::new(dir.path()));
    host.register(Arc::new(CounterPlugin::new(0)));

    host.set_config("counter", json!({ "label": "hall", "step": 1 }))
        .unwrap();
    assert!(host.set_config("counter", json!({ "label": "" })).is_err());

    let stored = PluginConfigStore::new(dir.path()).load("counter").unwrap();
    assert_eq!(stored, Some(json!({ "label": "hall", "step": 1 })));
    assert_eq!(host.get_config("counter").unwrap()["label"], "hall");
}

#[tokio::test]
async fn test_unsaved_config_is_not_applied() {
    let dir = TempDir::new().unwrap();
    // A file where the store directory should be makes every save fail
    let blocked = dir.path().join("plugins");
    std::fs::write(&blocked, "").unwrap();

    let mut host = PluginHost::new(Arc::new(RecordingGateway::new()), fast_settings())
        .with_store(PluginConfigStore::new(&blocked));
    host.register(Arc::new(CounterPlugin::new(0)));

    let result = host.set_config("counter", json!({ "label": "kitchen" }));

    assert!(matches!(result, Err(PluginError::Io(_))), "{result:?}");
    assert_eq!(host.get_config("counter").unwrap()["label"], "");
}

#[tokio::test]
async fn test_invalid_persisted_config_keeps_defaults() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("counter.json"), r#"{"step": 3}"#).unwrap();

    let mut host = PluginHost::new(Arc::new(RecordingGateway::new()), fast_settings())
        .with_store(PluginConfigStore::new(dir.path()));
    host.register(Arc::new(CounterPlugin::new(0)));
    host.load_persisted_configs();

    assert_eq!(host.get_config("counter").unwrap()["step"], 0);
}

#[tokio::test]
async fn test_dispatch_reaches_every_plugin() {
    let plugin = Arc::new(CounterPlugin::new(0));
    let mut host = PluginHost::new(Arc::new(RecordingGateway::new()), fast_settings());
    host.register(plugin.clone());

    let event = GatewayEvent::OutputStatus {
        output_id: 4,
        on: true,
    };
    host.dispatch(&event);

    assert_eq!(plugin.events.lock().as_slice(), &[event]);
}

#[tokio::test]
async fn test_failed_task_is_restarted() {
    let plugin = Arc::new(CounterPlugin::new(2));
    let mut host = PluginHost::new(Arc::new(RecordingGateway::new()), fast_settings());
    host.register(plugin.clone());
    host.start();

    tokio::time::timeout(Duration::from_secs(2), async {
        while plugin.runs.load(Ordering::SeqCst) < 3 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();

    host.shutdown().await;
    assert!(host.is_shutdown());
    assert_eq!(plugin.runs.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_metrics_flushed_in_background() {
    let gateway = Arc::new(RecordingGateway::new());
    let host = PluginHost::new(gateway.clone(), fast_settings());
    host.start();

    host.metrics().push(hausbridge_core::Metric {
        source: "counter".to_owned(),
        metric_type: "count".to_owned(),
        timestamp: chrono::Utc::now(),
        tags: Default::default(),
        values: [("n".to_owned(), 1.0)].into_iter().collect(),
    });

    tokio::time::timeout(Duration::from_secs(2), async {
        while !host.metrics().is_empty() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();

    host.shutdown().await;
    assert_eq!(gateway.calls().len(), 1);
}

#[test]
fn test_plugin_infos() {
    let mut host = PluginHost::new(Arc::new(RecordingGateway::new()), HostSettings::default());
    host.register(Arc::new(CounterPlugin::new(0)));

    let infos = host.plugin_infos();
    assert_eq!(infos.len(), 1);
    assert_eq!(infos[0].name, "counter");
    assert_eq!(infos[0].version, "1.0.0");
    assert!(host.config_description("counter").unwrap().len() == 2);
}
