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

//! Plugin host runtime: registration, config entry points, background
//! tasks with restart, metric flushing and graceful shutdown.

use crate::config_description::ConfigField;
use crate::errors::{PluginError, PluginResult};
use crate::gateway::GatewayApi;
use crate::metrics::{DEFAULT_METRIC_CAPACITY, MetricQueue};
use crate::plugin::{Plugin, PluginContext, PluginInfo};
use crate::shutdown::{self, Shutdown, ShutdownTrigger};
use crate::store::PluginConfigStore;
use crate::types::GatewayEvent;
use parking_lot::Mutex;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// Timing knobs of the host
#[derive(Debug, Clone)]
pub struct HostSettings {
    pub metrics_flush_interval: Duration,
    pub metric_capacity: usize,
    /// Delay before a failed background task is restarted
    pub restart_delay: Duration,
    /// How long `shutdown` waits for tasks before aborting them
    pub shutdown_timeout: Duration,
}

impl Default for HostSettings {
    fn default() -> Self {
        Self {
            metrics_flush_interval: Duration::from_secs(30),
            metric_capacity: DEFAULT_METRIC_CAPACITY,
            restart_delay: Duration::from_secs(5),
            shutdown_timeout: Duration::from_secs(5),
        }
    }
}

/// Owns the registered plugins and their background tasks
pub struct PluginHost {
    gateway: Arc<dyn GatewayApi>,
    plugins: Vec<Arc<dyn Plugin>>,
    store: Option<PluginConfigStore>,
    metrics: Arc<MetricQueue>,
    settings: HostSettings,
    trigger: ShutdownTrigger,
    shutdown: Shutdown,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl fmt::Debug for PluginHost {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginHost")
            .field("gateway", &self.gateway.name())
            .field("plugins", &self.plugin_names())
            .field("store", &self.store)
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl PluginHost {
    pub fn new(gateway: Arc<dyn GatewayApi>, settings: HostSettings) -> Self {
        let (trigger, shutdown) = shutdown::channel();
        Self {
            gateway,
            plugins: Vec::new(),
            store: None,
            metrics: Arc::new(MetricQueue::new(settings.metric_capacity)),
            settings,
            trigger,
            shutdown,
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Persist configs set through `set_config` in this store
    #[must_use]
    pub fn with_store(mut self, store: PluginConfigStore) -> Self {
        self.store = Some(store);
        self
    }

    pub fn register(&mut self, plugin: Arc<dyn Plugin>) {
        info!(
            "🔌 Registering plugin: {} v{}",
            plugin.name(),
            plugin.version()
        );
        self.plugins.push(plugin);
    }

    pub fn metrics(&self) -> &Arc<MetricQueue> {
        &self.metrics
    }

    pub fn plugin(&self, name: &str) -> Option<&Arc<dyn Plugin>> {
        self.plugins.iter().find(|p| p.name() == name)
    }

    fn require(&self, name: &str) -> PluginResult<&Arc<dyn Plugin>> {
        self.plugin(name)
            .ok_or_else(|| PluginError::UnknownPlugin(name.to_owned()))
    }

    pub fn plugin_names(&self) -> Vec<&str> {
        self.plugins.iter().map(|p| p.name()).collect()
    }

    pub fn plugin_infos(&self) -> Vec<PluginInfo> {
        self.plugins
            .iter()
            .map(|p| PluginInfo {
                name: p.name().to_owned(),
                version: p.version().to_owned(),
            })
            .collect()
    }

    pub fn config_description(&self, name: &str) -> PluginResult<Vec<ConfigField>> {
        Ok(self.require(name)?.config_description())
    }

    pub fn get_config(&self, name: &str) -> PluginResult<Value> {
        self.require(name)?.get_config()
    }

    /// Persist a config and apply it to a plugin.
    ///
    /// A config that cannot be saved is never applied. A config the plugin
    /// rejects leaves the previously stored file in place.
    pub fn set_config(&self, name: &str, config: Value) -> PluginResult<()> {
        let plugin = self.require(name)?;

        let Some(store) = &self.store else {
            plugin.set_config(config)?;
            info!("✅ Applied new config for plugin '{}'", name);
            return Ok(());
        };

        let previous = store.load(name).unwrap_or_else(|e| {
            warn!("⚠️ Stored config for '{}' is unreadable: {}", name, e);
            None
        });
        store.save(name, &config)?;

        if let Err(e) = plugin.set_config(config) {
            let restored = match previous {
                Some(previous) => store.save(name, &previous),
                None => store.remove(name),
            };
            if let Err(restore_err) = restored {
                error!(
                    "❌ Failed to restore stored config for '{}': {}",
                    name, restore_err
                );
            }
            return Err(e);
        }

        info!("✅ Applied and saved new config for plugin '{}'", name);
        Ok(())
    }

    /// Apply configs saved by a previous run. Invalid ones are logged and skipped.
    pub fn load_persisted_configs(&self) {
        let Some(store) = &self.store else {
            return;
        };

        for plugin in &self.plugins {
            match store.load(plugin.name()) {
                Ok(Some(config)) => match plugin.set_config(config) {
                    Ok(()) => info!("📂 Loaded persisted config for '{}'", plugin.name()),
                    Err(e) => error!(
                        "❌ Persisted config for '{}' rejected, keeping defaults: {}",
                        plugin.name(),
                        e
                    ),
                },
                Ok(None) => debug!("No persisted config for '{}'", plugin.name()),
                Err(e) => error!(
                    "❌ Failed to read persisted config for '{}': {}",
                    plugin.name(),
                    e
                ),
            }
        }
    }

    /// Fan a gateway event out to every plugin
    pub fn dispatch(&self, event: &GatewayEvent) {
        debug!("📨 Dispatching event {:?}", event);
        for plugin in &self.plugins {
            plugin.handle_event(event);
        }
    }

    fn context(&self) -> PluginContext {
        PluginContext {
            gateway: self.gateway.clone(),
            shutdown: self.trigger.subscribe(),
            metrics: self.metrics.clone(),
        }
    }

    /// Spawn every plugin's background task and the metric flush task
    pub fn start(&self) {
        let mut tasks = self.tasks.lock();

        for plugin in &self.plugins {
            let plugin = plugin.clone();
            let ctx = self.context();
            let restart_delay = self.settings.restart_delay;
            tasks.push(tokio::spawn(supervise(plugin, ctx, restart_delay)));
        }

        tasks.push(tokio::spawn(flush_loop(
            self.gateway.clone(),
            self.metrics.clone(),
            self.settings.metrics_flush_interval,
            self.shutdown.clone(),
        )));

        info!("🚀 Started {} plugin tasks", self.plugins.len());
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown.is_shutdown()
    }

    /// Signal shutdown and wait for tasks, aborting those that overrun
    pub async fn shutdown(&self) {
        info!("🛑 Shutting down plugin host");
        self.trigger.fire();

        let handles: Vec<JoinHandle<()>> = self.tasks.lock().drain(..).collect();
        let deadline = Instant::now() + self.settings.shutdown_timeout;

        for mut handle in handles {
            if tokio::time::timeout_at(deadline, &mut handle).await.is_err() {
                warn!("⚠️ Task did not stop in time, aborting");
                handle.abort();
            }
        }
        info!("✅ Plugin host stopped");
    }
}

/// Run a plugin task, restarting it after errors until shutdown
async fn supervise(plugin: Arc<dyn Plugin>, ctx: PluginContext, restart_delay: Duration) {
    let mut shutdown = ctx.shutdown.clone();
    loop {
        match plugin.run(ctx.clone()).await {
            Ok(()) => {
                debug!("Plugin '{}' task finished", plugin.name());
                break;
            }
            Err(e) => {
                error!("❌ Plugin '{}' task failed: {}", plugin.name(), e);
                if !shutdown.sleep(restart_delay).await {
                    break;
                }
                warn!("🔄 Restarting plugin '{}'", plugin.name());
            }
        }
    }
}

async fn flush_loop(
    gateway: Arc<dyn GatewayApi>,
    metrics: Arc<MetricQueue>,
    interval: Duration,
    mut shutdown: Shutdown,
) {
    while shutdown.sleep(interval).await {
        flush_metrics(gateway.as_ref(), &metrics).await;
    }
    // Best effort on the way out
    flush_metrics(gateway.as_ref(), &metrics).await;
}

/// Send queued metrics; a failed batch goes back to the queue
pub async fn flush_metrics(gateway: &dyn GatewayApi, metrics: &MetricQueue) {
    let batch = metrics.drain();
    if batch.is_empty() {
        return;
    }

    match gateway.send_metrics(&batch).await {
        Ok(()) => debug!("📈 Flushed {} metrics", batch.len()),
        Err(e) => {
            warn!("⚠️ Metric flush failed ({} queued): {}", batch.len(), e);
            metrics.requeue_front(batch);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::{GatewayCall, RecordingGateway};
    use crate::types::Metric;
    use chrono::Utc;
    use std::collections::BTreeMap;

    fn metric() -> Metric {
        Metric {
            source: "energy_meter".to_owned(),
            metric_type: "energy".to_owned(),
            timestamp: Utc::now(),
            tags: BTreeMap::new(),
            values: BTreeMap::from([("power".to_owned(), 1.5)]),
        }
    }

    #[tokio::test]
    async fn test_flush_requeues_on_failure() {
        let gateway = RecordingGateway::new();
        let queue = MetricQueue::new(10);
        queue.push(metric());

        gateway.fail_next(1);
        flush_metrics(&gateway, &queue).await;
        assert_eq!(queue.len(), 1);

        flush_metrics(&gateway, &queue).await;
        assert!(queue.is_empty());
        assert!(matches!(
            gateway.calls().as_slice(),
            [GatewayCall::SendMetrics(batch)] if batch.len() == 1
        ));
    }

    #[tokio::test]
    async fn test_unknown_plugin() {
        let host = PluginHost::new(Arc::new(RecordingGateway::new()), HostSettings::default());
        assert!(matches!(
            host.get_config("nope"),
            Err(PluginError::UnknownPlugin(name)) if name == "nope"
        ));
    }
}
