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

//! On-disk persistence of plugin configurations, one JSON file per plugin.

use crate::errors::PluginResult;
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::debug;

#[derive(Debug, Clone)]
pub struct PluginConfigStore {
    dir: PathBuf,
}

impl PluginConfigStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, plugin: &str) -> PathBuf {
        self.dir.join(format!("{plugin}.json"))
    }

    /// Load a persisted config; `None` if nothing was saved yet
    pub fn load(&self, plugin: &str) -> PluginResult<Option<Value>> {
        let path = self.path_for(plugin);
        if !path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(&path)?;
        Ok(Some(serde_json::from_str(&content)?))
    }

    pub fn save(&self, plugin: &str, config: &Value) -> PluginResult<()> {
        std::fs::create_dir_all(&self.dir)?;
        let path = self.path_for(plugin);
        let temp_path = path.with_extension("tmp");
        let content = serde_json::to_string_pretty(config)?;

        // Atomic write
        std::fs::write(&temp_path, content)?;
        std::fs::rename(&temp_path, &path)?;

        debug!("💾 Saved config for plugin '{}' to {}", plugin, path.display());
        Ok(())
    }

    /// Delete a persisted config; a missing file is not an error
    pub fn remove(&self, plugin: &str) -> PluginResult<()> {
        match std::fs::remove_file(self.path_for(plugin)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
