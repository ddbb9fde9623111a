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

use crate::types::Metric;
use parking_lot::Mutex;
use std::collections::VecDeque;
use tracing::warn;

pub const DEFAULT_METRIC_CAPACITY: usize = 1000;

/// Bounded metric buffer shared by all plugins.
///
/// When full, the oldest entries are dropped.
#[derive(Debug)]
pub struct MetricQueue {
    capacity: usize,
    items: Mutex<VecDeque<Metric>>,
}

impl MetricQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            items: Mutex::new(VecDeque::new()),
        }
    }

    pub fn push(&self, metric: Metric) {
        let mut items = self.items.lock();
        if items.len() >= self.capacity {
            items.pop_front();
            warn!("⚠️ [METRICS] Queue full ({}), dropped oldest metric", self.capacity);
        }
        items.push_back(metric);
    }

    /// Take everything currently queued
    pub fn drain(&self) -> Vec<Metric> {
        self.items.lock().drain(..).collect()
    }

    /// Put a failed batch back in front of newer metrics
    pub fn requeue_front(&self, batch: Vec<Metric>) {
        let mut items = self.items.lock();
        for metric in batch.into_iter().rev() {
            items.push_front(metric);
        }
        let mut dropped = 0;
        while items.len() > self.capacity {
            items.pop_front();
            dropped += 1;
        }
        if dropped > 0 {
            warn!("⚠️ [METRICS] Queue full, dropped {} oldest metrics", dropped);
        }
    }

    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }
}

impl Default for MetricQueue {
    fn default() -> Self {
        Self::new(DEFAULT_METRIC_CAPACITY)
    }
}
