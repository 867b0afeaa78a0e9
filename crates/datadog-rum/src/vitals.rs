// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Read-only vital snapshots (CPU ticks, memory, frame rate).

use std::sync::{Arc, Mutex, PoisonError};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VitalInfo {
    pub sample_count: u64,
    pub min_value: f64,
    pub max_value: f64,
    pub mean_value: f64,
}

impl VitalInfo {
    pub const EMPTY: VitalInfo = VitalInfo {
        sample_count: 0,
        min_value: f64::MAX,
        max_value: f64::MIN,
        mean_value: 0.0,
    };

    /// Adds one sample, keeping a running mean.
    #[must_use]
    pub fn with_sample(&self, value: f64) -> Self {
        let count = self.sample_count + 1;
        #[allow(clippy::cast_precision_loss)]
        let mean = (value + self.sample_count as f64 * self.mean_value) / count as f64;
        VitalInfo {
            sample_count: count,
            min_value: self.min_value.min(value),
            max_value: self.max_value.max(value),
            mean_value: mean,
        }
    }
}

pub trait VitalMonitor: Send + Sync {
    /// Latest aggregated reading, if any sample was taken.
    fn last_known(&self) -> Option<VitalInfo>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoOpVitalMonitor;

impl VitalMonitor for NoOpVitalMonitor {
    fn last_known(&self) -> Option<VitalInfo> {
        None
    }
}

/// Monitor fed by the host through [`AggregatingVitalMonitor::record`].
#[derive(Debug, Default)]
pub struct AggregatingVitalMonitor {
    info: Mutex<Option<VitalInfo>>,
}

impl AggregatingVitalMonitor {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, value: f64) {
        let mut info = self.info.lock().unwrap_or_else(PoisonError::into_inner);
        *info = Some(info.unwrap_or(VitalInfo::EMPTY).with_sample(value));
    }
}

impl VitalMonitor for AggregatingVitalMonitor {
    fn last_known(&self) -> Option<VitalInfo> {
        *self.info.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// The three monitors a view reads.
#[derive(Clone)]
pub struct VitalMonitors {
    pub cpu: Arc<dyn VitalMonitor>,
    pub memory: Arc<dyn VitalMonitor>,
    pub frame_rate: Arc<dyn VitalMonitor>,
}

impl VitalMonitors {
    #[must_use]
    pub fn no_op() -> Self {
        VitalMonitors {
            cpu: Arc::new(NoOpVitalMonitor),
            memory: Arc::new(NoOpVitalMonitor),
            frame_rate: Arc::new(NoOpVitalMonitor),
        }
    }
}

impl std::fmt::Debug for VitalMonitors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VitalMonitors").finish_non_exhaustive()
    }
}
