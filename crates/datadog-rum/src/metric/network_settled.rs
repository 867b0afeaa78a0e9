// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Time for the initial network activity of a view to settle.
//!
//! Resources started shortly after a view was created are considered part of
//! its initial load. The metric is the time between the view start and the
//! end of the last of those resources, available once all of them stopped.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use tracing::debug;

use crate::time::NANOS_PER_MILLI;

/// Default window after the view start in which a resource counts as initial.
pub const DEFAULT_INITIAL_RESOURCE_WINDOW_NS: i64 = 100 * NANOS_PER_MILLI;

/// Decides whether a resource belongs to the initial load of a view.
pub trait InitialResourceIdentifier: Send + Sync {
    fn validate(&self, view_start_nanos: i64, resource_start_nanos: i64) -> bool;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeBasedInitialResourceIdentifier {
    window_ns: i64,
}

impl TimeBasedInitialResourceIdentifier {
    #[must_use]
    pub const fn new(window_ns: i64) -> Self {
        TimeBasedInitialResourceIdentifier { window_ns }
    }
}

impl Default for TimeBasedInitialResourceIdentifier {
    fn default() -> Self {
        Self::new(DEFAULT_INITIAL_RESOURCE_WINDOW_NS)
    }
}

impl InitialResourceIdentifier for TimeBasedInitialResourceIdentifier {
    fn validate(&self, view_start_nanos: i64, resource_start_nanos: i64) -> bool {
        let delay = resource_start_nanos - view_start_nanos;
        (0..=self.window_ns).contains(&delay)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoValueReason {
    NoInitialResources,
    UnknownResolution,
}

#[derive(Debug, Default)]
struct State {
    view_start_nanos: Option<i64>,
    view_stopped: bool,
    pending: HashMap<String, i64>,
    last_end_nanos: Option<i64>,
    initial_count: usize,
    resolved: Option<i64>,
}

/// One resolver per view.
pub struct NetworkSettledMetricResolver {
    identifier: Arc<dyn InitialResourceIdentifier>,
    state: Mutex<State>,
}

impl std::fmt::Debug for NetworkSettledMetricResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NetworkSettledMetricResolver")
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl Default for NetworkSettledMetricResolver {
    fn default() -> Self {
        Self::new(Arc::new(TimeBasedInitialResourceIdentifier::default()))
    }
}

impl NetworkSettledMetricResolver {
    #[must_use]
    pub fn new(identifier: Arc<dyn InitialResourceIdentifier>) -> Self {
        NetworkSettledMetricResolver {
            identifier,
            state: Mutex::new(State::default()),
        }
    }

    pub fn view_was_created(&self, start_nanos: i64) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        *state = State {
            view_start_nanos: Some(start_nanos),
            ..State::default()
        };
    }

    pub fn resource_was_started(&self, resource_id: &str, start_nanos: i64) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if state.view_stopped || state.resolved.is_some() {
            return;
        }
        let Some(view_start) = state.view_start_nanos else {
            return;
        };
        if self.identifier.validate(view_start, start_nanos) {
            state.pending.insert(resource_id.to_string(), start_nanos);
            state.initial_count += 1;
        }
    }

    pub fn resource_was_stopped(&self, resource_id: &str, end_nanos: i64) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if state.pending.remove(resource_id).is_none() {
            return;
        }
        state.last_end_nanos = Some(state.last_end_nanos.map_or(end_nanos, |e| e.max(end_nanos)));
        if state.pending.is_empty() {
            if let (Some(start), Some(end)) = (state.view_start_nanos, state.last_end_nanos) {
                state.resolved = Some(end - start);
                debug!("Network settled after {}ns", end - start);
            }
        }
    }

    pub fn resource_was_dropped(&self, resource_id: &str) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if state.pending.remove(resource_id).is_some() {
            state.initial_count = state.initial_count.saturating_sub(1);
            if state.pending.is_empty() && state.initial_count > 0 {
                if let (Some(start), Some(end)) = (state.view_start_nanos, state.last_end_nanos) {
                    state.resolved = Some(end - start);
                }
            }
        }
    }

    pub fn view_was_stopped(&self) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.view_stopped = true;
    }

    #[must_use]
    pub fn resolve_metric(&self) -> Option<i64> {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .resolved
    }

    #[must_use]
    pub fn no_value_reason(&self) -> Option<NoValueReason> {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if state.resolved.is_some() {
            None
        } else if state.initial_count == 0 {
            Some(NoValueReason::NoInitialResources)
        } else {
            Some(NoValueReason::UnknownResolution)
        }
    }
}
