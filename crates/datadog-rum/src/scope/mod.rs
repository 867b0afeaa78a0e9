// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! The hierarchical scope state machine.
//!
//! Each scope owns its children exclusively and receives a read-only
//! [`ParentScope`] snapshot on every event. A scope reports
//! [`ScopeOutcome::Complete`] once it has nothing left to emit; its parent
//! then drops it.

pub mod action;
pub mod application;
pub mod resource;
pub mod session;
pub mod view;
pub mod view_manager;

#[cfg(test)]
pub(crate) mod test_support;

use std::sync::{Arc, Mutex, PoisonError};

use uuid::Uuid;

use crate::attributes::{AttributesProvider, NoOpAttributesProvider};
use crate::config::{duration_nanos, RumConfig};
use crate::context::DatadogContext;
use crate::listener::{
    FirstPartyHostResolver, FirstPartyHosts, ProcessInfo, RumSessionListener, SessionReplayBus,
    StaticProcessInfo,
};
use crate::metric::network_settled::{InitialResourceIdentifier, TimeBasedInitialResourceIdentifier};
use crate::metric::{LoggingSessionMetricDispatcher, SessionMetricDispatcher};
use crate::resource_key::ResourceKeyRegistry;
use crate::storage::{Emitter, EventAccounting, NoOpEventAccounting};
use crate::time::monotonic_nanos;
use crate::vitals::VitalMonitors;

pub use crate::context::ParentScope;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeOutcome {
    Active,
    Complete,
}

impl ScopeOutcome {
    #[must_use]
    pub const fn is_complete(self) -> bool {
        matches!(self, ScopeOutcome::Complete)
    }

    #[must_use]
    pub const fn from_complete(complete: bool) -> Self {
        if complete {
            ScopeOutcome::Complete
        } else {
            ScopeOutcome::Active
        }
    }
}

/// Per-event handles passed down the tree alongside the event.
#[derive(Debug, Clone, Copy)]
pub struct Dispatch<'a> {
    pub datadog_context: &'a DatadogContext,
    pub emitter: Emitter<'a>,
}

impl<'a> Dispatch<'a> {
    /// Same dispatch, with every write suppressed.
    #[must_use]
    pub const fn suppressed(&self) -> Dispatch<'a> {
        Dispatch {
            datadog_context: self.datadog_context,
            emitter: Emitter::Suppressed,
        }
    }
}

/// Source of the session sampling draws and of every generated id.
#[derive(Debug)]
pub struct Sampler {
    rng: Mutex<fastrand::Rng>,
}

impl Sampler {
    #[must_use]
    pub fn new(seed: Option<u64>) -> Self {
        let rng = seed.map_or_else(fastrand::Rng::new, fastrand::Rng::with_seed);
        Sampler {
            rng: Mutex::new(rng),
        }
    }

    /// Draws uniformly in [0, 100) and keeps the session when the draw is below `sample_rate`.
    pub fn sample(&self, sample_rate: f32) -> bool {
        let draw = self.rng.lock().unwrap_or_else(PoisonError::into_inner).f32() * 100.0;
        draw < sample_rate
    }

    /// Random (version 4) UUID string.
    pub fn new_id(&self) -> String {
        let mut bytes = [0u8; 16];
        self.rng
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .fill(&mut bytes);
        uuid::Builder::from_random_bytes(bytes)
            .into_uuid()
            .hyphenated()
            .to_string()
    }
}

/// Collaborators shared by every scope of one tree.
pub struct RumDependencies {
    pub config: RumConfig,
    pub sampler: Sampler,
    pub resource_keys: ResourceKeyRegistry,
    pub accounting: Arc<dyn EventAccounting>,
    pub process_info: Arc<dyn ProcessInfo>,
    pub session_listener: Option<Arc<dyn RumSessionListener>>,
    pub session_replay_bus: Option<Arc<dyn SessionReplayBus>>,
    pub first_party_hosts: Arc<dyn FirstPartyHostResolver>,
    pub attributes_provider: Arc<dyn AttributesProvider>,
    pub vitals: VitalMonitors,
    pub session_metrics: Arc<dyn SessionMetricDispatcher>,
    pub initial_resource_identifier: Arc<dyn InitialResourceIdentifier>,
}

impl std::fmt::Debug for RumDependencies {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RumDependencies")
            .field("config", &self.config)
            .field("resource_keys", &self.resource_keys)
            .finish_non_exhaustive()
    }
}

impl RumDependencies {
    /// Dependencies with no-op collaborators and a foreground process started now.
    #[must_use]
    pub fn new(config: RumConfig) -> Self {
        let sampler = Sampler::new(config.sampling_seed);
        RumDependencies {
            config,
            sampler,
            resource_keys: ResourceKeyRegistry::new(),
            accounting: Arc::new(NoOpEventAccounting),
            process_info: Arc::new(StaticProcessInfo {
                foreground: true,
                start_nanos: monotonic_nanos(),
            }),
            session_listener: None,
            session_replay_bus: None,
            first_party_hosts: Arc::new(FirstPartyHosts::default()),
            attributes_provider: Arc::new(NoOpAttributesProvider),
            vitals: VitalMonitors::no_op(),
            session_metrics: Arc::new(LoggingSessionMetricDispatcher::new()),
            initial_resource_identifier: Arc::new(TimeBasedInitialResourceIdentifier::default()),
        }
    }

    #[must_use]
    pub fn with_resource_keys(mut self, registry: ResourceKeyRegistry) -> Self {
        self.resource_keys = registry;
        self
    }

    #[must_use]
    pub fn with_accounting(mut self, accounting: Arc<dyn EventAccounting>) -> Self {
        self.accounting = accounting;
        self
    }

    #[must_use]
    pub fn with_process_info(mut self, process_info: Arc<dyn ProcessInfo>) -> Self {
        self.process_info = process_info;
        self
    }

    #[must_use]
    pub fn with_session_listener(mut self, listener: Arc<dyn RumSessionListener>) -> Self {
        self.session_listener = Some(listener);
        self
    }

    #[must_use]
    pub fn with_session_replay_bus(mut self, bus: Arc<dyn SessionReplayBus>) -> Self {
        self.session_replay_bus = Some(bus);
        self
    }

    #[must_use]
    pub fn with_first_party_hosts(mut self, resolver: Arc<dyn FirstPartyHostResolver>) -> Self {
        self.first_party_hosts = resolver;
        self
    }

    #[must_use]
    pub fn with_attributes_provider(mut self, provider: Arc<dyn AttributesProvider>) -> Self {
        self.attributes_provider = provider;
        self
    }

    #[must_use]
    pub fn with_vitals(mut self, vitals: VitalMonitors) -> Self {
        self.vitals = vitals;
        self
    }

    #[must_use]
    pub fn with_session_metrics(mut self, dispatcher: Arc<dyn SessionMetricDispatcher>) -> Self {
        self.session_metrics = dispatcher;
        self
    }

    #[must_use]
    pub fn with_initial_resource_identifier(
        mut self,
        identifier: Arc<dyn InitialResourceIdentifier>,
    ) -> Self {
        self.initial_resource_identifier = identifier;
        self
    }

    pub(crate) fn session_inactivity_ns(&self) -> i64 {
        duration_nanos(self.config.session_inactivity)
    }

    pub(crate) fn session_max_duration_ns(&self) -> i64 {
        duration_nanos(self.config.session_max_duration)
    }

    pub(crate) fn action_inactivity_ns(&self) -> i64 {
        duration_nanos(self.config.action_inactivity)
    }

    pub(crate) fn action_max_duration_ns(&self) -> i64 {
        duration_nanos(self.config.action_max_duration)
    }

    pub(crate) fn new_id(&self) -> String {
        self.sampler.new_id()
    }
}

/// Parses an id produced by [`Sampler::new_id`].
#[must_use]
pub fn is_valid_id(id: &str) -> bool {
    Uuid::parse_str(id).is_ok_and(|uuid| uuid.get_version_num() == 4)
}
