// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Event builders and a harness driving an application scope

#![allow(dead_code)]

use std::sync::Arc;

use datadog_rum::attributes::{Attributes, GlobalAttributes};
use datadog_rum::config::RumConfig;
use datadog_rum::event::{ActionType, ErrorSource, RawEvent, ResourceKind, ResourceMethod, ViewKey};
use datadog_rum::resource_key::{ResourceKey, ResourceKeyRegistry};
use datadog_rum::scope::application::ApplicationScope;
use datadog_rum::scope::view::ViewScope;
use datadog_rum::scope::RumDependencies;
use datadog_rum::storage::DataWriter;
use datadog_rum::time::Time;

use super::mocks::{
    MockWriteScope, RecordingAccounting, RecordingReplayBus, RecordingSessionListener,
    RecordingWriter, SwitchableProcessInfo,
};

pub const MS: i64 = 1_000_000;
pub const EPOCH_MS: i64 = 1_700_000_000_000;

/// Synthetic time `ms` milliseconds after the process start
pub fn at(ms: i64) -> Time {
    Time::new(EPOCH_MS + ms, ms * MS)
}

pub fn config() -> RumConfig {
    RumConfig {
        application_id: "integration-app".to_string(),
        sampling_seed: Some(42),
        ..RumConfig::default()
    }
}

pub struct Harness {
    pub app: ApplicationScope,
    pub write_scope: MockWriteScope,
    pub recorder: Arc<RecordingWriter>,
    pub writer: Arc<dyn DataWriter>,
    pub accounting: Arc<RecordingAccounting>,
    pub listener: Arc<RecordingSessionListener>,
    pub bus: Arc<RecordingReplayBus>,
    pub process: Arc<SwitchableProcessInfo>,
    pub keys: ResourceKeyRegistry,
}

impl Harness {
    /// Harness for a background process, so no application launch is synthesized
    pub fn new(config: RumConfig) -> Self {
        let recorder = Arc::new(RecordingWriter::default());
        Self::with_writer(config, recorder.clone(), recorder)
    }

    pub fn with_writer(
        config: RumConfig,
        recorder: Arc<RecordingWriter>,
        writer: Arc<dyn DataWriter>,
    ) -> Self {
        Self::build(config, recorder, writer, None)
    }

    pub fn with_global_attributes(config: RumConfig, globals: Arc<GlobalAttributes>) -> Self {
        let recorder = Arc::new(RecordingWriter::default());
        Self::build(config, recorder.clone(), recorder, Some(globals))
    }

    fn build(
        config: RumConfig,
        recorder: Arc<RecordingWriter>,
        writer: Arc<dyn DataWriter>,
        globals: Option<Arc<GlobalAttributes>>,
    ) -> Self {
        let accounting = Arc::new(RecordingAccounting::default());
        let listener = Arc::new(RecordingSessionListener::default());
        let bus = Arc::new(RecordingReplayBus::default());
        let process = Arc::new(SwitchableProcessInfo::new(false));
        let keys = ResourceKeyRegistry::new();
        let deps = RumDependencies::new(config)
            .with_resource_keys(keys.clone())
            .with_accounting(accounting.clone())
            .with_session_listener(listener.clone())
            .with_session_replay_bus(bus.clone())
            .with_process_info(process.clone());
        let deps = match globals {
            Some(globals) => deps.with_attributes_provider(globals),
            None => deps,
        };
        Harness {
            app: ApplicationScope::new(Arc::new(deps)),
            write_scope: MockWriteScope::default(),
            recorder,
            writer,
            accounting,
            listener,
            bus,
            process,
            keys,
        }
    }

    pub fn send(&mut self, event: RawEvent) {
        self.app.handle_event(
            &event,
            &self.write_scope.datadog_context,
            &self.write_scope,
            &*self.writer,
        );
    }

    pub fn active_view(&self) -> Option<&ViewScope> {
        self.app.active_session().and_then(|s| s.active_view())
    }

    pub fn session_id(&self) -> String {
        self.app.rum_context().session_id
    }
}

pub fn start_view(id: &str, ms: i64) -> RawEvent {
    start_view_with(id, Attributes::new(), ms)
}

pub fn start_view_with(id: &str, attributes: Attributes, ms: i64) -> RawEvent {
    RawEvent::StartView {
        key: ViewKey::named(id, id),
        attributes,
        time: at(ms),
    }
}

pub fn stop_view(id: &str, ms: i64) -> RawEvent {
    RawEvent::StopView {
        key: ViewKey::named(id, id),
        attributes: Attributes::new(),
        time: at(ms),
    }
}

pub fn tap(name: &str, ms: i64) -> RawEvent {
    start_action_with(ActionType::Tap, name, Attributes::new(), ms)
}

pub fn start_action_with(action_type: ActionType, name: &str, attributes: Attributes, ms: i64) -> RawEvent {
    RawEvent::StartAction {
        action_type,
        name: name.to_string(),
        wait_for_stop: false,
        attributes,
        time: at(ms),
    }
}

pub fn start_resource(key: &ResourceKey, ms: i64) -> RawEvent {
    RawEvent::StartResource {
        key: key.clone(),
        url: "https://api.example.com/items".to_string(),
        method: ResourceMethod::Get,
        attributes: Attributes::new(),
        time: at(ms),
    }
}

pub fn stop_resource(key: &ResourceKey, ms: i64) -> RawEvent {
    RawEvent::StopResource {
        key: key.clone(),
        status_code: Some(200),
        size: Some(128),
        kind: ResourceKind::Xhr,
        attributes: Attributes::new(),
        time: at(ms),
    }
}

pub fn error(ms: i64, is_fatal: bool) -> RawEvent {
    error_with(Attributes::new(), ms, is_fatal)
}

pub fn error_with(attributes: Attributes, ms: i64, is_fatal: bool) -> RawEvent {
    RawEvent::AddError {
        message: "Something went wrong".to_string(),
        source: ErrorSource::Source,
        error_type: Some("IllegalStateException".to_string()),
        stack_trace: None,
        category: None,
        is_fatal,
        attributes,
        time: at(ms),
    }
}

pub fn keep_alive(ms: i64) -> RawEvent {
    RawEvent::KeepAlive { time: at(ms) }
}
