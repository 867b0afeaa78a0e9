// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::sync::{Arc, Mutex};

use crate::attributes::Attributes;
use crate::config::RumConfig;
use crate::context::DatadogContext;
use crate::error::WriteError;
use crate::model::{EventType, RumEvent, ViewEvent};
use crate::scope::{Dispatch, RumDependencies};
use crate::storage::{DataWriter, Emitter, EventAccounting, EventBatchWriter, EventWriteScope, StorageEvent};
use crate::time::Time;

pub(crate) const MS: i64 = 1_000_000;
pub(crate) const EPOCH_MS: i64 = 1_700_000_000_000;

pub(crate) fn at(ms: i64) -> Time {
    Time::new(EPOCH_MS + ms, ms * MS)
}

pub(crate) fn deps_with(config: RumConfig) -> Arc<RumDependencies> {
    Arc::new(RumDependencies::new(config))
}

pub(crate) fn deps() -> Arc<RumDependencies> {
    deps_with(RumConfig {
        application_id: "app".to_string(),
        sampling_seed: Some(1),
        ..RumConfig::default()
    })
}

pub(crate) fn attrs(pairs: &[(&str, serde_json::Value)]) -> Attributes {
    pairs
        .iter()
        .map(|(k, v)| ((*k).to_string(), v.clone()))
        .collect()
}

struct AcceptAll;

impl EventBatchWriter for AcceptAll {
    fn write(&mut self, _payload: &[u8], _event_type: EventType) -> bool {
        true
    }
}

/// Write scope, writer and accounting sink recording everything in memory.
#[derive(Default)]
pub(crate) struct Recorder {
    pub(crate) datadog_context: DatadogContext,
    records: Mutex<Vec<(RumEvent, EventType)>>,
    sent: Mutex<Vec<(String, StorageEvent)>>,
    dropped: Mutex<Vec<(String, StorageEvent)>>,
}

impl Recorder {
    pub(crate) fn dispatch(&self) -> Dispatch<'_> {
        Dispatch {
            datadog_context: &self.datadog_context,
            emitter: Emitter::tracked(self, self, self),
        }
    }

    pub(crate) fn records(&self) -> Vec<RumEvent> {
        self.records.lock().unwrap().iter().map(|(r, _)| r.clone()).collect()
    }

    pub(crate) fn event_types(&self) -> Vec<EventType> {
        self.records.lock().unwrap().iter().map(|(_, t)| *t).collect()
    }

    pub(crate) fn views(&self) -> Vec<ViewEvent> {
        self.records()
            .iter()
            .filter_map(RumEvent::as_view)
            .cloned()
            .collect()
    }

    pub(crate) fn last_view(&self) -> ViewEvent {
        self.views().pop().expect("no view update was written")
    }

    pub(crate) fn sent(&self) -> Vec<(String, StorageEvent)> {
        self.sent.lock().unwrap().clone()
    }

    pub(crate) fn dropped(&self) -> Vec<(String, StorageEvent)> {
        self.dropped.lock().unwrap().clone()
    }
}

impl EventWriteScope for Recorder {
    fn with_write_context(
        &self,
        callback: &mut dyn FnMut(&DatadogContext, &mut dyn EventBatchWriter),
    ) {
        callback(&self.datadog_context, &mut AcceptAll);
    }
}

impl DataWriter for Recorder {
    fn write(
        &self,
        _batch: &mut dyn EventBatchWriter,
        record: &RumEvent,
        event_type: EventType,
    ) -> Result<bool, WriteError> {
        self.records
            .lock()
            .unwrap()
            .push((record.clone(), event_type));
        Ok(true)
    }
}

impl EventAccounting for Recorder {
    fn event_sent(&self, view_id: &str, event: &StorageEvent) {
        self.sent
            .lock()
            .unwrap()
            .push((view_id.to_string(), event.clone()));
    }

    fn event_dropped(&self, view_id: &str, event: &StorageEvent) {
        self.dropped
            .lock()
            .unwrap()
            .push((view_id.to_string(), event.clone()));
    }
}
