// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Recording collaborators for the scope tree

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use datadog_rum::context::DatadogContext;
use datadog_rum::error::WriteError;
use datadog_rum::listener::{ProcessInfo, RumSessionListener, SessionRenewedMessage, SessionReplayBus};
use datadog_rum::model::{EventType, RumEvent};
use datadog_rum::storage::{DataWriter, EventAccounting, EventBatchWriter, EventWriteScope, StorageEvent};

struct AcceptingBatch;

impl EventBatchWriter for AcceptingBatch {
    fn write(&mut self, _payload: &[u8], _event_type: EventType) -> bool {
        true
    }
}

/// Write scope handing out the stored ambient context, or nothing when unavailable
pub struct MockWriteScope {
    pub datadog_context: DatadogContext,
    pub available: AtomicBool,
}

impl Default for MockWriteScope {
    fn default() -> Self {
        MockWriteScope {
            datadog_context: DatadogContext::default(),
            available: AtomicBool::new(true),
        }
    }
}

impl EventWriteScope for MockWriteScope {
    fn with_write_context(
        &self,
        callback: &mut dyn FnMut(&DatadogContext, &mut dyn EventBatchWriter),
    ) {
        if self.available.load(Ordering::SeqCst) {
            callback(&self.datadog_context, &mut AcceptingBatch);
        }
    }
}

/// Writer keeping every record it accepts
#[derive(Default)]
pub struct RecordingWriter {
    records: Mutex<Vec<(RumEvent, EventType)>>,
}

impl RecordingWriter {
    pub fn records(&self) -> Vec<RumEvent> {
        self.records
            .lock()
            .unwrap()
            .iter()
            .map(|(record, _)| record.clone())
            .collect()
    }

    pub fn event_types(&self) -> Vec<EventType> {
        self.records.lock().unwrap().iter().map(|(_, t)| *t).collect()
    }

    pub fn count_of(&self, kind: &str) -> usize {
        self.records().iter().filter(|r| r.kind() == kind).count()
    }
}

impl DataWriter for RecordingWriter {
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

/// Writer rejecting every record
#[derive(Default)]
pub struct FailingWriter;

impl DataWriter for FailingWriter {
    fn write(
        &self,
        _batch: &mut dyn EventBatchWriter,
        _record: &RumEvent,
        _event_type: EventType,
    ) -> Result<bool, WriteError> {
        Ok(false)
    }
}

/// Writer erroring on every record
#[derive(Default)]
pub struct ErroringWriter;

impl DataWriter for ErroringWriter {
    fn write(
        &self,
        _batch: &mut dyn EventBatchWriter,
        _record: &RumEvent,
        _event_type: EventType,
    ) -> Result<bool, WriteError> {
        Err(WriteError::Writer("disk full".to_string()))
    }
}

#[derive(Default)]
pub struct RecordingAccounting {
    pub sent: Mutex<Vec<(String, StorageEvent)>>,
    pub dropped: Mutex<Vec<(String, StorageEvent)>>,
}

impl RecordingAccounting {
    pub fn sent_count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }

    pub fn dropped_count(&self) -> usize {
        self.dropped.lock().unwrap().len()
    }
}

impl EventAccounting for RecordingAccounting {
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

#[derive(Default)]
pub struct RecordingSessionListener {
    pub started: Mutex<Vec<(String, bool)>>,
}

impl RumSessionListener for RecordingSessionListener {
    fn on_session_started(&self, session_id: &str, is_discarded: bool) {
        self.started
            .lock()
            .unwrap()
            .push((session_id.to_string(), is_discarded));
    }
}

#[derive(Default)]
pub struct RecordingReplayBus {
    pub messages: Mutex<Vec<SessionRenewedMessage>>,
}

impl SessionReplayBus for RecordingReplayBus {
    fn publish(&self, message: SessionRenewedMessage) {
        self.messages.lock().unwrap().push(message);
    }
}

/// Process info whose foreground state can be flipped by the test
pub struct SwitchableProcessInfo {
    pub foreground: AtomicBool,
    pub start_nanos: i64,
}

impl SwitchableProcessInfo {
    pub fn new(foreground: bool) -> Self {
        SwitchableProcessInfo {
            foreground: AtomicBool::new(foreground),
            start_nanos: 0,
        }
    }

    pub fn set_foreground(&self, foreground: bool) {
        self.foreground.store(foreground, Ordering::SeqCst);
    }
}

impl ProcessInfo for SwitchableProcessInfo {
    fn is_foreground(&self) -> bool {
        self.foreground.load(Ordering::SeqCst)
    }

    fn process_start_nanos(&self) -> i64 {
        self.start_nanos
    }
}
