// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Write-outcome protocol between the scope tree and the storage collaborators.
//!
//! Every emission attempt obtains the ambient context and a batch writer from
//! an [`EventWriteScope`], builds its record against that context, hands it to
//! a [`DataWriter`] and then reports exactly one outcome to the
//! [`EventAccounting`] sink: `event_sent` when the writer returned `Ok(true)`,
//! `event_dropped` otherwise. Write failures never leave this module.

use std::cell::Cell;

use tracing::{debug, warn};

use crate::context::DatadogContext;
use crate::error::WriteError;
use crate::event::ActionType;
use crate::model::{EventType, RumEvent};

/// Low-level handle to the batch currently being filled.
pub trait EventBatchWriter {
    /// Appends an encoded record, returning whether it was accepted.
    fn write(&mut self, payload: &[u8], event_type: EventType) -> bool;
}

/// Supplies the ambient context and a batch writer for one emission.
///
/// Implementations call `callback` at most once. Not calling it at all means
/// the storage is unavailable and the record is dropped.
pub trait EventWriteScope: Send + Sync {
    fn with_write_context(
        &self,
        callback: &mut dyn FnMut(&DatadogContext, &mut dyn EventBatchWriter),
    );
}

/// Serializes a record and appends it to a batch.
pub trait DataWriter: Send + Sync {
    /// # Errors
    ///
    /// Returns an error when the record cannot be encoded or the batch is unusable.
    fn write(
        &self,
        batch: &mut dyn EventBatchWriter,
        record: &RumEvent,
        event_type: EventType,
    ) -> Result<bool, WriteError>;
}

/// Descriptor reported along with each write outcome.
#[derive(Debug, Clone, PartialEq)]
pub enum StorageEvent {
    Action {
        frustration_count: i64,
        action_type: ActionType,
        event_end_nanos: i64,
    },
    Resource {
        resource_id: String,
        resource_end_nanos: i64,
    },
    Error {
        resource_id: Option<String>,
        resource_end_nanos: Option<i64>,
    },
    LongTask {
        is_frozen_frame: bool,
    },
    View,
}

/// Receives exactly one notification per emission attempt.
pub trait EventAccounting: Send + Sync {
    fn event_sent(&self, view_id: &str, event: &StorageEvent);
    fn event_dropped(&self, view_id: &str, event: &StorageEvent);
}

/// Accounting sink that ignores every notification.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoOpEventAccounting;

impl EventAccounting for NoOpEventAccounting {
    fn event_sent(&self, _view_id: &str, _event: &StorageEvent) {}
    fn event_dropped(&self, _view_id: &str, _event: &StorageEvent) {}
}

/// Writer encoding records as JSON.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonDataWriter;

impl DataWriter for JsonDataWriter {
    fn write(
        &self,
        batch: &mut dyn EventBatchWriter,
        record: &RumEvent,
        event_type: EventType,
    ) -> Result<bool, WriteError> {
        let payload = serde_json::to_vec(record)?;
        Ok(batch.write(&payload, event_type))
    }
}

/// Result of one emission attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Sent,
    Dropped,
    /// The session is not tracked: nothing was written and nobody was notified.
    Suppressed,
}

/// Emission path handed down the scope tree for one event.
#[derive(Clone, Copy)]
pub enum Emitter<'a> {
    Tracked {
        write_scope: &'a dyn EventWriteScope,
        writer: &'a dyn DataWriter,
        accounting: &'a dyn EventAccounting,
    },
    Suppressed,
}

impl std::fmt::Debug for Emitter<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Emitter::Tracked { .. } => f.write_str("Emitter::Tracked"),
            Emitter::Suppressed => f.write_str("Emitter::Suppressed"),
        }
    }
}

impl<'a> Emitter<'a> {
    #[must_use]
    pub fn tracked(
        write_scope: &'a dyn EventWriteScope,
        writer: &'a dyn DataWriter,
        accounting: &'a dyn EventAccounting,
    ) -> Self {
        Emitter::Tracked {
            write_scope,
            writer,
            accounting,
        }
    }

    #[must_use]
    pub const fn is_suppressed(&self) -> bool {
        matches!(self, Emitter::Suppressed)
    }

    /// Runs one emission attempt.
    ///
    /// `build` receives the ambient context of the write and returns the record.
    pub fn emit<F>(
        &self,
        view_id: &str,
        storage_event: &StorageEvent,
        event_type: EventType,
        build: F,
    ) -> WriteOutcome
    where
        F: FnOnce(&DatadogContext) -> RumEvent,
    {
        let Emitter::Tracked {
            write_scope,
            writer,
            accounting,
        } = *self
        else {
            return WriteOutcome::Suppressed;
        };

        let mut build = Some(build);
        let sent = Cell::new(None);
        write_scope.with_write_context(&mut |datadog_context, batch| {
            let Some(build) = build.take() else {
                return;
            };
            let record = build(datadog_context);
            let kind = record.kind();
            let accepted = match writer.write(batch, &record, event_type) {
                Ok(true) => true,
                Ok(false) => {
                    warn!("Failed to write {kind} event: the writer rejected it");
                    false
                }
                Err(e) => {
                    warn!("Failed to write {kind} event: {e}");
                    false
                }
            };
            sent.set(Some(accepted));
        });

        match sent.get() {
            Some(true) => {
                accounting.event_sent(view_id, storage_event);
                WriteOutcome::Sent
            }
            Some(false) => {
                accounting.event_dropped(view_id, storage_event);
                WriteOutcome::Dropped
            }
            None => {
                debug!("No write context available, dropping event");
                accounting.event_dropped(view_id, storage_event);
                WriteOutcome::Dropped
            }
        }
    }
}
