// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! A user interaction and the activity it triggers.
//!
//! An action stays open while it keeps receiving activity. It closes once it
//! has been idle for the action inactivity threshold with no resource it
//! started still in flight, or once it exceeds the maximum duration. Timers are
//! only evaluated when an event arrives: explicit terminal events are honored
//! before any threshold.

use std::sync::Arc;

use tracing::debug;

use crate::attributes::{merge, Attributes};
use crate::event::{ActionType, RawEvent};
use crate::model::{
    ActionData, ActionEvent, ActionTarget, Count, Envelope, EventType, Frustration,
    FrustrationType, RumEvent, ViewRef,
};
use crate::resource_key::ResourceKey;
use crate::scope::{Dispatch, ParentScope, RumDependencies, ScopeOutcome};
use crate::storage::StorageEvent;
use crate::time::Time;

pub struct ActionScope {
    deps: Arc<RumDependencies>,
    action_id: String,
    action_type: ActionType,
    name: String,
    wait_for_stop: bool,
    attributes: Attributes,
    start: Time,
    last_interaction_nanos: i64,
    ongoing_resources: Vec<ResourceKey>,
    resource_count: i64,
    error_count: i64,
    crash_count: i64,
    long_task_count: i64,
    frustrations: Vec<FrustrationType>,
    stopped: bool,
    sent: bool,
}

impl std::fmt::Debug for ActionScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActionScope")
            .field("action_id", &self.action_id)
            .field("action_type", &self.action_type)
            .field("name", &self.name)
            .field("stopped", &self.stopped)
            .field("sent", &self.sent)
            .finish_non_exhaustive()
    }
}

impl ActionScope {
    #[must_use]
    pub fn new(
        deps: Arc<RumDependencies>,
        action_type: ActionType,
        name: String,
        wait_for_stop: bool,
        attributes: Attributes,
        start: Time,
    ) -> Self {
        ActionScope {
            action_id: deps.new_id(),
            deps,
            action_type,
            name,
            wait_for_stop,
            attributes,
            start,
            last_interaction_nanos: start.nano_time,
            ongoing_resources: Vec::new(),
            resource_count: 0,
            error_count: 0,
            crash_count: 0,
            long_task_count: 0,
            frustrations: Vec::new(),
            stopped: false,
            sent: false,
        }
    }

    #[must_use]
    pub fn action_id(&self) -> &str {
        &self.action_id
    }

    #[must_use]
    pub const fn action_type(&self) -> ActionType {
        self.action_type
    }

    /// Whether the action still links the records of its view.
    #[must_use]
    pub const fn is_active(&self) -> bool {
        !self.stopped && !self.sent
    }

    #[must_use]
    pub fn frustration_count(&self) -> i64 {
        i64::try_from(self.frustrations.len()).unwrap_or(i64::MAX)
    }

    pub fn handle_event(
        &mut self,
        event: &RawEvent,
        parent: &ParentScope,
        dispatch: &Dispatch<'_>,
    ) -> ScopeOutcome {
        if self.sent {
            return ScopeOutcome::Complete;
        }
        let now = event.time().nano_time;
        let registry = &self.deps.resource_keys;
        self.ongoing_resources.retain(|key| registry.is_live(key));

        match event {
            RawEvent::SendCustomActionNow { .. } => {
                self.send(self.last_interaction_nanos, parent, dispatch);
            }
            RawEvent::StartView { .. } | RawEvent::StopView { .. } | RawEvent::StopSession { .. } => {
                self.ongoing_resources.clear();
                self.send(now, parent, dispatch);
            }
            RawEvent::AddError { .. } if event.is_fatal_error() => {
                self.last_interaction_nanos = now;
                self.error_count += 1;
                self.crash_count += 1;
                self.send(now, parent, dispatch);
            }
            RawEvent::StopAction {
                action_type,
                name,
                attributes,
                ..
            } if self.wait_for_stop && !self.stopped => {
                if let Some(action_type) = action_type {
                    self.action_type = *action_type;
                }
                if let Some(name) = name {
                    self.name.clone_from(name);
                }
                self.attributes.extend(attributes.clone());
                self.stopped = true;
                self.last_interaction_nanos = now;
                if self.ongoing_resources.is_empty() {
                    self.send(now, parent, dispatch);
                }
            }
            _ => self.on_activity(event, now, parent, dispatch),
        }
        ScopeOutcome::from_complete(self.sent)
    }

    fn on_activity(
        &mut self,
        event: &RawEvent,
        now: i64,
        parent: &ParentScope,
        dispatch: &Dispatch<'_>,
    ) {
        let is_inactive = now - self.last_interaction_nanos >= self.deps.action_inactivity_ns();
        let is_long = now - self.start.nano_time >= self.deps.action_max_duration_ns();
        let waiting_for_stop = self.wait_for_stop && !self.stopped;
        if is_inactive && self.ongoing_resources.is_empty() && !waiting_for_stop {
            self.send(self.last_interaction_nanos, parent, dispatch);
            return;
        }
        if is_long {
            self.ongoing_resources.clear();
            self.send(now, parent, dispatch);
            return;
        }

        match event {
            RawEvent::StartResource { key, .. } => {
                self.last_interaction_nanos = now;
                self.resource_count += 1;
                self.ongoing_resources.push(key.clone());
            }
            RawEvent::StopResource { key, .. } => {
                if self.forget_resource(key) {
                    self.last_interaction_nanos = now;
                }
            }
            RawEvent::StopResourceWithError { key, .. }
            | RawEvent::StopResourceWithStackTrace { key, .. } => {
                if self.forget_resource(key) {
                    self.last_interaction_nanos = now;
                    self.resource_count -= 1;
                    self.error_count += 1;
                }
            }
            RawEvent::AddError { .. } => {
                self.last_interaction_nanos = now;
                self.error_count += 1;
            }
            RawEvent::AddLongTask { .. } => {
                self.last_interaction_nanos = now;
                self.long_task_count += 1;
            }
            _ => {}
        }

        if self.stopped && self.ongoing_resources.is_empty() {
            self.send(now, parent, dispatch);
        }
    }

    fn forget_resource(&mut self, key: &ResourceKey) -> bool {
        let before = self.ongoing_resources.len();
        self.ongoing_resources.retain(|k| k != key);
        self.ongoing_resources.len() != before
    }

    fn send(&mut self, end_nanos: i64, parent: &ParentScope, dispatch: &Dispatch<'_>) {
        if self.sent {
            return;
        }
        self.sent = true;

        if self.deps.config.track_frustrations
            && self.action_type == ActionType::Tap
            && self.error_count > 0
            && !self.frustrations.contains(&FrustrationType::ErrorTap)
        {
            self.frustrations.push(FrustrationType::ErrorTap);
        }

        let loading_time = (end_nanos - self.start.nano_time).max(1);
        let attributes = merge([&parent.custom_attributes, &self.attributes]);
        let context = &parent.rum_context;
        let view_id = context.view_id.clone().unwrap_or_default();
        let storage_event = StorageEvent::Action {
            frustration_count: self.frustration_count(),
            action_type: self.action_type,
            event_end_nanos: end_nanos,
        };
        let action = ActionData {
            action_type: self.action_type,
            id: self.action_id.clone(),
            target: Some(ActionTarget {
                name: self.name.clone(),
            }),
            error: Count::from(self.error_count),
            crash: Count::from(self.crash_count),
            long_task: Count::from(self.long_task_count),
            resource: Count::from(self.resource_count),
            loading_time,
            frustration: (!self.frustrations.is_empty()).then(|| Frustration {
                types: self.frustrations.clone(),
            }),
        };
        let sample_rate = self.deps.config.session_sample_rate;
        let timestamp = self.start.timestamp;
        let outcome = dispatch
            .emitter
            .emit(&view_id, &storage_event, EventType::Default, |datadog_context| {
                RumEvent::Action(ActionEvent {
                    envelope: Envelope::new(timestamp, context, datadog_context, attributes, sample_rate),
                    view: ViewRef::from_context(context),
                    action,
                })
            });
        debug!(action_id = %self.action_id, ?outcome, "Action closed");
    }
}
