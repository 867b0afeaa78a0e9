// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! A screen of the host application.
//!
//! A view owns at most one active [`ActionScope`] and any number of in-flight
//! [`ResourceScope`]s. It keeps the counters of everything that happened while
//! it was displayed and re-emits a versioned view update whenever they change.
//! Once stopped it keeps receiving events until its children are done, then
//! reports itself complete.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, warn};

use crate::attributes::{merge, take_string, Attributes, ERROR_FINGERPRINT, INTERNAL_ERROR_IS_CRASH};
use crate::context::{RumContext, ViewType};
use crate::event::{ActionType, ErrorCategory, RawEvent, ViewKey};
use crate::metric::session_ended::TrackedViewUpdate;
use crate::metric::{InteractionToNextViewMetricResolver, NetworkSettledMetricResolver};
use crate::model::{
    ActionData, ActionEvent, ActionLink, Count, Envelope, ErrorData, ErrorEvent, EventType,
    LongTaskData, LongTaskEvent, RumEvent, ViewData, ViewEvent, ViewRef,
};
use crate::scope::action::ActionScope;
use crate::scope::resource::ResourceScope;
use crate::scope::{Dispatch, ParentScope, RumDependencies, ScopeOutcome};
use crate::storage::{StorageEvent, WriteOutcome};
use crate::time::{Time, NANOS_PER_MILLI, NANOS_PER_SECOND};
use crate::vitals::VitalMonitors;

/// Long tasks above this duration are reported as frozen frames.
pub const FROZEN_FRAME_THRESHOLD_NS: i64 = 700 * NANOS_PER_MILLI;

/// Views rendered below this mean frame rate are flagged as slow.
pub const SLOW_RENDERED_THRESHOLD_FPS: f64 = 55.0;

pub const LONG_TASK_TARGET_ATTRIBUTE: &str = "long_task.target";

const SOURCE_TYPE: &str = "android";

/// What a view needs to be restarted in another session.
#[derive(Debug, Clone, PartialEq)]
pub struct ViewSeed {
    pub key: ViewKey,
    pub attributes: Attributes,
    pub view_type: ViewType,
}

/// Snapshot of the counters reported on view updates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ViewCounters {
    pub action: i64,
    pub resource: i64,
    pub error: i64,
    pub crash: i64,
    pub long_task: i64,
    pub frozen_frame: i64,
    pub frustration: i64,
}

pub struct ViewScope {
    deps: Arc<RumDependencies>,
    key: ViewKey,
    url: String,
    view_id: String,
    view_type: ViewType,
    attributes: Attributes,
    frozen_parent_attributes: Option<Attributes>,
    start: Time,
    stopped_nanos: i64,
    stopped: bool,

    action: Option<ActionScope>,
    resources: Vec<ResourceScope>,

    action_count: i64,
    resource_count: i64,
    error_count: i64,
    crash_count: i64,
    long_task_count: i64,
    frozen_frame_count: i64,
    frustration_count: i64,

    version: i64,
    pending_update: bool,
    custom_timings: BTreeMap<String, i64>,
    feature_flags: Attributes,
    loading_time: Option<i64>,

    vitals: VitalMonitors,
    cpu_initial_ticks: Option<f64>,
    network_settled: Arc<NetworkSettledMetricResolver>,
    interaction_to_next_view: Arc<InteractionToNextViewMetricResolver>,
}

impl std::fmt::Debug for ViewScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ViewScope")
            .field("view_id", &self.view_id)
            .field("key", &self.key)
            .field("view_type", &self.view_type)
            .field("stopped", &self.stopped)
            .field("version", &self.version)
            .finish_non_exhaustive()
    }
}

impl ViewScope {
    #[must_use]
    pub fn new(
        deps: Arc<RumDependencies>,
        interaction_to_next_view: Arc<InteractionToNextViewMetricResolver>,
        seed: ViewSeed,
        start: Time,
    ) -> Self {
        let view_id = deps.new_id();
        let vitals = if seed.view_type == ViewType::Background {
            VitalMonitors::no_op()
        } else {
            deps.vitals.clone()
        };
        let cpu_initial_ticks = vitals.cpu.last_known().map(|info| info.max_value);
        let network_settled = Arc::new(NetworkSettledMetricResolver::new(
            deps.initial_resource_identifier.clone(),
        ));
        network_settled.view_was_created(start.nano_time);
        interaction_to_next_view.on_view_created(&view_id, start.nano_time);
        debug!(%view_id, name = %seed.key.name, "View created");

        ViewScope {
            url: seed.key.url.replace('.', "/"),
            key: seed.key,
            view_id,
            view_type: seed.view_type,
            attributes: seed.attributes,
            frozen_parent_attributes: None,
            start,
            stopped_nanos: start.nano_time,
            stopped: false,
            action: None,
            resources: Vec::new(),
            action_count: 0,
            resource_count: 0,
            error_count: 0,
            crash_count: 0,
            long_task_count: 0,
            frozen_frame_count: 0,
            frustration_count: 0,
            version: 0,
            pending_update: false,
            custom_timings: BTreeMap::new(),
            feature_flags: Attributes::new(),
            loading_time: None,
            vitals,
            cpu_initial_ticks,
            network_settled,
            interaction_to_next_view,
            deps,
        }
    }

    #[must_use]
    pub fn view_id(&self) -> &str {
        &self.view_id
    }

    #[must_use]
    pub fn key(&self) -> &ViewKey {
        &self.key
    }

    #[must_use]
    pub const fn view_type(&self) -> ViewType {
        self.view_type
    }

    /// A view is active until it is stopped.
    #[must_use]
    pub const fn is_active(&self) -> bool {
        !self.stopped
    }

    #[must_use]
    pub fn seed(&self) -> ViewSeed {
        ViewSeed {
            key: self.key.clone(),
            attributes: self.attributes.clone(),
            view_type: self.view_type,
        }
    }

    #[must_use]
    pub const fn counters(&self) -> ViewCounters {
        ViewCounters {
            action: self.action_count,
            resource: self.resource_count,
            error: self.error_count,
            crash: self.crash_count,
            long_task: self.long_task_count,
            frozen_frame: self.frozen_frame_count,
            frustration: self.frustration_count,
        }
    }

    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.stopped && self.action.is_none() && self.resources.is_empty()
    }

    /// Identity of this view, as seen by its children.
    #[must_use]
    pub fn rum_context(&self, parent: &RumContext) -> RumContext {
        RumContext {
            view_id: Some(self.view_id.clone()),
            view_name: Some(self.key.name.clone()),
            view_url: Some(self.url.clone()),
            view_type: Some(self.view_type),
            action_id: self
                .action
                .as_ref()
                .filter(|action| action.is_active())
                .map(|action| action.action_id().to_string()),
            ..parent.clone()
        }
    }

    fn child_parent(&self, parent: &ParentScope) -> ParentScope {
        let ancestors = self
            .frozen_parent_attributes
            .as_ref()
            .unwrap_or(&parent.custom_attributes);
        ParentScope {
            rum_context: self.rum_context(&parent.rum_context),
            custom_attributes: merge([ancestors, &self.attributes]),
        }
    }

    pub fn handle_event(
        &mut self,
        event: &RawEvent,
        parent: &ParentScope,
        dispatch: &Dispatch<'_>,
    ) -> ScopeOutcome {
        match event {
            RawEvent::EventSent {
                view_id,
                event: storage_event,
                ..
            } if *view_id == self.view_id => self.on_event_sent(storage_event),
            RawEvent::EventDropped {
                view_id,
                event: storage_event,
                ..
            } if *view_id == self.view_id => self.on_event_dropped(storage_event),
            RawEvent::StartView { .. } | RawEvent::StopSession { .. } => {
                self.stop_scope(event, parent, dispatch);
            }
            RawEvent::StopView {
                key, attributes, ..
            } => {
                if key.id == self.key.id && !self.stopped {
                    self.attributes.extend(attributes.clone());
                    self.frozen_parent_attributes = Some(parent.custom_attributes.clone());
                    self.stop_scope(event, parent, dispatch);
                } else {
                    self.delegate_to_children(event, parent, dispatch);
                }
            }
            RawEvent::StartAction { .. } => self.on_start_action(event, parent, dispatch),
            RawEvent::StartResource { .. } => self.on_start_resource(event, parent, dispatch),
            RawEvent::AddError { .. } => self.on_add_error(event, parent, dispatch),
            RawEvent::AddLongTask { .. } => self.on_add_long_task(event, parent, dispatch),
            RawEvent::AddFeatureFlagEvaluation { name, value, .. } => {
                if !self.stopped && self.feature_flags.get(name) != Some(value) {
                    self.feature_flags.insert(name.clone(), value.clone());
                    self.pending_update = true;
                }
            }
            RawEvent::AddFeatureFlagEvaluations { flags, .. } => {
                if !self.stopped {
                    let changed = flags
                        .iter()
                        .any(|(name, value)| self.feature_flags.get(name) != Some(value));
                    if changed {
                        self.feature_flags.extend(flags.clone());
                        self.pending_update = true;
                    }
                }
            }
            RawEvent::AddCustomTiming { name, time } => {
                if !self.stopped {
                    let value = (time.nano_time - self.start.nano_time).max(1);
                    self.custom_timings.insert(name.clone(), value);
                    self.pending_update = true;
                }
            }
            RawEvent::AddViewLoadingTime { overwrite, time } => {
                self.on_add_view_loading_time(*overwrite, *time);
            }
            RawEvent::AddViewAttributes { attributes, .. } => {
                if !self.stopped {
                    self.attributes.extend(attributes.clone());
                }
            }
            RawEvent::RemoveViewAttributes { keys, .. } => {
                if !self.stopped {
                    for key in keys {
                        self.attributes.remove(key);
                    }
                }
            }
            RawEvent::KeepAlive { .. } => {
                self.delegate_to_children(event, parent, dispatch);
                if !self.stopped {
                    self.pending_update = true;
                }
            }
            RawEvent::ApplicationStarted {
                startup_nanos,
                time,
            } => {
                if self.view_type == ViewType::ApplicationLaunch && !self.stopped {
                    self.send_application_started(*startup_nanos, *time, parent, dispatch);
                }
            }
            _ => self.delegate_to_children(event, parent, dispatch),
        }

        if self.pending_update {
            self.send_view_update(event, parent, dispatch);
        }
        ScopeOutcome::from_complete(self.is_complete())
    }

    fn delegate_to_children(&mut self, event: &RawEvent, parent: &ParentScope, dispatch: &Dispatch<'_>) {
        let child = self.child_parent(parent);

        if let Some(action) = self.action.as_mut() {
            if action.handle_event(event, &child, dispatch).is_complete() {
                self.action_count += 1;
                self.frustration_count += action.frustration_count();
                self.action = None;
                self.pending_update = true;
            }
        }

        let converted_to_error = matches!(
            event,
            RawEvent::StopResourceWithError { .. } | RawEvent::StopResourceWithStackTrace { .. }
        );
        let registry = &self.deps.resource_keys;
        let network_settled = &self.network_settled;
        let mut finished = 0;
        let mut orphaned = 0;
        self.resources.retain_mut(|resource| {
            if resource.handle_event(event, &child, dispatch).is_complete() {
                finished += 1;
                return false;
            }
            if !registry.is_live(resource.key()) {
                debug!(
                    resource_id = %resource.resource_id(),
                    "Resource key released before the resource was stopped, dropping it"
                );
                network_settled.resource_was_dropped(resource.resource_id());
                orphaned += 1;
                return false;
            }
            true
        });
        if finished > 0 && converted_to_error {
            self.resource_count -= finished;
            self.error_count += finished;
        }
        if finished + orphaned > 0 {
            self.pending_update = true;
        }
    }

    fn stop_scope(&mut self, event: &RawEvent, parent: &ParentScope, dispatch: &Dispatch<'_>) {
        if self.stopped {
            self.delegate_to_children(event, parent, dispatch);
            return;
        }
        self.stopped = true;
        self.resolve_duration(event);
        self.send_view_update(event, parent, dispatch);
        self.delegate_to_children(event, parent, dispatch);
        self.network_settled.view_was_stopped();
    }

    fn resolve_duration(&mut self, event: &RawEvent) {
        let now = event.time().nano_time;
        let duration = now - self.start.nano_time;
        if duration > 0 {
            self.stopped_nanos = now;
            return;
        }
        self.stopped_nanos = self.start.nano_time + 1;
        let expected = matches!(event, RawEvent::KeepAlive { .. })
            || (self.view_type == ViewType::Background && event.is_fatal_error());
        if duration == 0 && !expected {
            warn!(
                "The computed duration for the view: {} was 0. In order to keep the view we forced it to 1ns.",
                self.key.name
            );
        } else if duration < 0 {
            warn!(
                "The computed duration for the view: {} was negative. In order to keep the view we forced it to 1ns.",
                self.key.name
            );
        }
    }

    fn on_start_action(&mut self, event: &RawEvent, parent: &ParentScope, dispatch: &Dispatch<'_>) {
        self.delegate_to_children(event, parent, dispatch);
        if self.stopped {
            return;
        }
        let RawEvent::StartAction {
            action_type,
            name,
            wait_for_stop,
            attributes,
            time,
        } = event
        else {
            return;
        };

        if self.action.is_none() {
            self.action = Some(ActionScope::new(
                self.deps.clone(),
                *action_type,
                name.clone(),
                *wait_for_stop,
                attributes.clone(),
                *time,
            ));
            return;
        }

        if *action_type == ActionType::Custom && !*wait_for_stop {
            let mut custom = ActionScope::new(
                self.deps.clone(),
                ActionType::Custom,
                name.clone(),
                false,
                attributes.clone(),
                *time,
            );
            let child = self.child_parent(parent);
            custom.handle_event(&RawEvent::SendCustomActionNow { time: *time }, &child, dispatch);
            self.action_count += 1;
            self.frustration_count += custom.frustration_count();
            self.pending_update = true;
        } else {
            warn!(
                "RUM Action ({:?} on {}) was dropped, because another action is still active for the same view",
                action_type, name
            );
        }
    }

    fn on_start_resource(&mut self, event: &RawEvent, parent: &ParentScope, dispatch: &Dispatch<'_>) {
        self.delegate_to_children(event, parent, dispatch);
        if self.stopped {
            return;
        }
        let RawEvent::StartResource {
            key,
            url,
            method,
            attributes,
            time,
        } = event
        else {
            return;
        };
        let context = self.rum_context(&parent.rum_context);
        self.resources.push(ResourceScope::new(
            self.deps.clone(),
            self.network_settled.clone(),
            context,
            key.clone(),
            url.clone(),
            *method,
            attributes.clone(),
            *time,
        ));
        self.resource_count += 1;
    }

    fn on_add_error(&mut self, event: &RawEvent, parent: &ParentScope, dispatch: &Dispatch<'_>) {
        self.delegate_to_children(event, parent, dispatch);
        if self.stopped {
            return;
        }
        let RawEvent::AddError {
            message,
            source,
            error_type,
            stack_trace,
            category,
            attributes,
            time,
            ..
        } = event
        else {
            return;
        };
        let is_fatal = event.is_fatal_error();
        if is_fatal && self.crash_count > 0 {
            debug!(view_id = %self.view_id, "Ignoring fatal error: a crash was already reported for this view");
            return;
        }

        let child = self.child_parent(parent);
        let mut attributes = merge([&child.custom_attributes, attributes]);
        attributes.remove(INTERNAL_ERROR_IS_CRASH);
        let fingerprint = take_string(&mut attributes, ERROR_FINGERPRINT);
        let data = ErrorData {
            id: self.deps.new_id(),
            message: message.clone(),
            source: *source,
            stack: stack_trace.clone(),
            is_crash: is_fatal,
            fingerprint,
            error_type: error_type.clone(),
            category: category.or_else(|| stack_trace.as_ref().map(|_| ErrorCategory::Exception)),
            resource: None,
            source_type: SOURCE_TYPE.to_string(),
        };
        let event_type = if is_fatal {
            EventType::Crash
        } else {
            EventType::Default
        };
        let storage_event = StorageEvent::Error {
            resource_id: None,
            resource_end_nanos: None,
        };
        let context = &child.rum_context;
        let feature_flags = self.feature_flags.clone();
        let sample_rate = self.deps.config.session_sample_rate;
        dispatch
            .emitter
            .emit(&self.view_id, &storage_event, event_type, |datadog_context| {
                RumEvent::Error(ErrorEvent {
                    envelope: Envelope::new(time.timestamp, context, datadog_context, attributes, sample_rate),
                    view: ViewRef::from_context(context),
                    action: ActionLink::from_context(context),
                    error: data,
                    feature_flags,
                })
            });

        self.error_count += 1;
        if is_fatal {
            self.crash_count += 1;
        }
        self.pending_update = true;
    }

    fn on_add_long_task(&mut self, event: &RawEvent, parent: &ParentScope, dispatch: &Dispatch<'_>) {
        self.delegate_to_children(event, parent, dispatch);
        if self.stopped {
            return;
        }
        let RawEvent::AddLongTask {
            duration_ns,
            target,
            time,
        } = event
        else {
            return;
        };

        let child = self.child_parent(parent);
        let mut attributes = child.custom_attributes.clone();
        attributes.insert(
            LONG_TASK_TARGET_ATTRIBUTE.to_string(),
            Value::String(target.clone()),
        );
        let is_frozen_frame = *duration_ns > FROZEN_FRAME_THRESHOLD_NS;
        let timestamp = time.timestamp - duration_ns / NANOS_PER_MILLI;
        let storage_event = StorageEvent::LongTask { is_frozen_frame };
        let context = &child.rum_context;
        let long_task = LongTaskData {
            id: self.deps.new_id(),
            duration: *duration_ns,
            is_frozen_frame,
        };
        let sample_rate = self.deps.config.session_sample_rate;
        dispatch
            .emitter
            .emit(&self.view_id, &storage_event, EventType::Default, |datadog_context| {
                RumEvent::LongTask(LongTaskEvent {
                    envelope: Envelope::new(timestamp, context, datadog_context, attributes, sample_rate),
                    view: ViewRef::from_context(context),
                    action: ActionLink::from_context(context),
                    long_task,
                })
            });

        self.long_task_count += 1;
        if is_frozen_frame {
            self.frozen_frame_count += 1;
        }
        self.pending_update = true;
    }

    fn on_add_view_loading_time(&mut self, overwrite: bool, time: Time) {
        if self.stopped {
            return;
        }
        let value = (time.nano_time - self.start.nano_time).max(1);
        match self.loading_time {
            None => {
                debug!("View loading time {value}ns added to the view {}", self.key.name);
            }
            Some(previous) if overwrite => {
                warn!(
                    "View loading time already exists for the view {}. Replacing the existing {previous} ns view loading time with the new {value} ns loading time.",
                    self.key.name
                );
            }
            Some(_) => {
                debug!(
                    "View loading time already exists for the view {}, keeping it",
                    self.key.name
                );
                return;
            }
        }
        self.loading_time = Some(value);
        self.pending_update = true;
    }

    fn send_application_started(
        &mut self,
        startup_nanos: i64,
        time: Time,
        parent: &ParentScope,
        dispatch: &Dispatch<'_>,
    ) {
        let child = self.child_parent(parent);
        let context = &child.rum_context;
        let attributes = child.custom_attributes.clone();
        let loading_time = startup_nanos.max(1);
        let storage_event = StorageEvent::Action {
            frustration_count: 0,
            action_type: ActionType::ApplicationStart,
            event_end_nanos: time.nano_time + loading_time,
        };
        let action = ActionData {
            action_type: ActionType::ApplicationStart,
            id: self.deps.new_id(),
            target: None,
            error: Count::from(0),
            crash: Count::from(0),
            long_task: Count::from(0),
            resource: Count::from(0),
            loading_time,
            frustration: None,
        };
        let sample_rate = self.deps.config.session_sample_rate;
        dispatch
            .emitter
            .emit(&self.view_id, &storage_event, EventType::Default, |datadog_context| {
                RumEvent::Action(ActionEvent {
                    envelope: Envelope::new(time.timestamp, context, datadog_context, attributes, sample_rate),
                    view: ViewRef::from_context(context),
                    action,
                })
            });
        self.action_count += 1;
        self.pending_update = true;
    }

    fn on_event_sent(&mut self, storage_event: &StorageEvent) {
        let settled_before = self.network_settled.resolve_metric();
        match storage_event {
            StorageEvent::Action {
                action_type,
                event_end_nanos,
                ..
            } => {
                self.interaction_to_next_view
                    .on_action_sent(&self.view_id, *action_type, *event_end_nanos);
            }
            StorageEvent::Resource {
                resource_id,
                resource_end_nanos,
            }
            | StorageEvent::Error {
                resource_id: Some(resource_id),
                resource_end_nanos: Some(resource_end_nanos),
            } => {
                self.network_settled
                    .resource_was_stopped(resource_id, *resource_end_nanos);
            }
            _ => {}
        }
        if self.network_settled.resolve_metric() != settled_before {
            self.pending_update = true;
        }
    }

    fn on_event_dropped(&mut self, storage_event: &StorageEvent) {
        let settled_before = self.network_settled.resolve_metric();
        if let StorageEvent::Resource { resource_id, .. }
        | StorageEvent::Error {
            resource_id: Some(resource_id),
            ..
        } = storage_event
        {
            self.network_settled.resource_was_dropped(resource_id);
        }
        if self.network_settled.resolve_metric() != settled_before {
            self.pending_update = true;
        }
    }

    fn send_view_update(&mut self, event: &RawEvent, parent: &ParentScope, dispatch: &Dispatch<'_>) {
        self.pending_update = false;
        if !self.stopped {
            self.resolve_live_duration(event);
        }
        self.version += 1;
        let duration = self.stopped_nanos - self.start.nano_time;
        let is_active = !self.is_complete();

        let cpu_ticks = match (self.cpu_initial_ticks, self.vitals.cpu.last_known()) {
            (Some(initial), Some(info)) => Some(info.max_value - initial),
            (None, Some(info)) => {
                self.cpu_initial_ticks = Some(info.max_value);
                None
            }
            _ => None,
        };
        #[allow(clippy::cast_precision_loss)]
        let cpu_ticks_per_second = cpu_ticks
            .filter(|_| duration >= NANOS_PER_SECOND)
            .map(|ticks| ticks * NANOS_PER_SECOND as f64 / duration as f64);
        let memory = self.vitals.memory.last_known();
        let refresh_rate = self.vitals.frame_rate.last_known();

        let child = self.child_parent(parent);
        let context = &child.rum_context;
        let attributes = child.custom_attributes.clone();
        let view = ViewData {
            reference: ViewRef {
                id: self.view_id.clone(),
                name: Some(self.key.name.clone()),
                url: self.url.clone(),
            },
            time_spent: duration,
            is_active,
            action: Count::from(self.action_count),
            resource: Count::from(self.resource_count),
            error: Count::from(self.error_count),
            crash: Count::from(self.crash_count),
            long_task: Count::from(self.long_task_count),
            frozen_frame: Count::from(self.frozen_frame_count),
            frustration: Count::from(self.frustration_count),
            custom_timings: (!self.custom_timings.is_empty()).then(|| self.custom_timings.clone()),
            loading_time: self.loading_time,
            cpu_ticks_count: cpu_ticks,
            cpu_ticks_per_second,
            memory_average: memory.map(|info| info.mean_value),
            memory_max: memory.map(|info| info.max_value),
            refresh_rate_average: refresh_rate.map(|info| info.mean_value),
            refresh_rate_min: refresh_rate.map(|info| info.min_value),
            is_slow_rendered: refresh_rate.map(|info| info.mean_value < SLOW_RENDERED_THRESHOLD_FPS),
            network_settled_time: self.network_settled.resolve_metric(),
            interaction_to_next_view_time: self.interaction_to_next_view.resolve_metric(&self.view_id),
        };
        let event_type = if event.is_fatal_error() {
            EventType::Crash
        } else {
            EventType::Default
        };
        let version = self.version;
        let feature_flags = self.feature_flags.clone();
        let sample_rate = self.deps.config.session_sample_rate;
        let start = self.start;
        let outcome = dispatch
            .emitter
            .emit(&self.view_id, &StorageEvent::View, event_type, |datadog_context| {
                let mut envelope =
                    Envelope::new(start.timestamp, context, datadog_context, attributes, sample_rate);
                envelope.session.is_active = Some(context.is_session_active);
                envelope.dd.document_version = Some(version);
                RumEvent::View(ViewEvent {
                    envelope,
                    view,
                    feature_flags,
                })
            });

        if outcome != WriteOutcome::Suppressed {
            self.deps.session_metrics.on_view_tracked(
                &context.session_id,
                &TrackedViewUpdate {
                    view_id: self.view_id.clone(),
                    view_url: self.url.clone(),
                    view_type: self.view_type,
                    start_ms: start.corrected_timestamp(dispatch.datadog_context.server_time_offset_ms),
                    duration_ns: duration,
                },
            );
        }
    }

    fn resolve_live_duration(&mut self, event: &RawEvent) {
        let now = event.time().nano_time;
        if now > self.start.nano_time {
            self.stopped_nanos = now;
        } else {
            self.resolve_duration(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RumConfig;
    use crate::context::SessionState;
    use crate::event::{ErrorSource, ResourceKind, ResourceMethod};
    use crate::scope::test_support::{at, attrs, deps, deps_with, Recorder, MS};
    use crate::vitals::{AggregatingVitalMonitor, VitalMonitor};
    use serde_json::json;
    use tracing_test::traced_test;

    fn parent() -> ParentScope {
        ParentScope {
            rum_context: RumContext {
                session_id: "session".to_string(),
                session_state: SessionState::Tracked,
                ..RumContext::new("app")
            },
            custom_attributes: attrs(&[("global", json!("g"))]),
        }
    }

    fn view(deps: &Arc<RumDependencies>, view_type: ViewType) -> ViewScope {
        ViewScope::new(
            deps.clone(),
            Arc::new(InteractionToNextViewMetricResolver::default()),
            ViewSeed {
                key: ViewKey::new("home", "com.example.Home", "Home"),
                attributes: attrs(&[("screen", json!("home"))]),
                view_type,
            },
            at(0),
        )
    }

    fn error(ms: i64, is_fatal: bool) -> RawEvent {
        RawEvent::AddError {
            message: "boom".to_string(),
            source: ErrorSource::Source,
            error_type: None,
            stack_trace: Some("at Foo.bar()".to_string()),
            category: None,
            is_fatal,
            attributes: Attributes::new(),
            time: at(ms),
        }
    }

    fn start_resource(key: crate::resource_key::ResourceKey, ms: i64) -> RawEvent {
        RawEvent::StartResource {
            key,
            url: "https://example.com/a".to_string(),
            method: ResourceMethod::Get,
            attributes: Attributes::new(),
            time: at(ms),
        }
    }

    fn stop_view(ms: i64) -> RawEvent {
        RawEvent::StopView {
            key: ViewKey::new("home", "com.example.Home", "Home"),
            attributes: Attributes::new(),
            time: at(ms),
        }
    }

    #[test]
    fn test_keep_alive_emits_versioned_updates() {
        let deps = deps();
        let recorder = Recorder::default();
        let mut view = view(&deps, ViewType::Foreground);

        view.handle_event(&RawEvent::KeepAlive { time: at(0) }, &parent(), &recorder.dispatch());
        view.handle_event(&RawEvent::KeepAlive { time: at(10) }, &parent(), &recorder.dispatch());

        let views = recorder.views();
        assert_eq!(views.len(), 2);
        assert_eq!(views[0].envelope.dd.document_version, Some(1));
        assert_eq!(views[1].envelope.dd.document_version, Some(2));
        assert_eq!(views[0].view.time_spent, 1);
        assert_eq!(views[1].view.time_spent, 10 * MS);
        assert_eq!(views[1].view.reference.url, "com/example/Home");
        assert!(views[1].view.is_active);
        assert_eq!(views[1].envelope.context.get("global"), Some(&json!("g")));
        assert_eq!(views[1].envelope.context.get("screen"), Some(&json!("home")));
    }

    #[test]
    fn test_stop_view_with_pending_resource_stays_until_resource_ends() {
        let deps = deps();
        let recorder = Recorder::default();
        let mut view = view(&deps, ViewType::Foreground);
        let key = deps.resource_keys.issue();

        view.handle_event(&start_resource(key.clone(), 5), &parent(), &recorder.dispatch());
        let outcome = view.handle_event(&stop_view(20), &parent(), &recorder.dispatch());
        assert_eq!(outcome, ScopeOutcome::Active);
        assert!(recorder.last_view().view.is_active);
        assert_eq!(recorder.last_view().view.time_spent, 20 * MS);

        let outcome = view.handle_event(
            &RawEvent::StopResource {
                key,
                status_code: Some(200),
                size: None,
                kind: ResourceKind::Native,
                attributes: Attributes::new(),
                time: at(40),
            },
            &parent(),
            &recorder.dispatch(),
        );
        assert_eq!(outcome, ScopeOutcome::Complete);
        let last = recorder.last_view();
        assert!(!last.view.is_active);
        assert_eq!(last.view.time_spent, 20 * MS);
        assert_eq!(last.view.resource.count, 1);
    }

    #[test]
    fn test_resource_error_moves_count_from_resource_to_error() {
        let deps = deps();
        let recorder = Recorder::default();
        let mut view = view(&deps, ViewType::Foreground);
        let key = deps.resource_keys.issue();

        view.handle_event(&start_resource(key.clone(), 5), &parent(), &recorder.dispatch());
        view.handle_event(
            &RawEvent::StopResourceWithError {
                key,
                status_code: Some(500),
                message: "server error".to_string(),
                source: ErrorSource::Network,
                error_type: None,
                stack_trace: None,
                attributes: Attributes::new(),
                time: at(30),
            },
            &parent(),
            &recorder.dispatch(),
        );

        let last = recorder.last_view();
        assert_eq!(last.view.resource.count, 0);
        assert_eq!(last.view.error.count, 1);
    }

    #[test]
    fn test_released_resource_key_drops_orphan() {
        let deps = deps();
        let recorder = Recorder::default();
        let mut view = view(&deps, ViewType::Foreground);
        let key = deps.resource_keys.issue();

        view.handle_event(&start_resource(key.clone(), 5), &parent(), &recorder.dispatch());
        view.handle_event(&stop_view(10), &parent(), &recorder.dispatch());
        deps.resource_keys.release(&key);

        let outcome = view.handle_event(&RawEvent::KeepAlive { time: at(20) }, &parent(), &recorder.dispatch());
        assert_eq!(outcome, ScopeOutcome::Complete);
        assert!(!recorder.last_view().view.is_active);
    }

    #[test]
    fn test_second_fatal_error_is_ignored() {
        let deps = deps();
        let recorder = Recorder::default();
        let mut view = view(&deps, ViewType::Foreground);

        view.handle_event(&error(10, true), &parent(), &recorder.dispatch());
        view.handle_event(&error(20, true), &parent(), &recorder.dispatch());
        view.handle_event(&error(30, false), &parent(), &recorder.dispatch());

        let errors: Vec<_> = recorder
            .records()
            .iter()
            .filter_map(|r| r.as_error().cloned())
            .collect();
        assert_eq!(errors.len(), 2);
        assert!(errors[0].error.is_crash);
        assert_eq!(errors[0].error.category, Some(ErrorCategory::Exception));
        assert!(!errors[1].error.is_crash);
        let last = recorder.last_view();
        assert_eq!(last.view.crash.count, 1);
        assert_eq!(last.view.error.count, 2);
        assert!(recorder.event_types().contains(&EventType::Crash));
    }

    #[test]
    fn test_crash_attribute_marks_error_fatal() {
        let deps = deps();
        let recorder = Recorder::default();
        let mut view = view(&deps, ViewType::Foreground);

        view.handle_event(
            &RawEvent::AddError {
                message: "js crash".to_string(),
                source: ErrorSource::Source,
                error_type: None,
                stack_trace: None,
                category: None,
                is_fatal: false,
                attributes: attrs(&[(INTERNAL_ERROR_IS_CRASH, json!(true)), (ERROR_FINGERPRINT, json!("fp"))]),
                time: at(5),
            },
            &parent(),
            &recorder.dispatch(),
        );

        let records = recorder.records();
        let error = records[0].as_error().unwrap();
        assert!(error.error.is_crash);
        assert_eq!(error.error.fingerprint.as_deref(), Some("fp"));
        assert!(!error.envelope.context.contains_key(INTERNAL_ERROR_IS_CRASH));
    }

    #[test]
    fn test_long_task_and_frozen_frame() {
        let deps = deps();
        let recorder = Recorder::default();
        let mut view = view(&deps, ViewType::Foreground);

        view.handle_event(
            &RawEvent::AddLongTask {
                duration_ns: 800 * MS,
                target: "main".to_string(),
                time: at(1_000),
            },
            &parent(),
            &recorder.dispatch(),
        );

        let records = recorder.records();
        let long_task = records[0].as_long_task().unwrap();
        assert!(long_task.long_task.is_frozen_frame);
        assert_eq!(long_task.envelope.date, at(1_000).timestamp - 800);
        assert_eq!(
            long_task.envelope.context.get(LONG_TASK_TARGET_ATTRIBUTE),
            Some(&json!("main"))
        );
        let last = recorder.last_view();
        assert_eq!(last.view.long_task.count, 1);
        assert_eq!(last.view.frozen_frame.count, 1);
    }

    #[test]
    fn test_concurrent_action_is_dropped_but_custom_is_sent() {
        let deps = deps();
        let recorder = Recorder::default();
        let mut view = view(&deps, ViewType::Foreground);
        let start_action = |action_type, ms| RawEvent::StartAction {
            action_type,
            name: "button".to_string(),
            wait_for_stop: false,
            attributes: Attributes::new(),
            time: at(ms),
        };

        view.handle_event(&start_action(ActionType::Tap, 0), &parent(), &recorder.dispatch());
        view.handle_event(&start_action(ActionType::Scroll, 10), &parent(), &recorder.dispatch());
        view.handle_event(&start_action(ActionType::Custom, 20), &parent(), &recorder.dispatch());
        view.handle_event(&RawEvent::KeepAlive { time: at(500) }, &parent(), &recorder.dispatch());

        let actions: Vec<_> = recorder
            .records()
            .iter()
            .filter_map(|r| r.as_action().cloned())
            .collect();
        assert_eq!(actions.len(), 2);
        assert_eq!(actions[0].action.action_type, ActionType::Custom);
        assert_eq!(actions[1].action.action_type, ActionType::Tap);
        assert_eq!(recorder.last_view().view.action.count, 2);
    }

    #[test]
    fn test_records_link_active_action() {
        let deps = deps();
        let recorder = Recorder::default();
        let mut view = view(&deps, ViewType::Foreground);
        view.handle_event(
            &RawEvent::StartAction {
                action_type: ActionType::Tap,
                name: "button".to_string(),
                wait_for_stop: false,
                attributes: Attributes::new(),
                time: at(0),
            },
            &parent(),
            &recorder.dispatch(),
        );
        let action_id = view.rum_context(&parent().rum_context).action_id;
        assert!(action_id.is_some());

        view.handle_event(&error(10, false), &parent(), &recorder.dispatch());

        let records = recorder.records();
        let error = records.iter().find_map(RumEvent::as_error).unwrap();
        assert_eq!(error.action.as_ref().map(|a| a.id.clone()), action_id.map(|id| vec![id]));
    }

    #[test]
    fn test_feature_flags_update_only_on_change() {
        let deps = deps();
        let recorder = Recorder::default();
        let mut view = view(&deps, ViewType::Foreground);
        let flag = |value: Value| RawEvent::AddFeatureFlagEvaluation {
            name: "dark_mode".to_string(),
            value,
            time: at(5),
        };

        view.handle_event(&flag(json!(true)), &parent(), &recorder.dispatch());
        view.handle_event(&flag(json!(true)), &parent(), &recorder.dispatch());
        view.handle_event(&flag(json!(false)), &parent(), &recorder.dispatch());

        let views = recorder.views();
        assert_eq!(views.len(), 2);
        assert_eq!(views[1].feature_flags.get("dark_mode"), Some(&json!(false)));
    }

    #[traced_test]
    #[test]
    fn test_view_loading_time_overwrite_rules() {
        let deps = deps();
        let recorder = Recorder::default();
        let mut view = view(&deps, ViewType::Foreground);

        view.handle_event(&RawEvent::AddViewLoadingTime { overwrite: false, time: at(100) }, &parent(), &recorder.dispatch());
        view.handle_event(&RawEvent::AddViewLoadingTime { overwrite: false, time: at(200) }, &parent(), &recorder.dispatch());
        assert_eq!(recorder.last_view().view.loading_time, Some(100 * MS));

        view.handle_event(&RawEvent::AddViewLoadingTime { overwrite: true, time: at(300) }, &parent(), &recorder.dispatch());
        assert_eq!(recorder.last_view().view.loading_time, Some(300 * MS));
        assert!(logs_contain("View loading time already exists for the view Home"));
    }

    #[test]
    fn test_custom_timing_and_attributes() {
        let deps = deps();
        let recorder = Recorder::default();
        let mut view = view(&deps, ViewType::Foreground);

        view.handle_event(
            &RawEvent::AddViewAttributes { attributes: attrs(&[("tab", json!(2))]), time: at(1) },
            &parent(),
            &recorder.dispatch(),
        );
        view.handle_event(
            &RawEvent::RemoveViewAttributes { keys: vec!["screen".to_string()], time: at(2) },
            &parent(),
            &recorder.dispatch(),
        );
        view.handle_event(
            &RawEvent::AddCustomTiming { name: "hero_image".to_string(), time: at(250) },
            &parent(),
            &recorder.dispatch(),
        );

        let last = recorder.last_view();
        assert_eq!(last.view.custom_timings.unwrap().get("hero_image"), Some(&(250 * MS)));
        assert_eq!(last.envelope.context.get("tab"), Some(&json!(2)));
        assert!(!last.envelope.context.contains_key("screen"));
    }

    #[test]
    fn test_application_started_on_launch_view() {
        let deps = deps();
        let recorder = Recorder::default();
        let mut view = view(&deps, ViewType::ApplicationLaunch);

        view.handle_event(
            &RawEvent::ApplicationStarted { startup_nanos: 250 * MS, time: at(0) },
            &parent(),
            &recorder.dispatch(),
        );

        let records = recorder.records();
        let action = records.iter().find_map(RumEvent::as_action).unwrap();
        assert_eq!(action.action.action_type, ActionType::ApplicationStart);
        assert_eq!(action.action.loading_time, 250 * MS);
        assert_eq!(recorder.last_view().view.action.count, 1);
    }

    #[test]
    fn test_vitals_are_reported() {
        let cpu = Arc::new(AggregatingVitalMonitor::new());
        let frame_rate = Arc::new(AggregatingVitalMonitor::new());
        cpu.record(100.0);
        let deps = Arc::new(
            RumDependencies::new(RumConfig::default()).with_vitals(VitalMonitors {
                cpu: cpu.clone(),
                memory: Arc::new(crate::vitals::NoOpVitalMonitor),
                frame_rate: frame_rate.clone(),
            }),
        );
        let recorder = Recorder::default();
        let mut view = view(&deps, ViewType::Foreground);
        cpu.record(160.0);
        frame_rate.record(40.0);
        frame_rate.record(50.0);

        view.handle_event(&RawEvent::KeepAlive { time: at(2_000) }, &parent(), &recorder.dispatch());

        let last = recorder.last_view();
        assert_eq!(last.view.cpu_ticks_count, Some(60.0));
        assert_eq!(last.view.cpu_ticks_per_second, Some(30.0));
        assert_eq!(last.view.refresh_rate_average, Some(45.0));
        assert_eq!(last.view.refresh_rate_min, Some(40.0));
        assert_eq!(last.view.is_slow_rendered, Some(true));
        assert_eq!(last.view.memory_average, None);
        assert!(cpu.last_known().is_some());
    }

    #[test]
    fn test_background_view_ignores_vitals() {
        let cpu = Arc::new(AggregatingVitalMonitor::new());
        cpu.record(1.0);
        let deps = Arc::new(RumDependencies::new(RumConfig::default()).with_vitals(VitalMonitors {
            cpu: cpu.clone(),
            memory: cpu.clone(),
            frame_rate: cpu,
        }));
        let recorder = Recorder::default();
        let mut view = view(&deps, ViewType::Background);
        view.handle_event(&RawEvent::KeepAlive { time: at(2_000) }, &parent(), &recorder.dispatch());
        let last = recorder.last_view();
        assert_eq!(last.view.memory_max, None);
        assert_eq!(last.view.refresh_rate_average, None);
    }

    #[traced_test]
    #[test]
    fn test_zero_duration_stop_is_forced_to_one_ns() {
        let deps = deps_with(RumConfig::default());
        let recorder = Recorder::default();
        let mut view = view(&deps, ViewType::Foreground);

        view.handle_event(&stop_view(0), &parent(), &recorder.dispatch());

        assert_eq!(recorder.last_view().view.time_spent, 1);
        assert!(logs_contain("was 0. In order to keep the view"));
    }

    #[test]
    fn test_suppressed_dispatch_still_counts() {
        let deps = deps();
        let recorder = Recorder::default();
        let suppressed = recorder.dispatch().suppressed();
        let mut view = view(&deps, ViewType::Foreground);

        view.handle_event(&error(1, false), &parent(), &suppressed);
        assert!(recorder.records().is_empty());
        assert!(recorder.sent().is_empty());

        view.handle_event(&RawEvent::KeepAlive { time: at(2) }, &parent(), &recorder.dispatch());
        assert_eq!(recorder.last_view().view.error.count, 1);
    }
}
