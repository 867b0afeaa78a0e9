// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Finalized telemetry records.
//!
//! Records are immutable once built. They derive `Serialize` so that writers
//! can encode them, but the core never chooses a wire format itself.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::attributes::Attributes;
use crate::context::{DatadogContext, DeviceInfo, NetworkInfo, RumContext, StartReason};
use crate::event::{ActionType, ErrorCategory, ErrorSource, ResourceKind, ResourceMethod};

/// Write priority of a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EventType {
    #[default]
    Default,
    /// The record describes a crash and must be persisted synchronously.
    Crash,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Application {
    pub id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionType {
    User,
    Synthetics,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionRef {
    pub id: String,
    #[serde(rename = "type")]
    pub session_type: SessionType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_active: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ViewRef {
    pub id: String,
    pub name: Option<String>,
    pub url: String,
}

impl ViewRef {
    #[must_use]
    pub fn from_context(context: &RumContext) -> Self {
        ViewRef {
            id: context.view_id.clone().unwrap_or_default(),
            name: context.view_name.clone(),
            url: context.view_url.clone().unwrap_or_default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Synthetics {
    pub test_id: String,
    pub result_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Usr {
    pub id: Option<String>,
    pub name: Option<String>,
    pub email: Option<String>,
    #[serde(flatten)]
    pub additional_properties: Attributes,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DdSession {
    pub session_precondition: StartReason,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Configuration {
    pub session_sample_rate: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Dd {
    pub session: DdSession,
    pub configuration: Configuration,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub document_version: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub span_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rule_psr: Option<f64>,
}

impl Dd {
    #[must_use]
    pub fn new(start_reason: StartReason, sample_rate: f32) -> Self {
        Dd {
            session: DdSession {
                session_precondition: start_reason,
            },
            configuration: Configuration {
                session_sample_rate: sample_rate,
            },
            document_version: None,
            trace_id: None,
            span_id: None,
            rule_psr: None,
        }
    }
}

/// Fields shared by every record kind.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Envelope {
    pub date: i64,
    pub application: Application,
    pub session: SessionRef,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usr: Option<Usr>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub synthetics: Option<Synthetics>,
    pub source: String,
    pub service: String,
    pub version: String,
    pub ddtags: String,
    pub connectivity: NetworkInfo,
    pub device: DeviceInfo,
    pub context: Attributes,
    pub dd: Dd,
}

impl Envelope {
    /// Builds the shared fields of a record dated at `timestamp_ms` (device clock).
    #[must_use]
    pub fn new(
        timestamp_ms: i64,
        rum_context: &RumContext,
        datadog_context: &DatadogContext,
        attributes: Attributes,
        sample_rate: f32,
    ) -> Self {
        let synthetics = rum_context
            .synthetics()
            .map(|(test_id, result_id)| Synthetics {
                test_id: test_id.to_string(),
                result_id: result_id.to_string(),
            });
        let session_type = if synthetics.is_some() {
            SessionType::Synthetics
        } else {
            SessionType::User
        };
        let user = &datadog_context.user_info;
        Envelope {
            date: timestamp_ms + datadog_context.server_time_offset_ms,
            application: Application {
                id: rum_context.application_id.clone(),
            },
            session: SessionRef {
                id: rum_context.session_id.clone(),
                session_type,
                is_active: None,
            },
            usr: user.has_user_data().then(|| Usr {
                id: user.id.clone(),
                name: user.name.clone(),
                email: user.email.clone(),
                additional_properties: user.additional_properties.clone(),
            }),
            synthetics,
            source: datadog_context.source.clone(),
            service: datadog_context.service.clone(),
            version: datadog_context.version.clone(),
            ddtags: datadog_context.dd_tags(),
            connectivity: datadog_context.network_info.clone(),
            device: datadog_context.device_info.clone(),
            context: attributes,
            dd: Dd::new(rum_context.session_start_reason, sample_rate),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Count {
    pub count: i64,
}

impl From<i64> for Count {
    fn from(count: i64) -> Self {
        Count { count }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActionTarget {
    pub name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FrustrationType {
    RageTap,
    DeadTap,
    ErrorTap,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Frustration {
    #[serde(rename = "type")]
    pub types: Vec<FrustrationType>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActionData {
    #[serde(rename = "type")]
    pub action_type: ActionType,
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<ActionTarget>,
    pub error: Count,
    pub crash: Count,
    pub long_task: Count,
    pub resource: Count,
    pub loading_time: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frustration: Option<Frustration>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActionEvent {
    #[serde(flatten)]
    pub envelope: Envelope,
    pub view: ViewRef,
    pub action: ActionData,
}

/// Links a child record to the action open when it happened.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActionLink {
    pub id: Vec<String>,
}

impl ActionLink {
    #[must_use]
    pub fn from_context(context: &RumContext) -> Option<Self> {
        context
            .action_id
            .as_ref()
            .map(|id| ActionLink { id: vec![id.clone()] })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TimingPhase {
    pub start: i64,
    pub duration: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderType {
    FirstParty,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Provider {
    pub domain: String,
    #[serde(rename = "type")]
    pub provider_type: ProviderType,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResourceData {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: ResourceKind,
    pub url: String,
    pub method: ResourceMethod,
    pub status_code: Option<i64>,
    pub size: Option<i64>,
    pub duration: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dns: Option<TimingPhase>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connect: Option<TimingPhase>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ssl: Option<TimingPhase>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_byte: Option<TimingPhase>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub download: Option<TimingPhase>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<Provider>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResourceEvent {
    #[serde(flatten)]
    pub envelope: Envelope,
    pub view: ViewRef,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action: Option<ActionLink>,
    pub resource: ResourceData,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorResource {
    pub url: String,
    pub method: ResourceMethod,
    pub status_code: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<Provider>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorData {
    pub id: String,
    pub message: String,
    pub source: ErrorSource,
    pub stack: Option<String>,
    pub is_crash: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fingerprint: Option<String>,
    #[serde(rename = "type")]
    pub error_type: Option<String>,
    pub category: Option<ErrorCategory>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource: Option<ErrorResource>,
    pub source_type: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorEvent {
    #[serde(flatten)]
    pub envelope: Envelope,
    pub view: ViewRef,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action: Option<ActionLink>,
    pub error: ErrorData,
    pub feature_flags: Attributes,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LongTaskData {
    pub id: String,
    pub duration: i64,
    pub is_frozen_frame: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LongTaskEvent {
    #[serde(flatten)]
    pub envelope: Envelope,
    pub view: ViewRef,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action: Option<ActionLink>,
    pub long_task: LongTaskData,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ViewData {
    #[serde(flatten)]
    pub reference: ViewRef,
    pub time_spent: i64,
    pub is_active: bool,
    pub action: Count,
    pub resource: Count,
    pub error: Count,
    pub crash: Count,
    pub long_task: Count,
    pub frozen_frame: Count,
    pub frustration: Count,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub custom_timings: Option<BTreeMap<String, i64>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub loading_time: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cpu_ticks_count: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cpu_ticks_per_second: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory_average: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory_max: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_rate_average: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_rate_min: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_slow_rendered: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub network_settled_time: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interaction_to_next_view_time: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ViewEvent {
    #[serde(flatten)]
    pub envelope: Envelope,
    pub view: ViewData,
    pub feature_flags: Attributes,
}

/// Any finalized record.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RumEvent {
    Action(ActionEvent),
    Resource(ResourceEvent),
    Error(ErrorEvent),
    LongTask(LongTaskEvent),
    View(ViewEvent),
}

impl RumEvent {
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            RumEvent::Action(_) => "action",
            RumEvent::Resource(_) => "resource",
            RumEvent::Error(_) => "error",
            RumEvent::LongTask(_) => "long_task",
            RumEvent::View(_) => "view",
        }
    }

    #[must_use]
    pub fn envelope(&self) -> &Envelope {
        match self {
            RumEvent::Action(e) => &e.envelope,
            RumEvent::Resource(e) => &e.envelope,
            RumEvent::Error(e) => &e.envelope,
            RumEvent::LongTask(e) => &e.envelope,
            RumEvent::View(e) => &e.envelope,
        }
    }

    #[must_use]
    pub fn session_id(&self) -> &str {
        &self.envelope().session.id
    }

    #[must_use]
    pub fn view_id(&self) -> &str {
        match self {
            RumEvent::Action(e) => &e.view.id,
            RumEvent::Resource(e) => &e.view.id,
            RumEvent::Error(e) => &e.view.id,
            RumEvent::LongTask(e) => &e.view.id,
            RumEvent::View(e) => &e.view.reference.id,
        }
    }

    #[must_use]
    pub const fn as_action(&self) -> Option<&ActionEvent> {
        match self {
            RumEvent::Action(e) => Some(e),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_resource(&self) -> Option<&ResourceEvent> {
        match self {
            RumEvent::Resource(e) => Some(e),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_error(&self) -> Option<&ErrorEvent> {
        match self {
            RumEvent::Error(e) => Some(e),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_long_task(&self) -> Option<&LongTaskEvent> {
        match self {
            RumEvent::LongTask(e) => Some(e),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_view(&self) -> Option<&ViewEvent> {
        match self {
            RumEvent::View(e) => Some(e),
            _ => None,
        }
    }
}
