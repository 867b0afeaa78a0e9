// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Inbound signals handled by the scope tree.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::attributes::{Attributes, INTERNAL_ERROR_IS_CRASH};
use crate::resource_key::ResourceKey;
use crate::storage::StorageEvent;
use crate::time::Time;

/// Identity of a view as supplied by the host application.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ViewKey {
    pub id: String,
    pub url: String,
    pub name: String,
}

impl ViewKey {
    #[must_use]
    pub fn new(id: impl Into<String>, url: impl Into<String>, name: impl Into<String>) -> Self {
        ViewKey {
            id: id.into(),
            url: url.into(),
            name: name.into(),
        }
    }

    /// Key whose url is derived from its id.
    #[must_use]
    pub fn named(id: impl Into<String>, name: impl Into<String>) -> Self {
        let id = id.into();
        ViewKey {
            url: id.clone(),
            id,
            name: name.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    Tap,
    Scroll,
    Swipe,
    Click,
    Back,
    Custom,
    ApplicationStart,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Image,
    Xhr,
    Fetch,
    Css,
    Js,
    Font,
    Media,
    Native,
    Other,
    #[default]
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ResourceMethod {
    #[default]
    Get,
    Post,
    Head,
    Put,
    Delete,
    Patch,
    Trace,
    Options,
    Connect,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorSource {
    Network,
    #[default]
    Source,
    Console,
    Logger,
    Agent,
    Webview,
    Custom,
    Report,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCategory {
    Exception,
    Anr,
}

/// Network timing phases of a resource, in nanoseconds relative to the request start.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceTiming {
    pub dns_start: i64,
    pub dns_duration: i64,
    pub connect_start: i64,
    pub connect_duration: i64,
    pub ssl_start: i64,
    pub ssl_duration: i64,
    pub first_byte_start: i64,
    pub first_byte_duration: i64,
    pub download_start: i64,
    pub download_duration: i64,
}

/// Every signal the scope tree consumes.
#[derive(Debug, Clone, PartialEq)]
pub enum RawEvent {
    StartView {
        key: ViewKey,
        attributes: Attributes,
        time: Time,
    },
    StopView {
        key: ViewKey,
        attributes: Attributes,
        time: Time,
    },
    StartAction {
        action_type: ActionType,
        name: String,
        wait_for_stop: bool,
        attributes: Attributes,
        time: Time,
    },
    StopAction {
        action_type: Option<ActionType>,
        name: Option<String>,
        attributes: Attributes,
        time: Time,
    },
    SendCustomActionNow {
        time: Time,
    },
    StartResource {
        key: ResourceKey,
        url: String,
        method: ResourceMethod,
        attributes: Attributes,
        time: Time,
    },
    WaitForResourceTiming {
        key: ResourceKey,
        time: Time,
    },
    AddResourceTiming {
        key: ResourceKey,
        timing: ResourceTiming,
        time: Time,
    },
    StopResource {
        key: ResourceKey,
        status_code: Option<i64>,
        size: Option<i64>,
        kind: ResourceKind,
        attributes: Attributes,
        time: Time,
    },
    StopResourceWithError {
        key: ResourceKey,
        status_code: Option<i64>,
        message: String,
        source: ErrorSource,
        error_type: Option<String>,
        stack_trace: Option<String>,
        attributes: Attributes,
        time: Time,
    },
    StopResourceWithStackTrace {
        key: ResourceKey,
        status_code: Option<i64>,
        message: String,
        source: ErrorSource,
        stack_trace: String,
        error_type: Option<String>,
        attributes: Attributes,
        time: Time,
    },
    AddError {
        message: String,
        source: ErrorSource,
        error_type: Option<String>,
        stack_trace: Option<String>,
        category: Option<ErrorCategory>,
        is_fatal: bool,
        attributes: Attributes,
        time: Time,
    },
    AddLongTask {
        duration_ns: i64,
        target: String,
        time: Time,
    },
    AddFeatureFlagEvaluation {
        name: String,
        value: Value,
        time: Time,
    },
    AddFeatureFlagEvaluations {
        flags: Attributes,
        time: Time,
    },
    AddCustomTiming {
        name: String,
        time: Time,
    },
    AddViewLoadingTime {
        overwrite: bool,
        time: Time,
    },
    AddViewAttributes {
        attributes: Attributes,
        time: Time,
    },
    RemoveViewAttributes {
        keys: Vec<String>,
        time: Time,
    },
    KeepAlive {
        time: Time,
    },
    ApplicationStarted {
        /// Time elapsed between the process start and the first event.
        startup_nanos: i64,
        time: Time,
    },
    SdkInit {
        is_app_in_foreground: bool,
        time: Time,
    },
    ResetSession {
        time: Time,
    },
    StopSession {
        time: Time,
    },
    SetSyntheticsTestAttribute {
        test_id: String,
        result_id: String,
        time: Time,
    },
    EventSent {
        view_id: String,
        event: StorageEvent,
        time: Time,
    },
    EventDropped {
        view_id: String,
        event: StorageEvent,
        time: Time,
    },
}

/// Kinds of events reported as missed when no view could receive them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MissedEventType {
    Action,
    Resource,
    Error,
    LongTask,
}

impl RawEvent {
    #[must_use]
    pub fn time(&self) -> Time {
        match self {
            RawEvent::StartView { time, .. }
            | RawEvent::StopView { time, .. }
            | RawEvent::StartAction { time, .. }
            | RawEvent::StopAction { time, .. }
            | RawEvent::SendCustomActionNow { time }
            | RawEvent::StartResource { time, .. }
            | RawEvent::WaitForResourceTiming { time, .. }
            | RawEvent::AddResourceTiming { time, .. }
            | RawEvent::StopResource { time, .. }
            | RawEvent::StopResourceWithError { time, .. }
            | RawEvent::StopResourceWithStackTrace { time, .. }
            | RawEvent::AddError { time, .. }
            | RawEvent::AddLongTask { time, .. }
            | RawEvent::AddFeatureFlagEvaluation { time, .. }
            | RawEvent::AddFeatureFlagEvaluations { time, .. }
            | RawEvent::AddCustomTiming { time, .. }
            | RawEvent::AddViewLoadingTime { time, .. }
            | RawEvent::AddViewAttributes { time, .. }
            | RawEvent::RemoveViewAttributes { time, .. }
            | RawEvent::KeepAlive { time }
            | RawEvent::ApplicationStarted { time, .. }
            | RawEvent::SdkInit { time, .. }
            | RawEvent::ResetSession { time }
            | RawEvent::StopSession { time }
            | RawEvent::SetSyntheticsTestAttribute { time, .. }
            | RawEvent::EventSent { time, .. }
            | RawEvent::EventDropped { time, .. } => *time,
        }
    }

    /// Short name used in log messages.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            RawEvent::StartView { .. } => "StartView",
            RawEvent::StopView { .. } => "StopView",
            RawEvent::StartAction { .. } => "StartAction",
            RawEvent::StopAction { .. } => "StopAction",
            RawEvent::SendCustomActionNow { .. } => "SendCustomActionNow",
            RawEvent::StartResource { .. } => "StartResource",
            RawEvent::WaitForResourceTiming { .. } => "WaitForResourceTiming",
            RawEvent::AddResourceTiming { .. } => "AddResourceTiming",
            RawEvent::StopResource { .. } => "StopResource",
            RawEvent::StopResourceWithError { .. } => "StopResourceWithError",
            RawEvent::StopResourceWithStackTrace { .. } => "StopResourceWithStackTrace",
            RawEvent::AddError { .. } => "AddError",
            RawEvent::AddLongTask { .. } => "AddLongTask",
            RawEvent::AddFeatureFlagEvaluation { .. } => "AddFeatureFlagEvaluation",
            RawEvent::AddFeatureFlagEvaluations { .. } => "AddFeatureFlagEvaluations",
            RawEvent::AddCustomTiming { .. } => "AddCustomTiming",
            RawEvent::AddViewLoadingTime { .. } => "AddViewLoadingTime",
            RawEvent::AddViewAttributes { .. } => "AddViewAttributes",
            RawEvent::RemoveViewAttributes { .. } => "RemoveViewAttributes",
            RawEvent::KeepAlive { .. } => "KeepAlive",
            RawEvent::ApplicationStarted { .. } => "ApplicationStarted",
            RawEvent::SdkInit { .. } => "SdkInit",
            RawEvent::ResetSession { .. } => "ResetSession",
            RawEvent::StopSession { .. } => "StopSession",
            RawEvent::SetSyntheticsTestAttribute { .. } => "SetSyntheticsTestAttribute",
            RawEvent::EventSent { .. } => "EventSent",
            RawEvent::EventDropped { .. } => "EventDropped",
        }
    }

    /// Events that keep a session alive, or start a new one.
    #[must_use]
    pub const fn is_interaction(&self) -> bool {
        matches!(
            self,
            RawEvent::StartView { .. } | RawEvent::StartAction { .. } | RawEvent::StopAction { .. }
        )
    }

    /// Events allowed to open a background view when no view is displayed.
    #[must_use]
    pub const fn is_valid_background_event(&self) -> bool {
        matches!(
            self,
            RawEvent::StartAction { .. } | RawEvent::StartResource { .. } | RawEvent::AddError { .. }
        )
    }

    /// Events that reach no view without being worth a warning.
    #[must_use]
    pub const fn is_silent_orphan(&self) -> bool {
        matches!(
            self,
            RawEvent::ApplicationStarted { .. }
                | RawEvent::KeepAlive { .. }
                | RawEvent::ResetSession { .. }
                | RawEvent::StopView { .. }
                | RawEvent::EventSent { .. }
                | RawEvent::EventDropped { .. }
        )
    }

    #[must_use]
    pub const fn is_anr(&self) -> bool {
        matches!(
            self,
            RawEvent::AddError {
                category: Some(ErrorCategory::Anr),
                ..
            }
        )
    }

    #[must_use]
    pub const fn missed_event_type(&self) -> Option<MissedEventType> {
        match self {
            RawEvent::AddError { .. } | RawEvent::StopResourceWithError { .. } => {
                Some(MissedEventType::Error)
            }
            RawEvent::StartAction { .. } => Some(MissedEventType::Action),
            RawEvent::StartResource { .. } => Some(MissedEventType::Resource),
            RawEvent::AddLongTask { .. } => Some(MissedEventType::LongTask),
            _ => None,
        }
    }

    /// Whether this is an error that ends the application.
    #[must_use]
    pub fn is_fatal_error(&self) -> bool {
        match self {
            RawEvent::AddError {
                is_fatal,
                attributes,
                ..
            } => {
                *is_fatal
                    || attributes
                        .get(INTERNAL_ERROR_IS_CRASH)
                        .and_then(Value::as_bool)
                        .unwrap_or(false)
            }
            _ => false,
        }
    }

    /// Key of the resource this event refers to, if any.
    #[must_use]
    pub const fn resource_key(&self) -> Option<&ResourceKey> {
        match self {
            RawEvent::StartResource { key, .. }
            | RawEvent::WaitForResourceTiming { key, .. }
            | RawEvent::AddResourceTiming { key, .. }
            | RawEvent::StopResource { key, .. }
            | RawEvent::StopResourceWithError { key, .. }
            | RawEvent::StopResourceWithStackTrace { key, .. } => Some(key),
            _ => None,
        }
    }
}
