// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Hierarchical identity snapshots and the ambient context supplied by the
//! storage collaborator.

use serde::{Deserialize, Serialize};

use crate::attributes::Attributes;

/// Session id used until a session starts, and after a session is stopped.
pub const NULL_UUID: &str = "00000000-0000-0000-0000-000000000000";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionState {
    NotTracked,
    Tracked,
    Expired,
}

impl SessionState {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            SessionState::NotTracked => "NOT_TRACKED",
            SessionState::Tracked => "TRACKED",
            SessionState::Expired => "EXPIRED",
        }
    }
}

/// Reason that led to the creation of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StartReason {
    UserAppLaunch,
    InactivityTimeout,
    MaxDuration,
    BackgroundLaunch,
    ExplicitStop,
}

impl StartReason {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            StartReason::UserAppLaunch => "user_app_launch",
            StartReason::InactivityTimeout => "inactivity_timeout",
            StartReason::MaxDuration => "max_duration",
            StartReason::BackgroundLaunch => "background_launch",
            StartReason::ExplicitStop => "explicit_stop",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViewType {
    Foreground,
    Background,
    ApplicationLaunch,
}

/// Immutable snapshot of the hierarchical identity of a scope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RumContext {
    pub application_id: String,
    pub session_id: String,
    pub session_state: SessionState,
    pub session_start_reason: StartReason,
    pub is_session_active: bool,
    pub view_id: Option<String>,
    pub view_name: Option<String>,
    pub view_url: Option<String>,
    pub view_type: Option<ViewType>,
    pub action_id: Option<String>,
    pub synthetics_test_id: Option<String>,
    pub synthetics_result_id: Option<String>,
}

impl RumContext {
    #[must_use]
    pub fn new(application_id: impl Into<String>) -> Self {
        RumContext {
            application_id: application_id.into(),
            session_id: NULL_UUID.to_string(),
            session_state: SessionState::NotTracked,
            session_start_reason: StartReason::UserAppLaunch,
            is_session_active: true,
            view_id: None,
            view_name: None,
            view_url: None,
            view_type: None,
            action_id: None,
            synthetics_test_id: None,
            synthetics_result_id: None,
        }
    }

    #[must_use]
    pub fn has_null_session(&self) -> bool {
        self.session_id == NULL_UUID
    }

    /// Synthetics ids, only when both are present and not blank.
    #[must_use]
    pub fn synthetics(&self) -> Option<(&str, &str)> {
        match (&self.synthetics_test_id, &self.synthetics_result_id) {
            (Some(test_id), Some(result_id))
                if !test_id.trim().is_empty() && !result_id.trim().is_empty() =>
            {
                Some((test_id.as_str(), result_id.as_str()))
            }
            _ => None,
        }
    }
}

/// Read-only view of the parent scope, handed to each child on every event.
#[derive(Debug, Clone)]
pub struct ParentScope {
    pub rum_context: RumContext,
    pub custom_attributes: Attributes,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserInfo {
    pub id: Option<String>,
    pub name: Option<String>,
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Attributes::is_empty")]
    pub additional_properties: Attributes,
}

impl UserInfo {
    #[must_use]
    pub fn has_user_data(&self) -> bool {
        self.id.is_some()
            || self.name.is_some()
            || self.email.is_some()
            || !self.additional_properties.is_empty()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Connectivity {
    Connected,
    NotConnected,
    #[default]
    Maybe,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkInfo {
    pub connectivity: Connectivity,
    pub carrier_name: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub device_name: String,
    pub device_model: String,
    pub device_brand: String,
    pub os_name: String,
    pub os_version: String,
    pub architecture: String,
}

/// Ambient device, network and user context supplied with every write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatadogContext {
    pub service: String,
    pub env: String,
    pub version: String,
    pub source: String,
    pub sdk_version: String,
    /// Offset to add to device wall-clock timestamps to match the server clock.
    pub server_time_offset_ms: i64,
    pub user_info: UserInfo,
    pub network_info: NetworkInfo,
    pub device_info: DeviceInfo,
}

impl Default for DatadogContext {
    fn default() -> Self {
        DatadogContext {
            service: String::new(),
            env: String::new(),
            version: String::new(),
            source: "android".to_string(),
            sdk_version: env!("CARGO_PKG_VERSION").to_string(),
            server_time_offset_ms: 0,
            user_info: UserInfo::default(),
            network_info: NetworkInfo::default(),
            device_info: DeviceInfo::default(),
        }
    }
}

impl DatadogContext {
    /// `ddtags` string for emitted records.
    #[must_use]
    pub fn dd_tags(&self) -> String {
        format!(
            "service:{},version:{},sdk_version:{},env:{}",
            self.service, self.version, self.sdk_version, self.env
        )
    }
}
