// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! One in-flight network call, bound to the view that was active when it started.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::attributes::{
    merge, take_string, Attributes, ERROR_FINGERPRINT, RULE_PSR, SPAN_ID, TRACE_ID,
};
use crate::context::RumContext;
use crate::event::{ErrorCategory, ErrorSource, RawEvent, ResourceKind, ResourceMethod, ResourceTiming};
use crate::listener::url_host;
use crate::metric::NetworkSettledMetricResolver;
use crate::model::{
    ActionLink, EventType, ErrorData, ErrorEvent, ErrorResource, Envelope, Provider, ProviderType,
    ResourceData, ResourceEvent, RumEvent, TimingPhase, ViewRef,
};
use crate::resource_key::ResourceKey;
use crate::scope::{Dispatch, ParentScope, RumDependencies, ScopeOutcome};
use crate::storage::StorageEvent;
use crate::time::Time;

const SOURCE_TYPE: &str = "android";

struct ResourceError<'a> {
    message: &'a str,
    source: ErrorSource,
    stack_trace: Option<&'a str>,
    error_type: Option<&'a str>,
    category: Option<ErrorCategory>,
}

pub struct ResourceScope {
    deps: Arc<RumDependencies>,
    network_settled: Arc<NetworkSettledMetricResolver>,
    resource_id: String,
    key: ResourceKey,
    url: String,
    method: ResourceMethod,
    attributes: Attributes,
    // Identity captured at start, so the record keeps the action open at that time.
    context: RumContext,
    start: Time,
    timing: Option<ResourceTiming>,
    wait_for_timing: bool,
    stopped: bool,
    sent: bool,
    kind: ResourceKind,
    status_code: Option<i64>,
    size: Option<i64>,
    stop_nanos: i64,
}

impl std::fmt::Debug for ResourceScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceScope")
            .field("resource_id", &self.resource_id)
            .field("key", &self.key)
            .field("url", &self.url)
            .field("stopped", &self.stopped)
            .field("sent", &self.sent)
            .finish_non_exhaustive()
    }
}

impl ResourceScope {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        deps: Arc<RumDependencies>,
        network_settled: Arc<NetworkSettledMetricResolver>,
        context: RumContext,
        key: ResourceKey,
        url: String,
        method: ResourceMethod,
        attributes: Attributes,
        start: Time,
    ) -> Self {
        let resource_id = deps.new_id();
        network_settled.resource_was_started(&resource_id, start.nano_time);
        ResourceScope {
            deps,
            network_settled,
            resource_id,
            key,
            url,
            method,
            attributes,
            context,
            start,
            timing: None,
            wait_for_timing: false,
            stopped: false,
            sent: false,
            kind: ResourceKind::Unknown,
            status_code: None,
            size: None,
            stop_nanos: start.nano_time,
        }
    }

    #[must_use]
    pub fn key(&self) -> &ResourceKey {
        &self.key
    }

    #[must_use]
    pub fn resource_id(&self) -> &str {
        &self.resource_id
    }

    pub fn handle_event(
        &mut self,
        event: &RawEvent,
        parent: &ParentScope,
        dispatch: &Dispatch<'_>,
    ) -> ScopeOutcome {
        if event.resource_key() != Some(&self.key) {
            return ScopeOutcome::from_complete(self.sent);
        }
        match event {
            RawEvent::WaitForResourceTiming { .. } => self.wait_for_timing = true,
            RawEvent::AddResourceTiming { timing, .. } => {
                self.timing = Some(*timing);
                if self.stopped && !self.sent {
                    self.send_resource(parent, dispatch);
                }
            }
            RawEvent::StopResource {
                status_code,
                size,
                kind,
                attributes,
                time,
                ..
            } if !self.stopped => {
                self.stopped = true;
                self.stop_nanos = time.nano_time;
                self.attributes.extend(attributes.clone());
                self.kind = *kind;
                self.status_code = *status_code;
                self.size = *size;
                if !self.wait_for_timing || self.timing.is_some() {
                    self.send_resource(parent, dispatch);
                }
            }
            RawEvent::StopResourceWithError {
                status_code,
                message,
                source,
                error_type,
                stack_trace,
                attributes,
                time,
                ..
            } if !self.stopped => {
                self.stopped = true;
                self.stop_nanos = time.nano_time;
                self.attributes.extend(attributes.clone());
                self.status_code = *status_code;
                let error = ResourceError {
                    message,
                    source: *source,
                    stack_trace: stack_trace.as_deref(),
                    error_type: error_type.as_deref(),
                    category: Some(ErrorCategory::Exception),
                };
                self.send_error(&error, parent, dispatch);
            }
            RawEvent::StopResourceWithStackTrace {
                status_code,
                message,
                source,
                stack_trace,
                error_type,
                attributes,
                time,
                ..
            } if !self.stopped => {
                self.stopped = true;
                self.stop_nanos = time.nano_time;
                self.attributes.extend(attributes.clone());
                self.status_code = *status_code;
                let error = ResourceError {
                    message,
                    source: *source,
                    stack_trace: Some(stack_trace.as_str()),
                    error_type: error_type.as_deref(),
                    category: (!stack_trace.is_empty()).then_some(ErrorCategory::Exception),
                };
                self.send_error(&error, parent, dispatch);
            }
            _ => {}
        }
        ScopeOutcome::from_complete(self.sent)
    }

    fn provider(&self) -> Option<Provider> {
        if !self.deps.first_party_hosts.is_first_party_url(&self.url) {
            return None;
        }
        url_host(&self.url).map(|domain| Provider {
            domain: domain.to_string(),
            provider_type: ProviderType::FirstParty,
        })
    }

    fn duration(&self) -> i64 {
        let duration = self.stop_nanos - self.start.nano_time;
        if duration <= 0 {
            warn!(
                "The computed duration for your resource: {} was 0 or negative. In order to keep the resource event we forced it to 1ns.",
                self.url
            );
            1
        } else {
            duration
        }
    }

    fn send_resource(&mut self, parent: &ParentScope, dispatch: &Dispatch<'_>) {
        self.sent = true;
        let mut attributes = merge([&parent.custom_attributes, &self.attributes]);
        let trace_id = take_string(&mut attributes, TRACE_ID);
        let span_id = take_string(&mut attributes, SPAN_ID);
        let rule_psr = attributes.remove(RULE_PSR).and_then(|v| v.as_f64());
        let duration = self.duration();
        let timing = self.timing.unwrap_or_default();
        let view_id = self.context.view_id.clone().unwrap_or_default();
        let storage_event = StorageEvent::Resource {
            resource_id: self.resource_id.clone(),
            resource_end_nanos: self.stop_nanos,
        };
        let resource = ResourceData {
            id: self.resource_id.clone(),
            kind: self.kind,
            url: self.url.clone(),
            method: self.method,
            status_code: self.status_code,
            size: self.size,
            duration,
            dns: phase(timing.dns_start, timing.dns_duration),
            connect: phase(timing.connect_start, timing.connect_duration),
            ssl: phase(timing.ssl_start, timing.ssl_duration),
            first_byte: phase(timing.first_byte_start, timing.first_byte_duration),
            download: phase(timing.download_start, timing.download_duration),
            provider: self.provider(),
        };
        let sample_rate = self.deps.config.session_sample_rate;
        let outcome = dispatch
            .emitter
            .emit(&view_id, &storage_event, EventType::Default, |datadog_context| {
                let mut envelope = Envelope::new(
                    self.start.timestamp,
                    &self.context,
                    datadog_context,
                    attributes,
                    sample_rate,
                );
                envelope.dd.trace_id = trace_id;
                envelope.dd.span_id = span_id;
                envelope.dd.rule_psr = rule_psr;
                RumEvent::Resource(ResourceEvent {
                    envelope,
                    view: ViewRef::from_context(&self.context),
                    action: ActionLink::from_context(&self.context),
                    resource,
                })
            });
        debug!(resource_id = %self.resource_id, ?outcome, "Resource finished");
    }

    fn send_error(&mut self, error: &ResourceError<'_>, parent: &ParentScope, dispatch: &Dispatch<'_>) {
        self.sent = true;
        let mut attributes = merge([&parent.custom_attributes, &self.attributes]);
        let fingerprint = take_string(&mut attributes, ERROR_FINGERPRINT);
        let view_id = self.context.view_id.clone().unwrap_or_default();
        let storage_event = StorageEvent::Error {
            resource_id: Some(self.resource_id.clone()),
            resource_end_nanos: Some(self.stop_nanos),
        };
        let data = ErrorData {
            id: self.deps.new_id(),
            message: error.message.to_string(),
            source: error.source,
            stack: error.stack_trace.map(str::to_string),
            is_crash: false,
            fingerprint,
            error_type: error.error_type.map(str::to_string),
            category: error.category,
            resource: Some(ErrorResource {
                url: self.url.clone(),
                method: self.method,
                status_code: self.status_code.unwrap_or(0),
                provider: self.provider(),
            }),
            source_type: SOURCE_TYPE.to_string(),
        };
        let sample_rate = self.deps.config.session_sample_rate;
        let outcome = dispatch
            .emitter
            .emit(&view_id, &storage_event, EventType::Default, |datadog_context| {
                RumEvent::Error(ErrorEvent {
                    envelope: Envelope::new(
                        self.start.timestamp,
                        &self.context,
                        datadog_context,
                        attributes,
                        sample_rate,
                    ),
                    view: ViewRef::from_context(&self.context),
                    action: ActionLink::from_context(&self.context),
                    error: data,
                    feature_flags: Attributes::new(),
                })
            });
        debug!(resource_id = %self.resource_id, ?outcome, "Resource failed");
    }
}

fn phase(start: i64, duration: i64) -> Option<TimingPhase> {
    (start >= 0 && duration > 0).then_some(TimingPhase { start, duration })
}
