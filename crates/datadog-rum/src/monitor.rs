// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Single-writer service driving the scope tree.
//!
//! [`RumMonitorService`] owns the [`ApplicationScope`] and handles commands one
//! at a time from an unbounded channel. [`RumMonitorHandle`] is the cloneable
//! front end used by the host application. Write outcomes reported by the
//! tree are fed back into the same channel as acknowledgement events.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, trace};

use crate::attributes::Attributes;
use crate::config::RumConfig;
use crate::context::{DatadogContext, RumContext};
use crate::error::{ConfigError, MonitorError};
use crate::event::{
    ActionType, ErrorSource, RawEvent, ResourceKind, ResourceMethod, ViewKey,
};
use crate::resource_key::{ResourceKey, ResourceKeyRegistry};
use crate::scope::application::ApplicationScope;
use crate::scope::RumDependencies;
use crate::storage::{DataWriter, EventAccounting, EventWriteScope, StorageEvent};
use crate::time::Time;

#[derive(Debug)]
pub enum MonitorCommand {
    Event(Box<RawEvent>),
    /// Write outcome of a record, turned into an acknowledgement event.
    Acknowledge {
        view_id: String,
        event: StorageEvent,
        sent: bool,
    },
    ReleaseResourceKey(ResourceKey),
    UpdateDatadogContext(Box<DatadogContext>),
    CurrentSessionId(oneshot::Sender<Option<String>>),
    RumContext(oneshot::Sender<RumContext>),
    Shutdown,
}

/// Accounting sink feeding write outcomes back into the monitor.
///
/// Holds a weak sender so that the service stops once every handle is gone.
pub struct AccountingFeedback {
    tx: mpsc::WeakUnboundedSender<MonitorCommand>,
    downstream: Arc<dyn EventAccounting>,
}

impl AccountingFeedback {
    fn acknowledge(&self, view_id: &str, event: &StorageEvent, sent: bool) {
        let Some(tx) = self.tx.upgrade() else {
            trace!("RUM monitor is gone, dropping write acknowledgement");
            return;
        };
        let command = MonitorCommand::Acknowledge {
            view_id: view_id.to_string(),
            event: event.clone(),
            sent,
        };
        if tx.send(command).is_err() {
            trace!("RUM monitor is gone, dropping write acknowledgement");
        }
    }
}

impl EventAccounting for AccountingFeedback {
    fn event_sent(&self, view_id: &str, event: &StorageEvent) {
        self.acknowledge(view_id, event, true);
        self.downstream.event_sent(view_id, event);
    }

    fn event_dropped(&self, view_id: &str, event: &StorageEvent) {
        self.acknowledge(view_id, event, false);
        self.downstream.event_dropped(view_id, event);
    }
}

#[derive(Clone)]
pub struct RumMonitorHandle {
    tx: mpsc::UnboundedSender<MonitorCommand>,
    resource_keys: ResourceKeyRegistry,
}

impl RumMonitorHandle {
    fn send(&self, command: MonitorCommand) -> Result<(), MonitorError> {
        self.tx
            .send(command)
            .map_err(|_| MonitorError::ChannelClosed)
    }

    /// Registry issuing the keys of resources started through this handle.
    #[must_use]
    pub fn resource_keys(&self) -> &ResourceKeyRegistry {
        &self.resource_keys
    }

    /// Sends a raw event, stamped by the caller.
    pub fn handle_event(&self, event: RawEvent) -> Result<(), MonitorError> {
        self.send(MonitorCommand::Event(Box::new(event)))
    }

    pub fn start_view(&self, key: ViewKey, attributes: Attributes) -> Result<(), MonitorError> {
        self.handle_event(RawEvent::StartView {
            key,
            attributes,
            time: Time::now(),
        })
    }

    pub fn stop_view(&self, key: ViewKey, attributes: Attributes) -> Result<(), MonitorError> {
        self.handle_event(RawEvent::StopView {
            key,
            attributes,
            time: Time::now(),
        })
    }

    /// Instantaneous action, closed once activity settles.
    pub fn add_action(
        &self,
        action_type: ActionType,
        name: impl Into<String>,
        attributes: Attributes,
    ) -> Result<(), MonitorError> {
        self.handle_event(RawEvent::StartAction {
            action_type,
            name: name.into(),
            wait_for_stop: false,
            attributes,
            time: Time::now(),
        })
    }

    /// Continuous action, closed by [`RumMonitorHandle::stop_action`].
    pub fn start_action(
        &self,
        action_type: ActionType,
        name: impl Into<String>,
        attributes: Attributes,
    ) -> Result<(), MonitorError> {
        self.handle_event(RawEvent::StartAction {
            action_type,
            name: name.into(),
            wait_for_stop: true,
            attributes,
            time: Time::now(),
        })
    }

    pub fn stop_action(
        &self,
        action_type: Option<ActionType>,
        name: Option<String>,
        attributes: Attributes,
    ) -> Result<(), MonitorError> {
        self.handle_event(RawEvent::StopAction {
            action_type,
            name,
            attributes,
            time: Time::now(),
        })
    }

    /// Starts a resource and returns the key identifying it in later calls.
    pub fn start_resource(
        &self,
        url: impl Into<String>,
        method: ResourceMethod,
        attributes: Attributes,
    ) -> Result<ResourceKey, MonitorError> {
        let key = self.resource_keys.issue();
        let sent = self.handle_event(RawEvent::StartResource {
            key: key.clone(),
            url: url.into(),
            method,
            attributes,
            time: Time::now(),
        });
        if let Err(e) = sent {
            self.resource_keys.release(&key);
            return Err(e);
        }
        Ok(key)
    }

    /// Stops a resource. The key is released once the monitor has handled the stop.
    pub fn stop_resource(
        &self,
        key: ResourceKey,
        status_code: Option<i64>,
        size: Option<i64>,
        kind: ResourceKind,
        attributes: Attributes,
    ) -> Result<(), MonitorError> {
        self.handle_event(RawEvent::StopResource {
            key: key.clone(),
            status_code,
            size,
            kind,
            attributes,
            time: Time::now(),
        })?;
        self.send(MonitorCommand::ReleaseResourceKey(key))
    }

    pub fn stop_resource_with_error(
        &self,
        key: ResourceKey,
        status_code: Option<i64>,
        message: impl Into<String>,
        source: ErrorSource,
        error_type: Option<String>,
        attributes: Attributes,
    ) -> Result<(), MonitorError> {
        self.handle_event(RawEvent::StopResourceWithError {
            key: key.clone(),
            status_code,
            message: message.into(),
            source,
            error_type,
            stack_trace: None,
            attributes,
            time: Time::now(),
        })?;
        self.send(MonitorCommand::ReleaseResourceKey(key))
    }

    /// Releases a key without stopping its resource, which is then dropped.
    pub fn release_resource_key(&self, key: ResourceKey) -> Result<(), MonitorError> {
        self.send(MonitorCommand::ReleaseResourceKey(key))
    }

    pub fn add_error(
        &self,
        message: impl Into<String>,
        source: ErrorSource,
        error_type: Option<String>,
        stack_trace: Option<String>,
        attributes: Attributes,
    ) -> Result<(), MonitorError> {
        self.handle_event(RawEvent::AddError {
            message: message.into(),
            source,
            error_type,
            stack_trace,
            category: None,
            is_fatal: false,
            attributes,
            time: Time::now(),
        })
    }

    pub fn add_long_task(&self, duration_ns: i64, target: impl Into<String>) -> Result<(), MonitorError> {
        self.handle_event(RawEvent::AddLongTask {
            duration_ns,
            target: target.into(),
            time: Time::now(),
        })
    }

    pub fn add_feature_flag_evaluation(
        &self,
        name: impl Into<String>,
        value: Value,
    ) -> Result<(), MonitorError> {
        self.handle_event(RawEvent::AddFeatureFlagEvaluation {
            name: name.into(),
            value,
            time: Time::now(),
        })
    }

    pub fn add_timing(&self, name: impl Into<String>) -> Result<(), MonitorError> {
        self.handle_event(RawEvent::AddCustomTiming {
            name: name.into(),
            time: Time::now(),
        })
    }

    pub fn stop_session(&self) -> Result<(), MonitorError> {
        self.handle_event(RawEvent::StopSession { time: Time::now() })
    }

    pub fn reset_session(&self) -> Result<(), MonitorError> {
        self.handle_event(RawEvent::ResetSession { time: Time::now() })
    }

    pub fn set_datadog_context(&self, context: DatadogContext) -> Result<(), MonitorError> {
        self.send(MonitorCommand::UpdateDatadogContext(Box::new(context)))
    }

    /// Id of the active session, if one is started.
    pub async fn current_session_id(&self) -> Result<Option<String>, MonitorError> {
        let (response_tx, response_rx) = oneshot::channel();
        self.send(MonitorCommand::CurrentSessionId(response_tx))?;
        Ok(response_rx.await?)
    }

    pub async fn rum_context(&self) -> Result<RumContext, MonitorError> {
        let (response_tx, response_rx) = oneshot::channel();
        self.send(MonitorCommand::RumContext(response_tx))?;
        Ok(response_rx.await?)
    }

    pub fn shutdown(&self) -> Result<(), MonitorError> {
        self.send(MonitorCommand::Shutdown)
    }
}

pub struct RumMonitorService {
    application: ApplicationScope,
    datadog_context: DatadogContext,
    write_scope: Arc<dyn EventWriteScope>,
    writer: Arc<dyn DataWriter>,
    keep_alive: Duration,
    last_event_time: Option<Time>,
    rx: mpsc::UnboundedReceiver<MonitorCommand>,
}

impl RumMonitorService {
    /// Builds the service around `deps`, whose accounting sink becomes the downstream of the feedback loop.
    #[must_use]
    pub fn new(
        mut deps: RumDependencies,
        datadog_context: DatadogContext,
        write_scope: Arc<dyn EventWriteScope>,
        writer: Arc<dyn DataWriter>,
    ) -> (Self, RumMonitorHandle) {
        let (tx, rx) = mpsc::unbounded_channel();
        deps.accounting = Arc::new(AccountingFeedback {
            tx: tx.downgrade(),
            downstream: deps.accounting.clone(),
        });
        let keep_alive = deps.config.keep_alive;
        let handle = RumMonitorHandle {
            tx,
            resource_keys: deps.resource_keys.clone(),
        };
        let service = RumMonitorService {
            application: ApplicationScope::new(Arc::new(deps)),
            datadog_context,
            write_scope,
            writer,
            keep_alive,
            last_event_time: None,
            rx,
        };
        (service, handle)
    }

    /// Validates `config` and builds a service with default collaborators.
    pub fn from_config(
        config: RumConfig,
        datadog_context: DatadogContext,
        write_scope: Arc<dyn EventWriteScope>,
        writer: Arc<dyn DataWriter>,
    ) -> Result<(Self, RumMonitorHandle), ConfigError> {
        config.validate()?;
        Ok(Self::new(
            RumDependencies::new(config),
            datadog_context,
            write_scope,
            writer,
        ))
    }

    pub async fn run(mut self) {
        debug!("RUM monitor service started");

        loop {
            let command = match tokio::time::timeout(self.keep_alive, self.rx.recv()).await {
                Ok(Some(command)) => command,
                Ok(None) => break,
                Err(_) => {
                    trace!("No RUM event received for {:?}, sending keep alive", self.keep_alive);
                    self.process(&RawEvent::KeepAlive { time: Time::now() });
                    continue;
                }
            };

            match command {
                MonitorCommand::Event(event) => self.process(&event),
                MonitorCommand::Acknowledge {
                    view_id,
                    event,
                    sent,
                } => {
                    let time = self.last_event_time.unwrap_or_else(Time::now);
                    let event = if sent {
                        RawEvent::EventSent {
                            view_id,
                            event,
                            time,
                        }
                    } else {
                        RawEvent::EventDropped {
                            view_id,
                            event,
                            time,
                        }
                    };
                    self.process(&event);
                }
                MonitorCommand::ReleaseResourceKey(key) => {
                    self.application
                        .dependencies()
                        .resource_keys
                        .release(&key);
                }
                MonitorCommand::UpdateDatadogContext(context) => {
                    self.datadog_context = *context;
                }
                MonitorCommand::CurrentSessionId(response_tx) => {
                    let session_id = self
                        .application
                        .active_session()
                        .map(|session| session.session_id().to_string())
                        .filter(|id| id != crate::context::NULL_UUID);
                    if response_tx.send(session_id).is_err() {
                        error!("Failed to send current session id - receiver dropped");
                    }
                }
                MonitorCommand::RumContext(response_tx) => {
                    if response_tx.send(self.application.rum_context()).is_err() {
                        error!("Failed to send RUM context - receiver dropped");
                    }
                }
                MonitorCommand::Shutdown => {
                    debug!("RUM monitor service shutting down");
                    break;
                }
            }
        }

        debug!("RUM monitor service stopped");
    }

    fn process(&mut self, event: &RawEvent) {
        if !matches!(
            event,
            RawEvent::EventSent { .. } | RawEvent::EventDropped { .. }
        ) {
            self.last_event_time = Some(event.time());
        }
        self.application.handle_event(
            event,
            &self.datadog_context,
            &*self.write_scope,
            &*self.writer,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::SessionState;
    use crate::listener::StaticProcessInfo;
    use crate::model::RumEvent;
    use crate::scope::test_support::Recorder;
    use crate::time::monotonic_nanos;

    fn service(recorder: &Arc<Recorder>, keep_alive: Duration) -> (RumMonitorService, RumMonitorHandle) {
        let deps = RumDependencies::new(RumConfig {
            application_id: "app".to_string(),
            keep_alive,
            ..RumConfig::default()
        })
        .with_process_info(Arc::new(StaticProcessInfo {
            foreground: false,
            start_nanos: monotonic_nanos(),
        }))
        .with_accounting(recorder.clone());
        RumMonitorService::new(
            deps,
            DatadogContext::default(),
            recorder.clone(),
            recorder.clone(),
        )
    }

    #[tokio::test]
    async fn test_monitor_basic_flow() {
        let recorder = Arc::new(Recorder::default());
        let (service, handle) = service(&recorder, Duration::from_secs(300));
        let service_task = tokio::spawn(service.run());

        assert_eq!(handle.current_session_id().await.expect("query failed"), None);

        handle
            .start_view(ViewKey::named("home", "Home"), Attributes::new())
            .expect("Failed to start view");
        let context = handle.rum_context().await.expect("query failed");
        assert_eq!(context.view_name.as_deref(), Some("Home"));
        assert_eq!(context.session_state, SessionState::Tracked);
        assert_eq!(
            handle.current_session_id().await.expect("query failed"),
            Some(context.session_id.clone())
        );
        assert!(!recorder.sent().is_empty());

        handle.shutdown().expect("Failed to shutdown");
        service_task.await.expect("Service task failed");
    }

    #[tokio::test]
    async fn test_resource_key_released_after_stop() {
        let recorder = Arc::new(Recorder::default());
        let (service, handle) = service(&recorder, Duration::from_secs(300));
        let registry = handle.resource_keys.clone();
        let service_task = tokio::spawn(service.run());

        handle
            .start_view(ViewKey::named("home", "Home"), Attributes::new())
            .expect("Failed to start view");
        let key = handle
            .start_resource("https://api.example.com/items", ResourceMethod::Get, Attributes::new())
            .expect("Failed to start resource");
        assert!(registry.is_live(&key));

        handle
            .stop_resource(key.clone(), Some(200), Some(42), ResourceKind::Xhr, Attributes::new())
            .expect("Failed to stop resource");
        handle.rum_context().await.expect("query failed");

        assert!(!registry.is_live(&key));
        let resource = recorder
            .records()
            .iter()
            .find_map(RumEvent::as_resource)
            .cloned()
            .expect("resource record");
        assert_eq!(resource.resource.status_code, Some(200));

        handle.shutdown().expect("Failed to shutdown");
        service_task.await.expect("Service task failed");
    }

    #[tokio::test(start_paused = true)]
    async fn test_keep_alive_is_injected_when_idle() {
        let recorder = Arc::new(Recorder::default());
        let (service, handle) = service(&recorder, Duration::from_secs(1));
        let service_task = tokio::spawn(service.run());

        handle
            .start_view(ViewKey::named("home", "Home"), Attributes::new())
            .expect("Failed to start view");
        handle.rum_context().await.expect("query failed");
        let updates = recorder.views().len();

        tokio::time::sleep(Duration::from_millis(1_500)).await;
        handle.rum_context().await.expect("query failed");

        assert!(recorder.views().len() > updates);

        handle.shutdown().expect("Failed to shutdown");
        service_task.await.expect("Service task failed");
    }

    #[tokio::test]
    async fn test_service_stops_when_handles_are_dropped() {
        let recorder = Arc::new(Recorder::default());
        let (service, handle) = service(&recorder, Duration::from_secs(300));
        let service_task = tokio::spawn(service.run());

        handle
            .start_view(ViewKey::named("home", "Home"), Attributes::new())
            .expect("Failed to start view");
        drop(handle);

        service_task.await.expect("Service task failed");
    }

    #[tokio::test]
    async fn test_closed_monitor_reports_error() {
        let recorder = Arc::new(Recorder::default());
        let (service, handle) = service(&recorder, Duration::from_secs(300));
        drop(service);

        let result = handle.stop_session();
        assert!(matches!(result, Err(MonitorError::ChannelClosed)));
        let result = handle.start_resource("https://example.com", ResourceMethod::Get, Attributes::new());
        assert!(result.is_err());
        assert_eq!(handle.resource_keys.live_count(), 0);
    }

    #[test]
    fn test_from_config_rejects_invalid_config() {
        let recorder = Arc::new(Recorder::default());
        let result = RumMonitorService::from_config(
            RumConfig::default(),
            DatadogContext::default(),
            recorder.clone(),
            recorder,
        );
        assert!(result.is_err());
    }
}
