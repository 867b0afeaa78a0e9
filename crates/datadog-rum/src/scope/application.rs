// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Root of the scope tree.

use std::sync::Arc;

use tracing::debug;

use crate::attributes::Attributes;
use crate::context::{DatadogContext, ParentScope, RumContext};
use crate::event::RawEvent;
use crate::scope::session::SessionScope;
use crate::scope::view::{ViewScope, ViewSeed};
use crate::scope::{Dispatch, RumDependencies, ScopeOutcome};
use crate::storage::{DataWriter, Emitter, EventWriteScope};

/// Owns the sessions of the process and routes every event to them.
///
/// At most one session is active. A stopped session stays in the tree until
/// its views have finished, and the next StartView or StartAction opens a new
/// session.
pub struct ApplicationScope {
    deps: Arc<RumDependencies>,
    context: RumContext,
    sessions: Vec<SessionScope>,
    application_started_sent: bool,
    application_displayed: bool,
    last_active_view: Option<ViewSeed>,
}

impl std::fmt::Debug for ApplicationScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApplicationScope")
            .field("context", &self.context)
            .field("sessions", &self.sessions)
            .field("application_started_sent", &self.application_started_sent)
            .finish_non_exhaustive()
    }
}

impl ApplicationScope {
    #[must_use]
    pub fn new(deps: Arc<RumDependencies>) -> Self {
        let context = RumContext::new(deps.config.application_id.as_str());
        let initial = SessionScope::new(deps.clone(), false);
        ApplicationScope {
            deps,
            context,
            sessions: vec![initial],
            application_started_sent: false,
            application_displayed: false,
            last_active_view: None,
        }
    }

    #[must_use]
    pub fn dependencies(&self) -> &Arc<RumDependencies> {
        &self.deps
    }

    #[must_use]
    pub fn active_session(&self) -> Option<&SessionScope> {
        self.sessions.iter().find(|session| session.is_active())
    }

    /// Context of the deepest active scope, or the application context when no session is active.
    #[must_use]
    pub fn rum_context(&self) -> RumContext {
        self.active_session().map_or_else(
            || self.context.clone(),
            |session| session.full_rum_context(&self.context),
        )
    }

    #[must_use]
    pub fn custom_attributes(&self) -> Attributes {
        self.deps.attributes_provider.attributes()
    }

    pub fn handle_event(
        &mut self,
        event: &RawEvent,
        datadog_context: &DatadogContext,
        write_scope: &dyn EventWriteScope,
        writer: &dyn DataWriter,
    ) -> ScopeOutcome {
        let deps = self.deps.clone();
        let dispatch = Dispatch {
            datadog_context,
            emitter: Emitter::tracked(write_scope, writer, &*deps.accounting),
        };

        match event {
            RawEvent::SetSyntheticsTestAttribute {
                test_id, result_id, ..
            } => {
                self.context.synthetics_test_id = Some(test_id.clone());
                self.context.synthetics_result_id = Some(result_id.clone());
                return ScopeOutcome::Active;
            }
            RawEvent::StopSession { .. } => {
                self.last_active_view = self
                    .active_session()
                    .and_then(SessionScope::active_view)
                    .map(ViewScope::seed);
            }
            _ => {}
        }

        if self.active_session().is_none()
            && matches!(
                event,
                RawEvent::StartView { .. } | RawEvent::StartAction { .. }
            )
        {
            self.start_new_session(event, &dispatch);
        }

        if !self.application_started_sent
            && !matches!(event, RawEvent::SdkInit { .. })
            && deps.process_info.is_foreground()
        {
            let process_start = deps.process_info.process_start_nanos();
            let time = event.time();
            let started = RawEvent::ApplicationStarted {
                startup_nanos: time.nano_time - process_start,
                time: time.rewind_to(process_start),
            };
            self.application_started_sent = true;
            debug!(startup_nanos = time.nano_time - process_start, "Application started");
            self.delegate_to_sessions(&started, &dispatch);
        }

        self.delegate_to_sessions(event, &dispatch);
        ScopeOutcome::Active
    }

    fn parent_scope(&self) -> ParentScope {
        ParentScope {
            rum_context: self.context.clone(),
            custom_attributes: self.custom_attributes(),
        }
    }

    fn delegate_to_sessions(&mut self, event: &RawEvent, dispatch: &Dispatch<'_>) {
        let parent = self.parent_scope();
        self.sessions
            .retain_mut(|session| !session.handle_event(event, &parent, dispatch).is_complete());
        self.application_displayed |= self
            .sessions
            .iter()
            .any(SessionScope::is_application_displayed);
    }

    fn start_new_session(&mut self, event: &RawEvent, dispatch: &Dispatch<'_>) {
        let mut session = SessionScope::new(self.deps.clone(), self.application_displayed);
        let last_view = self.last_active_view.take();
        if let (Some(seed), false) = (last_view, matches!(event, RawEvent::StartView { .. })) {
            debug!(view = %seed.key.name, "Restarting the last active view in a new session");
            let restart = RawEvent::StartView {
                key: seed.key,
                attributes: seed.attributes,
                time: event.time(),
            };
            let parent = self.parent_scope();
            session.handle_event(&restart, &parent, dispatch);
        }
        self.sessions.push(session);
    }
}
