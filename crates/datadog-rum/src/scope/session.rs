// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Session identity, sampling and renewal.
//!
//! A session is renewed when an interaction arrives after the inactivity
//! threshold, when it reaches its maximum duration, or on an explicit reset.
//! Views that were active in the old session continue in the new one under
//! new ids. Events reaching a session that is not tracked are still forwarded
//! to its views, with every write suppressed.

use std::sync::Arc;

use tracing::debug;

use crate::context::{ParentScope, RumContext, SessionState, StartReason, NULL_UUID};
use crate::event::RawEvent;
use crate::listener::SessionRenewedMessage;
use crate::scope::view::ViewScope;
use crate::scope::view_manager::ViewManagerScope;
use crate::scope::{Dispatch, RumDependencies, ScopeOutcome};
use crate::time::Time;

pub struct SessionScope {
    deps: Arc<RumDependencies>,
    session_id: String,
    state: SessionState,
    start_reason: StartReason,
    is_active: bool,
    session_start_nanos: i64,
    last_interaction_nanos: Option<i64>,
    child: Option<ViewManagerScope>,
    last_published: Option<(String, bool)>,
}

impl std::fmt::Debug for SessionScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionScope")
            .field("session_id", &self.session_id)
            .field("state", &self.state)
            .field("start_reason", &self.start_reason)
            .field("is_active", &self.is_active)
            .field("child", &self.child)
            .finish_non_exhaustive()
    }
}

impl SessionScope {
    #[must_use]
    pub fn new(deps: Arc<RumDependencies>, application_displayed: bool) -> Self {
        let child = ViewManagerScope::new(deps.clone(), application_displayed);
        SessionScope {
            deps,
            session_id: NULL_UUID.to_string(),
            state: SessionState::NotTracked,
            start_reason: StartReason::UserAppLaunch,
            is_active: true,
            session_start_nanos: 0,
            last_interaction_nanos: None,
            child: Some(child),
            last_published: None,
        }
    }

    #[must_use]
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    #[must_use]
    pub const fn state(&self) -> SessionState {
        self.state
    }

    #[must_use]
    pub const fn start_reason(&self) -> StartReason {
        self.start_reason
    }

    /// False once the session was explicitly stopped.
    #[must_use]
    pub const fn is_active(&self) -> bool {
        self.is_active
    }

    #[must_use]
    pub fn active_view(&self) -> Option<&ViewScope> {
        self.child.as_ref().and_then(ViewManagerScope::active_view)
    }

    #[must_use]
    pub fn is_application_displayed(&self) -> bool {
        self.child
            .as_ref()
            .is_some_and(ViewManagerScope::is_application_displayed)
    }

    /// Session-level context, built on top of the application context.
    #[must_use]
    pub fn rum_context(&self, parent: &RumContext) -> RumContext {
        RumContext {
            session_id: self.session_id.clone(),
            session_state: self.state,
            session_start_reason: self.start_reason,
            is_session_active: self.is_active,
            view_id: None,
            view_name: None,
            view_url: None,
            view_type: None,
            action_id: None,
            ..parent.clone()
        }
    }

    /// Context of the deepest active scope of this session.
    #[must_use]
    pub fn full_rum_context(&self, parent: &RumContext) -> RumContext {
        let context = self.rum_context(parent);
        match self.active_view() {
            Some(view) => view.rum_context(&context),
            None => context,
        }
    }

    pub fn handle_event(
        &mut self,
        event: &RawEvent,
        parent: &ParentScope,
        dispatch: &Dispatch<'_>,
    ) -> ScopeOutcome {
        match event {
            RawEvent::ResetSession { time } if self.is_active => {
                self.renew(*time, StartReason::ExplicitStop, dispatch);
                self.last_interaction_nanos = Some(time.nano_time);
            }
            RawEvent::StopSession { .. } if self.is_active => {
                self.is_active = false;
                self.deps.session_metrics.on_session_stopped(&self.session_id);
                debug!(session_id = %self.session_id, "RUM session stopped");
            }
            _ => {}
        }

        self.update_session(event, dispatch);
        self.publish_session_change();

        if !matches!(event, RawEvent::SdkInit { .. }) {
            let child_parent = ParentScope {
                rum_context: self.rum_context(&parent.rum_context),
                custom_attributes: parent.custom_attributes.clone(),
            };
            let child_dispatch = if self.state == SessionState::Tracked {
                *dispatch
            } else {
                dispatch.suppressed()
            };
            if let Some(child) = &mut self.child {
                if child
                    .handle_event(event, &child_parent, &child_dispatch)
                    .is_complete()
                {
                    self.child = None;
                }
            }
        }

        ScopeOutcome::from_complete(!self.is_active && self.child.is_none())
    }

    fn update_session(&mut self, event: &RawEvent, dispatch: &Dispatch<'_>) {
        let time = event.time();
        let now = time.nano_time;
        let is_new = self.session_id == NULL_UUID;
        let expired = self
            .last_interaction_nanos
            .map_or(true, |last| now - last >= self.deps.session_inactivity_ns());
        let timed_out = now - self.session_start_nanos >= self.deps.session_max_duration_ns();

        if !is_new && (expired || timed_out || !self.is_active) {
            self.deps
                .session_metrics
                .end_metric(&self.session_id, dispatch.datadog_context.server_time_offset_ms);
        }
        if !self.is_active {
            return;
        }

        let is_interaction = event.is_interaction()
            || matches!(
                event,
                RawEvent::SdkInit {
                    is_app_in_foreground: true,
                    ..
                } | RawEvent::ApplicationStarted { .. }
            );
        let is_background_launch = event.is_valid_background_event()
            || matches!(
                event,
                RawEvent::SdkInit {
                    is_app_in_foreground: false,
                    ..
                }
            );

        if is_interaction {
            if is_new || expired || timed_out {
                let reason = if is_new {
                    StartReason::UserAppLaunch
                } else if expired {
                    StartReason::InactivityTimeout
                } else {
                    StartReason::MaxDuration
                };
                self.renew(time, reason, dispatch);
            }
            self.last_interaction_nanos = Some(now);
        } else if expired {
            if self.deps.config.background_events_tracking && is_background_launch {
                self.renew(time, StartReason::BackgroundLaunch, dispatch);
                self.last_interaction_nanos = Some(now);
            } else {
                self.state = SessionState::Expired;
            }
        } else if timed_out {
            self.renew(time, StartReason::MaxDuration, dispatch);
        }
    }

    fn renew(&mut self, time: Time, reason: StartReason, dispatch: &Dispatch<'_>) {
        let keep = self.deps.sampler.sample(self.deps.config.session_sample_rate);
        self.start_reason = reason;
        self.state = if keep {
            SessionState::Tracked
        } else {
            SessionState::NotTracked
        };
        self.session_id = self.deps.new_id();
        self.session_start_nanos = time.nano_time;

        if keep {
            self.deps.session_metrics.start_metric(
                &self.session_id,
                reason,
                dispatch.datadog_context.server_time_offset_ms,
                self.deps.config.background_events_tracking,
            );
        }
        if let Some(listener) = &self.deps.session_listener {
            listener.on_session_started(&self.session_id, !keep);
        }

        self.child = Some(match &self.child {
            Some(previous) => previous.renewed(time),
            None => ViewManagerScope::new(self.deps.clone(), false),
        });
        debug!(
            session_id = %self.session_id,
            start_reason = reason.as_str(),
            tracked = keep,
            "RUM session started"
        );
    }

    fn publish_session_change(&mut self) {
        if self.session_id == NULL_UUID {
            return;
        }
        let keep = self.state == SessionState::Tracked;
        if let Some((id, kept)) = &self.last_published {
            if *id == self.session_id && *kept == keep {
                return;
            }
        }
        if let Some(bus) = &self.deps.session_replay_bus {
            bus.publish(SessionRenewedMessage::new(self.session_id.as_str(), keep));
        }
        self.last_published = Some((self.session_id.clone(), keep));
    }
}
