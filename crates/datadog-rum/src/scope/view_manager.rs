// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Owns the views of one session and decides where events without a view go.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::attributes::Attributes;
use crate::context::ViewType;
use crate::event::{RawEvent, ViewKey};
use crate::metric::InteractionToNextViewMetricResolver;
use crate::scope::view::{ViewScope, ViewSeed};
use crate::scope::{Dispatch, ParentScope, RumDependencies, ScopeOutcome};
use crate::time::{Time, NANOS_PER_SECOND};

pub const BACKGROUND_VIEW_ID: &str = "com.datadog.background.view";
pub const BACKGROUND_VIEW_URL: &str = "com/datadog/background/view";
pub const BACKGROUND_VIEW_NAME: &str = "Background";

pub const APP_LAUNCH_VIEW_ID: &str = "com.datadog.application-launch.view";
pub const APP_LAUNCH_VIEW_URL: &str = "com/datadog/application-launch/view";
pub const APP_LAUNCH_VIEW_NAME: &str = "ApplicationLaunch";

pub const MESSAGE_MISSING_VIEW: &str =
    "A RUM event was detected, but no view is active. Start a view before reporting events.";
pub const MESSAGE_MISSING_VIEW_FOR_LOADING_TIME: &str =
    "No active view found to add the loading time.";

/// Gaps between two consecutive views above this are not reported.
pub const MAX_REPORTED_VIEW_GAP_NS: i64 = 3 * NANOS_PER_SECOND;

pub struct ViewManagerScope {
    deps: Arc<RumDependencies>,
    views: Vec<ViewScope>,
    application_displayed: bool,
    stopped: bool,
    last_stopped_view_time: Option<Time>,
    interaction_to_next_view: Arc<InteractionToNextViewMetricResolver>,
}

impl std::fmt::Debug for ViewManagerScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ViewManagerScope")
            .field("views", &self.views)
            .field("application_displayed", &self.application_displayed)
            .field("stopped", &self.stopped)
            .finish_non_exhaustive()
    }
}

impl ViewManagerScope {
    #[must_use]
    pub fn new(deps: Arc<RumDependencies>, application_displayed: bool) -> Self {
        ViewManagerScope {
            deps,
            views: Vec::new(),
            application_displayed,
            stopped: false,
            last_stopped_view_time: None,
            interaction_to_next_view: Arc::new(InteractionToNextViewMetricResolver::default()),
        }
    }

    /// Fresh manager for a renewed session, restarting every active view at `time`.
    #[must_use]
    pub fn renewed(&self, time: Time) -> Self {
        let mut manager = ViewManagerScope::new(self.deps.clone(), self.application_displayed);
        manager.views = self
            .views
            .iter()
            .filter(|view| view.is_active())
            .map(|view| {
                ViewScope::new(
                    self.deps.clone(),
                    manager.interaction_to_next_view.clone(),
                    view.seed(),
                    time,
                )
            })
            .collect();
        manager
    }

    /// Most recently started view that is still active.
    #[must_use]
    pub fn active_view(&self) -> Option<&ViewScope> {
        self.views.iter().rev().find(|view| view.is_active())
    }

    #[must_use]
    pub const fn is_application_displayed(&self) -> bool {
        self.application_displayed
    }

    pub fn handle_event(
        &mut self,
        event: &RawEvent,
        parent: &ParentScope,
        dispatch: &Dispatch<'_>,
    ) -> ScopeOutcome {
        if let RawEvent::ApplicationStarted { time, .. } = event {
            if !self.application_displayed && !self.stopped {
                self.start_application_launch_view(event, *time, parent, dispatch);
                return ScopeOutcome::Active;
            }
        }

        self.delegate_to_children(event, parent, dispatch);

        match event {
            RawEvent::StartView {
                key,
                attributes,
                time,
            } if !self.stopped => {
                self.start_foreground_view(key, attributes, *time, parent, dispatch);
            }
            RawEvent::StopSession { .. } => self.stopped = true,
            _ if !self.stopped && self.active_view().is_none() => {
                self.handle_orphan_event(event, parent, dispatch);
            }
            _ => {}
        }

        ScopeOutcome::from_complete(self.stopped && self.views.is_empty())
    }

    fn delegate_to_children(&mut self, event: &RawEvent, parent: &ParentScope, dispatch: &Dispatch<'_>) {
        let stopped_key = match event {
            RawEvent::StopView { key, .. } => Some(&key.id),
            _ => None,
        };
        let mut view_stopped = false;
        self.views.retain_mut(|view| {
            if view.is_active() && stopped_key == Some(&view.key().id) {
                view_stopped = true;
            }
            !view.handle_event(event, parent, dispatch).is_complete()
        });
        if view_stopped {
            self.last_stopped_view_time = Some(event.time());
        }
    }

    fn start_foreground_view(
        &mut self,
        key: &ViewKey,
        attributes: &Attributes,
        time: Time,
        parent: &ParentScope,
        dispatch: &Dispatch<'_>,
    ) {
        let seed = ViewSeed {
            key: key.clone(),
            attributes: attributes.clone(),
            view_type: ViewType::Foreground,
        };
        let mut view = ViewScope::new(
            self.deps.clone(),
            self.interaction_to_next_view.clone(),
            seed,
            time,
        );
        self.application_displayed = true;
        view.handle_event(&RawEvent::KeepAlive { time }, parent, dispatch);
        self.views.push(view);

        if let Some(previous) = self.last_stopped_view_time.take() {
            let gap = time.nano_time - previous.nano_time;
            if (1..MAX_REPORTED_VIEW_GAP_NS).contains(&gap) {
                debug!(view_gap_ns = gap, "[Mobile Metric] Gap between views");
            } else if gap < 0 {
                debug!(view_gap_ns = gap, "[Mobile Metric] Negative gap between views");
            }
        }
    }

    fn start_application_launch_view(
        &mut self,
        event: &RawEvent,
        time: Time,
        parent: &ParentScope,
        dispatch: &Dispatch<'_>,
    ) {
        let seed = ViewSeed {
            key: ViewKey::new(APP_LAUNCH_VIEW_ID, APP_LAUNCH_VIEW_URL, APP_LAUNCH_VIEW_NAME),
            attributes: Attributes::new(),
            view_type: ViewType::ApplicationLaunch,
        };
        let mut view = ViewScope::new(
            self.deps.clone(),
            self.interaction_to_next_view.clone(),
            seed,
            time,
        );
        self.application_displayed = true;
        if !view.handle_event(event, parent, dispatch).is_complete() {
            self.views.push(view);
        }
    }

    fn handle_orphan_event(&mut self, event: &RawEvent, parent: &ParentScope, dispatch: &Dispatch<'_>) {
        if matches!(event, RawEvent::AddViewLoadingTime { .. }) {
            warn!("{MESSAGE_MISSING_VIEW_FOR_LOADING_TIME}");
            return;
        }

        let foreground = self.deps.process_info.is_foreground();
        let delivered = if self.application_displayed || !foreground {
            self.handle_background_event(event, parent, dispatch)
        } else if !event.is_silent_orphan() && !event.is_anr() {
            let time = event
                .time()
                .rewind_to(self.deps.process_info.process_start_nanos());
            debug!("{} received before any view, starting the application launch view", event.name());
            self.start_application_launch_view(event, time, parent, dispatch);
            true
        } else {
            false
        };

        if !delivered {
            match event.missed_event_type() {
                Some(missed) => self
                    .deps
                    .session_metrics
                    .on_missed_event_tracked(&parent.rum_context.session_id, missed),
                None => debug!("{} event dropped: no active view", event.name()),
            }
        }
    }

    fn handle_background_event(&mut self, event: &RawEvent, parent: &ParentScope, dispatch: &Dispatch<'_>) -> bool {
        if event.is_anr() {
            debug!("Ignoring ANR error received without an active view");
            return false;
        }
        if event.is_valid_background_event() && self.deps.config.background_events_tracking {
            let seed = ViewSeed {
                key: ViewKey::new(BACKGROUND_VIEW_ID, BACKGROUND_VIEW_URL, BACKGROUND_VIEW_NAME),
                attributes: Attributes::new(),
                view_type: ViewType::Background,
            };
            let mut view = ViewScope::new(
                self.deps.clone(),
                self.interaction_to_next_view.clone(),
                seed,
                event.time(),
            );
            if !view.handle_event(event, parent, dispatch).is_complete() {
                self.views.push(view);
            }
            self.last_stopped_view_time = None;
            return true;
        }
        if !event.is_silent_orphan() {
            warn!("{MESSAGE_MISSING_VIEW}");
        }
        false
    }
}
