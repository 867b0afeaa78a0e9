// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Time between the last user interaction on a view and the start of the next view.

use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};

use crate::event::ActionType;
use crate::time::NANOS_PER_SECOND;

/// Interactions older than this before the next view are ignored.
pub const DEFAULT_MAX_INTERACTION_GAP_NS: i64 = 3 * NANOS_PER_SECOND;

const MAX_TRACKED_VIEWS: usize = 4;

#[derive(Debug, Clone)]
struct TrackedView {
    view_id: String,
    start_nanos: i64,
    last_interaction_nanos: Option<i64>,
}

/// Shared by all the views of one view manager.
#[derive(Debug)]
pub struct InteractionToNextViewMetricResolver {
    max_gap_ns: i64,
    views: Mutex<VecDeque<TrackedView>>,
}

impl Default for InteractionToNextViewMetricResolver {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_INTERACTION_GAP_NS)
    }
}

const fn is_user_interaction(action_type: ActionType) -> bool {
    matches!(
        action_type,
        ActionType::Tap | ActionType::Click | ActionType::Swipe | ActionType::Back
    )
}

impl InteractionToNextViewMetricResolver {
    #[must_use]
    pub fn new(max_gap_ns: i64) -> Self {
        InteractionToNextViewMetricResolver {
            max_gap_ns,
            views: Mutex::new(VecDeque::new()),
        }
    }

    pub fn on_view_created(&self, view_id: &str, start_nanos: i64) {
        let mut views = self.views.lock().unwrap_or_else(PoisonError::into_inner);
        views.push_back(TrackedView {
            view_id: view_id.to_string(),
            start_nanos,
            last_interaction_nanos: None,
        });
        while views.len() > MAX_TRACKED_VIEWS {
            views.pop_front();
        }
    }

    /// Records an action that was written for `view_id`.
    pub fn on_action_sent(&self, view_id: &str, action_type: ActionType, event_end_nanos: i64) {
        if !is_user_interaction(action_type) {
            return;
        }
        let mut views = self.views.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(view) = views.iter_mut().find(|v| v.view_id == view_id) {
            view.last_interaction_nanos = Some(
                view.last_interaction_nanos
                    .map_or(event_end_nanos, |n| n.max(event_end_nanos)),
            );
        }
    }

    #[must_use]
    pub fn resolve_metric(&self, view_id: &str) -> Option<i64> {
        let views = self.views.lock().unwrap_or_else(PoisonError::into_inner);
        let index = views.iter().position(|v| v.view_id == view_id)?;
        let current = &views[index];
        let previous = views.get(index.checked_sub(1)?)?;
        let interaction = previous.last_interaction_nanos?;
        let gap = current.start_nanos - interaction;
        (gap > 0 && gap <= self.max_gap_ns).then_some(gap)
    }
}
