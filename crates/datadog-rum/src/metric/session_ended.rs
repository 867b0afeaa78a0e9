// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Summary metric emitted when a tracked session ends.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, PoisonError};

use serde::Serialize;
use tracing::{debug, info};

use crate::context::{StartReason, ViewType};
use crate::event::MissedEventType;
use crate::time::NANOS_PER_MILLI;

pub const RUM_SESSION_ENDED_METRIC_NAME: &str = "[Mobile Metric] RUM Session Ended";

/// View update as seen by the session metric.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackedViewUpdate {
    pub view_id: String,
    pub view_url: String,
    pub view_type: ViewType,
    /// Server-corrected start date of the view, in milliseconds.
    pub start_ms: i64,
    pub duration_ns: i64,
}

pub trait SessionMetricDispatcher: Send + Sync {
    fn start_metric(
        &self,
        session_id: &str,
        start_reason: StartReason,
        ntp_offset_at_start_ms: i64,
        background_events_tracking: bool,
    );
    fn on_view_tracked(&self, session_id: &str, view: &TrackedViewUpdate);
    fn on_missed_event_tracked(&self, session_id: &str, missed: MissedEventType);
    fn on_session_stopped(&self, session_id: &str);
    fn end_metric(&self, session_id: &str, ntp_offset_at_end_ms: i64);
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ViewCounts {
    pub total: usize,
    pub background: usize,
    pub app_launch: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NoViewEventsCount {
    pub actions: u32,
    pub resources: u32,
    pub errors: u32,
    pub long_tasks: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NtpOffset {
    pub at_start: i64,
    pub at_end: i64,
}

/// Attributes of the session-ended metric.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionEndedReport {
    pub process_type: &'static str,
    pub precondition: StartReason,
    pub duration: i64,
    pub was_stopped: bool,
    pub views_count: ViewCounts,
    pub no_view_events_count: NoViewEventsCount,
    pub has_background_events_tracking_enabled: bool,
    pub ntp_offset: NtpOffset,
}

#[derive(Debug, Clone)]
struct TrackedView {
    view_type: ViewType,
    start_ms: i64,
    duration_ns: i64,
}

/// Aggregation for a single session.
#[derive(Debug, Clone)]
pub struct SessionEndedMetric {
    start_reason: StartReason,
    ntp_offset_at_start_ms: i64,
    background_events_tracking: bool,
    views: HashMap<String, TrackedView>,
    first_view: Option<String>,
    last_view: Option<String>,
    missed: BTreeMap<MissedEventType, u32>,
    was_stopped: bool,
}

impl SessionEndedMetric {
    #[must_use]
    pub fn new(
        start_reason: StartReason,
        ntp_offset_at_start_ms: i64,
        background_events_tracking: bool,
    ) -> Self {
        SessionEndedMetric {
            start_reason,
            ntp_offset_at_start_ms,
            background_events_tracking,
            views: HashMap::new(),
            first_view: None,
            last_view: None,
            missed: BTreeMap::new(),
            was_stopped: false,
        }
    }

    pub fn on_view_tracked(&mut self, view: &TrackedViewUpdate) {
        let start_ms = self
            .views
            .get(&view.view_id)
            .map_or(view.start_ms, |known| known.start_ms);
        self.views.insert(
            view.view_id.clone(),
            TrackedView {
                view_type: view.view_type,
                start_ms,
                duration_ns: view.duration_ns,
            },
        );
        if self.first_view.is_none() {
            self.first_view = Some(view.view_id.clone());
        }
        self.last_view = Some(view.view_id.clone());
    }

    pub fn on_missed_event_tracked(&mut self, missed: MissedEventType) {
        *self.missed.entry(missed).or_insert(0) += 1;
    }

    pub fn on_session_stopped(&mut self) {
        self.was_stopped = true;
    }

    fn duration(&self) -> i64 {
        let first = self.first_view.as_ref().and_then(|id| self.views.get(id));
        let last = self.last_view.as_ref().and_then(|id| self.views.get(id));
        match (first, last) {
            (Some(first), Some(last)) => {
                (last.start_ms - first.start_ms) * NANOS_PER_MILLI + last.duration_ns
            }
            _ => 0,
        }
    }

    #[must_use]
    pub fn report(&self, ntp_offset_at_end_ms: i64) -> SessionEndedReport {
        let count_type = |view_type| {
            self.views
                .values()
                .filter(|v| v.view_type == view_type)
                .count()
        };
        let missed = |kind| self.missed.get(&kind).copied().unwrap_or(0);
        SessionEndedReport {
            process_type: "app",
            precondition: self.start_reason,
            duration: self.duration(),
            was_stopped: self.was_stopped,
            views_count: ViewCounts {
                total: self.views.len(),
                background: count_type(ViewType::Background),
                app_launch: count_type(ViewType::ApplicationLaunch),
            },
            no_view_events_count: NoViewEventsCount {
                actions: missed(MissedEventType::Action),
                resources: missed(MissedEventType::Resource),
                errors: missed(MissedEventType::Error),
                long_tasks: missed(MissedEventType::LongTask),
            },
            has_background_events_tracking_enabled: self.background_events_tracking,
            ntp_offset: NtpOffset {
                at_start: self.ntp_offset_at_start_ms,
                at_end: ntp_offset_at_end_ms,
            },
        }
    }
}

/// Keeps one metric per tracked session and logs it when the session ends.
#[derive(Debug, Default)]
pub struct LoggingSessionMetricDispatcher {
    metrics: Mutex<HashMap<String, SessionEndedMetric>>,
}

impl LoggingSessionMetricDispatcher {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn with_metric(&self, session_id: &str, f: impl FnOnce(&mut SessionEndedMetric)) {
        let mut metrics = self.metrics.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(metric) = metrics.get_mut(session_id) {
            f(metric);
        }
    }

    /// Number of sessions whose metric is still open.
    #[must_use]
    pub fn open_sessions(&self) -> usize {
        self.metrics
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl SessionMetricDispatcher for LoggingSessionMetricDispatcher {
    fn start_metric(
        &self,
        session_id: &str,
        start_reason: StartReason,
        ntp_offset_at_start_ms: i64,
        background_events_tracking: bool,
    ) {
        let mut metrics = self.metrics.lock().unwrap_or_else(PoisonError::into_inner);
        metrics.insert(
            session_id.to_string(),
            SessionEndedMetric::new(
                start_reason,
                ntp_offset_at_start_ms,
                background_events_tracking,
            ),
        );
    }

    fn on_view_tracked(&self, session_id: &str, view: &TrackedViewUpdate) {
        self.with_metric(session_id, |metric| metric.on_view_tracked(view));
    }

    fn on_missed_event_tracked(&self, session_id: &str, missed: MissedEventType) {
        self.with_metric(session_id, |metric| metric.on_missed_event_tracked(missed));
    }

    fn on_session_stopped(&self, session_id: &str) {
        self.with_metric(session_id, SessionEndedMetric::on_session_stopped);
    }

    fn end_metric(&self, session_id: &str, ntp_offset_at_end_ms: i64) {
        let metric = self
            .metrics
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(session_id);
        let Some(metric) = metric else {
            return;
        };
        let report = metric.report(ntp_offset_at_end_ms);
        match serde_json::to_string(&report) {
            Ok(rse) => info!(
                session_id,
                metric_type = "rum session ended",
                rse = %rse,
                "{RUM_SESSION_ENDED_METRIC_NAME}"
            ),
            Err(e) => debug!("Unable to encode the session ended metric: {e}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_test::traced_test;

    fn view(id: &str, view_type: ViewType, start_ms: i64, duration_ns: i64) -> TrackedViewUpdate {
        TrackedViewUpdate {
            view_id: id.to_string(),
            view_url: format!("url/{id}"),
            view_type,
            start_ms,
            duration_ns,
        }
    }

    #[test]
    fn test_report_counts_views_and_missed_events() {
        let mut metric = SessionEndedMetric::new(StartReason::UserAppLaunch, 10, true);
        metric.on_view_tracked(&view("a", ViewType::ApplicationLaunch, 1_000, 5));
        metric.on_view_tracked(&view("b", ViewType::Foreground, 2_000, 100));
        metric.on_view_tracked(&view("b", ViewType::Foreground, 2_500, 300));
        metric.on_view_tracked(&view("c", ViewType::Background, 3_000, 7));
        metric.on_missed_event_tracked(MissedEventType::Action);
        metric.on_missed_event_tracked(MissedEventType::Action);
        metric.on_missed_event_tracked(MissedEventType::LongTask);
        metric.on_session_stopped();

        let report = metric.report(20);

        assert_eq!(
            report.views_count,
            ViewCounts {
                total: 3,
                background: 1,
                app_launch: 1
            }
        );
        assert_eq!(report.no_view_events_count.actions, 2);
        assert_eq!(report.no_view_events_count.long_tasks, 1);
        assert_eq!(report.no_view_events_count.errors, 0);
        assert!(report.was_stopped);
        assert_eq!(report.duration, 2_000 * NANOS_PER_MILLI + 7);
        assert_eq!(
            report.ntp_offset,
            NtpOffset {
                at_start: 10,
                at_end: 20
            }
        );
    }

    #[traced_test]
    #[test]
    fn test_dispatcher_logs_on_end_once() {
        let dispatcher = LoggingSessionMetricDispatcher::new();
        dispatcher.start_metric("s1", StartReason::InactivityTimeout, 0, false);
        dispatcher.on_missed_event_tracked("s1", MissedEventType::Resource);
        dispatcher.on_missed_event_tracked("unknown", MissedEventType::Resource);
        assert_eq!(dispatcher.open_sessions(), 1);

        dispatcher.end_metric("s1", 0);
        dispatcher.end_metric("s1", 0);

        assert_eq!(dispatcher.open_sessions(), 0);
        assert!(logs_contain("RUM Session Ended"));
        assert!(logs_contain("inactivity_timeout"));
    }
}
