// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Dual clock readings.
//!
//! A [`Time`] pairs a wall-clock timestamp (milliseconds since the Unix epoch)
//! with a monotonic instant (nanoseconds since an arbitrary process-local
//! origin). All durations and thresholds are computed from the monotonic part;
//! the wall-clock part is only used for the `date` of emitted records, after
//! the server offset correction.

use std::sync::OnceLock;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

/// Nanoseconds in one millisecond.
pub const NANOS_PER_MILLI: i64 = 1_000_000;

/// Nanoseconds in one second.
pub const NANOS_PER_SECOND: i64 = 1_000_000_000;

static MONOTONIC_ORIGIN: OnceLock<Instant> = OnceLock::new();

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Time {
    /// Wall-clock time in milliseconds since the Unix epoch.
    pub timestamp: i64,
    /// Monotonic instant in nanoseconds.
    pub nano_time: i64,
}

impl Time {
    #[must_use]
    pub const fn new(timestamp: i64, nano_time: i64) -> Self {
        Time {
            timestamp,
            nano_time,
        }
    }

    /// Reads both clocks.
    #[must_use]
    pub fn now() -> Self {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| i64::try_from(d.as_millis()).unwrap_or(i64::MAX))
            .unwrap_or_default();
        Time {
            timestamp,
            nano_time: monotonic_nanos(),
        }
    }

    /// Timestamp of the record emitted for this time, corrected by the server offset.
    #[must_use]
    pub const fn corrected_timestamp(&self, server_time_offset_ms: i64) -> i64 {
        self.timestamp + server_time_offset_ms
    }

    /// Builds the time of an earlier instant, expressed in monotonic nanoseconds,
    /// by walking both clocks back by the same amount.
    #[must_use]
    pub const fn rewind_to(&self, earlier_nano_time: i64) -> Self {
        let elapsed_ms = (self.nano_time - earlier_nano_time) / NANOS_PER_MILLI;
        Time {
            timestamp: self.timestamp - elapsed_ms,
            nano_time: earlier_nano_time,
        }
    }
}

/// Nanoseconds elapsed since the first clock reading of this process.
#[must_use]
pub fn monotonic_nanos() -> i64 {
    let origin = MONOTONIC_ORIGIN.get_or_init(Instant::now);
    i64::try_from(origin.elapsed().as_nanos()).unwrap_or(i64::MAX)
}

/// Converts milliseconds to nanoseconds, saturating on overflow.
#[must_use]
pub const fn millis_to_nanos(ms: i64) -> i64 {
    ms.saturating_mul(NANOS_PER_MILLI)
}
