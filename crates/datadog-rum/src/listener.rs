// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Collaborators notified by, or queried from, the scope tree.

use serde::Serialize;

/// Notified each time a session starts.
pub trait RumSessionListener: Send + Sync {
    fn on_session_started(&self, session_id: &str, is_discarded: bool);
}

pub const RUM_SESSION_RENEWED_BUS_MESSAGE: &str = "rum_session_renewed";

/// Message published to the session-replay feature when the session changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionRenewedMessage {
    #[serde(rename = "type")]
    pub message_type: &'static str,
    #[serde(rename = "keepSession")]
    pub keep_session: bool,
    #[serde(rename = "sessionId")]
    pub session_id: String,
}

impl SessionRenewedMessage {
    #[must_use]
    pub fn new(session_id: impl Into<String>, keep_session: bool) -> Self {
        SessionRenewedMessage {
            message_type: RUM_SESSION_RENEWED_BUS_MESSAGE,
            keep_session,
            session_id: session_id.into(),
        }
    }
}

pub trait SessionReplayBus: Send + Sync {
    fn publish(&self, message: SessionRenewedMessage);
}

/// Host process state, as seen by the platform lifecycle detection.
pub trait ProcessInfo: Send + Sync {
    /// Whether the process runs with foreground importance.
    fn is_foreground(&self) -> bool;
    /// Monotonic instant of the process start, in nanoseconds.
    fn process_start_nanos(&self) -> i64;
}

/// Process info with fixed values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StaticProcessInfo {
    pub foreground: bool,
    pub start_nanos: i64,
}

impl ProcessInfo for StaticProcessInfo {
    fn is_foreground(&self) -> bool {
        self.foreground
    }

    fn process_start_nanos(&self) -> i64 {
        self.start_nanos
    }
}

pub trait FirstPartyHostResolver: Send + Sync {
    fn is_first_party_url(&self, url: &str) -> bool;
}

/// Resolves first-party urls from a list of hosts. Subdomains of a listed host match too.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FirstPartyHosts {
    hosts: Vec<String>,
}

impl FirstPartyHosts {
    #[must_use]
    pub fn new<I, S>(hosts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        FirstPartyHosts {
            hosts: hosts
                .into_iter()
                .map(|h| h.as_ref().trim().to_lowercase())
                .filter(|h| !h.is_empty())
                .collect(),
        }
    }
}

impl FirstPartyHostResolver for FirstPartyHosts {
    fn is_first_party_url(&self, url: &str) -> bool {
        let Some(host) = url_host(url) else {
            return false;
        };
        let host = host.to_lowercase();
        self.hosts.iter().any(|candidate| {
            host == *candidate
                || host
                    .strip_suffix(candidate.as_str())
                    .is_some_and(|prefix| prefix.ends_with('.'))
        })
    }
}

/// Host part of an absolute url, if it has one.
#[must_use]
pub fn url_host(url: &str) -> Option<&str> {
    let (_, rest) = url.split_once("://")?;
    let authority = rest.split(['/', '?', '#']).next()?;
    let host_port = authority.rsplit_once('@').map_or(authority, |(_, h)| h);
    let host = if host_port.starts_with('[') {
        host_port.split_once(']').map(|(h, _)| &h[1..])?
    } else {
        host_port.split(':').next()?
    };
    (!host.is_empty()).then_some(host)
}
