// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Event-processing core of a Real User Monitoring (RUM) client.
//!
//! Raw application lifecycle signals (view changes, user actions, network
//! calls, errors, long tasks) enter a tree of cooperating scopes:
//!
//! ```text
//! ApplicationScope
//!   └── SessionScope          sampling, inactivity / max-duration renewal
//!         └── ViewManagerScope    foreground, background and app-launch views
//!               └── ViewScope        counters, feature flags, view updates
//!                     ├── ActionScope      tap / custom action, frustrations
//!                     └── ResourceScope*   one in-flight network call
//! ```
//!
//! Every scope is driven by [`scope::application::ApplicationScope::handle_event`]
//! in a single serialized order. Time only advances when an event is handled:
//! thresholds are evaluated against the monotonic part of each event's
//! [`time::Time`]. Finalized records leave the tree through the write-outcome
//! protocol in [`storage`].

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

pub mod attributes;
pub mod config;
pub mod context;
pub mod error;
pub mod event;
pub mod listener;
pub mod metric;
pub mod model;
pub mod monitor;
pub mod resource_key;
pub mod scope;
pub mod storage;
pub mod time;
pub mod vitals;
