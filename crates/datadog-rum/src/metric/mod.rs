// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Metrics resolved alongside the scope tree.
//!
//! Resolvers are shared between scopes through `Arc` and mutate behind a
//! mutex; the scope tree only feeds them lifecycle notifications and reads
//! their result when a record is built.

pub mod interaction_to_next_view;
pub mod network_settled;
pub mod session_ended;

pub use interaction_to_next_view::InteractionToNextViewMetricResolver;
pub use network_settled::NetworkSettledMetricResolver;
pub use session_ended::{LoggingSessionMetricDispatcher, SessionMetricDispatcher};
