// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

/// Invalid RUM configuration
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Invalid value '{value}' for {name}")]
    InvalidValue { name: &'static str, value: String },
}

/// Failure to persist a finalized record. Never surfaced past the write path.
#[derive(Debug, thiserror::Error)]
pub enum WriteError {
    #[error("Failed to serialize event: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Writer failure: {0}")]
    Writer(String),

    #[error("Storage unavailable")]
    StorageUnavailable,
}

/// Errors returned by the monitor handle
#[derive(Debug, thiserror::Error)]
pub enum MonitorError {
    #[error("RUM monitor is not running")]
    ChannelClosed,

    #[error("RUM monitor dropped the response: {0}")]
    ResponseDropped(#[from] tokio::sync::oneshot::error::RecvError),
}
