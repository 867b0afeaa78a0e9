// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Replays a JSON-lines file of time-stamped RUM events through the monitor
//! and prints every finalized record as one JSON line on stdout.
//!
//! Each input line carries `at_ms`, the event time in milliseconds since the
//! process start, and a `type` naming the event:
//!
//! ```text
//! {"at_ms": 0, "type": "start_view", "id": "home", "name": "Home"}
//! {"at_ms": 20, "type": "start_resource", "key": "r1", "url": "https://example.com"}
//! {"at_ms": 80, "type": "stop_resource", "key": "r1", "status_code": 200}
//! ```

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

use std::collections::HashMap;
use std::env;
use std::io::Write;
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use datadog_rum::attributes::Attributes;
use datadog_rum::config::RumConfig;
use datadog_rum::context::DatadogContext;
use datadog_rum::event::{
    ActionType, ErrorSource, RawEvent, ResourceKind, ResourceMethod, ViewKey,
};
use datadog_rum::listener::StaticProcessInfo;
use datadog_rum::model::EventType;
use datadog_rum::monitor::{RumMonitorHandle, RumMonitorService};
use datadog_rum::resource_key::ResourceKey;
use datadog_rum::scope::RumDependencies;
use datadog_rum::storage::{EventBatchWriter, EventWriteScope, JsonDataWriter};
use datadog_rum::time::{Time, NANOS_PER_MILLI};

/// Wall-clock origin of replayed timestamps.
const REPLAY_EPOCH_MS: i64 = 1_700_000_000_000;

#[derive(Debug, Deserialize)]
struct ReplayLine {
    at_ms: i64,
    #[serde(flatten)]
    event: ReplayEvent,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ReplayEvent {
    StartView {
        id: String,
        name: Option<String>,
        #[serde(default)]
        attributes: Attributes,
    },
    StopView {
        id: String,
        name: Option<String>,
        #[serde(default)]
        attributes: Attributes,
    },
    StartAction {
        action_type: ActionType,
        name: String,
        #[serde(default)]
        wait_for_stop: bool,
        #[serde(default)]
        attributes: Attributes,
    },
    StopAction {
        action_type: Option<ActionType>,
        name: Option<String>,
        #[serde(default)]
        attributes: Attributes,
    },
    StartResource {
        key: String,
        url: String,
        #[serde(default)]
        method: ResourceMethod,
        #[serde(default)]
        attributes: Attributes,
    },
    StopResource {
        key: String,
        status_code: Option<i64>,
        size: Option<i64>,
        #[serde(default)]
        kind: ResourceKind,
        #[serde(default)]
        attributes: Attributes,
    },
    StopResourceWithError {
        key: String,
        status_code: Option<i64>,
        message: String,
        #[serde(default)]
        source: ErrorSource,
        #[serde(default)]
        attributes: Attributes,
    },
    AddError {
        message: String,
        #[serde(default)]
        source: ErrorSource,
        error_type: Option<String>,
        stack_trace: Option<String>,
        #[serde(default)]
        is_fatal: bool,
        #[serde(default)]
        attributes: Attributes,
    },
    AddLongTask {
        duration_ms: i64,
        #[serde(default)]
        target: String,
    },
    AddFeatureFlag {
        name: String,
        value: Value,
    },
    AddTiming {
        name: String,
    },
    KeepAlive,
    SdkInit {
        #[serde(default)]
        foreground: bool,
    },
    StopSession,
    ResetSession,
}

/// Batch writer printing each accepted payload as a line on stdout.
struct StdoutBatch;

impl EventBatchWriter for StdoutBatch {
    fn write(&mut self, payload: &[u8], _event_type: EventType) -> bool {
        let mut stdout = std::io::stdout().lock();
        match stdout
            .write_all(payload)
            .and_then(|()| stdout.write_all(b"\n"))
        {
            Ok(()) => true,
            Err(e) => {
                warn!("Failed to print RUM record: {e}");
                false
            }
        }
    }
}

struct StdoutWriteScope {
    datadog_context: DatadogContext,
}

impl EventWriteScope for StdoutWriteScope {
    fn with_write_context(
        &self,
        callback: &mut dyn FnMut(&DatadogContext, &mut dyn EventBatchWriter),
    ) {
        callback(&self.datadog_context, &mut StdoutBatch);
    }
}

/// Turns replay lines into raw events, binding textual resource keys to issued keys.
struct Replayer {
    handle: RumMonitorHandle,
    keys: HashMap<String, ResourceKey>,
}

impl Replayer {
    fn key(&mut self, name: &str) -> ResourceKey {
        let registry = self.handle.resource_keys();
        self.keys
            .entry(name.to_string())
            .or_insert_with(|| registry.issue())
            .clone()
    }

    fn release(&mut self, name: &str) -> Result<()> {
        if let Some(key) = self.keys.remove(name) {
            self.handle.release_resource_key(key)?;
        }
        Ok(())
    }

    fn replay(&mut self, line: ReplayLine) -> Result<()> {
        let time = Time::new(REPLAY_EPOCH_MS + line.at_ms, line.at_ms * NANOS_PER_MILLI);
        let mut released = None;
        let event = match line.event {
            ReplayEvent::StartView {
                id,
                name,
                attributes,
            } => RawEvent::StartView {
                key: view_key(id, name),
                attributes,
                time,
            },
            ReplayEvent::StopView {
                id,
                name,
                attributes,
            } => RawEvent::StopView {
                key: view_key(id, name),
                attributes,
                time,
            },
            ReplayEvent::StartAction {
                action_type,
                name,
                wait_for_stop,
                attributes,
            } => RawEvent::StartAction {
                action_type,
                name,
                wait_for_stop,
                attributes,
                time,
            },
            ReplayEvent::StopAction {
                action_type,
                name,
                attributes,
            } => RawEvent::StopAction {
                action_type,
                name,
                attributes,
                time,
            },
            ReplayEvent::StartResource {
                key,
                url,
                method,
                attributes,
            } => RawEvent::StartResource {
                key: self.key(&key),
                url,
                method,
                attributes,
                time,
            },
            ReplayEvent::StopResource {
                key,
                status_code,
                size,
                kind,
                attributes,
            } => {
                let resource_key = self.key(&key);
                released = Some(key);
                RawEvent::StopResource {
                    key: resource_key,
                    status_code,
                    size,
                    kind,
                    attributes,
                    time,
                }
            }
            ReplayEvent::StopResourceWithError {
                key,
                status_code,
                message,
                source,
                attributes,
            } => {
                let resource_key = self.key(&key);
                released = Some(key);
                RawEvent::StopResourceWithError {
                    key: resource_key,
                    status_code,
                    message,
                    source,
                    error_type: None,
                    stack_trace: None,
                    attributes,
                    time,
                }
            }
            ReplayEvent::AddError {
                message,
                source,
                error_type,
                stack_trace,
                is_fatal,
                attributes,
            } => RawEvent::AddError {
                message,
                source,
                error_type,
                stack_trace,
                category: None,
                is_fatal,
                attributes,
                time,
            },
            ReplayEvent::AddLongTask {
                duration_ms,
                target,
            } => RawEvent::AddLongTask {
                duration_ns: duration_ms * NANOS_PER_MILLI,
                target,
                time,
            },
            ReplayEvent::AddFeatureFlag { name, value } => {
                RawEvent::AddFeatureFlagEvaluation { name, value, time }
            }
            ReplayEvent::AddTiming { name } => RawEvent::AddCustomTiming { name, time },
            ReplayEvent::KeepAlive => RawEvent::KeepAlive { time },
            ReplayEvent::SdkInit { foreground } => RawEvent::SdkInit {
                is_app_in_foreground: foreground,
                time,
            },
            ReplayEvent::StopSession => RawEvent::StopSession { time },
            ReplayEvent::ResetSession => RawEvent::ResetSession { time },
        };

        self.handle.handle_event(event)?;
        if let Some(name) = released {
            self.release(&name)?;
        }
        Ok(())
    }
}

fn view_key(id: String, name: Option<String>) -> ViewKey {
    let name = name.unwrap_or_else(|| id.clone());
    ViewKey::named(id, name)
}

fn datadog_context() -> DatadogContext {
    DatadogContext {
        service: env::var("DD_SERVICE").unwrap_or_else(|_| "rum-replay".to_string()),
        env: env::var("DD_ENV").unwrap_or_default(),
        version: env::var("DD_VERSION").unwrap_or_default(),
        ..DatadogContext::default()
    }
}

async fn replay_lines<R>(reader: R, replayer: &mut Replayer) -> Result<usize>
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(reader).lines();
    let mut count = 0;
    let mut line_number = 0;
    while let Some(line) = lines.next_line().await? {
        line_number += 1;
        if line.trim().is_empty() {
            continue;
        }
        let parsed: ReplayLine = serde_json::from_str(&line)
            .with_context(|| format!("invalid replay event on line {line_number}"))?;
        replayer.replay(parsed)?;
        count += 1;
    }
    Ok(count)
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = RumConfig::from_env().context("invalid RUM configuration")?;

    let env_filter = format!("{},datadog_rum_replay={}", config.log_level, config.log_level);
    let subscriber = tracing_subscriber::fmt::Subscriber::builder()
        .with_env_filter(EnvFilter::try_new(env_filter).context("could not parse log level")?)
        .with_writer(std::io::stderr)
        .with_level(true)
        .with_thread_names(false)
        .with_thread_ids(false)
        .with_line_number(false)
        .with_file(false)
        .with_target(true)
        .without_time()
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("setting default subscriber failed")?;

    debug!("Logging subsystem enabled");

    let deps = RumDependencies::new(config).with_process_info(Arc::new(StaticProcessInfo {
        foreground: true,
        start_nanos: 0,
    }));
    let write_scope = Arc::new(StdoutWriteScope {
        datadog_context: datadog_context(),
    });
    let (service, handle) = RumMonitorService::new(
        deps,
        write_scope.datadog_context.clone(),
        write_scope,
        Arc::new(JsonDataWriter),
    );
    let service_task = tokio::spawn(service.run());

    let mut replayer = Replayer {
        handle: handle.clone(),
        keys: HashMap::new(),
    };
    let count = match env::args().nth(1) {
        Some(path) => {
            let file = tokio::fs::File::open(&path)
                .await
                .with_context(|| format!("could not open {path}"))?;
            replay_lines(file, &mut replayer).await?
        }
        None => replay_lines(tokio::io::stdin(), &mut replayer).await?,
    };

    let context = handle.rum_context().await?;
    info!(
        events = count,
        session_id = %context.session_id,
        "Replay finished"
    );
    handle.shutdown()?;
    service_task.await.context("RUM monitor task failed")?;
    Ok(())
}
