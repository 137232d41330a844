// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! The sink a host logging framework talks to.
//!
//! # Emit cycle
//!
//! ```text
//!   emit(events)
//!       │
//!       v
//!   ┌─────────────┐
//!   │   Filter    │ (host-supplied LevelFilter)
//!   └──────┬──────┘
//!          │ nothing left -> Ok, no request
//!          v
//!   ┌─────────────┐
//!   │  Translate  │ (one JSON array per emit call)
//!   └──────┬──────┘
//!          │
//!          v
//!   ┌─────────────┐
//!   │  Persist    │ (durable mode only)
//!   └──────┬──────┘
//!          │
//!          v
//!   ┌─────────────┐
//!   │  HTTP POST  │
//!   └──────┬──────┘
//!          │
//!          v
//!   ack: remove persisted copy / fail: keep it, suppress or return error
//! ```
//!
//! # Replay
//!
//! Building a durable sink lists every batch a previous run persisted but never
//! got acknowledged, then spawns a task that re-sends exactly those. The builder
//! does not wait for the sends; [`BetterStackSink::replay_complete`] does.

use crate::client::{send_and_then, DeliveryClient, Transport};
use crate::config::SinkConfig;
use crate::error::{ConfigError, DeliveryError};
use crate::event::{LevelFilter, LogEvent};
use crate::queue::{DurableQueue, PendingBatch, Storage};
use crate::translate::serialize_batch;
use async_trait::async_trait;
use std::fmt;
use std::sync::{Arc, Mutex};
use tokio::runtime::Handle;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, error, warn, Instrument};

const SINK_NAME: &str = "BetterStackSink";

/// Lifecycle contract the host logging framework drives.
#[async_trait]
pub trait Sink: Send + Sync {
    /// Ships one batch made of `events`.
    async fn emit(&self, events: &[LogEvent]) -> Result<(), DeliveryError>;

    /// Waits for buffered events to be shipped.
    async fn flush(&self) -> Result<(), DeliveryError>;

    fn name(&self) -> &str;
}

/// Result of re-sending one persisted batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplayOutcome {
    pub key: String,
    /// `Ok` when delivered, or when the failure was suppressed.
    pub result: Result<(), DeliveryError>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReplayReport {
    pub outcomes: Vec<ReplayOutcome>,
}

impl ReplayReport {
    pub fn outcome(&self, key: &str) -> Option<&ReplayOutcome> {
        self.outcomes.iter().find(|outcome| outcome.key == key)
    }

    pub fn failures(&self) -> impl Iterator<Item = &ReplayOutcome> {
        self.outcomes.iter().filter(|outcome| outcome.result.is_err())
    }
}

/// Collects what [`BetterStackSink`] needs besides its [`SinkConfig`].
pub struct SinkBuilder {
    config: SinkConfig,
    filter: Option<Arc<dyn LevelFilter>>,
    storage: Option<Arc<dyn Storage>>,
    transport: Option<Arc<dyn Transport>>,
}

impl SinkBuilder {
    #[must_use]
    pub fn new(config: SinkConfig) -> Self {
        Self {
            config,
            filter: None,
            storage: None,
            transport: None,
        }
    }

    /// Only events this filter enables are shipped. Without one, everything is.
    #[must_use]
    pub fn level_filter(mut self, filter: Arc<dyn LevelFilter>) -> Self {
        self.filter = Some(filter);
        self
    }

    /// Persistent medium used in durable mode.
    #[must_use]
    pub fn storage(mut self, storage: Arc<dyn Storage>) -> Self {
        self.storage = Some(storage);
        self
    }

    /// Replaces the HTTP client, e.g. with a scripted transport in tests.
    #[must_use]
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Validates the configuration and, in durable mode, starts replaying
    /// batches left over by a previous run.
    ///
    /// Replay is spawned on the current tokio runtime; without one it is skipped.
    pub fn build(self) -> Result<BetterStackSink, ConfigError> {
        self.config.validate()?;

        let queue = match (self.config.durable, self.storage) {
            (true, Some(storage)) => Some(DurableQueue::new(storage)),
            (true, None) => {
                warn!(
                    "BETTERSTACK | Durable delivery requested but no persistent storage is available, continuing without durability"
                );
                None
            }
            (false, _) => None,
        };

        let transport = self.transport.unwrap_or_else(|| {
            Arc::new(DeliveryClient::new(
                self.config.ingestion_uri(),
                &self.config.token,
            ))
        });
        let suppress_errors = self.config.suppress_errors();

        let replay = queue.as_ref().and_then(|queue| match Handle::try_current() {
            Ok(handle) => {
                // Listed before returning: batches this sink emits are never its own replay.
                let pending = queue.list_pending().unwrap_or_else(|e| {
                    error!("BETTERSTACK | Failed to list pending batches: {e}");
                    Vec::new()
                });
                Some(handle.spawn(
                    replay_pending(
                        Arc::clone(&transport),
                        queue.clone(),
                        pending,
                        suppress_errors,
                    )
                    .in_current_span(),
                ))
            }
            Err(_) => {
                warn!("BETTERSTACK | No async runtime available, skipping replay of pending batches");
                None
            }
        });

        Ok(BetterStackSink {
            transport,
            queue,
            filter: self.filter,
            suppress_errors,
            replay: Mutex::new(replay),
        })
    }
}

/// Ships structured log events to Better Stack.
pub struct BetterStackSink {
    transport: Arc<dyn Transport>,
    queue: Option<DurableQueue>,
    filter: Option<Arc<dyn LevelFilter>>,
    suppress_errors: bool,
    replay: Mutex<Option<JoinHandle<ReplayReport>>>,
}

impl BetterStackSink {
    #[must_use]
    pub fn builder(config: SinkConfig) -> SinkBuilder {
        SinkBuilder::new(config)
    }

    /// Sink with the default HTTP client and no level filter or storage.
    pub fn new(config: SinkConfig) -> Result<Self, ConfigError> {
        SinkBuilder::new(config).build()
    }

    /// Whether batches are persisted until acknowledged.
    pub fn is_durable(&self) -> bool {
        self.queue.is_some()
    }

    /// Waits for the startup replay and returns its outcomes.
    ///
    /// `None` when no replay was started, or when it was already collected.
    pub async fn replay_complete(&self) -> Option<ReplayReport> {
        let handle = self.replay.lock().ok().and_then(|mut replay| replay.take())?;
        match handle.await {
            Ok(report) => Some(report),
            Err(e) => {
                error!("BETTERSTACK | Replay task failed: {e}");
                None
            }
        }
    }

    pub async fn emit(&self, events: &[LogEvent]) -> Result<(), DeliveryError> {
        let retained: Vec<&LogEvent> = events
            .iter()
            .filter(|event| {
                self.filter
                    .as_ref()
                    .map_or(true, |filter| filter.is_enabled(event.level))
            })
            .collect();

        if retained.is_empty() {
            return Ok(());
        }

        let payload = match serialize_batch(&retained) {
            Ok(payload) => payload,
            Err(e) => {
                error!("BETTERSTACK | Failed to serialize batch. Data dropped: {e}");
                let failure = Err(DeliveryError::Serialization(e.to_string()));
                return apply_suppression(self.suppress_errors, failure, None);
            }
        };

        let key = self.queue.as_ref().and_then(|queue| {
            let key = queue.generate_key();
            match queue.put(&key, &payload) {
                Ok(()) => Some(key),
                Err(e) => {
                    warn!("BETTERSTACK | Failed to persist batch, sending without durability: {e}");
                    None
                }
            }
        });

        debug!(
            "BETTERSTACK | Sending batch of {} events{}",
            retained.len(),
            key.as_deref()
                .map(|key| format!(" as {key}"))
                .unwrap_or_default()
        );

        let result = deliver(
            self.transport.as_ref(),
            self.queue.as_ref(),
            key.as_deref(),
            payload,
        )
        .await;
        apply_suppression(self.suppress_errors, result, key.as_deref())
    }

    pub async fn flush(&self) -> Result<(), DeliveryError> {
        Ok(())
    }
}

#[async_trait]
impl Sink for BetterStackSink {
    async fn emit(&self, events: &[LogEvent]) -> Result<(), DeliveryError> {
        BetterStackSink::emit(self, events).await
    }

    async fn flush(&self) -> Result<(), DeliveryError> {
        BetterStackSink::flush(self).await
    }

    fn name(&self) -> &str {
        SINK_NAME
    }
}

impl fmt::Display for BetterStackSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(SINK_NAME)
    }
}

impl fmt::Debug for BetterStackSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct(SINK_NAME)
            .field("queue", &self.queue)
            .field("suppress_errors", &self.suppress_errors)
            .field("filtered", &self.filter.is_some())
            .finish_non_exhaustive()
    }
}

/// Sends `payload`; once acknowledged, drops its persisted copy.
async fn deliver(
    transport: &dyn Transport,
    queue: Option<&DurableQueue>,
    key: Option<&str>,
    payload: String,
) -> Result<(), DeliveryError> {
    send_and_then(transport, payload, || async {
        if let (Some(queue), Some(key)) = (queue, key) {
            if let Err(e) = queue.remove(key) {
                // Left in place, the batch is sent again on the next start.
                warn!("BETTERSTACK | Delivered batch {key} could not be removed: {e}");
            }
        }
    })
    .await
}

fn apply_suppression(
    suppress_errors: bool,
    result: Result<(), DeliveryError>,
    key: Option<&str>,
) -> Result<(), DeliveryError> {
    match result {
        Ok(()) => Ok(()),
        Err(e) if suppress_errors => {
            match key {
                Some(key) => warn!("BETTERSTACK | Suppressed delivery failure for {key}: {e}"),
                None => warn!("BETTERSTACK | Suppressed delivery failure: {e}"),
            }
            Ok(())
        }
        Err(e) => {
            debug!("BETTERSTACK | Delivery failed: {e}");
            Err(e)
        }
    }
}

async fn replay_pending(
    transport: Arc<dyn Transport>,
    queue: DurableQueue,
    pending: Vec<PendingBatch>,
    suppress_errors: bool,
) -> ReplayReport {
    if pending.is_empty() {
        return ReplayReport::default();
    }
    debug!("BETTERSTACK | Replaying {} pending batches", pending.len());

    let mut set = JoinSet::new();
    for PendingBatch { key, payload } in pending {
        let transport = Arc::clone(&transport);
        let queue = queue.clone();
        set.spawn(
            async move {
                let result = deliver(transport.as_ref(), Some(&queue), Some(&key), payload).await;
                let result = apply_suppression(suppress_errors, result, Some(&key));
                ReplayOutcome { key, result }
            }
            .in_current_span(),
        );
    }

    let mut report = ReplayReport::default();
    while let Some(joined) = set.join_next().await {
        match joined {
            Ok(outcome) => report.outcomes.push(outcome),
            Err(e) => debug!("BETTERSTACK | Failed to join replay task: {e}"),
        }
    }
    report
}
