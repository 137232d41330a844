// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Structured log sink for the Better Stack HTTP intake.
//!
//! Each `emit` call becomes one JSON array POSTed to the intake. In durable
//! mode the batch is persisted right before it is sent and removed once the
//! intake acknowledges it, so whatever a crash or failed request leaves behind
//! is replayed the next time a sink is built.
//!
//! # Example
//!
//! ```rust,ignore
//! use betterstack_sink::{BetterStackSink, LevelMask, LogEvent, SinkConfig, SledStorage};
//! use std::sync::Arc;
//!
//! let sink = BetterStackSink::builder(SinkConfig { durable: true, ..SinkConfig::new(token) })
//!     .level_filter(Arc::new(LevelMask(15)))
//!     .storage(Arc::new(SledStorage::open("/var/lib/app/log-queue")?))
//!     .build()?;
//!
//! sink.emit(&[LogEvent::new(15, "User {user} signed in").with_property("user", "alice")])
//!     .await?;
//! ```

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

pub mod client;
pub mod config;
pub mod error;
pub mod event;
pub mod queue;
pub mod sink;
pub mod translate;

pub use client::{DeliveryClient, Transport};
pub use config::{SinkConfig, DEFAULT_INGESTION_URI};
pub use error::{ConfigError, DeliveryError, StorageError};
pub use event::{ErrorInfo, LevelFilter, LevelMask, LogEvent};
pub use queue::{DurableQueue, MemoryStorage, PendingBatch, SledStorage, Storage, KEY_PREFIX};
pub use sink::{BetterStackSink, ReplayOutcome, ReplayReport, Sink, SinkBuilder};
pub use translate::{translate, OutboundRecord};
