// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

mod input;

use std::{env, sync::Arc};
use tokio::{
    io::{AsyncBufRead, AsyncBufReadExt, BufReader},
    time::{interval, Duration},
};
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use betterstack_sink::{BetterStackSink, LevelMask, LogEvent, SinkConfig, SledStorage};

const FLUSH_INTERVAL: Duration = Duration::from_secs(5);
const DEFAULT_BATCH_SIZE: usize = 100;

#[tokio::main]
pub async fn main() {
    let log_level = env::var("BETTERSTACK_LOG_LEVEL")
        .map(|val| val.to_lowercase())
        .unwrap_or("info".to_string());

    let env_filter = format!("h2=off,hyper=off,rustls=off,{}", log_level);

    #[allow(clippy::expect_used)]
    let subscriber = tracing_subscriber::fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_new(env_filter).expect("could not parse log level in configuration"),
        )
        .with_writer(std::io::stderr)
        .with_level(true)
        .with_thread_names(false)
        .with_thread_ids(false)
        .with_line_number(false)
        .with_file(false)
        .with_target(true)
        .without_time()
        .finish();

    #[allow(clippy::expect_used)]
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    debug!("Logging subsystem enabled");

    let config = match SinkConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("Error creating config on forwarder startup: {e}");
            return;
        }
    };

    let batch_size = env::var("BETTERSTACK_BATCH_SIZE")
        .ok()
        .and_then(|size| size.parse::<usize>().ok())
        .filter(|size| *size > 0)
        .unwrap_or(DEFAULT_BATCH_SIZE);
    let level_mask = env::var("BETTERSTACK_LEVEL_MASK")
        .ok()
        .and_then(|mask| mask.parse::<u32>().ok());

    let mut builder = BetterStackSink::builder(config.clone());
    if let Some(mask) = level_mask {
        builder = builder.level_filter(Arc::new(LevelMask(mask)));
    }
    if config.durable {
        if let Some(storage) = open_queue(env::var("BETTERSTACK_QUEUE_PATH").ok()) {
            builder = builder.storage(Arc::new(storage));
        }
    }

    let sink = match builder.build() {
        Ok(sink) => sink,
        Err(e) => {
            error!("Error creating sink on forwarder startup: {e}");
            return;
        }
    };

    info!(
        "Forwarding stdin to {} (durable: {})",
        config.ingestion_uri(),
        sink.is_durable()
    );

    let forwarded = forward(&sink, BufReader::new(tokio::io::stdin()), batch_size).await;
    debug!("Forwarded {forwarded} events");

    if let Some(report) = sink.replay_complete().await {
        info!(
            "Replayed {} pending batches, {} failed",
            report.outcomes.len(),
            report.failures().count()
        );
    }

    if let Err(e) = sink.flush().await {
        error!("Failed to flush sink: {e}");
    }
}

/// Opens the sled queue at `path`. Failures are only debug output: without
/// storage the sink builder reports the durability downgrade itself.
fn open_queue(path: Option<String>) -> Option<SledStorage> {
    let Some(path) = path else {
        debug!("BETTERSTACK_QUEUE_PATH not set");
        return None;
    };
    match SledStorage::open(&path) {
        Ok(storage) => Some(storage),
        Err(e) => {
            debug!("Unable to open queue at {path}: {e}");
            None
        }
    }
}

/// Reads events until EOF, emitting a batch whenever `batch_size` events are
/// buffered or the flush interval elapses. Returns the number of events read.
async fn forward<R>(sink: &BetterStackSink, reader: R, batch_size: usize) -> usize
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    let mut batch: Vec<LogEvent> = Vec::with_capacity(batch_size);
    let mut forwarded = 0;

    let mut flush_interval = interval(FLUSH_INTERVAL);
    flush_interval.tick().await; // discard first tick, which is instantaneous

    loop {
        tokio::select! {
            line = lines.next_line() => match line {
                Ok(Some(line)) => {
                    match input::parse_line(&line) {
                        Ok(Some(event)) => {
                            batch.push(event);
                            forwarded += 1;
                        }
                        Ok(None) => {}
                        Err(e) => warn!("Skipping malformed event: {e}"),
                    }
                    if batch.len() >= batch_size {
                        ship(sink, &mut batch).await;
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    error!("Failed to read from stdin: {e}");
                    break;
                }
            },
            _ = flush_interval.tick() => ship(sink, &mut batch).await,
        }
    }

    ship(sink, &mut batch).await;
    forwarded
}

async fn ship(sink: &BetterStackSink, batch: &mut Vec<LogEvent>) {
    if batch.is_empty() {
        return;
    }
    let events = std::mem::take(batch);
    if let Err(e) = sink.emit(&events).await {
        error!("Failed to ship {} events: {e}", events.len());
    }
}
