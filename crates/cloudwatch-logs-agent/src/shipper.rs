// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Public facade tying the pipeline together behind [`std::io::Write`].

use std::collections::BTreeMap;
use std::io::{self, Write};
use std::panic::Location;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use crate::batcher::Batcher;
use crate::config::ShipperConfig;
use crate::deliverer::Deliverer;
use crate::errors::ShipError;
use crate::event::{Envelope, LogEvent};
use crate::failure::FailureSink;
use crate::queue::EventQueue;
use crate::rate_limiter::RateLimiter;
use crate::service::ShipperService;
use crate::store::LogStore;
use crate::tokenizer::{EmitFn, LineTokenizer};

/// Shape of the one-line reports [`LogShipper::write_error`] ships.
#[derive(Serialize)]
struct ErrorRecord<'a> {
    kind: &'static str,
    file: &'a str,
    line: u32,
    error: String,
}

/// Shape of the exchange summaries [`LogShipper::write_roundtrip`] ships.
#[derive(Serialize)]
struct RoundTripRecord {
    kind: &'static str,
    url: String,
    status: u16,
    content_length: Option<u64>,
    duration_ms: u64,
    headers: BTreeMap<String, String>,
}

/// A [`Write`] implementation that ships complete lines to a log store.
///
/// Bytes written here are split into lines, wrapped in the configured
/// identity envelope, and handed to a background task that batches and
/// delivers them. Writes never wait on the network: when the pipeline
/// cannot keep up the write fails fast and the affected events go to
/// the failure sink.
///
/// Call [`close`](Self::close) to flush everything and stop the
/// background task; dropping the shipper only signals it to stop.
pub struct LogShipper {
    tokenizer: LineTokenizer,
    shutdown: CancellationToken,
    service: Option<JoinHandle<()>>,
}

impl LogShipper {
    /// Starts a shipper whose refused work is reported on stderr.
    ///
    /// Must be called from inside a Tokio runtime; the delivery task is
    /// spawned onto it.
    #[must_use]
    pub fn new(store: Arc<dyn LogStore>, config: ShipperConfig) -> Self {
        Self::with_failure_sink(store, config, FailureSink::stderr())
    }

    /// Starts a shipper with an explicit failure sink.
    #[must_use]
    pub fn with_failure_sink(
        store: Arc<dyn LogStore>,
        config: ShipperConfig,
        failures: FailureSink,
    ) -> Self {
        let (queue, rx) = EventQueue::bounded(config.queue_capacity, failures.clone());

        let instance = config.instance;
        let image = config.image;
        let level = config.level;
        let emit: EmitFn = Box::new(move |token| {
            let envelope = Envelope {
                instance: instance.clone(),
                image: image.clone(),
                level: level.clone(),
                message: String::from_utf8_lossy(token).into_owned(),
            };
            match LogEvent::from_envelope(&envelope) {
                // A refused push is already routed to the failure sink
                // by the queue itself.
                Ok(event) => {
                    let _ = queue.push(event);
                }
                Err(err) => debug!("dropping unencodable envelope: {err}"),
            }
        });
        let tokenizer = LineTokenizer::new(config.max_message_bytes, emit);

        let rate = RateLimiter::start(config.rate_limit_slots, config.rate_limit_period);
        let deliverer = Deliverer::new(
            store,
            config.group,
            config.stream,
            rate,
            config.max_retry_time,
        );
        let shutdown = CancellationToken::new();
        let service = ShipperService::new(
            rx,
            Batcher::new(config.max_batch_bytes, config.max_batch_events),
            deliverer,
            config.flush_interval,
            shutdown.clone(),
            failures,
        );
        let service = tokio::spawn(service.run());

        Self {
            tokenizer,
            shutdown,
            service: Some(service),
        }
    }

    /// Ships one JSON value as a single line.
    pub fn write_json<T: Serialize>(&mut self, value: &T) -> io::Result<()> {
        let mut line = serde_json::to_vec(value)
            .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))?;
        line.push(b'\n');
        self.write_all(&line)
    }

    /// Ships a one-line summary of a finished HTTP exchange.
    ///
    /// The summary covers the response side of the exchange plus how
    /// long it took; a [`reqwest::Response`] does not carry its
    /// originating request.
    pub fn write_roundtrip(
        &mut self,
        response: &reqwest::Response,
        duration: Duration,
    ) -> io::Result<()> {
        let headers: BTreeMap<String, String> = response
            .headers()
            .iter()
            .map(|(name, value)| {
                let value = value.to_str().unwrap_or("<unprintable>").to_string();
                (name.as_str().to_string(), value)
            })
            .collect();
        self.write_json(&RoundTripRecord {
            kind: "roundtrip",
            url: response.url().to_string(),
            status: response.status().as_u16(),
            content_length: response.content_length(),
            duration_ms: u64::try_from(duration.as_millis()).unwrap_or(u64::MAX),
            headers,
        })
    }

    /// Ships a one-line error report naming the caller's file and line.
    #[track_caller]
    pub fn write_error(&mut self, error: &dyn std::error::Error) -> io::Result<()> {
        let location = Location::caller();
        self.write_json(&ErrorRecord {
            kind: "error",
            file: location.file(),
            line: location.line(),
            error: error.to_string(),
        })
    }

    /// Flushes everything buffered and stops the background task.
    ///
    /// The tokenizer closes first so a trailing unterminated line still
    /// reaches the queue ahead of the service's final drain. Closing a
    /// second time fails with [`ShipError::WriterClosed`].
    pub async fn close(&mut self) -> Result<(), ShipError> {
        self.tokenizer.close()?;
        self.shutdown.cancel();
        if let Some(service) = self.service.take() {
            if let Err(err) = service.await {
                error!("log shipper service task failed: {err}");
            }
        }
        Ok(())
    }
}

impl Write for LogShipper {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.tokenizer
            .write(buf)
            .map_err(|err| io::Error::new(io::ErrorKind::Other, err))
    }

    fn flush(&mut self) -> io::Result<()> {
        self.tokenizer
            .flush()
            .map_err(|err| io::Error::new(io::ErrorKind::Other, err))
    }
}

impl Drop for LogShipper {
    fn drop(&mut self) {
        // The graceful path is close(); dropping only tells the
        // background task to stop.
        self.shutdown.cancel();
    }
}
