// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Background service draining the event queue into delivered batches.

use std::collections::VecDeque;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;
use tokio::time::interval;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::batcher::{Batch, Batcher};
use crate::deliverer::Deliverer;
use crate::errors::ShipError;
use crate::event::LogEvent;
use crate::failure::FailureSink;

/// Consumer half of the pipeline. Buffers incoming events and flushes
/// them on a timer, on queue closure, and on shutdown.
pub(crate) struct ShipperService {
    rx: mpsc::Receiver<LogEvent>,
    pending: Vec<LogEvent>,
    batcher: Batcher,
    deliverer: Deliverer,
    flush_interval: Duration,
    shutdown: CancellationToken,
    failures: FailureSink,
}

impl ShipperService {
    pub(crate) fn new(
        rx: mpsc::Receiver<LogEvent>,
        batcher: Batcher,
        deliverer: Deliverer,
        flush_interval: Duration,
        shutdown: CancellationToken,
        failures: FailureSink,
    ) -> Self {
        Self {
            rx,
            pending: Vec::new(),
            batcher,
            deliverer,
            flush_interval,
            shutdown,
            failures,
        }
    }

    /// Runs until the queue closes or shutdown is signalled, then drains
    /// whatever is still queued and flushes one last time.
    pub(crate) async fn run(mut self) {
        let shutdown = self.shutdown.clone();
        let mut flush_timer = interval(self.flush_interval);
        flush_timer.tick().await; // discard first tick, which is instantaneous

        loop {
            tokio::select! {
                received = self.rx.recv() => match received {
                    Some(event) => self.pending.push(event),
                    None => break,
                },
                _ = flush_timer.tick() => {
                    if !self.pending.is_empty() {
                        self.flush().await;
                    }
                }
                _ = shutdown.cancelled() => break,
            }
        }

        // Producers may have enqueued between the last poll and the
        // break; take everything buffered before the final flush.
        'drain: loop {
            match self.rx.try_recv() {
                Ok(event) => self.pending.push(event),
                Err(TryRecvError::Empty | TryRecvError::Disconnected) => break 'drain,
            }
        }
        self.flush().await;

        if !self.pending.is_empty() {
            warn!("{} event(s) undeliverable at shutdown", self.pending.len());
            for event in &self.pending {
                self.failures.record_event(event);
            }
        }
        self.deliverer.close();
        debug!("log shipper service stopped");
    }

    /// Splits the pending events into batches and delivers them in order.
    ///
    /// An admission denial puts the remaining events back into `pending`
    /// so the shutdown path can account for them; any other delivery
    /// failure drops only the affected batch into the failure sink.
    async fn flush(&mut self) {
        let events = std::mem::take(&mut self.pending);
        if events.is_empty() {
            return;
        }

        let mut batches: VecDeque<Batch> = self.batcher.split(events).into();
        while let Some(batch) = batches.pop_front() {
            match self.deliverer.deliver(&batch).await {
                Ok(()) => {}
                Err(ShipError::LimiterClosed) => {
                    warn!("admission denied, deferring {} batch(es)", 1 + batches.len());
                    self.pending.extend(batch.into_events());
                    while let Some(rest) = batches.pop_front() {
                        self.pending.extend(rest.into_events());
                    }
                    return;
                }
                Err(error) => {
                    warn!("dropping batch of {} event(s): {error}", batch.len());
                    self.failures.record_batch(&batch);
                }
            }
        }
    }
}
