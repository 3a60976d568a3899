// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::event::LogEvent;

/// An ordered run of events plus its cumulative wire length.
#[derive(Debug, Default)]
pub struct Batch {
    events: Vec<LogEvent>,
    wire_bytes: usize,
}

impl Batch {
    /// The events in submission order.
    #[must_use]
    pub fn events(&self) -> &[LogEvent] {
        &self.events
    }

    /// Cumulative wire length of the events.
    #[must_use]
    pub fn wire_bytes(&self) -> usize {
        self.wire_bytes
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.events.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub(crate) fn into_events(self) -> Vec<LogEvent> {
        self.events
    }

    fn push(&mut self, event: LogEvent) {
        self.wire_bytes += event.wire_len();
        self.events.push(event);
    }
}

/// Packs a pending list into store-sized submissions.
///
/// Greedy prefix packing, order preserving: events join the current batch
/// until adding the next one would push the batch past either ceiling, then
/// the batch is cut. Concatenating the output reproduces the input. An event
/// whose wire length alone exceeds the byte ceiling becomes a singleton
/// batch; upstream message bounds keep that case out of the assembled
/// pipeline.
#[derive(Clone, Copy, Debug)]
pub struct Batcher {
    max_bytes: usize,
    max_events: usize,
}

impl Batcher {
    /// Batcher cutting at `max_bytes` cumulative wire length or `max_events`
    /// events, whichever comes first.
    #[must_use]
    pub fn new(max_bytes: usize, max_events: usize) -> Self {
        Self {
            max_bytes,
            max_events,
        }
    }

    /// Splits `events` into batches honoring both ceilings.
    #[must_use]
    pub fn split(&self, events: Vec<LogEvent>) -> Vec<Batch> {
        let mut batches = Vec::new();
        let mut current = Batch::default();
        for event in events {
            let would_overflow = !current.is_empty()
                && (current.wire_bytes + event.wire_len() > self.max_bytes
                    || current.len() >= self.max_events);
            if would_overflow {
                batches.push(std::mem::take(&mut current));
            }
            current.push(event);
        }
        if !current.is_empty() {
            batches.push(current);
        }
        batches
    }
}
