// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Pipeline limits and assembly configuration.
//!
//! Everything here is explicit: the shipper takes a [`ShipperConfig`] by
//! value and nothing reads ambient global state. The constants are the
//! defaults [`ShipperConfig::new`] fills in.

use std::time::Duration;

/// Largest undelimited run the tokenizer buffers before failing the write.
pub const DEFAULT_MAX_MESSAGE_BYTES: usize = 32 * 1024;

/// Default capacity of the bounded handoff between the write path and the
/// consumer task.
pub const DEFAULT_QUEUE_CAPACITY: usize = 64 * 1024;

/// Ceiling on the cumulative wire length of one batch, imposed by the store.
pub const MAX_BATCH_BYTES: usize = 1_048_576;

/// Ceiling on the number of events in one batch, imposed by the store.
pub const MAX_BATCH_EVENTS: usize = 10_000;

/// Fixed overhead the store accounts per event on top of the message bytes.
pub const EVENT_OVERHEAD_BYTES: usize = 26;

/// Default ceiling on the total time spent retrying one batch.
pub const DEFAULT_MAX_RETRY_TIME: Duration = Duration::from_secs(60 * 60);

/// Default number of submissions admitted per rate-limit period.
pub const DEFAULT_RATE_LIMIT_SLOTS: usize = 5;

/// Default rate-limit refill period.
pub const DEFAULT_RATE_LIMIT_PERIOD: Duration = Duration::from_secs(1);

/// Default interval between timer-driven flush cycles.
pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_secs(1);

/// Assembly-time configuration for a [`LogShipper`](crate::shipper::LogShipper).
#[derive(Clone, Debug)]
pub struct ShipperConfig {
    /// Destination log group.
    pub group: String,
    /// Destination log stream.
    pub stream: String,
    /// Host identity recorded in every envelope.
    pub instance: String,
    /// Application build identity recorded in every envelope.
    pub image: String,
    /// Severity label recorded in every envelope.
    pub level: String,
    /// Interval between timer-driven flush cycles.
    pub flush_interval: Duration,
    /// Capacity of the write-path handoff queue.
    pub queue_capacity: usize,
    /// Largest undelimited run the tokenizer buffers.
    pub max_message_bytes: usize,
    /// Wire-length ceiling per batch.
    pub max_batch_bytes: usize,
    /// Event-count ceiling per batch.
    pub max_batch_events: usize,
    /// Total retry budget per batch.
    pub max_retry_time: Duration,
    /// Admissions per rate-limit period.
    pub rate_limit_slots: usize,
    /// Rate-limit refill period.
    pub rate_limit_period: Duration,
}

impl ShipperConfig {
    /// Configuration for `group`/`stream` with default limits, an `INFO`
    /// level, and empty identity fields.
    #[must_use]
    pub fn new(group: impl Into<String>, stream: impl Into<String>) -> Self {
        Self {
            group: group.into(),
            stream: stream.into(),
            instance: String::new(),
            image: String::new(),
            level: "INFO".to_string(),
            flush_interval: DEFAULT_FLUSH_INTERVAL,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            max_message_bytes: DEFAULT_MAX_MESSAGE_BYTES,
            max_batch_bytes: MAX_BATCH_BYTES,
            max_batch_events: MAX_BATCH_EVENTS,
            max_retry_time: DEFAULT_MAX_RETRY_TIME,
            rate_limit_slots: DEFAULT_RATE_LIMIT_SLOTS,
            rate_limit_period: DEFAULT_RATE_LIMIT_PERIOD,
        }
    }
}
