// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use chrono::Utc;
use serde::Serialize;

use crate::config::EVENT_OVERHEAD_BYTES;

/// The JSON object shipped for each tokenized message. Field order is wire
/// order.
#[derive(Serialize, Clone, Debug)]
pub struct Envelope {
    /// Host the message came from.
    pub instance: String,
    /// Application build that produced it.
    pub image: String,
    /// Severity of the stream it was read from.
    pub level: String,
    /// The tokenized line itself.
    pub message: String,
}

/// A timestamped store event. The same shape serves as the wire payload and
/// the failure-sink record.
#[derive(Serialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct LogEvent {
    /// Unix milliseconds at enqueue time.
    pub timestamp: i64,
    /// Serialized envelope.
    pub message: String,
}

impl LogEvent {
    /// Builds the wire event for `envelope`, stamped with the current time.
    pub fn from_envelope(envelope: &Envelope) -> Result<Self, serde_json::Error> {
        Ok(Self {
            timestamp: Utc::now().timestamp_millis(),
            message: serde_json::to_string(envelope)?,
        })
    }

    /// Wire length the store accounts for this event: the message bytes plus
    /// a fixed per-event overhead.
    #[must_use]
    pub fn wire_len(&self) -> usize {
        self.message.len() + EVENT_OVERHEAD_BYTES
    }
}
