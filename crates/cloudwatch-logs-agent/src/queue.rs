// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use crate::errors::ShipError;
use crate::event::LogEvent;
use crate::failure::FailureSink;

/// Bounded, non-blocking handoff between the write path and the consumer.
///
/// The producer never waits: an event the channel cannot take right now goes
/// to the failure sink and the push reports backpressure.
pub(crate) struct EventQueue {
    tx: mpsc::Sender<LogEvent>,
    failures: FailureSink,
}

impl EventQueue {
    pub(crate) fn bounded(
        capacity: usize,
        failures: FailureSink,
    ) -> (Self, mpsc::Receiver<LogEvent>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx, failures }, rx)
    }

    /// Hands an event to the consumer without blocking.
    pub(crate) fn push(&self, event: LogEvent) -> Result<(), ShipError> {
        match self.tx.try_send(event) {
            Ok(()) => Ok(()),
            // A dead consumer refuses events the same way a full one does.
            Err(TrySendError::Full(event) | TrySendError::Closed(event)) => {
                self.failures.record_event(&event);
                Err(ShipError::Backpressure)
            }
        }
    }
}
