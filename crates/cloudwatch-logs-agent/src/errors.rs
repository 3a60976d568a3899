// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::time::Duration;

use thiserror::Error as ThisError;

use crate::store::StoreError;

/// Errors surfaced by the shipping pipeline.
///
/// Only `BufferOverflow` and `WriterClosed` reach the writer synchronously.
/// The remaining variants are produced and absorbed inside the consumer task;
/// a producing program never stalls on them.
#[derive(ThisError, Debug)]
pub enum ShipError {
    /// An undelimited run grew past the tokenizer's buffer cap. The run is
    /// discarded; lines already emitted are unaffected.
    #[error("undelimited input exceeds the {limit} byte message buffer")]
    BufferOverflow {
        /// The configured buffer cap.
        limit: usize,
    },
    /// Write, flush, or close was called after close.
    #[error("writer is closed")]
    WriterClosed,
    /// The event queue refused the event. The event has already been recorded
    /// to the failure sink by the time this is returned.
    #[error("event queue is full")]
    Backpressure,
    /// The rate limiter is closed; the batch was not attempted.
    #[error("rate limiter is closed")]
    LimiterClosed,
    /// The retry budget ran out before the store accepted the batch.
    #[error("delivery retries exhausted after {0:?}")]
    RetryExhausted(Duration),
    /// The batch was dropped on a non-retryable store outcome.
    #[error("batch abandoned: {0}")]
    Abandoned(#[source] StoreError),
}
