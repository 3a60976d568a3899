// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Batch delivery: submission, fault classification, provisioning, and
//! retry against one log stream.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::batcher::Batch;
use crate::errors::ShipError;
use crate::rate_limiter::RateLimiter;
use crate::retry::Retrier;
use crate::store::{
    LogStore, StoreError, ERR_DATA_ALREADY_ACCEPTED, ERR_INVALID_PARAMETER,
    ERR_INVALID_SEQUENCE_TOKEN, ERR_RESOURCE_ALREADY_EXISTS, ERR_RESOURCE_NOT_FOUND,
};

/// What a failed submission means for the retry loop.
enum Fault {
    /// The store holds this batch already; success in disguise.
    AlreadyAccepted,
    /// Group or stream missing; provision, then resubmit.
    ResourceMissing,
    /// Sequence token mismatch, carrying the token the store asked for
    /// when it named one.
    SequenceConflict { corrected: Option<String> },
    /// Worth resubmitting after a backoff.
    Transient,
    /// Resubmitting the same batch cannot help.
    Fatal,
}

fn classify(error: &StoreError) -> Fault {
    match error {
        StoreError::Remote { code, message } => match code.as_str() {
            ERR_DATA_ALREADY_ACCEPTED => Fault::AlreadyAccepted,
            ERR_RESOURCE_NOT_FOUND => Fault::ResourceMissing,
            ERR_INVALID_SEQUENCE_TOKEN => Fault::SequenceConflict {
                corrected: trailing_token(message),
            },
            ERR_INVALID_PARAMETER => Fault::Fatal,
            _ => Fault::Transient,
        },
        StoreError::Transport(_)
        | StoreError::Payload(_)
        | StoreError::Unexpected { .. }
        | StoreError::Config(_) => Fault::Fatal,
    }
}

/// The store spells out the token it expects as the last word of the
/// conflict message.
fn trailing_token(message: &str) -> Option<String> {
    message.split_whitespace().last().map(str::to_string)
}

/// Submits batches to a single stream and owns its sequence token.
pub(crate) struct Deliverer {
    store: Arc<dyn LogStore>,
    group: String,
    stream: String,
    sequence_token: Option<String>,
    rate: RateLimiter,
    max_retry_time: Duration,
}

impl Deliverer {
    pub(crate) fn new(
        store: Arc<dyn LogStore>,
        group: String,
        stream: String,
        rate: RateLimiter,
        max_retry_time: Duration,
    ) -> Self {
        Self {
            store,
            group,
            stream,
            sequence_token: None,
            rate,
            max_retry_time,
        }
    }

    /// Submits `batch`, retrying recoverable faults until the retry
    /// budget runs out.
    ///
    /// [`ShipError::LimiterClosed`] means the batch was never attempted
    /// and its events are still intact.
    pub(crate) async fn deliver(&mut self, batch: &Batch) -> Result<(), ShipError> {
        self.rate.admit().await?;

        let mut retrier = Retrier::new(self.max_retry_time);
        // One free correction per conflict streak. A second conflict
        // right after applying the store's token means another writer is
        // racing us on this stream, so further corrections back off.
        let mut just_corrected = false;
        loop {
            if retrier.expired() {
                return Err(ShipError::RetryExhausted(self.max_retry_time));
            }

            let error = match self
                .store
                .put_events(
                    &self.group,
                    &self.stream,
                    self.sequence_token.as_deref(),
                    batch.events(),
                )
                .await
            {
                Ok(ack) => {
                    self.sequence_token = ack.next_sequence_token;
                    return Ok(());
                }
                Err(error) => error,
            };

            match classify(&error) {
                Fault::AlreadyAccepted => {
                    debug!("store already has this batch: {error}");
                    return Ok(());
                }
                Fault::ResourceMissing => {
                    just_corrected = false;
                    self.provision().await;
                    retrier.backoff().await;
                }
                Fault::SequenceConflict {
                    corrected: Some(token),
                } if !just_corrected => {
                    debug!("sequence token conflict, store expects {token}");
                    self.sequence_token = Some(token);
                    just_corrected = true;
                }
                Fault::SequenceConflict {
                    corrected: Some(token),
                } => {
                    warn!("sequence token conflict persists, store expects {token}");
                    self.sequence_token = Some(token);
                    retrier.backoff().await;
                }
                Fault::SequenceConflict { corrected: None } => {
                    warn!("sequence token conflict without a usable token: {error}");
                    retrier.backoff().await;
                }
                Fault::Transient => {
                    just_corrected = false;
                    warn!("store rejected batch, will retry: {error}");
                    retrier.backoff().await;
                }
                Fault::Fatal => return Err(ShipError::Abandoned(error)),
            }
        }
    }

    /// Creates the group and stream. Failures are logged and swallowed;
    /// the retry loop learns whether provisioning worked by resubmitting.
    async fn provision(&self) {
        info!(
            "log group or stream missing, provisioning {}/{}",
            self.group, self.stream
        );
        if let Err(error) = self.store.create_group(&self.group).await {
            if error.has_code(ERR_RESOURCE_ALREADY_EXISTS) {
                debug!("log group {} already exists", self.group);
            } else {
                warn!("could not create log group {}: {error}", self.group);
            }
        }
        if let Err(error) = self.store.create_stream(&self.group, &self.stream).await {
            if error.has_code(ERR_RESOURCE_ALREADY_EXISTS) {
                debug!("log stream {} already exists", self.stream);
            } else {
                warn!("could not create log stream {}: {error}", self.stream);
            }
        }
    }

    /// Stops admitting new batches. In-flight retries finish on their own.
    pub(crate) fn close(&self) {
        self.rate.close();
    }
}
