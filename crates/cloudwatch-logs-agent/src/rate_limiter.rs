// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Submission pacing against the store's per-stream rate.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::time::interval;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::errors::ShipError;

/// A pool of admission slots restored to full every period.
///
/// [`admit`](Self::admit) takes a slot, waiting while none is free; the wait
/// ends when the background refill task tops the pool back up. Closing the
/// limiter stops the refill task and fails current and future admissions.
/// Dropping the limiter closes it.
pub struct RateLimiter {
    slots: Arc<Semaphore>,
    shutdown: CancellationToken,
}

impl RateLimiter {
    /// Starts a limiter admitting `capacity` submissions per `period`.
    /// Must run inside a tokio runtime.
    #[must_use]
    pub fn start(capacity: usize, period: Duration) -> Self {
        let capacity = capacity.max(1);
        let slots = Arc::new(Semaphore::new(capacity));
        let shutdown = CancellationToken::new();
        tokio::spawn(refill(slots.clone(), capacity, period, shutdown.clone()));
        Self { slots, shutdown }
    }

    /// Takes one admission slot, waiting for a refill when none is free.
    ///
    /// Fails with [`ShipError::LimiterClosed`] once the limiter is closed;
    /// a wait already in progress fails the same way.
    pub async fn admit(&self) -> Result<(), ShipError> {
        match self.slots.acquire().await {
            Ok(permit) => {
                permit.forget();
                Ok(())
            }
            Err(_closed) => Err(ShipError::LimiterClosed),
        }
    }

    /// Stops the refill task and fails all pending and future admissions.
    /// Idempotent.
    pub fn close(&self) {
        self.shutdown.cancel();
        self.slots.close();
    }
}

impl Drop for RateLimiter {
    fn drop(&mut self) {
        self.close();
    }
}

async fn refill(
    slots: Arc<Semaphore>,
    capacity: usize,
    period: Duration,
    shutdown: CancellationToken,
) {
    let mut timer = interval(period);
    timer.tick().await; // discard first tick, which is instantaneous
    loop {
        tokio::select! {
            _ = timer.tick() => {
                // A waiter admitted between the read and the add keeps the
                // pool at or under capacity.
                let missing = capacity.saturating_sub(slots.available_permits());
                if missing > 0 {
                    slots.add_permits(missing);
                }
            }
            _ = shutdown.cancelled() => {
                debug!("rate limiter refill task stopped");
                return;
            }
        }
    }
}
