// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Deadline-bounded exponential backoff with jitter.

use std::time::Duration;

use rand::Rng;
use tokio::time::Instant;

/// Wait before the first retry; doubles after every backoff.
const BASE_INTERVAL: Duration = Duration::from_secs(1);

/// Longest single jittered wait.
const MAX_SLEEP: Duration = Duration::from_secs(10);

/// Tracks one delivery's retry budget.
///
/// The deadline is fixed at construction and [`expired`](Self::expired)
/// turns true at or after it, never before. The deadline is only consulted
/// at attempt boundaries, so the last backoff may carry past it.
#[derive(Debug)]
pub struct Retrier {
    deadline: Instant,
    interval: Duration,
}

impl Retrier {
    /// Retry budget spanning `max_total` from now.
    #[must_use]
    pub fn new(max_total: Duration) -> Self {
        Self {
            deadline: Instant::now() + max_total,
            interval: BASE_INTERVAL,
        }
    }

    /// True once the budget is spent.
    #[must_use]
    pub fn expired(&self) -> bool {
        Instant::now() >= self.deadline
    }

    /// Sleeps the current interval plus or minus up to half of it, capped at
    /// [`MAX_SLEEP`], then doubles the interval.
    pub async fn backoff(&mut self) {
        let wait = self.next_wait();
        tokio::time::sleep(wait).await;
        self.interval = self.interval.saturating_mul(2);
    }

    fn next_wait(&self) -> Duration {
        let spread = u64::try_from(self.interval.as_millis()).unwrap_or(u64::MAX);
        let jitter = Duration::from_millis(rand::thread_rng().gen_range(0..spread.max(1)));
        self.interval
            .saturating_add(self.interval / 2)
            .saturating_sub(jitter)
            .min(MAX_SLEEP)
    }
}
