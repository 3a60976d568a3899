// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Terminal destination for work the pipeline gives up on.

use std::fmt::Debug;
use std::io::{self, Write};
use std::sync::{Arc, Mutex, PoisonError};

use serde::Serialize;
use tracing::error;

use crate::batcher::Batch;
use crate::event::LogEvent;

/// Destination of record for refused events and abandoned batches.
///
/// Records are written as one JSON value per line behind a short reason
/// prefix; a value that refuses to serialize is dumped in debug form instead.
/// Recording is best-effort: sink write failures are logged and swallowed,
/// and nothing here panics.
#[derive(Clone)]
pub struct FailureSink {
    out: Arc<Mutex<Box<dyn Write + Send>>>,
}

impl FailureSink {
    /// Sink writing to the process stderr.
    #[must_use]
    pub fn stderr() -> Self {
        Self::new(Box::new(io::stderr()))
    }

    /// Sink writing to an arbitrary writer.
    #[must_use]
    pub fn new(out: Box<dyn Write + Send>) -> Self {
        Self {
            out: Arc::new(Mutex::new(out)),
        }
    }

    /// Records an event the queue refused.
    pub(crate) fn record_event(&self, event: &LogEvent) {
        self.record("event dropped", event);
    }

    /// Records a batch delivery gave up on.
    pub(crate) fn record_batch(&self, batch: &Batch) {
        self.record("batch failed", batch.events());
    }

    fn record<T>(&self, reason: &str, value: &T)
    where
        T: Serialize + Debug + ?Sized,
    {
        let mut out = self.out.lock().unwrap_or_else(PoisonError::into_inner);
        let outcome = match serde_json::to_vec(value) {
            Ok(json) => write!(out, "{reason}: ")
                .and_then(|()| out.write_all(&json))
                .and_then(|()| out.write_all(b"\n")),
            Err(_) => writeln!(out, "{reason}: {value:?}"),
        };
        if let Err(err) = outcome {
            error!("failure sink write failed: {err}");
        }
    }
}

impl Default for FailureSink {
    fn default() -> Self {
        Self::stderr()
    }
}


#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::capture::CaptureBuf;
    use crate::event::LogEvent;

    #[test]
    fn records_events_as_json_lines() {
        let capture = CaptureBuf::default();
        let sink = capture.sink();
        sink.record_event(&LogEvent {
            timestamp: 42,
            message: "lost".to_string(),
        });
        assert_eq!(
            capture.contents(),
            "event dropped: {\"timestamp\":42,\"message\":\"lost\"}\n"
        );
    }

    #[test]
    fn clones_share_the_writer() {
        let capture = CaptureBuf::default();
        let sink = capture.sink();
        let other = sink.clone();
        sink.record_event(&LogEvent {
            timestamp: 1,
            message: "a".to_string(),
        });
        other.record_event(&LogEvent {
            timestamp: 2,
            message: "b".to_string(),
        });
        let contents = capture.contents();
        assert!(contents.contains("\"a\""));
        assert!(contents.contains("\"b\""));
    }
}
