// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Remote sequence-ordered log store abstraction.

use async_trait::async_trait;
use thiserror::Error as ThisError;

use crate::event::LogEvent;

/// Store rejection: the submission carried a stale or wrong sequence token.
pub const ERR_INVALID_SEQUENCE_TOKEN: &str = "InvalidSequenceTokenException";
/// Store rejection: the batch was already accepted on an earlier attempt.
pub const ERR_DATA_ALREADY_ACCEPTED: &str = "DataAlreadyAcceptedException";
/// Store rejection: the log group or stream does not exist yet.
pub const ERR_RESOURCE_NOT_FOUND: &str = "ResourceNotFoundException";
/// Store rejection: malformed submission.
pub const ERR_INVALID_PARAMETER: &str = "InvalidParameterException";
/// Store rejection: the resource being created already exists.
pub const ERR_RESOURCE_ALREADY_EXISTS: &str = "ResourceAlreadyExistsException";

/// Acknowledgement of an accepted submission.
#[derive(Debug, Default, Clone)]
pub struct PutEventsAck {
    /// Token the next submission to the same stream must carry.
    pub next_sequence_token: Option<String>,
}

/// A sequence-ordered remote log store.
#[async_trait]
pub trait LogStore: Send + Sync {
    /// Submits one batch to `group`/`stream` under `sequence_token`.
    async fn put_events(
        &self,
        group: &str,
        stream: &str,
        sequence_token: Option<&str>,
        events: &[LogEvent],
    ) -> Result<PutEventsAck, StoreError>;

    /// Creates the log group. Fails with [`ERR_RESOURCE_ALREADY_EXISTS`]
    /// when it already exists.
    async fn create_group(&self, group: &str) -> Result<(), StoreError>;

    /// Creates the log stream inside `group`.
    async fn create_stream(&self, group: &str, stream: &str) -> Result<(), StoreError>;
}

/// Store call failure.
#[derive(ThisError, Debug)]
pub enum StoreError {
    /// The store answered with a classified error code.
    #[error("{code}: {message}")]
    Remote {
        /// Error code, namespace prefix stripped.
        code: String,
        /// Human-readable detail.
        message: String,
    },
    /// The request never completed.
    #[error("transport: {0}")]
    Transport(#[from] reqwest::Error),
    /// A request or response body could not be encoded or decoded.
    #[error("payload encoding: {0}")]
    Payload(#[from] serde_json::Error),
    /// The store answered outside its own error protocol.
    #[error("unexpected response (status {status}): {body}")]
    Unexpected {
        /// HTTP status of the response.
        status: reqwest::StatusCode,
        /// Response body, lossily decoded.
        body: String,
    },
    /// The client itself could not be assembled.
    #[error("client configuration: {0}")]
    Config(String),
}

impl StoreError {
    /// True when the error carries the given classified store code.
    #[must_use]
    pub fn has_code(&self, expected: &str) -> bool {
        matches!(self, Self::Remote { code, .. } if code == expected)
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Scripted in-memory store for exercising the delivery path.

    use std::collections::VecDeque;
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::{LogStore, PutEventsAck, StoreError};
    use crate::event::LogEvent;

    type PutScript = VecDeque<Result<PutEventsAck, StoreError>>;
    type CreateScript = VecDeque<Result<(), StoreError>>;

    /// Answers `put_events` from a script (default `Ok` once the script runs
    /// dry) and records every call it sees.
    #[derive(Default)]
    pub(crate) struct ScriptedStore {
        puts: Mutex<PutScript>,
        group_creates: Mutex<CreateScript>,
        stream_creates: Mutex<CreateScript>,
        calls: Mutex<Vec<String>>,
        batches: Mutex<Vec<Vec<String>>>,
    }

    #[allow(clippy::unwrap_used)]
    impl ScriptedStore {
        pub(crate) fn answering_ok() -> Self {
            Self::default()
        }

        pub(crate) fn with_put_script(
            puts: Vec<Result<PutEventsAck, StoreError>>,
        ) -> Self {
            Self {
                puts: Mutex::new(puts.into()),
                ..Self::default()
            }
        }

        pub(crate) fn script_group_create(&self, outcome: Result<(), StoreError>) {
            self.group_creates.lock().unwrap().push_back(outcome);
        }

        pub(crate) fn script_stream_create(&self, outcome: Result<(), StoreError>) {
            self.stream_creates.lock().unwrap().push_back(outcome);
        }

        /// Every call in arrival order; puts show the sequence token used.
        pub(crate) fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        /// Messages of every accepted or attempted put, one list per call.
        pub(crate) fn batches(&self) -> Vec<Vec<String>> {
            self.batches.lock().unwrap().clone()
        }

        pub(crate) fn put_count(&self) -> usize {
            self.batches.lock().unwrap().len()
        }
    }

    #[async_trait]
    #[allow(clippy::unwrap_used)]
    impl LogStore for ScriptedStore {
        async fn put_events(
            &self,
            _group: &str,
            _stream: &str,
            sequence_token: Option<&str>,
            events: &[LogEvent],
        ) -> Result<PutEventsAck, StoreError> {
            self.calls
                .lock()
                .unwrap()
                .push(format!("put token={}", sequence_token.unwrap_or("none")));
            self.batches
                .lock()
                .unwrap()
                .push(events.iter().map(|event| event.message.clone()).collect());
            self.puts
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(PutEventsAck::default()))
        }

        async fn create_group(&self, _group: &str) -> Result<(), StoreError> {
            self.calls.lock().unwrap().push("create_group".to_string());
            self.group_creates
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Ok(()))
        }

        async fn create_stream(&self, _group: &str, _stream: &str) -> Result<(), StoreError> {
            self.calls.lock().unwrap().push("create_stream".to_string());
            self.stream_creates
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Ok(()))
        }
    }
}
