// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! CloudWatch Logs client speaking the AWS JSON 1.1 protocol.
//!
//! Every operation is a signed `POST /` with the operation named in the
//! `x-amz-target` header.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::{StatusCode, Url};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::event::LogEvent;
use crate::sigv4;
use crate::store::{LogStore, PutEventsAck, StoreError};

const SERVICE: &str = "logs";
const CONTENT_TYPE: &str = "application/x-amz-json-1.1";
const TARGET_PREFIX: &str = "Logs_20140328";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Static AWS credentials.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: Option<String>,
}

impl Credentials {
    /// Filler credentials for endpoints that accept any signature, such
    /// as local store emulators.
    #[must_use]
    pub fn placeholder() -> Self {
        Self {
            access_key_id: "dummy".to_string(),
            secret_access_key: "dummy".to_string(),
            session_token: None,
        }
    }
}

/// Connection settings for [`CloudWatchClient`].
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub endpoint: String,
    pub region: String,
    pub credentials: Credentials,
    /// HTTPS proxy URL, applied to every request when set.
    pub proxy: Option<String>,
    pub timeout: Duration,
}

impl ClientConfig {
    /// Targets the public CloudWatch Logs endpoint for `region`.
    #[must_use]
    pub fn for_region(region: &str, credentials: Credentials) -> Self {
        Self::for_endpoint(
            &format!("https://logs.{region}.amazonaws.com"),
            region,
            credentials,
        )
    }

    /// Targets an explicit endpoint, keeping `region` for the signature.
    #[must_use]
    pub fn for_endpoint(endpoint: &str, region: &str, credentials: Credentials) -> Self {
        Self {
            endpoint: endpoint.to_string(),
            region: region.to_string(),
            credentials,
            proxy: None,
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

/// [`LogStore`] backed by the CloudWatch Logs HTTP API.
pub struct CloudWatchClient {
    http: reqwest::Client,
    url: Url,
    config: ClientConfig,
}

impl CloudWatchClient {
    pub fn new(config: ClientConfig) -> Result<Self, StoreError> {
        let url = Url::parse(&config.endpoint)
            .map_err(|err| StoreError::Config(format!("endpoint {}: {err}", config.endpoint)))?;

        let mut builder = reqwest::Client::builder().timeout(config.timeout);
        if let Some(proxy) = &config.proxy {
            let proxy = reqwest::Proxy::https(proxy)
                .map_err(|err| StoreError::Config(format!("proxy {proxy}: {err}")))?;
            builder = builder.proxy(proxy);
        }
        let http = builder
            .build()
            .map_err(|err| StoreError::Config(format!("http client: {err}")))?;

        Ok(Self { http, url, config })
    }

    /// Signs and posts one operation, returning the raw response body.
    async fn call<B: Serialize>(&self, operation: &str, body: &B) -> Result<Vec<u8>, StoreError> {
        let payload = serde_json::to_vec(body)?;
        let target = format!("{TARGET_PREFIX}.{operation}");
        let signature = sigv4::sign(&sigv4::SigningRequest {
            credentials: &self.config.credentials,
            region: &self.config.region,
            service: SERVICE,
            url: &self.url,
            content_type: CONTENT_TYPE,
            amz_target: &target,
            payload: &payload,
            signed_at: Utc::now(),
        });

        let mut request = self
            .http
            .post(self.url.clone())
            .header("content-type", CONTENT_TYPE)
            .header("x-amz-target", &target)
            .header("x-amz-date", &signature.amz_date)
            .header("authorization", &signature.authorization)
            .body(payload);
        if let Some(token) = &self.config.credentials.session_token {
            request = request.header("x-amz-security-token", token);
        }

        let response = request.send().await?;
        let status = response.status();
        let bytes = response.bytes().await?;
        if status.is_success() {
            Ok(bytes.to_vec())
        } else {
            Err(remote_error(status, &bytes))
        }
    }
}

/// Error shape of the JSON 1.1 protocol. The code arrives in `__type`,
/// sometimes prefixed with a `namespace#`.
#[derive(Deserialize)]
struct ErrorBody {
    #[serde(rename = "__type")]
    kind: Option<String>,
    #[serde(rename = "message", alias = "Message")]
    message: Option<String>,
}

fn remote_error(status: StatusCode, body: &[u8]) -> StoreError {
    match serde_json::from_slice::<ErrorBody>(body) {
        Ok(ErrorBody {
            kind: Some(kind),
            message,
        }) => StoreError::Remote {
            code: kind.rsplit('#').next().unwrap_or(&kind).to_string(),
            message: message.unwrap_or_default(),
        },
        _ => StoreError::Unexpected {
            status,
            body: String::from_utf8_lossy(body).into_owned(),
        },
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PutLogEventsRequest<'a> {
    log_group_name: &'a str,
    log_stream_name: &'a str,
    log_events: &'a [LogEvent],
    #[serde(skip_serializing_if = "Option::is_none")]
    sequence_token: Option<&'a str>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PutLogEventsResponse {
    next_sequence_token: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateLogGroupRequest<'a> {
    log_group_name: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateLogStreamRequest<'a> {
    log_group_name: &'a str,
    log_stream_name: &'a str,
}

#[async_trait]
impl LogStore for CloudWatchClient {
    async fn put_events(
        &self,
        group: &str,
        stream: &str,
        sequence_token: Option<&str>,
        events: &[LogEvent],
    ) -> Result<PutEventsAck, StoreError> {
        let body = PutLogEventsRequest {
            log_group_name: group,
            log_stream_name: stream,
            log_events: events,
            sequence_token,
        };
        let bytes = self.call("PutLogEvents", &body).await?;
        let response: PutLogEventsResponse = serde_json::from_slice(&bytes)?;
        debug!("store accepted {} event(s)", events.len());
        Ok(PutEventsAck {
            next_sequence_token: response.next_sequence_token,
        })
    }

    async fn create_group(&self, group: &str) -> Result<(), StoreError> {
        let body = CreateLogGroupRequest {
            log_group_name: group,
        };
        self.call("CreateLogGroup", &body).await?;
        Ok(())
    }

    async fn create_stream(&self, group: &str, stream: &str) -> Result<(), StoreError> {
        let body = CreateLogStreamRequest {
            log_group_name: group,
            log_stream_name: stream,
        };
        self.call("CreateLogStream", &body).await?;
        Ok(())
    }
}
