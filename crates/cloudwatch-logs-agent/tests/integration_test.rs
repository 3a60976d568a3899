// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use cloudwatch_logs_agent::{
    cloudwatch::{ClientConfig, CloudWatchClient, Credentials},
    config::ShipperConfig,
    failure::FailureSink,
    shipper::LogShipper,
};
use mockito::{Matcher, Server, ServerGuard};
use std::io::{self, Write};
use std::sync::{Arc, Mutex};
use std::time::Duration;

const PUT_TARGET: &str = "Logs_20140328.PutLogEvents";
const CREATE_GROUP_TARGET: &str = "Logs_20140328.CreateLogGroup";
const CREATE_STREAM_TARGET: &str = "Logs_20140328.CreateLogStream";

/// Failure sink backed by a shared buffer so tests can read it back.
#[derive(Clone, Default)]
struct CaptureSink(Arc<Mutex<Vec<u8>>>);

impl CaptureSink {
    fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().expect("sink lock")).into_owned()
    }
}

impl Write for CaptureSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().expect("sink lock").extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

fn shipper_config(group: &str, stream: &str) -> ShipperConfig {
    let mut config = ShipperConfig::new(group, stream);
    config.instance = "itest-host".to_string();
    config.image = "itest:0".to_string();
    // Every test drives delivery through close(); keep the timer quiet.
    config.flush_interval = Duration::from_secs(30);
    config
}

fn client_for(server: &ServerGuard) -> Arc<CloudWatchClient> {
    let client = CloudWatchClient::new(ClientConfig::for_endpoint(
        &server.url(),
        "us-east-1",
        Credentials::placeholder(),
    ))
    .expect("failed to build client");
    Arc::new(client)
}

#[cfg(test)]
#[tokio::test]
async fn shipper_ships_lines_end_to_end() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/")
        .match_header("x-amz-target", PUT_TARGET)
        .match_header("content-type", "application/x-amz-json-1.1")
        .match_body(Matcher::PartialJsonString(
            r#"{"logGroupName":"it-group","logStreamName":"it-stream"}"#.to_string(),
        ))
        .with_status(200)
        .with_body(r#"{"nextSequenceToken":"token-1"}"#)
        .expect(1)
        .create_async()
        .await;

    let mut shipper = LogShipper::new(
        client_for(&server),
        shipper_config("it-group", "it-stream"),
    );
    shipper
        .write_all(b"hello\nworld\n")
        .expect("write should be accepted");
    shipper.close().await.expect("close should flush cleanly");

    mock.assert_async().await;
}

#[cfg(test)]
#[tokio::test]
async fn a_sequence_conflict_is_corrected_and_resubmitted() {
    let mut server = Server::new_async().await;
    let conflict = server
        .mock("POST", "/")
        .match_header("x-amz-target", PUT_TARGET)
        .with_status(400)
        .with_body(
            r#"{"__type":"InvalidSequenceTokenException","message":"The given sequenceToken is invalid. The next expected sequenceToken is: 49590112"}"#,
        )
        .expect(1)
        .create_async()
        .await;
    let corrected = server
        .mock("POST", "/")
        .match_header("x-amz-target", PUT_TARGET)
        .match_body(Matcher::PartialJsonString(
            r#"{"sequenceToken":"49590112"}"#.to_string(),
        ))
        .with_status(200)
        .with_body(r#"{"nextSequenceToken":"49590113"}"#)
        .expect(1)
        .create_async()
        .await;

    let mut shipper = LogShipper::new(client_for(&server), shipper_config("g", "s"));
    shipper
        .write_all(b"conflicted line\n")
        .expect("write should be accepted");
    shipper.close().await.expect("close should flush cleanly");

    conflict.assert_async().await;
    corrected.assert_async().await;
}

#[cfg(test)]
#[tokio::test]
async fn missing_resources_are_provisioned_then_the_batch_lands() {
    let mut server = Server::new_async().await;
    let missing = server
        .mock("POST", "/")
        .match_header("x-amz-target", PUT_TARGET)
        .with_status(400)
        .with_body(
            r#"{"__type":"ResourceNotFoundException","message":"The specified log group does not exist."}"#,
        )
        .expect(1)
        .create_async()
        .await;
    let create_group = server
        .mock("POST", "/")
        .match_header("x-amz-target", CREATE_GROUP_TARGET)
        .match_body(Matcher::PartialJsonString(
            r#"{"logGroupName":"fresh-group"}"#.to_string(),
        ))
        .with_status(200)
        .with_body("{}")
        .expect(1)
        .create_async()
        .await;
    let create_stream = server
        .mock("POST", "/")
        .match_header("x-amz-target", CREATE_STREAM_TARGET)
        .match_body(Matcher::PartialJsonString(
            r#"{"logGroupName":"fresh-group","logStreamName":"fresh-stream"}"#.to_string(),
        ))
        .with_status(200)
        .with_body("{}")
        .expect(1)
        .create_async()
        .await;
    let landed = server
        .mock("POST", "/")
        .match_header("x-amz-target", PUT_TARGET)
        .with_status(200)
        .with_body(r#"{"nextSequenceToken":"t-1"}"#)
        .expect(1)
        .create_async()
        .await;

    let mut shipper = LogShipper::new(
        client_for(&server),
        shipper_config("fresh-group", "fresh-stream"),
    );
    shipper
        .write_all(b"first line ever\n")
        .expect("write should be accepted");
    // close() rides through one backoff while provisioning completes.
    shipper.close().await.expect("close should flush cleanly");

    missing.assert_async().await;
    create_group.assert_async().await;
    create_stream.assert_async().await;
    landed.assert_async().await;
}

#[cfg(test)]
#[tokio::test]
async fn already_accepted_batches_count_as_delivered() {
    let mut server = Server::new_async().await;
    let duplicate = server
        .mock("POST", "/")
        .match_header("x-amz-target", PUT_TARGET)
        .with_status(400)
        .with_body(
            r#"{"__type":"DataAlreadyAcceptedException","message":"The given batch of log events has already been accepted."}"#,
        )
        .expect(1)
        .create_async()
        .await;

    let capture = CaptureSink::default();
    let mut shipper = LogShipper::with_failure_sink(
        client_for(&server),
        shipper_config("g", "s"),
        FailureSink::new(Box::new(capture.clone())),
    );
    shipper
        .write_all(b"replayed line\n")
        .expect("write should be accepted");
    shipper.close().await.expect("close should flush cleanly");

    duplicate.assert_async().await;
    assert!(
        capture.contents().is_empty(),
        "nothing should reach the failure sink, got: {}",
        capture.contents()
    );
}

#[cfg(test)]
#[tokio::test]
async fn invalid_parameter_batches_are_abandoned_to_the_sink() {
    let mut server = Server::new_async().await;
    let rejected = server
        .mock("POST", "/")
        .match_header("x-amz-target", PUT_TARGET)
        .with_status(400)
        .with_body(r#"{"__type":"InvalidParameterException","message":"Log event too large."}"#)
        .expect(1)
        .create_async()
        .await;

    let capture = CaptureSink::default();
    let mut shipper = LogShipper::with_failure_sink(
        client_for(&server),
        shipper_config("g", "s"),
        FailureSink::new(Box::new(capture.clone())),
    );
    shipper
        .write_all(b"oversized field\n")
        .expect("write should be accepted");
    shipper.close().await.expect("close should flush cleanly");

    // Exactly one attempt: the fault is not retried.
    rejected.assert_async().await;
    let contents = capture.contents();
    assert!(contents.contains("batch failed"), "sink had: {contents}");
    assert!(contents.contains("oversized field"), "sink had: {contents}");
}

#[cfg(test)]
#[tokio::test]
async fn the_retry_budget_bounds_transient_failures() {
    let mut server = Server::new_async().await;
    let unavailable = server
        .mock("POST", "/")
        .match_header("x-amz-target", PUT_TARGET)
        .with_status(503)
        .with_body(r#"{"__type":"ServiceUnavailableException","message":"try again"}"#)
        .expect_at_least(2)
        .create_async()
        .await;

    let capture = CaptureSink::default();
    let mut config = shipper_config("g", "s");
    config.max_retry_time = Duration::from_secs(2);
    let mut shipper = LogShipper::with_failure_sink(
        client_for(&server),
        config,
        FailureSink::new(Box::new(capture.clone())),
    );
    shipper
        .write_all(b"unlucky line\n")
        .expect("write should be accepted");
    shipper.close().await.expect("close should flush cleanly");

    unavailable.assert_async().await;
    assert!(
        capture.contents().contains("batch failed"),
        "sink had: {}",
        capture.contents()
    );
}

#[cfg(test)]
#[tokio::test]
async fn session_tokens_are_attached_to_requests() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/")
        .match_header("x-amz-target", PUT_TARGET)
        .match_header("x-amz-security-token", "session-tok")
        .with_status(200)
        .with_body(r#"{"nextSequenceToken":"t-1"}"#)
        .expect(1)
        .create_async()
        .await;

    let credentials = Credentials {
        access_key_id: "AKIDEXAMPLE".to_string(),
        secret_access_key: "secret".to_string(),
        session_token: Some("session-tok".to_string()),
    };
    let client = CloudWatchClient::new(ClientConfig::for_endpoint(
        &server.url(),
        "us-east-1",
        credentials,
    ))
    .expect("failed to build client");

    let mut shipper = LogShipper::new(Arc::new(client), shipper_config("g", "s"));
    shipper
        .write_all(b"with session\n")
        .expect("write should be accepted");
    shipper.close().await.expect("close should flush cleanly");

    mock.assert_async().await;
}
