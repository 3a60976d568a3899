// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! # CloudWatch Logs Agent
//!
//! An embeddable shipping pipeline that turns a byte stream of log lines
//! into batched, rate-limited CloudWatch Logs submissions.
//!
//! ```text
//! bytes -> tokenizer -> envelope -> queue -> service -> batcher
//!                                                          |
//!                            failure sink <- deliverer <- rate limiter
//! ```
//!
//! The write path is synchronous and never touches the network; a
//! background Tokio task owns batching, sequencing, retry, and delivery.
//! Work the pipeline gives up on is recorded in a failure sink instead of
//! being silently lost.
//!
//! The entry point is [`shipper::LogShipper`], assembled from a
//! [`config::ShipperConfig`] and any [`store::LogStore`] implementation,
//! usually [`cloudwatch::CloudWatchClient`].

#![deny(clippy::all)]
#![deny(clippy::pedantic)]
#![deny(clippy::unwrap_used)]
#![deny(unused_extern_crates)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

/// Splitting event lists into store-sized batches
pub mod batcher;

/// CloudWatch Logs HTTP client
pub mod cloudwatch;

/// Pipeline limits and assembly configuration
pub mod config;

/// Error taxonomy of the pipeline
pub mod errors;

/// Envelope and wire event types
pub mod event;

/// Destination of record for refused and abandoned work
pub mod failure;

/// Submission rate limiting
pub mod rate_limiter;

/// Deadline-bounded backoff with jitter
pub mod retry;

/// The public `Write` facade
pub mod shipper;

/// Remote log store abstraction
pub mod store;

/// Line splitting on the write path
pub mod tokenizer;

mod deliverer;
mod queue;
mod service;
mod sigv4;
