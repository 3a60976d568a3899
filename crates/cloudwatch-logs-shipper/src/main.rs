// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

use std::io::Write;
use std::{env, sync::Arc, time::Duration};

use tokio::io::AsyncReadExt;
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

use cloudwatch_logs_agent::{
    cloudwatch::{ClientConfig, CloudWatchClient, Credentials},
    config::ShipperConfig,
    shipper::LogShipper,
};

const DEFAULT_REGION: &str = "us-east-1";
const DEFAULT_FLUSH_INTERVAL_SECS: u64 = 1;
const STDIN_BUFFER_BYTES: usize = 16 * 1024;

/// Everything the process reads from its environment.
#[derive(Debug)]
struct Settings {
    group: String,
    stream: String,
    instance: String,
    image: String,
    endpoint: Option<String>,
    region: String,
    credentials: Credentials,
    proxy: Option<String>,
    flush_interval: Duration,
}

fn resolve_settings() -> Result<Settings, String> {
    let group = require_env("CW_LOGS_GROUP")?;
    let stream = require_env("CW_LOGS_STREAM")?;
    let image = env::var("CW_LOGS_IMAGE")
        .ok()
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| stream.clone());
    let instance = detect_instance();

    let endpoint = env::var("CW_LOGS_ENDPOINT")
        .ok()
        .filter(|value| !value.is_empty());
    let region = env::var("AWS_REGION")
        .or_else(|_| env::var("AWS_DEFAULT_REGION"))
        .ok()
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| DEFAULT_REGION.to_string());

    let credentials = match (
        env::var("AWS_ACCESS_KEY_ID"),
        env::var("AWS_SECRET_ACCESS_KEY"),
    ) {
        (Ok(access_key_id), Ok(secret_access_key))
            if !access_key_id.is_empty() && !secret_access_key.is_empty() =>
        {
            Credentials {
                access_key_id,
                secret_access_key,
                session_token: env::var("AWS_SESSION_TOKEN")
                    .ok()
                    .filter(|value| !value.is_empty()),
            }
        }
        // Emulated endpoints accept any signature.
        _ if endpoint.is_some() => Credentials::placeholder(),
        _ => {
            return Err(
                "AWS_ACCESS_KEY_ID and AWS_SECRET_ACCESS_KEY are required unless CW_LOGS_ENDPOINT is set"
                    .to_string(),
            )
        }
    };

    let proxy = env::var("CW_LOGS_PROXY_HTTPS")
        .or_else(|_| env::var("HTTPS_PROXY"))
        .ok()
        .filter(|value| !value.is_empty());

    let flush_interval = Duration::from_secs(
        env::var("CW_LOGS_FLUSH_INTERVAL")
            .ok()
            .and_then(|value| value.parse::<u64>().ok())
            .filter(|secs| *secs > 0)
            .unwrap_or(DEFAULT_FLUSH_INTERVAL_SECS),
    );

    Ok(Settings {
        group,
        stream,
        instance,
        image,
        endpoint,
        region,
        credentials,
        proxy,
        flush_interval,
    })
}

fn require_env(name: &str) -> Result<String, String> {
    env::var(name)
        .ok()
        .filter(|value| !value.is_empty())
        .ok_or_else(|| format!("{name} is not set"))
}

/// Host identity recorded in every envelope, preferring explicit
/// overrides to the syscall.
fn detect_instance() -> String {
    if let Ok(value) = env::var("CW_LOGS_INSTANCE") {
        if !value.is_empty() {
            return value;
        }
    }
    if let Ok(value) = env::var("HOSTNAME") {
        if !value.is_empty() {
            return value;
        }
    }
    if let Ok(hostname) = nix::unistd::gethostname() {
        if let Some(value) = hostname.to_str() {
            if !value.is_empty() {
                return value.to_string();
            }
        }
    }
    "unknown".to_string()
}

#[tokio::main]
pub async fn main() {
    let log_level = env::var("CW_LOGS_LOG_LEVEL")
        .map(|val| val.to_lowercase())
        .unwrap_or("info".to_string());

    let env_filter = format!("h2=off,hyper=off,rustls=off,{}", log_level);

    #[allow(clippy::expect_used)]
    let subscriber = tracing_subscriber::fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_new(env_filter).expect("could not parse log level in configuration"),
        )
        .with_level(true)
        .with_thread_names(false)
        .with_thread_ids(false)
        .with_line_number(false)
        .with_file(false)
        .with_target(true)
        .without_time()
        .finish();

    #[allow(clippy::expect_used)]
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    info!("cloudwatch-logs-shipper version: {}", env!("CARGO_PKG_VERSION"));

    let settings = match resolve_settings() {
        Ok(settings) => settings,
        Err(err) => {
            error!("configuration error: {err}");
            return;
        }
    };
    // The flag says which stream of the producer is being piped in here.
    let level = if env::args().any(|arg| arg == "--stderr") {
        "ERROR"
    } else {
        "INFO"
    };

    let mut client_config = match &settings.endpoint {
        Some(endpoint) => {
            ClientConfig::for_endpoint(endpoint, &settings.region, settings.credentials.clone())
        }
        None => ClientConfig::for_region(&settings.region, settings.credentials.clone()),
    };
    client_config.proxy = settings.proxy.clone();

    let client = match CloudWatchClient::new(client_config) {
        Ok(client) => Arc::new(client),
        Err(err) => {
            error!("could not build CloudWatch client: {err}");
            return;
        }
    };

    debug!(
        "shipping {level} logs to {}/{} in {} as {}",
        settings.group, settings.stream, settings.region, settings.instance
    );

    let mut config = ShipperConfig::new(settings.group, settings.stream);
    config.instance = settings.instance;
    config.image = settings.image;
    config.level = level.to_string();
    config.flush_interval = settings.flush_interval;
    let mut shipper = LogShipper::new(client, config);

    let mut stdin = tokio::io::stdin();
    let mut buffer = vec![0u8; STDIN_BUFFER_BYTES];
    loop {
        match stdin.read(&mut buffer).await {
            Ok(0) => break,
            Ok(read) => {
                if let Err(err) = shipper.write_all(&buffer[..read]) {
                    error!("input refused by the shipper: {err}");
                    break;
                }
            }
            Err(err) => {
                error!("stdin read failed: {err}");
                break;
            }
        }
    }

    if let Err(err) = shipper.close().await {
        error!("could not close the shipper cleanly: {err}");
    }
    info!("exiting");
}
