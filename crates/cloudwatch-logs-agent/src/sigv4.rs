// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! AWS Signature Version 4 request signing.

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use reqwest::Url;
use sha2::{Digest, Sha256};

use crate::cloudwatch::Credentials;

type HmacSha256 = Hmac<Sha256>;

const ALGORITHM: &str = "AWS4-HMAC-SHA256";

/// Everything the signature covers. `signed_at` is threaded through
/// explicitly so a signature can be reproduced in tests.
pub(crate) struct SigningRequest<'a> {
    pub(crate) credentials: &'a Credentials,
    pub(crate) region: &'a str,
    pub(crate) service: &'a str,
    pub(crate) url: &'a Url,
    pub(crate) content_type: &'a str,
    pub(crate) amz_target: &'a str,
    pub(crate) payload: &'a [u8],
    pub(crate) signed_at: DateTime<Utc>,
}

/// Header values the signed request must carry.
pub(crate) struct Signature {
    pub(crate) authorization: String,
    pub(crate) amz_date: String,
}

/// Signs a POST of `payload` to `url`.
///
/// Query strings are never signed; the store protocol keeps every
/// operation on a bare path.
pub(crate) fn sign(request: &SigningRequest<'_>) -> Signature {
    let amz_date = request.signed_at.format("%Y%m%dT%H%M%SZ").to_string();
    let date = request.signed_at.format("%Y%m%d").to_string();
    let scope = format!(
        "{date}/{region}/{service}/aws4_request",
        region = request.region,
        service = request.service
    );

    // Canonical headers must appear in ascending name order, each
    // terminated by a newline.
    let mut header_pairs = vec![
        ("content-type", request.content_type.to_string()),
        ("host", host_header(request.url)),
        ("x-amz-date", amz_date.clone()),
    ];
    if let Some(token) = &request.credentials.session_token {
        header_pairs.push(("x-amz-security-token", token.clone()));
    }
    header_pairs.push(("x-amz-target", request.amz_target.to_string()));

    let canonical_headers: String = header_pairs
        .iter()
        .map(|(name, value)| format!("{name}:{value}\n"))
        .collect();
    let signed_headers = header_pairs
        .iter()
        .map(|(name, _)| *name)
        .collect::<Vec<_>>()
        .join(";");

    let canonical_request = format!(
        "POST\n{path}\n\n{canonical_headers}\n{signed_headers}\n{payload_hash}",
        path = request.url.path(),
        payload_hash = hex_sha256(request.payload)
    );

    let string_to_sign = format!(
        "{ALGORITHM}\n{amz_date}\n{scope}\n{request_hash}",
        request_hash = hex_sha256(canonical_request.as_bytes())
    );

    let secret = format!("AWS4{}", request.credentials.secret_access_key);
    let date_key = hmac_sha256(secret.as_bytes(), date.as_bytes());
    let region_key = hmac_sha256(&date_key, request.region.as_bytes());
    let service_key = hmac_sha256(&region_key, request.service.as_bytes());
    let signing_key = hmac_sha256(&service_key, b"aws4_request");
    let signature = hex::encode(hmac_sha256(&signing_key, string_to_sign.as_bytes()));

    let authorization = format!(
        "{ALGORITHM} Credential={access_key}/{scope}, SignedHeaders={signed_headers}, \
         Signature={signature}",
        access_key = request.credentials.access_key_id
    );

    Signature {
        authorization,
        amz_date,
    }
}

/// Host as the signature sees it: no port for scheme defaults.
fn host_header(url: &Url) -> String {
    let host = url.host_str().unwrap_or_default();
    match url.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    }
}

fn hex_sha256(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC accepts keys of any length");
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}
