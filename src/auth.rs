//! Kraken REST API authentication and WebSocket token retrieval.
//!
//! The Level-3 (orders) WebSocket channel requires an authentication
//! token obtained via the
//! [`GetWebSocketsToken`](https://docs.kraken.com/api/docs/rest-api/get-websockets-token)
//! REST endpoint.  The token is valid for 15 minutes after creation, so a
//! feed fetches a fresh one every time it connects.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use base64::prelude::*;
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::{Digest, Sha256, Sha512};
use tracing::info;

/// Tracks the last nonce issued so every call returns a strictly
/// increasing value even when the wall-clock hasn't advanced.
///
/// Uses nanosecond resolution in a `u64`, which overflows around year 2554.
static LAST_NONCE: AtomicU64 = AtomicU64::new(0);

use crate::{Result, TapeError};

const TOKEN_URL: &str = "https://api.kraken.com/0/private/GetWebSocketsToken";
const URL_PATH: &str = "/0/private/GetWebSocketsToken";

/// Fetches a short-lived WebSocket authentication token from the Kraken REST API.
///
/// # Errors
///
/// Returns a [`TapeError`](crate::TapeError) if:
/// - the secret is not valid base64 ([`TapeError::Auth`])
/// - the HTTP request fails ([`TapeError::Http`])
/// - the API reports an error, e.g. an invalid key ([`TapeError::Auth`])
/// - the response carries no token ([`TapeError::MalformedMessage`])
pub async fn get_websocket_token(api_key: &str, api_secret: &str) -> Result<String> {
    let nonce = next_nonce();
    let post_data = format!("nonce={nonce}");
    let signature = sign(api_secret, URL_PATH, nonce, &post_data)?;

    let client = reqwest::Client::new();
    let response = client
        .post(TOKEN_URL)
        .header("API-Key", api_key)
        .header("API-Sign", &signature)
        .header("Content-Type", "application/x-www-form-urlencoded")
        .body(post_data)
        .send()
        .await?;

    let response = response.error_for_status()?;
    let body: TokenResponse = response.json().await?;
    let token = token_from_response(body)?;

    info!("Obtained WebSocket authentication token");
    Ok(token)
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    #[serde(default)]
    error: Vec<String>,
    #[serde(default)]
    result: Option<TokenResult>,
}

#[derive(Debug, Deserialize)]
struct TokenResult {
    token: String,
}

fn token_from_response(body: TokenResponse) -> Result<String> {
    if !body.error.is_empty() {
        return Err(TapeError::Auth(format!(
            "Kraken API error: {}",
            body.error.join(", ")
        )));
    }

    body.result.map(|result| result.token).ok_or_else(|| {
        TapeError::MalformedMessage("missing token in GetWebSocketsToken response".into())
    })
}

/// Returns a strictly monotonically-increasing nonce with nanosecond resolution.
///
/// Uses the wall-clock as the baseline but guarantees that successive calls
/// always return a value larger than the previous one, even when the clock
/// resolution is too coarse or the clock jumps backwards.
fn next_nonce() -> u64 {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before UNIX epoch")
        .as_nanos() as u64;

    let mut prev = LAST_NONCE.load(Ordering::Relaxed);
    loop {
        let nonce = now.max(prev + 1);
        match LAST_NONCE.compare_exchange_weak(prev, nonce, Ordering::Relaxed, Ordering::Relaxed) {
            Ok(_) => return nonce,
            Err(actual) => prev = actual,
        }
    }
}

/// Computes the `API-Sign` header value.
///
/// Algorithm: `Base64(HMAC-SHA512(Base64Decode(secret), path + SHA256(nonce + post_data)))`
fn sign(api_secret: &str, path: &str, nonce: u64, post_data: &str) -> Result<String> {
    let secret = BASE64_STANDARD.decode(api_secret).map_err(|e| {
        TapeError::Auth(format!("invalid base64 api_secret: {e}"))
    })?;

    let mut sha256 = Sha256::new();
    sha256.update(format!("{nonce}{post_data}").as_bytes());
    let sha256_digest = sha256.finalize();

    let mut hmac_input = Vec::from(path.as_bytes());
    hmac_input.extend_from_slice(&sha256_digest);

    let mut mac = Hmac::<Sha512>::new_from_slice(&secret)
        .map_err(|e| TapeError::Auth(format!("invalid HMAC key: {e}")))?;
    mac.update(&hmac_input);
    let result = mac.finalize().into_bytes();

    Ok(BASE64_STANDARD.encode(result))
}
