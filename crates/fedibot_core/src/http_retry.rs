/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - FEDI3 Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

use anyhow::Result;
use rand::{thread_rng, Rng};
use reqwest::{RequestBuilder, Response, StatusCode};
use std::time::Duration;
use tracing::debug;

pub const BASE_BACKOFF: Duration = Duration::from_millis(200);
const MAX_HTTP_BACKOFF: Duration = Duration::from_secs(5);

/// Sends the request built by `build`, retrying transport errors, 429 and 5xx.
///
/// The last response is returned as-is even when it is a retryable status, so
/// callers still decide what a non-success status means for them.
pub async fn send_with_retry<F>(mut build: F, attempts: u32) -> Result<Response>
where
    F: FnMut() -> RequestBuilder,
{
    let max_attempts = attempts.clamp(1, 5);
    let mut backoff = BASE_BACKOFF;
    for attempt in 0..max_attempts {
        match build().send().await {
            Ok(resp) => {
                let status = resp.status();
                if should_retry_status(status) && attempt + 1 < max_attempts {
                    debug!(%status, attempt, "retrying request");
                    sleep_with_jitter(backoff).await;
                    backoff = next_backoff(backoff, MAX_HTTP_BACKOFF);
                    continue;
                }
                return Ok(resp);
            }
            Err(e) => {
                if attempt + 1 >= max_attempts {
                    return Err(e.into());
                }
                debug!(attempt, "request failed, retrying: {e}");
                sleep_with_jitter(backoff).await;
                backoff = next_backoff(backoff, MAX_HTTP_BACKOFF);
            }
        }
    }
    unreachable!("retry loop should return or error");
}

pub fn should_retry_status(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

pub fn next_backoff(current: Duration, max: Duration) -> Duration {
    current.saturating_mul(2).min(max)
}

pub async fn sleep_with_jitter(base: Duration) {
    let jitter_ms: u64 = thread_rng().gen_range(0..=200);
    let jitter = Duration::from_millis(jitter_ms);
    tokio::time::sleep(base + jitter).await;
}
