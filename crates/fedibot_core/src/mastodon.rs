/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - FEDI3 Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

use crate::account_service::AccountService;
use crate::config::BotConfig;
use crate::http_retry::send_with_retry;
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use fedibot_protocol::{Account, Instance};
use reqwest::header::{ACCEPT, LINK};
use reqwest::Response;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::{debug, warn};

const FOLLOWING_PAGE_LIMIT: u32 = 80;
const MAX_FOLLOWING_PAGES: usize = 1000;

/// Mastodon client API over HTTPS with a bearer token.
#[derive(Clone)]
pub struct MastodonClient {
    http: reqwest::Client,
    base: String,
    access_token: String,
    attempts: u32,
}

impl MastodonClient {
    pub fn new(cfg: &BotConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(cfg.http_timeout_secs.max(1)))
            .user_agent(concat!("fedibot/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("build http client")?;
        Ok(Self {
            http,
            base: cfg.api_base().to_string(),
            access_token: cfg.access_token.trim().to_string(),
            attempts: cfg.http_attempts,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    async fn get(&self, url: &str) -> Result<Response> {
        let resp = send_with_retry(
            || {
                self.http
                    .get(url)
                    .header(ACCEPT, "application/json")
                    .bearer_auth(&self.access_token)
            },
            self.attempts,
        )
        .await
        .with_context(|| format!("GET {url}"))?;
        ensure_success(resp, url).await
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T> {
        self.get(url)
            .await?
            .json::<T>()
            .await
            .with_context(|| format!("decode {url}"))
    }

    /// Streaming endpoint advertised by the instance, if any.
    pub async fn fetch_streaming_url(&self) -> Result<Option<String>> {
        let instance: Instance = self.get_json(&self.url("/api/v1/instance")).await?;
        Ok(instance
            .urls
            .and_then(|u| u.streaming_api)
            .map(|s| s.trim().trim_end_matches('/').to_string())
            .filter(|s| !s.is_empty()))
    }
}

#[async_trait]
impl AccountService for MastodonClient {
    async fn verify_credentials(&self) -> Result<Account> {
        self.get_json(&self.url("/api/v1/accounts/verify_credentials"))
            .await
    }

    async fn list_following(&self, account_id: &str) -> Result<Vec<Account>> {
        let mut out = Vec::new();
        let mut next = Some(self.url(&format!(
            "/api/v1/accounts/{}/following?limit={FOLLOWING_PAGE_LIMIT}",
            urlencoding::encode(account_id)
        )));
        let mut pages = 0usize;
        while let Some(url) = next.take() {
            if pages >= MAX_FOLLOWING_PAGES {
                warn!(pages, "following list truncated");
                break;
            }
            pages += 1;
            let resp = self.get(&url).await?;
            next = resp
                .headers()
                .get(LINK)
                .and_then(|v| v.to_str().ok())
                .and_then(next_link);
            let page: Vec<Account> = resp
                .json()
                .await
                .with_context(|| format!("decode {url}"))?;
            if page.is_empty() {
                break;
            }
            out.extend(page);
        }
        debug!(pages, accounts = out.len(), "fetched following list");
        Ok(out)
    }

    async fn follow(&self, account_id: &str) -> Result<()> {
        let url = self.url(&format!(
            "/api/v1/accounts/{}/follow",
            urlencoding::encode(account_id)
        ));
        let resp = send_with_retry(
            || {
                self.http
                    .post(&url)
                    .header(ACCEPT, "application/json")
                    .bearer_auth(&self.access_token)
            },
            self.attempts,
        )
        .await
        .with_context(|| format!("POST {url}"))?;
        ensure_success(resp, &url).await?;
        Ok(())
    }
}

async fn ensure_success(resp: Response, url: &str) -> Result<Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    let body: String = body.chars().take(200).collect();
    bail!("{url}: http {status}: {body}")
}

/// Target of the `rel="next"` entry of a `Link` header.
pub fn next_link(header: &str) -> Option<String> {
    header.split(',').find_map(|part| {
        let mut pieces = part.split(';');
        let target = pieces.next()?.trim();
        let target = target.strip_prefix('<')?.strip_suffix('>')?;
        let is_next = pieces.any(|p| {
            let p = p.trim();
            p == "rel=\"next\"" || p == "rel=next"
        });
        is_next.then(|| target.to_string())
    })
}
