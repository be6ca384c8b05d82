/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - FEDI3 Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

use anyhow::{bail, Context, Result};
use std::path::PathBuf;

pub const MAX_EVENT_BUFFER: usize = 4096;

#[derive(Clone, serde::Deserialize)]
pub struct BotConfig {
    pub api_base_url: String,
    pub client_id: String,
    pub client_secret: String,
    pub access_token: String,
    /// Overrides the streaming endpoint advertised by the instance.
    #[serde(default)]
    pub streaming_url: Option<String>,
    #[serde(default = "default_stream")]
    pub stream: String,
    #[serde(default = "default_http_attempts")]
    pub http_attempts: u32,
    #[serde(default = "default_http_timeout_secs")]
    pub http_timeout_secs: u64,
    #[serde(default = "default_reconnect_max_backoff_secs")]
    pub reconnect_max_backoff_secs: u64,
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,
}

fn default_stream() -> String {
    "public".to_string()
}

fn default_http_attempts() -> u32 {
    3
}

fn default_http_timeout_secs() -> u64 {
    30
}

fn default_reconnect_max_backoff_secs() -> u64 {
    60
}

fn default_event_buffer() -> usize {
    64
}

impl std::fmt::Debug for BotConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BotConfig")
            .field("api_base_url", &self.api_base_url)
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("access_token", &"<redacted>")
            .field("streaming_url", &self.streaming_url)
            .field("stream", &self.stream)
            .field("http_attempts", &self.http_attempts)
            .field("http_timeout_secs", &self.http_timeout_secs)
            .field("reconnect_max_backoff_secs", &self.reconnect_max_backoff_secs)
            .field("event_buffer", &self.event_buffer)
            .finish()
    }
}

impl BotConfig {
    pub fn from_json(text: &str) -> Result<Self> {
        let cfg: BotConfig = serde_json::from_str(text).context("parse config json")?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Builds the config from `API_BASE_URL`, `CLIENT_ID`, `CLIENT_SECRET`,
    /// `ACCESS_TOKEN` and the optional `STREAMING_API_URL`/`FEDIBOT_*` keys.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let required = |key: &str| get(key).with_context(|| format!("missing {key}"));
        let parsed = |key: &str| -> Result<Option<u64>> {
            get(key)
                .map(|v| v.parse::<u64>().with_context(|| format!("invalid {key}: {v}")))
                .transpose()
        };

        let cfg = BotConfig {
            api_base_url: required("API_BASE_URL")?,
            client_id: required("CLIENT_ID")?,
            client_secret: required("CLIENT_SECRET")?,
            access_token: required("ACCESS_TOKEN")?,
            streaming_url: get("STREAMING_API_URL"),
            stream: get("FEDIBOT_STREAM").unwrap_or_else(default_stream),
            http_attempts: parsed("FEDIBOT_HTTP_ATTEMPTS")?
                .map(|v| v.min(u32::MAX as u64) as u32)
                .unwrap_or_else(default_http_attempts),
            http_timeout_secs: parsed("FEDIBOT_HTTP_TIMEOUT_SECS")?
                .unwrap_or_else(default_http_timeout_secs),
            reconnect_max_backoff_secs: parsed("FEDIBOT_RECONNECT_MAX_BACKOFF_SECS")?
                .unwrap_or_else(default_reconnect_max_backoff_secs),
            event_buffer: parsed("FEDIBOT_EVENT_BUFFER")?
                .map(|v| usize::try_from(v).unwrap_or(usize::MAX))
                .unwrap_or_else(default_event_buffer),
        };
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("api_base_url", &self.api_base_url),
            ("client_id", &self.client_id),
            ("client_secret", &self.client_secret),
            ("access_token", &self.access_token),
        ] {
            if value.trim().is_empty() {
                bail!("missing {name}");
            }
        }
        let base = self.api_base_url.trim();
        if !base.starts_with("https://") && !base.starts_with("http://") {
            bail!("api_base_url must be an http(s) url: {base}");
        }
        if self.stream.trim().is_empty() {
            bail!("stream must not be empty");
        }
        if self.event_buffer == 0 || self.event_buffer > MAX_EVENT_BUFFER {
            bail!(
                "event_buffer must be between 1 and {MAX_EVENT_BUFFER}, got {}",
                self.event_buffer
            );
        }
        Ok(())
    }

    pub fn api_base(&self) -> &str {
        self.api_base_url.trim().trim_end_matches('/')
    }
}

/// `--config <path>` wins over `FEDIBOT_CONFIG`; with neither, the config
/// comes from plain environment variables.
pub fn config_path_from_args<I, F>(args: I, lookup: F) -> Result<Option<PathBuf>>
where
    I: IntoIterator<Item = String>,
    F: Fn(&str) -> Option<String>,
{
    let mut args = args.into_iter();
    while let Some(arg) = args.next() {
        if arg == "--config" {
            if let Some(path) = args.next() {
                return Ok(Some(PathBuf::from(path)));
            }
            bail!("--config requires a path");
        }
    }
    if let Some(path) = lookup("FEDIBOT_CONFIG") {
        if !path.trim().is_empty() {
            return Ok(Some(PathBuf::from(path.trim())));
        }
    }
    Ok(None)
}

pub fn load_config<I, F>(args: I, lookup: F) -> Result<BotConfig>
where
    I: IntoIterator<Item = String>,
    F: Fn(&str) -> Option<String>,
{
    match config_path_from_args(args, &lookup)? {
        Some(path) => {
            let text = std::fs::read_to_string(&path)
                .with_context(|| format!("read config {}", path.display()))?;
            BotConfig::from_json(&text).with_context(|| format!("load config {}", path.display()))
        }
        None => BotConfig::from_lookup(lookup),
    }
}
