/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - FEDI3 Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

use crate::account_service::AccountService;
use crate::config::BotConfig;
use crate::listener::Listener;
use crate::mastodon::MastodonClient;
use crate::streaming::{resolve_streaming_base, StreamSource};
use anyhow::{Context, Result};
use fedibot_protocol::StreamEvent;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchEnd {
    Shutdown,
    StreamClosed,
}

/// Runs the bot until shutdown, the end of the stream, or the first error.
pub async fn run(cfg: BotConfig, shutdown: watch::Receiver<bool>) -> Result<()> {
    info!(base = %cfg.api_base(), client_id = %cfg.client_id, "connecting");
    let client = MastodonClient::new(&cfg)?;
    let listener = Listener::new(client.clone())
        .await
        .context("start listener")?;
    info!(
        acct = %listener.me().acct,
        following = listener.following().len(),
        "listener ready"
    );

    let advertised = match cfg.streaming_url {
        Some(_) => None,
        None => match client.fetch_streaming_url().await {
            Ok(v) => v,
            Err(e) => {
                warn!("instance lookup failed, deriving streaming url: {e:#}");
                None
            }
        },
    };
    let base = resolve_streaming_base(
        cfg.streaming_url.as_deref(),
        advertised.as_deref(),
        cfg.api_base(),
    )?;
    let source = StreamSource::new(
        &base,
        &cfg.stream,
        &cfg.access_token,
        Duration::from_secs(cfg.http_timeout_secs.max(1)),
        Duration::from_secs(cfg.reconnect_max_backoff_secs),
    );

    let (tx, rx) = mpsc::channel(cfg.event_buffer);
    let stream_task = tokio::spawn(source.run(tx, shutdown.clone()));

    match dispatch(listener, rx, shutdown).await {
        Ok(end) => {
            info!(?end, "dispatch finished");
            stream_task.await.context("stream task")??;
            Ok(())
        }
        Err(e) => {
            stream_task.abort();
            Err(e)
        }
    }
}

/// Single consumer: each event is handled to completion before the next one
/// is received.
pub async fn dispatch<S: AccountService>(
    mut listener: Listener<S>,
    mut events: mpsc::Receiver<StreamEvent>,
    mut shutdown: watch::Receiver<bool>,
) -> Result<DispatchEnd> {
    loop {
        tokio::select! {
            res = shutdown.changed() => {
                if res.is_err() || *shutdown.borrow() {
                    return Ok(DispatchEnd::Shutdown);
                }
            }
            ev = events.recv() => {
                let Some(ev) = ev else {
                    return Ok(DispatchEnd::StreamClosed);
                };
                listener.on_event(ev).await?;
            }
        }
    }
}
