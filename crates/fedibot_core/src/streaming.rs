/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - FEDI3 Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

use crate::http_retry::{next_backoff, sleep_with_jitter, BASE_BACKOFF};
use anyhow::{anyhow, bail, Context, Result};
use fedibot_protocol::{StreamEvent, StreamFrame};
use futures_util::{SinkExt, StreamExt};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::tungstenite;
use tracing::{info, trace, warn};

#[derive(Clone, Debug)]
pub struct StreamSource {
    base: String,
    stream: String,
    access_token: String,
    connect_timeout: Duration,
    max_backoff: Duration,
}

enum Pump {
    Shutdown,
    ReceiverGone,
    Disconnected(anyhow::Error),
}

/// Reconnect delay: doubles after every failed attempt, drops back to the
/// base delay once a connection is established.
#[derive(Debug, Clone, Copy)]
struct ReconnectBackoff {
    current: Duration,
    max: Duration,
}

impl ReconnectBackoff {
    fn new(max: Duration) -> Self {
        Self {
            current: BASE_BACKOFF,
            max: max.max(BASE_BACKOFF),
        }
    }

    fn delay(&self) -> Duration {
        self.current
    }

    fn grow(&mut self) {
        self.current = next_backoff(self.current, self.max);
    }

    fn reset(&mut self) {
        self.current = BASE_BACKOFF;
    }
}

impl StreamSource {
    pub fn new(
        base: &str,
        stream: &str,
        access_token: &str,
        connect_timeout: Duration,
        max_backoff: Duration,
    ) -> Self {
        Self {
            base: base.trim().trim_end_matches('/').to_string(),
            stream: stream.trim().to_string(),
            access_token: access_token.trim().to_string(),
            connect_timeout: connect_timeout.max(Duration::from_millis(100)),
            max_backoff: max_backoff.max(BASE_BACKOFF),
        }
    }

    fn display_url(&self) -> String {
        format!(
            "{}/api/v1/streaming?stream={}",
            self.base,
            urlencoding::encode(&self.stream)
        )
    }

    fn url(&self) -> String {
        format!(
            "{}&access_token={}",
            self.display_url(),
            urlencoding::encode(&self.access_token)
        )
    }

    /// Pushes events into `events` until shutdown, until the receiver goes
    /// away, or until a frame cannot be decoded. Dropped connections are
    /// retried with backoff.
    pub async fn run(
        self,
        events: mpsc::Sender<StreamEvent>,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<()> {
        let mut backoff = ReconnectBackoff::new(self.max_backoff);
        loop {
            if *shutdown.borrow() {
                break;
            }
            match self.pump(&events, &mut shutdown, &mut backoff).await? {
                Pump::Shutdown | Pump::ReceiverGone => break,
                Pump::Disconnected(e) => {
                    warn!(url = %self.display_url(), "stream disconnected: {e:#}");
                }
            }
            tokio::select! {
                res = shutdown.changed() => {
                    if res.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                _ = sleep_with_jitter(backoff.delay()) => {}
            }
            backoff.grow();
            info!(url = %self.display_url(), "reconnecting stream");
        }
        Ok(())
    }

    async fn pump(
        &self,
        events: &mpsc::Sender<StreamEvent>,
        shutdown: &mut watch::Receiver<bool>,
        backoff: &mut ReconnectBackoff,
    ) -> Result<Pump> {
        let connect = tokio::time::timeout(
            self.connect_timeout,
            tokio_tungstenite::connect_async(self.url()),
        );
        tokio::pin!(connect);
        let connected = loop {
            tokio::select! {
                res = shutdown.changed() => {
                    if res.is_err() || *shutdown.borrow() {
                        return Ok(Pump::Shutdown);
                    }
                }
                res = &mut connect => break res,
            }
        };
        let (ws, _) = match connected {
            Ok(Ok(v)) => v,
            Ok(Err(e)) => return Ok(Pump::Disconnected(e.into())),
            Err(_) => {
                return Ok(Pump::Disconnected(anyhow!(
                    "handshake timed out after {:?}",
                    self.connect_timeout
                )))
            }
        };
        info!(url = %self.display_url(), "stream connected");
        backoff.reset();
        let (mut ws_tx, mut ws_rx) = ws.split();

        loop {
            tokio::select! {
                res = shutdown.changed() => {
                    if res.is_err() || *shutdown.borrow() {
                        let _ = ws_tx.send(tungstenite::Message::Close(None)).await;
                        return Ok(Pump::Shutdown);
                    }
                }
                msg = ws_rx.next() => {
                    let Some(msg) = msg else {
                        return Ok(Pump::Disconnected(anyhow!("stream ended")));
                    };
                    let msg = match msg {
                        Ok(m) => m,
                        Err(e) => return Ok(Pump::Disconnected(e.into())),
                    };
                    let event = match msg {
                        tungstenite::Message::Text(text) => match decode_frame(&text)? {
                            Some(ev) => ev,
                            None => continue,
                        },
                        tungstenite::Message::Ping(p) => {
                            let _ = ws_tx.send(tungstenite::Message::Pong(p)).await;
                            StreamEvent::Heartbeat
                        }
                        tungstenite::Message::Close(_) => {
                            return Ok(Pump::Disconnected(anyhow!("closed by server")));
                        }
                        _ => continue,
                    };
                    tokio::select! {
                        sent = events.send(event) => {
                            if sent.is_err() {
                                return Ok(Pump::ReceiverGone);
                            }
                        }
                        _ = shutdown.wait_for(|stop| *stop) => return Ok(Pump::Shutdown),
                    }
                }
            }
        }
    }
}

/// Maps one text frame to an event. Event kinds the bot has no use for give
/// `Ok(None)`; a broken `update` or `notification` is an error.
pub fn decode_frame(text: &str) -> Result<Option<StreamEvent>> {
    let frame: StreamFrame = serde_json::from_str(text).context("decode stream frame")?;
    match frame.event.as_str() {
        "update" => Ok(Some(StreamEvent::NewStatus(decode_payload(&frame)?))),
        "notification" => Ok(Some(StreamEvent::Notification(decode_payload(&frame)?))),
        other => {
            trace!(event = other, "ignoring stream event");
            Ok(None)
        }
    }
}

fn decode_payload<T: DeserializeOwned>(frame: &StreamFrame) -> Result<T> {
    let decoded = match &frame.payload {
        Some(Value::String(s)) => serde_json::from_str(s),
        Some(v @ Value::Object(_)) => serde_json::from_value(v.clone()),
        _ => bail!("{} frame without payload", frame.event),
    };
    decoded.with_context(|| format!("decode {} payload", frame.event))
}

/// Streaming endpoint: explicit setting, then what the instance advertises,
/// then the API base with its scheme switched to websocket.
pub fn resolve_streaming_base(
    configured: Option<&str>,
    advertised: Option<&str>,
    api_base: &str,
) -> Result<String> {
    if let Some(url) = configured {
        return infer_ws_from_base(url)
            .with_context(|| format!("invalid streaming url: {url}"));
    }
    if let Some(ws) = advertised.and_then(infer_ws_from_base) {
        return Ok(ws);
    }
    infer_ws_from_base(api_base)
        .with_context(|| format!("cannot derive streaming url from {api_base}"))
}

pub fn infer_ws_from_base(base: &str) -> Option<String> {
    let base = base.trim().trim_end_matches('/');
    if base.is_empty() {
        return None;
    }
    if base.starts_with("wss://") || base.starts_with("ws://") {
        return Some(base.to_string());
    }
    if let Some(rest) = base.strip_prefix("https://") {
        return Some(format!("wss://{rest}"));
    }
    if let Some(rest) = base.strip_prefix("http://") {
        return Some(format!("ws://{rest}"));
    }
    None
}
