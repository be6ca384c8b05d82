/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - FEDI3 Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

use serde::Deserialize;

/// Account as returned by the Mastodon client API. Only the fields the bot
/// acts on are required; everything else the server sends is ignored.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct Account {
    pub id: String,
    /// `username` for accounts on the home instance, `username@domain` otherwise.
    pub acct: String,
    pub locked: bool,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Status {
    pub id: String,
    pub account: Account,
    #[serde(default)]
    pub url: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Notification {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub account: Option<Account>,
}

/// One text frame of the streaming websocket.
///
/// `payload` is itself JSON encoded as a string for `update` and
/// `notification`, a bare id for `delete`, and absent for some events.
#[derive(Debug, Deserialize, Clone)]
pub struct StreamFrame {
    #[serde(default)]
    pub stream: Vec<String>,
    pub event: String,
    #[serde(default)]
    pub payload: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct InstanceUrls {
    #[serde(default)]
    pub streaming_api: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Instance {
    #[serde(default)]
    pub urls: Option<InstanceUrls>,
}

/// Events handed from the stream source to the listener, in arrival order.
#[derive(Debug, Clone)]
pub enum StreamEvent {
    NewStatus(Status),
    Notification(Notification),
    Heartbeat,
}
