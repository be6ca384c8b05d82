/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - FEDI3 Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

pub mod account_service;
pub mod config;
pub mod http_retry;
pub mod listener;
pub mod mastodon;
pub mod runtime;
pub mod streaming;
