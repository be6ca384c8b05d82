/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - FEDI3 Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

use anyhow::Result;
use async_trait::async_trait;
use fedibot_protocol::Account;

/// Remote account operations the listener depends on. Retries, paging and
/// timeouts belong to the implementation.
#[async_trait]
pub trait AccountService: Send + Sync {
    /// The authenticated bot account.
    async fn verify_credentials(&self) -> Result<Account>;

    /// Every account `account_id` currently follows.
    async fn list_following(&self, account_id: &str) -> Result<Vec<Account>>;

    async fn follow(&self, account_id: &str) -> Result<()>;
}

#[async_trait]
impl<T: AccountService + ?Sized> AccountService for std::sync::Arc<T> {
    async fn verify_credentials(&self) -> Result<Account> {
        (**self).verify_credentials().await
    }

    async fn list_following(&self, account_id: &str) -> Result<Vec<Account>> {
        (**self).list_following(account_id).await
    }

    async fn follow(&self, account_id: &str) -> Result<()> {
        (**self).follow(account_id).await
    }
}
