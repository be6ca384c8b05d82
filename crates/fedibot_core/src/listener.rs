/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - FEDI3 Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

use crate::account_service::AccountService;
use anyhow::{Context, Result};
use fedibot_protocol::{Account, Notification, Status, StreamEvent};
use std::collections::HashSet;
use tracing::{debug, info};

/// Which rule decided the fate of an observed account.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FollowDecision {
    AlreadyFollowing,
    Local,
    Locked,
    Followed,
}

/// Follows every new unlocked remote account seen on the stream.
///
/// The following set is a cache of the remote following list. It is only ever
/// replaced wholesale from the account service: at construction, after each
/// follow and on every heartbeat.
pub struct Listener<S> {
    service: S,
    me: Account,
    following: HashSet<String>,
}

impl<S: AccountService> Listener<S> {
    pub async fn new(service: S) -> Result<Self> {
        let me = service
            .verify_credentials()
            .await
            .context("verify credentials")?;
        info!(acct = %me.acct, id = %me.id, "authenticated");
        let mut listener = Self {
            service,
            me,
            following: HashSet::new(),
        };
        listener.refresh_following().await?;
        Ok(listener)
    }

    pub fn me(&self) -> &Account {
        &self.me
    }

    pub fn following(&self) -> &HashSet<String> {
        &self.following
    }

    pub async fn on_event(&mut self, event: StreamEvent) -> Result<()> {
        match event {
            StreamEvent::NewStatus(status) => {
                self.on_new_status(&status).await?;
            }
            StreamEvent::Notification(notification) => self.on_notification(&notification),
            StreamEvent::Heartbeat => self.on_heartbeat().await?,
        }
        Ok(())
    }

    pub async fn on_new_status(&mut self, status: &Status) -> Result<FollowDecision> {
        let account = &status.account;
        let acct = account.acct.as_str();

        if self.following.contains(acct) {
            debug!("already following {acct}");
            return Ok(FollowDecision::AlreadyFollowing);
        }
        if is_local_account(acct) {
            debug!("{acct} is a local account, skipping");
            return Ok(FollowDecision::Local);
        }
        if account.locked {
            debug!("{acct} is a locked account, skipping");
            return Ok(FollowDecision::Locked);
        }

        info!(
            status = %status.id,
            url = status.url.as_deref().unwrap_or("-"),
            "new account: {acct}"
        );
        self.service
            .follow(&account.id)
            .await
            .with_context(|| format!("follow {acct} ({})", account.id))?;
        self.refresh_following().await?;
        Ok(FollowDecision::Followed)
    }

    pub async fn on_heartbeat(&mut self) -> Result<()> {
        debug!("handling heartbeat");
        self.refresh_following().await
    }

    /// Observability only; never changes state or calls the service.
    pub fn on_notification(&self, notification: &Notification) {
        debug!(
            id = %notification.id,
            kind = %notification.kind,
            from = notification.account.as_ref().map(|a| a.acct.as_str()).unwrap_or("-"),
            "notification: {notification:?}"
        );
    }

    pub async fn refresh_following(&mut self) -> Result<()> {
        let accounts = self
            .service
            .list_following(&self.me.id)
            .await
            .with_context(|| format!("list following of {}", self.me.acct))?;
        self.following = accounts.into_iter().map(|a| a.acct).collect();
        info!("currently following {} accounts", self.following.len());
        Ok(())
    }
}

/// Accounts on the bot's own instance are reported without a `@domain` part.
pub fn is_local_account(acct: &str) -> bool {
    !acct.contains('@')
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum Call {
        Verify,
        List(String),
        Follow(String),
    }

    /// In-memory account service: `follow` moves an account from the
    /// directory into the following list, like the real server would.
    #[derive(Default)]
    struct FakeAccounts {
        calls: Mutex<Vec<Call>>,
        following: Mutex<Vec<Account>>,
        directory: Mutex<HashMap<String, Account>>,
        fail_follow: bool,
        fail_list: Mutex<bool>,
    }

    impl FakeAccounts {
        fn with_following(handles: &[&str]) -> Self {
            let fake = FakeAccounts::default();
            *fake.following.lock().unwrap() = handles
                .iter()
                .enumerate()
                .map(|(i, h)| account(&format!("f{i}"), h, false))
                .collect();
            fake
        }

        fn know(&self, a: &Account) {
            self.directory.lock().unwrap().insert(a.id.clone(), a.clone());
        }

        fn calls(&self) -> Vec<Call> {
            self.calls.lock().unwrap().clone()
        }

        fn follow_calls(&self) -> Vec<String> {
            self.calls()
                .into_iter()
                .filter_map(|c| match c {
                    Call::Follow(id) => Some(id),
                    _ => None,
                })
                .collect()
        }

        fn list_calls(&self) -> usize {
            self.calls()
                .iter()
                .filter(|c| matches!(c, Call::List(_)))
                .count()
        }

        fn set_following(&self, handles: &[&str]) {
            *self.following.lock().unwrap() = handles
                .iter()
                .map(|h| account(h, h, false))
                .collect();
        }
    }

    #[async_trait]
    impl AccountService for FakeAccounts {
        async fn verify_credentials(&self) -> Result<Account> {
            self.calls.lock().unwrap().push(Call::Verify);
            Ok(account("me", "bot", false))
        }

        async fn list_following(&self, account_id: &str) -> Result<Vec<Account>> {
            self.calls
                .lock()
                .unwrap()
                .push(Call::List(account_id.to_string()));
            if *self.fail_list.lock().unwrap() {
                anyhow::bail!("listing failed");
            }
            Ok(self.following.lock().unwrap().clone())
        }

        async fn follow(&self, account_id: &str) -> Result<()> {
            self.calls
                .lock()
                .unwrap()
                .push(Call::Follow(account_id.to_string()));
            if self.fail_follow {
                anyhow::bail!("follow refused");
            }
            if let Some(a) = self.directory.lock().unwrap().get(account_id).cloned() {
                self.following.lock().unwrap().push(a);
            }
            Ok(())
        }
    }

    fn account(id: &str, acct: &str, locked: bool) -> Account {
        Account {
            id: id.to_string(),
            acct: acct.to_string(),
            locked,
        }
    }

    fn status(account: Account) -> Status {
        Status {
            id: format!("s-{}", account.id),
            account,
            url: None,
        }
    }

    async fn listener(fake: FakeAccounts) -> (Listener<Arc<FakeAccounts>>, Arc<FakeAccounts>) {
        let fake = Arc::new(fake);
        let l = Listener::new(fake.clone()).await.unwrap();
        fake.calls.lock().unwrap().clear();
        (l, fake)
    }

    fn handles(l: &Listener<Arc<FakeAccounts>>) -> Vec<String> {
        let mut v: Vec<_> = l.following().iter().cloned().collect();
        v.sort();
        v
    }

    #[tokio::test]
    async fn construction_verifies_then_loads_following() {
        let fake = Arc::new(FakeAccounts::with_following(&["a@x", "b@y"]));
        let l = Listener::new(fake.clone()).await.unwrap();
        assert_eq!(fake.calls(), vec![Call::Verify, Call::List("me".to_string())]);
        assert_eq!(l.me().acct, "bot");
        assert_eq!(handles(&l), vec!["a@x", "b@y"]);
    }

    #[tokio::test]
    async fn construction_fails_when_listing_fails() {
        let fake = FakeAccounts::default();
        *fake.fail_list.lock().unwrap() = true;
        assert!(Listener::new(fake).await.is_err());
    }

    #[tokio::test]
    async fn new_remote_unlocked_account_is_followed_then_refreshed() {
        let (mut l, fake) = listener(FakeAccounts::default()).await;
        let alice = account("1", "alice@remote.example", false);
        fake.know(&alice);

        let d = l.on_new_status(&status(alice)).await.unwrap();

        assert_eq!(d, FollowDecision::Followed);
        assert_eq!(
            fake.calls(),
            vec![Call::Follow("1".to_string()), Call::List("me".to_string())]
        );
        assert_eq!(handles(&l), vec!["alice@remote.example"]);
    }

    #[tokio::test]
    async fn local_account_is_never_followed() {
        let (mut l, fake) = listener(FakeAccounts::with_following(&["bob"])).await;
        let d = l
            .on_new_status(&status(account("2", "bob", false)))
            .await
            .unwrap();
        // The cache hit fires first, but either way no remote call happens.
        assert_eq!(d, FollowDecision::AlreadyFollowing);
        assert!(fake.calls().is_empty());

        let (mut l, fake) = listener(FakeAccounts::default()).await;
        for locked in [false, true] {
            let d = l
                .on_new_status(&status(account("2", "bob", locked)))
                .await
                .unwrap();
            assert_eq!(d, FollowDecision::Local);
        }
        assert!(fake.calls().is_empty());
    }

    #[tokio::test]
    async fn locked_remote_account_is_skipped() {
        let (mut l, fake) = listener(FakeAccounts::default()).await;
        let d = l
            .on_new_status(&status(account("3", "carol@remote.example", true)))
            .await
            .unwrap();
        assert_eq!(d, FollowDecision::Locked);
        assert!(fake.calls().is_empty());
        assert!(l.following().is_empty());
    }

    #[tokio::test]
    async fn already_followed_account_makes_no_remote_calls() {
        let (mut l, fake) = listener(FakeAccounts::with_following(&["dave@x"])).await;
        for locked in [false, true] {
            let d = l
                .on_new_status(&status(account("4", "dave@x", locked)))
                .await
                .unwrap();
            assert_eq!(d, FollowDecision::AlreadyFollowing);
        }
        assert!(fake.calls().is_empty());
    }

    #[tokio::test]
    async fn heartbeat_replaces_the_cache_wholesale() {
        let (mut l, fake) = listener(FakeAccounts::with_following(&["old@z"])).await;
        fake.set_following(&["dave@x", "erin@y"]);

        l.on_event(StreamEvent::Heartbeat).await.unwrap();

        assert_eq!(handles(&l), vec!["dave@x", "erin@y"]);
        assert_eq!(fake.list_calls(), 1);
        assert!(fake.follow_calls().is_empty());
    }

    #[tokio::test]
    async fn heartbeat_refreshes_even_when_nothing_changed() {
        let (mut l, fake) = listener(FakeAccounts::with_following(&["dave@x"])).await;
        l.on_heartbeat().await.unwrap();
        let first = handles(&l);
        l.on_heartbeat().await.unwrap();
        assert_eq!(handles(&l), first);
        assert_eq!(fake.list_calls(), 2);
    }

    #[tokio::test]
    async fn heartbeat_heals_a_manual_unfollow() {
        let (mut l, fake) = listener(FakeAccounts::with_following(&["dave@x"])).await;
        fake.set_following(&[]);
        l.on_heartbeat().await.unwrap();

        let dave = account("9", "dave@x", false);
        fake.know(&dave);
        let d = l.on_new_status(&status(dave)).await.unwrap();
        assert_eq!(d, FollowDecision::Followed);
        assert_eq!(fake.follow_calls(), vec!["9".to_string()]);
    }

    #[tokio::test]
    async fn second_status_from_same_account_is_not_followed_again() {
        let (mut l, fake) = listener(FakeAccounts::default()).await;
        let erin = account("5", "erin@y", false);
        fake.know(&erin);
        l.on_new_status(&status(erin.clone())).await.unwrap();
        let d = l.on_new_status(&status(erin)).await.unwrap();
        assert_eq!(d, FollowDecision::AlreadyFollowing);
        assert_eq!(fake.follow_calls(), vec!["5".to_string()]);
    }

    #[tokio::test]
    async fn notifications_do_not_touch_state() {
        let (mut l, fake) = listener(FakeAccounts::with_following(&["a@x"])).await;
        let n = Notification {
            id: "n1".to_string(),
            kind: "mention".to_string(),
            account: Some(account("6", "frank@z", false)),
        };
        l.on_event(StreamEvent::Notification(n)).await.unwrap();
        assert!(fake.calls().is_empty());
        assert_eq!(handles(&l), vec!["a@x"]);
    }

    #[tokio::test]
    async fn follow_failure_propagates_without_refresh() {
        let fake = FakeAccounts {
            fail_follow: true,
            ..FakeAccounts::default()
        };
        let (mut l, fake) = listener(fake).await;
        let err = l
            .on_new_status(&status(account("7", "gina@w", false)))
            .await
            .unwrap_err();
        assert!(format!("{err:#}").contains("follow refused"));
        assert_eq!(fake.calls(), vec![Call::Follow("7".to_string())]);
    }

    #[tokio::test]
    async fn refresh_failure_propagates_from_heartbeat() {
        let (mut l, fake) = listener(FakeAccounts::with_following(&["a@x"])).await;
        *fake.fail_list.lock().unwrap() = true;
        assert!(l.on_heartbeat().await.is_err());
        assert_eq!(handles(&l), vec!["a@x"]);
    }

    #[test]
    fn local_means_no_domain_part() {
        assert!(is_local_account("bob"));
        assert!(!is_local_account("bob@remote.example"));
        assert!(!is_local_account("@odd"));
    }
}
