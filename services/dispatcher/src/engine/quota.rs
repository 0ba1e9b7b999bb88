//! services/dispatcher/src/engine/quota.rs
//!
//! Tracks and resets each account's remaining weekly sends. Consumption is
//! delegated to the store's atomic decrement so that concurrent callers in
//! the same process can never drive the quota negative.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use promo_core::domain::Account;
use promo_core::ports::{AccountStore, PortResult};
use tracing::info;
use uuid::Uuid;

/// Quota bookkeeping over the account store.
#[derive(Clone)]
pub struct QuotaManager {
    accounts: Arc<dyn AccountStore>,
}

impl QuotaManager {
    /// Creates a new `QuotaManager`.
    pub fn new(accounts: Arc<dyn AccountStore>) -> Self {
        Self { accounts }
    }

    /// The account's current remaining sends, never negative.
    pub fn remaining(account: &Account) -> i32 {
        account.remaining_weekly_sends.max(0)
    }

    /// Consumes one send from the account's weekly quota.
    ///
    /// Returns false when the quota was already exhausted. Callers are
    /// expected to check `remaining` first; the decrement itself is still
    /// atomic as a backstop.
    pub async fn consume(&self, account_id: Uuid) -> PortResult<bool> {
        self.accounts.try_consume_send(account_id).await
    }

    /// Resets every subscribed account's quota to its plan ceiling.
    ///
    /// Accounts without a plan are skipped, leaving their quota frozen.
    /// Returns the number of accounts reset. Invoked once per week by the
    /// calendar timer.
    pub async fn reset_all(&self, now: DateTime<Utc>) -> PortResult<usize> {
        let accounts = self.accounts.find_all().await?;
        let mut reset_count = 0;

        for mut account in accounts {
            let Some(plan) = account.plan.clone() else {
                continue;
            };

            account.remaining_weekly_sends = plan.weekly_allowed_sends;
            account.last_reset_date = Some(now);
            self.accounts.save(&account).await?;
            reset_count += 1;

            info!(
                email = %account.email,
                remaining = account.remaining_weekly_sends,
                "Reset weekly sends for account"
            );
        }

        Ok(reset_count)
    }
}
