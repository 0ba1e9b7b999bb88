//! services/dispatcher/src/testing.rs
//!
//! In-memory implementations of the core ports, used by the unit and
//! integration tests. They mirror the query semantics of the real database
//! adapter (due-work filtering, stable insertion order, atomic quota
//! decrement) without requiring a running Postgres.

use std::collections::HashSet;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use promo_core::domain::{
    Account, Promotion, PromotionTarget, SubscriptionPlan, Target, TargetKind,
};
use promo_core::ports::{
    AccountStore, MessageSender, PortError, PortResult, PromotionStore,
};
use uuid::Uuid;

#[derive(Default)]
struct State {
    promotions: Vec<Promotion>,
    links: Vec<PromotionTarget>,
    targets: Vec<Target>,
    accounts: Vec<Account>,
}

/// An in-memory `PromotionStore` + `AccountStore`.
#[derive(Default)]
pub struct InMemoryStore {
    state: Mutex<State>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds an account without persisting it.
    pub fn account(
        email: &str,
        plan: Option<SubscriptionPlan>,
        remaining_weekly_sends: i32,
    ) -> Account {
        Account {
            id: Uuid::new_v4(),
            email: email.to_string(),
            nickname: email.split('@').next().unwrap_or(email).to_string(),
            plan,
            remaining_weekly_sends,
            last_reset_date: None,
        }
    }

    pub fn add_account(&self, account: Account) {
        self.state.lock().unwrap().accounts.push(account);
    }

    /// Adds a global group target and returns it.
    pub fn add_target(&self, name: &str, identifier: &str) -> Target {
        let target = Target {
            id: Uuid::new_v4(),
            name: name.to_string(),
            identifier: identifier.to_string(),
            kind: TargetKind::Group,
            description: None,
            owner_id: None,
        };
        self.state.lock().unwrap().targets.push(target.clone());
        target
    }

    /// Adds a promotion with one fresh, unsent delivery record per target.
    pub fn add_promotion(&self, promotion: Promotion, target_ids: &[Uuid]) {
        let mut state = self.state.lock().unwrap();
        for target_id in target_ids {
            state
                .links
                .push(PromotionTarget::new(promotion.id, *target_id));
        }
        state.promotions.push(promotion);
    }

    /// Snapshot of a promotion's delivery records, in insertion order.
    pub fn links_of(&self, promotion_id: Uuid) -> Vec<PromotionTarget> {
        self.state
            .lock()
            .unwrap()
            .links
            .iter()
            .filter(|l| l.promotion_id == promotion_id)
            .cloned()
            .collect()
    }

    /// Snapshot of a stored promotion.
    pub fn promotion(&self, promotion_id: Uuid) -> Option<Promotion> {
        self.state
            .lock()
            .unwrap()
            .promotions
            .iter()
            .find(|p| p.id == promotion_id)
            .cloned()
    }
}

#[async_trait]
impl PromotionStore for InMemoryStore {
    async fn find_due_scheduled(&self, now: DateTime<Utc>) -> PortResult<Vec<Promotion>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .promotions
            .iter()
            .filter(|p| !p.recurring)
            .filter(|p| p.scheduled_time.map_or(true, |t| t <= now))
            .filter(|p| {
                state
                    .links
                    .iter()
                    .any(|l| l.promotion_id == p.id && !l.sent)
            })
            .cloned()
            .collect())
    }

    async fn find_due_recurring(&self, now: DateTime<Utc>) -> PortResult<Vec<Promotion>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .promotions
            .iter()
            .filter(|p| p.recurring && p.next_recurrence.map_or(false, |t| t <= now))
            .cloned()
            .collect())
    }

    async fn find_promotion(&self, promotion_id: Uuid) -> PortResult<Promotion> {
        self.promotion(promotion_id)
            .ok_or_else(|| PortError::NotFound(format!("Promotion {} not found", promotion_id)))
    }

    async fn find_promotion_targets(
        &self,
        promotion_id: Uuid,
    ) -> PortResult<Vec<PromotionTarget>> {
        Ok(self.links_of(promotion_id))
    }

    async fn find_target(&self, target_id: Uuid) -> PortResult<Target> {
        self.state
            .lock()
            .unwrap()
            .targets
            .iter()
            .find(|t| t.id == target_id)
            .cloned()
            .ok_or_else(|| PortError::NotFound(format!("Target {} not found", target_id)))
    }

    async fn save_promotion(&self, promotion: &Promotion) -> PortResult<()> {
        let mut state = self.state.lock().unwrap();
        match state.promotions.iter_mut().find(|p| p.id == promotion.id) {
            Some(existing) => *existing = promotion.clone(),
            None => state.promotions.push(promotion.clone()),
        }
        Ok(())
    }

    async fn save_promotion_target(&self, link: &PromotionTarget) -> PortResult<()> {
        let mut state = self.state.lock().unwrap();
        match state.links.iter_mut().find(|l| l.id == link.id) {
            Some(existing) => *existing = link.clone(),
            None => state.links.push(link.clone()),
        }
        Ok(())
    }

    async fn insert_promotion(
        &self,
        promotion: &Promotion,
        target_ids: &[Uuid],
    ) -> PortResult<()> {
        self.add_promotion(promotion.clone(), target_ids);
        Ok(())
    }

    async fn delete_promotion(&self, promotion_id: Uuid) -> PortResult<()> {
        let mut state = self.state.lock().unwrap();
        let before = state.promotions.len();
        state.promotions.retain(|p| p.id != promotion_id);
        if state.promotions.len() == before {
            return Err(PortError::NotFound(format!(
                "Promotion {} not found",
                promotion_id
            )));
        }
        state.links.retain(|l| l.promotion_id != promotion_id);
        Ok(())
    }
}

#[async_trait]
impl AccountStore for InMemoryStore {
    async fn find_by_id(&self, account_id: Uuid) -> PortResult<Account> {
        self.state
            .lock()
            .unwrap()
            .accounts
            .iter()
            .find(|a| a.id == account_id)
            .cloned()
            .ok_or_else(|| PortError::NotFound(format!("Account {} not found", account_id)))
    }

    async fn find_all(&self) -> PortResult<Vec<Account>> {
        Ok(self.state.lock().unwrap().accounts.clone())
    }

    async fn save(&self, account: &Account) -> PortResult<()> {
        let mut state = self.state.lock().unwrap();
        match state.accounts.iter_mut().find(|a| a.id == account.id) {
            Some(existing) => *existing = account.clone(),
            None => state.accounts.push(account.clone()),
        }
        Ok(())
    }

    async fn try_consume_send(&self, account_id: Uuid) -> PortResult<bool> {
        // The single lock makes the check-and-decrement atomic, matching the
        // conditional UPDATE of the real adapter.
        let mut state = self.state.lock().unwrap();
        let account = state
            .accounts
            .iter_mut()
            .find(|a| a.id == account_id)
            .ok_or_else(|| PortError::NotFound(format!("Account {} not found", account_id)))?;

        if account.remaining_weekly_sends > 0 {
            account.remaining_weekly_sends -= 1;
            Ok(true)
        } else {
            Ok(false)
        }
    }
}

/// A `MessageSender` that records every call and fails the destinations it
/// was told to fail.
#[derive(Default)]
pub struct RecordingSender {
    failing: Mutex<HashSet<String>>,
    calls: Mutex<Vec<String>>,
}

impl RecordingSender {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every send to `destination` fail until cleared.
    pub fn fail_for(&self, destination: &str) {
        self.failing.lock().unwrap().insert(destination.to_string());
    }

    /// Lets previously failing sends to `destination` succeed again.
    pub fn recover(&self, destination: &str) {
        self.failing.lock().unwrap().remove(destination);
    }

    /// Every destination sent to, in call order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl MessageSender for RecordingSender {
    async fn send(&self, destination: &str, _caption: &str, _image_url: Option<&str>) -> bool {
        self.calls.lock().unwrap().push(destination.to_string());
        !self.failing.lock().unwrap().contains(destination)
    }
}
