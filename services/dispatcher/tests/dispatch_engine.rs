//! Scenario tests for the dispatch engine, run against the in-memory port
//! implementations.

use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use dispatcher_lib::engine::DispatchEngine;
use dispatcher_lib::testing::{InMemoryStore, RecordingSender};
use promo_core::domain::{Promotion, SubscriptionPlan};
use promo_core::ports::AccountStore;
use uuid::Uuid;

fn plan(weekly_allowed_sends: i32) -> SubscriptionPlan {
    SubscriptionPlan {
        id: Uuid::new_v4(),
        name: "Gold".to_string(),
        weekly_allowed_sends,
        price: 50.0,
    }
}

fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 2, 12, 0, 0).unwrap()
}

fn promotion(creator_id: Uuid, scheduled_time: Option<DateTime<Utc>>) -> Promotion {
    Promotion {
        id: Uuid::new_v4(),
        title: "Weekend deal".to_string(),
        description: "Half price until Sunday".to_string(),
        image_url: None,
        creator_id,
        scheduled_time,
        recurring: false,
        recurrence_day_of_week: None,
        recurrence_end_date: None,
        next_recurrence: None,
        total_occurrences: 0,
    }
}

fn recurring_promotion(
    creator_id: Uuid,
    scheduled_time: DateTime<Utc>,
    end_date: Option<DateTime<Utc>>,
) -> Promotion {
    let mut promo = promotion(creator_id, Some(scheduled_time));
    promo.recurring = true;
    promo.recurrence_day_of_week = Some(1);
    promo.recurrence_end_date = end_date;
    promo.next_recurrence = Some(scheduled_time);
    promo
}

struct Harness {
    store: Arc<InMemoryStore>,
    sender: Arc<RecordingSender>,
    engine: DispatchEngine,
    account_id: Uuid,
}

fn harness(remaining_sends: i32) -> Harness {
    let store = Arc::new(InMemoryStore::new());
    let sender = Arc::new(RecordingSender::new());
    let account = InMemoryStore::account("creator@example.com", Some(plan(10)), remaining_sends);
    let account_id = account.id;
    store.add_account(account);

    let engine = DispatchEngine::new(store.clone(), store.clone(), sender.clone());
    Harness {
        store,
        sender,
        engine,
        account_id,
    }
}

async fn remaining(h: &Harness) -> i32 {
    h.store
        .find_by_id(h.account_id)
        .await
        .unwrap()
        .remaining_weekly_sends
}

#[tokio::test]
async fn send_now_promotion_delivers_all_targets_and_consumes_quota() {
    let h = harness(5);
    let first = h.store.add_target("Group A", "a@g.us");
    let second = h.store.add_target("Group B", "b@g.us");

    // scheduled_time = None means "dispatch on the very next tick".
    let promo = promotion(h.account_id, None);
    let promo_id = promo.id;
    h.store.add_promotion(promo, &[first.id, second.id]);

    let now = base_time();
    let stats = h.engine.tick(now).await;
    assert_eq!(stats.promotions, 1);
    assert_eq!(stats.sent, 2);
    assert_eq!(stats.failed, 0);

    let links = h.store.links_of(promo_id);
    assert!(links.iter().all(|l| l.sent && l.sent_time == Some(now)));
    assert_eq!(remaining(&h).await, 3);

    // Delivery attempts follow stable insertion order.
    assert_eq!(h.sender.calls(), vec!["a@g.us", "b@g.us"]);
}

#[tokio::test]
async fn future_promotion_is_not_touched() {
    let h = harness(5);
    let target = h.store.add_target("Group A", "a@g.us");
    let promo = promotion(h.account_id, Some(base_time() + Duration::hours(2)));
    h.store.add_promotion(promo, &[target.id]);

    let stats = h.engine.tick(base_time()).await;
    assert_eq!(stats.promotions, 0);
    assert_eq!(h.sender.call_count(), 0);
    assert_eq!(remaining(&h).await, 5);
}

#[tokio::test]
async fn partial_failure_keeps_failed_target_queued() {
    let h = harness(10);
    let first = h.store.add_target("Group 1", "one@g.us");
    let second = h.store.add_target("Group 2", "two@g.us");
    let third = h.store.add_target("Group 3", "three@g.us");
    h.sender.fail_for("two@g.us");

    let promo = promotion(h.account_id, None);
    let promo_id = promo.id;
    h.store.add_promotion(promo, &[first.id, second.id, third.id]);

    let now = base_time();
    let stats = h.engine.tick(now).await;
    assert_eq!(stats.sent, 2);
    assert_eq!(stats.failed, 1);

    let links = h.store.links_of(promo_id);
    assert!(links[0].sent && links[0].sent_time == Some(now));
    assert!(!links[1].sent && links[1].sent_time.is_none());
    assert!(links[2].sent && links[2].sent_time == Some(now));
    assert_eq!(remaining(&h).await, 8);

    // The next tick retries only the failed target.
    h.sender.recover("two@g.us");
    let later = now + Duration::minutes(1);
    let stats = h.engine.tick(later).await;
    assert_eq!(stats.sent, 1);
    assert_eq!(stats.failed, 0);

    let links = h.store.links_of(promo_id);
    assert!(links.iter().all(|l| l.sent));
    assert_eq!(links[1].sent_time, Some(later));
    // Earlier deliveries keep their original timestamps.
    assert_eq!(links[0].sent_time, Some(now));
    assert_eq!(remaining(&h).await, 7);
}

#[tokio::test]
async fn delivery_stops_when_quota_runs_out_mid_loop() {
    let h = harness(1);
    let first = h.store.add_target("Group 1", "one@g.us");
    let second = h.store.add_target("Group 2", "two@g.us");
    let third = h.store.add_target("Group 3", "three@g.us");

    let promo = promotion(h.account_id, None);
    let promo_id = promo.id;
    h.store.add_promotion(promo, &[first.id, second.id, third.id]);

    let stats = h.engine.tick(base_time()).await;
    assert_eq!(stats.sent, 1);
    assert_eq!(h.sender.call_count(), 1);

    let links = h.store.links_of(promo_id);
    assert!(links[0].sent);
    assert!(!links[1].sent && !links[2].sent);
    // Quota never goes negative.
    assert_eq!(remaining(&h).await, 0);
}

#[tokio::test]
async fn exhausted_quota_reschedules_recurring_promotion_without_sending() {
    let h = harness(0);
    let target = h.store.add_target("Group A", "a@g.us");

    let scheduled = base_time() - Duration::hours(1);
    let promo = recurring_promotion(h.account_id, scheduled, None);
    let promo_id = promo.id;
    h.store.add_promotion(promo, &[target.id]);

    let stats = h.engine.tick(base_time()).await;
    assert_eq!(stats.promotions, 1);
    assert_eq!(stats.sent, 0);
    assert_eq!(h.sender.call_count(), 0);

    // Rescheduled rather than retried every tick; targets untouched.
    let promo = h.store.promotion(promo_id).unwrap();
    assert!(promo.recurring);
    assert_eq!(promo.next_recurrence, Some(scheduled + Duration::days(7)));
    assert!(h.store.links_of(promo_id).iter().all(|l| !l.sent));
}

#[tokio::test]
async fn exhausted_quota_leaves_non_recurring_promotion_due() {
    let h = harness(0);
    let target = h.store.add_target("Group A", "a@g.us");
    let promo = promotion(h.account_id, None);
    let promo_id = promo.id;
    h.store.add_promotion(promo, &[target.id]);

    h.engine.tick(base_time()).await;
    assert_eq!(h.sender.call_count(), 0);
    assert!(h.store.links_of(promo_id).iter().all(|l| !l.sent));

    // Once the quota comes back, the still-due promotion goes out.
    let mut account = h.store.find_by_id(h.account_id).await.unwrap();
    account.remaining_weekly_sends = 3;
    h.store.save(&account).await.unwrap();

    let stats = h.engine.tick(base_time() + Duration::minutes(1)).await;
    assert_eq!(stats.sent, 1);
}

#[tokio::test]
async fn full_delivery_rearms_recurring_promotion() {
    let h = harness(10);
    let target = h.store.add_target("Group A", "a@g.us");

    let scheduled = base_time();
    let promo = recurring_promotion(h.account_id, scheduled, None);
    let promo_id = promo.id;
    h.store.add_promotion(promo, &[target.id]);

    let stats = h.engine.tick(scheduled).await;
    assert_eq!(stats.sent, 1);

    let promo = h.store.promotion(promo_id).unwrap();
    assert!(promo.recurring);
    assert_eq!(promo.total_occurrences, 1);
    assert_eq!(promo.next_recurrence, Some(scheduled + Duration::days(7)));

    // Delivery records are rearmed for the next cycle.
    let links = h.store.links_of(promo_id);
    assert!(links.iter().all(|l| !l.sent && l.sent_time.is_none()));
}

#[tokio::test]
async fn recurrence_terminates_past_its_end_date() {
    let h = harness(10);
    let target = h.store.add_target("Group A", "a@g.us");

    // scheduled at T with end date T+10d: the T+7d cycle fires, advancing
    // again would land on T+14d and ends recurrence.
    let scheduled = base_time();
    let promo = recurring_promotion(
        h.account_id,
        scheduled,
        Some(scheduled + Duration::days(10)),
    );
    let promo_id = promo.id;
    h.store.add_promotion(promo, &[target.id]);

    h.engine.tick(scheduled).await;
    let promo = h.store.promotion(promo_id).unwrap();
    assert!(promo.recurring);
    assert_eq!(promo.next_recurrence, Some(scheduled + Duration::days(7)));
    assert_eq!(promo.total_occurrences, 1);

    // Not due again until the next cycle arrives.
    let stats = h.engine.tick(scheduled + Duration::days(1)).await;
    assert_eq!(stats.sent, 0);

    let stats = h.engine.tick(scheduled + Duration::days(7)).await;
    assert_eq!(stats.sent, 1);

    let promo = h.store.promotion(promo_id).unwrap();
    assert!(!promo.recurring);
    assert!(promo.next_recurrence.is_none());
    assert_eq!(promo.total_occurrences, 2);

    // Terminal fully-delivered state: the links stay sent.
    assert!(h.store.links_of(promo_id).iter().all(|l| l.sent));
}

#[tokio::test]
async fn tick_is_idempotent_for_fully_delivered_promotions() {
    let h = harness(10);
    let target = h.store.add_target("Group A", "a@g.us");
    let promo = promotion(h.account_id, None);
    let promo_id = promo.id;
    h.store.add_promotion(promo, &[target.id]);

    h.engine.tick(base_time()).await;
    assert_eq!(h.sender.call_count(), 1);
    let quota_after = remaining(&h).await;
    let links_after = h.store.links_of(promo_id);

    // Re-running the tick performs zero sends and zero state changes.
    let stats = h.engine.tick(base_time() + Duration::minutes(5)).await;
    assert_eq!(stats.promotions, 0);
    assert_eq!(h.sender.call_count(), 1);
    assert_eq!(remaining(&h).await, quota_after);

    let links = h.store.links_of(promo_id);
    assert_eq!(links.len(), links_after.len());
    assert!(links
        .iter()
        .zip(&links_after)
        .all(|(a, b)| a.sent == b.sent && a.sent_time == b.sent_time));
}

#[tokio::test]
async fn first_occurrence_of_a_recurring_promotion_is_processed_once() {
    let h = harness(10);
    let target = h.store.add_target("Group A", "a@g.us");

    // Creation initializes next_recurrence to the first fire instant, so the
    // first cycle is driven by the recurring due query and delivered once.
    let scheduled = base_time() - Duration::minutes(1);
    let promo = recurring_promotion(h.account_id, scheduled, None);
    h.store.add_promotion(promo, &[target.id]);

    let stats = h.engine.tick(base_time()).await;
    assert_eq!(stats.promotions, 1);
    assert_eq!(h.sender.call_count(), 1);
    assert_eq!(remaining(&h).await, 9);
}

#[tokio::test]
async fn failure_in_one_promotion_does_not_block_the_rest_of_the_tick() {
    let h = harness(10);

    // First promotion references a target the store cannot resolve, which
    // surfaces as a store error for that promotion only.
    let broken = promotion(h.account_id, None);
    h.store.add_promotion(broken, &[Uuid::new_v4()]);

    let target = h.store.add_target("Group A", "a@g.us");
    let healthy = promotion(h.account_id, None);
    let healthy_id = healthy.id;
    h.store.add_promotion(healthy, &[target.id]);

    let stats = h.engine.tick(base_time()).await;
    assert_eq!(stats.promotions, 2);
    assert_eq!(stats.sent, 1);
    assert!(h.store.links_of(healthy_id).iter().all(|l| l.sent));
}

#[tokio::test]
async fn sends_between_resets_never_exceed_the_plan_ceiling() {
    let h = harness(3);
    let targets: Vec<_> = (0..6)
        .map(|i| h.store.add_target(&format!("Group {i}"), &format!("{i}@g.us")))
        .collect();

    let promo = promotion(h.account_id, None);
    let promo_id = promo.id;
    let target_ids: Vec<_> = targets.iter().map(|t| t.id).collect();
    h.store.add_promotion(promo, &target_ids);

    // However many ticks run, only three sends ever go out.
    for minute in 0..4 {
        h.engine.tick(base_time() + Duration::minutes(minute)).await;
    }
    assert_eq!(h.sender.call_count(), 3);
    assert_eq!(remaining(&h).await, 0);
    assert_eq!(
        h.store.links_of(promo_id).iter().filter(|l| l.sent).count(),
        3
    );
}
