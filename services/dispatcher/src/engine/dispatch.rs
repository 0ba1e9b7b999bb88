//! services/dispatcher/src/engine/dispatch.rs
//!
//! The dispatch engine: one `tick` finds every due promotion, delivers its
//! unsent targets under the creator's weekly quota, and rearms recurring
//! promotions once a cycle is fully delivered.
//!
//! Failure isolation is the design center here. A failed send leaves its
//! delivery record untouched for the next tick; a store error aborts only
//! the promotion being processed, never the whole tick.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use promo_core::domain::{fully_sent, Promotion};
use promo_core::ports::{AccountStore, MessageSender, PortResult, PromotionStore};
use tracing::{error, info, warn};

use crate::engine::quota::QuotaManager;

/// Counters for one dispatch tick, used for logging.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TickStats {
    /// Due promotions that were processed (successfully or not).
    pub promotions: usize,
    /// Messages the gateway accepted.
    pub sent: usize,
    /// Delivery attempts the gateway rejected; these retry next tick.
    pub failed: usize,
}

/// The outcome of processing a single promotion.
#[derive(Debug, Default, Clone, Copy)]
struct PromotionOutcome {
    sent: usize,
    failed: usize,
}

/// Orchestrates due-promotion delivery over the store, quota, and sender
/// ports.
#[derive(Clone)]
pub struct DispatchEngine {
    promotions: Arc<dyn PromotionStore>,
    accounts: Arc<dyn AccountStore>,
    quota: QuotaManager,
    sender: Arc<dyn MessageSender>,
}

impl DispatchEngine {
    /// Creates a new `DispatchEngine`.
    pub fn new(
        promotions: Arc<dyn PromotionStore>,
        accounts: Arc<dyn AccountStore>,
        sender: Arc<dyn MessageSender>,
    ) -> Self {
        let quota = QuotaManager::new(accounts.clone());
        Self {
            promotions,
            accounts,
            quota,
            sender,
        }
    }

    /// Runs one dispatch tick at the given instant.
    ///
    /// Never returns an error: a failed due-work query logs and yields an
    /// empty tick, and per-promotion failures are contained inside
    /// [`process_promotion`](Self::process_promotion).
    pub async fn tick(&self, now: DateTime<Utc>) -> TickStats {
        let due = match self.due_promotions(now).await {
            Ok(due) => due,
            Err(e) => {
                error!(error = %e, "Failed to query due promotions; skipping tick");
                return TickStats::default();
            }
        };

        if !due.is_empty() {
            info!(count = due.len(), "Found due promotions to dispatch");
        }

        let mut stats = TickStats::default();
        for mut promotion in due {
            stats.promotions += 1;
            match self.process_promotion(&mut promotion, now).await {
                Ok(outcome) => {
                    stats.sent += outcome.sent;
                    stats.failed += outcome.failed;
                }
                Err(e) => {
                    // Isolated per unit of work: the remaining due
                    // promotions still get their chance this tick.
                    error!(
                        promotion_id = %promotion.id,
                        error = %e,
                        "Error processing promotion; it stays due for the next tick"
                    );
                }
            }
        }
        stats
    }

    /// Collects scheduled and recurring due work. The two queries are not
    /// guaranteed disjoint, so the result is de-duplicated by promotion id.
    async fn due_promotions(&self, now: DateTime<Utc>) -> PortResult<Vec<Promotion>> {
        let mut due = self.promotions.find_due_scheduled(now).await?;
        for promotion in self.promotions.find_due_recurring(now).await? {
            if !due.iter().any(|p| p.id == promotion.id) {
                due.push(promotion);
            }
        }
        Ok(due)
    }

    async fn process_promotion(
        &self,
        promotion: &mut Promotion,
        now: DateTime<Utc>,
    ) -> PortResult<PromotionOutcome> {
        let account = self.accounts.find_by_id(promotion.creator_id).await?;
        let mut remaining = QuotaManager::remaining(&account);
        let mut outcome = PromotionOutcome::default();

        if remaining == 0 {
            warn!(
                promotion_id = %promotion.id,
                email = %account.email,
                "Account has no sends available; promotion not sent"
            );

            // A promotion that cannot be delivered this cycle is rescheduled
            // rather than retried every tick.
            if promotion.recurring {
                promotion.advance_recurrence();
                self.promotions.save_promotion(promotion).await?;
                match promotion.next_recurrence {
                    Some(next) => info!(
                        promotion_id = %promotion.id,
                        next_recurrence = %next,
                        "Recurring promotion rescheduled to its next cycle"
                    ),
                    None => info!(
                        promotion_id = %promotion.id,
                        "Recurrence ended while rescheduling past the end date"
                    ),
                }
            }
            return Ok(outcome);
        }

        let mut links = self.promotions.find_promotion_targets(promotion.id).await?;
        let caption = promotion.caption();

        for link in links.iter_mut().filter(|link| !link.sent) {
            if remaining == 0 {
                // Partial delivery is valid; the rest retries next tick or
                // next cycle.
                warn!(
                    promotion_id = %promotion.id,
                    "Quota exhausted mid-delivery; remaining targets stay queued"
                );
                break;
            }

            let target = self.promotions.find_target(link.target_id).await?;
            let delivered = self
                .sender
                .send(&target.identifier, &caption, promotion.image_url.as_deref())
                .await;

            if delivered {
                link.mark_sent(now);
                self.promotions.save_promotion_target(link).await?;
                outcome.sent += 1;

                if self.quota.consume(account.id).await? {
                    remaining -= 1;
                } else {
                    // Another in-process consumer drained the quota first.
                    remaining = 0;
                }

                info!(
                    promotion_id = %promotion.id,
                    target = %target.name,
                    "Promotion delivered to target"
                );
            } else {
                outcome.failed += 1;
                warn!(
                    promotion_id = %promotion.id,
                    target = %target.name,
                    "Send failed; target remains queued for the next tick"
                );
            }
        }

        if fully_sent(&links) && promotion.recurring {
            promotion.advance_recurrence();
            promotion.total_occurrences += 1;

            if promotion.recurring {
                // Rearm every delivery record for the next cycle.
                for link in links.iter_mut() {
                    link.reset_for_next_cycle();
                    self.promotions.save_promotion_target(link).await?;
                }
                info!(
                    promotion_id = %promotion.id,
                    occurrence = promotion.total_occurrences,
                    next_recurrence = ?promotion.next_recurrence,
                    "Cycle fully delivered; promotion rearmed"
                );
            } else {
                info!(
                    promotion_id = %promotion.id,
                    total_occurrences = promotion.total_occurrences,
                    "Recurring promotion ended after its final occurrence"
                );
            }
        }

        // Persist per promotion, not per batch: a crash mid-tick only risks
        // re-processing already-sent targets, which are skipped.
        self.promotions.save_promotion(promotion).await?;
        Ok(outcome)
    }
}
