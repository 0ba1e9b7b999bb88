//! services/dispatcher/src/promotions.rs
//!
//! The promotion lifecycle service: validated creation and deletion on top
//! of the store ports. A creation endpoint (out of scope here) calls these
//! functions and relies on the invariants they enforce.

use chrono::{DateTime, Utc};
use promo_core::domain::{Account, NewPromotion, Promotion};
use promo_core::ports::{PortError, PromotionStore};
use tracing::{info, warn};
use uuid::Uuid;

use crate::engine::QuotaManager;
use crate::error::DispatcherError;

/// Creates a promotion for `account`, enforcing the core invariants:
///
/// - the account needs an active plan and remaining weekly sends;
/// - a `scheduled_time` in the past is rejected; `None` means "next tick";
/// - at least one requested target must exist; unknown target ids are
///   dropped with a warning, and a request with no valid target fails;
/// - recurring promotions start with their recurrence fields initialized
///   (and already-expired end dates terminate recurrence up front).
///
/// The promotion and its unsent delivery records are persisted in a single
/// transaction.
pub async fn create_promotion(
    store: &dyn PromotionStore,
    account: &Account,
    request: NewPromotion,
    now: DateTime<Utc>,
) -> Result<Promotion, DispatcherError> {
    if account.plan.is_none() {
        return Err(DispatcherError::InvalidRequest(
            "Account has no active subscription".to_string(),
        ));
    }
    if QuotaManager::remaining(account) == 0 {
        return Err(DispatcherError::InvalidRequest(
            "Weekly send limit reached".to_string(),
        ));
    }
    if let Some(scheduled) = request.scheduled_time {
        if scheduled < now {
            return Err(DispatcherError::InvalidRequest(
                "Scheduled time is in the past".to_string(),
            ));
        }
    }
    if request.target_ids.is_empty() {
        return Err(DispatcherError::InvalidRequest(
            "At least one target is required".to_string(),
        ));
    }

    let mut valid_target_ids = Vec::with_capacity(request.target_ids.len());
    for target_id in &request.target_ids {
        match store.find_target(*target_id).await {
            Ok(_) => valid_target_ids.push(*target_id),
            Err(PortError::NotFound(_)) => {
                warn!(%target_id, "Dropping unknown target from promotion request");
            }
            Err(e) => return Err(e.into()),
        }
    }
    if valid_target_ids.is_empty() {
        return Err(DispatcherError::InvalidRequest(
            "No valid target provided".to_string(),
        ));
    }

    let promotion = request.into_promotion(account.id, now);
    store.insert_promotion(&promotion, &valid_target_ids).await?;

    info!(
        promotion_id = %promotion.id,
        creator = %account.email,
        targets = valid_target_ids.len(),
        recurring = promotion.recurring,
        "Promotion created"
    );
    Ok(promotion)
}

/// Deletes a promotion and all of its delivery records in one transaction.
/// Only the creator may delete.
pub async fn delete_promotion(
    store: &dyn PromotionStore,
    account: &Account,
    promotion_id: Uuid,
) -> Result<(), DispatcherError> {
    let promotion = store.find_promotion(promotion_id).await?;
    if promotion.creator_id != account.id {
        return Err(DispatcherError::InvalidRequest(
            "Only the creator may delete a promotion".to_string(),
        ));
    }

    store.delete_promotion(promotion_id).await?;
    info!(%promotion_id, "Promotion deleted");
    Ok(())
}
