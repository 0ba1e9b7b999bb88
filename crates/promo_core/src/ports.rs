//! crates/promo_core/src/ports.rs
//!
//! Defines the service contracts (traits) for the application's core logic.
//! These traits form the boundary of the hexagonal architecture, allowing the
//! dispatch engine to be independent of the concrete database and messaging
//! transport implementations.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::{Account, Promotion, PromotionTarget, Target};

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// A generic error type for all port operations.
/// This abstracts away the specific errors from external services (e.g., database).
#[derive(Debug, thiserror::Error)]
pub enum PortError {
    #[error("Item not found: {0}")]
    NotFound(String),
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

//=========================================================================================
// Service Ports (Traits)
//=========================================================================================

/// Query and update of promotions and their per-target delivery state.
#[async_trait]
pub trait PromotionStore: Send + Sync {
    /// Non-recurring promotions whose fire instant has passed (a missing
    /// `scheduled_time` counts as "next tick") and that still have at least
    /// one unsent delivery record. Recurring promotions are driven by
    /// `next_recurrence` instead, which creation initializes to the first
    /// fire instant.
    async fn find_due_scheduled(&self, now: DateTime<Utc>) -> PortResult<Vec<Promotion>>;

    /// Recurring promotions whose `next_recurrence` has passed. The two due
    /// sets are not guaranteed disjoint; callers must de-duplicate.
    async fn find_due_recurring(&self, now: DateTime<Utc>) -> PortResult<Vec<Promotion>>;

    async fn find_promotion(&self, promotion_id: Uuid) -> PortResult<Promotion>;

    /// The delivery records owned by one promotion, in stable insertion order.
    async fn find_promotion_targets(&self, promotion_id: Uuid)
        -> PortResult<Vec<PromotionTarget>>;

    async fn find_target(&self, target_id: Uuid) -> PortResult<Target>;

    async fn save_promotion(&self, promotion: &Promotion) -> PortResult<()>;

    async fn save_promotion_target(&self, link: &PromotionTarget) -> PortResult<()>;

    /// Persists a new promotion together with one unsent delivery record per
    /// target id, inside a single transaction.
    async fn insert_promotion(&self, promotion: &Promotion, target_ids: &[Uuid])
        -> PortResult<()>;

    /// Deletes a promotion and all of its delivery records inside a single
    /// transaction (application-level cascade).
    async fn delete_promotion(&self, promotion_id: Uuid) -> PortResult<()>;
}

/// Access to accounts and their weekly quota state.
#[async_trait]
pub trait AccountStore: Send + Sync {
    async fn find_by_id(&self, account_id: Uuid) -> PortResult<Account>;

    async fn find_all(&self) -> PortResult<Vec<Account>>;

    async fn save(&self, account: &Account) -> PortResult<()>;

    /// Atomically decrements the account's remaining weekly sends by one.
    /// Returns false (without changing anything) when the quota is already
    /// exhausted. Safe under concurrent in-process callers.
    async fn try_consume_send(&self, account_id: Uuid) -> PortResult<bool>;
}

/// Sends one message to one destination.
#[async_trait]
pub trait MessageSender: Send + Sync {
    /// Delivers `caption` (and optionally an image) to `destination`.
    ///
    /// Returns true only when the transport accepted the message. Any
    /// non-success (HTTP error, timeout, transport exception) is logged by
    /// the implementation and reported as false; it never raises into the
    /// engine's control flow.
    async fn send(&self, destination: &str, caption: &str, image_url: Option<&str>) -> bool;
}
