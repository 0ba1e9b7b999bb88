//! services/dispatcher/src/adapters/db.rs
//!
//! This module contains the database adapter, which is the concrete
//! implementation of the `PromotionStore` and `AccountStore` ports from the
//! `core` crate. It handles all interactions with the PostgreSQL database
//! using `sqlx`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use promo_core::domain::{
    Account, Promotion, PromotionTarget, SubscriptionPlan, Target, TargetKind,
};
use promo_core::ports::{AccountStore, PortError, PortResult, PromotionStore};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// A database adapter that implements the `PromotionStore` and `AccountStore`
/// ports.
#[derive(Clone)]
pub struct DbAdapter {
    pool: PgPool,
}

impl DbAdapter {
    /// Creates a new `DbAdapter`.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// A helper function to run database migrations at startup.
    pub async fn run_migrations(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }
}

/// Maps a `sqlx` error to a port error, turning missing rows into `NotFound`.
fn map_db_error(what: impl Into<String>) -> impl FnOnce(sqlx::Error) -> PortError {
    let what = what.into();
    move |e| match e {
        sqlx::Error::RowNotFound => PortError::NotFound(what),
        _ => PortError::Unexpected(e.to_string()),
    }
}

//=========================================================================================
// "Impure" Database Record Structs
//=========================================================================================

#[derive(FromRow)]
struct PromotionRecord {
    id: Uuid,
    title: String,
    description: String,
    image_url: Option<String>,
    creator_id: Uuid,
    scheduled_time: Option<DateTime<Utc>>,
    recurring: bool,
    recurrence_day_of_week: Option<i16>,
    recurrence_end_date: Option<DateTime<Utc>>,
    next_recurrence: Option<DateTime<Utc>>,
    total_occurrences: i32,
}

impl PromotionRecord {
    fn to_domain(self) -> Promotion {
        Promotion {
            id: self.id,
            title: self.title,
            description: self.description,
            image_url: self.image_url,
            creator_id: self.creator_id,
            scheduled_time: self.scheduled_time,
            recurring: self.recurring,
            recurrence_day_of_week: self.recurrence_day_of_week.map(|d| d as u8),
            recurrence_end_date: self.recurrence_end_date,
            next_recurrence: self.next_recurrence,
            total_occurrences: self.total_occurrences.max(0) as u32,
        }
    }
}

const PROMOTION_COLUMNS: &str = "id, title, description, image_url, creator_id, scheduled_time, \
     recurring, recurrence_day_of_week, recurrence_end_date, next_recurrence, total_occurrences";

#[derive(FromRow)]
struct PromotionTargetRecord {
    id: Uuid,
    promotion_id: Uuid,
    target_id: Uuid,
    sent: bool,
    sent_time: Option<DateTime<Utc>>,
}

impl PromotionTargetRecord {
    fn to_domain(self) -> PromotionTarget {
        PromotionTarget {
            id: self.id,
            promotion_id: self.promotion_id,
            target_id: self.target_id,
            sent: self.sent,
            sent_time: self.sent_time,
        }
    }
}

#[derive(FromRow)]
struct TargetRecord {
    id: Uuid,
    name: String,
    identifier: String,
    kind: String,
    description: Option<String>,
    owner_id: Option<Uuid>,
}

impl TargetRecord {
    fn to_domain(self) -> PortResult<Target> {
        let kind = TargetKind::parse(&self.kind).ok_or_else(|| {
            PortError::Unexpected(format!("Unknown target kind '{}' in database", self.kind))
        })?;
        Ok(Target {
            id: self.id,
            name: self.name,
            identifier: self.identifier,
            kind,
            description: self.description,
            owner_id: self.owner_id,
        })
    }
}

#[derive(FromRow)]
struct AccountRecord {
    id: Uuid,
    email: String,
    nickname: String,
    remaining_weekly_sends: i32,
    last_reset_date: Option<DateTime<Utc>>,
    plan_id: Option<Uuid>,
    plan_name: Option<String>,
    plan_weekly_allowed_sends: Option<i32>,
    plan_price: Option<f64>,
}

impl AccountRecord {
    fn to_domain(self) -> Account {
        let plan = match (
            self.plan_id,
            self.plan_name,
            self.plan_weekly_allowed_sends,
            self.plan_price,
        ) {
            (Some(id), Some(name), Some(weekly_allowed_sends), Some(price)) => {
                Some(SubscriptionPlan {
                    id,
                    name,
                    weekly_allowed_sends,
                    price,
                })
            }
            _ => None,
        };
        Account {
            id: self.id,
            email: self.email,
            nickname: self.nickname,
            plan,
            remaining_weekly_sends: self.remaining_weekly_sends,
            last_reset_date: self.last_reset_date,
        }
    }
}

const ACCOUNT_QUERY: &str = "SELECT a.id, a.email, a.nickname, a.remaining_weekly_sends, a.last_reset_date, \
            p.id AS plan_id, p.name AS plan_name, \
            p.weekly_allowed_sends AS plan_weekly_allowed_sends, p.price AS plan_price \
     FROM accounts a \
     LEFT JOIN subscription_plans p ON p.id = a.subscription_plan_id";

//=========================================================================================
// `PromotionStore` Trait Implementation
//=========================================================================================

#[async_trait]
impl PromotionStore for DbAdapter {
    async fn find_due_scheduled(&self, now: DateTime<Utc>) -> PortResult<Vec<Promotion>> {
        let sql = format!(
            "SELECT {PROMOTION_COLUMNS} FROM promotions p \
             WHERE p.recurring = false \
               AND (p.scheduled_time IS NULL OR p.scheduled_time <= $1) \
               AND EXISTS (SELECT 1 FROM promotion_targets pt \
                           WHERE pt.promotion_id = p.id AND pt.sent = false) \
             ORDER BY p.scheduled_time ASC NULLS FIRST"
        );
        let records = sqlx::query_as::<_, PromotionRecord>(&sql)
            .bind(now)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| PortError::Unexpected(e.to_string()))?;

        Ok(records.into_iter().map(|r| r.to_domain()).collect())
    }

    async fn find_due_recurring(&self, now: DateTime<Utc>) -> PortResult<Vec<Promotion>> {
        let sql = format!(
            "SELECT {PROMOTION_COLUMNS} FROM promotions p \
             WHERE p.recurring = true AND p.next_recurrence <= $1 \
             ORDER BY p.next_recurrence ASC"
        );
        let records = sqlx::query_as::<_, PromotionRecord>(&sql)
            .bind(now)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| PortError::Unexpected(e.to_string()))?;

        Ok(records.into_iter().map(|r| r.to_domain()).collect())
    }

    async fn find_promotion(&self, promotion_id: Uuid) -> PortResult<Promotion> {
        let sql = format!("SELECT {PROMOTION_COLUMNS} FROM promotions WHERE id = $1");
        let record = sqlx::query_as::<_, PromotionRecord>(&sql)
            .bind(promotion_id)
            .fetch_one(&self.pool)
            .await
            .map_err(map_db_error(format!(
                "Promotion {} not found",
                promotion_id
            )))?;

        Ok(record.to_domain())
    }

    async fn find_promotion_targets(
        &self,
        promotion_id: Uuid,
    ) -> PortResult<Vec<PromotionTarget>> {
        let records = sqlx::query_as::<_, PromotionTargetRecord>(
            "SELECT id, promotion_id, target_id, sent, sent_time \
             FROM promotion_targets WHERE promotion_id = $1 \
             ORDER BY created_at ASC, id ASC",
        )
        .bind(promotion_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| PortError::Unexpected(e.to_string()))?;

        Ok(records.into_iter().map(|r| r.to_domain()).collect())
    }

    async fn find_target(&self, target_id: Uuid) -> PortResult<Target> {
        let record = sqlx::query_as::<_, TargetRecord>(
            "SELECT id, name, identifier, kind, description, owner_id \
             FROM targets WHERE id = $1",
        )
        .bind(target_id)
        .fetch_one(&self.pool)
        .await
        .map_err(map_db_error(format!("Target {} not found", target_id)))?;

        record.to_domain()
    }

    async fn save_promotion(&self, promotion: &Promotion) -> PortResult<()> {
        sqlx::query(
            "UPDATE promotions SET title = $1, description = $2, image_url = $3, \
                 scheduled_time = $4, recurring = $5, recurrence_day_of_week = $6, \
                 recurrence_end_date = $7, next_recurrence = $8, total_occurrences = $9 \
             WHERE id = $10",
        )
        .bind(&promotion.title)
        .bind(&promotion.description)
        .bind(&promotion.image_url)
        .bind(promotion.scheduled_time)
        .bind(promotion.recurring)
        .bind(promotion.recurrence_day_of_week.map(|d| d as i16))
        .bind(promotion.recurrence_end_date)
        .bind(promotion.next_recurrence)
        .bind(promotion.total_occurrences as i32)
        .bind(promotion.id)
        .execute(&self.pool)
        .await
        .map_err(|e| PortError::Unexpected(e.to_string()))?;
        Ok(())
    }

    async fn save_promotion_target(&self, link: &PromotionTarget) -> PortResult<()> {
        sqlx::query("UPDATE promotion_targets SET sent = $1, sent_time = $2 WHERE id = $3")
            .bind(link.sent)
            .bind(link.sent_time)
            .bind(link.id)
            .execute(&self.pool)
            .await
            .map_err(|e| PortError::Unexpected(e.to_string()))?;
        Ok(())
    }

    async fn insert_promotion(
        &self,
        promotion: &Promotion,
        target_ids: &[Uuid],
    ) -> PortResult<()> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| PortError::Unexpected(e.to_string()))?;

        sqlx::query(
            "INSERT INTO promotions (id, title, description, image_url, creator_id, \
                 scheduled_time, recurring, recurrence_day_of_week, recurrence_end_date, \
                 next_recurrence, total_occurrences) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)",
        )
        .bind(promotion.id)
        .bind(&promotion.title)
        .bind(&promotion.description)
        .bind(&promotion.image_url)
        .bind(promotion.creator_id)
        .bind(promotion.scheduled_time)
        .bind(promotion.recurring)
        .bind(promotion.recurrence_day_of_week.map(|d| d as i16))
        .bind(promotion.recurrence_end_date)
        .bind(promotion.next_recurrence)
        .bind(promotion.total_occurrences as i32)
        .execute(&mut *tx)
        .await
        .map_err(|e| PortError::Unexpected(e.to_string()))?;

        for target_id in target_ids {
            sqlx::query(
                "INSERT INTO promotion_targets (id, promotion_id, target_id, sent) \
                 VALUES ($1, $2, $3, false)",
            )
            .bind(Uuid::new_v4())
            .bind(promotion.id)
            .bind(target_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| PortError::Unexpected(e.to_string()))?;
        }

        tx.commit()
            .await
            .map_err(|e| PortError::Unexpected(e.to_string()))?;
        Ok(())
    }

    async fn delete_promotion(&self, promotion_id: Uuid) -> PortResult<()> {
        // Application-level cascade: delivery records go in the same
        // transaction as the promotion row.
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| PortError::Unexpected(e.to_string()))?;

        sqlx::query("DELETE FROM promotion_targets WHERE promotion_id = $1")
            .bind(promotion_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| PortError::Unexpected(e.to_string()))?;

        let result = sqlx::query("DELETE FROM promotions WHERE id = $1")
            .bind(promotion_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| PortError::Unexpected(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(PortError::NotFound(format!(
                "Promotion {} not found",
                promotion_id
            )));
        }

        tx.commit()
            .await
            .map_err(|e| PortError::Unexpected(e.to_string()))?;
        Ok(())
    }
}

//=========================================================================================
// `AccountStore` Trait Implementation
//=========================================================================================

#[async_trait]
impl AccountStore for DbAdapter {
    async fn find_by_id(&self, account_id: Uuid) -> PortResult<Account> {
        let sql = format!("{ACCOUNT_QUERY} WHERE a.id = $1");
        let record = sqlx::query_as::<_, AccountRecord>(&sql)
            .bind(account_id)
            .fetch_one(&self.pool)
            .await
            .map_err(map_db_error(format!("Account {} not found", account_id)))?;

        Ok(record.to_domain())
    }

    async fn find_all(&self) -> PortResult<Vec<Account>> {
        let sql = format!("{ACCOUNT_QUERY} ORDER BY a.email ASC");
        let records = sqlx::query_as::<_, AccountRecord>(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| PortError::Unexpected(e.to_string()))?;

        Ok(records.into_iter().map(|r| r.to_domain()).collect())
    }

    async fn save(&self, account: &Account) -> PortResult<()> {
        // The dispatcher only owns the quota state; identity and plan
        // assignment belong to the account/billing services.
        sqlx::query(
            "UPDATE accounts SET remaining_weekly_sends = $1, last_reset_date = $2 \
             WHERE id = $3",
        )
        .bind(account.remaining_weekly_sends)
        .bind(account.last_reset_date)
        .bind(account.id)
        .execute(&self.pool)
        .await
        .map_err(|e| PortError::Unexpected(e.to_string()))?;
        Ok(())
    }

    async fn try_consume_send(&self, account_id: Uuid) -> PortResult<bool> {
        // Conditional decrement keeps the quota non-negative even under
        // concurrent callers.
        let result = sqlx::query(
            "UPDATE accounts SET remaining_weekly_sends = remaining_weekly_sends - 1 \
             WHERE id = $1 AND remaining_weekly_sends > 0",
        )
        .bind(account_id)
        .execute(&self.pool)
        .await
        .map_err(|e| PortError::Unexpected(e.to_string()))?;

        Ok(result.rows_affected() == 1)
    }
}
