//! crates/promo_core/src/domain.rs
//!
//! Defines the pure, core data structures for the application.
//! These structs are independent of any database or serialization format.
//! Relationships are expressed as foreign-key ids only; the object graph is
//! always resolved through the store ports, never through back-pointers.

use chrono::{DateTime, Datelike, Utc};
use uuid::Uuid;

use crate::recurrence::{self, Advanced};

/// A marketing message campaign with content, an optional recurrence policy,
/// and a set of delivery targets (tracked separately as [`PromotionTarget`]).
#[derive(Debug, Clone)]
pub struct Promotion {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub image_url: Option<String>,
    /// The account that created this promotion and whose quota its sends consume.
    pub creator_id: Uuid,
    /// First fire instant. `None` means "dispatch on the very next tick".
    pub scheduled_time: Option<DateTime<Utc>>,
    pub recurring: bool,
    /// 1-7, Monday = 1. Informational; the cadence itself is a fixed 7 days.
    pub recurrence_day_of_week: Option<u8>,
    /// Optional upper bound on recurrence.
    pub recurrence_end_date: Option<DateTime<Utc>>,
    /// Next fire instant while `recurring` is true.
    pub next_recurrence: Option<DateTime<Utc>>,
    /// Count of completed delivery cycles.
    pub total_occurrences: u32,
}

impl Promotion {
    /// Renders the message caption sent to every target: the title in bold
    /// (WhatsApp markup) followed by the description, skipping empty parts.
    pub fn caption(&self) -> String {
        let mut caption = String::new();
        if !self.title.is_empty() {
            caption.push('*');
            caption.push_str(&self.title);
            caption.push_str("*\n\n");
        }
        if !self.description.is_empty() {
            caption.push_str(&self.description);
        }
        caption
    }

    /// Advances this promotion to its next weekly occurrence.
    ///
    /// The reference instant is `next_recurrence`, falling back to
    /// `scheduled_time`. If the advanced instant would pass
    /// `recurrence_end_date`, recurrence terminates: `recurring` becomes
    /// false and `next_recurrence` is cleared. Calling this on a
    /// non-recurring promotion is a no-op.
    pub fn advance_recurrence(&mut self) {
        if !self.recurring {
            return;
        }

        let Some(reference) = self.next_recurrence.or(self.scheduled_time) else {
            // Invariant violation (recurring without any reference instant):
            // terminate deterministically rather than guessing a start.
            self.recurring = false;
            self.next_recurrence = None;
            return;
        };

        match recurrence::advance(reference, self.recurrence_end_date) {
            Advanced::Continues(next) => self.next_recurrence = Some(next),
            Advanced::Ended => {
                self.recurring = false;
                self.next_recurrence = None;
            }
        }
    }
}

/// The per-(promotion, target) delivery record tracking whether and when
/// that specific send succeeded.
#[derive(Debug, Clone)]
pub struct PromotionTarget {
    pub id: Uuid,
    pub promotion_id: Uuid,
    pub target_id: Uuid,
    pub sent: bool,
    pub sent_time: Option<DateTime<Utc>>,
}

impl PromotionTarget {
    /// Creates a fresh, unsent delivery record linking a promotion to a target.
    pub fn new(promotion_id: Uuid, target_id: Uuid) -> Self {
        Self {
            id: Uuid::new_v4(),
            promotion_id,
            target_id,
            sent: false,
            sent_time: None,
        }
    }

    /// Flips the record to delivered. Happens exactly once per delivery cycle.
    pub fn mark_sent(&mut self, now: DateTime<Utc>) {
        self.sent = true;
        self.sent_time = Some(now);
    }

    /// Rearms the record for the next cycle of a recurring promotion.
    pub fn reset_for_next_cycle(&mut self) {
        self.sent = false;
        self.sent_time = None;
    }
}

/// Returns true when every delivery record is sent. An empty set is never
/// considered fully sent (a promotion owns at least one target by invariant).
pub fn fully_sent(targets: &[PromotionTarget]) -> bool {
    !targets.is_empty() && targets.iter().all(|t| t.sent)
}

/// The kind of messaging destination a [`Target`] points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetKind {
    Group,
    Channel,
    Newsletter,
}

impl TargetKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TargetKind::Group => "group",
            TargetKind::Channel => "channel",
            TargetKind::Newsletter => "newsletter",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "group" => Some(TargetKind::Group),
            "channel" => Some(TargetKind::Channel),
            "newsletter" => Some(TargetKind::Newsletter),
            _ => None,
        }
    }
}

/// A messaging destination, optionally scoped to one account.
#[derive(Debug, Clone)]
pub struct Target {
    pub id: Uuid,
    pub name: String,
    /// Opaque destination identifier understood by the messaging transport,
    /// e.g. "120363397285478228@g.us".
    pub identifier: String,
    pub kind: TargetKind,
    pub description: Option<String>,
    /// `None` marks a global target visible to all accounts.
    pub owner_id: Option<Uuid>,
}

impl Target {
    pub fn is_global(&self) -> bool {
        self.owner_id.is_none()
    }
}

/// An account referenced (never owned) by promotions. Carries the weekly
/// send quota state.
#[derive(Debug, Clone)]
pub struct Account {
    pub id: Uuid,
    pub email: String,
    pub nickname: String,
    /// `None` means no active subscription; the quota stays frozen at reset.
    pub plan: Option<SubscriptionPlan>,
    pub remaining_weekly_sends: i32,
    pub last_reset_date: Option<DateTime<Utc>>,
}

/// A subscription plan. Its `weekly_allowed_sends` is the quota reset ceiling.
#[derive(Debug, Clone)]
pub struct SubscriptionPlan {
    pub id: Uuid,
    pub name: String,
    pub weekly_allowed_sends: i32,
    pub price: f64,
}

/// The validated input for creating a promotion.
#[derive(Debug, Clone)]
pub struct NewPromotion {
    pub title: String,
    pub description: String,
    pub image_url: Option<String>,
    /// `None` means "dispatch on the very next tick".
    pub scheduled_time: Option<DateTime<Utc>>,
    pub recurring: bool,
    pub recurrence_day_of_week: Option<u8>,
    pub recurrence_end_date: Option<DateTime<Utc>>,
    /// Requested destination targets; at least one must resolve.
    pub target_ids: Vec<Uuid>,
}

impl NewPromotion {
    /// Builds the domain promotion for this request, initializing the
    /// recurrence fields.
    ///
    /// Recurring promotions start with `next_recurrence` equal to their first
    /// fire instant (`scheduled_time`, or `now` for send-now promotions) and a
    /// `recurrence_day_of_week` defaulted from that instant's weekday. An end
    /// date that is already passed terminates recurrence immediately.
    pub fn into_promotion(self, creator_id: Uuid, now: DateTime<Utc>) -> Promotion {
        let first_fire = self.scheduled_time.unwrap_or(now);

        let mut promotion = Promotion {
            id: Uuid::new_v4(),
            title: self.title,
            description: self.description,
            image_url: self.image_url,
            creator_id,
            scheduled_time: self.scheduled_time,
            recurring: self.recurring,
            recurrence_day_of_week: None,
            recurrence_end_date: self.recurrence_end_date,
            next_recurrence: None,
            total_occurrences: 0,
        };

        if self.recurring {
            promotion.recurrence_day_of_week = self
                .recurrence_day_of_week
                .or(Some(first_fire.weekday().number_from_monday() as u8));
            promotion.next_recurrence = Some(first_fire);

            if let Some(end) = promotion.recurrence_end_date {
                if first_fire > end {
                    promotion.recurring = false;
                    promotion.next_recurrence = None;
                }
            }
        }

        promotion
    }
}
