pub mod domain;
pub mod ports;
pub mod recurrence;

pub use domain::{
    fully_sent, Account, NewPromotion, Promotion, PromotionTarget, SubscriptionPlan, Target,
    TargetKind,
};
pub use ports::{AccountStore, MessageSender, PortError, PortResult, PromotionStore};
pub use recurrence::Advanced;
