pub mod dispatch;
pub mod quota;
pub mod scheduler;

// Re-export the engine entry points for the binary and tests.
pub use dispatch::{DispatchEngine, TickStats};
pub use quota::QuotaManager;
pub use scheduler::{next_weekly_reset, run_dispatch_loop, run_quota_reset_loop};
