//! services/dispatcher/src/engine/scheduler.rs
//!
//! The two timers that drive the engine: a fixed-rate dispatch tick and a
//! weekly calendar trigger for the quota reset. Both loops run until the
//! shared shutdown signal flips.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Datelike, Days, Utc};
use tokio::sync::watch;
use tokio::time::{interval, sleep, Instant, MissedTickBehavior};
use tracing::{error, info};

use crate::engine::dispatch::DispatchEngine;
use crate::engine::quota::QuotaManager;

/// The next weekly quota-reset instant strictly after `after`:
/// Monday 00:01:00 UTC, aligned with plan billing weeks.
pub fn next_weekly_reset(after: DateTime<Utc>) -> DateTime<Utc> {
    let days_until_monday = (7 - after.weekday().num_days_from_monday()) % 7;
    let candidate = (after.date_naive() + Days::new(days_until_monday as u64))
        .and_hms_opt(0, 1, 0)
        .expect("00:01:00 is a valid time")
        .and_utc();

    if candidate > after {
        candidate
    } else {
        candidate + chrono::Duration::days(7)
    }
}

/// Runs the dispatch tick at a fixed rate until shutdown.
///
/// Ticks never overlap: each tick is awaited inline, and ticks missed while
/// a slow tick runs are skipped rather than queued.
pub async fn run_dispatch_loop(
    engine: Arc<DispatchEngine>,
    tick_interval: Duration,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    info!(
        interval_secs = tick_interval.as_secs(),
        "Dispatch scheduler started"
    );

    let mut ticker = interval(tick_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let started = Instant::now();
                let stats = engine.tick(Utc::now()).await;
                if stats.promotions > 0 {
                    info!(
                        promotions = stats.promotions,
                        sent = stats.sent,
                        failed = stats.failed,
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        "Dispatch tick complete"
                    );
                }
            }
            _ = shutdown_rx.changed() => {
                if *shutdown_rx.borrow() {
                    info!("Dispatch scheduler shutting down");
                    break;
                }
            }
        }
    }
}

/// Sleeps until each Monday 00:01 UTC and resets all weekly quotas, until
/// shutdown.
pub async fn run_quota_reset_loop(quota: QuotaManager, mut shutdown_rx: watch::Receiver<bool>) {
    loop {
        let next_reset = next_weekly_reset(Utc::now());
        let wait = (next_reset - Utc::now())
            .to_std()
            .unwrap_or(Duration::ZERO);
        info!(next_reset = %next_reset, "Weekly quota reset scheduled");

        tokio::select! {
            _ = sleep(wait) => {
                info!("Running weekly send quota reset");
                match quota.reset_all(Utc::now()).await {
                    Ok(count) => info!(accounts = count, "Weekly send quotas reset"),
                    Err(e) => error!(error = %e, "Weekly quota reset failed"),
                }
            }
            _ = shutdown_rx.changed() => {
                if *shutdown_rx.borrow() {
                    info!("Quota reset scheduler shutting down");
                    break;
                }
            }
        }
    }
}
