use anyhow::Result;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};
use uuid::Uuid;

use crate::app::matcher::{Matcher, ReconcileSummary};
use crate::infra::cache::RedisCache;

const LEASE_KEY: &str = "matching:reconcile:lease";

/// Run the reconciliation sweep every `interval_seconds`. Workers race for a
/// Redis lease each tick so only one of them sweeps per interval.
pub async fn run(matcher: Matcher, cache: RedisCache, interval_seconds: u64) -> Result<()> {
    let holder = Uuid::new_v4().to_string();
    let mut interval = tokio::time::interval(Duration::from_secs(interval_seconds));
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    info!(interval_seconds, "reconciler started");
    loop {
        interval.tick().await;

        // Expires just before the next tick, so one sweep per interval cluster-wide.
        let lease_seconds = interval_seconds.saturating_sub(1).max(1);
        match cache.try_acquire_lease(LEASE_KEY, &holder, lease_seconds).await {
            Ok(true) => {}
            Ok(false) => {
                info!("reconciliation lease held elsewhere, skipping this tick");
                continue;
            }
            Err(err) => {
                warn!(error = ?err, "failed to acquire reconciliation lease, skipping this tick");
                continue;
            }
        }

        if let Err(err) = sweep(&matcher).await {
            warn!(error = ?err, "reconciliation sweep failed");
        }
    }
}

pub async fn sweep(matcher: &Matcher) -> Result<ReconcileSummary> {
    let started = std::time::Instant::now();
    let summary = matcher.reconcile().await?;
    info!(
        elapsed_ms = started.elapsed().as_millis() as u64,
        scanned = summary.reports_scanned,
        "reconciliation sweep done"
    );
    Ok(summary)
}
