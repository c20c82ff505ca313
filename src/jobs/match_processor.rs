use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use time::OffsetDateTime;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::app::matcher::{JobOutcome, Matcher};
use crate::domain::report::{Report, ReportKind};
use crate::infra::queue::QueueClient;

/// A report mutation waiting to be matched. `updated_at` is the version the
/// mutation produced; older jobs for the same report are dropped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchJob {
    pub kind: ReportKind,
    pub report_id: Uuid,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl MatchJob {
    pub fn for_report(report: &Report) -> Self {
        Self {
            kind: report.kind(),
            report_id: report.id(),
            updated_at: report.updated_at(),
        }
    }
}

const POLL_WAIT_SECONDS: i32 = 10;
const IDLE_SLEEP_MS: u64 = 200;
const ERROR_BACKOFF_MS: u64 = 1000;

pub async fn run(matcher: Matcher, queue: QueueClient) -> Result<()> {
    info!("match processor started");
    loop {
        match queue.receive_match_job(POLL_WAIT_SECONDS).await {
            Ok(Some(message)) => {
                let job = &message.job;
                match matcher.run_job(job).await {
                    Ok(JobOutcome::Matched(summary)) => {
                        info!(
                            report_id = %job.report_id,
                            candidates = summary.candidates,
                            notified = summary.notified,
                            "match job completed"
                        );
                    }
                    Ok(outcome) => {
                        info!(report_id = %job.report_id, outcome = ?outcome, "match job completed");
                    }
                    Err(err) => {
                        // Left for the reconciliation sweep; redelivery would only repeat the failure.
                        error!(
                            error = ?err,
                            report_id = %job.report_id,
                            kind = ?job.kind,
                            "failed to process match job"
                        );
                    }
                }

                if let Err(err) = queue.delete_message(&message.receipt_handle).await {
                    warn!(error = ?err, "failed to delete queue message");
                }
            }
            Ok(None) => {
                tokio::time::sleep(Duration::from_millis(IDLE_SLEEP_MS)).await;
            }
            Err(err) => {
                warn!(error = ?err, "queue receive failed, backing off");
                tokio::time::sleep(Duration::from_millis(ERROR_BACKOFF_MS)).await;
            }
        }
    }
}
