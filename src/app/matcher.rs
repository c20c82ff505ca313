//! Matching passes: candidate selection, scoring and ledger writes for one
//! report, plus the full reconciliation sweep.

use anyhow::{anyhow, Result};
use futures::stream::{self, StreamExt};
use rand::Rng;
use serde::Serialize;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::app::candidates::CandidateSelector;
use crate::app::ledger::{LedgerOutcome, MatchLedger, SourceVersion};
use crate::app::reports::ReportService;
use crate::app::scorer::{self, ScoreBreakdown};
use crate::config::matching::MatchingConfig;
use crate::domain::report::{Report, ReportKind};
use crate::infra::db::Db;
use crate::infra::queue::QueueClient;
use crate::jobs::match_processor::MatchJob;

const RETRY_BASE_MS: u64 = 200;
const RETRY_JITTER_MS: u64 = 300;

#[derive(Debug, Clone, Default, Serialize)]
pub struct PassSummary {
    pub candidates: usize,
    pub inserted: usize,
    pub updated: usize,
    pub dismissed: usize,
    pub unchanged: usize,
    pub below_threshold: usize,
    pub skipped: usize,
    pub notified: usize,
    /// The report changed mid-pass; remaining candidates were left alone.
    pub stale: bool,
}

impl PassSummary {
    fn record(&mut self, outcome: LedgerOutcome) {
        match outcome {
            LedgerOutcome::Inserted { notified, .. } => {
                self.inserted += 1;
                self.notified += usize::from(notified);
            }
            LedgerOutcome::Updated { notified, .. } => {
                self.updated += 1;
                self.notified += usize::from(notified);
            }
            LedgerOutcome::Dismissed { .. } => self.dismissed += 1,
            LedgerOutcome::Unchanged { .. } => self.unchanged += 1,
            LedgerOutcome::BelowThreshold => self.below_threshold += 1,
            LedgerOutcome::CounterpartInactive | LedgerOutcome::CounterpartChanged => {
                self.skipped += 1
            }
            LedgerOutcome::Stale => self.stale = true,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum JobOutcome {
    /// The report no longer exists.
    Missing,
    /// A newer mutation of the report exists and carries its own job.
    Superseded,
    /// The report left `active`; its matches were dismissed.
    Retired { dismissed: u64 },
    Matched(PassSummary),
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ReconcileSummary {
    pub orphaned_dismissed: u64,
    pub reports_scanned: usize,
    pub passes_failed: usize,
    pub inserted: usize,
    pub updated: usize,
    pub dismissed: usize,
    pub notified: usize,
}

#[derive(Clone)]
pub struct Matcher {
    reports: ReportService,
    selector: CandidateSelector,
    ledger: MatchLedger,
    config: MatchingConfig,
}

impl Matcher {
    pub fn new(db: Db, config: MatchingConfig) -> Self {
        Self {
            reports: ReportService::new(db.clone()),
            selector: CandidateSelector::new(db.clone()),
            ledger: MatchLedger::new(db, config.thresholds),
            config,
        }
    }

    fn io_timeout(&self) -> Duration {
        Duration::from_secs(self.config.io_timeout_seconds)
    }

    /// Handle a queued mutation event.
    pub async fn run_job(&self, job: &MatchJob) -> Result<JobOutcome> {
        let report = with_timeout(
            self.io_timeout(),
            "report fetch",
            self.reports.get(job.kind, job.report_id),
        )
        .await?;

        let Some(report) = report else {
            return Ok(JobOutcome::Missing);
        };
        if report.updated_at() > job.updated_at {
            debug!(report_id = %job.report_id, "match job superseded by a newer mutation");
            return Ok(JobOutcome::Superseded);
        }

        self.process(report).await
    }

    /// Bring the ledger in line with the current state of one report.
    pub async fn process_report(&self, kind: ReportKind, report_id: Uuid) -> Result<JobOutcome> {
        let report = with_timeout(
            self.io_timeout(),
            "report fetch",
            self.reports.get(kind, report_id),
        )
        .await?;

        match report {
            Some(report) => self.process(report).await,
            None => Ok(JobOutcome::Missing),
        }
    }

    async fn process(&self, report: Report) -> Result<JobOutcome> {
        if !report.status().is_active() {
            let dismissed = self.retire(report.kind(), report.id()).await?;
            return Ok(JobOutcome::Retired { dismissed });
        }

        let err = match self.run_pass(&report).await {
            Ok(summary) => return Ok(JobOutcome::Matched(summary)),
            Err(err) => err,
        };

        warn!(
            error = ?err,
            report_id = %report.id(),
            kind = ?report.kind(),
            "matching pass failed, retrying once"
        );
        let backoff = RETRY_BASE_MS + rand::thread_rng().gen_range(0..RETRY_JITTER_MS);
        tokio::time::sleep(Duration::from_millis(backoff)).await;

        let fresh = with_timeout(
            self.io_timeout(),
            "report fetch",
            self.reports.get(report.kind(), report.id()),
        )
        .await?;

        match fresh {
            None => Ok(JobOutcome::Missing),
            Some(fresh) if fresh.updated_at() != report.updated_at() => Ok(JobOutcome::Superseded),
            Some(fresh) if !fresh.status().is_active() => {
                let dismissed = self.retire(fresh.kind(), fresh.id()).await?;
                Ok(JobOutcome::Retired { dismissed })
            }
            Some(fresh) => self.run_pass(&fresh).await.map(JobOutcome::Matched),
        }
    }

    /// Score `report` against every candidate and write the results.
    pub async fn run_pass(&self, report: &Report) -> Result<PassSummary> {
        let source = SourceVersion {
            kind: report.kind(),
            report_id: report.id(),
            updated_at: report.updated_at(),
        };

        let candidates = with_timeout(
            self.io_timeout(),
            "candidate fetch",
            self.selector.candidates_for(report),
        )
        .await?;

        let mut summary = PassSummary {
            candidates: candidates.len(),
            ..PassSummary::default()
        };

        for candidate in &candidates {
            let (lost, found) = match (report, candidate) {
                (Report::Lost(lost), Report::Found(found)) => (lost, found),
                (Report::Found(found), Report::Lost(lost)) => (lost, found),
                _ => return Err(anyhow!("candidate of the same kind as its report")),
            };

            let score = scorer::score(lost, found);
            let outcome = with_timeout(
                self.io_timeout(),
                "match write",
                self.ledger.upsert(lost, found, score, Some(&source)),
            )
            .await?;

            summary.record(outcome);
            if summary.stale {
                debug!(report_id = %source.report_id, "report changed during matching pass");
                break;
            }
        }

        if !summary.stale {
            let dismissed = with_timeout(
                self.io_timeout(),
                "species mismatch dismissal",
                self.ledger.dismiss_species_mismatches(&source),
            )
            .await?;
            summary.dismissed += dismissed as usize;
        }

        info!(
            report_id = %source.report_id,
            kind = ?source.kind,
            candidates = summary.candidates,
            inserted = summary.inserted,
            updated = summary.updated,
            dismissed = summary.dismissed,
            notified = summary.notified,
            stale = summary.stale,
            "matching pass finished"
        );

        Ok(summary)
    }

    /// Dismiss every match backed by a report that left `active`.
    pub async fn retire(&self, kind: ReportKind, report_id: Uuid) -> Result<u64> {
        let dismissed = with_timeout(
            self.io_timeout(),
            "match dismissal",
            self.ledger.dismiss_for_report(kind, report_id),
        )
        .await?;

        info!(report_id = %report_id, kind = ?kind, dismissed, "retired report matches");
        Ok(dismissed)
    }

    /// Re-run every active lost report and dismiss matches whose reports
    /// went inactive without a trigger. Safe to run any number of times.
    pub async fn reconcile(&self) -> Result<ReconcileSummary> {
        let orphaned_dismissed = with_timeout(
            self.io_timeout(),
            "orphan dismissal",
            self.ledger.dismiss_orphaned(),
        )
        .await?;
        let report_ids = with_timeout(
            self.io_timeout(),
            "active report scan",
            self.reports.active_ids(ReportKind::Lost),
        )
        .await?;

        let mut summary = ReconcileSummary {
            orphaned_dismissed,
            reports_scanned: report_ids.len(),
            ..ReconcileSummary::default()
        };

        let results: Vec<(Uuid, Result<JobOutcome>)> = stream::iter(report_ids)
            .map(|report_id| async move {
                let outcome = self.process_report(ReportKind::Lost, report_id).await;
                (report_id, outcome)
            })
            .buffer_unordered(self.config.reconcile_concurrency)
            .collect()
            .await;

        for (report_id, result) in results {
            match result {
                Ok(JobOutcome::Matched(pass)) => {
                    summary.inserted += pass.inserted;
                    summary.updated += pass.updated;
                    summary.dismissed += pass.dismissed;
                    summary.notified += pass.notified;
                }
                Ok(JobOutcome::Retired { dismissed }) => summary.dismissed += dismissed as usize,
                Ok(JobOutcome::Missing | JobOutcome::Superseded) => {}
                Err(err) => {
                    summary.passes_failed += 1;
                    error!(error = ?err, report_id = %report_id, "reconciliation pass failed");
                }
            }
        }

        info!(
            scanned = summary.reports_scanned,
            failed = summary.passes_failed,
            orphaned = summary.orphaned_dismissed,
            inserted = summary.inserted,
            notified = summary.notified,
            "reconciliation finished"
        );

        Ok(summary)
    }

    /// Score a pair without touching the ledger.
    pub async fn preview(&self, lost_id: Uuid, found_id: Uuid) -> Result<Option<ScoreBreakdown>> {
        let lost = self.reports.get_lost(lost_id).await?;
        let found = self.reports.get_found(found_id).await?;
        Ok(match (lost, found) {
            (Some(lost), Some(found)) => Some(scorer::breakdown(&lost, &found)),
            _ => None,
        })
    }
}

/// Where report mutations are sent for matching.
#[derive(Clone)]
pub enum MatchDispatcher {
    Queue(QueueClient),
    Inline(Matcher),
}

impl MatchDispatcher {
    /// Hand a mutated report to the matcher. Failures are logged, never
    /// returned: the reconciliation sweep repairs anything dropped here.
    pub async fn dispatch(&self, report: &Report) {
        let job = MatchJob::for_report(report);
        match self {
            Self::Queue(queue) => {
                if let Err(err) = queue.enqueue_match_job(&job).await {
                    warn!(error = ?err, report_id = %job.report_id, "failed to enqueue match job");
                }
            }
            Self::Inline(matcher) => {
                let matcher = matcher.clone();
                tokio::spawn(async move {
                    if let Err(err) = matcher.run_job(&job).await {
                        error!(error = ?err, report_id = %job.report_id, "inline matching failed");
                    }
                });
            }
        }
    }
}

async fn with_timeout<T, F>(duration: Duration, what: &str, future: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    tokio::time::timeout(duration, future)
        .await
        .map_err(|_| anyhow!("{} timed out after {:?}", what, duration))?
}
