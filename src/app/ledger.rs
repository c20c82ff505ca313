//! The `pet_matches` ledger: one row per (lost, found) pair, written through
//! a single transactional upsert so overlapping passes serialize on the row.

use anyhow::{anyhow, Result};
use serde::Serialize;
use sqlx::{Postgres, Row, Transaction};
use time::OffsetDateTime;
use tracing::debug;
use uuid::Uuid;

use crate::app::notifications::NotificationService;
use crate::config::matching::MatchThresholds;
use crate::domain::notification::NewNotification;
use crate::domain::pet_match::MatchStatus;
use crate::domain::report::{FoundReport, LostReport, ReportKind};
use crate::infra::db::Db;

/// The ledger row for a pair as seen under lock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExistingMatch {
    pub id: Uuid,
    pub score: u8,
    pub status: MatchStatus,
    pub notified: bool,
    pub reviewed: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedgerAction {
    /// Below threshold and nothing to dismiss.
    Skip,
    /// Row already reflects this score and status.
    Keep { id: Uuid },
    Dismiss { id: Uuid },
    Insert {
        status: MatchStatus,
        notified: bool,
        notify: bool,
    },
    Update {
        id: Uuid,
        status: MatchStatus,
        notified: bool,
        notify: bool,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum LedgerOutcome {
    Inserted { id: Uuid, notified: bool },
    Updated { id: Uuid, notified: bool },
    Dismissed { id: Uuid },
    Unchanged { id: Uuid },
    BelowThreshold,
    /// The triggering report changed since the pass read it.
    Stale,
    /// The other side of the pair is no longer active.
    CounterpartInactive,
    /// The other side changed since the pass read it; its own pass owns the
    /// fresh score.
    CounterpartChanged,
}

/// The version of the report that triggered a pass. Writes are discarded
/// once the stored report no longer matches it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceVersion {
    pub kind: ReportKind,
    pub report_id: Uuid,
    pub updated_at: OffsetDateTime,
}

/// Decide what the ledger should do with a freshly computed score.
pub fn plan(existing: Option<&ExistingMatch>, score: u8, thresholds: MatchThresholds) -> LedgerAction {
    if score < thresholds.min_match {
        return match existing {
            Some(existing) if existing.status != MatchStatus::Dismissed => {
                LedgerAction::Dismiss { id: existing.id }
            }
            _ => LedgerAction::Skip,
        };
    }

    let crosses_notify = score >= thresholds.notify;

    let Some(existing) = existing else {
        let status = if crosses_notify {
            MatchStatus::Notified
        } else {
            MatchStatus::Pending
        };
        return LedgerAction::Insert {
            status,
            notified: crosses_notify,
            notify: crosses_notify,
        };
    };

    let notify = crosses_notify && !existing.notified;
    let notified = existing.notified || notify;
    let status = if existing.reviewed {
        existing.status
    } else if notified {
        MatchStatus::Notified
    } else {
        MatchStatus::Pending
    };

    if existing.score == score && existing.status == status && existing.notified == notified {
        return LedgerAction::Keep { id: existing.id };
    }

    LedgerAction::Update {
        id: existing.id,
        status,
        notified,
        notify,
    }
}

/// Notification rows for both owners of a newly notified pair.
pub fn match_notifications(lost: &LostReport, found: &FoundReport, score: u8) -> Vec<NewNotification> {
    let species = lost.pet_type.as_db();
    let mut notifications = vec![NewNotification {
        user_id: lost.user_id,
        notification_type: "match".to_string(),
        title: format!("Possible match for {}", lost.pet_name),
        message: format!(
            "A found {} reported near {} looks like {} ({}% match).",
            species, found.found_location, lost.pet_name, score
        ),
        link: Some("/matches".to_string()),
    }];

    if found.user_id != lost.user_id {
        notifications.push(NewNotification {
            user_id: found.user_id,
            notification_type: "match".to_string(),
            title: "Your found pet may have an owner".to_string(),
            message: format!(
                "The {} you found near {} matches a lost report for {} ({}% match).",
                species, found.found_location, lost.pet_name, score
            ),
            link: Some("/matches".to_string()),
        });
    }

    notifications
}

#[derive(Clone)]
pub struct MatchLedger {
    db: Db,
    thresholds: MatchThresholds,
}

impl MatchLedger {
    pub fn new(db: Db, thresholds: MatchThresholds) -> Self {
        Self { db, thresholds }
    }

    pub async fn upsert(
        &self,
        lost: &LostReport,
        found: &FoundReport,
        score: u8,
        source: Option<&SourceVersion>,
    ) -> Result<LedgerOutcome> {
        let mut tx = self.db.pool().begin().await?;

        if let Some(source) = source {
            let outcome = match pair_state(&mut tx, source, lost, found).await? {
                PairState::Current => None,
                PairState::SourceChanged => Some(LedgerOutcome::Stale),
                PairState::CounterpartInactive => Some(LedgerOutcome::CounterpartInactive),
                PairState::CounterpartChanged => Some(LedgerOutcome::CounterpartChanged),
            };
            if let Some(outcome) = outcome {
                tx.rollback().await?;
                debug!(
                    lost_report_id = %lost.id,
                    found_report_id = %found.id,
                    outcome = ?outcome,
                    "discarding match write"
                );
                return Ok(outcome);
            }
        }

        let existing = select_for_update(&mut tx, lost.id, found.id).await?;
        let action = plan(existing.as_ref(), score, self.thresholds);

        let outcome = match action {
            LedgerAction::Insert {
                status,
                notified,
                notify,
            } => match insert(&mut tx, lost.id, found.id, score, status, notified).await? {
                Some(id) => {
                    if notify {
                        notify_owners(&mut tx, lost, found, score).await?;
                    }
                    LedgerOutcome::Inserted { id, notified: notify }
                }
                None => {
                    // A concurrent pass inserted the pair first; take the update path.
                    let existing = select_for_update(&mut tx, lost.id, found.id)
                        .await?
                        .ok_or_else(|| anyhow!("match row vanished after insert conflict"))?;
                    let action = plan(Some(&existing), score, self.thresholds);
                    self.apply_existing(&mut tx, action, lost, found, score).await?
                }
            },
            action => self.apply_existing(&mut tx, action, lost, found, score).await?,
        };

        tx.commit().await?;
        Ok(outcome)
    }

    async fn apply_existing(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        action: LedgerAction,
        lost: &LostReport,
        found: &FoundReport,
        score: u8,
    ) -> Result<LedgerOutcome> {
        match action {
            LedgerAction::Skip => Ok(LedgerOutcome::BelowThreshold),
            LedgerAction::Keep { id } => Ok(LedgerOutcome::Unchanged { id }),
            LedgerAction::Dismiss { id } => {
                sqlx::query(
                    "UPDATE pet_matches \
                     SET status = 'dismissed', reviewed_at = NULL, updated_at = now() \
                     WHERE id = $1",
                )
                .bind(id)
                .execute(&mut **tx)
                .await?;
                Ok(LedgerOutcome::Dismissed { id })
            }
            LedgerAction::Update {
                id,
                status,
                notified,
                notify,
            } => {
                sqlx::query(
                    "UPDATE pet_matches \
                     SET match_score = $2, status = $3::match_status, notified = $4, updated_at = now() \
                     WHERE id = $1",
                )
                .bind(id)
                .bind(i32::from(score))
                .bind(status.as_db())
                .bind(notified)
                .execute(&mut **tx)
                .await?;

                if notify {
                    notify_owners(tx, lost, found, score).await?;
                }
                Ok(LedgerOutcome::Updated { id, notified: notify })
            }
            LedgerAction::Insert { .. } => Err(anyhow!("match row exists but plan asked for insert")),
        }
    }

    /// Dismiss every live match backed by the given report. The owner's
    /// review is cleared so the pair can come back if the report does.
    pub async fn dismiss_for_report(&self, kind: ReportKind, report_id: Uuid) -> Result<u64> {
        let query = match kind {
            ReportKind::Lost => {
                "UPDATE pet_matches \
                 SET status = 'dismissed', reviewed_at = NULL, updated_at = now() \
                 WHERE lost_report_id = $1 AND status <> 'dismissed'"
            }
            ReportKind::Found => {
                "UPDATE pet_matches \
                 SET status = 'dismissed', reviewed_at = NULL, updated_at = now() \
                 WHERE found_report_id = $1 AND status <> 'dismissed'"
            }
        };

        let result = sqlx::query(query)
            .bind(report_id)
            .execute(self.db.pool())
            .await?;

        Ok(result.rows_affected())
    }

    /// Dismiss live matches of the given report version whose counterpart
    /// is no longer the same species. Those pairs score zero but never show
    /// up as candidates again.
    pub async fn dismiss_species_mismatches(&self, source: &SourceVersion) -> Result<u64> {
        let query = match source.kind {
            ReportKind::Lost => {
                "UPDATE pet_matches m \
                 SET status = 'dismissed', reviewed_at = NULL, updated_at = now() \
                 FROM lost_reports l, found_reports f \
                 WHERE m.lost_report_id = l.id \
                   AND m.found_report_id = f.id \
                   AND l.id = $1 \
                   AND l.updated_at = $2 \
                   AND m.status <> 'dismissed' \
                   AND l.pet_type <> f.pet_type"
            }
            ReportKind::Found => {
                "UPDATE pet_matches m \
                 SET status = 'dismissed', reviewed_at = NULL, updated_at = now() \
                 FROM lost_reports l, found_reports f \
                 WHERE m.lost_report_id = l.id \
                   AND m.found_report_id = f.id \
                   AND f.id = $1 \
                   AND f.updated_at = $2 \
                   AND m.status <> 'dismissed' \
                   AND l.pet_type <> f.pet_type"
            }
        };

        let result = sqlx::query(query)
            .bind(source.report_id)
            .bind(source.updated_at)
            .execute(self.db.pool())
            .await?;

        Ok(result.rows_affected())
    }

    /// Dismiss live matches whose lost or found report is no longer active,
    /// or whose reports no longer share a species.
    pub async fn dismiss_orphaned(&self) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE pet_matches m \
             SET status = 'dismissed', reviewed_at = NULL, updated_at = now() \
             FROM lost_reports l, found_reports f \
             WHERE m.lost_report_id = l.id \
               AND m.found_report_id = f.id \
               AND m.status <> 'dismissed' \
               AND (l.status <> 'active' OR f.status <> 'active' OR l.pet_type <> f.pet_type)",
        )
        .execute(self.db.pool())
        .await?;

        Ok(result.rows_affected())
    }
}

enum PairState {
    Current,
    SourceChanged,
    CounterpartInactive,
    CounterpartChanged,
}

/// Re-read both reports under a share lock so neither can change until the
/// write commits. The score is only written when both still match the
/// versions it was computed from.
async fn pair_state(
    tx: &mut Transaction<'_, Postgres>,
    source: &SourceVersion,
    lost: &LostReport,
    found: &FoundReport,
) -> Result<PairState> {
    let (source_query, other_query, other_id, other_seen) = match source.kind {
        ReportKind::Lost => (
            "SELECT updated_at, status::text AS status FROM lost_reports WHERE id = $1 FOR SHARE",
            "SELECT updated_at, status::text AS status FROM found_reports WHERE id = $1 FOR SHARE",
            found.id,
            found.updated_at,
        ),
        ReportKind::Found => (
            "SELECT updated_at, status::text AS status FROM found_reports WHERE id = $1 FOR SHARE",
            "SELECT updated_at, status::text AS status FROM lost_reports WHERE id = $1 FOR SHARE",
            lost.id,
            lost.updated_at,
        ),
    };

    let Some(row) = sqlx::query(source_query)
        .bind(source.report_id)
        .fetch_optional(&mut **tx)
        .await?
    else {
        return Ok(PairState::SourceChanged);
    };

    let updated_at: OffsetDateTime = row.get("updated_at");
    let status: String = row.get("status");
    if updated_at != source.updated_at || status != "active" {
        return Ok(PairState::SourceChanged);
    }

    let other = sqlx::query(other_query)
        .bind(other_id)
        .fetch_optional(&mut **tx)
        .await?;

    let Some(other) = other else {
        return Ok(PairState::CounterpartInactive);
    };
    if other.get::<String, _>("status") != "active" {
        return Ok(PairState::CounterpartInactive);
    }
    if other.get::<OffsetDateTime, _>("updated_at") != other_seen {
        return Ok(PairState::CounterpartChanged);
    }
    Ok(PairState::Current)
}

async fn select_for_update(
    tx: &mut Transaction<'_, Postgres>,
    lost_id: Uuid,
    found_id: Uuid,
) -> Result<Option<ExistingMatch>> {
    let row = sqlx::query(
        "SELECT id, match_score, status::text AS status, notified, reviewed_at \
         FROM pet_matches \
         WHERE lost_report_id = $1 AND found_report_id = $2 \
         FOR UPDATE",
    )
    .bind(lost_id)
    .bind(found_id)
    .fetch_optional(&mut **tx)
    .await?;

    let Some(row) = row else {
        return Ok(None);
    };

    let status: String = row.get("status");
    let status = MatchStatus::from_db(&status)
        .ok_or_else(|| anyhow!("unknown match status: {}", status))?;
    let score: i32 = row.get("match_score");
    let reviewed_at: Option<OffsetDateTime> = row.get("reviewed_at");

    Ok(Some(ExistingMatch {
        id: row.get("id"),
        score: score.clamp(0, 100) as u8,
        status,
        notified: row.get("notified"),
        reviewed: reviewed_at.is_some(),
    }))
}

async fn insert(
    tx: &mut Transaction<'_, Postgres>,
    lost_id: Uuid,
    found_id: Uuid,
    score: u8,
    status: MatchStatus,
    notified: bool,
) -> Result<Option<Uuid>> {
    let row = sqlx::query(
        "INSERT INTO pet_matches (lost_report_id, found_report_id, match_score, status, notified) \
         VALUES ($1, $2, $3, $4::match_status, $5) \
         ON CONFLICT ON CONSTRAINT pet_matches_pair_key DO NOTHING \
         RETURNING id",
    )
    .bind(lost_id)
    .bind(found_id)
    .bind(i32::from(score))
    .bind(status.as_db())
    .bind(notified)
    .fetch_optional(&mut **tx)
    .await?;

    Ok(row.map(|row| row.get("id")))
}

async fn notify_owners(
    tx: &mut Transaction<'_, Postgres>,
    lost: &LostReport,
    found: &FoundReport,
    score: u8,
) -> Result<()> {
    for notification in match_notifications(lost, found, score) {
        NotificationService::create_with_tx(&notification, tx).await?;
    }
    Ok(())
}
