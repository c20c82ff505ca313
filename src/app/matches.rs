use anyhow::{anyhow, Result};
use serde::Serialize;
use sqlx::postgres::PgRow;
use sqlx::Row;
use uuid::Uuid;

use crate::domain::pet_match::{MatchStatus, MatchView, PetMatch};
use crate::domain::report::{PetType, ReportStatus, ReportSummary};
use crate::infra::db::Db;

/// How many matches an anonymous visitor, or a user with none of their own, sees.
pub const GLOBAL_TOP_MATCHES: i64 = 10;

const MATCH_VIEW_SELECT: &str = "SELECT m.id, m.lost_report_id, m.found_report_id, m.match_score, \
            m.status::text AS status, m.notified, m.reviewed_at, m.created_at, m.updated_at, \
            l.user_id AS lost_user_id, l.pet_name AS lost_pet_name, l.pet_type::text AS lost_pet_type, \
            l.last_seen_location, l.last_seen_date, l.images AS lost_images, l.status::text AS lost_status, \
            f.user_id AS found_user_id, f.pet_name AS found_pet_name, f.pet_type::text AS found_pet_type, \
            f.found_location, f.found_date, f.images AS found_images, f.status::text AS found_status \
     FROM pet_matches m \
     JOIN lost_reports l ON l.id = m.lost_report_id \
     JOIN found_reports f ON f.id = m.found_report_id";

const MATCH_COLUMNS: &str = "id, lost_report_id, found_report_id, match_score, status::text AS status, \
     notified, reviewed_at, created_at, updated_at";

#[derive(Debug, Clone, Default, Serialize)]
pub struct MatchCounts {
    pub pending: i64,
    pub notified: i64,
    pub confirmed: i64,
    pub dismissed: i64,
}

#[derive(Clone)]
pub struct MatchService {
    db: Db,
}

impl MatchService {
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    /// Best matches first. A signed-in viewer sees the matches on their own
    /// reports; when they have none, or nobody is signed in, the global top list.
    pub async fn list_for_viewer(&self, viewer: Option<Uuid>, limit: i64) -> Result<Vec<MatchView>> {
        if let Some(user_id) = viewer {
            let own = self.list_for_user(user_id, limit).await?;
            if !own.is_empty() {
                return Ok(own);
            }
        }
        self.list_top(GLOBAL_TOP_MATCHES).await
    }

    pub async fn list_for_user(&self, user_id: Uuid, limit: i64) -> Result<Vec<MatchView>> {
        let query = format!(
            "{} \
             WHERE m.status <> 'dismissed' AND (l.user_id = $1 OR f.user_id = $1) \
             ORDER BY m.match_score DESC, m.created_at DESC, m.id DESC \
             LIMIT $2",
            MATCH_VIEW_SELECT
        );
        let rows = sqlx::query(&query)
            .bind(user_id)
            .bind(limit)
            .fetch_all(self.db.pool())
            .await?;

        rows.iter().map(match_view_from_row).collect()
    }

    pub async fn list_top(&self, limit: i64) -> Result<Vec<MatchView>> {
        let query = format!(
            "{} \
             WHERE m.status <> 'dismissed' \
             ORDER BY m.match_score DESC, m.created_at DESC, m.id DESC \
             LIMIT $1",
            MATCH_VIEW_SELECT
        );
        let rows = sqlx::query(&query)
            .bind(limit)
            .fetch_all(self.db.pool())
            .await?;

        rows.iter().map(match_view_from_row).collect()
    }

    pub async fn get(&self, match_id: Uuid) -> Result<Option<MatchView>> {
        let query = format!("{} WHERE m.id = $1", MATCH_VIEW_SELECT);
        let row = sqlx::query(&query)
            .bind(match_id)
            .fetch_optional(self.db.pool())
            .await?;

        row.as_ref().map(match_view_from_row).transpose()
    }

    pub async fn get_pair(&self, lost_report_id: Uuid, found_report_id: Uuid) -> Result<Option<PetMatch>> {
        let query = format!(
            "SELECT {} FROM pet_matches WHERE lost_report_id = $1 AND found_report_id = $2",
            MATCH_COLUMNS
        );
        let row = sqlx::query(&query)
            .bind(lost_report_id)
            .bind(found_report_id)
            .fetch_optional(self.db.pool())
            .await?;

        row.as_ref().map(pet_match_from_row).transpose()
    }

    /// Record an owner's decision on a match. Only owners of either report
    /// may review; anyone else gets `None`.
    pub async fn review(
        &self,
        match_id: Uuid,
        reviewer_id: Uuid,
        status: MatchStatus,
    ) -> Result<Option<PetMatch>> {
        if !matches!(status, MatchStatus::Confirmed | MatchStatus::Dismissed) {
            return Err(anyhow!("matches can only be confirmed or dismissed"));
        }

        let row = sqlx::query(
            "UPDATE pet_matches m \
             SET status = $3::match_status, reviewed_at = now(), updated_at = now() \
             FROM lost_reports l, found_reports f \
             WHERE m.id = $1 \
               AND l.id = m.lost_report_id \
               AND f.id = m.found_report_id \
               AND (l.user_id = $2 OR f.user_id = $2) \
             RETURNING m.id, m.lost_report_id, m.found_report_id, m.match_score, \
                       m.status::text AS status, m.notified, m.reviewed_at, m.created_at, m.updated_at",
        )
        .bind(match_id)
        .bind(reviewer_id)
        .bind(status.as_db())
        .fetch_optional(self.db.pool())
        .await?;

        row.as_ref().map(pet_match_from_row).transpose()
    }

    pub async fn counts(&self) -> Result<MatchCounts> {
        let rows = sqlx::query(
            "SELECT status::text AS status, COUNT(*) AS count FROM pet_matches GROUP BY status",
        )
        .fetch_all(self.db.pool())
        .await?;

        let mut counts = MatchCounts::default();
        for row in rows {
            let status: String = row.get("status");
            let count: i64 = row.get("count");
            match MatchStatus::from_db(&status) {
                Some(MatchStatus::Pending) => counts.pending = count,
                Some(MatchStatus::Notified) => counts.notified = count,
                Some(MatchStatus::Confirmed) => counts.confirmed = count,
                Some(MatchStatus::Dismissed) => counts.dismissed = count,
                None => return Err(anyhow!("unknown match status: {}", status)),
            }
        }
        Ok(counts)
    }
}

fn pet_match_from_row(row: &PgRow) -> Result<PetMatch> {
    let status: String = row.get("status");
    Ok(PetMatch {
        id: row.get("id"),
        lost_report_id: row.get("lost_report_id"),
        found_report_id: row.get("found_report_id"),
        match_score: row.get("match_score"),
        status: MatchStatus::from_db(&status)
            .ok_or_else(|| anyhow!("unknown match status: {}", status))?,
        notified: row.get("notified"),
        reviewed_at: row.get("reviewed_at"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

fn match_view_from_row(row: &PgRow) -> Result<MatchView> {
    let pet_match = pet_match_from_row(row)?;

    let lost_images: Vec<String> = row.get("lost_images");
    let lost_report = ReportSummary {
        id: pet_match.lost_report_id,
        user_id: row.get("lost_user_id"),
        pet_name: Some(row.get("lost_pet_name")),
        pet_type: parse_pet_type(row.get("lost_pet_type"))?,
        location: row.get("last_seen_location"),
        date: row.get("last_seen_date"),
        image_url: lost_images.into_iter().next(),
        status: parse_report_status(row.get("lost_status"))?,
    };

    let found_images: Vec<String> = row.get("found_images");
    let found_report = ReportSummary {
        id: pet_match.found_report_id,
        user_id: row.get("found_user_id"),
        pet_name: row.get("found_pet_name"),
        pet_type: parse_pet_type(row.get("found_pet_type"))?,
        location: row.get("found_location"),
        date: row.get("found_date"),
        image_url: found_images.into_iter().next(),
        status: parse_report_status(row.get("found_status"))?,
    };

    Ok(MatchView {
        pet_match,
        lost_report,
        found_report,
    })
}

fn parse_pet_type(value: String) -> Result<PetType> {
    PetType::from_db(&value).ok_or_else(|| anyhow!("unknown pet type: {}", value))
}

fn parse_report_status(value: String) -> Result<ReportStatus> {
    ReportStatus::from_db(&value).ok_or_else(|| anyhow!("unknown report status: {}", value))
}
