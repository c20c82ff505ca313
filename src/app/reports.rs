use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use sqlx::postgres::PgRow;
use sqlx::Row;
use time::{Date, OffsetDateTime};
use uuid::Uuid;

use crate::domain::report::{
    FoundReport, LostReport, PetType, Report, ReportKind, ReportStatus,
};
use crate::infra::db::Db;

pub(crate) const LOST_COLUMNS: &str = "id, user_id, pet_name, pet_type::text AS pet_type, breed, color, age, \
     description, last_seen_location, last_seen_date, contact_phone, contact_email, reward, \
     status::text AS status, images, created_at, updated_at";

pub(crate) const FOUND_COLUMNS: &str = "id, user_id, pet_name, pet_type::text AS pet_type, breed, color, \
     description, found_location, found_date, contact_phone, contact_email, \
     status::text AS status, images, created_at, updated_at";

#[derive(Debug, Clone, Deserialize)]
pub struct NewLostReport {
    pub pet_name: String,
    pub pet_type: PetType,
    pub breed: Option<String>,
    pub color: Option<String>,
    pub age: Option<String>,
    pub description: Option<String>,
    pub last_seen_location: String,
    pub last_seen_date: Date,
    pub contact_phone: String,
    pub contact_email: Option<String>,
    pub reward: Option<String>,
    #[serde(default)]
    pub images: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewFoundReport {
    pub pet_name: Option<String>,
    pub pet_type: PetType,
    pub breed: Option<String>,
    pub color: Option<String>,
    pub description: Option<String>,
    pub found_location: String,
    pub found_date: Date,
    pub contact_phone: String,
    pub contact_email: Option<String>,
    #[serde(default)]
    pub images: Vec<String>,
}

/// Partial update; absent fields keep their stored value.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LostReportPatch {
    pub pet_name: Option<String>,
    pub pet_type: Option<PetType>,
    pub breed: Option<String>,
    pub color: Option<String>,
    pub age: Option<String>,
    pub description: Option<String>,
    pub last_seen_location: Option<String>,
    pub last_seen_date: Option<Date>,
    pub contact_phone: Option<String>,
    pub contact_email: Option<String>,
    pub reward: Option<String>,
    pub images: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct FoundReportPatch {
    pub pet_name: Option<String>,
    pub pet_type: Option<PetType>,
    pub breed: Option<String>,
    pub color: Option<String>,
    pub description: Option<String>,
    pub found_location: Option<String>,
    pub found_date: Option<Date>,
    pub contact_phone: Option<String>,
    pub contact_email: Option<String>,
    pub images: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default)]
pub struct ReportFilter {
    pub pet_type: Option<PetType>,
    pub query: Option<String>,
}

/// A status change together with the status it replaced.
#[derive(Debug, Clone)]
pub struct StatusChange {
    pub report: Report,
    pub previous: ReportStatus,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ReportCounts {
    pub lost_total: i64,
    pub lost_active: i64,
    pub found_total: i64,
    pub found_active: i64,
}

#[derive(Clone)]
pub struct ReportService {
    db: Db,
}

impl ReportService {
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    pub async fn create_lost(&self, user_id: Uuid, input: NewLostReport) -> Result<LostReport> {
        let query = format!(
            "INSERT INTO lost_reports (user_id, pet_name, pet_type, breed, color, age, description, \
                 last_seen_location, last_seen_date, contact_phone, contact_email, reward, images) \
             VALUES ($1, $2, $3::pet_type, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13) \
             RETURNING {}",
            LOST_COLUMNS
        );
        let row = sqlx::query(&query)
            .bind(user_id)
            .bind(input.pet_name)
            .bind(input.pet_type.as_db())
            .bind(input.breed)
            .bind(input.color)
            .bind(input.age)
            .bind(input.description)
            .bind(input.last_seen_location)
            .bind(input.last_seen_date)
            .bind(input.contact_phone)
            .bind(input.contact_email)
            .bind(input.reward)
            .bind(input.images)
            .fetch_one(self.db.pool())
            .await?;

        lost_from_row(&row)
    }

    pub async fn create_found(&self, user_id: Uuid, input: NewFoundReport) -> Result<FoundReport> {
        let query = format!(
            "INSERT INTO found_reports (user_id, pet_name, pet_type, breed, color, description, \
                 found_location, found_date, contact_phone, contact_email, images) \
             VALUES ($1, $2, $3::pet_type, $4, $5, $6, $7, $8, $9, $10, $11) \
             RETURNING {}",
            FOUND_COLUMNS
        );
        let row = sqlx::query(&query)
            .bind(user_id)
            .bind(input.pet_name)
            .bind(input.pet_type.as_db())
            .bind(input.breed)
            .bind(input.color)
            .bind(input.description)
            .bind(input.found_location)
            .bind(input.found_date)
            .bind(input.contact_phone)
            .bind(input.contact_email)
            .bind(input.images)
            .fetch_one(self.db.pool())
            .await?;

        found_from_row(&row)
    }

    pub async fn get(&self, kind: ReportKind, id: Uuid) -> Result<Option<Report>> {
        Ok(match kind {
            ReportKind::Lost => self.get_lost(id).await?.map(Report::Lost),
            ReportKind::Found => self.get_found(id).await?.map(Report::Found),
        })
    }

    pub async fn get_lost(&self, id: Uuid) -> Result<Option<LostReport>> {
        let query = format!("SELECT {} FROM lost_reports WHERE id = $1", LOST_COLUMNS);
        let row = sqlx::query(&query)
            .bind(id)
            .fetch_optional(self.db.pool())
            .await?;

        row.as_ref().map(lost_from_row).transpose()
    }

    pub async fn get_found(&self, id: Uuid) -> Result<Option<FoundReport>> {
        let query = format!("SELECT {} FROM found_reports WHERE id = $1", FOUND_COLUMNS);
        let row = sqlx::query(&query)
            .bind(id)
            .fetch_optional(self.db.pool())
            .await?;

        row.as_ref().map(found_from_row).transpose()
    }

    /// Active reports of one kind, newest first.
    pub async fn list_active(
        &self,
        kind: ReportKind,
        filter: &ReportFilter,
        cursor: Option<(OffsetDateTime, Uuid)>,
        limit: i64,
    ) -> Result<Vec<Report>> {
        let (columns, table, searchable) = match kind {
            ReportKind::Lost => (LOST_COLUMNS, "lost_reports", "pet_name, breed, last_seen_location"),
            ReportKind::Found => (
                FOUND_COLUMNS,
                "found_reports",
                "pet_name, breed, found_location",
            ),
        };
        let query = format!(
            "SELECT {} FROM {} \
             WHERE status = 'active' \
               AND ($1::text IS NULL OR pet_type = $1::pet_type) \
               AND ($2::text IS NULL OR concat_ws(' ', {}) ILIKE $2 ESCAPE '\\') \
               AND ($3::timestamptz IS NULL OR created_at < $3 OR (created_at = $3 AND id < $4)) \
             ORDER BY created_at DESC, id DESC \
             LIMIT $5",
            columns, table, searchable
        );

        let pattern = filter
            .query
            .as_deref()
            .map(str::trim)
            .filter(|query| !query.is_empty())
            .map(|query| format!("%{}%", escape_like_pattern(query)));
        let (cursor_at, cursor_id) = match cursor {
            Some((created_at, id)) => (Some(created_at), Some(id)),
            None => (None, None),
        };

        let rows = sqlx::query(&query)
            .bind(filter.pet_type.map(|pet_type| pet_type.as_db()))
            .bind(pattern)
            .bind(cursor_at)
            .bind(cursor_id)
            .bind(limit)
            .fetch_all(self.db.pool())
            .await?;

        rows.iter()
            .map(|row| report_from_row(kind, row))
            .collect()
    }

    pub async fn active_ids(&self, kind: ReportKind) -> Result<Vec<Uuid>> {
        let query = format!(
            "SELECT id FROM {} WHERE status = 'active' ORDER BY created_at",
            kind.table()
        );
        let ids = sqlx::query_scalar(&query)
            .fetch_all(self.db.pool())
            .await?;
        Ok(ids)
    }

    pub async fn update_lost(
        &self,
        id: Uuid,
        owner_id: Uuid,
        patch: LostReportPatch,
    ) -> Result<Option<LostReport>> {
        let query = format!(
            "UPDATE lost_reports \
             SET pet_name = COALESCE($3, pet_name), \
                 pet_type = COALESCE($4::pet_type, pet_type), \
                 breed = COALESCE($5, breed), \
                 color = COALESCE($6, color), \
                 age = COALESCE($7, age), \
                 description = COALESCE($8, description), \
                 last_seen_location = COALESCE($9, last_seen_location), \
                 last_seen_date = COALESCE($10, last_seen_date), \
                 contact_phone = COALESCE($11, contact_phone), \
                 contact_email = COALESCE($12, contact_email), \
                 reward = COALESCE($13, reward), \
                 images = COALESCE($14, images), \
                 updated_at = now() \
             WHERE id = $1 AND user_id = $2 \
             RETURNING {}",
            LOST_COLUMNS
        );
        let row = sqlx::query(&query)
            .bind(id)
            .bind(owner_id)
            .bind(patch.pet_name)
            .bind(patch.pet_type.map(|pet_type| pet_type.as_db()))
            .bind(patch.breed)
            .bind(patch.color)
            .bind(patch.age)
            .bind(patch.description)
            .bind(patch.last_seen_location)
            .bind(patch.last_seen_date)
            .bind(patch.contact_phone)
            .bind(patch.contact_email)
            .bind(patch.reward)
            .bind(patch.images)
            .fetch_optional(self.db.pool())
            .await?;

        row.as_ref().map(lost_from_row).transpose()
    }

    pub async fn update_found(
        &self,
        id: Uuid,
        owner_id: Uuid,
        patch: FoundReportPatch,
    ) -> Result<Option<FoundReport>> {
        let query = format!(
            "UPDATE found_reports \
             SET pet_name = COALESCE($3, pet_name), \
                 pet_type = COALESCE($4::pet_type, pet_type), \
                 breed = COALESCE($5, breed), \
                 color = COALESCE($6, color), \
                 description = COALESCE($7, description), \
                 found_location = COALESCE($8, found_location), \
                 found_date = COALESCE($9, found_date), \
                 contact_phone = COALESCE($10, contact_phone), \
                 contact_email = COALESCE($11, contact_email), \
                 images = COALESCE($12, images), \
                 updated_at = now() \
             WHERE id = $1 AND user_id = $2 \
             RETURNING {}",
            FOUND_COLUMNS
        );
        let row = sqlx::query(&query)
            .bind(id)
            .bind(owner_id)
            .bind(patch.pet_name)
            .bind(patch.pet_type.map(|pet_type| pet_type.as_db()))
            .bind(patch.breed)
            .bind(patch.color)
            .bind(patch.description)
            .bind(patch.found_location)
            .bind(patch.found_date)
            .bind(patch.contact_phone)
            .bind(patch.contact_email)
            .bind(patch.images)
            .fetch_optional(self.db.pool())
            .await?;

        row.as_ref().map(found_from_row).transpose()
    }

    /// Move a report to `status`. With `owner_id` set, only that user's
    /// report is touched; moderators pass `None`.
    pub async fn set_status(
        &self,
        kind: ReportKind,
        id: Uuid,
        owner_id: Option<Uuid>,
        status: ReportStatus,
    ) -> Result<Option<StatusChange>> {
        let mut tx = self.db.pool().begin().await?;

        let select = format!(
            "SELECT status::text AS status FROM {} \
             WHERE id = $1 AND ($2::uuid IS NULL OR user_id = $2) \
             FOR UPDATE",
            kind.table()
        );
        let Some(row) = sqlx::query(&select)
            .bind(id)
            .bind(owner_id)
            .fetch_optional(&mut *tx)
            .await?
        else {
            tx.rollback().await?;
            return Ok(None);
        };
        let previous: String = row.get("status");
        let previous = ReportStatus::from_db(&previous)
            .ok_or_else(|| anyhow!("unknown report status: {}", previous))?;

        let columns = match kind {
            ReportKind::Lost => LOST_COLUMNS,
            ReportKind::Found => FOUND_COLUMNS,
        };
        let update = format!(
            "UPDATE {} SET status = $2::report_status, updated_at = now() \
             WHERE id = $1 \
             RETURNING {}",
            kind.table(),
            columns
        );
        let row = sqlx::query(&update)
            .bind(id)
            .bind(status.as_db())
            .fetch_one(&mut *tx)
            .await?;
        let report = report_from_row(kind, &row)?;

        tx.commit().await?;

        Ok(Some(StatusChange { report, previous }))
    }

    pub async fn counts(&self) -> Result<ReportCounts> {
        let row = sqlx::query(
            "SELECT \
                 (SELECT COUNT(*) FROM lost_reports) AS lost_total, \
                 (SELECT COUNT(*) FROM lost_reports WHERE status = 'active') AS lost_active, \
                 (SELECT COUNT(*) FROM found_reports) AS found_total, \
                 (SELECT COUNT(*) FROM found_reports WHERE status = 'active') AS found_active",
        )
        .fetch_one(self.db.pool())
        .await?;

        Ok(ReportCounts {
            lost_total: row.get("lost_total"),
            lost_active: row.get("lost_active"),
            found_total: row.get("found_total"),
            found_active: row.get("found_active"),
        })
    }
}

pub(crate) fn report_from_row(kind: ReportKind, row: &PgRow) -> Result<Report> {
    Ok(match kind {
        ReportKind::Lost => Report::Lost(lost_from_row(row)?),
        ReportKind::Found => Report::Found(found_from_row(row)?),
    })
}

pub(crate) fn lost_from_row(row: &PgRow) -> Result<LostReport> {
    Ok(LostReport {
        id: row.get("id"),
        user_id: row.get("user_id"),
        pet_name: row.get("pet_name"),
        pet_type: pet_type_from_row(row)?,
        breed: row.get("breed"),
        color: row.get("color"),
        age: row.get("age"),
        description: row.get("description"),
        last_seen_location: row.get("last_seen_location"),
        last_seen_date: row.get("last_seen_date"),
        contact_phone: row.get("contact_phone"),
        contact_email: row.get("contact_email"),
        reward: row.get("reward"),
        status: status_from_row(row)?,
        images: row.get("images"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

pub(crate) fn found_from_row(row: &PgRow) -> Result<FoundReport> {
    Ok(FoundReport {
        id: row.get("id"),
        user_id: row.get("user_id"),
        pet_name: row.get("pet_name"),
        pet_type: pet_type_from_row(row)?,
        breed: row.get("breed"),
        color: row.get("color"),
        description: row.get("description"),
        found_location: row.get("found_location"),
        found_date: row.get("found_date"),
        contact_phone: row.get("contact_phone"),
        contact_email: row.get("contact_email"),
        status: status_from_row(row)?,
        images: row.get("images"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

fn pet_type_from_row(row: &PgRow) -> Result<PetType> {
    let value: String = row.get("pet_type");
    PetType::from_db(&value).ok_or_else(|| anyhow!("unknown pet type: {}", value))
}

fn status_from_row(row: &PgRow) -> Result<ReportStatus> {
    let value: String = row.get("status");
    ReportStatus::from_db(&value).ok_or_else(|| anyhow!("unknown report status: {}", value))
}

fn escape_like_pattern(input: &str) -> String {
    let mut escaped = String::with_capacity(input.len());
    for ch in input.chars() {
        match ch {
            '%' | '_' | '\\' => {
                escaped.push('\\');
                escaped.push(ch);
            }
            _ => escaped.push(ch),
        }
    }
    escaped
}
