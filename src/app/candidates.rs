//! Cheap pre-filtering: only active, same-species reports of the opposite
//! kind are worth scoring. The filter runs in SQL.

use anyhow::Result;

use crate::app::reports::{found_from_row, lost_from_row, FOUND_COLUMNS, LOST_COLUMNS};
use crate::domain::report::{FoundReport, LostReport, Report};
use crate::infra::db::Db;

#[derive(Clone)]
pub struct CandidateSelector {
    db: Db,
}

impl CandidateSelector {
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    pub async fn candidates_for(&self, report: &Report) -> Result<Vec<Report>> {
        Ok(match report {
            Report::Lost(lost) => self
                .found_candidates(lost)
                .await?
                .into_iter()
                .map(Report::Found)
                .collect(),
            Report::Found(found) => self
                .lost_candidates(found)
                .await?
                .into_iter()
                .map(Report::Lost)
                .collect(),
        })
    }

    pub async fn found_candidates(&self, lost: &LostReport) -> Result<Vec<FoundReport>> {
        let rows = sqlx::query(&active_of_type("found_reports", FOUND_COLUMNS))
            .bind(lost.pet_type.as_db())
            .fetch_all(self.db.pool())
            .await?;

        rows.iter().map(found_from_row).collect()
    }

    pub async fn lost_candidates(&self, found: &FoundReport) -> Result<Vec<LostReport>> {
        let rows = sqlx::query(&active_of_type("lost_reports", LOST_COLUMNS))
            .bind(found.pet_type.as_db())
            .fetch_all(self.db.pool())
            .await?;

        rows.iter().map(lost_from_row).collect()
    }
}

fn active_of_type(table: &str, columns: &str) -> String {
    format!(
        "SELECT {} FROM {} \
         WHERE status = 'active' AND pet_type = $1::pet_type \
         ORDER BY created_at, id",
        columns, table
    )
}
