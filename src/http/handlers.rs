use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::app::matcher::ReconcileSummary;
use crate::app::matches::{MatchCounts, MatchService};
use crate::app::notifications::NotificationService;
use crate::app::reports::{
    FoundReportPatch, LostReportPatch, NewFoundReport, NewLostReport, ReportCounts, ReportFilter,
    ReportService, StatusChange,
};
use crate::app::scorer::ScoreBreakdown;
use crate::app::uploads::{ImageUploadService, UploadIntent};
use crate::domain::notification::Notification;
use crate::domain::pet_match::{MatchStatus, MatchView, PetMatch};
use crate::domain::report::{FoundReport, LostReport, PetType, Report, ReportKind, ReportStatus};
use crate::http::{AdminToken, AppError, AuthUser, MaybeAuthUser};
use crate::jobs::reconciler;
use crate::AppState;

const MAX_NAME_LEN: usize = 100;
const MAX_SHORT_TEXT_LEN: usize = 100;
const MAX_LOCATION_LEN: usize = 300;
const MAX_DESCRIPTION_LEN: usize = 2000;
const MAX_PHONE_LEN: usize = 40;
const MAX_EMAIL_LEN: usize = 254;
const MAX_IMAGES: usize = 10;
const MAX_QUERY_LEN: usize = 100;

#[derive(Serialize)]
pub(crate) struct HealthResponse {
    status: &'static str,
}

#[derive(Deserialize)]
pub struct PaginationQuery {
    pub limit: Option<i64>,
    pub cursor: Option<String>,
}

#[derive(Serialize)]
pub struct ListResponse<T> {
    pub items: Vec<T>,
    pub next_cursor: Option<String>,
}

fn parse_cursor(cursor: Option<String>) -> Result<Option<(OffsetDateTime, Uuid)>, AppError> {
    let Some(cursor) = cursor else {
        return Ok(None);
    };

    let mut parts = cursor.splitn(2, '/');
    let timestamp = parts
        .next()
        .ok_or_else(|| AppError::bad_request("invalid cursor"))?;
    let id = parts
        .next()
        .ok_or_else(|| AppError::bad_request("invalid cursor"))?;

    let timestamp = OffsetDateTime::parse(timestamp, &Rfc3339)
        .map_err(|_| AppError::bad_request("invalid cursor"))?;
    let id = Uuid::parse_str(id).map_err(|_| AppError::bad_request("invalid cursor"))?;

    Ok(Some((timestamp, id)))
}

fn encode_cursor(cursor: Option<(OffsetDateTime, Uuid)>) -> Option<String> {
    let (timestamp, id) = cursor?;
    let timestamp = timestamp.format(&Rfc3339).ok()?;
    Some(format!("{}/{}", timestamp, id))
}

fn parse_limit(limit: Option<i64>, default: i64) -> Result<i64, AppError> {
    let limit = limit.unwrap_or(default);
    if !(1..=200).contains(&limit) {
        return Err(AppError::bad_request("limit must be between 1 and 200"));
    }
    Ok(limit)
}

pub(crate) async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let db = state.db.ping().await.is_ok();
    let redis = state.cache.ping().await.is_ok();
    let status = if db && redis { "ok" } else { "degraded" };

    Json(HealthResponse { status })
}

fn require_text(field: &str, value: &str, max_len: usize) -> Result<(), AppError> {
    if value.trim().is_empty() {
        return Err(AppError::bad_request(format!("{} is required", field)));
    }
    limit_text(field, Some(value), max_len)
}

fn limit_text(field: &str, value: Option<&str>, max_len: usize) -> Result<(), AppError> {
    match value {
        Some(value) if value.chars().count() > max_len => Err(AppError::bad_request(format!(
            "{} must be at most {} characters",
            field, max_len
        ))),
        _ => Ok(()),
    }
}

fn validate_images(images: &[String]) -> Result<(), AppError> {
    if images.len() > MAX_IMAGES {
        return Err(AppError::bad_request(format!(
            "at most {} images are allowed",
            MAX_IMAGES
        )));
    }
    if images.iter().any(|image| image.trim().is_empty()) {
        return Err(AppError::bad_request("image references must not be empty"));
    }
    Ok(())
}

fn validate_new_lost(input: &NewLostReport) -> Result<(), AppError> {
    require_text("pet_name", &input.pet_name, MAX_NAME_LEN)?;
    require_text("last_seen_location", &input.last_seen_location, MAX_LOCATION_LEN)?;
    require_text("contact_phone", &input.contact_phone, MAX_PHONE_LEN)?;
    limit_text("breed", input.breed.as_deref(), MAX_SHORT_TEXT_LEN)?;
    limit_text("color", input.color.as_deref(), MAX_SHORT_TEXT_LEN)?;
    limit_text("age", input.age.as_deref(), MAX_SHORT_TEXT_LEN)?;
    limit_text("reward", input.reward.as_deref(), MAX_SHORT_TEXT_LEN)?;
    limit_text("description", input.description.as_deref(), MAX_DESCRIPTION_LEN)?;
    limit_text("contact_email", input.contact_email.as_deref(), MAX_EMAIL_LEN)?;
    validate_images(&input.images)
}

fn validate_new_found(input: &NewFoundReport) -> Result<(), AppError> {
    require_text("found_location", &input.found_location, MAX_LOCATION_LEN)?;
    require_text("contact_phone", &input.contact_phone, MAX_PHONE_LEN)?;
    limit_text("pet_name", input.pet_name.as_deref(), MAX_NAME_LEN)?;
    limit_text("breed", input.breed.as_deref(), MAX_SHORT_TEXT_LEN)?;
    limit_text("color", input.color.as_deref(), MAX_SHORT_TEXT_LEN)?;
    limit_text("description", input.description.as_deref(), MAX_DESCRIPTION_LEN)?;
    limit_text("contact_email", input.contact_email.as_deref(), MAX_EMAIL_LEN)?;
    validate_images(&input.images)
}

fn validate_lost_patch(patch: &LostReportPatch) -> Result<(), AppError> {
    if let Some(ref pet_name) = patch.pet_name {
        require_text("pet_name", pet_name, MAX_NAME_LEN)?;
    }
    if let Some(ref location) = patch.last_seen_location {
        require_text("last_seen_location", location, MAX_LOCATION_LEN)?;
    }
    if let Some(ref phone) = patch.contact_phone {
        require_text("contact_phone", phone, MAX_PHONE_LEN)?;
    }
    limit_text("breed", patch.breed.as_deref(), MAX_SHORT_TEXT_LEN)?;
    limit_text("color", patch.color.as_deref(), MAX_SHORT_TEXT_LEN)?;
    limit_text("age", patch.age.as_deref(), MAX_SHORT_TEXT_LEN)?;
    limit_text("reward", patch.reward.as_deref(), MAX_SHORT_TEXT_LEN)?;
    limit_text("description", patch.description.as_deref(), MAX_DESCRIPTION_LEN)?;
    limit_text("contact_email", patch.contact_email.as_deref(), MAX_EMAIL_LEN)?;
    if let Some(ref images) = patch.images {
        validate_images(images)?;
    }
    Ok(())
}

fn validate_found_patch(patch: &FoundReportPatch) -> Result<(), AppError> {
    if let Some(ref location) = patch.found_location {
        require_text("found_location", location, MAX_LOCATION_LEN)?;
    }
    if let Some(ref phone) = patch.contact_phone {
        require_text("contact_phone", phone, MAX_PHONE_LEN)?;
    }
    limit_text("pet_name", patch.pet_name.as_deref(), MAX_NAME_LEN)?;
    limit_text("breed", patch.breed.as_deref(), MAX_SHORT_TEXT_LEN)?;
    limit_text("color", patch.color.as_deref(), MAX_SHORT_TEXT_LEN)?;
    limit_text("description", patch.description.as_deref(), MAX_DESCRIPTION_LEN)?;
    limit_text("contact_email", patch.contact_email.as_deref(), MAX_EMAIL_LEN)?;
    if let Some(ref images) = patch.images {
        validate_images(images)?;
    }
    Ok(())
}

pub async fn create_lost_report(
    auth: AuthUser,
    State(state): State<AppState>,
    Json(payload): Json<NewLostReport>,
) -> Result<(StatusCode, Json<LostReport>), AppError> {
    validate_new_lost(&payload)?;

    let service = ReportService::new(state.db.clone());
    let report = service
        .create_lost(auth.user_id, payload)
        .await
        .map_err(|err| {
            tracing::error!(error = ?err, user_id = %auth.user_id, "failed to create lost report");
            AppError::internal("failed to create report")
        })?;

    state.dispatcher.dispatch(&Report::Lost(report.clone())).await;

    Ok((StatusCode::CREATED, Json(report)))
}

pub async fn create_found_report(
    auth: AuthUser,
    State(state): State<AppState>,
    Json(payload): Json<NewFoundReport>,
) -> Result<(StatusCode, Json<FoundReport>), AppError> {
    validate_new_found(&payload)?;

    let service = ReportService::new(state.db.clone());
    let report = service
        .create_found(auth.user_id, payload)
        .await
        .map_err(|err| {
            tracing::error!(error = ?err, user_id = %auth.user_id, "failed to create found report");
            AppError::internal("failed to create report")
        })?;

    state.dispatcher.dispatch(&Report::Found(report.clone())).await;

    Ok((StatusCode::CREATED, Json(report)))
}

#[derive(Deserialize)]
pub struct ReportListQuery {
    pub limit: Option<i64>,
    pub cursor: Option<String>,
    pub pet_type: Option<PetType>,
    pub q: Option<String>,
}

pub async fn list_lost_reports(
    State(state): State<AppState>,
    Query(query): Query<ReportListQuery>,
) -> Result<Json<ListResponse<Report>>, AppError> {
    list_reports(state, ReportKind::Lost, query).await
}

pub async fn list_found_reports(
    State(state): State<AppState>,
    Query(query): Query<ReportListQuery>,
) -> Result<Json<ListResponse<Report>>, AppError> {
    list_reports(state, ReportKind::Found, query).await
}

async fn list_reports(
    state: AppState,
    kind: ReportKind,
    query: ReportListQuery,
) -> Result<Json<ListResponse<Report>>, AppError> {
    let limit = parse_limit(query.limit, 30)?;
    let cursor = parse_cursor(query.cursor)?;
    limit_text("q", query.q.as_deref(), MAX_QUERY_LEN)?;

    let filter = ReportFilter {
        pet_type: query.pet_type,
        query: query.q,
    };
    let service = ReportService::new(state.db.clone());
    let mut reports = service
        .list_active(kind, &filter, cursor, limit + 1)
        .await
        .map_err(|err| {
            tracing::error!(error = ?err, kind = ?kind, "failed to list reports");
            AppError::internal("failed to list reports")
        })?;

    let next_cursor = if reports.len() > limit as usize {
        reports.truncate(limit as usize);
        reports.last().map(|last| (last.created_at(), last.id()))
    } else {
        None
    };

    Ok(Json(ListResponse {
        items: reports,
        next_cursor: encode_cursor(next_cursor),
    }))
}

pub async fn get_lost_report(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
) -> Result<Json<Report>, AppError> {
    get_report(state, ReportKind::Lost, id).await
}

pub async fn get_found_report(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
) -> Result<Json<Report>, AppError> {
    get_report(state, ReportKind::Found, id).await
}

async fn get_report(state: AppState, kind: ReportKind, id: Uuid) -> Result<Json<Report>, AppError> {
    let service = ReportService::new(state.db.clone());
    let report = service.get(kind, id).await.map_err(|err| {
        tracing::error!(error = ?err, report_id = %id, kind = ?kind, "failed to fetch report");
        AppError::internal("failed to fetch report")
    })?;

    match report {
        Some(report) => Ok(Json(report)),
        None => Err(AppError::not_found("report not found")),
    }
}

pub async fn update_lost_report(
    auth: AuthUser,
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
    Json(payload): Json<LostReportPatch>,
) -> Result<Json<LostReport>, AppError> {
    validate_lost_patch(&payload)?;

    let service = ReportService::new(state.db.clone());
    let report = service
        .update_lost(id, auth.user_id, payload)
        .await
        .map_err(|err| {
            tracing::error!(error = ?err, report_id = %id, user_id = %auth.user_id, "failed to update lost report");
            AppError::internal("failed to update report")
        })?
        .ok_or_else(|| AppError::not_found("report not found"))?;

    if report.status.is_active() {
        state.dispatcher.dispatch(&Report::Lost(report.clone())).await;
    }

    Ok(Json(report))
}

pub async fn update_found_report(
    auth: AuthUser,
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
    Json(payload): Json<FoundReportPatch>,
) -> Result<Json<FoundReport>, AppError> {
    validate_found_patch(&payload)?;

    let service = ReportService::new(state.db.clone());
    let report = service
        .update_found(id, auth.user_id, payload)
        .await
        .map_err(|err| {
            tracing::error!(error = ?err, report_id = %id, user_id = %auth.user_id, "failed to update found report");
            AppError::internal("failed to update report")
        })?
        .ok_or_else(|| AppError::not_found("report not found"))?;

    if report.status.is_active() {
        state.dispatcher.dispatch(&Report::Found(report.clone())).await;
    }

    Ok(Json(report))
}

#[derive(Deserialize)]
pub struct StatusRequest {
    pub status: ReportStatus,
}

pub async fn set_lost_report_status(
    auth: AuthUser,
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
    Json(payload): Json<StatusRequest>,
) -> Result<Json<Report>, AppError> {
    change_report_status(state, ReportKind::Lost, id, Some(auth.user_id), payload.status).await
}

pub async fn set_found_report_status(
    auth: AuthUser,
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
    Json(payload): Json<StatusRequest>,
) -> Result<Json<Report>, AppError> {
    change_report_status(state, ReportKind::Found, id, Some(auth.user_id), payload.status).await
}

pub async fn admin_set_report_status(
    _admin: AdminToken,
    Path((kind, id)): Path<(String, Uuid)>,
    State(state): State<AppState>,
    Json(payload): Json<StatusRequest>,
) -> Result<Json<Report>, AppError> {
    let kind = ReportKind::from_path(&kind)
        .ok_or_else(|| AppError::not_found("unknown report kind"))?;
    change_report_status(state, kind, id, None, payload.status).await
}

async fn change_report_status(
    state: AppState,
    kind: ReportKind,
    id: Uuid,
    owner_id: Option<Uuid>,
    status: ReportStatus,
) -> Result<Json<Report>, AppError> {
    let service = ReportService::new(state.db.clone());
    let change = service
        .set_status(kind, id, owner_id, status)
        .await
        .map_err(|err| {
            tracing::error!(error = ?err, report_id = %id, kind = ?kind, "failed to change report status");
            AppError::internal("failed to change report status")
        })?
        .ok_or_else(|| AppError::not_found("report not found"))?;

    apply_status_change(&state, &change).await;

    Ok(Json(change.report))
}

/// Leaving `active` dismisses the report's matches right away; coming back
/// queues a fresh matching pass.
async fn apply_status_change(state: &AppState, change: &StatusChange) {
    let report = &change.report;
    let now_active = report.status().is_active();

    if !now_active {
        if let Err(err) = state.matcher.retire(report.kind(), report.id()).await {
            // The sweep dismisses orphaned matches, so this is not fatal.
            tracing::warn!(error = ?err, report_id = %report.id(), "failed to dismiss matches");
        }
    } else if !change.previous.is_active() {
        state.dispatcher.dispatch(report).await;
    }
}

#[derive(Deserialize)]
pub struct UploadRequest {
    pub content_type: String,
    pub bytes: i64,
}

pub async fn create_report_image_upload(
    auth: AuthUser,
    State(state): State<AppState>,
    Json(payload): Json<UploadRequest>,
) -> Result<Json<UploadIntent>, AppError> {
    if payload.bytes <= 0 {
        return Err(AppError::bad_request("bytes must be greater than 0"));
    }
    if payload.bytes > state.upload_max_bytes {
        return Err(AppError::bad_request("upload exceeds max size"));
    }

    let service = ImageUploadService::new(state.storage.clone(), state.s3_public_endpoint.clone());
    let intent = service
        .create_upload(
            auth.user_id,
            &payload.content_type,
            payload.bytes,
            state.upload_url_ttl_seconds,
        )
        .await
        .map_err(|err| {
            tracing::error!(error = ?err, user_id = %auth.user_id, "failed to create upload");
            AppError::bad_request("invalid upload request")
        })?;

    Ok(Json(intent))
}

#[derive(Deserialize)]
pub struct MatchListQuery {
    pub limit: Option<i64>,
}

pub async fn list_matches(
    MaybeAuthUser(auth): MaybeAuthUser,
    State(state): State<AppState>,
    Query(query): Query<MatchListQuery>,
) -> Result<Json<ListResponse<MatchView>>, AppError> {
    let limit = parse_limit(query.limit, 50)?;
    let viewer = auth.map(|auth| auth.user_id);

    let service = MatchService::new(state.db.clone());
    let matches = service
        .list_for_viewer(viewer, limit)
        .await
        .map_err(|err| {
            tracing::error!(error = ?err, viewer = ?viewer, "failed to list matches");
            AppError::internal("failed to list matches")
        })?;

    Ok(Json(ListResponse {
        items: matches,
        next_cursor: None,
    }))
}

pub async fn get_match(
    auth: AuthUser,
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
) -> Result<Json<MatchView>, AppError> {
    let service = MatchService::new(state.db.clone());
    let view = service.get(id).await.map_err(|err| {
        tracing::error!(error = ?err, match_id = %id, "failed to fetch match");
        AppError::internal("failed to fetch match")
    })?;

    match view {
        Some(view)
            if view.lost_report.user_id == auth.user_id
                || view.found_report.user_id == auth.user_id =>
        {
            Ok(Json(view))
        }
        _ => Err(AppError::not_found("match not found")),
    }
}

pub async fn confirm_match(
    auth: AuthUser,
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
) -> Result<Json<PetMatch>, AppError> {
    review_match(state, auth, id, MatchStatus::Confirmed).await
}

pub async fn dismiss_match(
    auth: AuthUser,
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
) -> Result<Json<PetMatch>, AppError> {
    review_match(state, auth, id, MatchStatus::Dismissed).await
}

async fn review_match(
    state: AppState,
    auth: AuthUser,
    id: Uuid,
    status: MatchStatus,
) -> Result<Json<PetMatch>, AppError> {
    let service = MatchService::new(state.db.clone());
    let reviewed = service
        .review(id, auth.user_id, status)
        .await
        .map_err(|err| {
            tracing::error!(error = ?err, match_id = %id, user_id = %auth.user_id, "failed to review match");
            AppError::internal("failed to review match")
        })?;

    match reviewed {
        Some(pet_match) => Ok(Json(pet_match)),
        None => Err(AppError::not_found("match not found")),
    }
}

pub async fn list_notifications(
    auth: AuthUser,
    State(state): State<AppState>,
    Query(query): Query<PaginationQuery>,
) -> Result<Json<ListResponse<Notification>>, AppError> {
    let limit = parse_limit(query.limit, 30)?;
    let cursor = parse_cursor(query.cursor)?;

    let service = NotificationService::new(state.db.clone());
    let mut notifications = service
        .list(auth.user_id, cursor, limit + 1)
        .await
        .map_err(|err| {
            tracing::error!(error = ?err, user_id = %auth.user_id, "failed to list notifications");
            AppError::internal("failed to list notifications")
        })?;

    let next_cursor = if notifications.len() > limit as usize {
        notifications.truncate(limit as usize);
        notifications.last().map(|last| (last.created_at, last.id))
    } else {
        None
    };

    Ok(Json(ListResponse {
        items: notifications,
        next_cursor: encode_cursor(next_cursor),
    }))
}

#[derive(Serialize)]
pub struct UnreadCountResponse {
    pub unread: i64,
}

pub async fn unread_notification_count(
    auth: AuthUser,
    State(state): State<AppState>,
) -> Result<Json<UnreadCountResponse>, AppError> {
    let service = NotificationService::new(state.db.clone());
    let unread = service.unread_count(auth.user_id).await.map_err(|err| {
        tracing::error!(error = ?err, user_id = %auth.user_id, "failed to count notifications");
        AppError::internal("failed to count notifications")
    })?;

    Ok(Json(UnreadCountResponse { unread }))
}

pub async fn mark_notification_read(
    auth: AuthUser,
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
) -> Result<StatusCode, AppError> {
    let service = NotificationService::new(state.db.clone());
    let updated = service
        .mark_read(id, auth.user_id)
        .await
        .map_err(|err| {
            tracing::error!(error = ?err, notification_id = %id, user_id = %auth.user_id, "failed to mark notification read");
            AppError::internal("failed to mark notification read")
        })?;

    if updated {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::not_found("notification not found"))
    }
}

#[derive(Serialize)]
pub struct MarkAllReadResponse {
    pub updated: u64,
}

pub async fn mark_all_notifications_read(
    auth: AuthUser,
    State(state): State<AppState>,
) -> Result<Json<MarkAllReadResponse>, AppError> {
    let service = NotificationService::new(state.db.clone());
    let updated = service.mark_all_read(auth.user_id).await.map_err(|err| {
        tracing::error!(error = ?err, user_id = %auth.user_id, "failed to mark notifications read");
        AppError::internal("failed to mark notifications read")
    })?;

    Ok(Json(MarkAllReadResponse { updated }))
}

pub async fn admin_reconcile(
    _admin: AdminToken,
    State(state): State<AppState>,
) -> Result<Json<ReconcileSummary>, AppError> {
    let summary = reconciler::sweep(&state.matcher).await.map_err(|err| {
        tracing::error!(error = ?err, "manual reconciliation failed");
        AppError::internal("reconciliation failed")
    })?;

    Ok(Json(summary))
}

#[derive(Deserialize)]
pub struct PreviewQuery {
    pub lost_id: Uuid,
    pub found_id: Uuid,
}

pub async fn admin_preview_match(
    _admin: AdminToken,
    State(state): State<AppState>,
    Query(query): Query<PreviewQuery>,
) -> Result<Json<ScoreBreakdown>, AppError> {
    let breakdown = state
        .matcher
        .preview(query.lost_id, query.found_id)
        .await
        .map_err(|err| {
            tracing::error!(error = ?err, lost_id = %query.lost_id, found_id = %query.found_id, "failed to preview match");
            AppError::internal("failed to preview match")
        })?;

    match breakdown {
        Some(breakdown) => Ok(Json(breakdown)),
        None => Err(AppError::not_found("report not found")),
    }
}

#[derive(Serialize)]
pub struct StatsResponse {
    pub reports: ReportCounts,
    pub matches: MatchCounts,
}

pub async fn admin_stats(
    _admin: AdminToken,
    State(state): State<AppState>,
) -> Result<Json<StatsResponse>, AppError> {
    let reports = ReportService::new(state.db.clone())
        .counts()
        .await
        .map_err(|err| {
            tracing::error!(error = ?err, "failed to count reports");
            AppError::internal("failed to load stats")
        })?;
    let matches = MatchService::new(state.db.clone())
        .counts()
        .await
        .map_err(|err| {
            tracing::error!(error = ?err, "failed to count matches");
            AppError::internal("failed to load stats")
        })?;

    Ok(Json(StatsResponse { reports, matches }))
}
