use axum::{routing::get, routing::post, Router};

use crate::http::handlers;
use crate::AppState;

pub fn health() -> Router<AppState> {
    Router::new().route("/health", get(handlers::health))
}

pub fn reports() -> Router<AppState> {
    Router::new()
        .route(
            "/reports/lost",
            get(handlers::list_lost_reports).post(handlers::create_lost_report),
        )
        .route(
            "/reports/lost/:id",
            get(handlers::get_lost_report).patch(handlers::update_lost_report),
        )
        .route(
            "/reports/lost/:id/status",
            post(handlers::set_lost_report_status),
        )
        .route(
            "/reports/found",
            get(handlers::list_found_reports).post(handlers::create_found_report),
        )
        .route(
            "/reports/found/:id",
            get(handlers::get_found_report).patch(handlers::update_found_report),
        )
        .route(
            "/reports/found/:id/status",
            post(handlers::set_found_report_status),
        )
        .route(
            "/reports/images/upload",
            post(handlers::create_report_image_upload),
        )
}

pub fn matches() -> Router<AppState> {
    Router::new()
        .route("/matches", get(handlers::list_matches))
        .route("/matches/:id", get(handlers::get_match))
        .route("/matches/:id/confirm", post(handlers::confirm_match))
        .route("/matches/:id/dismiss", post(handlers::dismiss_match))
}

pub fn notifications() -> Router<AppState> {
    Router::new()
        .route("/notifications", get(handlers::list_notifications))
        .route(
            "/notifications/unread-count",
            get(handlers::unread_notification_count),
        )
        .route(
            "/notifications/read-all",
            post(handlers::mark_all_notifications_read),
        )
        .route(
            "/notifications/:id/read",
            post(handlers::mark_notification_read),
        )
}

pub fn admin() -> Router<AppState> {
    Router::new()
        .route(
            "/admin/reports/:kind/:id/status",
            post(handlers::admin_set_report_status),
        )
        .route(
            "/admin/matching/reconcile",
            post(handlers::admin_reconcile),
        )
        .route(
            "/admin/matching/preview",
            get(handlers::admin_preview_match),
        )
        .route("/admin/stats", get(handlers::admin_stats))
}
