//! Match & Notification API Tests
//!
//! Covers match listing, detail access, owner review, the notifications a
//! strong match produces, and the admin matching endpoints.

mod common;

use axum::http::StatusCode;
use common::{app, id_of, TestApp, TestUser};
use serde_json::{json, Value};
use uuid::Uuid;

use petlink::domain::report::ReportKind;

/// Create a matching pair and run the found report's pass explicitly, so the
/// match row exists before the test continues.
async fn matched_pair(app: &TestApp, loser: &TestUser, finder: &TestUser) -> (Value, Value, Uuid) {
    let (lost, found) = app.create_matching_pair(loser, finder).await;
    app.state
        .matcher
        .process_report(ReportKind::Found, id_of(&found))
        .await
        .expect("matching pass failed");

    let match_id: Uuid = sqlx::query_scalar(
        "SELECT id FROM pet_matches WHERE lost_report_id = $1 AND found_report_id = $2",
    )
    .bind(id_of(&lost))
    .bind(id_of(&found))
    .fetch_one(app.pool())
    .await
    .expect("match row missing");

    (lost, found, match_id)
}

// ===========================================================================
// Listing
// ===========================================================================

#[tokio::test]
async fn list_matches_for_owner() {
    let Some(app) = app().await else { return };
    let loser = app.create_user();
    let finder = app.create_user();
    let (lost, found, match_id) = matched_pair(app, &loser, &finder).await;

    for user in [&loser, &finder] {
        let resp = app.get("/matches", Some(&user.access_token)).await;
        assert_eq!(resp.status, StatusCode::OK);
        let items = resp.json()["items"].as_array().unwrap().clone();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0]["id"].as_str().unwrap(), match_id.to_string());
        assert_eq!(items[0]["match_score"], 100);
        assert_eq!(items[0]["status"], "notified");
        assert_eq!(items[0]["lost_report"]["id"], lost["id"]);
        assert_eq!(items[0]["found_report"]["id"], found["id"]);
    }
}

#[tokio::test]
async fn list_matches_anonymous_shows_top_matches() {
    let Some(app) = app().await else { return };
    let loser = app.create_user();
    let finder = app.create_user();
    matched_pair(app, &loser, &finder).await;

    let resp = app.get("/matches", None).await;
    assert_eq!(resp.status, StatusCode::OK);
    let items = resp.json()["items"].as_array().unwrap().clone();
    assert!(!items.is_empty());
    assert!(items.len() <= 10);

    let scores: Vec<i64> = items
        .iter()
        .map(|item| item["match_score"].as_i64().unwrap())
        .collect();
    assert!(scores.windows(2).all(|pair| pair[0] >= pair[1]));
    assert!(items.iter().all(|item| item["status"] != "dismissed"));
}

#[tokio::test]
async fn list_matches_user_without_matches_sees_top_matches() {
    let Some(app) = app().await else { return };
    let loser = app.create_user();
    let finder = app.create_user();
    matched_pair(app, &loser, &finder).await;
    let bystander = app.create_user();

    let resp = app.get("/matches", Some(&bystander.access_token)).await;
    assert_eq!(resp.status, StatusCode::OK);
    let items = resp.json()["items"].as_array().unwrap().clone();
    assert!(!items.is_empty());
    assert!(items.len() <= 10);
}

#[tokio::test]
async fn list_matches_rejects_bad_token() {
    let Some(app) = app().await else { return };

    let resp = app.get("/matches", Some("v4.local.garbage")).await;
    assert_eq!(resp.status, StatusCode::UNAUTHORIZED);
}

// ===========================================================================
// Detail
// ===========================================================================

#[tokio::test]
async fn get_match_owner_and_stranger() {
    let Some(app) = app().await else { return };
    let loser = app.create_user();
    let finder = app.create_user();
    let stranger = app.create_user();
    let (_, _, match_id) = matched_pair(app, &loser, &finder).await;

    let resp = app
        .get(&format!("/matches/{}", match_id), Some(&finder.access_token))
        .await;
    assert_eq!(resp.status, StatusCode::OK);
    let body = resp.json();
    assert_eq!(body["lost_report"]["user_id"].as_str().unwrap(), loser.id.to_string());
    assert_eq!(body["found_report"]["user_id"].as_str().unwrap(), finder.id.to_string());

    let resp = app
        .get(&format!("/matches/{}", match_id), Some(&stranger.access_token))
        .await;
    assert_eq!(resp.status, StatusCode::NOT_FOUND);

    let resp = app.get(&format!("/matches/{}", match_id), None).await;
    assert_eq!(resp.status, StatusCode::UNAUTHORIZED);

    let resp = app
        .get(&format!("/matches/{}", Uuid::new_v4()), Some(&loser.access_token))
        .await;
    assert_eq!(resp.status, StatusCode::NOT_FOUND);
}

// ===========================================================================
// Review
// ===========================================================================

#[tokio::test]
async fn confirm_match_survives_rescoring() {
    let Some(app) = app().await else { return };
    let loser = app.create_user();
    let finder = app.create_user();
    let (lost, _, match_id) = matched_pair(app, &loser, &finder).await;

    let resp = app
        .post_json(
            &format!("/matches/{}/confirm", match_id),
            json!({}),
            Some(&loser.access_token),
        )
        .await;
    assert_eq!(resp.status, StatusCode::OK, "{}", resp.error_message());
    let body = resp.json();
    assert_eq!(body["status"], "confirmed");
    assert!(body["reviewed_at"].is_string());

    app.state
        .matcher
        .process_report(ReportKind::Lost, id_of(&lost))
        .await
        .expect("matching pass failed");

    let resp = app
        .get(&format!("/matches/{}", match_id), Some(&loser.access_token))
        .await;
    assert_eq!(resp.json()["status"], "confirmed");
}

#[tokio::test]
async fn dismiss_match_hides_it() {
    let Some(app) = app().await else { return };
    let loser = app.create_user();
    let finder = app.create_user();
    let (lost, _, match_id) = matched_pair(app, &loser, &finder).await;

    let resp = app
        .post_json(
            &format!("/matches/{}/dismiss", match_id),
            json!({}),
            Some(&finder.access_token),
        )
        .await;
    assert_eq!(resp.status, StatusCode::OK, "{}", resp.error_message());
    assert_eq!(resp.json()["status"], "dismissed");

    // An owner's dismissal outlasts a fresh pass.
    app.state
        .matcher
        .process_report(ReportKind::Lost, id_of(&lost))
        .await
        .expect("matching pass failed");

    let resp = app.get("/matches", Some(&finder.access_token)).await;
    let items = resp.json()["items"].as_array().unwrap().clone();
    assert!(items
        .iter()
        .all(|item| item["id"].as_str().unwrap() != match_id.to_string()));
}

#[tokio::test]
async fn review_match_by_stranger() {
    let Some(app) = app().await else { return };
    let loser = app.create_user();
    let finder = app.create_user();
    let stranger = app.create_user();
    let (_, _, match_id) = matched_pair(app, &loser, &finder).await;

    let resp = app
        .post_json(
            &format!("/matches/{}/confirm", match_id),
            json!({}),
            Some(&stranger.access_token),
        )
        .await;
    assert_eq!(resp.status, StatusCode::NOT_FOUND);

    let resp = app
        .post_json(&format!("/matches/{}/dismiss", match_id), json!({}), None)
        .await;
    assert_eq!(resp.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn resolving_a_report_dismisses_its_matches() {
    let Some(app) = app().await else { return };
    let loser = app.create_user();
    let finder = app.create_user();
    let (lost, _, match_id) = matched_pair(app, &loser, &finder).await;

    let resp = app
        .post_json(
            &format!("/reports/lost/{}/status", id_of(&lost)),
            json!({ "status": "resolved" }),
            Some(&loser.access_token),
        )
        .await;
    assert_eq!(resp.status, StatusCode::OK, "{}", resp.error_message());

    let resp = app
        .get(&format!("/matches/{}", match_id), Some(&loser.access_token))
        .await;
    assert_eq!(resp.status, StatusCode::OK);
    assert_eq!(resp.json()["status"], "dismissed");
}

// ===========================================================================
// Notifications
// ===========================================================================

#[tokio::test]
async fn strong_match_notifies_both_owners_once() {
    let Some(app) = app().await else { return };
    let loser = app.create_user();
    let finder = app.create_user();
    let (lost, found, _) = matched_pair(app, &loser, &finder).await;

    // Re-running either side never repeats the notification.
    for (kind, report) in [(ReportKind::Lost, &lost), (ReportKind::Found, &found)] {
        app.state
            .matcher
            .process_report(kind, id_of(report))
            .await
            .expect("matching pass failed");
    }

    for user in [&loser, &finder] {
        let resp = app.get("/notifications", Some(&user.access_token)).await;
        assert_eq!(resp.status, StatusCode::OK);
        let items = resp.json()["items"].as_array().unwrap().clone();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0]["type"], "match");
        assert_eq!(items[0]["link"], "/matches");
        assert_eq!(items[0]["read"], false);
        assert!(items[0]["message"].as_str().unwrap().contains("100%"));
    }
}

#[tokio::test]
async fn notifications_read_flow() {
    let Some(app) = app().await else { return };
    let loser = app.create_user();
    let finder = app.create_user();
    matched_pair(app, &loser, &finder).await;

    let resp = app
        .get("/notifications/unread-count", Some(&loser.access_token))
        .await;
    assert_eq!(resp.status, StatusCode::OK);
    assert_eq!(resp.json()["unread"], 1);

    let resp = app.get("/notifications", Some(&loser.access_token)).await;
    let notification_id = resp.json()["items"][0]["id"].as_str().unwrap().to_string();

    // Someone else's notification is invisible.
    let resp = app
        .post_json(
            &format!("/notifications/{}/read", notification_id),
            json!({}),
            Some(&finder.access_token),
        )
        .await;
    assert_eq!(resp.status, StatusCode::NOT_FOUND);

    let path = format!("/notifications/{}/read", notification_id);
    let resp = app.post_json(&path, json!({}), Some(&loser.access_token)).await;
    assert_eq!(resp.status, StatusCode::NO_CONTENT);
    let resp = app.post_json(&path, json!({}), Some(&loser.access_token)).await;
    assert_eq!(resp.status, StatusCode::NO_CONTENT);

    let resp = app
        .get("/notifications/unread-count", Some(&loser.access_token))
        .await;
    assert_eq!(resp.json()["unread"], 0);

    let resp = app
        .post_json("/notifications/read-all", json!({}), Some(&finder.access_token))
        .await;
    assert_eq!(resp.status, StatusCode::OK);
    assert_eq!(resp.json()["updated"], 1);

    let resp = app
        .get("/notifications/unread-count", Some(&finder.access_token))
        .await;
    assert_eq!(resp.json()["unread"], 0);
}

#[tokio::test]
async fn notifications_require_auth() {
    let Some(app) = app().await else { return };

    let resp = app.get("/notifications", None).await;
    assert_eq!(resp.status, StatusCode::UNAUTHORIZED);
}

// ===========================================================================
// Admin
// ===========================================================================

#[tokio::test]
async fn admin_preview_scores_a_pair() {
    let Some(app) = app().await else { return };
    let loser = app.create_user();
    let finder = app.create_user();
    let (lost, found) = app.create_matching_pair(&loser, &finder).await;
    let path = format!(
        "/admin/matching/preview?lost_id={}&found_id={}",
        id_of(&lost),
        id_of(&found)
    );

    let resp = app.get_admin(&path, None).await;
    assert_eq!(resp.status, StatusCode::FORBIDDEN);

    let resp = app.get_admin(&path, Some(app.admin_token())).await;
    assert_eq!(resp.status, StatusCode::OK, "{}", resp.error_message());
    let body = resp.json();
    assert_eq!(body["species_match"], true);
    assert_eq!(body["total"], 100);

    let resp = app
        .get_admin(
            &format!(
                "/admin/matching/preview?lost_id={}&found_id={}",
                id_of(&lost),
                Uuid::new_v4()
            ),
            Some(app.admin_token()),
        )
        .await;
    assert_eq!(resp.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn admin_stats_counts_reports_and_matches() {
    let Some(app) = app().await else { return };
    let loser = app.create_user();
    let finder = app.create_user();
    matched_pair(app, &loser, &finder).await;

    let resp = app.get_admin("/admin/stats", None).await;
    assert_eq!(resp.status, StatusCode::FORBIDDEN);

    let resp = app.get_admin("/admin/stats", Some(app.admin_token())).await;
    assert_eq!(resp.status, StatusCode::OK, "{}", resp.error_message());
    let body = resp.json();
    assert!(body["reports"]["lost_total"].as_i64().unwrap() >= 1);
    assert!(body["reports"]["found_active"].as_i64().unwrap() >= 1);
    assert!(body["matches"]["notified"].as_i64().unwrap() >= 1);
}
