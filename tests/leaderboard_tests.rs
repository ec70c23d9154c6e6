mod common;

use common::*;
use drink_off::leaderboard::{
    LeaderboardController, LeaderboardService, LeaderboardSource, LeaderboardView, RefreshOutcome,
};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const ORDER: &str = "units_total.desc.nullslast,drinks_count.desc.nullslast,last_drink_at.desc.nullslast";

#[tokio::test]
async fn fetch_queries_the_view_and_ranks_locally() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/leaderboard"))
        .and(query_param(
            "select",
            "username, drinks_count, units_total, last_drink_at",
        ))
        .and(query_param("order", ORDER))
        .and(query_param("limit", "50"))
        .and(header("apikey", ANON_KEY))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "username": "idle", "drinks_count": 0, "units_total": 0, "last_drink_at": null },
            { "username": "carol", "drinks_count": 2, "units_total": 2, "last_drink_at": "2026-10-19T20:00:00Z" },
            { "username": "alice", "drinks_count": 3, "units_total": 5, "last_drink_at": "2026-10-19T19:00:00Z" },
            { "username": "bob", "drinks_count": 2, "units_total": 2, "last_drink_at": "2026-10-19T21:00:00Z" }
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let service = LeaderboardService::new(client(&server));
    let rows = service.fetch(50).await.unwrap();
    let names: Vec<&str> = rows.iter().map(|r| r.username.as_str()).collect();
    assert_eq!(names, vec!["alice", "bob", "carol", "idle"]);
}

#[tokio::test]
async fn concurrent_triggers_make_one_request() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/leaderboard"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!([]))
                .set_delay(Duration::from_millis(200)),
        )
        .expect(1)
        .mount(&server)
        .await;

    let controller = Arc::new(LeaderboardController::from_client(client(&server)));
    let (a, b) = tokio::join!(controller.refresh(), controller.refresh());
    let mut outcomes = vec![a.unwrap(), b.unwrap()];
    outcomes.sort_by_key(|o| *o == RefreshOutcome::Skipped);
    assert_eq!(
        outcomes,
        vec![RefreshOutcome::Refreshed, RefreshOutcome::Skipped]
    );
    assert_eq!(controller.view(), LeaderboardView::Empty);
}

#[tokio::test]
async fn server_error_shows_in_the_view() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/leaderboard"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "code": "42P01",
            "message": "relation \"public.leaderboard\" does not exist"
        })))
        .mount(&server)
        .await;

    let controller = LeaderboardController::from_client(client(&server));
    assert!(controller.manual_refresh().await.is_err());
    assert_eq!(
        controller.view(),
        LeaderboardView::Error("relation \"public.leaderboard\" does not exist".to_string())
    );
}
