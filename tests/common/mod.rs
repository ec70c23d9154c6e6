#![allow(dead_code)]

use drink_off::auth::Session;
use drink_off::config::ClientOptions;
use drink_off::DrinkOff;
use serde_json::{json, Value};
use std::sync::Arc;
use wiremock::matchers::{body_json, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const ANON_KEY: &str = "test-anon-key";
pub const USER_ID: &str = "user-1";
pub const ACCESS_TOKEN: &str = "access-1";

pub fn init_logging() {
    let _ = pretty_env_logger::try_init();
}

pub fn client(server: &MockServer) -> Arc<DrinkOff> {
    init_logging();
    let options = ClientOptions::new(&server.uri(), ANON_KEY);
    Arc::new(DrinkOff::new(options).unwrap())
}

pub fn session_body() -> Value {
    json!({
        "access_token": ACCESS_TOKEN,
        "token_type": "bearer",
        "expires_in": 3600,
        "refresh_token": "refresh-1",
        "user": {
            "id": USER_ID,
            "role": "authenticated",
            "is_anonymous": true
        }
    })
}

/// Anonymous sign-in, expected `times` times
pub async fn mount_signup(server: &MockServer, times: u64) {
    Mock::given(method("POST"))
        .and(path("/auth/v1/signup"))
        .respond_with(ResponseTemplate::new(200).set_body_json(session_body()))
        .expect(times)
        .mount(server)
        .await;
}

/// A session whose access token ran out ten seconds ago
pub fn expired_session() -> Session {
    let mut body = session_body();
    body["expires_at"] = json!(chrono::Utc::now().timestamp() - 10);
    serde_json::from_value(body).unwrap()
}

/// Refresh-token exchange handing out `access-2`, expected `times` times
pub async fn mount_refresh(server: &MockServer, times: u64) {
    let mut body = session_body();
    body["access_token"] = json!("access-2");
    body["refresh_token"] = json!("refresh-2");
    Mock::given(method("POST"))
        .and(path("/auth/v1/token"))
        .and(query_param("grant_type", "refresh_token"))
        .and(body_json(json!({ "refresh_token": "refresh-1" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .expect(times)
        .mount(server)
        .await;
}

pub fn profile(username: &str, role: &str) -> Value {
    json!({
        "id": USER_ID,
        "username": username,
        "role": role,
        "created_at": "2026-10-19T18:00:00+00:00"
    })
}

pub fn no_rows() -> ResponseTemplate {
    ResponseTemplate::new(406).set_body_json(json!({
        "code": "PGRST116",
        "details": "The result contains 0 rows",
        "hint": null,
        "message": "JSON object requested, multiple (or no) rows returned"
    }))
}
