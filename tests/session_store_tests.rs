mod common;

use std::net::SocketAddr;
use std::time::Duration;

use axum::{
    body::Body,
    extract::ConnectInfo,
    http::{Request, StatusCode, header},
};
use common::{PASSWORD, TestSetup};
use serde_json::json;

#[tokio::test]
async fn test_sqlite_backend_end_to_end() {
    let ctx = TestSetup::new().with_sqlite_sessions().build().await;
    let login = ctx.alice_session().await;

    let (key, payload): (String, String) =
        sqlx::query_as("SELECT session_key, payload FROM sessions")
            .fetch_one(ctx.db.pool())
            .await
            .unwrap();
    let id = ctx
        .get_with_token("/api/users/me", &login.token("access_token"))
        .await
        .json["id"]
        .as_i64()
        .unwrap();
    assert_eq!(key, format!("token-{}", id));

    let record: serde_json::Value = serde_json::from_str(&payload).unwrap();
    assert!(record["access"].is_string());
    assert!(record["refresh"].is_string());

    // Refresh rewrites the row in place
    let refreshed = ctx
        .post_json(
            "/api/auth/refresh",
            json!({ "refresh_token": login.token("refresh_token") }),
        )
        .await;
    assert_eq!(refreshed.status, StatusCode::OK);

    let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM sessions")
        .fetch_one(ctx.db.pool())
        .await
        .unwrap();
    assert_eq!(count.0, 1);
}

#[tokio::test]
async fn test_idle_session_expires() {
    let ctx = TestSetup::new()
        .with_auth(|auth| auth.session_idle_ttl = Duration::from_millis(200))
        .build()
        .await;
    let login = ctx.alice_session().await;

    tokio::time::sleep(Duration::from_millis(400)).await;

    let response = ctx
        .get_with_token("/api/users/me", &login.token("access_token"))
        .await;
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_activity_extends_session() {
    let ctx = TestSetup::new()
        .with_sqlite_sessions()
        .with_auth(|auth| auth.session_idle_ttl = Duration::from_millis(800))
        .build()
        .await;
    let login = ctx.alice_session().await;
    let access = login.token("access_token");

    for _ in 0..3 {
        tokio::time::sleep(Duration::from_millis(400)).await;
        let response = ctx.get_with_token("/api/users/me", &access).await;
        assert_eq!(response.status, StatusCode::OK);
    }
}

#[tokio::test]
async fn test_store_outage_is_503() {
    let ctx = TestSetup::new().with_sqlite_sessions().build().await;
    let login = ctx.alice_session().await;

    ctx.db.pool().close().await;

    let response = ctx
        .get_with_token("/api/users/me", &login.token("access_token"))
        .await;
    assert_eq!(response.status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(response.json["error"], "Service unavailable");
    assert!(response.headers.get(header::SET_COOKIE).is_none());

    let response = ctx.login("alice@example.com", PASSWORD).await;
    assert_eq!(response.status, StatusCode::SERVICE_UNAVAILABLE);
}

fn register_from(ip: [u8; 4], n: usize) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/api/auth/register")
        .header(header::CONTENT_TYPE, "application/json")
        .extension(ConnectInfo(SocketAddr::from((ip, 4000))))
        .body(Body::from(
            json!({
                "email": format!("user{}@example.com", n),
                "name": "someone",
                "password": PASSWORD,
            })
            .to_string(),
        ))
        .unwrap()
}

#[tokio::test]
async fn test_register_is_rate_limited_per_ip() {
    let ctx = TestSetup::new().with_rate_limits().build().await;

    for n in 0..3 {
        let response = ctx.send(register_from([10, 0, 0, 1], n)).await;
        assert_eq!(response.status, StatusCode::CREATED);
    }

    let response = ctx.send(register_from([10, 0, 0, 1], 3)).await;
    assert_eq!(response.status, StatusCode::TOO_MANY_REQUESTS);

    // Other clients are unaffected
    let response = ctx.send(register_from([10, 0, 0, 2], 4)).await;
    assert_eq!(response.status, StatusCode::CREATED);
}

#[tokio::test]
async fn test_rate_limit_needs_client_ip() {
    let ctx = TestSetup::new().with_rate_limits().build().await;

    let response = ctx.login("alice@example.com", PASSWORD).await;
    assert_eq!(response.status, StatusCode::FORBIDDEN);
}

fn register_via_proxy(forwarded_for: &str, n: usize) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/api/auth/register")
        .header(header::CONTENT_TYPE, "application/json")
        .header("x-forwarded-for", forwarded_for)
        .body(Body::from(
            json!({
                "email": format!("user{}@example.com", n),
                "name": "someone",
                "password": PASSWORD,
            })
            .to_string(),
        ))
        .unwrap()
}

#[tokio::test]
async fn test_forged_forwarded_for_entries_share_the_proxy_hop_limit() {
    let ctx = TestSetup::new().with_proxied_rate_limits().build().await;

    // The client varies its own leading entry; the proxy appends the real address
    for n in 0..3 {
        let header = format!("198.51.100.{}, 203.0.113.9", n);
        let response = ctx.send(register_via_proxy(&header, n)).await;
        assert_eq!(response.status, StatusCode::CREATED);
    }

    let response = ctx
        .send(register_via_proxy("198.51.100.77, 203.0.113.9", 3))
        .await;
    assert_eq!(response.status, StatusCode::TOO_MANY_REQUESTS);
}

