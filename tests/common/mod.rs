#![allow(dead_code)]

use axum::{
    Router,
    body::Body,
    http::{HeaderMap, Request, StatusCode, header},
};
use palisade::db::Database;
use palisade::jwt::TokenSettings;
use palisade::password::HashCost;
use palisade::rate_limit::RateLimitConfig;
use palisade::service::AuthConfig;
use palisade::session::{MemorySessionStore, SessionBackend};
use palisade::{ServerConfig, create_app};
use serde_json::{Value, json};
use tower::ServiceExt;

pub const ACCESS_SECRET: &[u8] = b"integration-access-secret-0123456789";
pub const REFRESH_SECRET: &[u8] = b"integration-refresh-secret-0123456789";

pub const PASSWORD: &str = "correct horse";

pub fn test_auth_config() -> AuthConfig {
    let mut auth = AuthConfig::new(TokenSettings::new(ACCESS_SECRET, REFRESH_SECRET));
    auth.hash_cost = HashCost {
        memory_kib: 8,
        iterations: 1,
        parallelism: 1,
    };
    auth
}

pub struct TestApp {
    pub app: Router,
    pub db: Database,
}

pub struct TestSetup {
    auth: AuthConfig,
    sqlite_sessions: bool,
    rate_limits: RateLimitConfig,
}

impl TestSetup {
    pub fn new() -> Self {
        Self {
            auth: test_auth_config(),
            sqlite_sessions: false,
            rate_limits: RateLimitConfig::unlimited(),
        }
    }

    pub fn with_sqlite_sessions(mut self) -> Self {
        self.sqlite_sessions = true;
        self
    }

    pub fn with_rate_limits(mut self) -> Self {
        self.rate_limits = RateLimitConfig::new(false);
        self
    }

    pub fn with_proxied_rate_limits(mut self) -> Self {
        self.rate_limits = RateLimitConfig::new(true);
        self
    }

    pub fn with_auth(mut self, f: impl FnOnce(&mut AuthConfig)) -> Self {
        f(&mut self.auth);
        self
    }

    pub async fn build(self) -> TestApp {
        let db = Database::open(":memory:")
            .await
            .expect("Failed to open test database");

        let sessions = if self.sqlite_sessions {
            SessionBackend::Sqlite(db.sessions())
        } else {
            SessionBackend::Memory(MemorySessionStore::new())
        };

        let config = ServerConfig {
            db: db.clone(),
            sessions,
            auth: self.auth,
            secure_cookies: false,
            rate_limits: self.rate_limits,
        };

        TestApp {
            app: create_app(&config).expect("Failed to create app"),
            db,
        }
    }
}

pub async fn test_app() -> TestApp {
    TestSetup::new().build().await
}

/// Response pieces the tests look at.
pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub json: Value,
}

impl TestResponse {
    pub fn set_cookies(&self) -> Vec<String> {
        self.headers
            .get_all(header::SET_COOKIE)
            .iter()
            .map(|v| v.to_str().unwrap().to_string())
            .collect()
    }

    pub fn token(&self, name: &str) -> String {
        self.json[name].as_str().unwrap().to_string()
    }
}

impl TestApp {
    pub async fn send(&self, request: Request<Body>) -> TestResponse {
        let response = self.app.clone().oneshot(request).await.unwrap();

        let status = response.status();
        let headers = response.headers().clone();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json = if body.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&body).unwrap_or(Value::Null)
        };

        TestResponse {
            status,
            headers,
            json,
        }
    }

    pub async fn post_json(&self, uri: &str, body: Value) -> TestResponse {
        self.send(json_request("POST", uri, body)).await
    }

    pub async fn get_with_token(&self, uri: &str, token: &str) -> TestResponse {
        self.send(
            Request::builder()
                .method("GET")
                .uri(uri)
                .header(header::AUTHORIZATION, format!("Bearer {}", token))
                .body(Body::empty())
                .unwrap(),
        )
        .await
    }

    pub async fn register(&self, email: &str, name: &str, password: &str) -> TestResponse {
        self.post_json(
            "/api/auth/register",
            json!({ "email": email, "name": name, "password": password }),
        )
        .await
    }

    pub async fn login(&self, email: &str, password: &str) -> TestResponse {
        self.post_json(
            "/api/auth/login",
            json!({ "email": email, "password": password }),
        )
        .await
    }

    /// Register alice and log her in, returning the login response.
    pub async fn alice_session(&self) -> TestResponse {
        let registered = self.register("alice@example.com", "alice", PASSWORD).await;
        assert_eq!(registered.status, StatusCode::CREATED);

        let login = self.login("alice@example.com", PASSWORD).await;
        assert_eq!(login.status, StatusCode::OK);
        login
    }
}

pub fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

pub fn authed_json_request(method: &str, uri: &str, token: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .header(header::AUTHORIZATION, format!("Bearer {}", token))
        .body(Body::from(body.to_string()))
        .unwrap()
}

pub fn authed_request(method: &str, uri: &str, token: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {}", token))
        .body(Body::empty())
        .unwrap()
}
