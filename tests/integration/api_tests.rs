//! API tests, served in-process over the in-memory store

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHasher, SaltString},
    Argon2,
};
use axum::{
    body::{to_bytes, Body},
    extract::connect_info::MockConnectInfo,
    http::{header, Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use std::{net::SocketAddr, sync::Arc};
use tower::ServiceExt;

use kiosk_server::{
    config::{
        AdminConfig, AppConfig, DatabaseConfig, EmailConfig, LifecycleConfig, LoggingConfig,
        RateLimitConfig, RedisConfig, ServerConfig, SweepConfig,
    },
    create_router,
    repository::MemoryStore,
    services::{dispatcher::LogDispatcher, Services},
    with_rate_limit, AppState,
};

const ADMIN_PASSWORD: &str = "reception-desk";

fn test_config() -> AppConfig {
    let salt = SaltString::generate(&mut OsRng);
    let password_hash = Argon2::default()
        .hash_password(ADMIN_PASSWORD.as_bytes(), &salt)
        .expect("hash admin password")
        .to_string();

    AppConfig {
        server: ServerConfig::default(),
        database: DatabaseConfig::default(),
        admin: AdminConfig {
            password_hash,
            jwt_secret: "integration-test-secret".to_string(),
            ..AdminConfig::default()
        },
        logging: LoggingConfig::default(),
        email: EmailConfig::default(),
        redis: RedisConfig::default(),
        lifecycle: LifecycleConfig {
            timezone: "UTC".to_string(),
            ..LifecycleConfig::default()
        },
        sweep: SweepConfig::default(),
        rate_limit: RateLimitConfig::default(),
    }
}

fn app() -> Router {
    let config = test_config();
    let services = Services::new(
        Arc::new(MemoryStore::new()),
        Arc::new(LogDispatcher),
        &config,
        None,
    )
    .expect("build services");

    create_router(AppState {
        config: Arc::new(config),
        services: Arc::new(services),
    })
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.expect("request failed");
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("read body");
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, body)
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::post(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .expect("build request")
}

fn get(uri: &str) -> Request<Body> {
    Request::get(uri).body(Body::empty()).expect("build request")
}

fn check_in_body() -> Value {
    json!({
        "first_name": "Ana",
        "last_name": "Smith",
        "company": "Acme",
        "reason": "Quarterly review",
        "host_email": "bob@example.com",
        "host_name": "Bob Martin"
    })
}

async fn admin_token(app: &Router) -> String {
    let (status, body) = send(
        app,
        post_json(
            "/api/v1/admin/login",
            json!({ "username": "admin", "password": ADMIN_PASSWORD }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    body["token"].as_str().expect("No token in response").to_string()
}

#[tokio::test]
async fn test_health_check() {
    let app = app();
    let (status, body) = send(&app, get("/api/v1/health")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
}

#[tokio::test]
async fn test_readiness_check() {
    let app = app();
    let (status, body) = send(&app, get("/api/v1/ready")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ready");
}

#[tokio::test]
async fn test_check_in_returns_badge() {
    let app = app();
    let (status, body) = send(&app, post_json("/api/v1/visits/check-in", check_in_body())).await;

    assert_eq!(status, StatusCode::CREATED);
    assert!(body["visit_id"].is_i64());
    assert_eq!(body["expected_duration"], 180);
    let qr = body["qr_token"].as_str().expect("qr token");
    assert!(!qr.is_empty());
    assert!(body["checkout_url"].as_str().expect("url").contains(qr));
}

#[tokio::test]
async fn test_badge_checkout_url_is_served() {
    let app = app();
    let (_, badge) = send(&app, post_json("/api/v1/visits/check-in", check_in_body())).await;
    let url = badge["checkout_url"].as_str().expect("url");
    let path = url
        .strip_prefix("http://localhost:8080")
        .expect("url under the public base");

    let (status, summary) = send(&app, get(path)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(summary["full_name"], "Ana Smith");
}

#[tokio::test]
async fn test_check_in_rejects_invalid_host_email() {
    let app = app();
    let mut form = check_in_body();
    form["host_email"] = json!("not-an-email");

    let (status, body) = send(&app, post_json("/api/v1/visits/check-in", form)).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["message"].as_str().expect("message").contains("host_email"));
}

#[tokio::test]
async fn test_qr_checkout_then_second_checkout_conflicts() {
    let app = app();
    let (_, badge) = send(&app, post_json("/api/v1/visits/check-in", check_in_body())).await;
    let qr = badge["qr_token"].as_str().expect("qr token").to_string();

    let (status, summary) = send(&app, get(&format!("/api/v1/visits/verify?token={}", qr))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(summary["full_name"], "Ana Smith");
    assert_eq!(summary["expected_duration_minutes"], 180);

    let (status, body) = send(
        &app,
        post_json("/api/v1/visits/check-out", json!({ "qr_token": qr })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["checkout_method"], "qr_rescan");
    assert_eq!(body["full_name"], "Ana Smith");

    let (status, body) = send(
        &app,
        post_json("/api/v1/visits/check-out", json!({ "qr_token": qr })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], 6);
}

#[tokio::test]
async fn test_manual_checkout_by_identity() {
    let app = app();
    send(&app, post_json("/api/v1/visits/check-in", check_in_body())).await;

    let (status, body) = send(
        &app,
        post_json(
            "/api/v1/visits/check-out",
            json!({ "first_name": "ana", "last_name": "SMITH", "company": " Acme " }),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["checkout_method"], "manual_lookup");
}

#[tokio::test]
async fn test_checkout_without_target_is_bad_request() {
    let app = app();
    let (status, _) = send(&app, post_json("/api/v1/visits/check-out", json!({}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_unknown_qr_is_not_found() {
    let app = app();
    let (status, body) = send(&app, get("/api/v1/visits/verify?token=nope")).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], 4);
}

#[tokio::test]
async fn test_host_action_with_unknown_token() {
    let app = app();
    let (status, body) = send(&app, get("/host-action?token=deadbeef&action=left")).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], 9);
}

#[tokio::test]
async fn test_host_action_with_unknown_action() {
    let app = app();
    let (status, _) = send(&app, get("/host-action?token=deadbeef&action=maybe")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_admin_requires_token() {
    let app = app();
    let (status, _) = send(&app, get("/api/v1/admin/visits")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_login_invalid_credentials() {
    let app = app();
    let (status, body) = send(
        &app,
        post_json(
            "/api/v1/admin/login",
            json!({ "username": "admin", "password": "wrong" }),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], 2);
}

#[tokio::test]
async fn test_admin_lists_and_closes_visits() {
    let app = app();
    let (_, badge) = send(&app, post_json("/api/v1/visits/check-in", check_in_body())).await;
    let visit_id = badge["visit_id"].as_i64().expect("visit id");
    let token = admin_token(&app).await;
    let auth = format!("Bearer {}", token);

    let request = Request::get("/api/v1/admin/visits?status=checked_in")
        .header(header::AUTHORIZATION, &auth)
        .body(Body::empty())
        .expect("build request");
    let (status, body) = send(&app, request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().expect("list").len(), 1);

    let request = Request::post(format!("/api/v1/admin/visits/{}/check-out", visit_id))
        .header(header::AUTHORIZATION, &auth)
        .body(Body::empty())
        .expect("build request");
    let (status, body) = send(&app, request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["checkout_method"], "manual_admin");

    let request = Request::get("/api/v1/admin/dashboard")
        .header(header::AUTHORIZATION, &auth)
        .body(Body::empty())
        .expect("build request");
    let (status, body) = send(&app, request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["visitors_today"], 1);
    assert_eq!(body["currently_on_site"], 0);
}

#[tokio::test]
async fn test_admin_export_is_csv() {
    let app = app();
    send(&app, post_json("/api/v1/visits/check-in", check_in_body())).await;
    let token = admin_token(&app).await;

    let request = Request::get("/api/v1/admin/export")
        .header(header::AUTHORIZATION, format!("Bearer {}", token))
        .body(Body::empty())
        .expect("build request");
    let response = app.clone().oneshot(request).await.expect("request failed");

    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    assert!(content_type.starts_with("text/csv"));

    let bytes = to_bytes(response.into_body(), usize::MAX).await.expect("body");
    let text = String::from_utf8(bytes.to_vec()).expect("utf-8");
    assert_eq!(text.lines().count(), 2);
    assert!(text.contains("Smith"));
}

#[tokio::test]
async fn test_host_directory_names_the_host() {
    let app = app();
    let host = json!({
        "email": "Bob@Example.com",
        "name": "Robert Martin",
        "department": "Finance"
    });

    let request = Request::put("/api/v1/admin/hosts")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(host.to_string()))
        .expect("build request");
    let (status, _) = send(&app, request).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let token = admin_token(&app).await;
    let request = Request::put("/api/v1/admin/hosts")
        .header(header::CONTENT_TYPE, "application/json")
        .header(header::AUTHORIZATION, format!("Bearer {}", token))
        .body(Body::from(host.to_string()))
        .expect("build request");
    let (status, body) = send(&app, request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["email"], "bob@example.com");

    let (status, body) = send(&app, get("/api/v1/hosts")).await;
    assert_eq!(status, StatusCode::OK);
    let hosts = body.as_array().expect("list");
    assert_eq!(hosts.len(), 1);
    assert_eq!(hosts[0]["name"], "Robert Martin");

    let (_, badge) = send(&app, post_json("/api/v1/visits/check-in", check_in_body())).await;
    let visit_id = badge["visit_id"].as_i64().expect("visit id");
    let request = Request::get("/api/v1/admin/visits")
        .header(header::AUTHORIZATION, format!("Bearer {}", token))
        .body(Body::empty())
        .expect("build request");
    let (_, body) = send(&app, request).await;
    let visit = body
        .as_array()
        .expect("list")
        .iter()
        .find(|v| v["id"].as_i64() == Some(visit_id))
        .expect("visit listed")
        .clone();
    assert_eq!(visit["host_name"], "Robert Martin");
}

#[tokio::test]
async fn test_rate_limit_rejects_bursts_per_peer() {
    let limits = RateLimitConfig {
        per_second: 60,
        burst_size: 2,
    };
    let app = with_rate_limit(app(), &limits)
        .expect("rate limit layer")
        .layer(MockConnectInfo(SocketAddr::from(([203, 0, 113, 7], 4242))));

    let (first, _) = send(&app, get("/api/v1/health")).await;
    let (second, _) = send(&app, get("/api/v1/health")).await;
    let (third, _) = send(&app, get("/api/v1/health")).await;

    assert_eq!(first, StatusCode::OK);
    assert_eq!(second, StatusCode::OK);
    assert_eq!(third, StatusCode::TOO_MANY_REQUESTS);
}
