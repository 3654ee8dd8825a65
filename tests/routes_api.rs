#![cfg(feature = "inmem-store")]

mod common;

use std::time::Duration;

use actix_web::{test, web, App};
use otpauth::config::AuthConfig;
use otpauth::{config, AppState};
use serde_json::{json, Value};

macro_rules! app {
    ($h:expr) => {
        test::init_service(
            App::new()
                .app_data(web::Data::new(AppState { auth: $h.service.clone() }))
                .configure(config),
        )
        .await
    };
}

macro_rules! post {
    ($app:expr, $uri:expr, $body:expr) => {{
        let req = test::TestRequest::post().uri($uri).set_json(&$body).to_request();
        test::call_service(&$app, req).await
    }};
}

async fn body_json(resp: actix_web::dev::ServiceResponse) -> Value {
    serde_json::from_slice(&test::read_body(resp).await).unwrap()
}

#[actix_web::test]
async fn login_flow_over_http() {
    let h = common::default_harness();
    let app = app!(h);

    let resp = post!(app, "/api/v1/auth/register", json!({"email": "a@x.com"}));
    assert_eq!(resp.status(), 201);
    assert!(body_json(resp).await["message"].as_str().unwrap().contains("Registration successful"));

    let resp = post!(app, "/api/v1/auth/request-otp", json!({"email": "a@x.com"}));
    assert_eq!(resp.status(), 200);
    let body = body_json(resp).await;
    let code = h.notifier.last_code_for("a@x.com").unwrap();
    assert!(!body.to_string().contains(&code), "passcode must not be echoed");

    let resp = post!(app, "/api/v1/auth/verify-otp", json!({"email": "a@x.com", "otp": code}));
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.headers().get("cache-control").unwrap(), "no-store");
    let body = body_json(resp).await;
    assert_eq!(body["message"], "Login successful.");
    let token = body["token"].as_str().unwrap().to_string();

    let req = test::TestRequest::get()
        .uri("/api/v1/auth/me")
        .insert_header(("Authorization", format!("Bearer {token}")))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);
    assert_eq!(body_json(resp).await["email"], "a@x.com");

    // replay
    let resp = post!(app, "/api/v1/auth/verify-otp", json!({"email": "a@x.com", "code": code}));
    assert_eq!(resp.status(), 400);
    assert_eq!(body_json(resp).await["error"], "InvalidOrExpired");
}

#[actix_web::test]
async fn registration_errors() {
    let h = common::default_harness();
    let app = app!(h);

    assert_eq!(post!(app, "/api/v1/auth/register", json!({"email": "a@x.com"})).status(), 201);

    let resp = post!(app, "/api/v1/auth/register", json!({"email": "a@x.com"}));
    assert_eq!(resp.status(), 400);
    assert_eq!(body_json(resp).await["error"], "AlreadyRegistered");

    let resp = post!(app, "/api/v1/auth/register", json!({"email": "nope"}));
    assert_eq!(resp.status(), 400);
    assert_eq!(body_json(resp).await["error"], "InvalidEmail");

    let req = test::TestRequest::post()
        .uri("/api/v1/auth/register")
        .insert_header(("content-type", "application/json"))
        .set_payload("{not json")
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 400);
    assert_eq!(body_json(resp).await["error"], "ValidationError");
}

#[actix_web::test]
async fn unknown_user_is_404_on_request_but_generic_on_verify() {
    let h = common::default_harness();
    let app = app!(h);

    let resp = post!(app, "/api/v1/auth/request-otp", json!({"email": "b@x.com"}));
    assert_eq!(resp.status(), 404);
    assert_eq!(body_json(resp).await["error"], "UserNotFound");

    let resp = post!(app, "/api/v1/auth/verify-otp", json!({"email": "b@x.com", "otp": "123456"}));
    assert_eq!(resp.status(), 400);
    assert_eq!(body_json(resp).await["error"], "InvalidOrExpired");
}

#[actix_web::test]
async fn rate_limited_request_returns_429_with_retry_after() {
    let h = common::harness(AuthConfig { rate_limit_count: 3, rate_limit_window: Duration::from_secs(60), ..AuthConfig::default() });
    let app = app!(h);
    post!(app, "/api/v1/auth/register", json!({"email": "a@x.com"}));

    for _ in 0..3 {
        assert_eq!(post!(app, "/api/v1/auth/request-otp", json!({"email": "a@x.com"})).status(), 200);
    }
    let resp = post!(app, "/api/v1/auth/request-otp", json!({"email": "a@x.com"}));
    assert_eq!(resp.status(), 429);
    assert_eq!(resp.headers().get("retry-after").unwrap(), "60");
    let body = body_json(resp).await;
    assert_eq!(body["error"], "RateLimited");
    assert_eq!(body["retry_after_seconds"], 60);
}

#[actix_web::test]
async fn me_requires_a_valid_token() {
    let h = common::default_harness();
    let app = app!(h);

    let req = test::TestRequest::get().uri("/api/v1/auth/me").to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 401);

    let req = test::TestRequest::get()
        .uri("/api/v1/auth/me")
        .insert_header(("Authorization", "Bearer garbage"))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 401);
}
