use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    http::{header, HeaderMap, Method, Request, StatusCode},
    Router,
};
use chrono::Utc;
use jsonwebtoken::{encode, EncodingKey, Header};
use secrecy::SecretString;
use serde_json::{json, Value};
use tower::ServiceExt;
use tripmate_api::{
    app,
    state::{AppState, AuthSettings, Services, Settings},
};
use tripmate_core::memory::{InMemoryPaymentEventRepository, InMemoryRequestRepository, InMemoryUserRepository};
use tripmate_core::payment::MockPaymentGateway;
use tripmate_lifecycle::signature::sign;
use tripmate_pricing::Tariff;

const SESSION_SECRET: &str = "test-session-secret";
const ID_TOKEN_SECRET: &str = "test-id-token-secret";
const WEBHOOK_SECRET: &str = "test-webhook-secret";

struct TestApp {
    router: Router,
    users: Arc<InMemoryUserRepository>,
}

fn test_app(webhook_secret: Option<&str>) -> TestApp {
    let users = Arc::new(InMemoryUserRepository::new());
    let services = Services {
        requests: Arc::new(InMemoryRequestRepository::new()),
        users: users.clone(),
        payment_events: Arc::new(InMemoryPaymentEventRepository::new()),
        gateway: Arc::new(MockPaymentGateway),
        webhook_secret: webhook_secret.map(|s| SecretString::from(s.to_string())),
        kafka: None,
        redis: None,
    };
    let settings = Settings {
        auth: AuthSettings {
            session_secret: SESSION_SECRET.to_string(),
            id_token_secret: ID_TOKEN_SECRET.to_string(),
            session_ttl_seconds: 5 * 24 * 60 * 60,
            secure_cookies: false,
        },
        cors_origins: Vec::new(),
        rate_limit_per_minute: 120,
        payment_key_id: Some("rzp_test_key".to_string()),
        currency: "INR".to_string(),
        tariff: Tariff::default(),
    };
    let state = AppState::new(services, settings).unwrap();
    TestApp {
        router: app(state),
        users,
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn id_token(uid: &str) -> String {
    let claims = json!({
        "sub": uid,
        "email": format!("{}@example.com", uid),
        "exp": Utc::now().timestamp() + 3600,
    });
    encode(&Header::default(), &claims, &EncodingKey::from_secret(ID_TOKEN_SECRET.as_bytes())).unwrap()
}

fn request(method: Method, uri: &str, cookie: Option<&str>, body: Option<Value>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

async fn send(router: &Router, req: Request<Body>) -> (StatusCode, HeaderMap, Value) {
    let response = router.clone().oneshot(req).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, headers, body)
}

fn session_from(headers: &HeaderMap) -> String {
    headers
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .find(|v| v.starts_with("session="))
        .and_then(|v| v.split(';').next())
        .map(str::to_string)
        .expect("response sets a session cookie")
}

async fn sign_in(router: &Router, uid: &str) -> String {
    let (status, headers, _) = send(
        router,
        request(Method::POST, "/api/auth/session", None, Some(json!({ "idToken": id_token(uid) }))),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    session_from(&headers)
}

/// Sign in and create a profile, returning the re-issued cookie that carries the role.
async fn sign_up(router: &Router, uid: &str, profile: Value) -> String {
    let cookie = sign_in(router, uid).await;
    let (status, headers, _) = send(router, request(Method::POST, "/api/users", Some(&cookie), Some(profile))).await;
    assert_eq!(status, StatusCode::OK);
    session_from(&headers)
}

async fn active_guide(t: &TestApp, uid: &str) -> String {
    let cookie = sign_up(
        &t.router,
        uid,
        json!({ "role": "Guide", "display_name": "Ravi", "gender": "female" }),
    )
    .await;
    let (status, _, body) = send(
        &t.router,
        request(
            Method::PUT,
            "/api/users/me/guide-profile",
            Some(&cookie),
            Some(json!({
                "address": { "city": "Pune", "district": "Pune" },
                "local_expertise": ["education"],
                "id_document_ref": "uploads/id.pdf"
            })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["onboarding_state"], "verification-pending");

    let (status, _, _) = send(
        &t.router,
        request(
            Method::PUT,
            "/api/users/me/availability",
            Some(&cookie),
            Some(json!({ "is_available": true })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    t.users.grant_admin("admin-1").unwrap();
    let admin = sign_in(&t.router, "admin-1").await;
    let (status, _, body) = send(
        &t.router,
        request(
            Method::POST,
            &format!("/api/admin/guides/{}/verification", uid),
            Some(&admin),
            Some(json!({ "state": "active", "note": "documents checked" })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["onboarding_state"], "active");
    cookie
}

async fn traveler(t: &TestApp, uid: &str) -> String {
    sign_up(
        &t.router,
        uid,
        json!({ "role": "Traveler", "display_name": "Asha", "gender": "female" }),
    )
    .await
}

/// Drafts and submits a four-hour education trip in Pune, returning its id.
async fn submitted_request(t: &TestApp, cookie: &str) -> String {
    let (status, _, body) = send(&t.router, request(Method::POST, "/api/requests", Some(cookie), None)).await;
    assert_eq!(status, StatusCode::CREATED);
    let id = body["id"].as_str().unwrap().to_string();

    let steps = [
        json!({
            "purpose": "education",
            "sub_purpose": "admission",
            "college_name": "Fergusson College",
            "college_address": { "district": "Pune" }
        }),
        json!({ "medium": "bus" }),
        json!({ "at_destination": true }),
        json!({ "date": "2026-11-02", "start_time": "09:00:00", "end_time": "13:00:00" }),
    ];
    for (i, step) in steps.into_iter().enumerate() {
        let uri = format!("/api/requests/{}/steps/{}", id, i + 1);
        let (status, _, _) = send(&t.router, request(Method::PUT, &uri, Some(cookie), Some(step))).await;
        assert_eq!(status, StatusCode::OK, "step {}", i + 1);
    }

    let (status, _, body) = send(
        &t.router,
        request(Method::GET, &format!("/api/requests/{}/estimate", id), Some(cookie), None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["estimated_cost"], 550.0);
    assert_eq!(body["duration_minutes"], 240);

    let (status, _, body) = send(
        &t.router,
        request(Method::POST, &format!("/api/requests/{}/submit", id), Some(cookie), None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "pending");
    id
}

/// Runs selection, acceptance and checkout; returns the gateway order id.
async fn awaiting_payment(t: &TestApp, traveler: &str, guide: &str, id: &str) -> String {
    let (status, _, body) = send(
        &t.router,
        request(Method::GET, &format!("/api/requests/{}/matches", id), Some(traveler), None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 1);
    assert_eq!(body[0]["uid"], "guide-1");

    let (status, _, body) = send(
        &t.router,
        request(
            Method::POST,
            &format!("/api/requests/{}/guide", id),
            Some(traveler),
            Some(json!({ "guide_id": "guide-1" })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "guide-selected");

    let (status, _, body) = send(
        &t.router,
        request(
            Method::POST,
            &format!("/api/requests/{}/response", id),
            Some(guide),
            Some(json!({ "accept": true })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "confirmed");

    let (status, _, body) = send(
        &t.router,
        request(Method::POST, &format!("/api/requests/{}/payment", id), Some(traveler), None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["request"]["status"], "payment-pending");
    assert_eq!(body["order"]["amount"], 55_000);
    assert_eq!(body["key_id"], "rzp_test_key");
    body["order"]["id"].as_str().unwrap().to_string()
}

fn captured(request_id: &str, order_id: &str, amount: i64) -> Vec<u8> {
    serde_json::to_vec(&json!({
        "entity": "event",
        "event": "payment.captured",
        "payload": {
            "payment": {
                "entity": {
                    "id": "pay_test_1",
                    "amount": amount,
                    "currency": "INR",
                    "order_id": order_id,
                    "notes": { "request_id": request_id }
                }
            }
        }
    }))
    .unwrap()
}

fn webhook(body: Vec<u8>, signature: &str) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri("/api/payment-verification")
        .header(header::CONTENT_TYPE, "application/json")
        .header("x-razorpay-signature", signature)
        .body(Body::from(body))
        .unwrap()
}

async fn get_request(t: &TestApp, cookie: &str, id: &str) -> Value {
    let (status, _, body) = send(&t.router, request(Method::GET, &format!("/api/requests/{}", id), Some(cookie), None)).await;
    assert_eq!(status, StatusCode::OK);
    body
}

// ============================================================================
// Tests
// ============================================================================

#[tokio::test]
async fn test_health_is_public() {
    let t = test_app(None);
    let (status, _, body) = send(&t.router, request(Method::GET, "/health", None, None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn test_protected_routes_need_a_session() {
    let t = test_app(None);
    let (status, _, _) = send(&t.router, request(Method::GET, "/api/requests", None, None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _, _) = send(
        &t.router,
        request(Method::GET, "/api/requests", Some("session=not-a-jwt"), None),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_bad_id_token_is_rejected() {
    let t = test_app(None);
    let forged = encode(
        &Header::default(),
        &json!({ "sub": "mallory", "exp": Utc::now().timestamp() + 3600 }),
        &EncodingKey::from_secret(b"some-other-secret"),
    )
    .unwrap();
    let (status, headers, _) = send(
        &t.router,
        request(Method::POST, "/api/auth/session", None, Some(json!({ "idToken": forged }))),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(headers.get(header::SET_COOKIE).is_none());
}

#[tokio::test]
async fn test_session_cookie_is_http_only_and_bearer_works() {
    let t = test_app(None);
    let (status, headers, body) = send(
        &t.router,
        request(Method::POST, "/api/auth/session", None, Some(json!({ "idToken": id_token("asha") }))),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["has_profile"], false);

    let raw = headers.get(header::SET_COOKIE).unwrap().to_str().unwrap().to_string();
    assert!(raw.contains("HttpOnly"));
    assert!(raw.contains("Max-Age=432000"));

    let token = session_from(&headers).trim_start_matches("session=").to_string();
    let req = Request::builder()
        .uri("/api/requests")
        .header(header::AUTHORIZATION, format!("Bearer {}", token))
        .body(Body::empty())
        .unwrap();
    let (status, _, body) = send(&t.router, req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!([]));
}

#[tokio::test]
async fn test_role_is_fixed_at_signup() {
    let t = test_app(None);
    let cookie = traveler(&t, "traveler-1").await;

    let (status, _, _) = send(
        &t.router,
        request(
            Method::POST,
            "/api/users",
            Some(&cookie),
            Some(json!({ "role": "Guide", "display_name": "Asha" })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _, body) = send(&t.router, request(Method::GET, "/api/users/me", Some(&cookie), None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["role"], "Traveler");
    assert_eq!(body["email"], "traveler-1@example.com");
}

#[tokio::test]
async fn test_guides_cannot_create_requests() {
    let t = test_app(None);
    let guide = active_guide(&t, "guide-1").await;
    let (status, _, body) = send(&t.router, request(Method::POST, "/api/requests", Some(&guide), None)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "permission denied");
}

#[tokio::test]
async fn test_strangers_cannot_read_or_act_on_a_request() {
    let t = test_app(None);
    let owner = traveler(&t, "traveler-1").await;
    let stranger = traveler(&t, "traveler-2").await;
    let id = submitted_request(&t, &owner).await;

    let (status, _, _) = send(&t.router, request(Method::GET, &format!("/api/requests/{}", id), Some(&stranger), None)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _, _) = send(
        &t.router,
        request(Method::GET, &format!("/api/requests/{}/matches", id), Some(&stranger), None),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _, _) = send(
        &t.router,
        request(Method::POST, &format!("/api/admin/requests/{}/cancel", id), Some(&owner), None),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_submit_requires_every_step() {
    let t = test_app(None);
    let cookie = traveler(&t, "traveler-1").await;
    let (_, _, body) = send(&t.router, request(Method::POST, "/api/requests", Some(&cookie), None)).await;
    let id = body["id"].as_str().unwrap().to_string();

    // Step 2 before step 1
    let (status, _, _) = send(
        &t.router,
        request(
            Method::PUT,
            &format!("/api/requests/{}/steps/2", id),
            Some(&cookie),
            Some(json!({ "medium": "bus" })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _, _) = send(
        &t.router,
        request(Method::POST, &format!("/api/requests/{}/submit", id), Some(&cookie), None),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_full_booking_lifecycle() {
    let t = test_app(Some(WEBHOOK_SECRET));
    let guide = active_guide(&t, "guide-1").await;
    let owner = traveler(&t, "traveler-1").await;
    let id = submitted_request(&t, &owner).await;
    let order_id = awaiting_payment(&t, &owner, &guide, &id).await;

    let body = captured(&id, &order_id, 55_000);
    let signature = sign(WEBHOOK_SECRET.as_bytes(), &body);
    let (status, _, reply) = send(&t.router, webhook(body, &signature)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(reply["status"], "ok");

    let paid = get_request(&t, &owner, &id).await;
    assert_eq!(paid["status"], "paid");
    assert_eq!(paid["payment_processed"], true);
    let pin = paid["trip_pin"].as_str().unwrap().to_string();
    assert_eq!(pin.len(), 4);

    // The guide gets the PIN from the traveler, never from the API
    let seen_by_guide = get_request(&t, &guide, &id).await;
    assert!(seen_by_guide["trip_pin"].is_null());

    let (status, _, _) = send(
        &t.router,
        request(
            Method::POST,
            &format!("/api/requests/{}/start", id),
            Some(&guide),
            Some(json!({ "pin": "not-it" })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _, started) = send(
        &t.router,
        request(
            Method::POST,
            &format!("/api/requests/{}/start", id),
            Some(&guide),
            Some(json!({ "pin": pin })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(started["trip_started_at"].is_string());

    let admin = sign_in(&t.router, "admin-1").await;
    let (status, _, done) = send(
        &t.router,
        request(Method::POST, &format!("/api/admin/requests/{}/complete", id), Some(&admin), None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(done["status"], "completed");

    let response = t
        .router
        .clone()
        .oneshot(request(Method::GET, "/metrics", None, None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let metrics = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(metrics.contains("tripmate_payment_webhooks_total{outcome=\"paid\"} 1"));
    assert!(metrics.contains("tripmate_request_transitions_total{to=\"completed\"} 1"));
}

#[tokio::test]
async fn test_decline_returns_request_to_pending() {
    let t = test_app(None);
    let guide = active_guide(&t, "guide-1").await;
    let owner = traveler(&t, "traveler-1").await;
    let id = submitted_request(&t, &owner).await;

    send(
        &t.router,
        request(
            Method::POST,
            &format!("/api/requests/{}/guide", id),
            Some(&owner),
            Some(json!({ "guide_id": "guide-1" })),
        ),
    )
    .await;
    let (status, _, body) = send(
        &t.router,
        request(
            Method::POST,
            &format!("/api/requests/{}/response", id),
            Some(&guide),
            Some(json!({ "accept": false })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "pending");
    assert!(body["guide_id"].is_null());

    // No longer assigned, so a second answer is refused
    let (status, _, _) = send(
        &t.router,
        request(
            Method::POST,
            &format!("/api/requests/{}/response", id),
            Some(&guide),
            Some(json!({ "accept": true })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_tampered_webhook_is_rejected_without_effect() {
    let t = test_app(Some(WEBHOOK_SECRET));
    let guide = active_guide(&t, "guide-1").await;
    let owner = traveler(&t, "traveler-1").await;
    let id = submitted_request(&t, &owner).await;
    let order_id = awaiting_payment(&t, &owner, &guide, &id).await;

    let signature = sign(WEBHOOK_SECRET.as_bytes(), &captured(&id, &order_id, 55_000));
    let tampered = captured(&id, &order_id, 100);
    let (status, _, body) = send(&t.router, webhook(tampered, &signature)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());

    let current = get_request(&t, &owner, &id).await;
    assert_eq!(current["status"], "payment-pending");
    assert!(current["trip_pin"].is_null());
}

#[tokio::test]
async fn test_replayed_webhook_is_a_noop() {
    let t = test_app(Some(WEBHOOK_SECRET));
    let guide = active_guide(&t, "guide-1").await;
    let owner = traveler(&t, "traveler-1").await;
    let id = submitted_request(&t, &owner).await;
    let order_id = awaiting_payment(&t, &owner, &guide, &id).await;

    let body = captured(&id, &order_id, 55_000);
    let signature = sign(WEBHOOK_SECRET.as_bytes(), &body);

    let (status, _, _) = send(&t.router, webhook(body.clone(), &signature)).await;
    assert_eq!(status, StatusCode::OK);
    let first = get_request(&t, &owner, &id).await;

    let (status, _, _) = send(&t.router, webhook(body, &signature)).await;
    assert_eq!(status, StatusCode::OK);
    let second = get_request(&t, &owner, &id).await;

    assert_eq!(first["trip_pin"], second["trip_pin"]);
    assert_eq!(first["version"], second["version"]);
}

#[tokio::test]
async fn test_webhook_without_secret_is_a_server_error() {
    let t = test_app(None);
    let body = captured("00000000-0000-0000-0000-000000000000", "order_1", 100);
    let signature = sign(b"anything", &body);
    let (status, _, _) = send(&t.router, webhook(body, &signature)).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn test_mismatched_payment_lands_in_review_queue() {
    let t = test_app(Some(WEBHOOK_SECRET));
    let guide = active_guide(&t, "guide-1").await;
    let owner = traveler(&t, "traveler-1").await;
    let id = submitted_request(&t, &owner).await;
    let order_id = awaiting_payment(&t, &owner, &guide, &id).await;

    // Correctly signed, but for the wrong amount
    let body = captured(&id, &order_id, 100);
    let signature = sign(WEBHOOK_SECRET.as_bytes(), &body);
    let (status, _, _) = send(&t.router, webhook(body, &signature)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let admin = sign_in(&t.router, "admin-1").await;
    let (status, _, events) = send(&t.router, request(Method::GET, "/api/admin/payment-events", Some(&admin), None)).await;
    assert_eq!(status, StatusCode::OK);
    let events = events.as_array().unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0]["status"], "needs-review");

    let (status, _, _) = send(&t.router, request(Method::GET, "/api/admin/payment-events", Some(&owner), None)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_push_token_opt_in() {
    let t = test_app(None);
    let cookie = traveler(&t, "traveler-1").await;
    let (status, _, _) = send(
        &t.router,
        request(
            Method::POST,
            "/api/users/me/push-tokens",
            Some(&cookie),
            Some(json!({ "token": "device-token-1" })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (_, _, me) = send(&t.router, request(Method::GET, "/api/users/me", Some(&cookie), None)).await;
    assert_eq!(me["fcm_tokens"], json!(["device-token-1"]));
}
