use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post, put},
    Extension, Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tripmate_core::payment::GatewayOrder;
use tripmate_core::request::StepPayload;
use tripmate_core::TravelRequest;
use tripmate_matching::MatchedGuide;
use tripmate_pricing::{service_window, Tariff};
use uuid::Uuid;

use crate::{error::AppError, middleware::auth::SessionClaims, state::AppState};

#[derive(Debug, Deserialize)]
struct SelectGuideRequest {
    guide_id: String,
}

#[derive(Debug, Deserialize)]
struct GuideResponseRequest {
    accept: bool,
}

#[derive(Debug, Deserialize)]
struct StartTripRequest {
    pin: String,
}

#[derive(Debug, Serialize)]
struct EstimateResponse {
    /// `None` until the schedule step is saved
    estimated_cost: Option<f64>,
    duration_minutes: Option<i64>,
    tariff: Tariff,
}

#[derive(Debug, Serialize)]
struct PaymentResponse {
    request: TravelRequest,
    order: GatewayOrder,
    /// Public gateway key for the checkout widget
    key_id: Option<String>,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/requests", post(create_request).get(list_requests))
        .route("/api/requests/{id}", get(get_request).delete(delete_request))
        .route("/api/requests/{id}/steps/{step}", put(save_step))
        .route("/api/requests/{id}/estimate", get(estimate))
        .route("/api/requests/{id}/submit", post(submit))
        .route("/api/requests/{id}/matches", get(find_matches))
        .route("/api/requests/{id}/guide", post(select_guide))
        .route("/api/requests/{id}/response", post(respond))
        .route("/api/requests/{id}/payment", post(begin_payment))
        .route("/api/requests/{id}/start", post(start_trip))
}

// ============================================================================
// Drafting
// ============================================================================

/// POST /api/requests
async fn create_request(
    State(state): State<AppState>,
    Extension(claims): Extension<SessionClaims>,
) -> Result<(StatusCode, Json<TravelRequest>), AppError> {
    let request = state.lifecycle.create_draft(&claims.actor()).await?;
    Ok((StatusCode::CREATED, Json(request)))
}

/// PUT /api/requests/{id}/steps/{step}
async fn save_step(
    State(state): State<AppState>,
    Extension(claims): Extension<SessionClaims>,
    Path((id, step)): Path<(Uuid, u8)>,
    Json(body): Json<Value>,
) -> Result<Json<TravelRequest>, AppError> {
    let payload = StepPayload::from_json(step, body)?;
    let request = state.lifecycle.save_step(&claims.actor(), id, payload).await?;
    Ok(Json(request))
}

/// GET /api/requests/{id}/estimate
async fn estimate(
    State(state): State<AppState>,
    Extension(claims): Extension<SessionClaims>,
    Path(id): Path<Uuid>,
) -> Result<Json<EstimateResponse>, AppError> {
    let actor = claims.actor();
    let request = state.lifecycle.get_for(&actor, id).await?;
    if !actor.owns(&request) {
        return Err(AppError::AuthorizationError("permission denied".to_string()));
    }

    let window = service_window(&request);
    Ok(Json(EstimateResponse {
        estimated_cost: state.lifecycle.estimate(&request),
        duration_minutes: window.map(|w| w.duration_minutes()),
        tariff: *state.lifecycle.estimator().tariff(),
    }))
}

/// POST /api/requests/{id}/submit
async fn submit(
    State(state): State<AppState>,
    Extension(claims): Extension<SessionClaims>,
    Path(id): Path<Uuid>,
) -> Result<Json<TravelRequest>, AppError> {
    let request = state.lifecycle.submit(&claims.actor(), id).await?;
    Ok(Json(request))
}

// ============================================================================
// Reads
// ============================================================================

/// GET /api/requests
async fn list_requests(
    State(state): State<AppState>,
    Extension(claims): Extension<SessionClaims>,
) -> Result<Json<Vec<TravelRequest>>, AppError> {
    let actor = claims.actor();
    let requests = state.lifecycle.list_for(&actor).await?;
    Ok(Json(requests.into_iter().map(|r| actor.redact(r)).collect()))
}

/// GET /api/requests/{id}
async fn get_request(
    State(state): State<AppState>,
    Extension(claims): Extension<SessionClaims>,
    Path(id): Path<Uuid>,
) -> Result<Json<TravelRequest>, AppError> {
    let actor = claims.actor();
    let request = state.lifecycle.get_for(&actor, id).await?;
    Ok(Json(actor.redact(request)))
}

/// DELETE /api/requests/{id}
async fn delete_request(
    State(state): State<AppState>,
    Extension(claims): Extension<SessionClaims>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    state.lifecycle.delete(&claims.actor(), id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/requests/{id}/matches
async fn find_matches(
    State(state): State<AppState>,
    Extension(claims): Extension<SessionClaims>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<MatchedGuide>>, AppError> {
    let guides = state.lifecycle.find_guides(&claims.actor(), id).await?;
    Ok(Json(guides))
}

// ============================================================================
// Guide selection and response
// ============================================================================

/// POST /api/requests/{id}/guide
async fn select_guide(
    State(state): State<AppState>,
    Extension(claims): Extension<SessionClaims>,
    Path(id): Path<Uuid>,
    Json(body): Json<SelectGuideRequest>,
) -> Result<Json<TravelRequest>, AppError> {
    let request = state
        .lifecycle
        .select_guide(&claims.actor(), id, &body.guide_id)
        .await?;
    Ok(Json(request))
}

/// POST /api/requests/{id}/response
async fn respond(
    State(state): State<AppState>,
    Extension(claims): Extension<SessionClaims>,
    Path(id): Path<Uuid>,
    Json(body): Json<GuideResponseRequest>,
) -> Result<Json<TravelRequest>, AppError> {
    let actor = claims.actor();
    let request = state.lifecycle.respond(&actor, id, body.accept).await?;
    Ok(Json(actor.redact(request)))
}

// ============================================================================
// Payment and trip start
// ============================================================================

/// POST /api/requests/{id}/payment
async fn begin_payment(
    State(state): State<AppState>,
    Extension(claims): Extension<SessionClaims>,
    Path(id): Path<Uuid>,
) -> Result<Json<PaymentResponse>, AppError> {
    let (request, order) = state.lifecycle.begin_payment(&claims.actor(), id).await?;
    Ok(Json(PaymentResponse {
        request,
        order,
        key_id: state.settings.payment_key_id.clone(),
    }))
}

/// POST /api/requests/{id}/start
async fn start_trip(
    State(state): State<AppState>,
    Extension(claims): Extension<SessionClaims>,
    Path(id): Path<Uuid>,
    Json(body): Json<StartTripRequest>,
) -> Result<Json<TravelRequest>, AppError> {
    let actor = claims.actor();
    let request = state.lifecycle.start_trip(&actor, id, &body.pin).await?;
    Ok(Json(actor.redact(request)))
}
