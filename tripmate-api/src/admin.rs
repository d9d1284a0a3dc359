use axum::{
    extract::{Path, Query, State},
    routing::{get, post},
    Extension, Json, Router,
};
use chrono::Utc;
use serde::Deserialize;
use tracing::info;
use tripmate_core::payment::{PaymentEvent, PaymentEventStatus};
use tripmate_core::{GuideProfile, OnboardingState, TravelRequest};
use uuid::Uuid;

use crate::{error::AppError, middleware::auth::SessionClaims, state::AppState};

#[derive(Debug, Deserialize)]
struct VerificationDecision {
    state: OnboardingState,
    #[serde(default)]
    note: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PaymentEventQuery {
    status: Option<PaymentEventStatus>,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/guides/{uid}/verification", post(review_guide))
        .route("/requests/{id}/complete", post(complete_request))
        .route("/requests/{id}/cancel", post(cancel_request))
        .route("/payment-events", get(list_payment_events))
}

fn require_admin(claims: &SessionClaims) -> Result<(), AppError> {
    if claims.admin {
        Ok(())
    } else {
        Err(AppError::AuthorizationError("permission denied".to_string()))
    }
}

// ============================================================================
// Guide verification
// ============================================================================

/// POST /api/admin/guides/{uid}/verification
async fn review_guide(
    State(state): State<AppState>,
    Extension(claims): Extension<SessionClaims>,
    Path(uid): Path<String>,
    Json(body): Json<VerificationDecision>,
) -> Result<Json<GuideProfile>, AppError> {
    require_admin(&claims)?;
    if !matches!(body.state, OnboardingState::Active | OnboardingState::Rejected) {
        return Err(AppError::ValidationError(
            "verification can only be set to active or rejected".to_string(),
        ));
    }

    let mut profile = state
        .users
        .get_guide_profile(&uid)
        .await?
        .ok_or_else(|| AppError::NotFoundError("Guide profile not found".to_string()))?;

    profile.onboarding_state = body.state;
    profile.verification.reviewer_note = body.note;
    profile.verification.reviewed_at = Some(Utc::now());
    profile.updated_at = Utc::now();
    state.users.save_guide_profile(&profile).await?;

    info!(guide = %uid, admin = %claims.sub, state = ?profile.onboarding_state, "Guide reviewed");
    Ok(Json(profile))
}

// ============================================================================
// Request administration
// ============================================================================

/// POST /api/admin/requests/{id}/complete
async fn complete_request(
    State(state): State<AppState>,
    Extension(claims): Extension<SessionClaims>,
    Path(id): Path<Uuid>,
) -> Result<Json<TravelRequest>, AppError> {
    let request = state.lifecycle.complete(&claims.actor(), id).await?;
    Ok(Json(request))
}

/// POST /api/admin/requests/{id}/cancel
async fn cancel_request(
    State(state): State<AppState>,
    Extension(claims): Extension<SessionClaims>,
    Path(id): Path<Uuid>,
) -> Result<Json<TravelRequest>, AppError> {
    let request = state.lifecycle.cancel(&claims.actor(), id).await?;
    Ok(Json(request))
}

// ============================================================================
// Payment review queue
// ============================================================================

/// GET /api/admin/payment-events?status=needs-review
async fn list_payment_events(
    State(state): State<AppState>,
    Extension(claims): Extension<SessionClaims>,
    Query(query): Query<PaymentEventQuery>,
) -> Result<Json<Vec<PaymentEvent>>, AppError> {
    require_admin(&claims)?;
    let status = query.status.unwrap_or(PaymentEventStatus::NeedsReview);
    let events = state.payment_events.list_by_status(status).await?;
    Ok(Json(events))
}
