use axum::{
    body::Bytes,
    extract::State,
    http::HeaderMap,
    routing::post,
    Json, Router,
};
use serde_json::{json, Value};
use tracing::{info, warn};
use tripmate_lifecycle::{PaymentError, ReconcileOutcome};

use crate::{error::AppError, state::AppState};

pub const SIGNATURE_HEADER: &str = "x-razorpay-signature";
pub const EVENT_ID_HEADER: &str = "x-razorpay-event-id";

pub fn routes() -> Router<AppState> {
    Router::new().route("/api/payment-verification", post(payment_webhook))
}

/// POST /api/payment-verification
///
/// Takes the raw body so the signature is checked over the exact bytes sent.
async fn payment_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>, AppError> {
    let signature = headers.get(SIGNATURE_HEADER).and_then(|v| v.to_str().ok());
    let event_id = headers.get(EVENT_ID_HEADER).and_then(|v| v.to_str().ok());

    let result = state.reconciler.handle_webhook(&body, signature, event_id).await;
    let outcome = match &result {
        Ok(ReconcileOutcome::Paid { .. }) => "paid",
        Ok(ReconcileOutcome::Duplicate { .. }) => "duplicate",
        Ok(ReconcileOutcome::Ignored { .. }) => "ignored",
        Err(PaymentError::InvalidSignature) => "rejected",
        Err(_) => "failed",
    };
    state.metrics.webhook_outcomes.with_label_values(&[outcome]).inc();

    match result {
        Ok(ReconcileOutcome::Paid { request_id }) => {
            info!(request_id = %request_id, "Payment settled");
        }
        Ok(other) => {
            info!(outcome = ?other, "Payment webhook acknowledged");
        }
        Err(e) => {
            warn!(event_id = ?event_id, "Payment webhook failed: {}", e);
            return Err(e.into());
        }
    }

    Ok(Json(json!({ "status": "ok" })))
}
