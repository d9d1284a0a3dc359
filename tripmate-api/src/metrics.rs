use axum::{extract::State, http::header, response::IntoResponse};
use prometheus::{opts, Encoder, IntCounterVec, Registry, TextEncoder};

use crate::error::AppError;
use crate::state::AppState;

/// Counters exported on `/metrics`
pub struct Metrics {
    registry: Registry,
    /// Labels: `outcome` (paid, duplicate, ignored, rejected, failed)
    pub webhook_outcomes: IntCounterVec,
    /// Labels: `kind`, `outcome` (sent, skipped, failed, lagged)
    pub notifications: IntCounterVec,
    /// Labels: `to`
    pub transitions: IntCounterVec,
}

impl Metrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let webhook_outcomes = IntCounterVec::new(
            opts!("tripmate_payment_webhooks_total", "Payment webhook deliveries by outcome"),
            &["outcome"],
        )?;
        let notifications = IntCounterVec::new(
            opts!("tripmate_notifications_total", "Notification dispatch results"),
            &["kind", "outcome"],
        )?;
        let transitions = IntCounterVec::new(
            opts!("tripmate_request_transitions_total", "Committed request status changes"),
            &["to"],
        )?;

        registry.register(Box::new(webhook_outcomes.clone()))?;
        registry.register(Box::new(notifications.clone()))?;
        registry.register(Box::new(transitions.clone()))?;

        Ok(Self {
            registry,
            webhook_outcomes,
            notifications,
            transitions,
        })
    }

    pub fn render(&self) -> Result<String, prometheus::Error> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

/// GET /metrics
pub async fn export(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    let body = state
        .metrics
        .render()
        .map_err(|e| AppError::InternalServerError(format!("metrics encoding failed: {}", e)))?;
    Ok(([(header::CONTENT_TYPE, "text/plain; version=0.0.4")], body))
}
