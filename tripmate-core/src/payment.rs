use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::CoreResult;

/// An order created with the payment gateway before checkout
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GatewayOrder {
    pub id: String,
    pub amount: i64,
    pub currency: String,
    pub receipt: String,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Create an order the traveler pays against. `notes` are echoed back in webhooks.
    async fn create_order(
        &self,
        amount_minor: i64,
        currency: &str,
        receipt: &str,
        notes: serde_json::Value,
    ) -> CoreResult<GatewayOrder>;
}

/// Gateway stand-in for local development and tests
pub struct MockPaymentGateway;

#[async_trait]
impl PaymentGateway for MockPaymentGateway {
    async fn create_order(
        &self,
        amount_minor: i64,
        currency: &str,
        receipt: &str,
        _notes: serde_json::Value,
    ) -> CoreResult<GatewayOrder> {
        Ok(GatewayOrder {
            id: format!("order_mock_{}", Uuid::new_v4().simple()),
            amount: amount_minor,
            currency: currency.to_string(),
            receipt: receipt.to_string(),
        })
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum PaymentEventStatus {
    Received,
    Processed,
    Duplicate,
    Ignored,
    NeedsReview,
}

impl PaymentEventStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentEventStatus::Received => "received",
            PaymentEventStatus::Processed => "processed",
            PaymentEventStatus::Duplicate => "duplicate",
            PaymentEventStatus::Ignored => "ignored",
            PaymentEventStatus::NeedsReview => "needs-review",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "received" => Some(PaymentEventStatus::Received),
            "processed" => Some(PaymentEventStatus::Processed),
            "duplicate" => Some(PaymentEventStatus::Duplicate),
            "ignored" => Some(PaymentEventStatus::Ignored),
            "needs-review" => Some(PaymentEventStatus::NeedsReview),
            _ => None,
        }
    }
}

/// A verified webhook delivery, kept for manual reconciliation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PaymentEvent {
    pub id: Uuid,
    pub event_id: Option<String>,
    pub event_type: String,
    pub payload: serde_json::Value,
    pub status: PaymentEventStatus,
    pub reason: Option<String>,
    pub request_id: Option<Uuid>,
    pub received_at: DateTime<Utc>,
}

impl PaymentEvent {
    pub fn received(event_id: Option<String>, event_type: String, payload: serde_json::Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            event_id,
            event_type,
            payload,
            status: PaymentEventStatus::Received,
            reason: None,
            request_id: None,
            received_at: Utc::now(),
        }
    }
}
