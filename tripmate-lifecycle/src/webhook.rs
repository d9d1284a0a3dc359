//! Razorpay webhook payloads.
//!
//! Only the fields reconciliation reads are modelled. `notes` can arrive as an
//! object or as an empty array, so it stays untyped.

use serde::Deserialize;
use uuid::Uuid;

pub const PAYMENT_CAPTURED: &str = "payment.captured";
pub const ORDER_PAID: &str = "order.paid";

#[derive(Debug, Clone, Deserialize)]
pub struct RazorpayWebhook {
    pub event: String,
    #[serde(default)]
    pub payload: WebhookPayload,
    #[serde(default)]
    pub created_at: Option<i64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct WebhookPayload {
    #[serde(default)]
    pub payment: Option<Entity<PaymentEntity>>,
    #[serde(default)]
    pub order: Option<Entity<OrderEntity>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Entity<T> {
    pub entity: T,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PaymentEntity {
    pub id: String,
    #[serde(default)]
    pub amount: Option<i64>,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub order_id: Option<String>,
    #[serde(default)]
    pub notes: serde_json::Value,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OrderEntity {
    pub id: String,
    #[serde(default)]
    pub amount: Option<i64>,
    #[serde(default)]
    pub amount_paid: Option<i64>,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub notes: serde_json::Value,
}

/// What a settlement event claims was paid
#[derive(Debug, Clone, PartialEq)]
pub struct PaymentDetails {
    pub request_id: Uuid,
    pub order_id: String,
    pub payment_id: String,
    pub amount: i64,
    pub currency: String,
}

fn request_id_note(notes: &serde_json::Value) -> Option<&str> {
    notes.get("request_id").and_then(|v| v.as_str())
}

impl RazorpayWebhook {
    /// Events that settle a payment. Everything else is acknowledged and ignored.
    pub fn is_settlement(&self) -> bool {
        self.event == PAYMENT_CAPTURED || self.event == ORDER_PAID
    }

    pub fn payment_details(&self) -> Result<PaymentDetails, String> {
        let payment = self.payload.payment.as_ref().map(|p| &p.entity);
        let order = self.payload.order.as_ref().map(|o| &o.entity);

        let payment_id = payment
            .map(|p| p.id.clone())
            .ok_or_else(|| "payload has no payment entity".to_string())?;

        let order_id = order
            .map(|o| o.id.clone())
            .or_else(|| payment.and_then(|p| p.order_id.clone()))
            .ok_or_else(|| "payload has no order id".to_string())?;

        let amount = order
            .and_then(|o| o.amount_paid.or(o.amount))
            .or_else(|| payment.and_then(|p| p.amount))
            .ok_or_else(|| "payload has no amount".to_string())?;

        let currency = order
            .and_then(|o| o.currency.clone())
            .or_else(|| payment.and_then(|p| p.currency.clone()))
            .ok_or_else(|| "payload has no currency".to_string())?;

        let raw_request_id = order
            .and_then(|o| request_id_note(&o.notes))
            .or_else(|| payment.and_then(|p| request_id_note(&p.notes)))
            .ok_or_else(|| "notes carry no request_id".to_string())?;
        let request_id = Uuid::parse_str(raw_request_id)
            .map_err(|_| format!("request_id note is not a uuid: {}", raw_request_id))?;

        Ok(PaymentDetails {
            request_id,
            order_id,
            payment_id,
            amount,
            currency,
        })
    }
}
