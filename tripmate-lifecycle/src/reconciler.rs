use std::sync::Arc;

use chrono::Utc;
use secrecy::{ExposeSecret, SecretString};
use tracing::{error, info, warn};
use tripmate_core::payment::{PaymentEvent, PaymentEventStatus};
use tripmate_core::repository::{PaymentEventRepository, RequestRepository};
use tripmate_core::{ChangeFeed, CoreError, RequestChange, RequestStatus, TravelRequest};
use uuid::Uuid;

use crate::pin::generate_trip_pin;
use crate::signature::verify_signature;
use crate::webhook::{PaymentDetails, RazorpayWebhook};

/// Actor id recorded on changes made by the payment webhook
pub const GATEWAY_ACTOR: &str = "payment-gateway";

const MAX_ATTEMPTS: usize = 3;

#[derive(Debug, thiserror::Error)]
pub enum PaymentError {
    #[error("webhook secret is not configured")]
    MissingSecret,
    #[error("invalid webhook signature")]
    InvalidSignature,
    #[error("malformed webhook: {0}")]
    Malformed(String),
    #[error("payment does not match request: {0}")]
    Mismatch(String),
    #[error(transparent)]
    Core(#[from] CoreError),
}

#[derive(Debug, Clone, PartialEq)]
pub enum ReconcileOutcome {
    /// The request moved to paid and received its trip PIN
    Paid { request_id: Uuid },
    /// Settlement was already applied; nothing changed
    Duplicate { request_id: Option<Uuid> },
    /// Not a settlement event
    Ignored { event_type: String },
}

/// Applies signed gateway webhooks to travel requests.
///
/// Every verified delivery is logged as a [`PaymentEvent`]. Deliveries that
/// cannot be applied are left as `needs-review` for an admin.
pub struct PaymentReconciler {
    secret: Option<SecretString>,
    requests: Arc<dyn RequestRepository>,
    events: Arc<dyn PaymentEventRepository>,
    feed: Arc<dyn ChangeFeed>,
}

impl PaymentReconciler {
    pub fn new(
        secret: Option<SecretString>,
        requests: Arc<dyn RequestRepository>,
        events: Arc<dyn PaymentEventRepository>,
        feed: Arc<dyn ChangeFeed>,
    ) -> Self {
        Self {
            secret,
            requests,
            events,
            feed,
        }
    }

    /// Verify and apply one webhook delivery.
    ///
    /// `body` must be the raw bytes the gateway signed.
    pub async fn handle_webhook(
        &self,
        body: &[u8],
        signature: Option<&str>,
        event_id: Option<&str>,
    ) -> Result<ReconcileOutcome, PaymentError> {
        let secret = self.secret.as_ref().ok_or(PaymentError::MissingSecret)?;
        let signature = signature.ok_or(PaymentError::InvalidSignature)?;
        if !verify_signature(secret.expose_secret().as_bytes(), body, signature) {
            warn!(event_id = ?event_id, "Rejected webhook with bad signature");
            return Err(PaymentError::InvalidSignature);
        }

        let payload: serde_json::Value =
            serde_json::from_slice(body).map_err(|e| PaymentError::Malformed(e.to_string()))?;
        let webhook: RazorpayWebhook =
            serde_json::from_value(payload.clone()).map_err(|e| PaymentError::Malformed(e.to_string()))?;

        if let Some(id) = event_id {
            if let Some(previous) = self.events.find_by_event_id(id).await? {
                if matches!(
                    previous.status,
                    PaymentEventStatus::Processed | PaymentEventStatus::Duplicate
                ) {
                    info!(event_id = %id, "Webhook redelivered");
                    return Ok(ReconcileOutcome::Duplicate {
                        request_id: previous.request_id,
                    });
                }
            }
        }

        let event = PaymentEvent::received(event_id.map(String::from), webhook.event.clone(), payload);
        self.events.record_event(&event).await?;

        if !webhook.is_settlement() {
            self.events
                .update_event_status(event.id, PaymentEventStatus::Ignored, None, None)
                .await?;
            return Ok(ReconcileOutcome::Ignored {
                event_type: webhook.event,
            });
        }

        let details = match webhook.payment_details() {
            Ok(details) => details,
            Err(reason) => {
                self.flag(event.id, &reason, None).await?;
                return Err(PaymentError::Malformed(reason));
            }
        };

        self.settle(event.id, &details).await
    }

    async fn settle(&self, event_id: Uuid, details: &PaymentDetails) -> Result<ReconcileOutcome, PaymentError> {
        let request_id = details.request_id;

        for attempt in 1..=MAX_ATTEMPTS {
            let Some(mut request) = self.requests.get_request(request_id).await? else {
                let reason = format!("unknown request {}", request_id);
                self.flag(event_id, &reason, None).await?;
                return Err(PaymentError::Mismatch(reason));
            };

            if request.payment_processed && request.payment_order_id.as_deref() == Some(details.order_id.as_str()) {
                self.events
                    .update_event_status(event_id, PaymentEventStatus::Duplicate, None, Some(request_id))
                    .await?;
                info!(request_id = %request_id, order_id = %details.order_id, "Payment already applied");
                return Ok(ReconcileOutcome::Duplicate {
                    request_id: Some(request_id),
                });
            }

            if let Err(reason) = check_matches(&request, details) {
                self.flag(event_id, &reason, Some(request_id)).await?;
                return Err(PaymentError::Mismatch(reason));
            }

            let from = request.transition_to(RequestStatus::Paid)?;
            request.paid_at = Some(Utc::now());
            request.payment_id = Some(details.payment_id.clone());
            request.payment_processed = true;
            request.trip_pin = Some(generate_trip_pin());

            match self.requests.replace_request(&request).await {
                Ok(stored) => {
                    self.events
                        .update_event_status(event_id, PaymentEventStatus::Processed, None, Some(request_id))
                        .await?;
                    info!(
                        request_id = %request_id,
                        payment_id = %details.payment_id,
                        amount = details.amount,
                        "Payment reconciled"
                    );
                    let change = RequestChange::after(&stored, from, GATEWAY_ACTOR);
                    if let Err(e) = self.feed.publish(&change).await {
                        error!(request_id = %request_id, "Failed to publish change: {}", e);
                    }
                    return Ok(ReconcileOutcome::Paid { request_id });
                }
                Err(CoreError::Conflict(msg)) => {
                    warn!(request_id = %request_id, attempt, "Concurrent write during reconciliation: {}", msg);
                }
                Err(e) => return Err(e.into()),
            }
        }

        let reason = format!("request {} kept changing during reconciliation", request_id);
        self.flag(event_id, &reason, Some(request_id)).await?;
        Err(PaymentError::Core(CoreError::Conflict(reason)))
    }

    async fn flag(&self, event_id: Uuid, reason: &str, request_id: Option<Uuid>) -> Result<(), PaymentError> {
        warn!(payment_event = %event_id, "Payment event needs review: {}", reason);
        self.events
            .update_event_status(event_id, PaymentEventStatus::NeedsReview, Some(reason), request_id)
            .await?;
        Ok(())
    }
}

fn check_matches(request: &TravelRequest, details: &PaymentDetails) -> Result<(), String> {
    if request.status != RequestStatus::PaymentPending {
        return Err(format!("request is {}, not awaiting payment", request.status));
    }
    if request.payment_order_id.as_deref() != Some(details.order_id.as_str()) {
        return Err(format!("order {} was not issued for this request", details.order_id));
    }
    if request.expected_amount != Some(details.amount) {
        return Err(format!(
            "paid {} but expected {}",
            details.amount,
            request.expected_amount.unwrap_or_default()
        ));
    }
    let currency_ok = request
        .currency
        .as_deref()
        .map(|c| c.eq_ignore_ascii_case(&details.currency))
        .unwrap_or(false);
    if !currency_ok {
        return Err(format!("unexpected currency {}", details.currency));
    }
    Ok(())
}
