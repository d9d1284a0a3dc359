//! Razorpay Orders API client.

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::{debug, error};
use tripmate_core::payment::{GatewayOrder, PaymentGateway};
use tripmate_core::{CoreError, CoreResult};

pub const RAZORPAY_API_BASE: &str = "https://api.razorpay.com/v1";

#[derive(Clone)]
pub struct RazorpayGateway {
    client: Client,
    base_url: String,
    key_id: String,
    key_secret: SecretString,
}

impl std::fmt::Debug for RazorpayGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RazorpayGateway")
            .field("base_url", &self.base_url)
            .field("key_id", &self.key_id)
            .field("key_secret", &"[REDACTED]")
            .finish_non_exhaustive()
    }
}

#[derive(Serialize)]
struct CreateOrderBody<'a> {
    amount: i64,
    currency: &'a str,
    receipt: &'a str,
    notes: serde_json::Value,
}

#[derive(Deserialize)]
struct OrderResponse {
    id: String,
    amount: i64,
    currency: String,
    #[serde(default)]
    receipt: Option<String>,
}

impl RazorpayGateway {
    pub fn new(key_id: String, key_secret: SecretString) -> Self {
        Self::with_base_url(RAZORPAY_API_BASE, key_id, key_secret)
    }

    pub fn with_base_url(base_url: impl Into<String>, key_id: String, key_secret: SecretString) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into(),
            key_id,
            key_secret,
        }
    }
}

#[async_trait]
impl PaymentGateway for RazorpayGateway {
    async fn create_order(
        &self,
        amount_minor: i64,
        currency: &str,
        receipt: &str,
        notes: serde_json::Value,
    ) -> CoreResult<GatewayOrder> {
        let body = CreateOrderBody {
            amount: amount_minor,
            currency,
            receipt,
            notes,
        };

        let response = self
            .client
            .post(format!("{}/orders", self.base_url))
            .basic_auth(&self.key_id, Some(self.key_secret.expose_secret()))
            .json(&body)
            .send()
            .await
            .map_err(|e| CoreError::ExternalError(format!("razorpay request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            error!(%status, "Razorpay rejected order: {}", text);
            return Err(CoreError::ExternalError(format!("razorpay returned {}", status)));
        }

        let order: OrderResponse = response
            .json()
            .await
            .map_err(|e| CoreError::ExternalError(format!("razorpay response: {}", e)))?;

        debug!(order_id = %order.id, amount = order.amount, "Razorpay order created");
        Ok(GatewayOrder {
            id: order.id,
            amount: order.amount,
            currency: order.currency,
            receipt: order.receipt.unwrap_or_else(|| receipt.to_string()),
        })
    }
}
