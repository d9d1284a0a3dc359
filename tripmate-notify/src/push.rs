//! Device push delivery.

use std::collections::BTreeMap;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use tracing::{debug, info};

pub const FCM_API_BASE: &str = "https://fcm.googleapis.com";

#[derive(Debug, thiserror::Error)]
pub enum PushError {
    /// The token is unregistered or malformed and should be dropped
    #[error("device token is no longer valid")]
    InvalidToken,
    #[error("push delivery failed: {0}")]
    Delivery(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct PushMessage {
    pub title: String,
    pub body: String,
    pub data: BTreeMap<String, String>,
}

#[async_trait]
pub trait PushSender: Send + Sync {
    async fn send(&self, token: &str, message: &PushMessage) -> Result<(), PushError>;
}

/// Writes pushes to the log. Used when FCM is not configured.
pub struct LogPushSender;

#[async_trait]
impl PushSender for LogPushSender {
    async fn send(&self, token: &str, message: &PushMessage) -> Result<(), PushError> {
        let prefix: String = token.chars().take(8).collect();
        info!(token = %prefix, title = %message.title, "Push (log only)");
        Ok(())
    }
}

/// FCM HTTP v1 sender
#[derive(Clone)]
pub struct FcmPushSender {
    client: Client,
    endpoint: String,
    access_token: SecretString,
}

impl std::fmt::Debug for FcmPushSender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FcmPushSender")
            .field("endpoint", &self.endpoint)
            .field("access_token", &"[REDACTED]")
            .finish_non_exhaustive()
    }
}

#[derive(Serialize)]
struct SendRequest<'a> {
    message: FcmMessage<'a>,
}

#[derive(Serialize)]
struct FcmMessage<'a> {
    token: &'a str,
    notification: FcmNotification<'a>,
    data: &'a BTreeMap<String, String>,
}

#[derive(Serialize)]
struct FcmNotification<'a> {
    title: &'a str,
    body: &'a str,
}

impl FcmPushSender {
    pub fn new(project_id: &str, access_token: SecretString) -> Self {
        Self::with_base_url(FCM_API_BASE, project_id, access_token)
    }

    pub fn with_base_url(base_url: &str, project_id: &str, access_token: SecretString) -> Self {
        Self {
            client: Client::new(),
            endpoint: format!("{}/v1/projects/{}/messages:send", base_url, project_id),
            access_token,
        }
    }
}

#[async_trait]
impl PushSender for FcmPushSender {
    async fn send(&self, token: &str, message: &PushMessage) -> Result<(), PushError> {
        let body = SendRequest {
            message: FcmMessage {
                token,
                notification: FcmNotification {
                    title: &message.title,
                    body: &message.body,
                },
                data: &message.data,
            },
        };

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(self.access_token.expose_secret())
            .json(&body)
            .send()
            .await
            .map_err(|e| PushError::Delivery(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            debug!("Push delivered");
            return Ok(());
        }

        let text = response.text().await.unwrap_or_default();
        if status == StatusCode::NOT_FOUND || text.contains("UNREGISTERED") {
            return Err(PushError::InvalidToken);
        }
        if status == StatusCode::BAD_REQUEST && text.contains("registration token") {
            return Err(PushError::InvalidToken);
        }
        Err(PushError::Delivery(format!("fcm returned {}: {}", status, text)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{bearer_token, body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn message() -> PushMessage {
        PushMessage {
            title: "New trip request".to_string(),
            body: "Asha picked you for 2 Nov".to_string(),
            data: BTreeMap::from([("request_id".to_string(), "req-1".to_string())]),
        }
    }

    fn sender(server: &MockServer) -> FcmPushSender {
        FcmPushSender::with_base_url(&server.uri(), "tripmate-dev", SecretString::from("ya29.token".to_string()))
    }

    #[tokio::test]
    async fn test_sends_v1_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/projects/tripmate-dev/messages:send"))
            .and(bearer_token("ya29.token"))
            .and(body_partial_json(json!({
                "message": {
                    "token": "device-1",
                    "notification": { "title": "New trip request" },
                    "data": { "request_id": "req-1" }
                }
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "name": "projects/tripmate-dev/messages/1"
            })))
            .expect(1)
            .mount(&server)
            .await;

        sender(&server).send("device-1", &message()).await.unwrap();
    }

    #[tokio::test]
    async fn test_unregistered_token_is_invalid() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({
                "error": {
                    "code": 404,
                    "status": "NOT_FOUND",
                    "details": [{ "errorCode": "UNREGISTERED" }]
                }
            })))
            .mount(&server)
            .await;

        let err = sender(&server).send("stale", &message()).await.unwrap_err();
        assert!(matches!(err, PushError::InvalidToken));
    }

    #[tokio::test]
    async fn test_server_error_is_delivery_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let err = sender(&server).send("device-1", &message()).await.unwrap_err();
        assert!(matches!(err, PushError::Delivery(_)));
    }
}
