use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tripmate_shared::models::events::RequestChangedEvent;
use uuid::Uuid;

use crate::request::{RequestStatus, TravelRequest};
use crate::CoreResult;

/// A committed status change on a travel request.
///
/// Delivered at least once; every subscriber must tolerate replays.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RequestChange {
    pub request_id: Uuid,
    pub traveler_id: String,
    pub from: RequestStatus,
    pub to: RequestStatus,
    pub actor_id: String,
    pub guide_id: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

impl RequestChange {
    /// Describe the change that moved `request` out of `from`.
    pub fn after(request: &TravelRequest, from: RequestStatus, actor_id: &str) -> Self {
        Self {
            request_id: request.id,
            traveler_id: request.traveler_id.clone(),
            from,
            to: request.status,
            actor_id: actor_id.to_string(),
            guide_id: request.guide_id.clone(),
            occurred_at: Utc::now(),
        }
    }

    /// Whether `uid` is a party to the request this change concerns.
    pub fn involves(&self, uid: &str) -> bool {
        self.traveler_id == uid || self.guide_id.as_deref() == Some(uid)
    }

    pub fn to_event(&self) -> RequestChangedEvent {
        RequestChangedEvent {
            request_id: self.request_id,
            from: self.from.to_string(),
            to: self.to.to_string(),
            actor_id: self.actor_id.clone(),
            guide_id: self.guide_id.clone(),
            timestamp: self.occurred_at.timestamp(),
        }
    }
}

/// Change-notification interface that lifecycle writes publish to
#[async_trait]
pub trait ChangeFeed: Send + Sync {
    async fn publish(&self, change: &RequestChange) -> CoreResult<()>;
}
