use async_trait::async_trait;
use uuid::Uuid;

use crate::payment::{PaymentEvent, PaymentEventStatus};
use crate::request::TravelRequest;
use crate::user::{GuideProfile, Role, User};
use crate::CoreResult;

/// Repository trait for travel request documents
#[async_trait]
pub trait RequestRepository: Send + Sync {
    async fn insert_request(&self, request: &TravelRequest) -> CoreResult<()>;

    async fn get_request(&self, id: Uuid) -> CoreResult<Option<TravelRequest>>;

    /// Write `request` only if the stored version still equals `request.version`.
    ///
    /// Returns the stored document with its bumped version, or `CoreError::Conflict`
    /// when another writer got there first.
    async fn replace_request(&self, request: &TravelRequest) -> CoreResult<TravelRequest>;

    async fn delete_request(&self, id: Uuid) -> CoreResult<()>;

    async fn list_by_traveler(&self, traveler_id: &str) -> CoreResult<Vec<TravelRequest>>;

    async fn list_by_guide(&self, guide_id: &str) -> CoreResult<Vec<TravelRequest>>;
}

/// Repository trait for accounts, guide profiles and admin membership
#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Create a user; fails with `Conflict` if the uid already has a profile.
    async fn insert_user(&self, user: &User) -> CoreResult<()>;

    /// Overwrite the profile fields of an existing user.
    ///
    /// The stored push token set is kept as is; tokens only change through
    /// `add_push_token` and `remove_push_token`.
    async fn update_profile(&self, user: &User) -> CoreResult<()>;

    async fn get_user(&self, uid: &str) -> CoreResult<Option<User>>;

    async fn list_users_by_role(&self, role: Role) -> CoreResult<Vec<User>>;

    async fn get_guide_profile(&self, uid: &str) -> CoreResult<Option<GuideProfile>>;

    async fn save_guide_profile(&self, profile: &GuideProfile) -> CoreResult<()>;

    async fn add_push_token(&self, uid: &str, token: &str) -> CoreResult<()>;

    async fn remove_push_token(&self, uid: &str, token: &str) -> CoreResult<()>;

    async fn is_admin(&self, uid: &str) -> CoreResult<bool>;
}

/// Repository trait for the raw payment webhook log
#[async_trait]
pub trait PaymentEventRepository: Send + Sync {
    async fn record_event(&self, event: &PaymentEvent) -> CoreResult<()>;

    async fn find_by_event_id(&self, event_id: &str) -> CoreResult<Option<PaymentEvent>>;

    async fn update_event_status(
        &self,
        id: Uuid,
        status: PaymentEventStatus,
        reason: Option<&str>,
        request_id: Option<Uuid>,
    ) -> CoreResult<()>;

    async fn list_by_status(&self, status: PaymentEventStatus) -> CoreResult<Vec<PaymentEvent>>;
}
