use tripmate_core::request::TravelRequest;
use tripmate_core::user::Role;
use tripmate_core::{CoreError, CoreResult};

/// Identity behind a lifecycle call, resolved from the session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    pub uid: String,
    /// `None` until the user has created a profile
    pub role: Option<Role>,
    pub is_admin: bool,
}

impl Actor {
    pub fn new(uid: impl Into<String>, role: Option<Role>, is_admin: bool) -> Self {
        Self {
            uid: uid.into(),
            role,
            is_admin,
        }
    }

    pub fn traveler(uid: impl Into<String>) -> Self {
        Self::new(uid, Some(Role::Traveler), false)
    }

    pub fn guide(uid: impl Into<String>) -> Self {
        Self::new(uid, Some(Role::Guide), false)
    }

    pub fn admin(uid: impl Into<String>) -> Self {
        Self::new(uid, None, true)
    }

    pub fn is_guide(&self) -> bool {
        self.role == Some(Role::Guide)
    }

    pub fn owns(&self, request: &TravelRequest) -> bool {
        request.traveler_id == self.uid
    }

    pub fn require_owner(&self, request: &TravelRequest) -> CoreResult<()> {
        if self.owns(request) {
            Ok(())
        } else {
            Err(CoreError::PermissionDenied)
        }
    }

    pub fn require_assigned_guide(&self, request: &TravelRequest) -> CoreResult<()> {
        if self.is_guide() && request.is_assigned_to(&self.uid) {
            Ok(())
        } else {
            Err(CoreError::PermissionDenied)
        }
    }

    pub fn require_admin(&self) -> CoreResult<()> {
        if self.is_admin {
            Ok(())
        } else {
            Err(CoreError::PermissionDenied)
        }
    }

    /// Owner, assigned guide or admin.
    pub fn can_view(&self, request: &TravelRequest) -> bool {
        self.is_admin || self.owns(request) || request.is_assigned_to(&self.uid)
    }

    /// Strip what this actor may not see. The guide has to hear the trip PIN
    /// from the traveler at pickup.
    pub fn redact(&self, mut request: TravelRequest) -> TravelRequest {
        if !self.is_admin && !self.owns(&request) {
            request.trip_pin = None;
        }
        request
    }
}
