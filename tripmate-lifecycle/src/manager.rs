use std::sync::Arc;

use chrono::Utc;
use serde_json::json;
use tracing::{error, info, warn};
use tripmate_core::payment::{GatewayOrder, PaymentGateway};
use tripmate_core::repository::{RequestRepository, UserRepository};
use tripmate_core::request::StepPayload;
use tripmate_core::{ChangeFeed, CoreError, CoreResult, RequestChange, RequestStatus, Role, TravelRequest, User};
use tripmate_matching::{GuideMatcher, MatchedGuide};
use tripmate_pricing::{service_window, to_minor_units, CostEstimator};
use uuid::Uuid;

use crate::actor::Actor;

/// Drives travel requests through their lifecycle.
///
/// Every status change is written with a version check and then published
/// to the change feed.
pub struct RequestManager {
    requests: Arc<dyn RequestRepository>,
    users: Arc<dyn UserRepository>,
    gateway: Arc<dyn PaymentGateway>,
    feed: Arc<dyn ChangeFeed>,
    estimator: CostEstimator,
    matcher: GuideMatcher,
    currency: String,
}

impl RequestManager {
    pub fn new(
        requests: Arc<dyn RequestRepository>,
        users: Arc<dyn UserRepository>,
        gateway: Arc<dyn PaymentGateway>,
        feed: Arc<dyn ChangeFeed>,
        estimator: CostEstimator,
        currency: impl Into<String>,
    ) -> Self {
        Self {
            requests,
            users,
            gateway,
            feed,
            estimator,
            matcher: GuideMatcher::default(),
            currency: currency.into(),
        }
    }

    pub fn estimator(&self) -> &CostEstimator {
        &self.estimator
    }

    // ========================================================================
    // Drafting
    // ========================================================================

    pub async fn create_draft(&self, actor: &Actor) -> CoreResult<TravelRequest> {
        if actor.role != Some(Role::Traveler) {
            return Err(CoreError::PermissionDenied);
        }
        let request = TravelRequest::new_draft(actor.uid.clone());
        self.requests.insert_request(&request).await?;
        info!(request_id = %request.id, traveler = %actor.uid, "Draft request created");
        Ok(request)
    }

    /// Save one wizard step on the caller's own draft.
    pub async fn save_step(&self, actor: &Actor, id: Uuid, payload: StepPayload) -> CoreResult<TravelRequest> {
        let mut request = self.load(id).await?;
        actor.require_owner(&request)?;
        request.apply_step(payload)?;
        self.requests.replace_request(&request).await
    }

    /// Live estimate for the current draft, `None` until the schedule is known.
    pub fn estimate(&self, request: &TravelRequest) -> Option<f64> {
        service_window(request).map(|window| self.estimator.estimate(&window))
    }

    /// Transition: Draft → Pending. Stores the estimate the traveler saw.
    pub async fn submit(&self, actor: &Actor, id: Uuid) -> CoreResult<TravelRequest> {
        let mut request = self.load(id).await?;
        actor.require_owner(&request)?;

        if !request.all_steps_complete() {
            return Err(CoreError::ValidationError(
                "all four steps must be complete before submitting".to_string(),
            ));
        }
        let window = service_window(&request)
            .ok_or_else(|| CoreError::ValidationError("request has no schedule".to_string()))?;
        // An empty window would price at zero and could never be paid for
        if window.duration_minutes() <= 0 {
            return Err(CoreError::ValidationError(
                "the service window must end after it starts".to_string(),
            ));
        }
        let cost = self.estimator.estimate(&window);

        let from = request.transition_to(RequestStatus::Pending)?;
        request.estimated_cost = Some(cost);
        self.commit(actor, request, from).await
    }

    // ========================================================================
    // Reads
    // ========================================================================

    pub async fn get_for(&self, actor: &Actor, id: Uuid) -> CoreResult<TravelRequest> {
        let request = self.load(id).await?;
        if actor.can_view(&request) {
            Ok(request)
        } else {
            Err(CoreError::PermissionDenied)
        }
    }

    /// Travelers see what they created, guides what they are assigned to.
    pub async fn list_for(&self, actor: &Actor) -> CoreResult<Vec<TravelRequest>> {
        match actor.role {
            Some(Role::Traveler) => self.requests.list_by_traveler(&actor.uid).await,
            Some(Role::Guide) => self.requests.list_by_guide(&actor.uid).await,
            None => Ok(Vec::new()),
        }
    }

    /// Guides eligible for a submitted request.
    pub async fn find_guides(&self, actor: &Actor, id: Uuid) -> CoreResult<Vec<MatchedGuide>> {
        let request = self.load(id).await?;
        actor.require_owner(&request)?;
        let traveler = self.traveler_of(&request).await?;
        self.matcher.find_matches(self.users.as_ref(), &request, &traveler).await
    }

    // ========================================================================
    // Guide selection and response
    // ========================================================================

    /// Transition: Pending → GuideSelected
    pub async fn select_guide(&self, actor: &Actor, id: Uuid, guide_id: &str) -> CoreResult<TravelRequest> {
        let mut request = self.load(id).await?;
        actor.require_owner(&request)?;
        if request.status != RequestStatus::Pending {
            return Err(CoreError::InvalidTransition {
                from: request.status,
                to: RequestStatus::GuideSelected,
            });
        }

        let traveler = self.traveler_of(&request).await?;
        let eligible = self
            .matcher
            .find_matches(self.users.as_ref(), &request, &traveler)
            .await?;
        if !eligible.iter().any(|guide| guide.uid == guide_id) {
            return Err(CoreError::ValidationError(format!(
                "guide {} is not eligible for this request",
                guide_id
            )));
        }

        let from = request.transition_to(RequestStatus::GuideSelected)?;
        request.guide_id = Some(guide_id.to_string());
        request.accepted_at = None;
        // A fresh selection deserves fresh notifications
        request.notifications.guide_selection_notified = false;
        request.notifications.acceptance_notified = false;
        request.notifications.decline_notified = false;
        self.commit(actor, request, from).await
    }

    /// Transition: GuideSelected → Confirmed, or back to Pending on decline
    pub async fn respond(&self, actor: &Actor, id: Uuid, accept: bool) -> CoreResult<TravelRequest> {
        let mut request = self.load(id).await?;
        actor.require_assigned_guide(&request)?;

        let from = if accept {
            let from = request.transition_to(RequestStatus::Confirmed)?;
            request.accepted_at = Some(Utc::now());
            from
        } else {
            let from = request.transition_to(RequestStatus::Pending)?;
            request.guide_id = None;
            request.accepted_at = None;
            from
        };
        self.commit(actor, request, from).await
    }

    // ========================================================================
    // Payment
    // ========================================================================

    /// Transition: Confirmed → PaymentPending.
    ///
    /// Creates a gateway order for the stored estimate. Calling again while
    /// payment is pending returns the order already issued.
    pub async fn begin_payment(&self, actor: &Actor, id: Uuid) -> CoreResult<(TravelRequest, GatewayOrder)> {
        let mut request = self.load(id).await?;
        actor.require_owner(&request)?;

        if request.status == RequestStatus::PaymentPending {
            if let (Some(order_id), Some(amount), Some(currency)) = (
                request.payment_order_id.clone(),
                request.expected_amount,
                request.currency.clone(),
            ) {
                let order = GatewayOrder {
                    id: order_id,
                    amount,
                    currency,
                    receipt: request.id.to_string(),
                };
                return Ok((request, order));
            }
        }
        if request.status != RequestStatus::Confirmed {
            return Err(CoreError::InvalidTransition {
                from: request.status,
                to: RequestStatus::PaymentPending,
            });
        }

        let amount = request
            .estimated_cost
            .map(to_minor_units)
            .filter(|amount| *amount > 0)
            .ok_or_else(|| CoreError::ValidationError("request has no payable estimate".to_string()))?;

        let receipt = request.id.to_string();
        let order = self
            .gateway
            .create_order(amount, &self.currency, &receipt, json!({ "request_id": receipt }))
            .await?;

        let from = request.transition_to(RequestStatus::PaymentPending)?;
        request.payment_order_id = Some(order.id.clone());
        request.expected_amount = Some(order.amount);
        request.currency = Some(order.currency.clone());
        let request = self.commit(actor, request, from).await?;
        Ok((request, order))
    }

    /// Guide enters the traveler's PIN at pickup. Does not change status.
    pub async fn start_trip(&self, actor: &Actor, id: Uuid, pin: &str) -> CoreResult<TravelRequest> {
        let mut request = self.load(id).await?;
        actor.require_assigned_guide(&request)?;

        if request.status != RequestStatus::Paid {
            return Err(CoreError::ValidationError("trip can only start once paid".to_string()));
        }
        if request.trip_started_at.is_some() {
            return Err(CoreError::Conflict("trip already started".to_string()));
        }
        if request.trip_pin.as_deref() != Some(pin.trim()) {
            warn!(request_id = %id, guide = %actor.uid, "Wrong trip PIN entered");
            return Err(CoreError::ValidationError("incorrect trip PIN".to_string()));
        }

        request.trip_started_at = Some(Utc::now());
        let stored = self.requests.replace_request(&request).await?;
        info!(request_id = %id, guide = %actor.uid, "Trip started");
        Ok(stored)
    }

    // ========================================================================
    // Administration
    // ========================================================================

    /// Transition: Paid → Completed
    pub async fn complete(&self, actor: &Actor, id: Uuid) -> CoreResult<TravelRequest> {
        actor.require_admin()?;
        let mut request = self.load(id).await?;
        let from = request.transition_to(RequestStatus::Completed)?;
        self.commit(actor, request, from).await
    }

    /// Cancel any request that has not reached a terminal state
    pub async fn cancel(&self, actor: &Actor, id: Uuid) -> CoreResult<TravelRequest> {
        actor.require_admin()?;
        let mut request = self.load(id).await?;
        let from = request.transition_to(RequestStatus::Cancelled)?;
        self.commit(actor, request, from).await
    }

    /// Owners may discard their own drafts. Admins may delete anything.
    pub async fn delete(&self, actor: &Actor, id: Uuid) -> CoreResult<()> {
        let request = self.load(id).await?;
        let allowed = actor.is_admin || (actor.owns(&request) && request.status == RequestStatus::Draft);
        if !allowed {
            return Err(CoreError::PermissionDenied);
        }
        self.requests.delete_request(id).await?;
        info!(request_id = %id, actor = %actor.uid, "Request deleted");
        Ok(())
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    async fn load(&self, id: Uuid) -> CoreResult<TravelRequest> {
        self.requests
            .get_request(id)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("request {}", id)))
    }

    async fn traveler_of(&self, request: &TravelRequest) -> CoreResult<User> {
        self.users
            .get_user(&request.traveler_id)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("user {}", request.traveler_id)))
    }

    /// Persist a transitioned request and announce the change.
    async fn commit(&self, actor: &Actor, request: TravelRequest, from: RequestStatus) -> CoreResult<TravelRequest> {
        let stored = self.requests.replace_request(&request).await?;
        let change = RequestChange::after(&stored, from, &actor.uid);

        info!(
            request_id = %stored.id,
            from = %from,
            to = %stored.status,
            actor = %actor.uid,
            "Request transitioned"
        );
        if let Err(e) = self.feed.publish(&change).await {
            error!(request_id = %stored.id, "Failed to publish change: {}", e);
        }
        Ok(stored)
    }
}
