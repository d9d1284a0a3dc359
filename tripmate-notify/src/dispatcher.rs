use std::sync::Arc;

use tracing::{debug, info, warn};
use tripmate_core::repository::{RequestRepository, UserRepository};
use tripmate_core::request::NotificationFlags;
use tripmate_core::{CoreError, CoreResult, RequestChange, RequestStatus, TravelRequest};

use crate::email::Mailer;
use crate::push::{PushError, PushSender};
use crate::templates::render;

const MAX_CLAIM_ATTEMPTS: usize = 3;

/// Transitions that notify somebody
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationKind {
    GuideSelected,
    Accepted,
    Declined,
    Paid,
}

impl NotificationKind {
    pub fn for_change(change: &RequestChange) -> Option<Self> {
        use RequestStatus::*;
        match (change.from, change.to) {
            (Pending, GuideSelected) => Some(Self::GuideSelected),
            (GuideSelected, Confirmed) => Some(Self::Accepted),
            (GuideSelected, Pending) => Some(Self::Declined),
            (PaymentPending, Paid) => Some(Self::Paid),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::GuideSelected => "guide_selected",
            Self::Accepted => "accepted",
            Self::Declined => "declined",
            Self::Paid => "paid",
        }
    }

    fn flag(self, flags: &mut NotificationFlags) -> &mut bool {
        match self {
            Self::GuideSelected => &mut flags.guide_selection_notified,
            Self::Accepted => &mut flags.acceptance_notified,
            Self::Declined => &mut flags.decline_notified,
            Self::Paid => &mut flags.payment_notified,
        }
    }

    /// The guide hears about selection, the traveler about everything else.
    fn recipient(self, request: &TravelRequest) -> Option<&str> {
        match self {
            Self::GuideSelected => request.guide_id.as_deref(),
            _ => Some(request.traveler_id.as_str()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum DispatchOutcome {
    Sent {
        kind: NotificationKind,
        recipient: String,
    },
    Skipped(&'static str),
}

/// Turns committed request changes into push and email.
///
/// Safe under redelivery: the per-transition flag on the request is claimed
/// with a versioned write before anything is sent.
pub struct NotificationDispatcher {
    requests: Arc<dyn RequestRepository>,
    users: Arc<dyn UserRepository>,
    push: Arc<dyn PushSender>,
    mailer: Arc<dyn Mailer>,
}

impl NotificationDispatcher {
    pub fn new(
        requests: Arc<dyn RequestRepository>,
        users: Arc<dyn UserRepository>,
        push: Arc<dyn PushSender>,
        mailer: Arc<dyn Mailer>,
    ) -> Self {
        Self {
            requests,
            users,
            push,
            mailer,
        }
    }

    pub async fn handle(&self, change: &RequestChange) -> CoreResult<DispatchOutcome> {
        let Some(kind) = NotificationKind::for_change(change) else {
            return Ok(DispatchOutcome::Skipped("transition has no notification"));
        };

        let request = match self.claim(kind, change).await? {
            Ok(request) => request,
            Err(reason) => {
                debug!(request_id = %change.request_id, kind = kind.as_str(), "Notification skipped: {}", reason);
                return Ok(DispatchOutcome::Skipped(reason));
            }
        };

        let Some(uid) = kind.recipient(&request) else {
            return Ok(DispatchOutcome::Skipped("no recipient"));
        };
        let Some(recipient) = self.users.get_user(uid).await? else {
            warn!(request_id = %request.id, uid = %uid, "Notification recipient not found");
            return Ok(DispatchOutcome::Skipped("recipient not found"));
        };

        let notification = render(kind, &request, &recipient);

        for token in &recipient.fcm_tokens {
            match self.push.send(token, &notification.push).await {
                Ok(()) => {}
                Err(PushError::InvalidToken) => {
                    info!(uid = %recipient.uid, "Pruning invalid push token");
                    if let Err(e) = self.users.remove_push_token(&recipient.uid, token).await {
                        warn!(uid = %recipient.uid, "Failed to prune push token: {}", e);
                    }
                }
                Err(e) => warn!(uid = %recipient.uid, "Push failed: {}", e),
            }
        }

        match recipient.email.as_deref().filter(|email| !email.is_empty()) {
            Some(email) => {
                if let Err(e) = self.mailer.send(email, &notification.subject, &notification.body).await {
                    warn!(request_id = %request.id, kind = kind.as_str(), "Email failed: {}", e);
                }
            }
            None => debug!(uid = %recipient.uid, "Recipient has no email address"),
        }

        info!(request_id = %request.id, kind = kind.as_str(), recipient = %recipient.uid, "Notification dispatched");
        Ok(DispatchOutcome::Sent {
            kind,
            recipient: recipient.uid,
        })
    }

    /// Set the transition's flag if this change is still current and unsent.
    ///
    /// The inner `Err` carries the reason nothing should be sent.
    async fn claim(
        &self,
        kind: NotificationKind,
        change: &RequestChange,
    ) -> CoreResult<Result<TravelRequest, &'static str>> {
        for _ in 0..MAX_CLAIM_ATTEMPTS {
            let Some(mut request) = self.requests.get_request(change.request_id).await? else {
                return Ok(Err("request no longer exists"));
            };
            if request.status != change.to {
                return Ok(Err("request has moved on"));
            }
            if kind == NotificationKind::GuideSelected && request.guide_id != change.guide_id {
                return Ok(Err("a different guide is selected"));
            }

            let flag = kind.flag(&mut request.notifications);
            if *flag {
                return Ok(Err("already notified"));
            }
            *flag = true;

            match self.requests.replace_request(&request).await {
                Ok(stored) => return Ok(Ok(stored)),
                Err(CoreError::Conflict(_)) => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(Err("request kept changing"))
    }
}
