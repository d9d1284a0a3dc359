use std::collections::BTreeMap;

use tripmate_core::{TravelRequest, User};

use crate::dispatcher::NotificationKind;
use crate::push::PushMessage;

/// Rendered content for one recipient
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub push: PushMessage,
    pub subject: String,
    pub body: String,
}

fn trip_label(request: &TravelRequest) -> String {
    let purpose = request.purpose().map(|p| p.as_str()).unwrap_or("trip");
    match &request.schedule {
        Some(schedule) => format!(
            "{} trip on {} at {}",
            purpose,
            schedule.date.format("%e %b %Y").to_string().trim(),
            schedule.start_time.format("%H:%M")
        ),
        None => format!("{} trip", purpose),
    }
}

pub fn render(kind: NotificationKind, request: &TravelRequest, recipient: &User) -> Notification {
    let trip = trip_label(request);
    let (title, line) = match kind {
        NotificationKind::GuideSelected => (
            "New trip request".to_string(),
            format!("A traveler has chosen you for their {}. Please accept or decline.", trip),
        ),
        NotificationKind::Accepted => (
            "Your guide accepted".to_string(),
            format!("Your guide accepted the {}. You can now complete payment.", trip),
        ),
        NotificationKind::Declined => (
            "Your guide declined".to_string(),
            format!("The guide you picked declined the {}. Please choose another guide.", trip),
        ),
        NotificationKind::Paid => (
            "Payment received".to_string(),
            format!(
                "Payment for your {} is confirmed. Share trip PIN {} with your guide at pickup.",
                trip,
                request.trip_pin.as_deref().unwrap_or("----")
            ),
        ),
    };

    let data = BTreeMap::from([
        ("request_id".to_string(), request.id.to_string()),
        ("status".to_string(), request.status.to_string()),
    ]);

    Notification {
        subject: format!("Tripmate: {}", title),
        body: format!("Hi {},\n\n{}\n\nTeam Tripmate\n", recipient.display_name, line),
        push: PushMessage { title, body: line, data },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, NaiveTime};
    use tripmate_core::request::Schedule;
    use tripmate_core::{RequestStatus, Role};

    #[test]
    fn test_paid_template_carries_pin() {
        let mut request = TravelRequest::new_draft("traveler-1".to_string());
        request.status = RequestStatus::Paid;
        request.trip_pin = Some("0420".to_string());
        request.schedule = Some(Schedule {
            date: NaiveDate::from_ymd_opt(2026, 11, 2).unwrap(),
            start_time: NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
            end_time: NaiveTime::from_hms_opt(13, 0, 0).unwrap(),
            notes: None,
        });
        let user = User::new("traveler-1".to_string(), Role::Traveler, "Asha".to_string());

        let notification = render(NotificationKind::Paid, &request, &user);
        assert!(notification.body.starts_with("Hi Asha"));
        assert!(notification.push.body.contains("0420"));
        assert!(notification.push.body.contains("2 Nov 2026 at 09:00"));
        assert_eq!(notification.push.data["status"], "paid");
    }
}
