use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use tripmate_core::request::{PurposeData, TravelRequest};

/// The stretch of a day the guide is billed for
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct ServiceWindow {
    pub date: NaiveDate,
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl ServiceWindow {
    pub fn duration_minutes(&self) -> i64 {
        (self.end - self.start).num_minutes()
    }
}

/// Pick the billable window for a request.
///
/// A pre-booked hospital appointment with both times set wins outright. Otherwise,
/// when the guide meets the traveler at the destination the window is the
/// booking's own start/end, and when they are picked up it runs from the pickup
/// time to the booking end. Returns `None` until the schedule step has been
/// filled in.
pub fn service_window(request: &TravelRequest) -> Option<ServiceWindow> {
    let schedule = request.schedule.as_ref()?;
    let window = |start, end| ServiceWindow {
        date: schedule.date,
        start,
        end,
    };

    if let Some(PurposeData::Hospital(hospital)) = &request.purpose_data {
        if let Some(appt) = hospital.appointment.as_ref().filter(|a| a.pre_booked) {
            if let (Some(start), Some(end)) = (appt.start_time, appt.end_time) {
                return Some(window(start, end));
            }
        }
    }

    let start = match &request.pickup_data {
        Some(pickup) if !pickup.at_destination => pickup.pickup_time.unwrap_or(schedule.start_time),
        _ => schedule.start_time,
    };
    Some(window(start, schedule.end_time))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::estimate_cost;
    use tripmate_core::request::StepPayload;

    fn request_with(purpose: serde_json::Value, pickup: serde_json::Value) -> TravelRequest {
        let mut request = TravelRequest::new_draft("traveler-1".to_string());
        request.apply_step(StepPayload::from_json(1, purpose).unwrap()).unwrap();
        request
            .apply_step(StepPayload::from_json(2, serde_json::json!({ "medium": "bus" })).unwrap())
            .unwrap();
        request.apply_step(StepPayload::from_json(3, pickup).unwrap()).unwrap();
        request
            .apply_step(
                StepPayload::from_json(
                    4,
                    serde_json::json!({
                        "date": "2026-03-02",
                        "start_time": "10:00:00",
                        "end_time": "13:00:00"
                    }),
                )
                .unwrap(),
            )
            .unwrap();
        request
    }

    fn shopping() -> serde_json::Value {
        serde_json::json!({
            "purpose": "shopping",
            "shopping_type": "shop",
            "shop_address": { "district": "Pune" }
        })
    }

    #[test]
    fn test_no_window_before_schedule() {
        let request = TravelRequest::new_draft("traveler-1".to_string());
        assert!(service_window(&request).is_none());
    }

    #[test]
    fn test_at_destination_uses_booking_window() {
        let request = request_with(shopping(), serde_json::json!({ "at_destination": true }));
        let window = service_window(&request).unwrap();
        assert_eq!(window.start, NaiveTime::from_hms_opt(10, 0, 0).unwrap());
        assert_eq!(estimate_cost(&window), 450.0);
    }

    #[test]
    fn test_pickup_time_starts_the_window() {
        let request = request_with(
            shopping(),
            serde_json::json!({ "at_destination": false, "pickup_time": "09:00:00" }),
        );
        let window = service_window(&request).unwrap();
        assert_eq!(window.start, NaiveTime::from_hms_opt(9, 0, 0).unwrap());
        assert_eq!(estimate_cost(&window), 550.0);
    }

    #[test]
    fn test_pre_booked_appointment_overrides_booking_window() {
        let hospital = serde_json::json!({
            "purpose": "hospital",
            "hospital_name": "Sassoon",
            "hospital_address": { "district": "Pune" },
            "appointment": { "pre_booked": true, "start_time": "11:00:00", "end_time": "12:30:00" }
        });
        let request = request_with(hospital, serde_json::json!({ "at_destination": true }));
        let window = service_window(&request).unwrap();
        assert_eq!(window.start, NaiveTime::from_hms_opt(11, 0, 0).unwrap());
        assert_eq!(window.end, NaiveTime::from_hms_opt(12, 30, 0).unwrap());
        assert_eq!(estimate_cost(&window), 225.0);
    }

    #[test]
    fn test_pre_booked_appointment_ignores_pickup_time() {
        let hospital = serde_json::json!({
            "purpose": "hospital",
            "hospital_name": "Sassoon",
            "hospital_address": { "district": "Pune" },
            "appointment": { "pre_booked": true, "start_time": "11:00:00", "end_time": "12:30:00" }
        });
        let request = request_with(
            hospital,
            serde_json::json!({ "at_destination": false, "pickup_time": "08:00:00" }),
        );
        let window = service_window(&request).unwrap();
        assert_eq!(window.start, NaiveTime::from_hms_opt(11, 0, 0).unwrap());
        assert_eq!(window.end, NaiveTime::from_hms_opt(12, 30, 0).unwrap());
        assert_eq!(estimate_cost(&window), 225.0);
    }
}
