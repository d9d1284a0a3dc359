use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::user::Address;
use crate::{CoreError, CoreResult};

/// Travel request status in the lifecycle
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum RequestStatus {
    Draft,
    Pending,
    GuideSelected,
    Confirmed,
    PaymentPending,
    Paid,
    Completed,
    Cancelled,
}

impl RequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestStatus::Draft => "draft",
            RequestStatus::Pending => "pending",
            RequestStatus::GuideSelected => "guide-selected",
            RequestStatus::Confirmed => "confirmed",
            RequestStatus::PaymentPending => "payment-pending",
            RequestStatus::Paid => "paid",
            RequestStatus::Completed => "completed",
            RequestStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, RequestStatus::Completed | RequestStatus::Cancelled)
    }

    /// The fixed transition table. `guide-selected -> pending` is the only back-edge.
    pub fn can_transition_to(&self, next: RequestStatus) -> bool {
        use RequestStatus::*;
        match (self, next) {
            (Draft, Pending)
            | (Pending, GuideSelected)
            | (GuideSelected, Confirmed)
            | (GuideSelected, Pending)
            | (Confirmed, PaymentPending)
            | (PaymentPending, Paid)
            | (Paid, Completed) => true,
            (from, Cancelled) => !from.is_terminal(),
            _ => false,
        }
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RequestStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(RequestStatus::Draft),
            "pending" => Ok(RequestStatus::Pending),
            "guide-selected" => Ok(RequestStatus::GuideSelected),
            "confirmed" => Ok(RequestStatus::Confirmed),
            "payment-pending" => Ok(RequestStatus::PaymentPending),
            "paid" => Ok(RequestStatus::Paid),
            "completed" => Ok(RequestStatus::Completed),
            "cancelled" => Ok(RequestStatus::Cancelled),
            other => Err(CoreError::ValidationError(format!("unknown status: {}", other))),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum Purpose {
    Education,
    Hospital,
    Shopping,
}

impl Purpose {
    pub fn as_str(&self) -> &'static str {
        match self {
            Purpose::Education => "education",
            Purpose::Hospital => "hospital",
            Purpose::Shopping => "shopping",
        }
    }
}

// ============================================================================
// Wizard Step Payloads
// ============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EducationSubPurpose {
    Admission,
    Exam,
    Scribe,
    Counselling,
    Other,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EducationDetails {
    pub sub_purpose: EducationSubPurpose,
    #[serde(default)]
    pub college_name: String,
    #[serde(default)]
    pub college_address: Option<Address>,
    /// Subjects the scribe must be able to write
    #[serde(default)]
    pub scribe_subjects: Vec<String>,
}

/// A hospital visit booked ahead, whose slot overrides the booking window
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Appointment {
    #[serde(default)]
    pub pre_booked: bool,
    #[serde(default)]
    pub start_time: Option<NaiveTime>,
    #[serde(default)]
    pub end_time: Option<NaiveTime>,
    #[serde(default)]
    pub doctor_name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HospitalDetails {
    #[serde(default)]
    pub hospital_name: String,
    #[serde(default)]
    pub hospital_address: Option<Address>,
    #[serde(default)]
    pub department: Option<String>,
    #[serde(default)]
    pub appointment: Option<Appointment>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ShoppingType {
    Shop,
    Area,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ShoppingDetails {
    pub shopping_type: ShoppingType,
    #[serde(default)]
    pub shop_name: Option<String>,
    #[serde(default)]
    pub shop_address: Option<Address>,
    #[serde(default)]
    pub area_name: Option<String>,
    #[serde(default)]
    pub area_address: Option<Address>,
    #[serde(default)]
    pub items: Vec<String>,
}

/// Step 1: why the traveler is going, tagged by `purpose`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "purpose", rename_all = "lowercase")]
pub enum PurposeData {
    Education(EducationDetails),
    Hospital(HospitalDetails),
    Shopping(ShoppingDetails),
}

impl PurposeData {
    pub fn purpose(&self) -> Purpose {
        match self {
            PurposeData::Education(_) => Purpose::Education,
            PurposeData::Hospital(_) => Purpose::Hospital,
            PurposeData::Shopping(_) => Purpose::Shopping,
        }
    }

    /// The address the guide travels to, which depends on the purpose.
    pub fn destination_address(&self) -> Option<&Address> {
        match self {
            PurposeData::Education(e) => e.college_address.as_ref(),
            PurposeData::Hospital(h) => h.hospital_address.as_ref(),
            PurposeData::Shopping(s) => match s.shopping_type {
                ShoppingType::Shop => s.shop_address.as_ref(),
                ShoppingType::Area => s.area_address.as_ref(),
            },
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TravelMedium {
    Bus,
    Train,
    Metro,
    Cab,
    Auto,
    Own,
    Walk,
}

/// Step 2
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TravelMediumData {
    pub medium: TravelMedium,
    #[serde(default)]
    pub needs_wheelchair_access: bool,
    #[serde(default)]
    pub notes: Option<String>,
}

/// Step 3: where the guide meets the traveler
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PickupData {
    /// Guide meets the traveler at the destination itself
    #[serde(default)]
    pub at_destination: bool,
    #[serde(default)]
    pub pickup_address: Option<Address>,
    #[serde(default)]
    pub pickup_time: Option<NaiveTime>,
}

/// Step 4: the booking window
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Schedule {
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    #[serde(default)]
    pub notes: Option<String>,
}

/// One wizard step's form payload
#[derive(Debug, Clone, PartialEq)]
pub enum StepPayload {
    Purpose(PurposeData),
    TravelMedium(TravelMediumData),
    Pickup(PickupData),
    Schedule(Schedule),
}

impl StepPayload {
    /// Parse the JSON body submitted for wizard step `step` (1-based).
    pub fn from_json(step: u8, body: serde_json::Value) -> CoreResult<Self> {
        let invalid = |e: serde_json::Error| CoreError::ValidationError(format!("step {}: {}", step, e));
        match step {
            1 => Ok(StepPayload::Purpose(serde_json::from_value(body).map_err(invalid)?)),
            2 => Ok(StepPayload::TravelMedium(serde_json::from_value(body).map_err(invalid)?)),
            3 => Ok(StepPayload::Pickup(serde_json::from_value(body).map_err(invalid)?)),
            4 => Ok(StepPayload::Schedule(serde_json::from_value(body).map_err(invalid)?)),
            other => Err(CoreError::ValidationError(format!("no such step: {}", other))),
        }
    }

    pub fn step(&self) -> u8 {
        match self {
            StepPayload::Purpose(_) => 1,
            StepPayload::TravelMedium(_) => 2,
            StepPayload::Pickup(_) => 3,
            StepPayload::Schedule(_) => 4,
        }
    }

    fn validate(&self) -> CoreResult<()> {
        match self {
            StepPayload::Purpose(PurposeData::Education(e)) => {
                if e.sub_purpose == EducationSubPurpose::Scribe && e.scribe_subjects.is_empty() {
                    return Err(CoreError::ValidationError(
                        "scribe requests must list at least one subject".to_string(),
                    ));
                }
                Ok(())
            }
            StepPayload::Pickup(p) => {
                if !p.at_destination && p.pickup_time.is_none() {
                    return Err(CoreError::ValidationError(
                        "pickup time is required unless meeting at the destination".to_string(),
                    ));
                }
                Ok(())
            }
            StepPayload::Schedule(s) => {
                if s.end_time <= s.start_time {
                    return Err(CoreError::ValidationError(
                        "end time must be after start time".to_string(),
                    ));
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }
}

// ============================================================================
// Travel Request Document
// ============================================================================

/// At-most-once markers for transition emails
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct NotificationFlags {
    #[serde(default)]
    pub guide_selection_notified: bool,
    #[serde(default)]
    pub acceptance_notified: bool,
    #[serde(default)]
    pub decline_notified: bool,
    #[serde(default)]
    pub payment_notified: bool,
}

/// One booking attempt
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TravelRequest {
    pub id: Uuid,
    pub traveler_id: String,
    #[serde(default)]
    pub guide_id: Option<String>,
    pub status: RequestStatus,

    #[serde(default)]
    pub step1_complete: bool,
    #[serde(default)]
    pub step2_complete: bool,
    #[serde(default)]
    pub step3_complete: bool,
    #[serde(default)]
    pub step4_complete: bool,

    #[serde(default)]
    pub purpose_data: Option<PurposeData>,
    #[serde(default)]
    pub travel_medium_data: Option<TravelMediumData>,
    #[serde(default)]
    pub pickup_data: Option<PickupData>,
    #[serde(default)]
    pub schedule: Option<Schedule>,

    #[serde(default)]
    pub estimated_cost: Option<f64>,
    #[serde(default)]
    pub trip_pin: Option<String>,

    #[serde(default)]
    pub payment_order_id: Option<String>,
    #[serde(default)]
    pub payment_id: Option<String>,
    /// Amount the gateway must report, in minor units
    #[serde(default)]
    pub expected_amount: Option<i64>,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub payment_processed: bool,

    #[serde(default)]
    pub notifications: NotificationFlags,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub accepted_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub paid_at: Option<DateTime<Utc>>,
    /// Set when the guide enters the trip PIN
    #[serde(default)]
    pub trip_started_at: Option<DateTime<Utc>>,

    /// Bumped by the store on every write
    #[serde(default)]
    pub version: u64,
}

impl TravelRequest {
    pub fn new_draft(traveler_id: String) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            traveler_id,
            guide_id: None,
            status: RequestStatus::Draft,
            step1_complete: false,
            step2_complete: false,
            step3_complete: false,
            step4_complete: false,
            purpose_data: None,
            travel_medium_data: None,
            pickup_data: None,
            schedule: None,
            estimated_cost: None,
            trip_pin: None,
            payment_order_id: None,
            payment_id: None,
            expected_amount: None,
            currency: None,
            payment_processed: false,
            notifications: NotificationFlags::default(),
            created_at: now,
            updated_at: now,
            accepted_at: None,
            paid_at: None,
            trip_started_at: None,
            version: 0,
        }
    }

    pub fn step_complete(&self, step: u8) -> bool {
        match step {
            1 => self.step1_complete,
            2 => self.step2_complete,
            3 => self.step3_complete,
            4 => self.step4_complete,
            _ => false,
        }
    }

    pub fn all_steps_complete(&self) -> bool {
        (1..=4).all(|step| self.step_complete(step))
    }

    /// Step N is editable once steps 1..N-1 are complete.
    pub fn is_step_editable(&self, step: u8) -> bool {
        self.status == RequestStatus::Draft
            && (1..=4).contains(&step)
            && (1..step).all(|prior| self.step_complete(prior))
    }

    /// Store a wizard step's payload and mark the step complete.
    pub fn apply_step(&mut self, payload: StepPayload) -> CoreResult<()> {
        let step = payload.step();
        if self.status != RequestStatus::Draft {
            return Err(CoreError::InvalidTransition {
                from: self.status,
                to: RequestStatus::Draft,
            });
        }
        if !self.is_step_editable(step) {
            return Err(CoreError::ValidationError(format!(
                "step {} is locked until the previous steps are complete",
                step
            )));
        }
        payload.validate()?;

        match payload {
            StepPayload::Purpose(data) => {
                self.purpose_data = Some(data);
                self.step1_complete = true;
            }
            StepPayload::TravelMedium(data) => {
                self.travel_medium_data = Some(data);
                self.step2_complete = true;
            }
            StepPayload::Pickup(data) => {
                self.pickup_data = Some(data);
                self.step3_complete = true;
            }
            StepPayload::Schedule(data) => {
                self.schedule = Some(data);
                self.step4_complete = true;
            }
        }
        self.updated_at = Utc::now();
        Ok(())
    }

    pub fn purpose(&self) -> Option<Purpose> {
        self.purpose_data.as_ref().map(PurposeData::purpose)
    }

    pub fn destination_district(&self) -> Option<&str> {
        self.purpose_data
            .as_ref()
            .and_then(PurposeData::destination_address)
            .and_then(Address::district)
    }

    /// Scribe subjects required by an education request, if it is a scribe request.
    pub fn required_scribe_subjects(&self) -> Option<&[String]> {
        match &self.purpose_data {
            Some(PurposeData::Education(e)) if e.sub_purpose == EducationSubPurpose::Scribe => {
                Some(&e.scribe_subjects)
            }
            _ => None,
        }
    }

    pub fn is_assigned_to(&self, guide_id: &str) -> bool {
        self.guide_id.as_deref() == Some(guide_id)
    }

    /// Move to `next` if the transition table allows it.
    pub fn transition_to(&mut self, next: RequestStatus) -> CoreResult<RequestStatus> {
        if !self.status.can_transition_to(next) {
            return Err(CoreError::InvalidTransition {
                from: self.status,
                to: next,
            });
        }
        let previous = self.status;
        self.status = next;
        self.updated_at = Utc::now();
        Ok(previous)
    }
}
