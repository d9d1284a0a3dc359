use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tripmate_shared::Masked;

use crate::request::Purpose;

/// Account role, fixed at signup
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Role {
    Traveler,
    Guide,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Traveler => "Traveler",
            Role::Guide => "Guide",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Gender {
    Female,
    Male,
    Other,
}

/// Postal address as captured by the profile and booking forms.
///
/// Form payloads are accepted as-is, so every field defaults to empty. Consumers
/// treat a blank `district` as unknown.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Address {
    #[serde(default)]
    pub line1: String,
    #[serde(default)]
    pub line2: Option<String>,
    #[serde(default)]
    pub city: String,
    #[serde(default)]
    pub district: String,
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub pincode: String,
}

impl Address {
    pub fn district(&self) -> Option<&str> {
        let district = self.district.trim();
        if district.is_empty() {
            None
        } else {
            Some(district)
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Contact {
    pub phone: Masked<String>,
    #[serde(default)]
    pub emergency_contact_name: Option<String>,
    #[serde(default)]
    pub emergency_contact_phone: Option<Masked<String>>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DisabilityKind {
    Visual,
    Hearing,
    Locomotor,
    Intellectual,
    Multiple,
    Other,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Disability {
    pub kind: DisabilityKind,
    #[serde(default)]
    pub percentage: Option<u8>,
    #[serde(default)]
    pub needs_sign_language: bool,
    #[serde(default)]
    pub certificate_ref: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TravelerProfile {
    #[serde(default)]
    pub address: Option<Address>,
    #[serde(default)]
    pub contact: Option<Contact>,
    #[serde(default)]
    pub disability: Option<Disability>,
}

impl TravelerProfile {
    pub fn needs_sign_language(&self) -> bool {
        self.disability
            .as_ref()
            .map(|d| d.needs_sign_language)
            .unwrap_or(false)
    }
}

/// A traveler or guide account
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct User {
    pub uid: String,
    pub role: Role,
    pub display_name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub gender: Option<Gender>,
    #[serde(default)]
    pub traveler: Option<TravelerProfile>,
    #[serde(default)]
    pub fcm_tokens: BTreeSet<String>,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn new(uid: String, role: Role, display_name: String) -> Self {
        Self {
            uid,
            role,
            display_name,
            email: None,
            gender: None,
            traveler: None,
            fcm_tokens: BTreeSet::new(),
            created_at: Utc::now(),
        }
    }

    pub fn is_guide(&self) -> bool {
        self.role == Role::Guide
    }
}

/// Guide verification status
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum OnboardingState {
    #[default]
    #[serde(rename = "not_started")]
    NotStarted,
    #[serde(rename = "verification-pending")]
    VerificationPending,
    #[serde(rename = "active")]
    Active,
    #[serde(rename = "rejected")]
    Rejected,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct DisabilityExpertise {
    #[serde(default)]
    pub sign_language: bool,
    /// Opted into writing exams on a traveler's behalf
    #[serde(default)]
    pub scribe: bool,
    #[serde(default)]
    pub scribe_subjects: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Verification {
    #[serde(default)]
    pub id_document_ref: Option<String>,
    #[serde(default)]
    pub certificate_refs: Vec<String>,
    #[serde(default)]
    pub reviewer_note: Option<String>,
    #[serde(default)]
    pub reviewed_at: Option<DateTime<Utc>>,
}

/// Guide-only profile, stored apart from the user record
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GuideProfile {
    pub uid: String,
    #[serde(default)]
    pub address: Option<Address>,
    #[serde(default)]
    pub contact: Option<Contact>,
    #[serde(default)]
    pub disability_expertise: DisabilityExpertise,
    #[serde(default)]
    pub local_expertise: Vec<Purpose>,
    #[serde(default)]
    pub verification: Verification,
    #[serde(default)]
    pub onboarding_state: OnboardingState,
    #[serde(default)]
    pub is_available: bool,
    pub updated_at: DateTime<Utc>,
}

impl GuideProfile {
    pub fn new(uid: String) -> Self {
        Self {
            uid,
            address: None,
            contact: None,
            disability_expertise: DisabilityExpertise::default(),
            local_expertise: Vec::new(),
            verification: Verification::default(),
            onboarding_state: OnboardingState::NotStarted,
            is_available: false,
            updated_at: Utc::now(),
        }
    }

    pub fn district(&self) -> Option<&str> {
        self.address.as_ref().and_then(Address::district)
    }

    pub fn is_active(&self) -> bool {
        self.onboarding_state == OnboardingState::Active
    }
}
