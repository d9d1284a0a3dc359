use serde::{Deserialize, Serialize};
use tripmate_core::request::TravelRequest;
use tripmate_core::user::{GuideProfile, User};

/// A guide account together with its profile record, if one was ever saved
#[derive(Debug, Clone)]
pub struct GuideCandidate {
    pub user: User,
    pub profile: Option<GuideProfile>,
}

/// What a candidate is checked against
pub struct MatchContext<'a> {
    pub request: &'a TravelRequest,
    pub traveler: &'a User,
}

/// Eligibility checks, evaluated in declaration order.
///
/// Every check fails closed: a field missing on the request, the traveler or
/// the guide counts as "does not match".
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MatchCriterion {
    ProfileComplete,
    ActiveAndAvailable,
    SameGender,
    SameDistrict,
    PurposeExpertise,
    SignLanguage,
}

impl MatchCriterion {
    pub const ALL: [MatchCriterion; 6] = [
        MatchCriterion::ProfileComplete,
        MatchCriterion::ActiveAndAvailable,
        MatchCriterion::SameGender,
        MatchCriterion::SameDistrict,
        MatchCriterion::PurposeExpertise,
        MatchCriterion::SignLanguage,
    ];

    pub fn evaluate(&self, ctx: &MatchContext<'_>, candidate: &GuideCandidate) -> bool {
        let Some(profile) = candidate.profile.as_ref() else {
            return false;
        };

        match self {
            MatchCriterion::ProfileComplete => true,
            MatchCriterion::ActiveAndAvailable => profile.is_active() && profile.is_available,
            MatchCriterion::SameGender => match (ctx.traveler.gender, candidate.user.gender) {
                (Some(traveler), Some(guide)) => traveler == guide,
                _ => false,
            },
            MatchCriterion::SameDistrict => match (ctx.request.destination_district(), profile.district()) {
                (Some(destination), Some(home)) => destination.eq_ignore_ascii_case(home),
                _ => false,
            },
            MatchCriterion::PurposeExpertise => has_purpose_expertise(ctx.request, profile),
            MatchCriterion::SignLanguage => {
                let needs_sign_language = ctx
                    .traveler
                    .traveler
                    .as_ref()
                    .map(|t| t.needs_sign_language())
                    .unwrap_or(false);
                !needs_sign_language || profile.disability_expertise.sign_language
            }
        }
    }
}

fn has_purpose_expertise(request: &TravelRequest, profile: &GuideProfile) -> bool {
    let Some(purpose) = request.purpose() else {
        return false;
    };
    if !profile.local_expertise.contains(&purpose) {
        return false;
    }

    match request.required_scribe_subjects() {
        None => true,
        Some(required) => {
            let expertise = &profile.disability_expertise;
            expertise.scribe
                && required.iter().all(|subject| {
                    expertise
                        .scribe_subjects
                        .iter()
                        .any(|declared| same_subject(declared, subject))
                })
        }
    }
}

fn same_subject(a: &str, b: &str) -> bool {
    a.trim().eq_ignore_ascii_case(b.trim())
}
