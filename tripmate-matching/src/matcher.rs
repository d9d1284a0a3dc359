use futures_util::future::join_all;
use serde::Serialize;
use tracing::{debug, warn};
use tripmate_core::repository::UserRepository;
use tripmate_core::request::TravelRequest;
use tripmate_core::user::{Role, User};
use tripmate_core::CoreResult;

use crate::criteria::{GuideCandidate, MatchContext, MatchCriterion};
use crate::tags::expertise_tags;

/// A guide eligible to serve a request, ready for display
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct MatchedGuide {
    pub uid: String,
    pub display_name: String,
    pub district: Option<String>,
    pub tags: Vec<String>,
}

pub struct GuideMatcher {
    criteria: Vec<MatchCriterion>,
}

impl GuideMatcher {
    pub fn new(criteria: Vec<MatchCriterion>) -> Self {
        Self { criteria }
    }

    /// First criterion the candidate fails, if any.
    pub fn first_failure(&self, ctx: &MatchContext<'_>, candidate: &GuideCandidate) -> Option<MatchCriterion> {
        self.criteria
            .iter()
            .copied()
            .find(|criterion| !criterion.evaluate(ctx, candidate))
    }

    /// Keep the candidates passing every criterion, in candidate order.
    pub fn filter(&self, request: &TravelRequest, traveler: &User, candidates: Vec<GuideCandidate>) -> Vec<MatchedGuide> {
        let ctx = MatchContext { request, traveler };

        candidates
            .into_iter()
            .filter_map(|candidate| {
                if let Some(failed) = self.first_failure(&ctx, &candidate) {
                    debug!(
                        request_id = %request.id,
                        guide = %candidate.user.uid,
                        criterion = ?failed,
                        "Guide excluded"
                    );
                    return None;
                }
                let profile = candidate.profile?;
                Some(MatchedGuide {
                    district: profile.district().map(String::from),
                    tags: expertise_tags(&profile),
                    uid: candidate.user.uid,
                    display_name: candidate.user.display_name,
                })
            })
            .collect()
    }

    /// Query every guide, fetch their profiles in parallel, then filter.
    pub async fn find_matches(
        &self,
        users: &dyn UserRepository,
        request: &TravelRequest,
        traveler: &User,
    ) -> CoreResult<Vec<MatchedGuide>> {
        let guides = users.list_users_by_role(Role::Guide).await?;

        let lookups = guides.iter().map(|guide| users.get_guide_profile(&guide.uid));
        let profiles = join_all(lookups).await;

        let candidates: Vec<GuideCandidate> = guides
            .into_iter()
            .zip(profiles)
            .map(|(user, profile)| {
                let profile = profile.unwrap_or_else(|e| {
                    warn!("Guide profile lookup failed for {}: {}", user.uid, e);
                    None
                });
                GuideCandidate { user, profile }
            })
            .collect();

        let total = candidates.len();
        let matches = self.filter(request, traveler, candidates);
        debug!(request_id = %request.id, total, matched = matches.len(), "Guide matching finished");
        Ok(matches)
    }
}

impl Default for GuideMatcher {
    fn default() -> Self {
        Self::new(MatchCriterion::ALL.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tripmate_core::memory::InMemoryUserRepository;
    use tripmate_core::request::{Purpose, StepPayload};
    use tripmate_core::user::{Address, Disability, DisabilityKind, Gender, GuideProfile, OnboardingState, TravelerProfile};

    fn traveler(gender: Gender, sign_language: bool) -> User {
        let mut user = User::new("traveler-1".to_string(), Role::Traveler, "Asha".to_string());
        user.gender = Some(gender);
        user.traveler = Some(TravelerProfile {
            disability: Some(Disability {
                kind: DisabilityKind::Hearing,
                percentage: Some(60),
                needs_sign_language: sign_language,
                certificate_ref: None,
            }),
            ..Default::default()
        });
        user
    }

    fn request(purpose: serde_json::Value) -> TravelRequest {
        let mut request = TravelRequest::new_draft("traveler-1".to_string());
        request.apply_step(StepPayload::from_json(1, purpose).unwrap()).unwrap();
        request
    }

    fn education_in(district: &str) -> TravelRequest {
        request(serde_json::json!({
            "purpose": "education",
            "sub_purpose": "admission",
            "college_name": "Fergusson College",
            "college_address": { "district": district }
        }))
    }

    fn guide(uid: &str, gender: Gender, district: &str, expertise: Vec<Purpose>) -> GuideCandidate {
        let mut user = User::new(uid.to_string(), Role::Guide, format!("Guide {}", uid));
        user.gender = Some(gender);

        let mut profile = GuideProfile::new(uid.to_string());
        profile.address = Some(Address {
            district: district.to_string(),
            ..Default::default()
        });
        profile.local_expertise = expertise;
        profile.onboarding_state = OnboardingState::Active;
        profile.is_available = true;

        GuideCandidate {
            user,
            profile: Some(profile),
        }
    }

    fn uids(matches: &[MatchedGuide]) -> Vec<&str> {
        matches.iter().map(|m| m.uid.as_str()).collect()
    }

    #[test]
    fn test_includes_fully_eligible_guide() {
        let matcher = GuideMatcher::default();
        let matches = matcher.filter(
            &education_in("Pune"),
            &traveler(Gender::Female, false),
            vec![guide("g1", Gender::Female, "Pune", vec![Purpose::Education])],
        );
        assert_eq!(uids(&matches), vec!["g1"]);
        assert_eq!(matches[0].district.as_deref(), Some("Pune"));
    }

    #[test]
    fn test_excludes_wrong_district_and_missing_expertise() {
        let matcher = GuideMatcher::default();
        let candidates = vec![
            guide("other-district", Gender::Female, "Nagpur", vec![Purpose::Education]),
            guide("no-expertise", Gender::Female, "Pune", vec![Purpose::Hospital]),
            guide("eligible", Gender::Female, "pune", vec![Purpose::Education, Purpose::Shopping]),
        ];
        let matches = matcher.filter(&education_in("Pune"), &traveler(Gender::Female, false), candidates);
        assert_eq!(uids(&matches), vec!["eligible"]);
    }

    #[test]
    fn test_verification_pending_guide_is_excluded() {
        let matcher = GuideMatcher::default();
        let mut candidate = guide("g1", Gender::Female, "Pune", vec![Purpose::Education]);
        if let Some(profile) = candidate.profile.as_mut() {
            profile.onboarding_state = OnboardingState::VerificationPending;
        }

        let request = education_in("Pune");
        let traveler = traveler(Gender::Female, false);
        let ctx = MatchContext {
            request: &request,
            traveler: &traveler,
        };
        assert_eq!(
            matcher.first_failure(&ctx, &candidate),
            Some(MatchCriterion::ActiveAndAvailable)
        );
        assert!(matcher.filter(&request, &traveler, vec![candidate]).is_empty());
    }

    #[test]
    fn test_unavailable_or_profileless_guides_are_excluded() {
        let matcher = GuideMatcher::default();
        let mut busy = guide("busy", Gender::Male, "Pune", vec![Purpose::Education]);
        if let Some(profile) = busy.profile.as_mut() {
            profile.is_available = false;
        }
        let mut bare = guide("bare", Gender::Male, "Pune", vec![Purpose::Education]);
        bare.profile = None;

        let matches = matcher.filter(&education_in("Pune"), &traveler(Gender::Male, false), vec![busy, bare]);
        assert!(matches.is_empty());
    }

    #[test]
    fn test_gender_must_match_exactly() {
        let matcher = GuideMatcher::default();
        let mut unknown = guide("unknown", Gender::Female, "Pune", vec![Purpose::Education]);
        unknown.user.gender = None;

        let matches = matcher.filter(
            &education_in("Pune"),
            &traveler(Gender::Female, false),
            vec![guide("male", Gender::Male, "Pune", vec![Purpose::Education]), unknown],
        );
        assert!(matches.is_empty());
    }

    #[test]
    fn test_scribe_subjects_must_be_a_subset() {
        let matcher = GuideMatcher::default();
        let scribe_request = request(serde_json::json!({
            "purpose": "education",
            "sub_purpose": "scribe",
            "college_address": { "district": "Pune" },
            "scribe_subjects": ["Maths", "physics"]
        }));

        let mut superset = guide("superset", Gender::Female, "Pune", vec![Purpose::Education]);
        if let Some(profile) = superset.profile.as_mut() {
            profile.disability_expertise.scribe = true;
            profile.disability_expertise.scribe_subjects =
                vec!["Physics".to_string(), "maths".to_string(), "Chemistry".to_string()];
        }
        let mut partial = guide("partial", Gender::Female, "Pune", vec![Purpose::Education]);
        if let Some(profile) = partial.profile.as_mut() {
            profile.disability_expertise.scribe = true;
            profile.disability_expertise.scribe_subjects = vec!["Maths".to_string()];
        }
        let mut not_opted_in = guide("not-opted-in", Gender::Female, "Pune", vec![Purpose::Education]);
        if let Some(profile) = not_opted_in.profile.as_mut() {
            profile.disability_expertise.scribe_subjects = vec!["Maths".to_string(), "Physics".to_string()];
        }

        let matches = matcher.filter(
            &scribe_request,
            &traveler(Gender::Female, false),
            vec![superset, partial, not_opted_in],
        );
        assert_eq!(uids(&matches), vec!["superset"]);
        assert_eq!(matches[0].tags, vec!["Scribe: Physics, maths, Chemistry".to_string()]);
    }

    #[test]
    fn test_sign_language_required_when_traveler_needs_it() {
        let matcher = GuideMatcher::default();
        let mut signer = guide("signer", Gender::Female, "Pune", vec![Purpose::Education]);
        if let Some(profile) = signer.profile.as_mut() {
            profile.disability_expertise.sign_language = true;
        }
        let candidates = vec![guide("plain", Gender::Female, "Pune", vec![Purpose::Education]), signer];

        let matches = matcher.filter(&education_in("Pune"), &traveler(Gender::Female, true), candidates.clone());
        assert_eq!(uids(&matches), vec!["signer"]);

        let matches = matcher.filter(&education_in("Pune"), &traveler(Gender::Female, false), candidates);
        assert_eq!(uids(&matches), vec!["plain", "signer"]);
    }

    #[test]
    fn test_request_without_destination_matches_nobody() {
        let matcher = GuideMatcher::default();
        let request = TravelRequest::new_draft("traveler-1".to_string());
        let matches = matcher.filter(
            &request,
            &traveler(Gender::Female, false),
            vec![guide("g1", Gender::Female, "Pune", vec![Purpose::Education])],
        );
        assert!(matches.is_empty());
    }

    #[tokio::test]
    async fn test_find_matches_reads_guides_from_repository() {
        let users = InMemoryUserRepository::new();
        for candidate in [
            guide("g1", Gender::Female, "Pune", vec![Purpose::Education]),
            guide("g2", Gender::Female, "Satara", vec![Purpose::Education]),
        ] {
            users.insert_user(&candidate.user).await.unwrap();
            if let Some(profile) = &candidate.profile {
                users.save_guide_profile(profile).await.unwrap();
            }
        }
        // A guide who never completed a profile
        let mut bare = User::new("g3".to_string(), Role::Guide, "New Guide".to_string());
        bare.gender = Some(Gender::Female);
        users.insert_user(&bare).await.unwrap();

        let traveler = traveler(Gender::Female, false);
        users.insert_user(&traveler).await.unwrap();

        let matches = GuideMatcher::default()
            .find_matches(&users, &education_in("Pune"), &traveler)
            .await
            .unwrap();
        assert_eq!(uids(&matches), vec!["g1"]);
    }
}
