use tripmate_core::user::GuideProfile;

/// Display labels for what a guide can help with beyond the trip purpose.
pub fn expertise_tags(profile: &GuideProfile) -> Vec<String> {
    let mut tags = Vec::new();
    let expertise = &profile.disability_expertise;

    if expertise.sign_language {
        tags.push("Sign language".to_string());
    }
    if expertise.scribe {
        if expertise.scribe_subjects.is_empty() {
            tags.push("Scribe".to_string());
        } else {
            tags.push(format!("Scribe: {}", expertise.scribe_subjects.join(", ")));
        }
    }
    tags
}
