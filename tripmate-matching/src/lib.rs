pub mod criteria;
pub mod matcher;
pub mod tags;

pub use criteria::{GuideCandidate, MatchContext, MatchCriterion};
pub use matcher::{GuideMatcher, MatchedGuide};
pub use tags::expertise_tags;
