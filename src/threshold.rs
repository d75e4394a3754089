//! Threshold Policy: maps a query's lexical content to a similarity
//! cutoff τ for the semantic search branch.

/// Lowercase keyword classes, checked in this order; the first match
/// wins. Order matters because some tokens could plausibly belong to
/// more than one class (e.g. "cooking" is activity, not food).
const FOOD: &[&str] = &[
    "food", "meal", "pasta", "pizza", "steak", "sushi", "coffee", "ramen", "burger", "restaurant",
    "dinner", "lunch", "breakfast", "dessert", "cake", "noodle",
];
const PERSON: &[&str] = &[
    "person", "people", "family", "portrait", "selfie", "face", "man", "woman", "friend", "kid",
    "child", "baby",
];
const PLACE: &[&str] = &[
    "beach", "mountain", "city", "park", "street", "ocean", "lake", "bridge", "island", "forest",
    "garden", "sky", "sunset",
];
const ACTIVITY: &[&str] = &[
    "walking", "running", "swimming", "playing", "cooking", "reading", "travel", "hiking",
    "dancing", "skiing",
];

const TAU_FOOD: f32 = 0.24;
const TAU_PERSON: f32 = 0.28;
const TAU_PLACE: f32 = 0.25;
const TAU_ACTIVITY: f32 = 0.25;
const TAU_DEFAULT: f32 = 0.26;

/// Classify `search_text` (lowercase substring match against each class's
/// token list, in `food, person, place, activity` order) and return its
/// similarity cutoff.
pub fn threshold_for(search_text: &str) -> f32 {
    let lower = search_text.to_lowercase();
    if matches_any(&lower, FOOD) {
        TAU_FOOD
    } else if matches_any(&lower, PERSON) {
        TAU_PERSON
    } else if matches_any(&lower, PLACE) {
        TAU_PLACE
    } else if matches_any(&lower, ACTIVITY) {
        TAU_ACTIVITY
    } else {
        TAU_DEFAULT
    }
}

fn matches_any(lower_text: &str, tokens: &[&str]) -> bool {
    tokens.iter().any(|t| lower_text.contains(t))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_food_threshold() {
        assert_eq!(threshold_for("pasta italian food"), TAU_FOOD);
        assert_eq!(threshold_for("A steak dinner"), TAU_FOOD);
    }

    #[test]
    fn test_person_threshold() {
        assert_eq!(threshold_for("family portrait"), TAU_PERSON);
    }

    #[test]
    fn test_place_threshold() {
        assert_eq!(threshold_for("sunset over the ocean"), TAU_PLACE);
    }

    #[test]
    fn test_activity_threshold() {
        assert_eq!(threshold_for("hiking in the woods"), TAU_ACTIVITY);
    }

    #[test]
    fn test_default_threshold() {
        assert_eq!(threshold_for("abstract geometric pattern"), TAU_DEFAULT);
    }

    #[test]
    fn test_threshold_is_deterministic() {
        assert_eq!(threshold_for("steak beef grilled meat restaurant food"), threshold_for("steak beef grilled meat restaurant food"));
    }
}
