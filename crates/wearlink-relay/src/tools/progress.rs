//! Short status phrases shown while a tool runs.

pub const FALLBACK_PHRASE: &str = "Working on it...";

const PHRASES: &[((&str, &str), &str)] = &[
    (("gmail", "get_unread"), "Checking your emails..."),
    (("gmail", "search"), "Searching your emails..."),
    (("gmail", "get_email"), "Opening that email..."),
    (("calendar", "get_today"), "Checking today's schedule..."),
    (("calendar", "list_events"), "Looking at your calendar..."),
];

pub fn progress_phrase(provider: &str, action: &str) -> &'static str {
    PHRASES
        .iter()
        .find(|((p, a), _)| *p == provider && *a == action)
        .map_or(FALLBACK_PHRASE, |(_, phrase)| phrase)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_pairs() {
        assert_eq!(progress_phrase("gmail", "get_unread"), "Checking your emails...");
        assert_eq!(
            progress_phrase("calendar", "list_events"),
            "Looking at your calendar..."
        );
    }

    #[test]
    fn unknown_pairs_fall_back() {
        assert_eq!(progress_phrase("gmail", "shred"), FALLBACK_PHRASE);
        assert_eq!(progress_phrase("weather", "forecast"), FALLBACK_PHRASE);
        assert_eq!(progress_phrase("", ""), FALLBACK_PHRASE);
    }
}
