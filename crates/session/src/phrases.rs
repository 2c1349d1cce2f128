//! End-call phrase matching
//!
//! Matched against each final user turn: exact, endswith, or whole-word
//! (regex-escaped boundaries). On match the session speaks the configured
//! goodbye and closes the stream with code 1000.

use regex::Regex;

fn normalize(text: &str) -> String {
    text.to_lowercase()
        .trim()
        .trim_end_matches(['.', '!', '?', ','])
        .to_string()
}

/// Does the user turn match any configured end-call phrase?
pub fn matches_end_phrase(turn: &str, phrases: &[String]) -> bool {
    let turn_norm = normalize(turn);
    if turn_norm.is_empty() {
        return false;
    }

    for phrase in phrases {
        let phrase_norm = normalize(phrase);
        if phrase_norm.is_empty() {
            continue;
        }

        if turn_norm == phrase_norm || turn_norm.ends_with(&phrase_norm) {
            return true;
        }

        // Whole-word containment with escaped boundaries
        let pattern = format!(r"\b{}\b", regex::escape(&phrase_norm));
        if let Ok(re) = Regex::new(&pattern) {
            if re.is_match(&turn_norm) {
                return true;
            }
        }
    }

    false
}

#[cfg(test)]
mod tests {
    use super::*;

    fn phrases(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_exact_match() {
        assert!(matches_end_phrase("goodbye", &phrases(&["goodbye"])));
        assert!(matches_end_phrase("Goodbye.", &phrases(&["goodbye"])));
    }

    #[test]
    fn test_endswith_match() {
        assert!(matches_end_phrase(
            "okay thanks goodbye",
            &phrases(&["goodbye"])
        ));
    }

    #[test]
    fn test_whole_word_match() {
        assert!(matches_end_phrase(
            "goodbye then, talk later",
            &phrases(&["goodbye"])
        ));
        // Substring inside a word must not match
        assert!(!matches_end_phrase(
            "the goodbyes were said",
            &phrases(&["goodbye"])
        ));
    }

    #[test]
    fn test_multi_word_phrase() {
        assert!(matches_end_phrase(
            "please stop calling me",
            &phrases(&["stop calling"])
        ));
    }

    #[test]
    fn test_regex_metacharacters_escaped() {
        // A phrase with regex metacharacters must not panic or mis-match
        assert!(!matches_end_phrase("anything", &phrases(&["bye (now)"])));
        assert!(matches_end_phrase("bye (now)", &phrases(&["bye (now)"])));
    }

    #[test]
    fn test_empty_inputs() {
        assert!(!matches_end_phrase("", &phrases(&["goodbye"])));
        assert!(!matches_end_phrase("hello", &phrases(&[])));
        assert!(!matches_end_phrase("hello", &phrases(&[""])));
    }
}
