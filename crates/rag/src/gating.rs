//! Query gating
//!
//! A knowledge query costs an embedding round trip plus a vector search,
//! so short conversational tokens skip it. An utterance is considered an
//! information question when it contains an interrogative or ends in "?"
//! and is longer than three words.

/// Utterances at or below this word count never query
const MIN_QUERY_WORDS: usize = 3;

const INTERROGATIVES: [&str; 12] = [
    "what", "when", "where", "who", "why", "how", "which", "can", "could", "does", "do", "is",
];

/// Greetings and acknowledgements that never warrant retrieval
const CONVERSATIONAL: [&str; 10] = [
    "hi", "hello", "hey", "thanks", "thank you", "okay", "ok", "yes", "no", "bye",
];

/// Decide whether a user utterance should query the knowledge base
pub fn should_query(utterance: &str) -> bool {
    let trimmed = utterance.trim();
    if trimmed.is_empty() {
        return false;
    }

    let lowered = trimmed.to_lowercase();
    let normalized = lowered.trim_end_matches(['?', '.', '!']);
    if CONVERSATIONAL.contains(&normalized) {
        return false;
    }

    let words: Vec<&str> = lowered.split_whitespace().collect();
    if words.len() <= MIN_QUERY_WORDS {
        return false;
    }

    if trimmed.ends_with('?') {
        return true;
    }

    words
        .iter()
        .any(|word| INTERROGATIVES.contains(&word.trim_matches(|c: char| !c.is_alphanumeric())))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_questions_pass() {
        assert!(should_query("what are your interest rates?"));
        assert!(should_query("how long does the application process take"));
        assert!(should_query("can you tell me about the warranty"));
    }

    #[test]
    fn test_short_utterances_skip() {
        assert!(!should_query("what is this?")); // 3 words
        assert!(!should_query("yes"));
        assert!(!should_query("okay"));
        assert!(!should_query(""));
    }

    #[test]
    fn test_greetings_skip() {
        assert!(!should_query("hello"));
        assert!(!should_query("thank you"));
    }

    #[test]
    fn test_statements_without_interrogative_skip() {
        assert!(!should_query("I will think about it and call back"));
    }

    #[test]
    fn test_question_mark_forces_query() {
        assert!(should_query("the price includes installation right?"));
    }
}
