//! Transcript entries journaled by the voice session

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Who spoke
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Speaker {
    User,
    Assistant,
}

impl Speaker {
    pub fn as_str(&self) -> &'static str {
        match self {
            Speaker::User => "user",
            Speaker::Assistant => "assistant",
        }
    }
}

/// One transcript line. Entries are appended strictly in the order speech
/// was observed; assistant entries follow the user entry that prompted them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptEntry {
    pub speaker: Speaker,
    pub text: String,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
}

impl TranscriptEntry {
    pub fn user(text: impl Into<String>, language: Option<String>) -> Self {
        Self {
            speaker: Speaker::User,
            text: text.into(),
            timestamp: Utc::now(),
            language,
        }
    }

    pub fn assistant(text: impl Into<String>, language: Option<String>) -> Self {
        Self {
            speaker: Speaker::Assistant,
            text: text.into(),
            timestamp: Utc::now(),
            language,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_serialization_shape() {
        let entry = TranscriptEntry::user("hello", Some("en".to_string()));
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["speaker"], "user");
        assert_eq!(json["text"], "hello");
        assert_eq!(json["language"], "en");

        let entry = TranscriptEntry::assistant("hi", None);
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["speaker"], "assistant");
        assert!(json.get("language").is_none());
    }
}
