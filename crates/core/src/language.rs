//! Language codes and mid-call language switching

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// BCP-47-ish language code as reported by the STT providers
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Language(pub String);

impl Language {
    pub fn new(code: impl Into<String>) -> Self {
        Self(code.into().to_lowercase())
    }

    pub fn code(&self) -> &str {
        &self.0
    }

    /// Languages the Indic streaming STT provider handles natively
    pub fn is_indic(&self) -> bool {
        matches!(
            self.0.as_str(),
            "hi" | "bn" | "ta" | "te" | "kn" | "ml" | "mr" | "gu" | "pa" | "or" | "as"
        )
    }
}

impl std::fmt::Display for Language {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Language {
    fn from(s: &str) -> Self {
        Language::new(s)
    }
}

/// One recorded mid-call language switch
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LanguageSwitch {
    pub from: Language,
    pub to: Language,
    pub confidence: f32,
    pub at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_language_normalization() {
        assert_eq!(Language::new("EN").code(), "en");
    }

    #[test]
    fn test_indic_detection() {
        assert!(Language::new("hi").is_indic());
        assert!(Language::new("ta").is_indic());
        assert!(!Language::new("en").is_indic());
        assert!(!Language::new("fr").is_indic());
    }
}
