//! Mid-call language tracking
//!
//! The first utterance may switch the session language at detection
//! confidence above 0.70; later utterances switch only above 0.85. Every
//! switch is timestamped so the call record carries the full history.

use chrono::Utc;

use outdial_core::{Language, LanguageSwitch};

const FIRST_UTTERANCE_CONFIDENCE: f32 = 0.70;
const SUBSEQUENT_CONFIDENCE: f32 = 0.85;

/// Per-call language state
#[derive(Debug)]
pub struct LanguageTracker {
    configured: Language,
    current: Language,
    detected: Vec<Language>,
    switches: Vec<LanguageSwitch>,
    utterances_seen: u64,
    auto_detect: bool,
}

impl LanguageTracker {
    pub fn new(configured: Language, auto_detect: bool) -> Self {
        Self {
            current: configured.clone(),
            configured,
            detected: Vec::new(),
            switches: Vec::new(),
            utterances_seen: 0,
            auto_detect,
        }
    }

    pub fn current(&self) -> &Language {
        &self.current
    }

    pub fn configured(&self) -> &Language {
        &self.configured
    }

    pub fn switches(&self) -> &[LanguageSwitch] {
        &self.switches
    }

    pub fn detected(&self) -> &[Language] {
        &self.detected
    }

    /// Process a detection attached to a final utterance. Returns the
    /// switch record when the session language changed.
    pub fn observe(&mut self, code: &str, confidence: f32) -> Option<LanguageSwitch> {
        self.utterances_seen += 1;

        if !self.auto_detect {
            return None;
        }

        let detected = Language::new(code);
        if !self.detected.contains(&detected) {
            self.detected.push(detected.clone());
        }

        let threshold = if self.utterances_seen == 1 {
            FIRST_UTTERANCE_CONFIDENCE
        } else {
            SUBSEQUENT_CONFIDENCE
        };

        if confidence <= threshold || detected == self.current {
            return None;
        }

        let switch = LanguageSwitch {
            from: self.current.clone(),
            to: detected.clone(),
            confidence,
            at: Utc::now(),
        };
        tracing::info!(
            from = %switch.from,
            to = %switch.to,
            confidence,
            "Language switch"
        );

        self.current = detected;
        self.switches.push(switch.clone());
        Some(switch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_utterance_low_threshold() {
        let mut tracker = LanguageTracker::new(Language::new("en"), true);
        let switch = tracker.observe("hi", 0.75);
        assert!(switch.is_some());
        assert_eq!(tracker.current().code(), "hi");
    }

    #[test]
    fn test_same_language_no_switch() {
        let mut tracker = LanguageTracker::new(Language::new("en"), true);
        assert!(tracker.observe("en", 0.95).is_none());
        assert!(tracker.switches().is_empty());
    }

    #[test]
    fn test_subsequent_needs_higher_confidence() {
        let mut tracker = LanguageTracker::new(Language::new("en"), true);
        assert!(tracker.observe("en", 0.95).is_none()); // first
        assert!(tracker.observe("hi", 0.80).is_none()); // under 0.85
        let switch = tracker.observe("hi", 0.90);
        assert!(switch.is_some());
        assert_eq!(tracker.switches().len(), 1);
    }

    #[test]
    fn test_scenario_en_then_hi() {
        // configured en; first detection en@0.95 stays; fifth hi@0.90 switches
        let mut tracker = LanguageTracker::new(Language::new("en"), true);
        assert!(tracker.observe("en", 0.95).is_none());
        for _ in 0..3 {
            assert!(tracker.observe("en", 0.9).is_none());
        }
        let switch = tracker.observe("hi", 0.90).unwrap();
        assert_eq!(switch.from.code(), "en");
        assert_eq!(switch.to.code(), "hi");
        assert_eq!(tracker.switches().len(), 1);
    }

    #[test]
    fn test_auto_detect_disabled() {
        let mut tracker = LanguageTracker::new(Language::new("en"), false);
        assert!(tracker.observe("hi", 0.99).is_none());
        assert_eq!(tracker.current().code(), "en");
    }

    #[test]
    fn test_exact_threshold_does_not_switch() {
        let mut tracker = LanguageTracker::new(Language::new("en"), true);
        // First utterance at exactly 0.70 must not switch (strictly greater)
        assert!(tracker.observe("hi", 0.70).is_none());
    }
}
