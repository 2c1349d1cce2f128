//! Voicemail detection
//!
//! A keyword + confidence classifier over final user transcripts, run only
//! within the first `min_detection_time` seconds of the call. A positive
//! detection terminates the call immediately, saving provider cost on
//! machine-answered dials.

use std::time::{Duration, Instant};

use outdial_core::VoicemailConfig;

/// Classification of one transcript
#[derive(Debug, Clone, PartialEq)]
pub struct VoicemailVerdict {
    pub is_voicemail: bool,
    pub confidence: f32,
    pub matched: Vec<String>,
}

/// Per-call voicemail detector
#[derive(Debug)]
pub struct VoicemailDetector {
    keywords: Vec<String>,
    min_detection_time: Duration,
    confidence_threshold: f32,
    enabled: bool,
}

impl VoicemailDetector {
    pub fn new(config: &VoicemailConfig) -> Self {
        Self {
            keywords: config.keywords.iter().map(|k| k.to_lowercase()).collect(),
            min_detection_time: Duration::from_secs(config.min_detection_time as u64),
            confidence_threshold: config.confidence_threshold,
            enabled: config.enabled,
        }
    }

    /// Classify a final transcript. `call_started` bounds the detection
    /// window; transcripts after it are never classified.
    pub fn check(
        &self,
        transcript: &str,
        call_started: Instant,
        now: Instant,
    ) -> VoicemailVerdict {
        let negative = VoicemailVerdict {
            is_voicemail: false,
            confidence: 0.0,
            matched: Vec::new(),
        };

        if !self.enabled {
            return negative;
        }
        if now.duration_since(call_started) > self.min_detection_time + Duration::from_secs(1) {
            // Past the detection window; a live caller by now
            return negative;
        }

        let lowered = transcript.to_lowercase();
        let matched: Vec<String> = self
            .keywords
            .iter()
            .filter(|keyword| lowered.contains(keyword.as_str()))
            .cloned()
            .collect();

        if matched.is_empty() {
            return negative;
        }

        // One phrase match is strong signal; each extra raises confidence
        let confidence = (0.75 + 0.1 * (matched.len() as f32 - 1.0)).min(0.98);

        VoicemailVerdict {
            is_voicemail: confidence >= self.confidence_threshold,
            confidence,
            matched,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detector(enabled: bool) -> VoicemailDetector {
        VoicemailDetector::new(&VoicemailConfig {
            enabled,
            ..Default::default()
        })
    }

    #[test]
    fn test_greeting_detected() {
        let d = detector(true);
        let start = Instant::now();
        let verdict = d.check(
            "please leave a message after the beep",
            start,
            start + Duration::from_millis(3500),
        );
        assert!(verdict.is_voicemail);
        assert!(verdict.confidence >= 0.7);
        assert_eq!(verdict.matched.len(), 2);
    }

    #[test]
    fn test_live_speech_not_detected() {
        let d = detector(true);
        let start = Instant::now();
        let verdict = d.check("hello who is this", start, start + Duration::from_secs(1));
        assert!(!verdict.is_voicemail);
        assert!(verdict.matched.is_empty());
    }

    #[test]
    fn test_outside_window_ignored() {
        let d = detector(true);
        let start = Instant::now();
        let verdict = d.check(
            "leave a message after the tone",
            start,
            start + Duration::from_secs(30),
        );
        assert!(!verdict.is_voicemail);
    }

    #[test]
    fn test_disabled_never_detects() {
        let d = detector(false);
        let start = Instant::now();
        let verdict = d.check("voicemail after the beep", start, start);
        assert!(!verdict.is_voicemail);
    }

    #[test]
    fn test_single_weak_match_below_custom_threshold() {
        let d = VoicemailDetector::new(&VoicemailConfig {
            enabled: true,
            confidence_threshold: 0.9,
            ..Default::default()
        });
        let start = Instant::now();
        let verdict = d.check("mailbox", start, start + Duration::from_secs(2));
        // Matched but under the raised threshold
        assert!(!verdict.is_voicemail);
        assert!(!verdict.matched.is_empty());
    }
}
