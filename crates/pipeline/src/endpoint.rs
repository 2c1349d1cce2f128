//! End-of-speech endpointing
//!
//! Provider utterance-end events are unreliable for some models, so two
//! triggers are armed concurrently and whichever fires first finalizes
//! the turn:
//! - the provider's utterance-end event
//! - a debounce after the last final-transcript fragment (default 1000 ms)
//!
//! Two bounds cap both paths: a hard limit on continuous speech (default
//! 8000 ms) and, on the batch fallback, a short silence window (150 ms).

use std::time::{Duration, Instant};

/// Why a turn finalized
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndOfSpeech {
    UtteranceEndEvent,
    Debounce,
    MaxUtterance,
    SilenceWindow,
}

/// Per-turn end-of-speech state machine. Time is injected so the logic is
/// testable without sleeping.
#[derive(Debug)]
pub struct Endpointer {
    debounce: Duration,
    max_utterance: Duration,
    silence_window: Duration,
    /// First audio/transcript activity of the current utterance
    utterance_start: Option<Instant>,
    /// Last final-transcript fragment
    last_final: Option<Instant>,
    /// Last audio with speech energy (batch path)
    last_voiced: Option<Instant>,
    has_content: bool,
}

impl Endpointer {
    pub fn new(debounce: Duration, max_utterance: Duration, silence_window: Duration) -> Self {
        Self {
            debounce,
            max_utterance,
            silence_window,
            utterance_start: None,
            last_final: None,
            last_voiced: None,
            has_content: false,
        }
    }

    /// Speech activity observed (partial transcript or voiced audio)
    pub fn on_activity(&mut self, now: Instant) {
        self.utterance_start.get_or_insert(now);
        self.last_voiced = Some(now);
    }

    /// A final transcript fragment landed; arms the debounce
    pub fn on_final_fragment(&mut self, now: Instant) {
        self.utterance_start.get_or_insert(now);
        self.last_final = Some(now);
        self.has_content = true;
    }

    /// The provider signalled utterance end. Fires only when a final
    /// fragment was actually collected.
    pub fn on_utterance_end(&self) -> Option<EndOfSpeech> {
        self.has_content.then_some(EndOfSpeech::UtteranceEndEvent)
    }

    /// Timer poll: has one of the time-based triggers fired?
    pub fn poll(&self, now: Instant) -> Option<EndOfSpeech> {
        if let Some(start) = self.utterance_start {
            if now.duration_since(start) >= self.max_utterance && self.has_content {
                return Some(EndOfSpeech::MaxUtterance);
            }
        }
        if let Some(last_final) = self.last_final {
            if now.duration_since(last_final) >= self.debounce {
                return Some(EndOfSpeech::Debounce);
            }
        }
        None
    }

    /// Batch-path poll: silence window since last voiced audio
    pub fn poll_silence(&self, now: Instant) -> Option<EndOfSpeech> {
        let last = self.last_voiced?;
        (self.has_content && now.duration_since(last) >= self.silence_window)
            .then_some(EndOfSpeech::SilenceWindow)
    }

    /// Reset for the next turn
    pub fn reset(&mut self) {
        self.utterance_start = None;
        self.last_final = None;
        self.last_voiced = None;
        self.has_content = false;
    }
}

impl Default for Endpointer {
    fn default() -> Self {
        Self::new(
            Duration::from_millis(1000),
            Duration::from_millis(8000),
            Duration::from_millis(150),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(base: Instant, ms: u64) -> Instant {
        base + Duration::from_millis(ms)
    }

    #[test]
    fn test_debounce_fires_after_quiet_second() {
        let base = Instant::now();
        let mut ep = Endpointer::default();

        ep.on_final_fragment(at(base, 0));
        assert_eq!(ep.poll(at(base, 500)), None);
        assert_eq!(ep.poll(at(base, 1000)), Some(EndOfSpeech::Debounce));
    }

    #[test]
    fn test_new_fragment_re_arms_debounce() {
        let base = Instant::now();
        let mut ep = Endpointer::default();

        ep.on_final_fragment(at(base, 0));
        ep.on_final_fragment(at(base, 800));
        assert_eq!(ep.poll(at(base, 1500)), None);
        assert_eq!(ep.poll(at(base, 1800)), Some(EndOfSpeech::Debounce));
    }

    #[test]
    fn test_utterance_end_requires_content() {
        let base = Instant::now();
        let mut ep = Endpointer::default();

        assert_eq!(ep.on_utterance_end(), None);
        ep.on_final_fragment(base);
        assert_eq!(ep.on_utterance_end(), Some(EndOfSpeech::UtteranceEndEvent));
    }

    #[test]
    fn test_max_utterance_cap() {
        let base = Instant::now();
        let mut ep = Endpointer::default();

        ep.on_activity(at(base, 0));
        // Caller keeps talking: fragments every 700ms, debounce never fires
        for i in 1..=11 {
            ep.on_final_fragment(at(base, i * 700));
            if i * 700 < 8000 {
                assert_eq!(ep.poll(at(base, i * 700 + 100)), None, "at {}ms", i * 700);
            }
        }
        assert_eq!(ep.poll(at(base, 8000)), Some(EndOfSpeech::MaxUtterance));
    }

    #[test]
    fn test_silence_window_batch_path() {
        let base = Instant::now();
        let mut ep = Endpointer::default();

        ep.on_activity(at(base, 0));
        ep.on_final_fragment(at(base, 50));
        ep.on_activity(at(base, 100));
        assert_eq!(ep.poll_silence(at(base, 200)), None);
        assert_eq!(
            ep.poll_silence(at(base, 260)),
            Some(EndOfSpeech::SilenceWindow)
        );
    }

    #[test]
    fn test_reset_clears_state() {
        let base = Instant::now();
        let mut ep = Endpointer::default();

        ep.on_final_fragment(base);
        ep.reset();
        assert_eq!(ep.poll(at(base, 5000)), None);
        assert_eq!(ep.on_utterance_end(), None);
    }
}
