//! Turn-loop state and early-LLM speculation

use tokio::task::JoinHandle;

/// Phase of the current turn
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnPhase {
    /// Frames flow to STT; transcripts accumulate
    Listening,
    /// End-of-speech fired; assembling the user turn
    Finalizing,
    /// LLM + TTS pipeline running
    Speaking,
    /// Echo suppression after the assistant finished
    Cooldown,
}

impl TurnPhase {
    /// While processing, newly arriving final transcripts are dropped
    pub fn is_processing(&self) -> bool {
        matches!(self, TurnPhase::Finalizing | TurnPhase::Speaking)
    }
}

/// Minimum partial length (words) before speculation launches
pub const EARLY_LLM_MIN_WORDS: usize = 3;

/// In-flight speculative generation launched on a partial transcript.
///
/// Once a partial has at least three words and no turn is in flight, the
/// LLM is launched with the partial text (no retrieval) to overlap
/// generation with the remainder of speech. At finalization the result is
/// reused when the final transcript matches the partial; otherwise the
/// task is aborted and the full pipeline runs.
pub struct EarlyLlm {
    /// Partial text the speculation was launched with
    pub partial: String,
    pub task: JoinHandle<Option<String>>,
}

impl EarlyLlm {
    /// Should speculation launch for this partial?
    pub fn should_launch(partial: &str, already_in_flight: bool) -> bool {
        !already_in_flight && partial.split_whitespace().count() >= EARLY_LLM_MIN_WORDS
    }

    /// Is the final transcript materially different from the speculated
    /// partial? Case and whitespace differences are immaterial.
    pub fn materially_differs(&self, final_text: &str) -> bool {
        normalize(&self.partial) != normalize(final_text)
    }

    pub fn abort(self) {
        self.task.abort();
    }
}

fn normalize(text: &str) -> String {
    text.to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_launch_gate() {
        assert!(!EarlyLlm::should_launch("hello there", false)); // 2 words
        assert!(EarlyLlm::should_launch("hello there friend", false));
        assert!(!EarlyLlm::should_launch("hello there friend", true)); // in flight
    }

    #[test]
    fn test_material_difference() {
        let early = EarlyLlm {
            partial: "What are your rates".to_string(),
            task: tokio::runtime::Runtime::new()
                .unwrap()
                .spawn(async { None }),
        };

        assert!(!early.materially_differs("what are  your rates"));
        assert!(!early.materially_differs("What Are Your Rates"));
        assert!(early.materially_differs("what are your rates for gold loans"));
        early.abort();
    }

    #[test]
    fn test_processing_phases() {
        assert!(!TurnPhase::Listening.is_processing());
        assert!(TurnPhase::Finalizing.is_processing());
        assert!(TurnPhase::Speaking.is_processing());
        assert!(!TurnPhase::Cooldown.is_processing());
    }
}
