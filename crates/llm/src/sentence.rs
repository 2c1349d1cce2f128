//! Sentence chunking of a streaming token feed
//!
//! The speaking path synthesizes sentence by sentence: the token stream is
//! split on sentence enders (`. ! ? \n`) once the accumulated piece is at
//! least 10 characters, so TTS of the first sentence overlaps generation
//! of the rest.

/// Minimum length before a sentence ender triggers a flush
const MIN_SENTENCE_CHARS: usize = 10;

/// Accumulates streamed deltas, emitting complete sentences
#[derive(Debug, Default)]
pub struct SentenceChunker {
    pending: String,
}

impl SentenceChunker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one delta; returns any sentences completed by it
    pub fn push(&mut self, delta: &str) -> Vec<String> {
        let mut sentences = Vec::new();

        for ch in delta.chars() {
            self.pending.push(ch);

            let is_ender = matches!(ch, '.' | '!' | '?' | '\n');
            if is_ender && self.pending.trim().len() >= MIN_SENTENCE_CHARS {
                let sentence = self.pending.trim().to_string();
                if !sentence.is_empty() {
                    sentences.push(sentence);
                }
                self.pending.clear();
            }
        }

        sentences
    }

    /// Flush whatever remains at end of generation
    pub fn finish(&mut self) -> Option<String> {
        let tail = self.pending.trim().to_string();
        self.pending.clear();
        if tail.is_empty() {
            None
        } else {
            Some(tail)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_splits_on_enders() {
        let mut chunker = SentenceChunker::new();
        let mut out = Vec::new();
        for delta in ["Hello there", ", how are you? I am", " doing well today."] {
            out.extend(chunker.push(delta));
        }
        assert_eq!(
            out,
            vec![
                "Hello there, how are you?".to_string(),
                "I am doing well today.".to_string()
            ]
        );
        assert!(chunker.finish().is_none());
    }

    #[test]
    fn test_short_fragment_not_flushed() {
        let mut chunker = SentenceChunker::new();
        // "Mr." ends with a period but is shorter than the minimum
        assert!(chunker.push("Mr. ").is_empty());
        let out = chunker.push("Smith will call back.");
        assert_eq!(out, vec!["Mr. Smith will call back.".to_string()]);
    }

    #[test]
    fn test_finish_flushes_tail() {
        let mut chunker = SentenceChunker::new();
        assert!(chunker.push("trailing words without ender").is_empty());
        assert_eq!(
            chunker.finish(),
            Some("trailing words without ender".to_string())
        );
        assert!(chunker.finish().is_none());
    }

    #[test]
    fn test_newline_is_ender() {
        let mut chunker = SentenceChunker::new();
        let out = chunker.push("First line of reply\nsecond");
        assert_eq!(out, vec!["First line of reply".to_string()]);
    }
}
