//! Retrieved-context formatting
//!
//! Chunks are tagged `[1][2]…`, capped to ~2000 characters, and followed by
//! an instruction to answer only from the provided material with citations.

use crate::retriever::RetrievedChunk;

/// Hard cap on formatted context length
const MAX_CONTEXT_CHARS: usize = 2000;

const CITE_INSTRUCTION: &str =
    "Answer only from the context above. Cite sources as [1], [2]. \
     If the context does not cover the question, say you will check and follow up.";

/// Format retrieved chunks into the system-prompt context block.
/// Returns `None` when nothing survived the score filter.
pub fn format_context(chunks: &[RetrievedChunk]) -> Option<String> {
    if chunks.is_empty() {
        return None;
    }

    let mut context = String::from("Context:\n");
    let mut included = 0usize;

    for (i, chunk) in chunks.iter().enumerate() {
        let tag = format!("[{}] ", i + 1);
        let entry_len = tag.len() + chunk.content.len() + 1;

        if context.len() + entry_len > MAX_CONTEXT_CHARS {
            // Take a truncated slice of the first chunk rather than none
            if included == 0 {
                let budget = MAX_CONTEXT_CHARS.saturating_sub(context.len() + tag.len() + 1);
                let truncated: String = chunk.content.chars().take(budget).collect();
                context.push_str(&tag);
                context.push_str(&truncated);
                context.push('\n');
                included += 1;
            }
            break;
        }

        context.push_str(&tag);
        context.push_str(&chunk.content);
        context.push('\n');
        included += 1;
    }

    if included == 0 {
        return None;
    }

    context.push('\n');
    context.push_str(CITE_INSTRUCTION);
    Some(context)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(content: &str, score: f32) -> RetrievedChunk {
        RetrievedChunk {
            content: content.to_string(),
            source: None,
            score,
        }
    }

    #[test]
    fn test_tags_and_instruction() {
        let chunks = vec![chunk("first fact", 0.9), chunk("second fact", 0.8)];
        let context = format_context(&chunks).unwrap();

        assert!(context.contains("[1] first fact"));
        assert!(context.contains("[2] second fact"));
        assert!(context.contains("Answer only from the context above"));
    }

    #[test]
    fn test_empty_yields_none() {
        assert!(format_context(&[]).is_none());
    }

    #[test]
    fn test_cap_respected() {
        let big = "x".repeat(1500);
        let chunks = vec![chunk(&big, 0.9), chunk(&big, 0.85), chunk(&big, 0.8)];
        let context = format_context(&chunks).unwrap();

        // Cap applies to the chunk block; the instruction rides on top
        assert!(context.len() <= MAX_CONTEXT_CHARS + CITE_INSTRUCTION.len() + 2);
        assert!(context.contains("[1]"));
        assert!(!context.contains("[3]"));
    }

    #[test]
    fn test_oversized_first_chunk_truncated() {
        let huge = "y".repeat(5000);
        let context = format_context(&[chunk(&huge, 0.95)]).unwrap();
        assert!(context.contains("[1]"));
        assert!(context.len() < 2200);
    }
}
