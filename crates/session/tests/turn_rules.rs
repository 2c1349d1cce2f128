//! Turn-rule integration: end-call phrase matching and early-LLM reuse
//! decisions as the session applies them across a conversation.

use outdial_session::{matches_end_phrase, EarlyLlm, TurnPhase};

#[test]
fn conversation_reaches_end_phrase() {
    let phrases = vec!["goodbye".to_string(), "stop calling".to_string()];

    let turns = [
        ("hello who is this", false),
        ("tell me about the offer", false),
        ("the goodbyes were awkward", false), // substring, not whole word
        ("okay thanks goodbye", true),
    ];

    for (turn, expect) in turns {
        assert_eq!(matches_end_phrase(turn, &phrases), expect, "turn: {}", turn);
    }
}

#[test]
fn barge_in_drop_rule_phases() {
    // Finals are dropped exactly while a turn is processing
    assert!(!TurnPhase::Listening.is_processing());
    assert!(TurnPhase::Finalizing.is_processing());
    assert!(TurnPhase::Speaking.is_processing());
    // Cooldown drops via its own window, not the processing flag
    assert!(!TurnPhase::Cooldown.is_processing());
}

#[tokio::test]
async fn early_llm_reused_only_on_matching_final() {
    // Speculation launched at three words of partial transcript
    assert!(!EarlyLlm::should_launch("what are", false));
    assert!(EarlyLlm::should_launch("what are your", false));

    let early = EarlyLlm {
        partial: "what are your rates".to_string(),
        task: tokio::spawn(async { Some("Our rates start at nine percent.".to_string()) }),
    };

    // Final matches modulo case/whitespace: result is reusable
    assert!(!early.materially_differs("What are  your rates"));
    let reply = early.task.await.unwrap();
    assert_eq!(reply.as_deref(), Some("Our rates start at nine percent."));

    // A longer final is material: the speculation must be discarded
    let early = EarlyLlm {
        partial: "what are your rates".to_string(),
        task: tokio::spawn(async { Some("stale".to_string()) }),
    };
    assert!(early.materially_differs("what are your rates for business loans"));
    early.abort();
}
