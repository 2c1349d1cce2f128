//! Prompt composition
//!
//! System prompt = global rules + agent persona + optional retrieved
//! context + active-language directive. Conversation history follows as
//! alternating user/assistant messages.

use serde::{Deserialize, Serialize};

/// Message role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// Chat message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Rules applied to every call regardless of persona
const GLOBAL_RULES: &str = "You are a voice agent on a live phone call. \
Keep responses short and conversational: one to three sentences. \
Never use markdown, bullet points or emoji. \
Spell out numbers the way they are spoken. \
If the caller asks to stop or be removed, acknowledge and end politely.";

/// Builder for the per-turn message list
#[derive(Debug, Clone, Default)]
pub struct PromptBuilder {
    persona: String,
    rag_context: Option<String>,
    language_directive: Option<String>,
    history: Vec<Message>,
}

impl PromptBuilder {
    pub fn new(persona: impl Into<String>) -> Self {
        Self {
            persona: persona.into(),
            ..Default::default()
        }
    }

    /// Attach formatted retrieved context for this turn
    pub fn with_rag_context(mut self, context: Option<String>) -> Self {
        self.rag_context = context;
        self
    }

    /// Direct the model to answer in the active language
    pub fn with_language(mut self, language_code: Option<&str>) -> Self {
        self.language_directive = language_code.map(|code| {
            format!(
                "Respond only in the language with code '{}'. The caller is speaking it.",
                code
            )
        });
        self
    }

    pub fn push_user(&mut self, text: impl Into<String>) {
        self.history.push(Message::user(text));
    }

    pub fn push_assistant(&mut self, text: impl Into<String>) {
        self.history.push(Message::assistant(text));
    }

    /// Assemble the full message list for one generation
    pub fn build(&self) -> Vec<Message> {
        let mut system = String::with_capacity(
            GLOBAL_RULES.len() + self.persona.len() + 256,
        );
        system.push_str(GLOBAL_RULES);

        if !self.persona.is_empty() {
            system.push_str("\n\n");
            system.push_str(&self.persona);
        }

        if let Some(ref context) = self.rag_context {
            system.push_str("\n\n");
            system.push_str(context);
        }

        if let Some(ref directive) = self.language_directive {
            system.push_str("\n\n");
            system.push_str(directive);
        }

        let mut messages = Vec::with_capacity(self.history.len() + 1);
        messages.push(Message::system(system));
        messages.extend(self.history.iter().cloned());
        messages
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_order() {
        let mut builder = PromptBuilder::new("You sell solar panels.")
            .with_rag_context(Some("Context:\n[1] panels cost $200".to_string()))
            .with_language(Some("hi"));
        builder.push_user("how much do panels cost?");

        let messages = builder.build();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, Role::System);

        let system = &messages[0].content;
        let persona_pos = system.find("solar panels").unwrap();
        let rag_pos = system.find("[1]").unwrap();
        let lang_pos = system.find("'hi'").unwrap();
        assert!(persona_pos < rag_pos);
        assert!(rag_pos < lang_pos);

        assert_eq!(messages[1].role, Role::User);
    }

    #[test]
    fn test_no_optional_sections() {
        let builder = PromptBuilder::new("persona");
        let messages = builder.build();
        assert_eq!(messages.len(), 1);
        assert!(!messages[0].content.contains("language with code"));
    }

    #[test]
    fn test_history_alternation_preserved() {
        let mut builder = PromptBuilder::new("p");
        builder.push_user("hi");
        builder.push_assistant("hello");
        builder.push_user("bye");

        let messages = builder.build();
        assert_eq!(messages[1].role, Role::User);
        assert_eq!(messages[2].role, Role::Assistant);
        assert_eq!(messages[3].role, Role::User);
    }
}
