//! Prompt assembly: system templates, excerpt formatting and history
//! injection.

use serde::Deserialize;

use crate::llm::types::ChatMessage;
use crate::rag::ScoredPassage;

/// Which system template frames the answer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PromptMode {
    /// Suggest remedies directly from the retrieved rubrics.
    #[default]
    Remedies,
    /// Ask the clarifying questions a repertorization would need first.
    Clarify,
}

const REMEDIES_SYSTEM: &str = "You are a homeopathy reference assistant for licensed doctors. \
Answer from the numbered repertory excerpts below. Name the remedies that fit the described \
symptom picture, point to the excerpt numbers you drew from, and do not give dosage advice. \
If the excerpts do not cover the question, say the reference has no matching rubric rather \
than guessing.";

const CLARIFY_SYSTEM: &str = "You are a homeopathy reference assistant for licensed doctors. \
Before naming any remedy, ask the clarifying questions a repertorization would need: \
modalities, time of day, side of the body, concomitants, mental state. Ask at most three \
short questions grounded in the numbered repertory excerpts below, then wait for the \
doctor's answers.";

const NO_EXCERPTS_NOTE: &str = "No matching excerpts were found in the reference text.";

/// Render retrieved passages as numbered excerpts with source labels,
/// stopping once the character budget is spent.
pub fn format_excerpts(excerpts: &[ScoredPassage], max_chars: usize) -> String {
    let mut context = String::new();
    let mut used = 0usize;

    for (i, scored) in excerpts.iter().enumerate() {
        let entry = format!(
            "[{}] ({}, relevance {:.2})\n{}\n\n",
            i + 1,
            scored.passage.source,
            scored.score,
            scored.passage.content
        );

        if used + entry.len() > max_chars && !context.is_empty() {
            break;
        }
        used += entry.len();
        context.push_str(&entry);
    }

    context.trim_end().to_string()
}

/// Compose the full message list: system template with excerpts, prior
/// turns, then the doctor's query.
pub fn build_messages(
    mode: PromptMode,
    context: &str,
    history: &[ChatMessage],
    query: &str,
) -> Vec<ChatMessage> {
    let template = match mode {
        PromptMode::Remedies => REMEDIES_SYSTEM,
        PromptMode::Clarify => CLARIFY_SYSTEM,
    };

    let excerpt_block = if context.is_empty() {
        NO_EXCERPTS_NOTE
    } else {
        context
    };

    let mut messages = Vec::with_capacity(history.len() + 2);
    messages.push(ChatMessage {
        role: "system".to_string(),
        content: format!("{}\n\nReference excerpts:\n{}", template, excerpt_block),
    });
    messages.extend(history.iter().cloned());
    messages.push(ChatMessage {
        role: "user".to_string(),
        content: query.to_string(),
    });

    messages
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rag::Passage;

    fn scored(seq: i64, content: &str, score: f32) -> ScoredPassage {
        ScoredPassage {
            passage: Passage {
                id: format!("p{}", seq),
                seq,
                content: content.to_string(),
                source: "kent_repertory".to_string(),
                start_offset: seq * 100,
            },
            score,
        }
    }

    #[test]
    fn mode_deserializes_from_lowercase_and_defaults_to_remedies() {
        let mode: PromptMode = serde_json::from_str("\"clarify\"").unwrap();
        assert_eq!(mode, PromptMode::Clarify);
        let mode: PromptMode = serde_json::from_str("\"remedies\"").unwrap();
        assert_eq!(mode, PromptMode::Remedies);
        assert_eq!(PromptMode::default(), PromptMode::Remedies);
        assert!(serde_json::from_str::<PromptMode>("\"direct\"").is_err());
    }

    #[test]
    fn excerpts_are_numbered_with_sources() {
        let excerpts = vec![
            scored(0, "MIND; FEAR; thunderstorm, of: Phos., Nat-c.", 0.91),
            scored(1, "MIND; WEEPING; consolation agg.: Nat-m.", 0.84),
        ];

        let context = format_excerpts(&excerpts, 4000);
        assert!(context.starts_with("[1] (kent_repertory, relevance 0.91)"));
        assert!(context.contains("\n[2] (kent_repertory, relevance 0.84)"));
        assert!(context.contains("thunderstorm"));
        assert!(context.contains("consolation"));
    }

    #[test]
    fn excerpt_budget_is_enforced_but_never_empty() {
        let excerpts = vec![
            scored(0, &"A".repeat(200), 0.9),
            scored(1, &"B".repeat(200), 0.8),
        ];

        // Budget fits the first entry only.
        let context = format_excerpts(&excerpts, 300);
        assert!(context.contains("[1]"));
        assert!(!context.contains("[2]"));

        // A budget smaller than any entry still keeps the best excerpt.
        let context = format_excerpts(&excerpts, 10);
        assert!(context.contains("[1]"));
    }

    #[test]
    fn messages_run_system_history_query() {
        let history = vec![
            ChatMessage {
                role: "user".to_string(),
                content: "child with earache".to_string(),
            },
            ChatMessage {
                role: "assistant".to_string(),
                content: "Is the child irritable or weepy?".to_string(),
            },
        ];

        let messages = build_messages(
            PromptMode::Remedies,
            "[1] (kent_repertory, relevance 0.90)\nEAR; PAIN; children: Cham., Puls.",
            &history,
            "irritable, wants to be carried",
        );

        assert_eq!(messages.len(), 4);
        assert_eq!(messages[0].role, "system");
        assert!(messages[0].content.contains("EAR; PAIN; children"));
        assert_eq!(messages[1].content, "child with earache");
        assert_eq!(messages[2].role, "assistant");
        assert_eq!(messages[3].role, "user");
        assert_eq!(messages[3].content, "irritable, wants to be carried");
    }

    #[test]
    fn templates_differ_by_mode() {
        let remedies = build_messages(PromptMode::Remedies, "", &[], "q");
        let clarify = build_messages(PromptMode::Clarify, "", &[], "q");

        assert!(remedies[0].content.contains("Name the remedies"));
        assert!(clarify[0].content.contains("clarifying questions"));
        assert_ne!(remedies[0].content, clarify[0].content);
        // Empty retrieval is stated, not hidden.
        assert!(remedies[0].content.contains(NO_EXCERPTS_NOTE));
    }
}
