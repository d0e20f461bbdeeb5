//! Prompt assembly for each pipeline stage.
//!
//! Stage 2 prompts only ever see opaque labels - provider identity must
//! not leak to reviewers. Stage 3 is addressed to the revealed chairman
//! and gets the full non-anonymized record.

use std::fmt::Write;

use crate::gateway::ChatMessage;

use super::ranking::LabelMap;
use super::types::{ReviewerRanking, StageAnswer};

/// A previous (question, verdict) pair threaded into follow-up prompts
#[derive(Debug, Clone)]
pub struct HistoryTurn {
    pub question: String,
    pub verdict: String,
}

fn history_preamble(history: &[HistoryTurn]) -> String {
    if history.is_empty() {
        return String::new();
    }
    let mut out = String::from("Previous conversation:\n\n");
    for turn in history {
        let _ = writeln!(out, "Q: {}\nA: {}\n", turn.question, turn.verdict);
    }
    out.push_str("---\n\n");
    out
}

/// Stage 1: every council member answers the query independently.
pub fn stage1(query: &str, history: &[HistoryTurn]) -> Vec<ChatMessage> {
    vec![ChatMessage::user(format!(
        "{}{}",
        history_preamble(history),
        query
    ))]
}

/// Stage 2: one reviewer ranks the anonymized peer set (own answer excluded).
pub fn stage2(
    query: &str,
    peers: &[(String, String)],
    history: &[HistoryTurn],
) -> Vec<ChatMessage> {
    let mut body = history_preamble(history);
    let _ = writeln!(
        body,
        "You are reviewing anonymous answers to the question below. \
         Evaluate each for accuracy and insight, then rank them from best \
         to worst.\n\nQuestion: {query}\n"
    );
    for (label, answer) in peers {
        let _ = writeln!(body, "{label}:\n{answer}\n");
    }
    let _ = writeln!(
        body,
        "End your reply with a section in exactly this format:\n\n\
         FINAL RANKING:\n1. Response X\n2. Response Y\n\n\
         listing every response above, best first."
    );
    vec![ChatMessage::user(body)]
}

/// Stage 3: the chairman synthesizes the final verdict from the full record.
pub fn stage3(
    query: &str,
    answers: &[StageAnswer],
    reviews: &[ReviewerRanking],
    labels: &LabelMap,
    history: &[HistoryTurn],
) -> Vec<ChatMessage> {
    let mut body = history_preamble(history);
    let _ = writeln!(
        body,
        "You are the chairman of a council of AI models. The council \
         answered the user's question independently and then ranked each \
         other's answers. Synthesize the single best final answer.\n\n\
         Question: {query}\n\nCouncil answers:\n"
    );
    for answer in answers {
        let label = labels.label_for(&answer.model).unwrap_or("?");
        let _ = writeln!(body, "{} ({}):\n{}\n", label, answer.model, answer.answer);
    }
    if !reviews.is_empty() {
        body.push_str("Peer rankings (best first):\n");
        for review in reviews {
            let _ = writeln!(body, "{}: {}", review.reviewer, review.ranking.join(", "));
        }
        body.push('\n');
    }
    body.push_str("Write the final answer now. Do not mention the council or the ranking process.");
    vec![ChatMessage::user(body)]
}

/// One-shot title generation for a new conversation.
pub fn title(query: &str) -> Vec<ChatMessage> {
    vec![ChatMessage::user(format!(
        "Generate a concise title (at most 6 words) for a conversation \
         that starts with this message. Reply with the title only, no \
         quotes.\n\n{query}"
    ))]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::council::ranking::LabelMap;

    #[test]
    fn test_stage2_prompt_never_names_models() {
        let peers = vec![
            ("Response A".to_string(), "first answer".to_string()),
            ("Response B".to_string(), "second answer".to_string()),
        ];
        let messages = stage2("why is the sky blue?", &peers, &[]);
        let body = &messages[0].content;

        assert!(body.contains("Response A"));
        assert!(body.contains("FINAL RANKING"));
        assert!(!body.contains("openai"));
        assert!(!body.contains("anthropic"));
    }

    #[test]
    fn test_stage3_prompt_reveals_models() {
        let answers = vec![StageAnswer::new("m1", "a1"), StageAnswer::new("m2", "a2")];
        let labels = LabelMap::assign(&answers);
        let messages = stage3("q", &answers, &[], &labels, &[]);

        assert!(messages[0].content.contains("Response A (m1)"));
    }

    #[test]
    fn test_history_threads_into_prompt() {
        let history = vec![HistoryTurn {
            question: "what is a trie?".into(),
            verdict: "a prefix tree".into(),
        }];
        let messages = stage1("and a radix tree?", &history);

        assert!(messages[0].content.contains("what is a trie?"));
        assert!(messages[0].content.contains("and a radix tree?"));
    }
}
