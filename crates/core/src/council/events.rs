//! # Turn Events
//!
//! Ordered lifecycle events streamed to the subscriber of an in-flight
//! turn. Emission order matches pipeline causal order; `complete` and
//! `error` are terminal.

use serde::{Deserialize, Serialize};

use super::types::{RankingMetadata, ReviewerRanking, StageAnswer};

/// Kind of turn event, tagged as `type` on the wire
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TurnEventKind {
    /// Stage 1 fan-out is about to dispatch
    Stage1Start,
    /// Stage 1 settled; `data` holds the successes in collection order
    Stage1Complete { data: Vec<StageAnswer> },
    /// Stage 2 peer review is about to dispatch
    Stage2Start,
    /// Stage 2 settled; `metadata` carries the label map and aggregate
    /// ranking for audit
    Stage2Complete {
        data: Vec<ReviewerRanking>,
        metadata: RankingMetadata,
    },
    /// Chairman synthesis is about to dispatch
    Stage3Start,
    /// Chairman produced the final verdict
    Stage3Complete { data: StageAnswer },
    /// Conversation title was generated
    TitleComplete { title: String },
    /// Terminal: the turn succeeded
    Complete,
    /// Terminal: the turn aborted
    Error { message: String },
}

/// An event in a council turn.
///
/// Every event names its conversation and message explicitly so any number
/// of independent subscribers can filter for themselves - there is no
/// implicit "currently viewed conversation" in the core.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurnEvent {
    pub conversation_id: String,
    pub message_id: String,
    #[serde(flatten)]
    pub kind: TurnEventKind,
}

impl TurnEvent {
    /// Create a new event for the given turn
    pub fn new(
        conversation_id: impl Into<String>,
        message_id: impl Into<String>,
        kind: TurnEventKind,
    ) -> Self {
        Self {
            conversation_id: conversation_id.into(),
            message_id: message_id.into(),
            kind,
        }
    }

    /// Whether this event ends the stream
    pub fn is_terminal(&self) -> bool {
        matches!(
            self.kind,
            TurnEventKind::Complete | TurnEventKind::Error { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_start_event_wire_format() {
        let event = TurnEvent::new("c1", "m1", TurnEventKind::Stage1Start);
        let json = serde_json::to_value(&event).unwrap();

        assert_eq!(json["type"], "stage1_start");
        assert_eq!(json["conversation_id"], "c1");
        assert_eq!(json["message_id"], "m1");
    }

    #[test]
    fn test_stage1_complete_carries_data() {
        let event = TurnEvent::new(
            "c1",
            "m1",
            TurnEventKind::Stage1Complete {
                data: vec![StageAnswer::new("openai/gpt-5.1", "42")],
            },
        );
        let json = serde_json::to_value(&event).unwrap();

        assert_eq!(json["type"], "stage1_complete");
        assert_eq!(json["data"][0]["model"], "openai/gpt-5.1");
        assert_eq!(json["data"][0]["answer"], "42");
    }

    #[test]
    fn test_error_event_is_terminal() {
        let event = TurnEvent::new(
            "c1",
            "m1",
            TurnEventKind::Error {
                message: "no council providers succeeded".into(),
            },
        );
        assert!(event.is_terminal());

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "error");
        assert_eq!(json["message"], "no council providers succeeded");
    }

    #[test]
    fn test_event_round_trips() {
        let event = TurnEvent::new(
            "c1",
            "m1",
            TurnEventKind::TitleComplete {
                title: "B-trees".into(),
            },
        );
        let json = serde_json::to_string(&event).unwrap();
        let back: TurnEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back, event);
    }
}
