//! Payload types carried through the pipeline, events, and storage.
//!
//! These serialize identically on the event stream and in the database, so
//! a reloaded stage payload reconstructs the object its `*_complete` event
//! carried.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// One council member's answer (stage 1) or the chairman's verdict (stage 3)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageAnswer {
    /// Provider model identifier
    pub model: String,
    /// Answer text
    pub answer: String,
}

impl StageAnswer {
    pub fn new(model: impl Into<String>, answer: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            answer: answer.into(),
        }
    }
}

/// One reviewer's ordered ranking of anonymized peer answers (stage 2)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewerRanking {
    /// The model that produced this ranking
    pub reviewer: String,
    /// Labels in preference order, best first; never contains the
    /// reviewer's own label
    pub ranking: Vec<String>,
}

/// Aggregate score for a single label
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelScore {
    pub label: String,
    /// The model behind the label (revealed for audit)
    pub model: String,
    pub score: u32,
}

/// Audit metadata persisted alongside the final message.
///
/// `label_to_model` keys are labels of the form `Response A`, which sort
/// alphabetically in assignment order, so the BTreeMap preserves it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankingMetadata {
    pub label_to_model: BTreeMap<String, String>,
    /// Labels sorted by aggregate score, best first
    pub aggregate_rankings: Vec<LabelScore>,
}
