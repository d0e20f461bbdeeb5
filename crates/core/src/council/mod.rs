//! # Council Deliberation
//!
//! The three-stage pipeline: concurrent fan-out for independent answers,
//! anonymized peer ranking with aggregate scoring, and chairman synthesis.

pub mod events;
pub mod pipeline;
pub mod prompts;
pub mod ranking;
pub mod types;

pub use events::{TurnEvent, TurnEventKind};
pub use pipeline::{TurnError, TurnGuard, TurnRegistry, TurnRunner};
pub use ranking::LabelMap;
pub use types::{LabelScore, RankingMetadata, ReviewerRanking, StageAnswer};
