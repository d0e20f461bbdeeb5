//! # Quorum Core
//!
//! The deliberation engine behind Quorum: a user query is answered by a
//! council of independent text-generation models that critique each other's
//! answers anonymously before one of them writes the final verdict.
//!
//! ## Architecture
//!
//! - `gateway/` - uniform chat interface to external providers (OpenRouter)
//! - `council/` - the three-stage pipeline, rank aggregation, and events
//! - `store/` - SQLite persistence for conversations and stage payloads
//! - `models` - council configuration
//!
//! ## Usage
//!
//! ```rust,ignore
//! use quorum_core::council::TurnRunner;
//! use quorum_core::models::CouncilConfig;
//!
//! let runner = TurnRunner::new(config, gateway, db).with_event_channel(tx);
//! runner.run_turn(&conversation_id, "What is a B-tree?").await?;
//! ```

pub mod council;
pub mod gateway;
pub mod models;
pub mod store;
