//! # Conversation Store
//!
//! Durable record of conversations and messages, including partial
//! per-stage payloads written as each stage of a turn completes.

pub mod db;

pub use db::{Conversation, ConversationMeta, Message, MessageRole, QuorumDb};
