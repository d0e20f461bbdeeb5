//! # Council Configuration
//!
//! Which models sit on the council, which model writes conversation titles,
//! and how long any single provider call may take.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default council members (OpenRouter model identifiers)
pub const DEFAULT_COUNCIL: &[&str] = &[
    "openai/gpt-5.1",
    "google/gemini-3-pro-preview",
    "anthropic/claude-sonnet-4.5",
    "x-ai/grok-4",
];

/// Default model for one-shot conversation title generation
pub const DEFAULT_TITLE_MODEL: &str = "google/gemini-2.5-flash";

/// Default per-call timeout in seconds
pub const DEFAULT_TIMEOUT_SECS: u64 = 120;

/// Configuration for a council run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CouncilConfig {
    /// Ordered set of council model identifiers
    pub council: Vec<String>,
    /// Model used for title generation (cheap, fast)
    pub title_model: String,
    /// Per-provider-call timeout in seconds
    pub timeout_secs: u64,
}

impl Default for CouncilConfig {
    fn default() -> Self {
        Self {
            council: DEFAULT_COUNCIL.iter().map(|m| m.to_string()).collect(),
            title_model: DEFAULT_TITLE_MODEL.to_string(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

impl CouncilConfig {
    /// Build config from environment, falling back to defaults.
    ///
    /// - `QUORUM_COUNCIL` - comma-separated model ids
    /// - `QUORUM_TITLE_MODEL` - title model id
    /// - `QUORUM_TIMEOUT_SECS` - per-call timeout
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(raw) = std::env::var("QUORUM_COUNCIL") {
            let members: Vec<String> = raw
                .split(',')
                .map(|m| m.trim().to_string())
                .filter(|m| !m.is_empty())
                .collect();
            if !members.is_empty() {
                config.council = members;
            }
        }
        if let Ok(model) = std::env::var("QUORUM_TITLE_MODEL") {
            if !model.trim().is_empty() {
                config.title_model = model.trim().to_string();
            }
        }
        if let Ok(secs) = std::env::var("QUORUM_TIMEOUT_SECS") {
            if let Ok(secs) = secs.parse() {
                config.timeout_secs = secs;
            }
        }

        config
    }

    /// Per-call timeout as a `Duration`
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_has_council() {
        let config = CouncilConfig::default();
        assert_eq!(config.council.len(), 4);
        assert_eq!(config.timeout_secs, DEFAULT_TIMEOUT_SECS);
    }
}
