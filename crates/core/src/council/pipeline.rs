//! # Turn Pipeline
//!
//! Orchestrates one council turn: stage-1 fan-out, stage-2 anonymized peer
//! review, stage-3 chairman synthesis. Stages run strictly in order; calls
//! within a stage run concurrently and the stage waits for all of them to
//! settle. Each stage is persisted before the next begins, so a crash
//! after stage N leaves stage N recoverable and stage N+1 simply not yet
//! attempted.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::{JoinHandle, JoinSet};

use crate::gateway::{ChatProvider, ProviderError};
use crate::models::CouncilConfig;
use crate::store::{Message, MessageRole, QuorumDb};

use super::events::{TurnEvent, TurnEventKind};
use super::prompts::{self, HistoryTurn};
use super::ranking::{self, LabelMap};
use super::types::{RankingMetadata, ReviewerRanking, StageAnswer};

/// Fatal turn-level errors. Per-provider faults in stages 1-2 are absorbed
/// at the stage boundary and never surface here.
#[derive(Debug, Error)]
pub enum TurnError {
    /// Every council member failed stage 1; stages 2-3 do not run.
    #[error("no council providers succeeded")]
    NoProvidersSucceeded,

    /// The conversation does not exist.
    #[error("conversation {0} not found")]
    ConversationNotFound(String),

    /// Chairman synthesis failed; no fallback chairman is attempted.
    #[error("chairman synthesis failed: {0}")]
    Synthesis(#[source] ProviderError),

    /// A stage result could not be made durable.
    #[error("persistence failed: {0}")]
    Persistence(#[source] anyhow::Error),

    /// A pipeline run is already in flight for this conversation.
    #[error("a turn is already in flight for conversation {0}")]
    TurnInFlight(String),
}

/// Per-conversation exclusion: at most one pipeline run in flight per
/// conversation, so interleaved turns cannot corrupt message ordering.
#[derive(Debug, Clone, Default)]
pub struct TurnRegistry {
    active: Arc<Mutex<HashSet<String>>>,
}

impl TurnRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim a conversation for a turn. The claim is released when the
    /// returned guard drops.
    pub fn begin(&self, conversation_id: &str) -> Result<TurnGuard, TurnError> {
        let mut active = self
            .active
            .lock()
            .map_err(|e| TurnError::Persistence(anyhow::anyhow!("registry lock poisoned: {e}")))?;
        if !active.insert(conversation_id.to_string()) {
            return Err(TurnError::TurnInFlight(conversation_id.to_string()));
        }
        Ok(TurnGuard {
            active: Arc::clone(&self.active),
            conversation_id: conversation_id.to_string(),
        })
    }
}

/// RAII claim on a conversation held for the duration of a turn
pub struct TurnGuard {
    active: Arc<Mutex<HashSet<String>>>,
    conversation_id: String,
}

impl Drop for TurnGuard {
    fn drop(&mut self) {
        if let Ok(mut active) = self.active.lock() {
            active.remove(&self.conversation_id);
        }
    }
}

/// Runs one council turn end to end.
pub struct TurnRunner {
    config: CouncilConfig,
    gateway: Arc<dyn ChatProvider>,
    db: Arc<QuorumDb>,
    event_tx: Option<mpsc::Sender<TurnEvent>>,
}

impl TurnRunner {
    pub fn new(config: CouncilConfig, gateway: Arc<dyn ChatProvider>, db: Arc<QuorumDb>) -> Self {
        Self {
            config,
            gateway,
            db,
            event_tx: None,
        }
    }

    /// Attach the subscriber channel for this turn's event stream
    pub fn with_event_channel(mut self, tx: mpsc::Sender<TurnEvent>) -> Self {
        self.event_tx = Some(tx);
        self
    }

    /// Emit an event. A closed channel means the subscriber disconnected;
    /// the run continues and keeps persisting regardless.
    async fn emit(&self, conversation_id: &str, message_id: &str, kind: TurnEventKind) {
        if let Some(tx) = &self.event_tx {
            let _ = tx
                .send(TurnEvent::new(conversation_id, message_id, kind))
                .await;
        }
    }

    /// Run the full three-stage pipeline for one user message.
    ///
    /// On a fatal error a single terminal `error` event is emitted and the
    /// error is returned; no further events follow.
    pub async fn run_turn(&self, conversation_id: &str, content: &str) -> Result<(), TurnError> {
        match self.execute(conversation_id, content).await {
            Ok(()) => Ok(()),
            Err((message_id, err)) => {
                tracing::warn!(conversation_id, error = %err, "turn aborted");
                self.emit(
                    conversation_id,
                    &message_id,
                    TurnEventKind::Error {
                        message: err.to_string(),
                    },
                )
                .await;
                Err(err)
            }
        }
    }

    async fn execute(
        &self,
        conversation_id: &str,
        content: &str,
    ) -> Result<(), (String, TurnError)> {
        let setup = |e: TurnError| (String::new(), e);

        let conversation = self
            .db
            .get_conversation(conversation_id)
            .map_err(|e| setup(TurnError::Persistence(e)))?
            .ok_or_else(|| setup(TurnError::ConversationNotFound(conversation_id.to_string())))?;

        let is_first_message = conversation.messages.is_empty();
        let history = build_history(&conversation.messages);

        self.db
            .add_user_message(conversation_id, content)
            .map_err(|e| setup(TurnError::Persistence(e)))?;

        // Title generation runs alongside the pipeline; awaited after stage 3.
        let title_task: Option<JoinHandle<String>> = is_first_message.then(|| {
            tokio::spawn(generate_title(
                Arc::clone(&self.gateway),
                self.config.title_model.clone(),
                content.to_string(),
            ))
        });

        let message_id = self
            .db
            .add_assistant_message(conversation_id)
            .map_err(|e| setup(TurnError::Persistence(e)))?;
        let fail = |e: TurnError| (message_id.clone(), e);

        // === Stage 1: independent answers ===

        self.emit(conversation_id, &message_id, TurnEventKind::Stage1Start)
            .await;

        let stage1 = self.run_stage1(content, &history).await;
        if stage1.is_empty() {
            return Err(fail(TurnError::NoProvidersSucceeded));
        }
        tracing::info!(
            conversation_id,
            successes = stage1.len(),
            council = self.config.council.len(),
            "stage 1 settled"
        );

        self.db
            .set_stage1(conversation_id, &message_id, &stage1)
            .map_err(|e| fail(TurnError::Persistence(e)))?;
        self.emit(
            conversation_id,
            &message_id,
            TurnEventKind::Stage1Complete {
                data: stage1.clone(),
            },
        )
        .await;

        let labels = LabelMap::assign(&stage1);

        // === Stage 2: anonymized peer review ===

        let reviews: Vec<ReviewerRanking>;
        let chairman: String;

        if stage1.len() > 1 {
            self.emit(conversation_id, &message_id, TurnEventKind::Stage2Start)
                .await;

            reviews = self.run_stage2(content, &stage1, &labels, &history).await;
            let metadata = RankingMetadata {
                label_to_model: labels.to_map(),
                aggregate_rankings: ranking::aggregate(&reviews, &labels),
            };
            chairman = metadata.aggregate_rankings[0].model.clone();

            self.db
                .set_stage2(conversation_id, &message_id, &reviews)
                .map_err(|e| fail(TurnError::Persistence(e)))?;
            self.db
                .set_metadata(conversation_id, &message_id, &metadata)
                .map_err(|e| fail(TurnError::Persistence(e)))?;
            self.emit(
                conversation_id,
                &message_id,
                TurnEventKind::Stage2Complete {
                    data: reviews.clone(),
                    metadata,
                },
            )
            .await;
        } else {
            // A lone survivor has no peer pool to rank: it chairs directly.
            // The label map is still persisted for audit.
            tracing::info!(conversation_id, "single stage 1 success, skipping stage 2");
            reviews = Vec::new();
            chairman = stage1[0].model.clone();
            let metadata = RankingMetadata {
                label_to_model: labels.to_map(),
                aggregate_rankings: ranking::aggregate(&[], &labels),
            };
            self.db
                .set_metadata(conversation_id, &message_id, &metadata)
                .map_err(|e| fail(TurnError::Persistence(e)))?;
        }

        // === Stage 3: chairman synthesis ===

        self.emit(conversation_id, &message_id, TurnEventKind::Stage3Start)
            .await;
        tracing::info!(conversation_id, %chairman, "stage 3 dispatched");

        let prompt = prompts::stage3(content, &stage1, &reviews, &labels, &history);
        let answer = self
            .gateway
            .chat(&chairman, &prompt)
            .await
            .map_err(|e| fail(TurnError::Synthesis(e)))?;
        let verdict = StageAnswer::new(chairman, answer);

        self.db
            .set_stage3(conversation_id, &message_id, &verdict)
            .map_err(|e| fail(TurnError::Persistence(e)))?;
        self.emit(
            conversation_id,
            &message_id,
            TurnEventKind::Stage3Complete {
                data: verdict.clone(),
            },
        )
        .await;

        // === Title (first message only) ===

        if let Some(task) = title_task {
            let title = match task.await {
                Ok(title) => title,
                Err(_) => fallback_title(content),
            };
            self.db
                .update_title(conversation_id, &title)
                .map_err(|e| fail(TurnError::Persistence(e)))?;
            self.emit(
                conversation_id,
                &message_id,
                TurnEventKind::TitleComplete { title },
            )
            .await;
        }

        self.emit(conversation_id, &message_id, TurnEventKind::Complete)
            .await;

        Ok(())
    }

    /// Fan the query out to every council member concurrently and wait for
    /// all calls to settle. Successes are collected in completion order;
    /// failures are logged and reduce the participant set for this turn.
    async fn run_stage1(&self, content: &str, history: &[HistoryTurn]) -> Vec<StageAnswer> {
        let prompt = prompts::stage1(content, history);
        let mut calls = JoinSet::new();

        for model in &self.config.council {
            let gateway = Arc::clone(&self.gateway);
            let model = model.clone();
            let prompt = prompt.clone();
            calls.spawn(async move {
                let result = gateway.chat(&model, &prompt).await;
                (model, result)
            });
        }

        let mut answers = Vec::new();
        while let Some(joined) = calls.join_next().await {
            match joined {
                Ok((model, Ok(answer))) => answers.push(StageAnswer::new(model, answer)),
                Ok((model, Err(e))) => {
                    tracing::warn!(%model, timeout = e.is_timeout(), error = %e, "dropped from stage 1")
                }
                Err(e) => tracing::warn!(error = %e, "stage 1 task failed"),
            }
        }
        answers
    }

    /// Each stage-1 survivor ranks the anonymized peer set, excluding its
    /// own answer (self-exclusion is by identity - the reviewer never sees
    /// the label mapping). Unparseable rankings are dropped per reviewer,
    /// never fatal to the turn.
    async fn run_stage2(
        &self,
        content: &str,
        stage1: &[StageAnswer],
        labels: &LabelMap,
        history: &[HistoryTurn],
    ) -> Vec<ReviewerRanking> {
        let mut calls = JoinSet::new();

        for reviewer in stage1 {
            let peers: Vec<(String, String)> = stage1
                .iter()
                .filter(|a| a.model != reviewer.model)
                .map(|a| {
                    (
                        labels.label_for(&a.model).unwrap_or("?").to_string(),
                        a.answer.clone(),
                    )
                })
                .collect();
            let prompt = prompts::stage2(content, &peers, history);
            let gateway = Arc::clone(&self.gateway);
            let model = reviewer.model.clone();
            calls.spawn(async move {
                let result = gateway.chat(&model, &prompt).await;
                (model, result)
            });
        }

        let mut reviews = Vec::new();
        while let Some(joined) = calls.join_next().await {
            match joined {
                Ok((model, Ok(raw))) => {
                    let own_label = labels.label_for(&model);
                    match ranking::parse_ranking(&raw, labels, own_label) {
                        Some(ranking) => reviews.push(ReviewerRanking {
                            reviewer: model,
                            ranking,
                        }),
                        None => {
                            tracing::warn!(%model, "unparseable ranking, reviewer excluded from aggregation")
                        }
                    }
                }
                Ok((model, Err(e))) => {
                    tracing::warn!(%model, error = %e, "dropped from stage 2")
                }
                Err(e) => tracing::warn!(error = %e, "stage 2 task failed"),
            }
        }
        reviews
    }
}

/// Generate a conversation title, falling back to the truncated query on
/// any failure. Never fatal.
async fn generate_title(gateway: Arc<dyn ChatProvider>, model: String, query: String) -> String {
    match gateway.chat(&model, &prompts::title(&query)).await {
        Ok(raw) => {
            let title = raw.trim().trim_matches('"').trim().to_string();
            if title.is_empty() {
                fallback_title(&query)
            } else {
                title
            }
        }
        Err(e) => {
            tracing::warn!(%model, error = %e, "title generation failed");
            fallback_title(&query)
        }
    }
}

fn fallback_title(query: &str) -> String {
    let truncated: String = query.chars().take(60).collect();
    if truncated.len() < query.len() {
        format!("{truncated}...")
    } else {
        truncated
    }
}

/// Extract previous (question, verdict) pairs from stored messages for
/// follow-up context. Pairs are a user message immediately followed by an
/// assistant message whose stage-3 verdict exists.
pub fn build_history(messages: &[Message]) -> Vec<HistoryTurn> {
    let mut history = Vec::new();
    let mut i = 0;
    while i + 1 < messages.len() {
        let msg = &messages[i];
        if msg.role == MessageRole::User {
            let next = &messages[i + 1];
            if next.role == MessageRole::Assistant {
                if let Some(verdict) = &next.stage3 {
                    history.push(HistoryTurn {
                        question: msg.content.clone().unwrap_or_default(),
                        verdict: verdict.answer.clone(),
                    });
                    i += 2;
                    continue;
                }
            }
        }
        i += 1;
    }
    history
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::fs;
    use std::time::Duration;

    use crate::gateway::ChatMessage;

    /// Scripted provider: per-model stage-1 behavior and stage-2 ranking
    /// text, keyed off prompt markers so one instance serves every stage.
    struct MockCouncil {
        /// Models that fail stage 1 (simulated timeout)
        fail_stage1: HashSet<String>,
        /// Raw ranking text returned in stage 2, per model
        rankings: HashMap<String, String>,
        /// Per-model artificial latency to fix collection order
        delays: HashMap<String, Duration>,
    }

    impl MockCouncil {
        fn new() -> Self {
            Self {
                fail_stage1: HashSet::new(),
                rankings: HashMap::new(),
                delays: HashMap::new(),
            }
        }

        fn failing(mut self, model: &str) -> Self {
            self.fail_stage1.insert(model.to_string());
            self
        }

        fn ranking(mut self, model: &str, text: &str) -> Self {
            self.rankings.insert(model.to_string(), text.to_string());
            self
        }

        fn delay(mut self, model: &str, ms: u64) -> Self {
            self.delays
                .insert(model.to_string(), Duration::from_millis(ms));
            self
        }
    }

    #[async_trait]
    impl ChatProvider for MockCouncil {
        async fn chat(
            &self,
            model: &str,
            messages: &[ChatMessage],
        ) -> Result<String, ProviderError> {
            if let Some(delay) = self.delays.get(model) {
                tokio::time::sleep(*delay).await;
            }
            let prompt = &messages.last().expect("non-empty prompt").content;

            if prompt.contains("Generate a concise title") {
                return Ok("Mock Title".to_string());
            }
            if prompt.contains("chairman of a council") {
                return Ok(format!("final verdict from {model}"));
            }
            if prompt.contains("FINAL RANKING") {
                return Ok(self
                    .rankings
                    .get(model)
                    .cloned()
                    .unwrap_or_else(|| "no ranking today".to_string()));
            }
            // stage 1
            if self.fail_stage1.contains(model) {
                return Err(ProviderError::Timeout(Duration::from_millis(1)));
            }
            Ok(format!("answer from {model}"))
        }
    }

    fn config(models: &[&str]) -> CouncilConfig {
        CouncilConfig {
            council: models.iter().map(|m| m.to_string()).collect(),
            title_model: "title-model".to_string(),
            timeout_secs: 5,
        }
    }

    fn open_db(name: &str) -> (Arc<QuorumDb>, String) {
        let path = format!(".quorum/test_pipeline_{name}.db");
        let _ = fs::remove_file(&path);
        (Arc::new(QuorumDb::open_at(&path).unwrap()), path)
    }

    async fn run(
        config: CouncilConfig,
        mock: MockCouncil,
        db: Arc<QuorumDb>,
        conversation_id: &str,
        content: &str,
    ) -> (Result<(), TurnError>, Vec<TurnEvent>) {
        let (tx, mut rx) = mpsc::channel(256);
        let runner = TurnRunner::new(config, Arc::new(mock), db).with_event_channel(tx);
        let result = runner.run_turn(conversation_id, content).await;
        drop(runner);

        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        (result, events)
    }

    fn event_types(events: &[TurnEvent]) -> Vec<String> {
        events
            .iter()
            .map(|e| {
                serde_json::to_value(e).unwrap()["type"]
                    .as_str()
                    .unwrap()
                    .to_string()
            })
            .collect()
    }

    #[tokio::test]
    async fn test_full_turn_happy_path() {
        let (db, path) = open_db("happy");
        let conversation = db.create_conversation().unwrap();

        // Fix collection order: a first, b second, c third
        let mock = MockCouncil::new()
            .delay("a", 5)
            .delay("b", 20)
            .delay("c", 35)
            .ranking("a", "FINAL RANKING:\n1. Response B\n2. Response C")
            .ranking("b", "FINAL RANKING:\n1. Response C\n2. Response A")
            .ranking("c", "FINAL RANKING:\n1. Response B\n2. Response A");

        let (result, events) = run(
            config(&["a", "b", "c"]),
            mock,
            Arc::clone(&db),
            &conversation.id,
            "what is a skip list?",
        )
        .await;

        assert!(result.is_ok());
        assert_eq!(
            event_types(&events),
            vec![
                "stage1_start",
                "stage1_complete",
                "stage2_start",
                "stage2_complete",
                "stage3_start",
                "stage3_complete",
                "title_complete",
                "complete",
            ]
        );
        assert!(events.iter().all(|e| e.conversation_id == conversation.id));

        // B (= model b) got 2 + 2 = 4 points, wins the chair
        let loaded = db.get_conversation(&conversation.id).unwrap().unwrap();
        let assistant = &loaded.messages[1];
        assert_eq!(assistant.stage1.as_ref().unwrap().len(), 3);
        assert_eq!(assistant.stage2.as_ref().unwrap().len(), 3);
        let verdict = assistant.stage3.as_ref().unwrap();
        assert_eq!(verdict.model, "b");
        assert_eq!(verdict.answer, "final verdict from b");
        assert_eq!(loaded.title, "Mock Title");

        let metadata = assistant.metadata.as_ref().unwrap();
        assert_eq!(metadata.label_to_model.len(), 3);
        assert_eq!(metadata.aggregate_rankings[0].model, "b");

        let _ = fs::remove_file(path);
    }

    #[tokio::test]
    async fn test_timed_out_provider_is_excluded() {
        let (db, path) = open_db("partial");
        let conversation = db.create_conversation().unwrap();

        let mock = MockCouncil::new()
            .delay("a", 5)
            .delay("b", 20)
            .failing("c")
            .ranking("a", "FINAL RANKING:\n1. Response B")
            .ranking("b", "FINAL RANKING:\n1. Response A");

        let (result, events) = run(
            config(&["a", "b", "c"]),
            mock,
            Arc::clone(&db),
            &conversation.id,
            "q",
        )
        .await;
        assert!(result.is_ok());

        let stage1_complete = events
            .iter()
            .find_map(|e| match &e.kind {
                TurnEventKind::Stage1Complete { data } => Some(data.clone()),
                _ => None,
            })
            .unwrap();
        assert_eq!(stage1_complete.len(), 2);
        assert!(stage1_complete.iter().all(|a| a.model != "c"));

        let metadata = events
            .iter()
            .find_map(|e| match &e.kind {
                TurnEventKind::Stage2Complete { metadata, .. } => Some(metadata.clone()),
                _ => None,
            })
            .unwrap();
        assert_eq!(metadata.label_to_model.len(), 2);

        let loaded = db.get_conversation(&conversation.id).unwrap().unwrap();
        let verdict_model = &loaded.messages[1].stage3.as_ref().unwrap().model;
        assert!(verdict_model == "a" || verdict_model == "b");

        let _ = fs::remove_file(path);
    }

    #[tokio::test]
    async fn test_all_providers_failing_aborts_with_single_error() {
        let (db, path) = open_db("all_fail");
        let conversation = db.create_conversation().unwrap();

        let mock = MockCouncil::new().failing("a").failing("b");
        let (result, events) = run(
            config(&["a", "b"]),
            mock,
            Arc::clone(&db),
            &conversation.id,
            "q",
        )
        .await;

        assert!(matches!(result, Err(TurnError::NoProvidersSucceeded)));
        assert_eq!(event_types(&events), vec!["stage1_start", "error"]);

        // No stage payloads were persisted
        let loaded = db.get_conversation(&conversation.id).unwrap().unwrap();
        let assistant = &loaded.messages[1];
        assert!(assistant.stage1.is_none());
        assert!(assistant.stage2.is_none());
        assert!(assistant.stage3.is_none());

        let _ = fs::remove_file(path);
    }

    #[tokio::test]
    async fn test_single_success_skips_stage2_and_chairs_directly() {
        let (db, path) = open_db("single");
        let conversation = db.create_conversation().unwrap();

        let mock = MockCouncil::new().failing("a").failing("c");
        let (result, events) = run(
            config(&["a", "b", "c"]),
            mock,
            Arc::clone(&db),
            &conversation.id,
            "q",
        )
        .await;
        assert!(result.is_ok());

        let types = event_types(&events);
        assert!(!types.iter().any(|t| t.starts_with("stage2")));
        assert!(types.contains(&"stage3_complete".to_string()));

        let loaded = db.get_conversation(&conversation.id).unwrap().unwrap();
        let assistant = &loaded.messages[1];
        assert!(assistant.stage2.is_none());
        assert_eq!(assistant.stage3.as_ref().unwrap().model, "b");
        assert_eq!(assistant.metadata.as_ref().unwrap().label_to_model.len(), 1);

        let _ = fs::remove_file(path);
    }

    #[tokio::test]
    async fn test_unparseable_rankings_fall_back_to_collection_order() {
        let (db, path) = open_db("fallback");
        let conversation = db.create_conversation().unwrap();

        // Rankings default to garbage; collection order is a then b
        let mock = MockCouncil::new().delay("a", 5).delay("b", 25);
        let (result, events) = run(
            config(&["a", "b"]),
            mock,
            Arc::clone(&db),
            &conversation.id,
            "q",
        )
        .await;
        assert!(result.is_ok());

        let (data, metadata) = events
            .iter()
            .find_map(|e| match &e.kind {
                TurnEventKind::Stage2Complete { data, metadata } => {
                    Some((data.clone(), metadata.clone()))
                }
                _ => None,
            })
            .unwrap();
        assert!(data.is_empty());
        assert!(metadata.aggregate_rankings.iter().all(|s| s.score == 0));

        // First-collected model chairs
        let loaded = db.get_conversation(&conversation.id).unwrap().unwrap();
        assert_eq!(loaded.messages[1].stage3.as_ref().unwrap().model, "a");

        let _ = fs::remove_file(path);
    }

    #[tokio::test]
    async fn test_history_threaded_from_previous_turns() {
        let (db, path) = open_db("history");
        let conversation = db.create_conversation().unwrap();

        let mock = MockCouncil::new()
            .ranking("a", "FINAL RANKING:\n1. Response B")
            .ranking("b", "FINAL RANKING:\n1. Response A");
        let (first, _) = run(
            config(&["a", "b"]),
            mock,
            Arc::clone(&db),
            &conversation.id,
            "first question",
        )
        .await;
        assert!(first.is_ok());

        let loaded = db.get_conversation(&conversation.id).unwrap().unwrap();
        let history = build_history(&loaded.messages);
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].question, "first question");
        assert!(history[0].verdict.starts_with("final verdict from"));

        let _ = fs::remove_file(path);
    }

    #[tokio::test]
    async fn test_unknown_conversation_is_rejected() {
        let (db, path) = open_db("unknown");
        let mock = MockCouncil::new();
        let (result, events) = run(config(&["a"]), mock, Arc::clone(&db), "missing", "q").await;

        assert!(matches!(result, Err(TurnError::ConversationNotFound(_))));
        assert_eq!(event_types(&events), vec!["error"]);

        let _ = fs::remove_file(path);
    }

    #[test]
    fn test_turn_registry_enforces_exclusion() {
        let registry = TurnRegistry::new();

        let guard = registry.begin("c1").unwrap();
        assert!(matches!(
            registry.begin("c1"),
            Err(TurnError::TurnInFlight(_))
        ));
        // Other conversations are unaffected
        let _other = registry.begin("c2").unwrap();

        drop(guard);
        assert!(registry.begin("c1").is_ok());
    }

    #[test]
    fn test_fallback_title_truncates() {
        let long = "x".repeat(100);
        let title = fallback_title(&long);
        assert_eq!(title.chars().count(), 63);
        assert!(title.ends_with("..."));

        assert_eq!(fallback_title("short"), "short");
    }
}
