//! # Anonymization and Rank Aggregation
//!
//! Assigns opaque labels to stage-1 answers, parses reviewer rankings out
//! of free-form model output, and combines them into one deterministic
//! aggregate ranking that selects the chairman.

use std::collections::BTreeMap;
use std::sync::OnceLock;

use regex::Regex;

use super::types::{LabelScore, ReviewerRanking, StageAnswer};

/// Bijection between opaque labels and the models whose stage-1 answer
/// survived. Labels are assigned in response-collection order, never from
/// provider identity, so nothing about a label leaks who wrote the answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelMap {
    entries: Vec<(String, String)>,
}

impl LabelMap {
    /// Assign labels (`Response A`, `Response B`, ...) to answers in the
    /// order they were collected.
    pub fn assign(answers: &[StageAnswer]) -> Self {
        let entries = answers
            .iter()
            .enumerate()
            .map(|(i, a)| (format!("Response {}", letters(i)), a.model.clone()))
            .collect();
        Self { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Labels in assignment order
    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(l, _)| l.as_str())
    }

    /// The label assigned to a model's answer
    pub fn label_for(&self, model: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(_, m)| m == model)
            .map(|(l, _)| l.as_str())
    }

    /// The model behind a label
    pub fn model_for(&self, label: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(l, _)| l == label)
            .map(|(_, m)| m.as_str())
    }

    /// Position at which a label was assigned (tie-break key)
    pub fn assignment_index(&self, label: &str) -> Option<usize> {
        self.entries.iter().position(|(l, _)| l == label)
    }

    /// label -> model mapping for audit metadata
    pub fn to_map(&self) -> BTreeMap<String, String> {
        self.entries.iter().cloned().collect()
    }
}

/// Spreadsheet-style letters: A..Z, AA, AB, ...
fn letters(mut index: usize) -> String {
    let mut out = Vec::new();
    loop {
        out.push(b'A' + (index % 26) as u8);
        if index < 26 {
            break;
        }
        index = index / 26 - 1;
    }
    out.reverse();
    String::from_utf8(out).unwrap_or_else(|_| "A".into())
}

fn label_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"Response [A-Z]+").expect("valid regex"))
}

/// Extract a reviewer's ranking from its raw output.
///
/// Prefers the section after a `FINAL RANKING` marker; otherwise scans the
/// whole text. Labels are taken in first-mention order, deduplicated,
/// restricted to labels that exist in `labels`, and stripped of
/// `own_label` should the reviewer have tried to rank itself.
///
/// Returns `None` when no known label can be extracted - the caller treats
/// that reviewer as an aggregation failure and drops it, nothing more.
pub fn parse_ranking(raw: &str, labels: &LabelMap, own_label: Option<&str>) -> Option<Vec<String>> {
    let section = raw
        .find("FINAL RANKING")
        .or_else(|| raw.find("Final Ranking"))
        .map(|pos| &raw[pos..])
        .unwrap_or(raw);

    let mut ranking: Vec<String> = Vec::new();
    for found in label_pattern().find_iter(section) {
        let label = found.as_str();
        if labels.assignment_index(label).is_none() {
            continue;
        }
        if own_label == Some(label) {
            continue;
        }
        if ranking.iter().any(|r| r == label) {
            continue;
        }
        ranking.push(label.to_string());
    }

    if ranking.is_empty() {
        None
    } else {
        Some(ranking)
    }
}

/// Combine per-reviewer rankings into one aggregate ranking.
///
/// Borda-style scoring: a ranking of k candidates awards `k - position`
/// points (top choice gets k, last gets 1); points are summed per label
/// across all valid rankings. The result is sorted by score descending
/// with ties broken by label assignment order, so the ordering is total
/// and identical inputs always produce an identical chairman.
///
/// With zero valid rankings every label scores 0 and the order falls back
/// to stage-1 collection order.
pub fn aggregate(rankings: &[ReviewerRanking], labels: &LabelMap) -> Vec<LabelScore> {
    let mut scores: BTreeMap<&str, u32> = labels.labels().map(|l| (l, 0)).collect();

    for ranking in rankings {
        let k = ranking.ranking.len() as u32;
        for (position, label) in ranking.ranking.iter().enumerate() {
            if let Some(score) = scores.get_mut(label.as_str()) {
                *score += k - position as u32;
            }
        }
    }

    let mut out: Vec<LabelScore> = labels
        .labels()
        .map(|label| LabelScore {
            label: label.to_string(),
            model: labels.model_for(label).unwrap_or_default().to_string(),
            score: scores.get(label).copied().unwrap_or(0),
        })
        .collect();

    // Stable sort keeps assignment order within equal scores.
    out.sort_by(|a, b| b.score.cmp(&a.score));
    out
}
