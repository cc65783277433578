use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use super::stage::{Stage, StageTable};
use crate::document::Document;
use crate::index::DocId;

/// Per-stage scores attached to a result. Values are only ever added: merging
/// two contributions keeps whichever value was recorded first for a stage.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ScoreContribution(StageTable<Option<f64>>);

impl ScoreContribution {
    pub fn single(stage: Stage, value: f64) -> Self {
        let mut c = Self::default();
        c.record(stage, value);
        c
    }

    /// Records `value` for `stage` unless a value is already present or `value` is not finite.
    pub fn record(&mut self, stage: Stage, value: f64) {
        let slot = self.0.get_mut(stage);
        if slot.is_none() && value.is_finite() {
            *slot = Some(value);
        }
    }

    pub fn merge(&mut self, other: &ScoreContribution) {
        for (stage, value) in other.0.iter() {
            if let Some(v) = value {
                self.record(stage, *v);
            }
        }
    }

    pub fn get(&self, stage: Stage) -> Option<f64> {
        *self.0.get(stage)
    }

    pub fn stages(&self) -> impl Iterator<Item = Stage> + '_ {
        self.0.iter().filter(|(_, v)| v.is_some()).map(|(s, _)| s)
    }

    pub fn is_empty(&self) -> bool {
        self.0.values().all(Option::is_none)
    }
}

impl Serialize for ScoreContribution {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let present: Vec<(Stage, f64)> = self.0.iter().filter_map(|(s, v)| v.map(|v| (s, v))).collect();
        let mut map = serializer.serialize_map(Some(present.len()))?;
        for (stage, value) in present {
            map.serialize_entry(stage.as_str(), &value)?;
        }
        map.end()
    }
}

/// Presentation data computed for a result. Kept apart from the [`Document`],
/// which stays untouched in the store.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct Annotations {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shard: Option<usize>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub highlights: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snippet: Option<String>,
}

impl Annotations {
    /// Fills whatever `self` lacks from `other`.
    pub fn absorb(&mut self, other: &Annotations) {
        if self.shard.is_none() {
            self.shard = other.shard;
        }
        if self.highlights.is_empty() {
            self.highlights = other.highlights.clone();
        }
        if self.snippet.is_none() {
            self.snippet = other.snippet.clone();
        }
    }
}

/// A candidate produced by one stage.
#[derive(Debug, Clone)]
pub struct StageHit {
    pub doc_id: DocId,
    pub score: f64,
    pub contributions: ScoreContribution,
    pub tags: BTreeSet<String>,
    pub annotations: Annotations,
}

impl StageHit {
    /// A hit with no score and no contributions yet.
    pub fn candidate(doc_id: DocId) -> Self {
        Self {
            doc_id,
            score: 0.0,
            contributions: ScoreContribution::default(),
            tags: BTreeSet::new(),
            annotations: Annotations::default(),
        }
    }

    /// Records the current score as `stage`'s contribution.
    pub fn record(&mut self, stage: Stage) {
        self.contributions.record(stage, self.score);
    }

    pub fn tag<S: Into<String>>(mut self, tag: S) -> Self {
        self.tags.insert(tag.into());
        self
    }
}

/// A ranked result handed back to callers.
///
/// `score` is the presentation blend that decides the final order;
/// `stage_score` is the weighted sum over stages that selected the candidate set.
#[derive(Debug, Clone, Serialize)]
pub struct SearchResult {
    #[serde(skip)]
    pub doc_id: DocId,
    pub document: Arc<Document>,
    pub score: f64,
    pub stage_score: f64,
    pub contributions: ScoreContribution,
    pub tags: BTreeSet<String>,
    pub annotations: Annotations,
}

impl SearchResult {
    pub fn id(&self) -> &str {
        &self.document.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_keeps_first_value_and_unions_keys() {
        let mut a = ScoreContribution::single(Stage::Retrieval, 2.0);
        let mut b = ScoreContribution::single(Stage::Retrieval, 9.0);
        b.record(Stage::Insight, 0.6);
        a.merge(&b);
        assert_eq!(a.get(Stage::Retrieval), Some(2.0));
        assert_eq!(a.get(Stage::Insight), Some(0.6));
        assert_eq!(a.stages().count(), 2);
    }

    #[test]
    fn non_finite_values_are_dropped() {
        let mut c = ScoreContribution::default();
        c.record(Stage::Ranking, f64::NAN);
        c.record(Stage::Distributed, f64::NEG_INFINITY);
        assert!(c.is_empty());
    }

    #[test]
    fn contributions_serialize_as_a_sparse_map() {
        let mut c = ScoreContribution::single(Stage::Approximate, 0.25);
        c.record(Stage::Retrieval, 1.0);
        let json = serde_json::to_value(&c).unwrap();
        assert_eq!(json, serde_json::json!({"retrieval": 1.0, "approximate": 0.25}));
    }
}
