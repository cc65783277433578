use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap, HashSet};

use super::result::{Annotations, ScoreContribution, SearchResult, StageHit};
use super::signals;
use super::stage::{Stage, StageTable};
use crate::config::{EngineConfig, RankingWeights};
use crate::document::Schema;
use crate::index::DocId;
use crate::store::DocumentStore;

/// Brands that may appear before repeats are filtered out of a diversified list.
const DIVERSE_BRANDS: usize = 5;
const DIVERSE_CATEGORIES: usize = 3;

/// A document after stage outputs have been merged.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub doc_id: DocId,
    pub stage_score: f64,
    pub contributions: ScoreContribution,
    pub tags: BTreeSet<String>,
    pub annotations: Annotations,
}

fn by_score_desc(a: f64, b: f64) -> Ordering {
    b.partial_cmp(&a).unwrap_or(Ordering::Equal)
}

/// Weighted sum of stage scores per document. Stages are folded in their
/// declaration order and ties keep first-seen order, so the result is
/// independent of how the stages were scheduled.
pub fn combine(outputs: &StageTable<Option<Vec<StageHit>>>, weights: &StageTable<f64>, cap: usize) -> Vec<Candidate> {
    let mut slots: HashMap<DocId, usize> = HashMap::new();
    let mut merged: Vec<Candidate> = Vec::new();
    for stage in Stage::ALL {
        let Some(hits) = outputs.get(stage) else { continue };
        let weight = *weights.get(stage);
        for hit in hits {
            let slot = *slots.entry(hit.doc_id).or_insert_with(|| {
                merged.push(Candidate {
                    doc_id: hit.doc_id,
                    stage_score: 0.0,
                    contributions: ScoreContribution::default(),
                    tags: BTreeSet::new(),
                    annotations: Annotations::default(),
                });
                merged.len() - 1
            });
            let candidate = &mut merged[slot];
            candidate.stage_score += hit.score * weight;
            candidate.contributions.merge(&hit.contributions);
            candidate.tags.extend(hit.tags.iter().cloned());
            candidate.annotations.absorb(&hit.annotations);
        }
    }
    merged.sort_by(|a, b| by_score_desc(a.stage_score, b.stage_score));
    merged.truncate(cap);
    merged
}

/// Recomputes the presentation score (keyword relevance, content quality and
/// the static signals) and orders the final list by it.
pub fn present(candidates: Vec<Candidate>, store: &DocumentStore, config: &EngineConfig, query: &str) -> Vec<SearchResult> {
    let words = signals::query_words(query);
    let w: &RankingWeights = &config.ranking_weights;
    let schema = &config.schema;
    let mut results: Vec<SearchResult> = candidates
        .into_iter()
        .filter_map(|c| {
            let document = store.get(c.doc_id)?.clone();
            let statics = store.static_scores(c.doc_id);
            let score = signals::keyword_relevance(&words, &document, schema) * w.keyword
                + signals::content_quality(&document, schema) * w.content_quality
                + statics.ux * w.ux
                + statics.authority * w.authority
                + statics.freshness * w.freshness;
            Some(SearchResult {
                doc_id: c.doc_id,
                document,
                score,
                stage_score: c.stage_score,
                contributions: c.contributions,
                tags: c.tags,
                annotations: c.annotations,
            })
        })
        .collect();
    results.sort_by(|a, b| by_score_desc(a.score, b.score));
    results
}

/// Greedy short list that limits repeats of the same brand and category.
pub fn diversify(results: Vec<SearchResult>, schema: &Schema, max: usize) -> Vec<SearchResult> {
    let mut picked = Vec::new();
    let mut brands: HashSet<String> = HashSet::new();
    let mut categories: HashSet<String> = HashSet::new();
    for result in results {
        if picked.len() >= max {
            break;
        }
        let brand = result.document.field_or_empty(&schema.brand).to_lowercase();
        let category = result.document.field_or_empty(&schema.kind).to_lowercase();
        let brand_ok = brands.len() < DIVERSE_BRANDS || !brands.contains(&brand);
        let category_ok = categories.len() < DIVERSE_CATEGORIES || !categories.contains(&category);
        if brand_ok && category_ok {
            brands.insert(brand);
            categories.insert(category);
            picked.push(result);
        }
    }
    picked
}
