//! The six scoring stages and the runner that executes them.

use rayon::prelude::*;
use std::collections::{BTreeSet, HashMap};
use std::time::{Duration, Instant};

use super::query::{detect_intent, highlight, intent_boost, snippet, QueryProcessor};
use super::result::{Annotations, StageHit};
use super::signals;
use super::stage::{Stage, StageTable};
use crate::config::EngineConfig;
use crate::error::{Result, SearchError};
use crate::index::{DocId, InvertedIndex};
use crate::store::DocumentStore;
use crate::tokenizer::{count_occurrences, token_set, tokenize};

/// Read-only state every stage scores against.
#[derive(Clone, Copy)]
pub struct StageContext<'a> {
    pub store: &'a DocumentStore,
    pub index: &'a InvertedIndex,
    pub config: &'a EngineConfig,
    pub processor: &'a QueryProcessor,
    /// Instant after which long scans stop early. Set by [`Pipeline::run`].
    pub cutoff: Option<Instant>,
}

impl<'a> StageContext<'a> {
    pub fn new(
        store: &'a DocumentStore,
        index: &'a InvertedIndex,
        config: &'a EngineConfig,
        processor: &'a QueryProcessor,
    ) -> Self {
        Self { store, index, config, processor, cutoff: None }
    }

    pub fn past_cutoff(&self) -> bool {
        self.cutoff.map_or(false, |c| Instant::now() >= c)
    }
}

pub trait StageScorer: Send + Sync {
    fn stage(&self) -> Stage;

    /// Candidates for `query`, best first.
    fn score(&self, ctx: &StageContext<'_>, query: &str) -> Result<Vec<StageHit>>;
}

fn sort_desc(hits: &mut [StageHit]) {
    hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
}

/// Inverted-index hit counts for every query word occurrence.
fn retrieve(ctx: &StageContext<'_>, query: &str) -> Vec<StageHit> {
    let mut slots: HashMap<DocId, usize> = HashMap::new();
    let mut hits: Vec<StageHit> = Vec::new();
    for word in tokenize(query) {
        for &doc_id in ctx.index.postings(&word) {
            let slot = *slots.entry(doc_id).or_insert_with(|| {
                hits.push(StageHit::candidate(doc_id));
                hits.len() - 1
            });
            let hit = &mut hits[slot];
            hit.score += 1.0;
            hit.tags.insert(format!("inverted_index_{word}"));
        }
    }
    for hit in &mut hits {
        hit.annotations.shard = Some(ctx.store.shard_of(hit.doc_id));
    }
    sort_desc(&mut hits);
    hits.truncate(ctx.config.limits.retrieval);
    hits
}

pub struct RetrievalStage;

impl StageScorer for RetrievalStage {
    fn stage(&self) -> Stage {
        Stage::Retrieval
    }

    fn score(&self, ctx: &StageContext<'_>, query: &str) -> Result<Vec<StageHit>> {
        let mut hits = retrieve(ctx, query);
        hits.iter_mut().for_each(|h| h.record(Stage::Retrieval));
        Ok(hits)
    }
}

/// Retrieval over the corrected and expanded query; the top candidates get
/// highlights, a snippet and an intent boost.
pub struct EnhancementStage;

impl StageScorer for EnhancementStage {
    fn stage(&self) -> Stage {
        Stage::Enhancement
    }

    fn score(&self, ctx: &StageContext<'_>, query: &str) -> Result<Vec<StageHit>> {
        let processed = ctx.processor.process(query);
        let intent = detect_intent(query);
        let query_words = token_set(query);
        let schema = &ctx.config.schema;
        let mut hits = retrieve(ctx, &processed.text);
        for (rank, hit) in hits.iter_mut().enumerate() {
            if rank < ctx.config.limits.enhancement {
                if let Some(doc) = ctx.store.get(hit.doc_id) {
                    hit.annotations.highlights = highlight(doc, &query_words);
                    hit.annotations.snippet = Some(snippet(doc, schema, &query_words));
                    hit.score += intent_boost(intent.intent, doc, schema);
                }
            }
            hit.record(Stage::Enhancement);
        }
        tracing::debug!(intent = ?intent.intent, expanded = %processed.text, "query understood");
        Ok(hits)
    }
}

/// TF-IDF, BM25 and the embedding proxy, then personalization and business rules.
pub struct RankingStage;

impl StageScorer for RankingStage {
    fn stage(&self) -> Stage {
        Stage::Ranking
    }

    fn score(&self, ctx: &StageContext<'_>, query: &str) -> Result<Vec<StageHit>> {
        let words = signals::query_words(query);
        let total = ctx.store.len();
        let config = ctx.config;
        let mut hits = retrieve(ctx, query);
        for hit in &mut hits {
            let Some(doc) = ctx.store.get(hit.doc_id) else { continue };
            let model = signals::tfidf(&words, doc, ctx.index, total) * 0.4
                + signals::bm25(&words, doc, ctx.index, total, &config.bm25) * 0.4
                + signals::embedding_similarity(&words, doc) * 0.2;
            if !model.is_finite() {
                return Err(SearchError::scorer(Stage::Ranking, format!("non-finite model score for {}", doc.id)));
            }
            hit.score = model;
            hit.record(Stage::Ranking);
            hit.score += signals::personalization(doc, &config.schema, &config.preferences);
            hit.score += signals::business_boost(doc, &config.schema, &config.business, ctx.store.is_newer(hit.doc_id));
            hit.tags.extend(["ranked", "personalized", "business_rules"].map(String::from));
        }
        sort_desc(&mut hits);
        hits.truncate(config.limits.ranking);
        Ok(hits)
    }
}

/// Substring TF-IDF over the whole collection, scored in parallel.
pub struct DistributedStage;

impl StageScorer for DistributedStage {
    fn stage(&self) -> Stage {
        Stage::Distributed
    }

    fn score(&self, ctx: &StageContext<'_>, query: &str) -> Result<Vec<StageHit>> {
        let mut query_tf: Vec<(String, f64)> = Vec::new();
        for word in tokenize(query) {
            match query_tf.iter_mut().find(|(w, _)| *w == word) {
                Some((_, tf)) => *tf += 1.0,
                None => query_tf.push((word, 1.0)),
            }
        }
        let n = ctx.store.len() as f64;
        let weighted: Vec<(String, f64)> = query_tf
            .into_iter()
            .filter(|(w, _)| ctx.index.contains(w))
            .map(|(w, tf)| {
                let idf = (n / (1.0 + ctx.index.postings_len(&w) as f64)).ln();
                (w, idf * tf)
            })
            .collect();
        if weighted.is_empty() {
            return Ok(Vec::new());
        }

        let scored: Vec<(DocId, f64)> = (0..ctx.store.len() as DocId)
            .into_par_iter()
            .filter_map(|doc_id| {
                if ctx.past_cutoff() {
                    return None;
                }
                let text = ctx.store.get(doc_id)?.text_lower();
                let score: f64 =
                    weighted.iter().map(|(w, weight)| count_occurrences(&text, w) as f64 * weight).sum();
                (score != 0.0).then_some((doc_id, score))
            })
            .collect();

        let mut hits = Vec::with_capacity(scored.len());
        for (doc_id, score) in scored {
            if !score.is_finite() {
                return Err(SearchError::scorer(Stage::Distributed, "non-finite tf-idf score"));
            }
            if score <= 0.0 {
                continue;
            }
            let shard = ctx.store.shard_of(doc_id);
            let mut hit = StageHit::candidate(doc_id).tag("distributed").tag(format!("shard_{shard}"));
            hit.score = score;
            hit.annotations.shard = Some(shard);
            hit.record(Stage::Distributed);
            hits.push(hit);
        }
        sort_desc(&mut hits);
        hits.truncate(ctx.config.limits.distributed);
        Ok(hits)
    }
}

/// Jaccard similarity of word sets over a prefix of the collection.
pub struct ApproximateStage;

/// Minimum Jaccard similarity for an approximate match.
const APPROXIMATE_MIN_SIMILARITY: f64 = 0.1;

impl StageScorer for ApproximateStage {
    fn stage(&self) -> Stage {
        Stage::Approximate
    }

    fn score(&self, ctx: &StageContext<'_>, query: &str) -> Result<Vec<StageHit>> {
        let words = token_set(query);
        let mut hits: Vec<StageHit> = ctx
            .store
            .iter()
            .take(ctx.config.limits.approximate_scan)
            .take_while(|_| !ctx.past_cutoff())
            .filter_map(|(doc_id, doc)| {
                let similarity = signals::jaccard(&words, &token_set(&doc.text_lower()));
                (similarity > APPROXIMATE_MIN_SIMILARITY).then(|| {
                    let mut hit = StageHit::candidate(doc_id).tag("approximate");
                    hit.score = similarity;
                    hit.record(Stage::Approximate);
                    hit
                })
            })
            .collect();
        sort_desc(&mut hits);
        hits.truncate(ctx.config.limits.combined);
        Ok(hits)
    }
}

/// Retrieval candidates carrying a business-completeness contribution.
pub struct InsightStage;

impl StageScorer for InsightStage {
    fn stage(&self) -> Stage {
        Stage::Insight
    }

    fn score(&self, ctx: &StageContext<'_>, query: &str) -> Result<Vec<StageHit>> {
        let mut hits = retrieve(ctx, query);
        for hit in &mut hits {
            if let Some(doc) = ctx.store.get(hit.doc_id) {
                hit.contributions.record(Stage::Insight, signals::business_completeness(doc, &ctx.config.schema));
            }
            hit.tags.insert("insight".to_string());
        }
        Ok(hits)
    }
}

/// Outcome of running the stages for one query.
#[derive(Debug, Default)]
pub struct StageRun {
    /// `None` for stages that were not selected, failed or overran the deadline.
    pub outputs: StageTable<Option<Vec<StageHit>>>,
    pub failed: BTreeSet<Stage>,
    pub skipped: BTreeSet<Stage>,
}

impl StageRun {
    pub fn total_hits(&self) -> usize {
        self.outputs.values().flatten().map(Vec::len).sum()
    }

    pub fn completed(&self) -> impl Iterator<Item = Stage> + '_ {
        self.outputs.iter().filter(|(_, o)| o.is_some()).map(|(s, _)| s)
    }
}

enum StageOutcome {
    Done(Vec<StageHit>),
    Failed,
    Skipped,
}

/// Runs the selected stages concurrently. A failing stage is logged and left
/// out; it never aborts the query.
pub struct Pipeline {
    stages: Vec<Box<dyn StageScorer>>,
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new(vec![
            Box::new(RetrievalStage),
            Box::new(EnhancementStage),
            Box::new(RankingStage),
            Box::new(DistributedStage),
            Box::new(ApproximateStage),
            Box::new(InsightStage),
        ])
    }
}

impl Pipeline {
    pub fn new(stages: Vec<Box<dyn StageScorer>>) -> Self {
        Self { stages }
    }

    /// Stages still running when `deadline` passes are dropped along with their hits.
    pub fn run(&self, ctx: &StageContext<'_>, query: &str, only: Option<Stage>, deadline: Option<Duration>) -> StageRun {
        let started = Instant::now();
        let ctx = StageContext { cutoff: deadline.map(|d| started + d), ..*ctx };
        let overran = || deadline.map_or(false, |d| started.elapsed() >= d);
        let outcomes: Vec<(Stage, StageOutcome)> = self
            .stages
            .par_iter()
            .filter(|s| only.map_or(true, |o| o == s.stage()))
            .map(|scorer| {
                let stage = scorer.stage();
                if overran() {
                    tracing::warn!(%stage, elapsed_ms = started.elapsed().as_millis() as u64, "query deadline passed, stage skipped");
                    return (stage, StageOutcome::Skipped);
                }
                match scorer.score(&ctx, query) {
                    Ok(_) if overran() => {
                        tracing::warn!(%stage, elapsed_ms = started.elapsed().as_millis() as u64, "stage overran query deadline, hits dropped");
                        (stage, StageOutcome::Skipped)
                    }
                    Ok(hits) => (stage, StageOutcome::Done(hits)),
                    Err(e) => {
                        tracing::error!(%stage, error = %e, "stage failed");
                        (stage, StageOutcome::Failed)
                    }
                }
            })
            .collect();

        let mut run = StageRun::default();
        for (stage, outcome) in outcomes {
            match outcome {
                StageOutcome::Done(hits) => run.outputs.set(stage, Some(hits)),
                StageOutcome::Failed => {
                    run.failed.insert(stage);
                }
                StageOutcome::Skipped => {
                    run.skipped.insert(stage);
                }
            }
        }
        run
    }
}
