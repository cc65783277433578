//! Per-document scoring signals.
//!
//! Static signals (authority, freshness, UX) are computed once per document at
//! store build time; the query-dependent ones are evaluated per candidate.

use std::collections::{HashMap, HashSet};

use crate::config::{Bm25Params, BusinessRules, Preferences};
use crate::document::{Document, Schema};
use crate::index::InvertedIndex;
use crate::tokenizer::{count_occurrences, token_set, tokenize};

/// Technical keywords that mark a description as technical for the UX signal.
const UX_TECH_TERMS: [&str; 5] = ["gb", "inch", "mp", "mah", "hz"];

/// Technical keywords counted by the content-quality signal.
const QUALITY_TECH_TERMS: [&str; 8] = ["gb", "inch", "mp", "mah", "hz", "ram", "storage", "camera"];

/// Coarse product segments matched against the type and name of a document.
const SEGMENT_KEYWORDS: [(&str, &[&str]); 5] = [
    ("electronics", &["electronic", "digital", "smart", "wireless", "bluetooth", "usb"]),
    ("automotive", &["car", "vehicle", "automotive", "auto", "tire", "brake"]),
    ("home", &["home", "house", "kitchen", "bedroom", "living", "furniture"]),
    ("beauty", &["beauty", "cosmetic", "makeup", "skincare", "hair", "fragrance"]),
    ("sports", &["sport", "fitness", "exercise", "gym", "outdoor", "athletic"]),
];

fn char_len(s: &str) -> usize {
    s.chars().count()
}

/// Authority, freshness and UX quality, each in [0, 1].
#[derive(Debug, Clone, Copy, PartialEq, Default, serde::Serialize)]
pub struct StaticScores {
    pub authority: f64,
    pub freshness: f64,
    pub ux: f64,
}

impl StaticScores {
    pub fn compute(doc: &Document, schema: &Schema, rules: &BusinessRules) -> Self {
        Self {
            authority: authority(doc, schema, rules),
            freshness: freshness(doc, schema),
            ux: ux_quality(doc, schema),
        }
    }
}

/// Brand tier, field completeness and description length.
pub fn authority(doc: &Document, schema: &Schema, rules: &BusinessRules) -> f64 {
    let mut score = 0.0;
    if let Some(brand) = doc.field(&schema.brand) {
        let brand = brand.to_lowercase();
        score += if rules.top_tier_brands.contains(&brand) {
            0.4
        } else if rules.second_tier_brands.contains(&brand) {
            0.3
        } else {
            0.2
        };
    }
    score += schema.completeness(doc) * 0.3;
    if let Some(desc) = doc.field(&schema.description) {
        let len = char_len(desc);
        if len > 100 {
            score += 0.2;
        } else if len > 50 {
            score += 0.1;
        }
    }
    score.min(1.0)
}

/// No timestamps exist, so identifier and description length stand in for recency.
pub fn freshness(doc: &Document, schema: &Schema) -> f64 {
    let mut score = 0.5;
    let id_len = char_len(&doc.id);
    if id_len > 10 {
        score += 0.2;
    } else if id_len > 5 {
        score += 0.1;
    }
    if let Some(desc) = doc.field(&schema.description) {
        let len = char_len(desc);
        if len > 200 {
            score += 0.2;
        } else if len > 100 {
            score += 0.1;
        }
    }
    f64::min(score, 1.0)
}

pub fn ux_quality(doc: &Document, schema: &Schema) -> f64 {
    let mut score = 0.2 * schema.required().iter().filter(|f| doc.has(f)).count() as f64;
    if let Some(desc) = doc.field(&schema.description) {
        if char_len(desc) > 50 {
            score += 0.1;
        }
        let lower = desc.to_lowercase();
        if UX_TECH_TERMS.iter().any(|t| lower.contains(t)) {
            score += 0.1;
        }
    }
    score.min(1.0)
}

pub fn content_quality(doc: &Document, schema: &Schema) -> f64 {
    let mut score = schema.completeness(doc) * 0.4;
    if let Some(desc) = doc.field(&schema.description) {
        let len = char_len(desc);
        if len > 200 {
            score += 0.3;
        } else if len > 100 {
            score += 0.2;
        } else if len > 50 {
            score += 0.1;
        }
        let lower = desc.to_lowercase();
        let tech = QUALITY_TECH_TERMS.iter().filter(|t| lower.contains(*t)).count();
        score += (tech as f64 * 0.05).min(0.3);
    }
    score.min(1.0)
}

/// Field-weighted term frequency: name hits weigh 3, type and brand 2, anything else 1.
pub fn keyword_relevance(query_words: &HashSet<String>, doc: &Document, schema: &Schema) -> f64 {
    let mut score = 0.0;
    let mut total_words = 0usize;
    for (key, value) in &doc.fields {
        let weight = if *key == schema.name {
            3.0
        } else if *key == schema.kind || *key == schema.brand {
            2.0
        } else {
            1.0
        };
        let words = tokenize(value);
        total_words += words.len();
        score += weight * words.iter().filter(|w| query_words.contains(*w)).count() as f64;
    }
    if total_words > 0 {
        score /= total_words as f64;
    }
    score.min(1.0)
}

/// Per-field TF times `ln(N / (postings + 1))`, averaged over the document's word count.
pub fn tfidf(query_words: &HashSet<String>, doc: &Document, index: &InvertedIndex, total_docs: usize) -> f64 {
    let mut score = 0.0;
    let mut total_words = 0usize;
    for value in doc.values() {
        let words = tokenize(value);
        total_words += words.len();
        let mut counts: HashMap<&str, usize> = HashMap::new();
        for w in &words {
            *counts.entry(w.as_str()).or_insert(0) += 1;
        }
        for w in words.iter().filter(|w| query_words.contains(*w)) {
            let tf = counts[w.as_str()] as f64 / words.len() as f64;
            let idf = (total_docs as f64 / (index.postings_len(w) as f64 + 1.0)).ln();
            score += tf * idf;
        }
    }
    if total_words > 0 { score / total_words as f64 } else { 0.0 }
}

/// BM25 over substring term frequency with a fixed average document length
/// measured in characters.
pub fn bm25(query_words: &HashSet<String>, doc: &Document, index: &InvertedIndex, total_docs: usize, params: &Bm25Params) -> f64 {
    let lowered: Vec<String> = doc.values().map(str::to_lowercase).collect();
    let doc_len: usize = doc.values().map(char_len).sum();
    let norm = params.k1 * (1.0 - params.b + params.b * (doc_len as f64 / params.avg_doc_len));
    let n = total_docs as f64;
    let mut score = 0.0;
    for word in query_words {
        let df = index.doc_freq(word);
        if df == 0 {
            continue;
        }
        let tf: usize = lowered.iter().map(|v| count_occurrences(v, word)).sum();
        if tf == 0 {
            continue;
        }
        let df = df as f64;
        let tf = tf as f64;
        let idf = ((n - df + 0.5) / (df + 0.5)).ln();
        score += idf * (tf * (params.k1 + 1.0)) / (tf + norm);
    }
    score
}

/// Jaccard similarity between the query words and the document's words.
pub fn embedding_similarity(query_words: &HashSet<String>, doc: &Document) -> f64 {
    let doc_words: HashSet<String> = doc.values().flat_map(tokenize).collect();
    jaccard(query_words, &doc_words)
}

pub fn jaccard(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
    let union = a.union(b).count();
    if union == 0 {
        return 0.0;
    }
    a.intersection(b).count() as f64 / union as f64
}

/// Brand 0.3, type 0.2, description 0.1.
pub fn business_completeness(doc: &Document, schema: &Schema) -> f64 {
    let mut score = 0.0;
    if doc.has(&schema.brand) {
        score += 0.3;
    }
    if doc.has(&schema.kind) {
        score += 0.2;
    }
    if doc.has(&schema.description) {
        score += 0.1;
    }
    f64::min(score, 1.0)
}

/// Segment inferred from keywords in the document's type and name.
pub fn inferred_segment(doc: &Document, schema: &Schema) -> Option<&'static str> {
    let text = format!("{} {}", doc.field_or_empty(&schema.kind), doc.field_or_empty(&schema.name)).to_lowercase();
    SEGMENT_KEYWORDS
        .iter()
        .find(|(_, keywords)| keywords.iter().any(|k| text.contains(k)))
        .map(|(segment, _)| *segment)
}

fn matches_category(doc: &Document, schema: &Schema, categories: &[String]) -> bool {
    let kind = doc.field_or_empty(&schema.kind).to_lowercase();
    if categories.iter().any(|c| kind.contains(c.as_str())) {
        return true;
    }
    inferred_segment(doc, schema).map_or(false, |seg| categories.iter().any(|c| c == seg))
}

pub fn personalization(doc: &Document, schema: &Schema, prefs: &Preferences) -> f64 {
    let mut boost = 0.0;
    if let Some(brand) = doc.field(&schema.brand) {
        if prefs.brands.contains(&brand.to_lowercase()) {
            boost += prefs.brand_boost;
        }
    }
    if matches_category(doc, schema, &prefs.categories) {
        boost += prefs.category_boost;
    }
    boost
}

/// Promoted brands, sponsored categories and the flat boost for newer-shard documents.
pub fn business_boost(doc: &Document, schema: &Schema, rules: &BusinessRules, newer: bool) -> f64 {
    let mut boost = 0.0;
    if let Some(brand) = doc.field(&schema.brand) {
        if rules.promoted_brands.contains(&brand.to_lowercase()) {
            boost += rules.promoted_boost;
        }
    }
    if matches_category(doc, schema, &rules.sponsored_categories) {
        boost += rules.sponsored_boost;
    }
    if newer {
        boost += rules.freshness_boost;
    }
    boost
}

pub fn query_words(query: &str) -> HashSet<String> {
    token_set(query)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn phone() -> Document {
        Document::new("phone_000001")
            .with_field("Name", "Galaxy Phone")
            .with_field("Type", "Mobile Phone")
            .with_field("Brand", "Samsung")
            .with_field("Sales Package", "Handset, 8 GB RAM, 128 GB storage, 50 MP camera, 5000 mAh battery pack included")
    }

    #[test]
    fn authority_rewards_top_brands() {
        let schema = Schema::default();
        let rules = BusinessRules::default();
        let samsung = authority(&phone(), &schema, &rules);
        let generic = authority(&phone().with_field("Brand", "Acme"), &schema, &rules);
        assert!((samsung - (0.4 + 0.3 + 0.1)).abs() < 1e-9);
        assert!(samsung > generic);
    }

    #[test]
    fn freshness_starts_at_half() {
        let doc = Document::new("p1");
        assert_eq!(freshness(&doc, &Schema::default()), 0.5);
        assert!((freshness(&phone(), &Schema::default()) - 0.7).abs() < 1e-9);
    }

    #[test]
    fn ux_and_quality_stay_in_unit_range() {
        let schema = Schema::default();
        let doc = phone();
        let ux = ux_quality(&doc, &schema);
        let quality = content_quality(&doc, &schema);
        assert!((ux - 1.0).abs() < 1e-9);
        assert!(quality > 0.4 && quality <= 1.0);
    }

    #[test]
    fn keyword_relevance_weights_name_hits() {
        let schema = Schema::default();
        let doc = Document::new("d").with_field("Name", "phone").with_field("Other", "x phone");
        let words = query_words("phone");
        // (3 + 1) / 3 words, capped at 1.0
        assert_eq!(keyword_relevance(&words, &doc, &schema), 1.0);
        let doc = Document::new("d").with_field("Other", "phone a b c");
        assert!((keyword_relevance(&words, &doc, &schema) - 0.25).abs() < 1e-9);
    }

    #[test]
    fn jaccard_of_disjoint_sets_is_zero() {
        let doc = Document::new("d").with_field("Name", "car adapter");
        assert_eq!(embedding_similarity(&query_words("speaker"), &doc), 0.0);
        assert!((embedding_similarity(&query_words("car"), &doc) - 0.5).abs() < 1e-9);
    }

    #[test]
    fn segment_inference_uses_type_and_name() {
        let schema = Schema::default();
        let doc = Document::new("d").with_field("Name", "Bluetooth Car Adapter");
        assert_eq!(inferred_segment(&doc, &schema), Some("electronics"));
        assert_eq!(inferred_segment(&Document::new("x"), &schema), None);
    }

    #[test]
    fn business_boost_adds_freshness_for_newer_shards() {
        let schema = Schema::default();
        let rules = BusinessRules::default();
        let doc = Document::new("d").with_field("Brand", "Acme");
        assert_eq!(business_boost(&doc, &schema, &rules, false), 0.0);
        assert!((business_boost(&doc, &schema, &rules, true) - 0.1).abs() < 1e-9);
    }
}
