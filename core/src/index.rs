use serde::Serialize;
use std::collections::{HashMap, HashSet};

use crate::document::{Document, Schema};
use crate::tokenizer::tokenize;

/// Position of a document inside the [`crate::DocumentStore`].
pub type DocId = u32;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct IndexStatistics {
    pub total_terms: usize,
    pub unique_terms: usize,
    pub categories_found: usize,
    pub brands_found: usize,
    pub features_found: usize,
    /// unique / total term occurrences
    pub efficiency: f64,
}

/// Token postings plus secondary indexes by category, brand and field name.
///
/// Built once from the store and read-only afterwards. Posting lists keep one
/// entry per occurrence, so their length doubles as a collection-wide term frequency.
#[derive(Debug, Default)]
pub struct InvertedIndex {
    pub postings: HashMap<String, Vec<DocId>>,
    doc_freq: HashMap<String, usize>,
    pub category_index: HashMap<String, Vec<DocId>>,
    pub brand_index: HashMap<String, Vec<DocId>>,
    pub feature_index: HashMap<String, Vec<DocId>>,
    stats: IndexStatistics,
}

impl InvertedIndex {
    pub fn new() -> Self { Self::default() }

    pub fn build<'a, I>(docs: I, schema: &Schema) -> Self
    where
        I: IntoIterator<Item = (DocId, &'a Document)>,
    {
        let mut index = Self::new();
        for (doc_id, doc) in docs {
            index.add_document(doc_id, doc, schema);
        }
        for (term, plist) in &index.postings {
            let distinct: HashSet<DocId> = plist.iter().copied().collect();
            index.doc_freq.insert(term.clone(), distinct.len());
        }
        index.stats.unique_terms = index.postings.len();
        if index.stats.total_terms > 0 {
            index.stats.efficiency = index.stats.unique_terms as f64 / index.stats.total_terms as f64;
        }
        tracing::info!(
            unique_terms = index.stats.unique_terms,
            total_terms = index.stats.total_terms,
            categories = index.stats.categories_found,
            brands = index.stats.brands_found,
            "inverted index built"
        );
        index
    }

    fn add_document(&mut self, doc_id: DocId, doc: &Document, schema: &Schema) {
        for (key, value) in &doc.fields {
            for word in tokenize(value) {
                self.postings.entry(word).or_default().push(doc_id);
                self.stats.total_terms += 1;
            }
            if !value.is_empty() {
                self.feature_index.entry(key.to_lowercase()).or_default().push(doc_id);
                self.stats.features_found += 1;
            }
        }
        if let Some(kind) = doc.fields.get(&schema.kind) {
            self.category_index.entry(kind.to_lowercase()).or_default().push(doc_id);
            self.stats.categories_found += 1;
        }
        if let Some(brand) = doc.fields.get(&schema.brand) {
            self.brand_index.entry(brand.to_lowercase()).or_default().push(doc_id);
            self.stats.brands_found += 1;
        }
    }

    pub fn postings(&self, term: &str) -> &[DocId] {
        self.postings.get(term).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn postings_len(&self, term: &str) -> usize {
        self.postings(term).len()
    }

    /// Number of distinct documents containing `term`.
    pub fn doc_freq(&self, term: &str) -> usize {
        self.doc_freq.get(term).copied().unwrap_or(0)
    }

    pub fn contains(&self, term: &str) -> bool {
        self.postings.contains_key(term)
    }

    pub fn by_category(&self, category: &str) -> &[DocId] {
        self.category_index.get(&category.to_lowercase()).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn by_brand(&self, brand: &str) -> &[DocId] {
        self.brand_index.get(&brand.to_lowercase()).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Indexed terms in lexicographic order.
    pub fn vocabulary(&self) -> Vec<&str> {
        let mut terms: Vec<&str> = self.postings.keys().map(String::as_str).collect();
        terms.sort_unstable();
        terms
    }

    pub fn statistics(&self) -> &IndexStatistics {
        &self.stats
    }
}
