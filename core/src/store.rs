use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use crate::config::EngineConfig;
use crate::document::Document;
use crate::error::{Result, SearchError};
use crate::index::DocId;
use crate::scoring::StaticScores;

/// Shards ids above this are treated as holding newer documents.
const NEWER_SHARD_FLOOR: usize = 5;

/// Simulated partitioning of the collection; used only as a recency hint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShardLayout {
    pub shard_size: usize,
    pub shard_count: usize,
}

impl ShardLayout {
    pub fn for_collection(total: usize) -> Self {
        let shard_size = (total / 10).max(1000);
        let shard_count = total.div_ceil(shard_size).max(1);
        Self { shard_size, shard_count }
    }

    pub fn shard_of(&self, id: &str) -> usize {
        let mut hasher = DefaultHasher::new();
        id.hash(&mut hasher);
        (hasher.finish() % self.shard_count as u64) as usize
    }
}

impl Default for ShardLayout {
    fn default() -> Self {
        Self::for_collection(0)
    }
}

/// Immutable document collection plus precomputed static scores.
#[derive(Debug, Default)]
pub struct DocumentStore {
    docs: Vec<Arc<Document>>,
    by_id: HashMap<String, DocId>,
    statics: Vec<StaticScores>,
    shards: ShardLayout,
}

impl DocumentStore {
    /// Builds the store, rejecting an empty collection and duplicate identifiers.
    pub fn from_documents(documents: Vec<Document>, config: &EngineConfig) -> Result<Self> {
        if documents.is_empty() {
            return Err(SearchError::data_load("dataset is empty"));
        }
        let mut by_id = HashMap::with_capacity(documents.len());
        let mut docs = Vec::with_capacity(documents.len());
        let mut statics = Vec::with_capacity(documents.len());
        for doc in documents {
            let doc_id = docs.len() as DocId;
            if by_id.insert(doc.id.clone(), doc_id).is_some() {
                return Err(SearchError::data_load(format!("duplicate document id: {}", doc.id)));
            }
            statics.push(StaticScores::compute(&doc, &config.schema, &config.business));
            docs.push(Arc::new(doc));
        }
        let shards = ShardLayout::for_collection(docs.len());
        tracing::info!(num_docs = docs.len(), "document store built");
        Ok(Self { docs, by_id, statics, shards })
    }

    pub fn len(&self) -> usize { self.docs.len() }

    pub fn is_empty(&self) -> bool { self.docs.is_empty() }

    pub fn get(&self, doc_id: DocId) -> Option<&Arc<Document>> {
        self.docs.get(doc_id as usize)
    }

    pub fn doc_id(&self, id: &str) -> Option<DocId> {
        self.by_id.get(id).copied()
    }

    pub fn by_external_id(&self, id: &str) -> Option<&Arc<Document>> {
        self.doc_id(id).and_then(|d| self.get(d))
    }

    pub fn static_scores(&self, doc_id: DocId) -> StaticScores {
        self.statics.get(doc_id as usize).copied().unwrap_or_default()
    }

    pub fn shard_of(&self, doc_id: DocId) -> usize {
        self.get(doc_id).map_or(0, |doc| self.shards.shard_of(&doc.id))
    }

    pub fn is_newer(&self, doc_id: DocId) -> bool {
        self.shard_of(doc_id) > NEWER_SHARD_FLOOR
    }

    /// Documents with their ids, in load order.
    pub fn iter(&self) -> impl Iterator<Item = (DocId, &Arc<Document>)> {
        self.docs.iter().enumerate().map(|(i, d)| (i as DocId, d))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty_and_duplicates() {
        let cfg = EngineConfig::default();
        assert!(matches!(DocumentStore::from_documents(vec![], &cfg), Err(SearchError::DataLoad(_))));
        let dupes = vec![Document::new("a"), Document::new("a")];
        assert!(matches!(DocumentStore::from_documents(dupes, &cfg), Err(SearchError::DataLoad(_))));
    }

    #[test]
    fn looks_up_by_external_id() {
        let cfg = EngineConfig::default();
        let store = DocumentStore::from_documents(vec![Document::new("a"), Document::new("b")], &cfg).unwrap();
        assert_eq!(store.doc_id("b"), Some(1));
        assert_eq!(store.by_external_id("a").map(|d| d.id.as_str()), Some("a"));
        assert_eq!(store.static_scores(0).freshness, 0.5);
    }

    #[test]
    fn small_collections_live_in_one_shard() {
        let layout = ShardLayout::for_collection(3);
        assert_eq!(layout.shard_count, 1);
        assert_eq!(layout.shard_of("anything"), 0);
        assert_eq!(ShardLayout::default(), layout);
        let large = ShardLayout::for_collection(25_000);
        assert_eq!(large.shard_size, 2500);
        assert_eq!(large.shard_count, 10);
    }
}
