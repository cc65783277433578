//! Counted facets over the whole collection and facet-based filtering.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::str::FromStr;

use crate::document::{Document, Schema};
use crate::error::SearchError;
use crate::index::DocId;
use crate::store::DocumentStore;

/// Values kept per facet, most frequent first.
pub const MAX_FACET_VALUES: usize = 20;

const SPEC_TERMS: [&str; 10] = ["gb", "mb", "inch", "mp", "mah", "hz", "ghz", "ram", "storage", "battery"];

const CATEGORY_RULES: [(&str, &[&str]); 8] = [
    ("Mobile & Tablets", &["phone", "mobile", "smartphone", "tablet"]),
    ("Computers", &["laptop", "computer", "pc", "desktop"]),
    ("Audio", &["headphone", "earphone", "speaker", "audio"]),
    ("Automotive", &["car", "auto", "vehicle"]),
    ("Photography", &["camera", "photo", "lens"]),
    ("Home & Kitchen", &["home", "kitchen", "furniture"]),
    ("Beauty", &["beauty", "cosmetic", "skincare"]),
    ("Sports & Fitness", &["sport", "fitness", "exercise"]),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FacetKind {
    Brand,
    Type,
    Category,
    PriceRange,
    HasSpecs,
}

impl FacetKind {
    pub const ALL: [FacetKind; 5] =
        [FacetKind::Brand, FacetKind::Type, FacetKind::Category, FacetKind::PriceRange, FacetKind::HasSpecs];

    pub fn as_str(self) -> &'static str {
        match self {
            FacetKind::Brand => "brand",
            FacetKind::Type => "type",
            FacetKind::Category => "category",
            FacetKind::PriceRange => "price_range",
            FacetKind::HasSpecs => "has_specs",
        }
    }
}

impl fmt::Display for FacetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FacetKind {
    type Err = SearchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        FacetKind::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| SearchError::UnknownFacet(s.to_string()))
    }
}

/// One facet: values with their counts, most frequent first, ties in first-seen order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Facet {
    pub name: FacetKind,
    pub values: Vec<(String, usize)>,
}

impl Facet {
    pub fn count(&self, value: &str) -> Option<usize> {
        self.values.iter().find(|(v, _)| v == value).map(|(_, c)| *c)
    }
}

/// Selected values per facet: OR within a facet, AND across facets.
pub type FacetFilters = BTreeMap<FacetKind, Vec<String>>;

/// Converts string-keyed filters from an outer layer; unknown facet names are rejected.
pub fn parse_filters<I, K>(raw: I) -> Result<FacetFilters, SearchError>
where
    I: IntoIterator<Item = (K, Vec<String>)>,
    K: AsRef<str>,
{
    raw.into_iter()
        .map(|(name, values)| Ok((name.as_ref().parse::<FacetKind>()?, values)))
        .collect()
}

/// High-level category from keywords in the product type.
pub fn infer_category(product_type: &str) -> &'static str {
    let lower = product_type.to_lowercase();
    CATEGORY_RULES
        .iter()
        .find(|(_, keywords)| keywords.iter().any(|k| lower.contains(k)))
        .map(|(category, _)| *category)
        .unwrap_or("Other")
}

pub fn price_range(doc: &Document, schema: &Schema) -> &'static str {
    let text = format!("{} {}", doc.field_or_empty(&schema.description), doc.field_or_empty(&schema.name)).to_lowercase();
    if text.contains("under") && ["1000", "500", "100"].iter().any(|p| text.contains(p)) {
        "Under ₹1000"
    } else if ["premium", "expensive", "high-end"].iter().any(|p| text.contains(p)) {
        "Premium"
    } else if ["budget", "affordable", "cheap"].iter().any(|p| text.contains(p)) {
        "Budget"
    } else {
        "Standard"
    }
}

/// Two or more technical keywords, or a description longer than 200 characters.
pub fn has_detailed_specs(doc: &Document, schema: &Schema) -> bool {
    let Some(desc) = doc.field(&schema.description) else {
        return false;
    };
    let lower = desc.to_lowercase();
    let spec_count = SPEC_TERMS.iter().filter(|t| lower.contains(*t)).count();
    spec_count >= 2 || desc.chars().count() > 200
}

/// The value `doc` takes for each facet.
#[derive(Debug, Clone, PartialEq)]
struct FacetValues {
    brand: Option<String>,
    kind: Option<String>,
    category: &'static str,
    price_range: &'static str,
    has_specs: bool,
}

impl FacetValues {
    fn of(doc: &Document, schema: &Schema) -> Self {
        let brand = doc.field(&schema.brand).map(str::trim).filter(|b| !b.is_empty()).map(str::to_string);
        let kind = doc.field(&schema.kind).map(str::trim).filter(|t| !t.is_empty()).map(str::to_string);
        let category = infer_category(kind.as_deref().unwrap_or(""));
        Self {
            brand,
            kind,
            category,
            price_range: price_range(doc, schema),
            has_specs: has_detailed_specs(doc, schema),
        }
    }

    fn get(&self, facet: FacetKind) -> &str {
        match facet {
            FacetKind::Brand => self.brand.as_deref().unwrap_or(""),
            FacetKind::Type => self.kind.as_deref().unwrap_or(""),
            FacetKind::Category => self.category,
            FacetKind::PriceRange => self.price_range,
            FacetKind::HasSpecs => yes_no(self.has_specs),
        }
    }
}

fn yes_no(flag: bool) -> &'static str {
    if flag { "Yes" } else { "No" }
}

/// Counts values in first-seen order.
#[derive(Default)]
struct Counter {
    order: Vec<String>,
    counts: HashMap<String, usize>,
}

impl Counter {
    fn add(&mut self, value: &str) {
        match self.counts.get_mut(value) {
            Some(c) => *c += 1,
            None => {
                self.order.push(value.to_string());
                self.counts.insert(value.to_string(), 1);
            }
        }
    }

    fn top(self, facet: FacetKind, limit: usize) -> Facet {
        let mut values: Vec<(String, usize)> = self
            .order
            .into_iter()
            .map(|v| {
                let c = self.counts[&v];
                (v, c)
            })
            .collect();
        values.sort_by(|a, b| b.1.cmp(&a.1));
        values.truncate(limit);
        Facet { name: facet, values }
    }
}

/// Facets computed once from the store, plus each document's own facet values for filtering.
#[derive(Debug, Default)]
pub struct FacetEngine {
    facets: BTreeMap<FacetKind, Facet>,
    per_doc: Vec<FacetValues>,
}

impl FacetEngine {
    pub fn build(store: &DocumentStore, schema: &Schema) -> Self {
        let per_doc: Vec<FacetValues> = store.iter().map(|(_, doc)| FacetValues::of(doc, schema)).collect();
        let mut counters: BTreeMap<FacetKind, Counter> = FacetKind::ALL.into_iter().map(|k| (k, Counter::default())).collect();
        for values in &per_doc {
            if let Some(brand) = &values.brand {
                counters.entry(FacetKind::Brand).or_default().add(brand);
            }
            if let Some(kind) = &values.kind {
                counters.entry(FacetKind::Type).or_default().add(kind);
                counters.entry(FacetKind::Category).or_default().add(values.category);
            }
            counters.entry(FacetKind::PriceRange).or_default().add(values.price_range);
            counters.entry(FacetKind::HasSpecs).or_default().add(yes_no(values.has_specs));
        }
        let facets = counters
            .into_iter()
            .map(|(kind, counter)| (kind, counter.top(kind, MAX_FACET_VALUES)))
            .collect();
        Self { facets, per_doc }
    }

    pub fn facets(&self) -> &BTreeMap<FacetKind, Facet> {
        &self.facets
    }

    pub fn facet(&self, kind: FacetKind) -> Option<&Facet> {
        self.facets.get(&kind)
    }

    /// The value of `facet` for `doc_id`, if the document is known.
    pub fn value_of(&self, doc_id: DocId, facet: FacetKind) -> Option<&str> {
        self.per_doc.get(doc_id as usize).map(|v| v.get(facet))
    }

    pub fn matches(&self, doc_id: DocId, filters: &FacetFilters) -> bool {
        let Some(values) = self.per_doc.get(doc_id as usize) else {
            return false;
        };
        filters
            .iter()
            .filter(|(_, selected)| !selected.is_empty())
            .all(|(facet, selected)| selected.iter().any(|s| s == values.get(*facet)))
    }

    pub fn filter_by_facets(&self, ids: &HashSet<DocId>, filters: &FacetFilters) -> HashSet<DocId> {
        ids.iter().copied().filter(|id| self.matches(*id, filters)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;

    fn store() -> DocumentStore {
        let docs = vec![
            Document::new("1").with_field("Brand", "Samsung").with_field("Type", "Phone"),
            Document::new("2").with_field("Brand", "Apple").with_field("Type", "Phone"),
            Document::new("3").with_field("Brand", "Sony").with_field("Type", "Headphone"),
            Document::new("4").with_field("Brand", "Samsung").with_field("Type", "TV"),
        ];
        DocumentStore::from_documents(docs, &EngineConfig::default()).unwrap()
    }

    fn ids(store: &DocumentStore, external: &[&str]) -> HashSet<DocId> {
        external.iter().filter_map(|id| store.doc_id(id)).collect()
    }

    #[test]
    fn filters_and_across_facets_or_within() {
        let store = store();
        let engine = FacetEngine::build(&store, &Schema::default());
        let all = ids(&store, &["1", "2", "3", "4"]);

        let mut filters = FacetFilters::new();
        filters.insert(FacetKind::Brand, vec!["Samsung".into()]);
        assert_eq!(engine.filter_by_facets(&all, &filters), ids(&store, &["1", "4"]));

        filters.insert(FacetKind::Category, vec!["Mobile & Tablets".into()]);
        assert_eq!(engine.filter_by_facets(&all, &filters), ids(&store, &["1"]));

        let mut either = FacetFilters::new();
        either.insert(FacetKind::Brand, vec!["Apple".into(), "Sony".into()]);
        either.insert(FacetKind::Type, vec![]);
        assert_eq!(engine.filter_by_facets(&all, &either), ids(&store, &["2", "3"]));
    }

    #[test]
    fn counts_are_sorted_and_stable() {
        let store = store();
        let engine = FacetEngine::build(&store, &Schema::default());
        let brand = engine.facet(FacetKind::Brand).unwrap();
        assert_eq!(brand.values[0], ("Samsung".to_string(), 2));
        assert_eq!(brand.values[1].0, "Apple");
        let category = engine.facet(FacetKind::Category).unwrap();
        assert_eq!(category.count("Mobile & Tablets"), Some(3));
        assert_eq!(category.count("Audio"), None);
        assert_eq!(category.count("Other"), Some(1));
        assert_eq!(engine.facet(FacetKind::HasSpecs).unwrap().count("No"), Some(4));
        assert_eq!(engine.facet(FacetKind::PriceRange).unwrap().count("Standard"), Some(4));
    }

    #[test]
    fn brand_and_type_values_are_trimmed() {
        let docs = vec![
            Document::new("1").with_field("Type", " Phone ").with_field("Brand", "Nokia "),
            Document::new("2").with_field("Type", "Phone").with_field("Brand", "Nokia"),
            Document::new("3").with_field("Type", "   "),
        ];
        let store = DocumentStore::from_documents(docs, &EngineConfig::default()).unwrap();
        let engine = FacetEngine::build(&store, &Schema::default());
        let kind = engine.facet(FacetKind::Type).unwrap();
        assert_eq!(kind.values, vec![("Phone".to_string(), 2)]);
        assert_eq!(engine.value_of(0, FacetKind::Type), Some("Phone"));
        assert_eq!(engine.facet(FacetKind::Brand).unwrap().count("Nokia"), Some(2));

        let mut filters = FacetFilters::new();
        filters.insert(FacetKind::Type, vec!["Phone".into()]);
        assert_eq!(engine.filter_by_facets(&ids(&store, &["1", "2", "3"]), &filters), ids(&store, &["1", "2"]));
    }

    #[test]
    fn facets_keep_top_twenty_values() {
        let docs = (0..30).map(|i| Document::new(format!("d{i}")).with_field("Brand", format!("Brand{i}"))).collect();
        let store = DocumentStore::from_documents(docs, &EngineConfig::default()).unwrap();
        let engine = FacetEngine::build(&store, &Schema::default());
        assert_eq!(engine.facet(FacetKind::Brand).unwrap().values.len(), MAX_FACET_VALUES);
    }

    #[test]
    fn price_and_spec_heuristics() {
        let schema = Schema::default();
        let budget = Document::new("b").with_field("Name", "Affordable earbuds");
        assert_eq!(price_range(&budget, &schema), "Budget");
        let under = Document::new("u").with_field("Sales Package", "Deals under 500");
        assert_eq!(price_range(&under, &schema), "Under ₹1000");
        let specs = Document::new("s").with_field("Sales Package", "4 GB RAM, 64 GB storage");
        assert!(has_detailed_specs(&specs, &schema));
        assert!(!has_detailed_specs(&budget, &schema));
    }

    #[test]
    fn unknown_facet_names_are_rejected() {
        let ok = parse_filters(vec![("brand", vec!["Sony".to_string()])]).unwrap();
        assert_eq!(ok.get(&FacetKind::Brand).map(Vec::len), Some(1));
        assert!(matches!(parse_filters(vec![("colour", vec![])]), Err(SearchError::UnknownFacet(_))));
    }
}
