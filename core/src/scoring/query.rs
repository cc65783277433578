//! Query understanding for the enhancement stage: spelling fixes, synonym
//! expansion, intent detection and result annotations.

use regex::{Regex, RegexBuilder};
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};

use crate::document::{Document, Schema};
use crate::fuzzy::FuzzyMatcher;

const SPELL_CORRECTIONS: [(&str, &str); 8] = [
    ("phne", "phone"),
    ("lptop", "laptop"),
    ("hedphone", "headphone"),
    ("blutooth", "bluetooth"),
    ("camra", "camera"),
    ("batry", "battery"),
    ("scrn", "screen"),
    ("memry", "memory"),
];

const SYNONYMS: [(&str, &[&str]); 10] = [
    ("phone", &["mobile", "cellphone", "smartphone", "device"]),
    ("laptop", &["notebook", "computer", "pc"]),
    ("headphone", &["earphone", "earbud", "headset"]),
    ("charger", &["adapter", "power", "cable"]),
    ("case", &["cover", "protector", "shell"]),
    ("bluetooth", &["wireless", "bt"]),
    ("camera", &["photo", "picture", "image"]),
    ("battery", &["power", "charge"]),
    ("screen", &["display", "monitor"]),
    ("memory", &["storage", "ram", "gb"]),
];

/// Catalogue terms that fuzzy correction may rewrite a query word to.
const COMMON_TERMS: [&str; 7] = ["mobile", "phone", "laptop", "computer", "headphone", "camera", "battery"];

const INTENT_PATTERNS: [(Intent, &[&str]); 5] = [
    (Intent::Comparison, &["vs", "versus", "compare", "better", "best"]),
    (Intent::Specification, &["specs", "specifications", "features", "details"]),
    (Intent::Price, &["price", "cost", "cheap", "expensive", "budget"]),
    (Intent::Brand, &["brand", "make", "manufacturer"]),
    (Intent::Category, &["type", "kind", "category"]),
];

const INTENT_TECH_TERMS: [&str; 7] = ["gb", "inch", "mp", "mah", "hz", "ram", "storage"];

const SNIPPET_MAX_CHARS: usize = 150;
pub const NO_SNIPPET: &str = "No description available";

/// Synonym expansion only kicks in for queries of at most this many words.
const SYNONYM_MAX_WORDS: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    Comparison,
    Specification,
    Price,
    Brand,
    Category,
    General,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DetectedIntent {
    pub intent: Intent,
    pub confidence: f64,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ProcessedQuery {
    pub text: String,
    /// (original word, replacement) for every corrected word.
    pub corrections: Vec<(String, String)>,
}

#[derive(Debug, Clone, Copy)]
pub struct QueryProcessor {
    matcher: FuzzyMatcher,
    correction_threshold: f64,
}

impl QueryProcessor {
    pub fn new(matcher: FuzzyMatcher, correction_threshold: f64) -> Self {
        Self { matcher, correction_threshold }
    }

    /// Lower-cases, corrects misspellings and appends synonyms.
    pub fn process(&self, query: &str) -> ProcessedQuery {
        let lowered = query.trim().to_lowercase();
        let mut corrections = Vec::new();
        let corrected: Vec<String> = lowered
            .split_whitespace()
            .map(|word| match self.correct(word) {
                Some(fixed) => {
                    tracing::debug!(from = word, to = %fixed, "query word corrected");
                    corrections.push((word.to_string(), fixed.clone()));
                    fixed
                }
                None => word.to_string(),
            })
            .collect();

        let per_word = if corrected.len() > 1 { 1 } else { 2 };
        let mut expanded = Vec::with_capacity(corrected.len() * 2);
        for word in &corrected {
            expanded.push(word.clone());
            if corrected.len() <= SYNONYM_MAX_WORDS {
                if let Some(synonyms) = synonyms_of(word) {
                    expanded.extend(synonyms.iter().take(per_word).map(|s| s.to_string()));
                }
            }
        }
        ProcessedQuery { text: expanded.join(" "), corrections }
    }

    fn correct(&self, word: &str) -> Option<String> {
        if let Some((_, fixed)) = SPELL_CORRECTIONS.iter().find(|(typo, _)| *typo == word) {
            return Some(fixed.to_string());
        }
        if word.chars().count() <= 4 {
            return None;
        }
        self.matcher
            .find_matches(word, &COMMON_TERMS, 1)
            .into_iter()
            .next()
            .filter(|m| m.similarity > self.correction_threshold)
            .map(|m| m.matched_term)
    }
}

fn synonyms_of(word: &str) -> Option<&'static [&'static str]> {
    SYNONYMS.iter().find(|(w, _)| *w == word).map(|(_, s)| *s)
}

/// Scores each intent by the share of its trigger words found in the query;
/// the first best-scoring intent wins.
pub fn detect_intent(query: &str) -> DetectedIntent {
    let lowered = query.to_lowercase();
    let mut best: Option<DetectedIntent> = None;
    for (intent, patterns) in INTENT_PATTERNS {
        let hits = patterns.iter().filter(|p| lowered.contains(*p)).count();
        if hits == 0 {
            continue;
        }
        let confidence = hits as f64 / patterns.len() as f64;
        if best.as_ref().map_or(true, |b| confidence > b.confidence) {
            best = Some(DetectedIntent { intent, confidence });
        }
    }
    best.unwrap_or(DetectedIntent { intent: Intent::General, confidence: 0.5 })
}

pub fn intent_boost(intent: Intent, doc: &Document, schema: &Schema) -> f64 {
    match intent {
        Intent::Comparison => match doc.field(&schema.description) {
            Some(desc) if desc.chars().count() > 100 => 0.1,
            _ => 0.0,
        },
        Intent::Specification => {
            let desc = doc.field_or_empty(&schema.description).to_lowercase();
            let tech = INTENT_TECH_TERMS.iter().filter(|t| desc.contains(*t)).count();
            (tech as f64 * 0.02).min(0.1)
        }
        Intent::Brand if doc.has(&schema.brand) => 0.05,
        _ => 0.0,
    }
}

fn word_pattern(word: &str) -> Option<Regex> {
    RegexBuilder::new(&format!(r"\b{}\b", regex::escape(word))).case_insensitive(true).build().ok()
}

/// Every field value with whole-word query matches wrapped in `<mark>`.
pub fn highlight(doc: &Document, query_words: &HashSet<String>) -> BTreeMap<String, String> {
    let mut words: Vec<&String> = query_words.iter().collect();
    words.sort();
    let patterns: Vec<(&str, Regex)> =
        words.into_iter().filter_map(|w| word_pattern(w).map(|re| (w.as_str(), re))).collect();
    doc.fields
        .iter()
        .map(|(key, value)| {
            let lowered = value.to_lowercase();
            let mut text = value.clone();
            for (word, re) in &patterns {
                if lowered.contains(word) {
                    text = re.replace_all(&text, format!("<mark>{word}</mark>").as_str()).into_owned();
                }
            }
            (key.clone(), text)
        })
        .collect()
}

/// The sentence of the description (or name) mentioning the most query words,
/// trimmed to 150 characters.
pub fn snippet(doc: &Document, schema: &Schema, query_words: &HashSet<String>) -> String {
    let Some(source) = doc.field(&schema.description).or_else(|| doc.field(&schema.name)) else {
        return NO_SNIPPET.to_string();
    };
    let sentences: Vec<&str> = source.split('.').collect();
    let mut best = "";
    let mut best_hits = 0;
    for sentence in &sentences {
        let lowered = sentence.to_lowercase();
        let hits = query_words.iter().filter(|w| lowered.contains(w.as_str())).count();
        if hits > best_hits {
            best_hits = hits;
            best = sentence.trim();
        }
    }
    if best.is_empty() {
        best = sentences.first().map_or(source, |s| s.trim());
    }
    if best.chars().count() > SNIPPET_MAX_CHARS {
        let cut: String = best.chars().take(SNIPPET_MAX_CHARS - 3).collect();
        format!("{cut}...")
    } else {
        best.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tokenizer::token_set;

    fn processor() -> QueryProcessor {
        QueryProcessor::new(FuzzyMatcher::new(0.6), 0.9)
    }

    #[test]
    fn table_corrections_and_synonyms() {
        let p = processor().process("Blutooth");
        assert_eq!(p.text, "bluetooth wireless bt");
        assert_eq!(p.corrections, vec![("blutooth".to_string(), "bluetooth".to_string())]);
    }

    #[test]
    fn multi_word_queries_get_one_synonym() {
        assert_eq!(processor().process("phone case").text, "phone mobile case cover");
        assert_eq!(processor().process("a b phone c").text, "a b phone c");
    }

    #[test]
    fn fuzzy_correction_needs_long_close_words() {
        assert_eq!(processor().process("headphonee").text, "headphone earphone earbud");
        assert_eq!(processor().process("lapto").text, "laptop notebook computer");
        assert_eq!(processor().process("speaker").text, "speaker");
        assert_eq!(processor().process("cam").text, "cam");
    }

    #[test]
    fn intent_detection() {
        assert_eq!(detect_intent("samsung vs apple").intent, Intent::Comparison);
        assert_eq!(detect_intent("phone specs").intent, Intent::Specification);
        let general = detect_intent("speaker");
        assert_eq!(general.intent, Intent::General);
        assert_eq!(general.confidence, 0.5);
    }

    #[test]
    fn highlights_whole_words_only() {
        let doc = Document::new("1").with_field("Name", "Bluetooth Speaker").with_field("Type", "Bluetoothish");
        let marks = highlight(&doc, &token_set("bluetooth"));
        assert_eq!(marks["Name"], "<mark>bluetooth</mark> Speaker");
        assert_eq!(marks["Type"], "Bluetoothish");
    }

    #[test]
    fn snippet_prefers_matching_sentence() {
        let schema = Schema::default();
        let doc = Document::new("1").with_field("Sales Package", "1 Speaker. USB charging cable. Manual");
        assert_eq!(snippet(&doc, &schema, &token_set("cable")), "USB charging cable");
        assert_eq!(snippet(&doc, &schema, &token_set("zzz")), "1 Speaker");
        assert_eq!(snippet(&Document::new("2"), &schema, &token_set("x")), NO_SNIPPET);
        let long = Document::new("3").with_field("Name", "x".repeat(200));
        assert_eq!(snippet(&long, &schema, &token_set("y")).chars().count(), 150);
    }

    #[test]
    fn specification_boost_is_capped() {
        let schema = Schema::default();
        let doc = Document::new("1").with_field("Sales Package", "8 GB RAM, 6 inch, 50 MP, 5000 mAh, 120 Hz, 128 GB storage");
        assert_eq!(intent_boost(Intent::Specification, &doc, &schema), 0.1);
        assert_eq!(intent_boost(Intent::Price, &doc, &schema), 0.0);
    }
}
