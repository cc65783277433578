//! Approximate term matching.
//!
//! Three similarity metrics are computed for every candidate and the best one
//! wins: a Ratcliff/Obershelp alignment ratio, Jaro similarity and a
//! normalised Levenshtein similarity.

use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FuzzyMatch {
    pub original_term: String,
    pub matched_term: String,
    pub similarity: f64,
}

#[derive(Debug, Clone, Copy)]
pub struct FuzzyMatcher {
    threshold: f64,
}

impl Default for FuzzyMatcher {
    fn default() -> Self {
        Self::new(0.7)
    }
}

impl FuzzyMatcher {
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Candidates from `corpus` at or above the threshold, best first.
    /// Terms equal to `term` (ignoring case) are skipped.
    pub fn find_matches<S: AsRef<str>>(&self, term: &str, corpus: &[S], max_results: usize) -> Vec<FuzzyMatch> {
        let query: Vec<char> = term.to_lowercase().chars().collect();
        let mut matches: Vec<FuzzyMatch> = corpus
            .iter()
            .filter_map(|candidate| {
                let candidate = candidate.as_ref();
                let lowered: Vec<char> = candidate.to_lowercase().chars().collect();
                if lowered == query {
                    return None;
                }
                let similarity = best_similarity(&query, &lowered);
                (similarity >= self.threshold).then(|| FuzzyMatch {
                    original_term: term.to_string(),
                    matched_term: candidate.to_string(),
                    similarity,
                })
            })
            .collect();
        matches.sort_by(|a, b| b.similarity.partial_cmp(&a.similarity).unwrap_or(std::cmp::Ordering::Equal));
        matches.truncate(max_results);
        matches
    }
}

/// Case-insensitive similarity in [0, 1]; the maximum of the three metrics.
pub fn similarity(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.to_lowercase().chars().collect();
    let b: Vec<char> = b.to_lowercase().chars().collect();
    best_similarity(&a, &b)
}

fn best_similarity(a: &[char], b: &[char]) -> f64 {
    sequence_ratio(a, b).max(jaro(a, b)).max(levenshtein_similarity(a, b))
}

/// `2 * M / (len(a) + len(b))` where `M` is the number of characters in the
/// recursively found longest common blocks.
pub fn sequence_ratio(a: &[char], b: &[char]) -> f64 {
    let total = a.len() + b.len();
    if total == 0 {
        return 1.0;
    }
    let mut matched = 0;
    let mut pending = vec![(0, a.len(), 0, b.len())];
    while let Some((alo, ahi, blo, bhi)) = pending.pop() {
        let (i, j, k) = longest_block(a, b, alo, ahi, blo, bhi);
        if k == 0 {
            continue;
        }
        matched += k;
        if alo < i && blo < j {
            pending.push((alo, i, blo, j));
        }
        if i + k < ahi && j + k < bhi {
            pending.push((i + k, ahi, j + k, bhi));
        }
    }
    2.0 * matched as f64 / total as f64
}

/// Longest common run of `a[alo..ahi]` and `b[blo..bhi]`; earliest in `a`, then in `b`, on ties.
fn longest_block(a: &[char], b: &[char], alo: usize, ahi: usize, blo: usize, bhi: usize) -> (usize, usize, usize) {
    let mut best = (alo, blo, 0);
    let mut prev = vec![0usize; b.len() + 1];
    for i in alo..ahi {
        let mut cur = vec![0usize; b.len() + 1];
        for j in blo..bhi {
            if a[i] == b[j] {
                let k = prev[j] + 1;
                cur[j + 1] = k;
                if k > best.2 {
                    best = (i + 1 - k, j + 1 - k, k);
                }
            }
        }
        prev = cur;
    }
    best
}

pub fn jaro(a: &[char], b: &[char]) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let window = (a.len().max(b.len()) / 2).saturating_sub(1);
    let mut a_matched = vec![false; a.len()];
    let mut b_matched = vec![false; b.len()];
    let mut matches = 0usize;

    for i in 0..a.len() {
        let start = i.saturating_sub(window);
        let end = (i + window + 1).min(b.len());
        for j in start..end {
            if b_matched[j] || a[i] != b[j] {
                continue;
            }
            a_matched[i] = true;
            b_matched[j] = true;
            matches += 1;
            break;
        }
    }
    if matches == 0 {
        return 0.0;
    }

    let mut half_transpositions = 0usize;
    let mut k = 0usize;
    for i in 0..a.len() {
        if !a_matched[i] {
            continue;
        }
        while !b_matched[k] {
            k += 1;
        }
        if a[i] != b[k] {
            half_transpositions += 1;
        }
        k += 1;
    }

    let m = matches as f64;
    let t = half_transpositions as f64 / 2.0;
    (m / a.len() as f64 + m / b.len() as f64 + (m - t) / m) / 3.0
}

/// Classic edit distance with unit costs.
pub fn levenshtein(a: &[char], b: &[char]) -> usize {
    let (long, short) = if a.len() >= b.len() { (a, b) } else { (b, a) };
    if short.is_empty() {
        return long.len();
    }
    let mut previous: Vec<usize> = (0..=short.len()).collect();
    for (i, c1) in long.iter().enumerate() {
        let mut current = Vec::with_capacity(short.len() + 1);
        current.push(i + 1);
        for (j, c2) in short.iter().enumerate() {
            let insertion = previous[j + 1] + 1;
            let deletion = current[j] + 1;
            let substitution = previous[j] + usize::from(c1 != c2);
            current.push(insertion.min(deletion).min(substitution));
        }
        previous = current;
    }
    previous[short.len()]
}

/// `1 - distance / max(len)`; two empty strings are identical.
pub fn levenshtein_similarity(a: &[char], b: &[char]) -> f64 {
    let max_len = a.len().max(b.len());
    if max_len == 0 {
        return 1.0;
    }
    1.0 - levenshtein(a, b) as f64 / max_len as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chars(s: &str) -> Vec<char> {
        s.chars().collect()
    }

    #[test]
    fn identical_strings_are_fully_similar() {
        for s in ["", "a", "bluetooth", "Ünïcode"] {
            assert_eq!(similarity(s, s), 1.0);
        }
    }

    #[test]
    fn typo_matches_single_candidate() {
        let matcher = FuzzyMatcher::new(0.6);
        let found = matcher.find_matches("bluetoth", &["bluetooth", "car", "house"], 10);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].matched_term, "bluetooth");
        assert!(found[0].similarity > 0.8);
    }

    #[test]
    fn self_matches_are_excluded() {
        let matcher = FuzzyMatcher::new(0.0);
        let found = matcher.find_matches("Phone", &["phone", "PHONE", "phones"], 10);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].matched_term, "phones");
    }

    #[test]
    fn results_are_sorted_and_truncated() {
        let matcher = FuzzyMatcher::new(0.5);
        let found = matcher.find_matches("camera", &["camra", "cameras", "camel", "zzz"], 2);
        assert_eq!(found.len(), 2);
        assert!(found[0].similarity >= found[1].similarity);
    }

    #[test]
    fn jaro_reference_values() {
        assert!((jaro(&chars("martha"), &chars("marhta")) - 0.944444).abs() < 1e-5);
        assert_eq!(jaro(&chars("abc"), &chars("xyz")), 0.0);
        assert_eq!(jaro(&chars(""), &chars("a")), 0.0);
    }

    #[test]
    fn edit_distance_reference_values() {
        assert_eq!(levenshtein(&chars("kitten"), &chars("sitting")), 3);
        assert_eq!(levenshtein(&chars(""), &chars("abc")), 3);
        assert!((levenshtein_similarity(&chars("kitten"), &chars("sitting")) - (1.0 - 3.0 / 7.0)).abs() < 1e-12);
    }

    #[test]
    fn alignment_ratio_reference_values() {
        assert!((sequence_ratio(&chars("abcd"), &chars("bcde")) - 0.75).abs() < 1e-12);
        assert_eq!(sequence_ratio(&chars(""), &chars("")), 1.0);
    }
}
