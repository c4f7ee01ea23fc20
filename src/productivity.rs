// src/productivity.rs
//! Rarity-weighted productivity.
//!
//! Weight of keyword `k` in a type with `N` confirmed occurrences, `f(k)` of
//! them being `k`:
//!
//! ```text
//! weight(k) = (N / f(k))^r / min_j (N / f(j))^r
//! ```
//!
//! The most frequent keyword of a type weighs 1.0, rarer ones more. A
//! campaign's productivity for a type is `Σ weight(k) * count(k)` over its
//! confirmed occurrences (optionally divided by its own count).

use metrics::counter;
use std::collections::BTreeMap;
use tracing::warn;

use crate::config::ProductivityNormalization;
use crate::occurrence::{Occurrence, OccurrenceStore};

/// Confirmed keyword counts per type over the whole store.
pub fn keyword_frequencies(store: &OccurrenceStore) -> BTreeMap<String, BTreeMap<String, usize>> {
    let mut freq: BTreeMap<String, BTreeMap<String, usize>> = BTreeMap::new();
    for o in store.filter(None, None, Some(true)) {
        *freq
            .entry(o.metaphor_type.clone())
            .or_default()
            .entry(o.keyword.clone())
            .or_insert(0) += 1;
    }
    freq
}

/// Keyword weight tables, one per metaphor type.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RarityWeights {
    by_type: BTreeMap<String, BTreeMap<String, f64>>,
}

impl RarityWeights {
    /// Corpus pass: derive weights from every confirmed occurrence in `store`.
    pub fn from_corpus(store: &OccurrenceStore, exponent: f64) -> Self {
        let by_type = keyword_frequencies(store)
            .into_iter()
            .map(|(ty, counts)| (ty, weights_from_counts(&counts, exponent)))
            .collect();
        Self { by_type }
    }

    /// Frozen tables, used as given.
    pub fn from_fixed(by_type: BTreeMap<String, BTreeMap<String, f64>>) -> Self {
        Self { by_type }
    }

    pub fn weight(&self, metaphor_type: &str, keyword: &str) -> Option<f64> {
        self.by_type.get(metaphor_type)?.get(keyword).copied()
    }

    pub fn for_type(&self, metaphor_type: &str) -> Option<&BTreeMap<String, f64>> {
        self.by_type.get(metaphor_type)
    }
}

fn weights_from_counts(counts: &BTreeMap<String, usize>, exponent: f64) -> BTreeMap<String, f64> {
    let total: usize = counts.values().sum();
    let raw: BTreeMap<&str, f64> = counts
        .iter()
        .filter(|&(_, &f)| f > 0)
        .map(|(k, &f)| (k.as_str(), (total as f64 / f as f64).powf(exponent)))
        .collect();
    let min = raw.values().copied().fold(f64::INFINITY, f64::min);
    raw.into_iter()
        .map(|(k, w)| (k.to_string(), w / min))
        .collect()
}

/// Scores campaigns against a weight map built beforehand.
#[derive(Debug, Clone)]
pub struct ProductivityScorer {
    weights: RarityWeights,
    normalization: ProductivityNormalization,
}

impl ProductivityScorer {
    pub fn new(weights: RarityWeights, normalization: ProductivityNormalization) -> Self {
        Self {
            weights,
            normalization,
        }
    }

    /// Productivity of `metaphor_type` over one campaign's occurrences. Only
    /// confirmed rows of that type count; keywords without a weight are
    /// skipped.
    pub fn score<'a>(
        &self,
        metaphor_type: &str,
        occurrences: impl IntoIterator<Item = &'a Occurrence>,
    ) -> f64 {
        let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
        for o in occurrences {
            if o.is_confirmed() && o.metaphor_type == metaphor_type {
                *counts.entry(o.keyword.as_str()).or_insert(0) += 1;
            }
        }
        if counts.is_empty() {
            return 0.0;
        }

        let mut sum = 0.0;
        for (kw, &n) in &counts {
            match self.weights.weight(metaphor_type, kw) {
                Some(w) => sum += w * n as f64,
                None => {
                    warn!(metaphor_type, keyword = %kw, "keyword missing from weight map, skipped");
                    counter!("productivity_unmapped_keywords_total").increment(n as u64);
                }
            }
        }

        match self.normalization {
            ProductivityNormalization::RawSum => sum,
            ProductivityNormalization::MeanNormalized => {
                let total: usize = counts.values().sum();
                sum / total as f64
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn confirmed(id: &str, kw: &str, ty: &str) -> Occurrence {
        Occurrence {
            campaign_id: id.into(),
            keyword: kw.into(),
            metaphor_type: ty.into(),
            start_offset: 0,
            end_offset: kw.chars().count(),
            char_location: Some(0),
            before: String::new(),
            current: kw.into(),
            next: String::new(),
            metaphorical: Some(true),
        }
    }

    // fight x4, battle x2, war x1 (battle type); path x1 (journey type)
    fn corpus() -> OccurrenceStore {
        let mut rows = Vec::new();
        for _ in 0..4 {
            rows.push(confirmed("a", "fight", "battle"));
        }
        rows.push(confirmed("b", "battle", "battle"));
        rows.push(confirmed("b", "battle", "battle"));
        rows.push(confirmed("c", "war", "battle"));
        rows.push(confirmed("c", "path", "journey"));
        let mut rejected = confirmed("c", "enemy", "battle");
        rejected.metaphorical = Some(false);
        rows.push(rejected);
        OccurrenceStore::from_vec(rows)
    }

    #[test]
    fn rarer_keywords_weigh_more() {
        let w = RarityWeights::from_corpus(&corpus(), 0.4);
        let fight = w.weight("battle", "fight").unwrap();
        let battle = w.weight("battle", "battle").unwrap();
        let war = w.weight("battle", "war").unwrap();
        assert!((fight - 1.0).abs() < 1e-12);
        assert!(war > battle && battle > fight);
        // (7/2)^0.4 / (7/4)^0.4 = 2^0.4
        assert!((battle - 2f64.powf(0.4)).abs() < 1e-12);
        assert_eq!(w.weight("battle", "enemy"), None);
        assert_eq!(w.weight("journey", "path"), Some(1.0));
    }

    #[test]
    fn zero_exponent_is_uniform() {
        let w = RarityWeights::from_corpus(&corpus(), 0.0);
        for v in w.for_type("battle").unwrap().values() {
            assert_eq!(*v, 1.0);
        }
    }

    #[test]
    fn raw_sum_and_mean_normalized() {
        let store = corpus();
        let w = RarityWeights::from_corpus(&store, 0.4);
        let war = w.weight("battle", "war").unwrap();
        let rows: Vec<Occurrence> = vec![
            confirmed("x", "war", "battle"),
            confirmed("x", "fight", "battle"),
            confirmed("x", "fight", "battle"),
        ];

        let raw = ProductivityScorer::new(w.clone(), ProductivityNormalization::RawSum);
        assert!((raw.score("battle", &rows) - (war + 2.0)).abs() < 1e-12);
        assert_eq!(raw.score("journey", &rows), 0.0);

        let mean = ProductivityScorer::new(w, ProductivityNormalization::MeanNormalized);
        assert!((mean.score("battle", &rows) - (war + 2.0) / 3.0).abs() < 1e-12);
        assert_eq!(mean.score("journey", &rows), 0.0);
    }

    #[test]
    fn unmapped_keywords_are_skipped() {
        let mut table = BTreeMap::new();
        table.insert(
            "battle".to_string(),
            BTreeMap::from([("fight".to_string(), 1.0)]),
        );
        let scorer = ProductivityScorer::new(
            RarityWeights::from_fixed(table),
            ProductivityNormalization::RawSum,
        );
        let rows = vec![
            confirmed("x", "fight", "battle"),
            confirmed("x", "brutal", "battle"),
        ];
        assert_eq!(scorer.score("battle", &rows), 1.0);
    }
}
