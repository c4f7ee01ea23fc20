// src/evaluate.rs
//! How well raw keyword matching predicts human metaphor labels.

use serde::Serialize;
use std::collections::BTreeMap;

use crate::occurrence::OccurrenceStore;

/// Smoothing on both sides of every rate, so empty classes give 1.0 rather
/// than NaN.
pub const EPS: f64 = 1e-7;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DetectionRates {
    pub true_positive: f64,
    pub true_negative: f64,
    pub false_positive: f64,
    pub false_negative: f64,
}

impl DetectionRates {
    /// `truth` and `pred` are paired counts per item; an item is positive when
    /// its count is above zero.
    pub fn from_counts(truth: &[usize], pred: &[usize]) -> Self {
        let mut pos = 0usize;
        let mut neg = 0usize;
        let (mut tp, mut tn, mut fp, mut fn_) = (0usize, 0usize, 0usize, 0usize);
        for (&t, &p) in truth.iter().zip(pred) {
            match (t > 0, p > 0) {
                (true, true) => tp += 1,
                (true, false) => fn_ += 1,
                (false, true) => fp += 1,
                (false, false) => tn += 1,
            }
            if t > 0 {
                pos += 1;
            } else {
                neg += 1;
            }
        }
        let rate = |n: usize, d: usize| (n as f64 + EPS) / (d as f64 + EPS);
        Self {
            true_positive: rate(tp, pos),
            true_negative: rate(tn, neg),
            false_positive: rate(fp, neg),
            false_negative: rate(fn_, pos),
        }
    }
}

/// Rates for one metaphor type over every campaign that has at least one
/// occurrence in `store`: prediction is the raw match count, truth the
/// confirmed count.
pub fn matcher_rates(store: &OccurrenceStore, metaphor_type: &str) -> DetectionRates {
    let mut per_campaign: BTreeMap<&str, (usize, usize)> = BTreeMap::new();
    for o in store.iter() {
        let entry = per_campaign.entry(o.campaign_id.as_str()).or_default();
        if o.metaphor_type == metaphor_type {
            entry.1 += 1;
            if o.is_confirmed() {
                entry.0 += 1;
            }
        }
    }
    let (truth, pred): (Vec<usize>, Vec<usize>) = per_campaign.into_values().unzip();
    DetectionRates::from_counts(&truth, &pred)
}

/// Non-overlapping substring hits of every phrase in lowercased `text`.
pub fn count_key_phrases<S: AsRef<str>>(text: &str, phrases: &[S]) -> usize {
    let lower = text.to_lowercase();
    phrases
        .iter()
        .map(|p| p.as_ref())
        .filter(|p| !p.is_empty())
        .map(|p| lower.matches(p).count())
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::occurrence::Occurrence;

    fn occ(id: &str, ty: &str, label: Option<bool>) -> Occurrence {
        Occurrence {
            campaign_id: id.into(),
            keyword: "kw".into(),
            metaphor_type: ty.into(),
            start_offset: 0,
            end_offset: 2,
            char_location: Some(0),
            before: String::new(),
            current: String::new(),
            next: String::new(),
            metaphorical: label,
        }
    }

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-6
    }

    #[test]
    fn rates_from_counts() {
        let truth = [1, 0, 2, 0, 0];
        let pred = [3, 1, 0, 0, 0];
        let r = DetectionRates::from_counts(&truth, &pred);
        assert!(close(r.true_positive, 0.5));
        assert!(close(r.false_negative, 0.5));
        assert!(close(r.true_negative, 2.0 / 3.0));
        assert!(close(r.false_positive, 1.0 / 3.0));
    }

    #[test]
    fn empty_classes_smooth_to_one() {
        let r = DetectionRates::from_counts(&[], &[]);
        assert_eq!(r.true_positive, 1.0);
        assert_eq!(r.false_positive, 1.0);
    }

    #[test]
    fn matcher_rates_from_store() {
        let store = OccurrenceStore::from_vec(vec![
            occ("a", "battle", Some(true)),
            occ("b", "battle", Some(false)),
            occ("c", "journey", Some(true)),
        ]);
        // battle: a (truth 1, pred 1), b (0, 1), c (0, 0)
        let r = matcher_rates(&store, "battle");
        assert!(close(r.true_positive, 1.0));
        assert!(close(r.false_positive, 0.5));
        assert!(close(r.true_negative, 0.5));
    }

    #[test]
    fn phrase_counts_are_case_insensitive_substrings() {
        let n = count_key_phrases("We FIGHT, we fought, we go through the fighting.", &[
            "fight",
            "go through",
        ]);
        assert_eq!(n, 3);
    }
}
