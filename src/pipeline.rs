// src/pipeline.rs
//! Batch stages: campaigns → occurrence store → per-campaign features.
//!
//! Each stage is fully materialized before the next one starts. Per-campaign
//! work runs on rayon; output order always follows input order.

use anyhow::Result;
use metrics::{counter, describe_counter};
use once_cell::sync::OnceCell;
use rayon::prelude::*;
use std::borrow::Cow;
use std::sync::Arc;
use tracing::{debug, info};

use crate::campaign::Campaign;
use crate::config::MetaphorConfig;
use crate::features::{CampaignFeatures, FeatureAggregator};
use crate::matcher::KeywordMatcher;
use crate::occurrence::{Occurrence, OccurrenceStore};
use crate::productivity::{ProductivityScorer, RarityWeights};
use crate::text::{SentenceSplitter, TextCleaner, UnicodeSentenceSplitter};

/// One-time metrics registration.
pub(crate) fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!(
            "occurrences_extracted_total",
            "Keyword occurrences produced by extraction."
        );
        describe_counter!(
            "campaigns_without_text_total",
            "Campaigns scanned with missing or blank text."
        );
        describe_counter!(
            "features_orphan_occurrences_total",
            "Confirmed occurrences whose campaign is not in the table."
        );
        describe_counter!(
            "productivity_unmapped_keywords_total",
            "Confirmed keywords skipped because the weight map has no entry."
        );
        describe_counter!(
            "features_unlisted_keywords_total",
            "Confirmed occurrences skipped because their keyword is not listed under their type."
        );
        describe_counter!(
            "features_misaligned_occurrences_total",
            "Confirmed occurrences whose location does not point at their keyword in the campaign text."
        );
    });
}

pub struct Pipeline {
    config: MetaphorConfig,
    matcher: KeywordMatcher,
    splitter: Arc<dyn SentenceSplitter>,
    cleaner: Option<Arc<dyn TextCleaner>>,
}

impl Pipeline {
    pub fn new(config: MetaphorConfig) -> Result<Self> {
        let splitter: Arc<dyn SentenceSplitter> = Arc::new(UnicodeSentenceSplitter);
        let matcher = KeywordMatcher::new(&config)?.with_splitter(splitter.clone());
        Ok(Self {
            config,
            matcher,
            splitter,
            cleaner: None,
        })
    }

    /// Use `splitter` for both context windows and sentence counts.
    pub fn with_splitter(mut self, splitter: Arc<dyn SentenceSplitter>) -> Self {
        self.matcher = self.matcher.with_splitter(splitter.clone());
        self.splitter = splitter;
        self
    }

    /// Clean campaign text before both stages.
    pub fn with_cleaner(mut self, cleaner: Arc<dyn TextCleaner>) -> Self {
        self.cleaner = Some(cleaner);
        self
    }

    pub fn config(&self) -> &MetaphorConfig {
        &self.config
    }

    /// Campaigns as the stages see them: cleaned copies when a cleaner is set.
    pub fn prepare<'c>(&self, campaigns: &'c [Campaign]) -> Cow<'c, [Campaign]> {
        match &self.cleaner {
            Some(cleaner) => Cow::Owned(
                campaigns
                    .par_iter()
                    .map(|c| c.cleaned(cleaner.as_ref()))
                    .collect(),
            ),
            None => Cow::Borrowed(campaigns),
        }
    }

    /// Scan every campaign and collect all occurrences, unlabeled.
    pub fn extract(&self, campaigns: &[Campaign]) -> OccurrenceStore {
        ensure_metrics_described();
        let campaigns = self.prepare(campaigns);

        let per_campaign: Vec<(Vec<Occurrence>, bool)> = campaigns
            .par_iter()
            .map(|c| {
                let found: Vec<Occurrence> = self.matcher.scan(&c.id, c.text()).collect();
                (found, c.text().is_none())
            })
            .collect();

        let mut store = OccurrenceStore::new();
        let mut without_text = 0usize;
        for (found, missing) in per_campaign {
            if missing {
                without_text += 1;
            }
            store.extend(found);
        }
        let removed = store.dedup();
        if removed > 0 {
            debug!(removed, "duplicate occurrences dropped");
        }

        counter!("occurrences_extracted_total").increment(store.len() as u64);
        counter!("campaigns_without_text_total").increment(without_text as u64);
        info!(
            campaigns = campaigns.len(),
            occurrences = store.len(),
            without_text,
            "extraction finished"
        );
        store
    }

    /// Rarity weights for scoring: the configured fixed tables if present,
    /// otherwise derived from the whole labeled `store`.
    pub fn weights(&self, store: &OccurrenceStore) -> RarityWeights {
        match self.config.fixed_weights() {
            Some(fixed) => RarityWeights::from_fixed(fixed.clone()),
            None => RarityWeights::from_corpus(store, self.config.scoring.rarity_exponent),
        }
    }

    /// One feature row per campaign, same order as `campaigns`.
    pub fn features(
        &self,
        campaigns: &[Campaign],
        store: &OccurrenceStore,
    ) -> Vec<CampaignFeatures> {
        ensure_metrics_described();
        let campaigns = self.prepare(campaigns);

        // Weights come from the complete store before any campaign is scored.
        let scorer = ProductivityScorer::new(self.weights(store), self.config.scoring.productivity);
        let aggregator = FeatureAggregator::new(&self.config, self.splitter.as_ref(), &scorer);
        let rows = aggregator.aggregate(&campaigns, store);

        info!(
            campaigns = rows.len(),
            confirmed = store.filter(None, None, Some(true)).count(),
            "features computed"
        );
        rows
    }
}
