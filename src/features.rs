// src/features.rs
//! # Feature Aggregator
//! Pure functions from (campaigns, labeled occurrences) to one
//! [`CampaignFeatures`] row per campaign, in campaign order.
//!
//! Per metaphor type: confirmed count, distinct keywords, salience,
//! first instantiation, productivity. Per campaign: dominant metaphor.

use metrics::counter;
use rayon::prelude::*;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use tracing::{debug, warn};

use crate::campaign::{safe_ratio, Campaign, CampaignProfile, TextStats};
use crate::config::{FirstInstantiationScope, MetaphorConfig};
use crate::occurrence::{distinct_keywords, Occurrence, OccurrenceStore};
use crate::productivity::ProductivityScorer;
use crate::text::SentenceSplitter;

/// Written when a campaign has no confirmed occurrence (or no text).
pub const FIRST_INSTANTIATION_NONE: f64 = -1.0;

/// Features of one metaphor type inside one campaign.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TypeFeatures {
    pub metaphor_type: String,
    pub metaphor_count: usize,
    pub unique_count: usize,
    pub salience: f64,
    pub first_instantiation: f64,
    pub productivity: f64,
}

/// Which metaphor dominates a campaign by salience.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(into = "String")]
pub enum Dominant {
    Type(String),
    Both,
    Neither,
}

impl Dominant {
    /// Arg-max over saliences. Two or more types sharing a nonzero maximum
    /// give `Both`; a zero maximum gives `Neither`.
    pub fn from_saliences<'a>(saliences: impl IntoIterator<Item = (&'a str, f64)>) -> Self {
        let mut best: Option<f64> = None;
        let mut leaders: Vec<&str> = Vec::new();
        for (ty, s) in saliences {
            match best {
                Some(b) if s < b => {}
                Some(b) if s == b => leaders.push(ty),
                _ => {
                    best = Some(s);
                    leaders.clear();
                    leaders.push(ty);
                }
            }
        }
        match (best, leaders.as_slice()) {
            (Some(b), [only]) if b > 0.0 => Dominant::Type((*only).to_string()),
            (Some(b), _) if b > 0.0 => Dominant::Both,
            _ => Dominant::Neither,
        }
    }

    pub fn label(&self) -> &str {
        match self {
            Dominant::Type(t) => t,
            Dominant::Both => "both",
            Dominant::Neither => "neither",
        }
    }
}

impl fmt::Display for Dominant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl From<Dominant> for String {
    fn from(d: Dominant) -> Self {
        d.label().to_string()
    }
}

/// Everything derived for one campaign.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CampaignFeatures {
    pub campaign_id: String,
    pub stats: TextStats,
    pub profile: CampaignProfile,
    /// One entry per configured type, in config order.
    pub per_type: Vec<TypeFeatures>,
    pub dominant: Dominant,
}

impl CampaignFeatures {
    pub fn for_type(&self, metaphor_type: &str) -> Option<&TypeFeatures> {
        self.per_type
            .iter()
            .find(|t| t.metaphor_type == metaphor_type)
    }
}

/// `count / words`, 0 when there are no words.
pub fn salience(count: usize, words: usize) -> f64 {
    safe_ratio(count as f64, words as f64)
}

/// `min(location) / (chars(text) + 1)`, or -1 without locations or text.
/// Rows of unknown location are left out before calling this.
pub fn first_instantiation(
    locations: impl IntoIterator<Item = usize>,
    text: Option<&str>,
) -> f64 {
    let Some(text) = text else {
        return FIRST_INSTANTIATION_NONE;
    };
    match locations.into_iter().min() {
        Some(loc) => loc as f64 / (text.chars().count() + 1) as f64,
        None => FIRST_INSTANTIATION_NONE,
    }
}

/// Confirmed occurrences whose keyword is not found at `char_location` in the
/// text of their campaign: a sign the table was extracted from differently
/// cleaned text.
pub fn count_misaligned(campaigns: &[Campaign], store: &OccurrenceStore) -> usize {
    let texts: HashMap<&str, &str> = campaigns
        .iter()
        .filter_map(|c| Some((c.id.as_str(), c.text()?)))
        .collect();
    store
        .filter(None, None, Some(true))
        .filter(|o| {
            texts
                .get(o.campaign_id.as_str())
                .is_some_and(|t| !o.is_located_in(t))
        })
        .count()
}

pub struct FeatureAggregator<'a> {
    config: &'a MetaphorConfig,
    splitter: &'a dyn SentenceSplitter,
    scorer: &'a ProductivityScorer,
}

impl<'a> FeatureAggregator<'a> {
    pub fn new(
        config: &'a MetaphorConfig,
        splitter: &'a dyn SentenceSplitter,
        scorer: &'a ProductivityScorer,
    ) -> Self {
        Self {
            config,
            splitter,
            scorer,
        }
    }

    /// One row per campaign, same order as `campaigns`. Occurrences whose
    /// campaign is not in the table, or whose keyword is not listed under
    /// their type, are ignored.
    pub fn aggregate(
        &self,
        campaigns: &[Campaign],
        store: &OccurrenceStore,
    ) -> Vec<CampaignFeatures> {
        let confirmed = store.group_by_campaign(Some(true));

        let known: HashSet<&str> = campaigns.iter().map(|c| c.id.as_str()).collect();
        let orphans: usize = confirmed
            .iter()
            .filter(|(id, _)| !known.contains(*id))
            .map(|(_, rows)| rows.len())
            .sum();
        if orphans > 0 {
            debug!(
                orphans,
                "confirmed occurrences reference campaigns missing from the table"
            );
            counter!("features_orphan_occurrences_total").increment(orphans as u64);
        }

        let unlisted: usize = confirmed
            .iter()
            .filter(|(id, _)| known.contains(*id))
            .flat_map(|(_, rows)| rows.iter())
            .filter(|o| !self.config.lists_keyword(&o.metaphor_type, &o.keyword))
            .count();
        if unlisted > 0 {
            warn!(
                unlisted,
                "confirmed occurrences with keywords outside the configured lists skipped"
            );
            counter!("features_unlisted_keywords_total").increment(unlisted as u64);
        }

        let misaligned = count_misaligned(campaigns, store);
        if misaligned > 0 {
            warn!(
                misaligned,
                "occurrence locations do not match campaign text; clean campaigns the same \
                 way they were cleaned for extraction"
            );
            counter!("features_misaligned_occurrences_total").increment(misaligned as u64);
        }

        campaigns
            .par_iter()
            .map(|c| {
                let rows = confirmed
                    .get(c.id.as_str())
                    .map(Vec::as_slice)
                    .unwrap_or(&[]);
                self.campaign_features(c, rows)
            })
            .collect()
    }

    /// Features of a single campaign given its confirmed occurrences.
    pub fn campaign_features(
        &self,
        campaign: &Campaign,
        confirmed: &[&Occurrence],
    ) -> CampaignFeatures {
        let text = campaign.text();
        let stats = TextStats::of(text, self.splitter);

        let mut by_type: BTreeMap<&str, Vec<&Occurrence>> = BTreeMap::new();
        let counted = confirmed.iter().copied().filter(|o| {
            o.is_confirmed() && self.config.lists_keyword(&o.metaphor_type, &o.keyword)
        });
        for o in counted {
            by_type.entry(o.metaphor_type.as_str()).or_default().push(o);
        }
        let any_type_first = first_instantiation(
            by_type.values().flatten().filter_map(|o| o.char_location),
            text,
        );

        let per_type: Vec<TypeFeatures> = self
            .config
            .type_names()
            .into_iter()
            .map(|ty| {
                let rows = by_type.get(ty).map(Vec::as_slice).unwrap_or(&[]);
                let first = match self.config.scoring.first_instantiation {
                    FirstInstantiationScope::PerType => {
                        first_instantiation(rows.iter().filter_map(|o| o.char_location), text)
                    }
                    FirstInstantiationScope::AnyType => any_type_first,
                };
                TypeFeatures {
                    metaphor_type: ty.to_string(),
                    metaphor_count: rows.len(),
                    unique_count: distinct_keywords(rows.iter().copied()),
                    salience: salience(rows.len(), stats.words),
                    first_instantiation: first,
                    productivity: self.scorer.score(ty, rows.iter().copied()),
                }
            })
            .collect();

        let dominant = Dominant::from_saliences(
            per_type
                .iter()
                .map(|t| (t.metaphor_type.as_str(), t.salience)),
        );

        CampaignFeatures {
            campaign_id: campaign.id.clone(),
            stats,
            profile: CampaignProfile::of(campaign),
            per_type,
            dominant,
        }
    }
}
