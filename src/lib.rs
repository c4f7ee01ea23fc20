// src/lib.rs
// Public library surface for the binary and integration tests.

pub mod campaign;
pub mod config;
pub mod corrections;
pub mod evaluate;
pub mod features;
pub mod matcher;
pub mod occurrence;
pub mod pipeline;
pub mod productivity;
pub mod table;
pub mod text;

// ---- Re-exports for stable public API ----
pub use crate::campaign::{Campaign, CampaignProfile, TextStats};
pub use crate::config::{KeywordList, MetaphorConfig, ScoringOptions};
pub use crate::features::{CampaignFeatures, Dominant, FeatureAggregator, TypeFeatures};
pub use crate::matcher::KeywordMatcher;
pub use crate::occurrence::{Occurrence, OccurrenceStore};
pub use crate::pipeline::Pipeline;
pub use crate::productivity::{ProductivityScorer, RarityWeights};
