// src/campaign.rs
//! Campaign records, text statistics and outcome-derived profile columns.
//!
//! Campaigns are read once and never mutated; anything derived from them is
//! built into a new record.

use chrono::{DateTime, Datelike};
use serde::Serialize;

use crate::text::{self, SentenceSplitter, TextCleaner};

const SECS_PER_DAY: f64 = 86_400.0;

const CANCER_TYPES: [&str; 18] = [
    "breast cancer",
    "lung cancer",
    "leukemia",
    "prostate cancer",
    "melanoma",
    "lymphoma",
    "bone cancer",
    "skin cancer",
    "bladder cancer",
    "kidney cancer",
    "brain cancer",
    "liver cancer",
    "pancreatic cancer",
    "testicular cancer",
    "colon cancer",
    "cervical cancer",
    "esophageal cancer",
    "neuroblastoma",
];

/// One fundraising campaign. Only `id` and `text` matter to the scoring
/// engine; the outcome fields feed [`CampaignProfile`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Campaign {
    pub id: String,
    pub text: Option<String>,
    pub name: Option<String>,
    pub blurb: Option<String>,
    pub url: Option<String>,
    pub goal: Option<f64>,
    pub pledged: Option<f64>,
    pub usd_pledged: Option<f64>,
    pub backers: Option<f64>,
    /// Unix seconds.
    pub launched: Option<i64>,
    /// Unix seconds.
    pub deadline: Option<i64>,
    pub category: Option<String>,
    pub geo_country: Option<String>,
    pub geo_type: Option<String>,
}

impl Campaign {
    pub fn new(id: impl Into<String>, text: Option<&str>) -> Self {
        Self {
            id: id.into(),
            text: text.and_then(text_cell),
            ..Default::default()
        }
    }

    /// Narrative body, `None` when absent or blank.
    pub fn text(&self) -> Option<&str> {
        self.text.as_deref().filter(|t| !t.trim().is_empty())
    }

    /// New record with the text run through `cleaner`.
    pub fn cleaned(&self, cleaner: &dyn TextCleaner) -> Self {
        Self {
            text: self.text().map(|t| cleaner.clean(t)),
            ..self.clone()
        }
    }
}

/// Stable id for a campaign scraped from `url`: first 16 bytes of SHA-256, hex.
pub fn campaign_id_from_url(url: &str) -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(url.trim().as_bytes());
    let digest = hasher.finalize();
    let mut out = String::with_capacity(32);
    for b in digest.iter().take(16) {
        use std::fmt::Write as _;
        let _ = write!(&mut out, "{:02x}", b);
    }
    out
}

/// Interpret a raw table cell as optional text. Blank cells and the
/// `nan`/`None`/`null` markers left by dataframe exports mean "no text".
pub fn text_cell(raw: &str) -> Option<String> {
    let t = raw.trim();
    if t.is_empty() || matches!(t, "nan" | "NaN" | "None" | "null" | "NULL") {
        None
    } else {
        Some(raw.to_string())
    }
}

/// `num / den`, or 0 when the result would be undefined.
pub fn safe_ratio(num: f64, den: f64) -> f64 {
    if den == 0.0 || !den.is_finite() || !num.is_finite() {
        0.0
    } else {
        num / den
    }
}

/// Length statistics of a campaign's text. All zero when there is no text.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TextStats {
    pub chars: usize,
    pub words: usize,
    pub sentences: usize,
}

impl TextStats {
    pub fn of(text: Option<&str>, splitter: &dyn SentenceSplitter) -> Self {
        match text {
            Some(t) => Self {
                chars: t.chars().count(),
                words: text::word_count(t),
                sentences: splitter.count(t),
            },
            None => Self::default(),
        }
    }
}

/// Outcome-derived columns joined next to the metaphor features.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CampaignProfile {
    pub mean_donation: f64,
    pub pledged_to_goal: f64,
    pub duration_days: Option<f64>,
    pub launch_month: Option<u32>,
    /// Monday = 0.
    pub launch_day_of_week: Option<u32>,
    pub launch_year: Option<i32>,
    pub from_us: bool,
    pub from_town: bool,
    pub parent_category: Option<String>,
    pub blurb_length_words: usize,
    pub cancer_type: String,
}

impl CampaignProfile {
    pub fn of(c: &Campaign) -> Self {
        let mean_donation = match (c.usd_pledged, c.backers) {
            (Some(p), Some(b)) => safe_ratio(p, b),
            _ => 0.0,
        };
        let pledged_to_goal = match (c.pledged, c.goal) {
            (Some(p), Some(g)) => safe_ratio(p, g),
            _ => 0.0,
        };
        let duration_days = match (c.launched, c.deadline) {
            (Some(l), Some(d)) => Some((d - l) as f64 / SECS_PER_DAY),
            _ => None,
        };
        let launch = c.launched.and_then(|ts| DateTime::from_timestamp(ts, 0));

        Self {
            mean_donation,
            pledged_to_goal,
            duration_days,
            launch_month: launch.map(|d| d.month()),
            launch_day_of_week: launch.map(|d| d.weekday().num_days_from_monday()),
            launch_year: launch.map(|d| d.year()),
            from_us: c.geo_country.as_deref().map(str::trim) == Some("US"),
            from_town: c.geo_type.as_deref().map(str::trim) == Some("Town"),
            parent_category: c.category.as_deref().map(parent_category),
            blurb_length_words: c.blurb.as_deref().map(text::word_count).unwrap_or(0),
            cancer_type: cancer_type(c.text()),
        }
    }
}

/// `"Technology/Gadgets"` → `"Technology"`.
pub fn parent_category(tag: &str) -> String {
    tag.split('/').next().unwrap_or(tag).trim().to_string()
}

/// `unknown` without text, `general` when no cancer type is named, the single
/// named type, or `mixed` when several are.
pub fn cancer_type(text: Option<&str>) -> String {
    let Some(t) = text else {
        return "unknown".to_string();
    };
    let lower = t.to_lowercase();
    let found: Vec<&str> = CANCER_TYPES
        .iter()
        .copied()
        .filter(|ct| lower.contains(ct))
        .collect();
    match found.as_slice() {
        [] => "general".to_string(),
        [one] => (*one).to_string(),
        _ => "mixed".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::text::UnicodeSentenceSplitter;

    #[test]
    fn url_ids_are_stable_and_short() {
        let a = campaign_id_from_url("https://www.kickstarter.com/projects/1/x");
        let b = campaign_id_from_url(" https://www.kickstarter.com/projects/1/x ");
        assert_eq!(a, b);
        assert_eq!(a.len(), 32);
        assert_ne!(a, campaign_id_from_url("https://www.gofundme.com/f/x"));
    }

    #[test]
    fn missing_text_markers() {
        assert_eq!(text_cell("nan"), None);
        assert_eq!(text_cell("  "), None);
        assert_eq!(text_cell("Hope"), Some("Hope".to_string()));
        assert_eq!(Campaign::new("1", Some("NaN")).text(), None);
    }

    #[test]
    fn stats_for_missing_text_are_zero() {
        let s = TextStats::of(None, &UnicodeSentenceSplitter);
        assert_eq!(s, TextStats::default());
        let s = TextStats::of(Some("Mom is brave. She will win."), &UnicodeSentenceSplitter);
        assert_eq!(s.words, 6);
        assert_eq!(s.sentences, 2);
        assert_eq!(s.chars, 27);
    }

    #[test]
    fn profile_guards_and_dates() {
        let c = Campaign {
            id: "7".into(),
            usd_pledged: Some(500.0),
            backers: Some(0.0),
            pledged: Some(500.0),
            goal: Some(1000.0),
            // 2020-01-06 (Monday) and ten days later
            launched: Some(1_578_268_800),
            deadline: Some(1_578_268_800 + 10 * 86_400),
            category: Some("Health/Cancer".into()),
            geo_country: Some("US".into()),
            geo_type: Some("County".into()),
            blurb: Some("Help Dad beat it".into()),
            ..Default::default()
        };
        let p = CampaignProfile::of(&c);
        assert_eq!(p.mean_donation, 0.0);
        assert!((p.pledged_to_goal - 0.5).abs() < 1e-12);
        assert_eq!(p.duration_days, Some(10.0));
        assert_eq!(p.launch_month, Some(1));
        assert_eq!(p.launch_day_of_week, Some(0));
        assert_eq!(p.launch_year, Some(2020));
        assert!(p.from_us);
        assert!(!p.from_town);
        assert_eq!(p.parent_category.as_deref(), Some("Health"));
        assert_eq!(p.blurb_length_words, 4);
        assert_eq!(p.cancer_type, "unknown");
    }

    #[test]
    fn cancer_type_classes() {
        assert_eq!(cancer_type(Some("She has Breast Cancer")), "breast cancer");
        assert_eq!(cancer_type(Some("leukemia then lymphoma")), "mixed");
        assert_eq!(cancer_type(Some("a hard year")), "general");
        assert_eq!(cancer_type(None), "unknown");
    }
}
