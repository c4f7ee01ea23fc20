// src/corrections.rs
//! Second-opinion review of labeled occurrences.
//!
//! A random sample (with replacement) of labeled rows is shown to a
//! [`Reviewer`] again; every answer that disagrees with the stored label is
//! reported. Stored labels are never touched.

use anyhow::Result;
use rand::Rng;
use std::collections::HashMap;
use tracing::{debug, info};

use crate::campaign::Campaign;
use crate::occurrence::{Occurrence, OccurrenceStore};

/// Characters shown on each side of a match when more context is asked for.
pub const CONTEXT_RADIUS_CHARS: usize = 300;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Judgment {
    Metaphorical(bool),
    NeedsContext,
}

/// Source of fresh judgments (a person at a prompt, or a fixture in tests).
pub trait Reviewer {
    /// `context` is `None` on the first ask and carries the wider text window
    /// after the reviewer answered [`Judgment::NeedsContext`].
    fn judge(
        &mut self,
        occurrence: &Occurrence,
        campaign: &Campaign,
        context: Option<&str>,
    ) -> Result<Judgment>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Discrepancy {
    pub campaign_id: String,
    pub char_location: Option<usize>,
    pub keyword: String,
    pub stored: bool,
    pub fresh: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CorrectionReport {
    pub reviewed: usize,
    pub discrepancies: Vec<Discrepancy>,
}

impl CorrectionReport {
    pub fn corrections(&self) -> usize {
        self.discrepancies.len()
    }
}

/// `radius` chars either side of char offset `location`, clamped to `text`.
pub fn context_window(text: &str, location: usize, radius: usize) -> &str {
    let byte_at = |char_ix: usize| {
        text.char_indices()
            .nth(char_ix)
            .map(|(b, _)| b)
            .unwrap_or(text.len())
    };
    let start = byte_at(location.saturating_sub(radius));
    let end = byte_at(location.saturating_add(radius));
    &text[start..end.max(start)]
}

/// Wider context for `o`: the text window around its location, or its three
/// stored sentences when the row carries no location.
fn wider_context(o: &Occurrence, campaign: &Campaign) -> String {
    match (o.char_location, campaign.text()) {
        (Some(loc), Some(t)) => context_window(t, loc, CONTEXT_RADIUS_CHARS).to_string(),
        (None, _) => [o.before.as_str(), o.current.as_str(), o.next.as_str()]
            .iter()
            .filter(|s| !s.is_empty())
            .copied()
            .collect::<Vec<_>>()
            .join(" "),
        (Some(_), None) => String::new(),
    }
}

/// Review `count` labeled occurrences drawn at random from `store`.
/// Rows whose campaign is absent from `campaigns` are never drawn. A second
/// request for context counts as "not metaphorical".
///
/// Locations index the campaign text as it was at extraction, so pass
/// campaigns cleaned the same way (see `Pipeline::prepare`).
pub fn review_sample<R: Rng + ?Sized>(
    store: &OccurrenceStore,
    campaigns: &[Campaign],
    count: usize,
    reviewer: &mut dyn Reviewer,
    rng: &mut R,
) -> Result<CorrectionReport> {
    let by_id: HashMap<&str, &Campaign> =
        campaigns.iter().map(|c| (c.id.as_str(), c)).collect();
    let pool: Vec<(&Occurrence, &Campaign, bool)> = store
        .iter()
        .filter_map(|o| {
            let stored = o.metaphorical?;
            let campaign = by_id.get(o.campaign_id.as_str())?;
            Some((o, *campaign, stored))
        })
        .collect();

    debug!(
        pool = pool.len(),
        unlabeled = store.unlabeled().count(),
        "review pool built"
    );

    let mut report = CorrectionReport::default();
    if pool.is_empty() {
        info!("no labeled occurrences to review");
        return Ok(report);
    }

    for _ in 0..count {
        let (o, campaign, stored) = pool[rng.random_range(0..pool.len())];
        let fresh = match reviewer.judge(o, campaign, None)? {
            Judgment::Metaphorical(b) => b,
            Judgment::NeedsContext => {
                let window = wider_context(o, campaign);
                match reviewer.judge(o, campaign, Some(&window))? {
                    Judgment::Metaphorical(b) => b,
                    Judgment::NeedsContext => false,
                }
            }
        };
        report.reviewed += 1;
        if fresh != stored {
            debug!(
                campaign_id = %o.campaign_id,
                keyword = %o.keyword,
                stored,
                fresh,
                "label disagreement"
            );
            report.discrepancies.push(Discrepancy {
                campaign_id: o.campaign_id.clone(),
                char_location: o.char_location,
                keyword: o.keyword.clone(),
                stored,
                fresh,
            });
        }
    }

    info!(
        reviewed = report.reviewed,
        corrections = report.corrections(),
        "correction review finished"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn occ(id: &str, kw: &str, loc: usize, label: Option<bool>) -> Occurrence {
        located(id, kw, Some(loc), label)
    }

    fn located(id: &str, kw: &str, loc: Option<usize>, label: Option<bool>) -> Occurrence {
        Occurrence {
            campaign_id: id.into(),
            keyword: kw.into(),
            metaphor_type: "battle".into(),
            start_offset: 0,
            end_offset: kw.len(),
            char_location: loc,
            before: String::new(),
            current: String::new(),
            next: String::new(),
            metaphorical: label,
        }
    }

    /// Says "metaphorical" for every keyword in `yes`, asks for context first
    /// when `ask_context` is set.
    struct Scripted {
        yes: Vec<&'static str>,
        ask_context: bool,
        windows: Vec<String>,
    }

    impl Reviewer for Scripted {
        fn judge(&mut self, o: &Occurrence, _: &Campaign, ctx: Option<&str>) -> Result<Judgment> {
            if self.ask_context && ctx.is_none() {
                return Ok(Judgment::NeedsContext);
            }
            if let Some(w) = ctx {
                self.windows.push(w.to_string());
            }
            Ok(Judgment::Metaphorical(self.yes.contains(&o.keyword.as_str())))
        }
    }

    #[test]
    fn counts_disagreements_without_overwriting() {
        let store = OccurrenceStore::from_vec(vec![
            occ("1", "fight", 0, Some(true)),
            occ("1", "war", 5, Some(true)),
            occ("1", "enemy", 9, None),
            occ("ghost", "war", 0, Some(false)),
        ]);
        let before = store.clone();
        let campaigns = vec![Campaign::new("1", Some("fight war enemy"))];
        let mut reviewer = Scripted {
            yes: vec!["fight"],
            ask_context: false,
            windows: Vec::new(),
        };
        let mut rng = StdRng::seed_from_u64(7);

        let report = review_sample(&store, &campaigns, 20, &mut reviewer, &mut rng).unwrap();
        assert_eq!(report.reviewed, 20);
        assert!(report
            .discrepancies
            .iter()
            .all(|d| d.keyword == "war" && d.stored && !d.fresh));
        assert!(report.corrections() > 0);
        assert_eq!(store, before);
    }

    #[test]
    fn context_is_offered_on_request() {
        let text = "a".repeat(1000);
        let store = OccurrenceStore::from_vec(vec![occ("1", "fight", 500, Some(true))]);
        let campaigns = vec![Campaign::new("1", Some(text.as_str()))];
        let mut reviewer = Scripted {
            yes: vec!["fight"],
            ask_context: true,
            windows: Vec::new(),
        };
        let mut rng = StdRng::seed_from_u64(1);
        let report = review_sample(&store, &campaigns, 3, &mut reviewer, &mut rng).unwrap();
        assert_eq!(report.corrections(), 0);
        assert_eq!(reviewer.windows.len(), 3);
        assert_eq!(reviewer.windows[0].chars().count(), 2 * CONTEXT_RADIUS_CHARS);
    }

    #[test]
    fn rows_without_location_fall_back_to_stored_sentences() {
        let mut row = located("1", "fight", None, Some(true));
        row.before = "We were tired.".into();
        row.current = "Then we fight.".into();
        let store = OccurrenceStore::from_vec(vec![row]);
        let campaigns = vec![Campaign::new("1", Some("We were tired. Then we fight."))];
        let mut reviewer = Scripted {
            yes: Vec::new(),
            ask_context: true,
            windows: Vec::new(),
        };
        let mut rng = StdRng::seed_from_u64(3);
        let report = review_sample(&store, &campaigns, 1, &mut reviewer, &mut rng).unwrap();
        assert_eq!(reviewer.windows, vec!["We were tired. Then we fight."]);
        assert_eq!(report.discrepancies[0].char_location, None);
    }

    #[test]
    fn empty_pool_reviews_nothing() {
        let store = OccurrenceStore::from_vec(vec![occ("1", "fight", 0, None)]);
        let campaigns = vec![Campaign::new("1", Some("fight"))];
        let mut reviewer = Scripted {
            yes: Vec::new(),
            ask_context: false,
            windows: Vec::new(),
        };
        let mut rng = StdRng::seed_from_u64(0);
        let report = review_sample(&store, &campaigns, 5, &mut reviewer, &mut rng).unwrap();
        assert_eq!(report, CorrectionReport::default());
    }

    #[test]
    fn context_window_clamps_on_char_boundaries() {
        let text = "ééé fight ééé";
        assert_eq!(context_window(text, 4, 2), "é fi");
        assert_eq!(context_window(text, 0, 300), text);
        assert_eq!(context_window(text, 100, 3), "");
    }
}
