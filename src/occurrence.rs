// src/occurrence.rs
//! Keyword occurrences and the table that accumulates them across campaigns.

use anyhow::{anyhow, Result};
use serde::{de, Deserialize, Deserializer, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};

/// One physical keyword match plus the context shown to an annotator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Occurrence {
    #[serde(alias = "project_id", alias = "project")]
    pub campaign_id: String,
    pub keyword: String,
    #[serde(rename = "type")]
    pub metaphor_type: String,
    /// Char offset inside `current`.
    #[serde(default, alias = "start")]
    pub start_offset: usize,
    #[serde(default, alias = "end")]
    pub end_offset: usize,
    /// Char offset of the match start inside the whole campaign text. `None`
    /// for annotation tables exported without it.
    #[serde(default)]
    pub char_location: Option<usize>,
    #[serde(default)]
    pub before: String,
    #[serde(default)]
    pub current: String,
    #[serde(default)]
    pub next: String,
    /// `None` until reviewed.
    #[serde(default, deserialize_with = "lenient_label")]
    pub metaphorical: Option<bool>,
}

impl Occurrence {
    pub fn is_confirmed(&self) -> bool {
        self.metaphorical == Some(true)
    }

    /// Whether `text` holds this keyword at `char_location`. Rows without a
    /// location cannot be checked and pass.
    pub fn is_located_in(&self, text: &str) -> bool {
        let Some(loc) = self.char_location else {
            return true;
        };
        let found: String = text
            .chars()
            .skip(loc)
            .take(self.keyword.chars().count())
            .collect();
        found.to_lowercase() == self.keyword.to_lowercase()
    }
}

/// Parse a human label as written by spreadsheets and dataframe exports.
pub fn parse_label(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "t" | "1" | "1.0" | "yes" | "y" => Some(true),
        "false" | "f" | "0" | "0.0" | "no" | "n" => Some(false),
        _ => None,
    }
}

fn lenient_label<'de, D: Deserializer<'de>>(d: D) -> Result<Option<bool>, D::Error> {
    let raw: Option<String> = Option::deserialize(d)?;
    let Some(raw) = raw else {
        return Ok(None);
    };
    let t = raw.trim();
    if t.is_empty() || t.eq_ignore_ascii_case("nan") || t.eq_ignore_ascii_case("none") {
        return Ok(None);
    }
    parse_label(t)
        .map(Some)
        .ok_or_else(|| de::Error::custom(format!("invalid metaphorical label `{t}`")))
}

/// Append-only table of occurrences. Written by extraction and annotation,
/// then read by the aggregator and the scorer.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OccurrenceStore {
    rows: Vec<Occurrence>,
}

impl OccurrenceStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_vec(rows: Vec<Occurrence>) -> Self {
        Self { rows }
    }

    /// Bulk append, preserving order.
    pub fn extend(&mut self, rows: impl IntoIterator<Item = Occurrence>) {
        self.rows.extend(rows);
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Occurrence> {
        self.rows.iter()
    }

    pub fn as_slice(&self) -> &[Occurrence] {
        &self.rows
    }

    pub fn into_vec(self) -> Vec<Occurrence> {
        self.rows
    }

    /// Rows matching every given criterion; `None` means "any".
    pub fn filter<'a>(
        &'a self,
        campaign_id: Option<&'a str>,
        metaphor_type: Option<&'a str>,
        metaphorical: Option<bool>,
    ) -> impl Iterator<Item = &'a Occurrence> + 'a {
        self.rows.iter().filter(move |o| {
            campaign_id.map_or(true, |id| o.campaign_id == id)
                && metaphor_type.map_or(true, |t| o.metaphor_type == t)
                && metaphorical.map_or(true, |m| o.metaphorical == Some(m))
        })
    }

    /// Rows not yet reviewed.
    pub fn unlabeled(&self) -> impl Iterator<Item = &Occurrence> {
        self.rows.iter().filter(|o| o.metaphorical.is_none())
    }

    /// Group rows by campaign id, optionally keeping one label value only.
    /// Groups keep store order.
    pub fn group_by_campaign(
        &self,
        metaphorical: Option<bool>,
    ) -> BTreeMap<&str, Vec<&Occurrence>> {
        let mut groups: BTreeMap<&str, Vec<&Occurrence>> = BTreeMap::new();
        for o in self.filter(None, None, metaphorical) {
            groups.entry(o.campaign_id.as_str()).or_default().push(o);
        }
        groups
    }

    /// Fill in the review label of row `index`.
    pub fn annotate(&mut self, index: usize, metaphorical: bool) -> Result<()> {
        let len = self.rows.len();
        let row = self
            .rows
            .get_mut(index)
            .ok_or_else(|| anyhow!("occurrence index {index} out of range (len {len})"))?;
        row.metaphorical = Some(metaphorical);
        Ok(())
    }

    /// Drop repeated extractions of the same physical match, keeping the
    /// first. Returns how many rows were removed. Rows without a location fall
    /// back to the sentence-relative key.
    pub fn dedup(&mut self) -> usize {
        let before = self.rows.len();
        let mut seen: HashSet<(String, String, Option<usize>, usize, String)> = HashSet::new();
        self.rows.retain(|o| {
            seen.insert((
                o.campaign_id.clone(),
                o.keyword.clone(),
                o.char_location,
                o.start_offset,
                o.current.clone(),
            ))
        });
        before - self.rows.len()
    }
}

impl FromIterator<Occurrence> for OccurrenceStore {
    fn from_iter<I: IntoIterator<Item = Occurrence>>(iter: I) -> Self {
        Self::from_vec(iter.into_iter().collect())
    }
}

/// Number of distinct keyword strings among `rows`.
pub fn distinct_keywords<'a>(rows: impl IntoIterator<Item = &'a Occurrence>) -> usize {
    rows.into_iter()
        .map(|o| o.keyword.as_str())
        .collect::<BTreeSet<_>>()
        .len()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn occ(id: &str, kw: &str, ty: &str, start: usize, label: Option<bool>) -> Occurrence {
        Occurrence {
            campaign_id: id.into(),
            keyword: kw.into(),
            metaphor_type: ty.into(),
            start_offset: start,
            end_offset: start + kw.len(),
            char_location: Some(start),
            before: String::new(),
            current: format!("sentence with {kw}"),
            next: String::new(),
            metaphorical: label,
        }
    }

    fn store() -> OccurrenceStore {
        OccurrenceStore::from_vec(vec![
            occ("1", "battle", "battle", 0, Some(true)),
            occ("1", "path", "journey", 3, Some(false)),
            occ("2", "war", "battle", 1, Some(true)),
            occ("2", "war", "battle", 9, Some(true)),
            occ("2", "fight", "battle", 4, None),
        ])
    }

    #[test]
    fn filter_by_each_key() {
        let s = store();
        assert_eq!(s.filter(Some("2"), None, None).count(), 3);
        assert_eq!(s.filter(None, Some("battle"), Some(true)).count(), 3);
        assert_eq!(s.filter(Some("1"), Some("journey"), Some(true)).count(), 0);
        assert_eq!(s.unlabeled().count(), 1);
    }

    #[test]
    fn group_and_distinct() {
        let s = store();
        let g = s.group_by_campaign(Some(true));
        assert_eq!(g.keys().copied().collect::<Vec<_>>(), vec!["1", "2"]);
        assert_eq!(g["2"].len(), 2);
        assert_eq!(distinct_keywords(g["2"].iter().copied()), 1);
    }

    #[test]
    fn annotate_sets_label_once_in_range() {
        let mut s = store();
        s.annotate(4, false).unwrap();
        assert_eq!(s.as_slice()[4].metaphorical, Some(false));
        assert!(s.annotate(99, true).is_err());
    }

    #[test]
    fn dedup_removes_repeated_extraction() {
        let mut s = store();
        let again = store().into_vec();
        s.extend(again);
        assert_eq!(s.len(), 10);
        assert_eq!(s.dedup(), 5);
        assert_eq!(s, store());
    }

    #[test]
    fn dedup_without_locations_keeps_distinct_sentences() {
        let mut a = occ("1", "war", "battle", 4, Some(true));
        a.char_location = None;
        let mut b = a.clone();
        b.current = "another war here".into();
        let mut s = OccurrenceStore::from_vec(vec![a.clone(), b, a]);
        assert_eq!(s.dedup(), 1);
        assert_eq!(s.len(), 2);
    }

    #[test]
    fn location_check_against_text() {
        let mut o = occ("1", "war", "battle", 6, None);
        o.char_location = Some(6);
        assert!(o.is_located_in("Café, WAR ends"));
        assert!(!o.is_located_in("Café, the war ends"));
        o.char_location = None;
        assert!(o.is_located_in("anything"));
    }

    #[test]
    fn labels_parse_leniently() {
        assert_eq!(parse_label("True"), Some(true));
        assert_eq!(parse_label(" n "), Some(false));
        assert_eq!(parse_label("1.0"), Some(true));
        assert_eq!(parse_label("maybe"), None);
    }
}
