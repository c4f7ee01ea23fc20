// src/table.rs
//! CSV boundaries: campaign table in, occurrence table in/out, feature
//! table out. Every table has a header row.

use anyhow::{bail, ensure, Context, Result};
use csv::{ReaderBuilder, StringRecord, WriterBuilder};
use std::collections::HashSet;
use std::fs::File;
use std::io;
use std::path::Path;
use tracing::{debug, warn};

use crate::campaign::{campaign_id_from_url, text_cell, Campaign};
use crate::features::{CampaignFeatures, FIRST_INSTANTIATION_NONE};
use crate::occurrence::{Occurrence, OccurrenceStore};

/// Campaign rows plus the raw records they came from, so the feature table
/// can repeat every input column.
#[derive(Debug, Clone, Default)]
pub struct CampaignTable {
    headers: StringRecord,
    records: Vec<StringRecord>,
    campaigns: Vec<Campaign>,
}

struct Columns {
    id: Option<usize>,
    text: Option<usize>,
    name: Option<usize>,
    blurb: Option<usize>,
    url: Option<usize>,
    goal: Option<usize>,
    pledged: Option<usize>,
    usd_pledged: Option<usize>,
    backers: Option<usize>,
    launched: Option<usize>,
    deadline: Option<usize>,
    category: Option<usize>,
    geo_country: Option<usize>,
    geo_type: Option<usize>,
}

impl Columns {
    fn locate(headers: &StringRecord) -> Self {
        let find = |name: &str| headers.iter().position(|h| h.trim() == name);
        Self {
            id: find("id"),
            text: find("text"),
            name: find("name"),
            blurb: find("blurb"),
            url: find("url"),
            goal: find("goal"),
            pledged: find("pledged"),
            usd_pledged: find("usd_pledged"),
            backers: find("backers"),
            launched: find("launched"),
            deadline: find("deadline"),
            category: find("category"),
            geo_country: find("geo_country"),
            geo_type: find("geo_type"),
        }
    }
}

fn cell(record: &StringRecord, ix: Option<usize>) -> Option<&str> {
    ix.and_then(|i| record.get(i))
}

fn text_field(record: &StringRecord, ix: Option<usize>) -> Option<String> {
    cell(record, ix).and_then(text_cell)
}

fn number_field(record: &StringRecord, ix: Option<usize>) -> Option<f64> {
    cell(record, ix)
        .and_then(|s| s.trim().parse::<f64>().ok())
        .filter(|v| v.is_finite())
}

fn timestamp_field(record: &StringRecord, ix: Option<usize>) -> Option<i64> {
    number_field(record, ix).map(|v| v as i64)
}

impl CampaignTable {
    pub fn read_path(path: &Path) -> Result<Self> {
        let file = File::open(path)
            .with_context(|| format!("opening campaign table {}", path.display()))?;
        Self::from_reader(file)
            .with_context(|| format!("reading campaign table {}", path.display()))
    }

    /// Parse a campaign CSV. Rows need an `id` or a `url`; repeated ids keep
    /// the first row.
    pub fn from_reader<R: io::Read>(reader: R) -> Result<Self> {
        let mut rdr = ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(reader);
        let headers = rdr.headers()?.clone();
        let cols = Columns::locate(&headers);
        if cols.id.is_none() && cols.url.is_none() {
            bail!("campaign table needs an `id` or `url` column");
        }

        let mut seen: HashSet<String> = HashSet::new();
        let mut records = Vec::new();
        let mut campaigns = Vec::new();
        let mut duplicates = 0usize;

        for (row, result) in rdr.records().enumerate() {
            let record = result.with_context(|| format!("campaign row {}", row + 1))?;
            let id = match (text_field(&record, cols.id), text_field(&record, cols.url)) {
                (Some(id), _) => id.trim().to_string(),
                (None, Some(url)) => campaign_id_from_url(&url),
                (None, None) => bail!("campaign row {} has neither id nor url", row + 1),
            };
            if !seen.insert(id.clone()) {
                duplicates += 1;
                continue;
            }

            campaigns.push(Campaign {
                id,
                text: text_field(&record, cols.text),
                name: text_field(&record, cols.name),
                blurb: text_field(&record, cols.blurb),
                url: text_field(&record, cols.url),
                goal: number_field(&record, cols.goal),
                pledged: number_field(&record, cols.pledged),
                usd_pledged: number_field(&record, cols.usd_pledged),
                backers: number_field(&record, cols.backers),
                launched: timestamp_field(&record, cols.launched),
                deadline: timestamp_field(&record, cols.deadline),
                category: text_field(&record, cols.category),
                geo_country: text_field(&record, cols.geo_country),
                geo_type: text_field(&record, cols.geo_type),
            });
            records.push(record);
        }

        if duplicates > 0 {
            warn!(duplicates, "duplicate campaign ids dropped (first row kept)");
        }
        debug!(campaigns = campaigns.len(), "campaign table loaded");

        Ok(Self {
            headers,
            records,
            campaigns,
        })
    }

    pub fn campaigns(&self) -> &[Campaign] {
        &self.campaigns
    }

    pub fn len(&self) -> usize {
        self.campaigns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.campaigns.is_empty()
    }
}

/* ----------------------------
Occurrence table
---------------------------- */

pub fn read_occurrences_path(path: &Path) -> Result<OccurrenceStore> {
    let file = File::open(path)
        .with_context(|| format!("opening occurrence table {}", path.display()))?;
    read_occurrences(file).with_context(|| format!("reading occurrence table {}", path.display()))
}

pub fn read_occurrences<R: io::Read>(reader: R) -> Result<OccurrenceStore> {
    let mut rdr = ReaderBuilder::new().has_headers(true).from_reader(reader);
    let mut rows = Vec::new();
    for (row, result) in rdr.deserialize::<Occurrence>().enumerate() {
        rows.push(result.with_context(|| format!("occurrence row {}", row + 1))?);
    }
    Ok(OccurrenceStore::from_vec(rows))
}

pub fn write_occurrences_path(path: &Path, store: &OccurrenceStore) -> Result<()> {
    let file = File::create(path)
        .with_context(|| format!("creating occurrence table {}", path.display()))?;
    write_occurrences(file, store)
}

pub fn write_occurrences<W: io::Write>(writer: W, store: &OccurrenceStore) -> Result<()> {
    let mut wtr = WriterBuilder::new().has_headers(true).from_writer(writer);
    for o in store.iter() {
        wtr.serialize(o)?;
    }
    wtr.flush()?;
    Ok(())
}

/* ----------------------------
Feature table
---------------------------- */

/// Derived column names, in output order.
pub fn feature_headers(type_names: &[&str]) -> Vec<String> {
    let mut out: Vec<String> = [
        "text_length_chars",
        "text_length_words",
        "text_length_sentences",
        "mean_donation",
        "pledged_to_goal",
        "duration_days",
        "launch_month",
        "launch_day_of_week",
        "launch_year",
        "from_US",
        "from_Town",
        "parent_category",
        "blurb_length_words",
        "cancer_type",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect();
    for ty in type_names {
        for suffix in ["metaphor", "uniques", "salience", "first_instantiation", "productivity"] {
            out.push(format!("{ty}_{suffix}"));
        }
    }
    out.push("dominant".to_string());
    out
}

fn opt<T: ToString>(v: Option<T>) -> String {
    v.map(|x| x.to_string()).unwrap_or_default()
}

fn flag(b: bool) -> String {
    let s = if b { "1" } else { "0" };
    s.to_string()
}

fn feature_cells(f: &CampaignFeatures, type_names: &[&str]) -> Vec<String> {
    let p = &f.profile;
    let mut out = vec![
        f.stats.chars.to_string(),
        f.stats.words.to_string(),
        f.stats.sentences.to_string(),
        p.mean_donation.to_string(),
        p.pledged_to_goal.to_string(),
        opt(p.duration_days),
        opt(p.launch_month),
        opt(p.launch_day_of_week),
        opt(p.launch_year),
        flag(p.from_us),
        flag(p.from_town),
        opt(p.parent_category.as_deref()),
        p.blurb_length_words.to_string(),
        p.cancer_type.clone(),
    ];
    for ty in type_names {
        match f.for_type(ty) {
            Some(t) => out.extend([
                t.metaphor_count.to_string(),
                t.unique_count.to_string(),
                t.salience.to_string(),
                t.first_instantiation.to_string(),
                t.productivity.to_string(),
            ]),
            None => out.extend([
                "0".to_string(),
                "0".to_string(),
                "0".to_string(),
                FIRST_INSTANTIATION_NONE.to_string(),
                "0".to_string(),
            ]),
        }
    }
    out.push(f.dominant.to_string());
    out
}

pub fn write_features_path(
    path: &Path,
    table: &CampaignTable,
    features: &[CampaignFeatures],
    type_names: &[&str],
    drop_text: bool,
) -> Result<()> {
    let file = File::create(path)
        .with_context(|| format!("creating feature table {}", path.display()))?;
    write_features(file, table, features, type_names, drop_text)
}

/// Campaign columns as read, then derived columns. `features` must be the
/// aggregator output for `table.campaigns()`, in the same order.
pub fn write_features<W: io::Write>(
    writer: W,
    table: &CampaignTable,
    features: &[CampaignFeatures],
    type_names: &[&str],
    drop_text: bool,
) -> Result<()> {
    ensure!(
        features.len() == table.len(),
        "feature rows ({}) do not match campaign rows ({})",
        features.len(),
        table.len()
    );
    let text_ix = table.headers.iter().position(|h| h.trim() == "text");
    let width = table.headers.len();

    let mut wtr = WriterBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_writer(writer);

    let mut header: Vec<String> = table.headers.iter().map(str::to_string).collect();
    header.extend(feature_headers(type_names));
    wtr.write_record(&header)?;

    for ((record, campaign), f) in table.records.iter().zip(&table.campaigns).zip(features) {
        ensure!(
            campaign.id == f.campaign_id,
            "feature row for `{}` is out of order (expected `{}`)",
            f.campaign_id,
            campaign.id
        );
        let mut row: Vec<String> = (0..width)
            .map(|i| {
                if drop_text && Some(i) == text_ix {
                    String::new()
                } else {
                    record.get(i).unwrap_or_default().to_string()
                }
            })
            .collect();
        row.extend(feature_cells(f, type_names));
        wtr.write_record(&row)?;
    }
    wtr.flush()?;
    Ok(())
}
