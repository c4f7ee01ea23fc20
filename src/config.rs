// src/config.rs
//! Metaphor keyword configuration (TOML or JSON) and scoring options.
//!
//! Lookup order for [`MetaphorConfig::load_default`]:
//! 1) `$METAPHOR_CONFIG_PATH`
//! 2) `config/metaphors.toml`
//! 3) `config/metaphors.json`
//! 4) built-in seed ([`MetaphorConfig::default_seed`])
//!
//! `$METAPHOR_RARITY_EXPONENT` overrides `scoring.rarity_exponent`.

use anyhow::{anyhow, bail, Context, Result};
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

pub const DEFAULT_CONFIG_PATH: &str = "config/metaphors.toml";
pub const DEFAULT_CONFIG_JSON_PATH: &str = "config/metaphors.json";
pub const DEFAULT_RARITY_EXPONENT: f64 = 0.4;

pub const ENV_CONFIG_PATH: &str = "METAPHOR_CONFIG_PATH";
pub const ENV_RARITY_EXPONENT: &str = "METAPHOR_RARITY_EXPONENT";

/// How a campaign's weighted keyword sum becomes its productivity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProductivityNormalization {
    /// Unnormalized weighted sum.
    #[default]
    RawSum,
    /// Weighted sum divided by the campaign's own count for the type.
    MeanNormalized,
}

/// Which confirmed occurrences decide a type's first instantiation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FirstInstantiationScope {
    /// Earliest occurrence of that type.
    #[default]
    PerType,
    /// Earliest occurrence of any type, repeated for every type.
    AnyType,
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct ScoringOptions {
    #[serde(default = "default_rarity_exponent")]
    pub rarity_exponent: f64,
    #[serde(default)]
    pub productivity: ProductivityNormalization,
    #[serde(default)]
    pub first_instantiation: FirstInstantiationScope,
}

fn default_rarity_exponent() -> f64 {
    DEFAULT_RARITY_EXPONENT
}

impl Default for ScoringOptions {
    fn default() -> Self {
        Self {
            rarity_exponent: DEFAULT_RARITY_EXPONENT,
            productivity: ProductivityNormalization::default(),
            first_instantiation: FirstInstantiationScope::default(),
        }
    }
}

/// A metaphor type and its literal keywords, in match order.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct KeywordList {
    pub name: String,
    pub keywords: Vec<String>,
}

impl KeywordList {
    pub fn new<S: Into<String>>(name: &str, keywords: impl IntoIterator<Item = S>) -> Self {
        Self {
            name: name.to_string(),
            keywords: keywords.into_iter().map(Into::into).collect(),
        }
    }
}

/* ----------------------------
File schema
---------------------------- */

#[derive(Debug, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    scoring: ScoringOptions,
    metaphors: Vec<KeywordList>,
    /// Frozen rarity weights per type, replacing the corpus-derived map.
    #[serde(default)]
    weights: BTreeMap<String, BTreeMap<String, f64>>,
}

/// Validated keyword configuration. Built once per run and shared read-only.
#[derive(Debug, Clone, PartialEq)]
pub struct MetaphorConfig {
    lists: Vec<KeywordList>,
    pub scoring: ScoringOptions,
    fixed_weights: Option<BTreeMap<String, BTreeMap<String, f64>>>,
}

impl MetaphorConfig {
    /// Validate keyword lists: keywords are trimmed and lowercased, blanks
    /// dropped, duplicates inside a list dropped with a warning. A keyword in
    /// two lists, a blank or repeated type name, or no lists at all is an error.
    pub fn new(lists: Vec<KeywordList>) -> Result<Self> {
        if lists.is_empty() {
            bail!("metaphor config defines no keyword lists");
        }

        let mut owner: HashMap<String, String> = HashMap::new();
        let mut names: HashSet<String> = HashSet::new();
        let mut clean = Vec::with_capacity(lists.len());

        for list in lists {
            let name = list.name.trim().to_string();
            if name.is_empty() {
                bail!("metaphor type with empty name");
            }
            if !names.insert(name.clone()) {
                bail!("metaphor type `{name}` defined twice");
            }

            let mut keywords = Vec::with_capacity(list.keywords.len());
            for raw in list.keywords {
                let kw = raw.trim().to_lowercase();
                if kw.is_empty() {
                    continue;
                }
                match owner.get(&kw) {
                    Some(other) if *other == name => {
                        warn!(metaphor_type = %name, keyword = %kw, "duplicate keyword dropped");
                        continue;
                    }
                    Some(other) => {
                        bail!("keyword `{kw}` appears in both `{other}` and `{name}`");
                    }
                    None => {
                        owner.insert(kw.clone(), name.clone());
                        keywords.push(kw);
                    }
                }
            }
            clean.push(KeywordList { name, keywords });
        }

        Ok(Self {
            lists: clean,
            scoring: ScoringOptions::default(),
            fixed_weights: None,
        })
    }

    pub fn with_scoring(mut self, scoring: ScoringOptions) -> Self {
        self.scoring = scoring;
        self
    }

    /// Use frozen rarity weights instead of deriving them from the corpus.
    pub fn with_fixed_weights(
        mut self,
        weights: BTreeMap<String, BTreeMap<String, f64>>,
    ) -> Result<Self> {
        for (ty, table) in &weights {
            if self.list(ty).is_none() {
                bail!("weights given for unknown metaphor type `{ty}`");
            }
            if let Some((kw, w)) = table.iter().find(|(_, w)| !w.is_finite() || **w <= 0.0) {
                bail!("weight for `{ty}`/`{kw}` must be positive, got {w}");
            }
        }
        self.fixed_weights = Some(
            weights
                .into_iter()
                .map(|(ty, table)| {
                    let table = table
                        .into_iter()
                        .map(|(k, w)| (k.trim().to_lowercase(), w))
                        .collect();
                    (ty, table)
                })
                .collect(),
        );
        Ok(self)
    }

    /// Resolve the config path from env/fallbacks and load it.
    pub fn load_default() -> Result<Self> {
        let cfg = if let Ok(p) = std::env::var(ENV_CONFIG_PATH) {
            let pb = PathBuf::from(p);
            if !pb.exists() {
                return Err(anyhow!(
                    "{ENV_CONFIG_PATH} points to non-existent path {}",
                    pb.display()
                ));
            }
            Self::load_from(&pb)?
        } else if Path::new(DEFAULT_CONFIG_PATH).exists() {
            Self::load_from(Path::new(DEFAULT_CONFIG_PATH))?
        } else if Path::new(DEFAULT_CONFIG_JSON_PATH).exists() {
            Self::load_from(Path::new(DEFAULT_CONFIG_JSON_PATH))?
        } else {
            info!("no metaphor config found, using built-in keyword lists");
            Self::default_seed()
        };
        cfg.with_env_overrides()
    }

    /// Explicit path when given (env overrides still apply), else
    /// [`MetaphorConfig::load_default`].
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(p) => Self::load_from(p)?.with_env_overrides(),
            None => Self::load_default(),
        }
    }

    /// Load from an explicit path; the extension picks the format.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading metaphor config from {}", path.display()))?;
        let ext = path
            .extension()
            .and_then(|s| s.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase();
        let parsed = if ext == "json" {
            Self::from_json_str(&content)
        } else {
            Self::from_toml_str(&content)
        };
        parsed.with_context(|| format!("invalid metaphor config {}", path.display()))
    }

    pub fn from_toml_str(s: &str) -> Result<Self> {
        let file: ConfigFile = toml::from_str(s)?;
        Self::from_file(file)
    }

    pub fn from_json_str(s: &str) -> Result<Self> {
        let file: ConfigFile = serde_json::from_str(s)?;
        Self::from_file(file)
    }

    fn from_file(file: ConfigFile) -> Result<Self> {
        check_exponent(file.scoring.rarity_exponent)?;
        let cfg = Self::new(file.metaphors)?.with_scoring(file.scoring);
        if file.weights.is_empty() {
            Ok(cfg)
        } else {
            cfg.with_fixed_weights(file.weights)
        }
    }

    fn with_env_overrides(mut self) -> Result<Self> {
        if let Ok(raw) = std::env::var(ENV_RARITY_EXPONENT) {
            let r: f64 = raw
                .trim()
                .parse()
                .with_context(|| format!("{ENV_RARITY_EXPONENT}={raw} is not a number"))?;
            check_exponent(r)?;
            self.scoring.rarity_exponent = r;
        }
        Ok(self)
    }

    /// Built-in battle/journey lists.
    pub fn default_seed() -> Self {
        let lists = vec![
            KeywordList::new(
                "battle",
                [
                    "fights", "fighting", "fight", "fought", "battles", "battled", "battling",
                    "battle", "war", "beating", "beats", "beaten", "beat", "enemy", "brutal",
                    "defeat", "winning", "win",
                ],
            ),
            KeywordList::new("journey", ["path", "journey", "destination"]),
        ];
        Self {
            lists,
            scoring: ScoringOptions::default(),
            fixed_weights: None,
        }
    }

    pub fn lists(&self) -> &[KeywordList] {
        &self.lists
    }

    pub fn list(&self, name: &str) -> Option<&KeywordList> {
        self.lists.iter().find(|l| l.name == name)
    }

    /// Whether `keyword` is listed under `metaphor_type`.
    pub fn lists_keyword(&self, metaphor_type: &str, keyword: &str) -> bool {
        let keyword = keyword.trim().to_lowercase();
        self.list(metaphor_type)
            .is_some_and(|l| l.keywords.iter().any(|k| *k == keyword))
    }

    pub fn type_names(&self) -> Vec<&str> {
        self.lists.iter().map(|l| l.name.as_str()).collect()
    }

    pub fn fixed_weights(&self) -> Option<&BTreeMap<String, BTreeMap<String, f64>>> {
        self.fixed_weights.as_ref()
    }
}

fn check_exponent(r: f64) -> Result<()> {
    if !r.is_finite() || r < 0.0 {
        bail!("rarity exponent must be a non-negative number, got {r}");
    }
    Ok(())
}
