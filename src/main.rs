//! metaphor-features: extract metaphor keyword occurrences from campaign text
//! and score labeled occurrences into per-campaign feature tables.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use metaphor_features::campaign::Campaign;
use metaphor_features::corrections::{review_sample, Judgment, Reviewer};
use metaphor_features::evaluate::matcher_rates;
use metaphor_features::occurrence::{Occurrence, OccurrenceStore};
use metaphor_features::table::{self, CampaignTable};
use metaphor_features::text::BasicCleaner;
use metaphor_features::{MetaphorConfig, Pipeline};

#[derive(Parser)]
#[command(name = "metaphor-features")]
#[command(about = "Metaphor keyword extraction and feature scoring for campaign text")]
#[command(version)]
struct Cli {
    /// Keyword configuration (TOML or JSON); falls back to METAPHOR_CONFIG_PATH,
    /// then config/metaphors.toml, then the built-in lists
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scan campaign text and write the (unlabeled) occurrence table
    Extract {
        #[arg(long)]
        campaigns: PathBuf,
        #[arg(long)]
        out: PathBuf,
        /// Decode entities, replace links and fix spacing before matching
        #[arg(long)]
        clean: bool,
        /// Shuffle rows with this seed so annotators see a random order
        #[arg(long)]
        shuffle_seed: Option<u64>,
    },

    /// Join campaigns with features computed from a labeled occurrence table
    Features {
        #[arg(long)]
        campaigns: PathBuf,
        #[arg(long)]
        labeled: PathBuf,
        #[arg(long)]
        out: PathBuf,
        /// Blank the `text` column in the output
        #[arg(long)]
        drop_text: bool,
        /// Clean campaign text the same way it was cleaned for extraction
        #[arg(long)]
        clean: bool,
    },

    /// Re-label a random sample and count disagreements with stored labels
    Review {
        #[arg(long)]
        campaigns: PathBuf,
        #[arg(long)]
        labeled: PathBuf,
        #[arg(long, default_value = "20")]
        count: usize,
        #[arg(long)]
        seed: Option<u64>,
        /// Clean campaign text the same way it was cleaned for extraction
        #[arg(long)]
        clean: bool,
    },

    /// Detection rates of raw keyword matching against the labels
    Evaluate {
        #[arg(long)]
        labeled: PathBuf,
    },
}

fn init_tracing(verbose: bool, json: bool) {
    let default_filter = if verbose {
        "metaphor_features=info,warn"
    } else {
        "warn"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter.into());
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(fmt::layer().json().with_writer(io::stderr))
            .init();
    } else {
        registry
            .with(fmt::layer().compact().with_writer(io::stderr))
            .init();
    }
}

fn main() -> Result<()> {
    // Load .env file if present (before anything else)
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.json_logs);

    let config = MetaphorConfig::load(cli.config.as_deref())?;
    info!(types = ?config.type_names(), "metaphor config loaded");

    match cli.command {
        Commands::Extract {
            campaigns,
            out,
            clean,
            shuffle_seed,
        } => {
            let table = CampaignTable::read_path(&campaigns)?;
            let pipeline = build_pipeline(config, clean)?;
            let store = pipeline.extract(table.campaigns());
            let store = match shuffle_seed {
                Some(seed) => {
                    let mut rows = store.into_vec();
                    rows.shuffle(&mut StdRng::seed_from_u64(seed));
                    OccurrenceStore::from_vec(rows)
                }
                None => store,
            };
            table::write_occurrences_path(&out, &store)?;
            println!("{} occurrences written to {}", store.len(), out.display());
        }

        Commands::Features {
            campaigns,
            labeled,
            out,
            drop_text,
            clean,
        } => {
            let table = CampaignTable::read_path(&campaigns)?;
            let store = table::read_occurrences_path(&labeled)?;
            let pipeline = build_pipeline(config, clean)?;
            let rows = pipeline.features(table.campaigns(), &store);
            let types = pipeline.config().type_names();
            table::write_features_path(&out, &table, &rows, &types, drop_text)?;
            println!("{} feature rows written to {}", rows.len(), out.display());
        }

        Commands::Review {
            campaigns,
            labeled,
            count,
            seed,
            clean,
        } => {
            let table = CampaignTable::read_path(&campaigns)?;
            let store = table::read_occurrences_path(&labeled)?;
            let pipeline = build_pipeline(config, clean)?;
            let prepared = pipeline.prepare(table.campaigns());
            let mut rng = match seed {
                Some(s) => StdRng::seed_from_u64(s),
                None => StdRng::from_os_rng(),
            };
            let stdin = io::stdin();
            let mut reviewer = PromptReviewer {
                input: stdin.lock(),
            };
            let report =
                review_sample(&store, &prepared, count, &mut reviewer, &mut rng)?;
            for d in &report.discrepancies {
                let location = d.char_location.map(|l| l.to_string()).unwrap_or_default();
                println!(
                    "{}\t{}\t{}\tstored={}\tfresh={}",
                    d.campaign_id, location, d.keyword, d.stored, d.fresh
                );
            }
            println!(
                "Total corrections: {} of {} reviewed",
                report.corrections(),
                report.reviewed
            );
        }

        Commands::Evaluate { labeled } => {
            let store = table::read_occurrences_path(&labeled)?;
            for ty in config.type_names() {
                let r = matcher_rates(&store, ty);
                println!("{ty} true positive rate: {:.2}", r.true_positive);
                println!("{ty} true negative rate: {:.2}", r.true_negative);
                println!("{ty} false positive rate: {:.2}", r.false_positive);
                println!("{ty} false negative rate: {:.2}", r.false_negative);
            }
        }
    }

    Ok(())
}

fn build_pipeline(config: MetaphorConfig, clean: bool) -> Result<Pipeline> {
    let pipeline = Pipeline::new(config)?;
    Ok(if clean {
        pipeline.with_cleaner(Arc::new(BasicCleaner))
    } else {
        pipeline
    })
}

/// Terminal reviewer: `y` is metaphorical, `c` asks for more context,
/// anything else is not metaphorical.
struct PromptReviewer<R> {
    input: R,
}

impl<R: BufRead> Reviewer for PromptReviewer<R> {
    fn judge(
        &mut self,
        o: &Occurrence,
        campaign: &Campaign,
        context: Option<&str>,
    ) -> Result<Judgment> {
        let mut out = io::stdout().lock();
        writeln!(out)?;
        writeln!(out, "[{}] {} ({})", campaign.id, o.keyword, o.metaphor_type)?;
        match context {
            Some(ctx) => writeln!(out, "...{ctx}...")?,
            None => writeln!(out, "{} >>{}<< {}", o.before, o.current, o.next)?,
        }
        write!(out, "Metaphorical? [y/n/c] ")?;
        out.flush()?;
        drop(out);

        let mut line = String::new();
        if self.input.read_line(&mut line).context("reading answer")? == 0 {
            bail!("input closed during review");
        }
        Ok(match line.trim().to_ascii_lowercase().as_str() {
            "y" => Judgment::Metaphorical(true),
            "c" if context.is_none() => Judgment::NeedsContext,
            _ => Judgment::Metaphorical(false),
        })
    }
}
