//! extract-scores: score the revisions of MediaWiki XML dumps with an
//! article quality model and write the scores as TSV.

use anyhow::{Context, Result};
use articlescore::{
    config::{Config, ConfigError, LogFormat, LoggingConfig, ScoringConfig, DEFAULT_CONFIG_FILE},
    model::load_model,
    scoring::{build_watermarks, ClassWeights, ScoreAt, ScoringCoordinatorBuilder},
    types::Timestamp,
};
use clap::Parser;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser)]
#[command(name = "extract-scores")]
#[command(about = "Score article quality for the revisions in MediaWiki XML dumps")]
#[command(version)]
struct Cli {
    /// Dump files to process (.xml, .xml.bz2 or .xml.gz)
    #[arg(required = true)]
    dump_files: Vec<PathBuf>,

    /// Quality model definition (JSON)
    #[arg(long)]
    model: PathBuf,

    /// Date the dump was generated; nothing is scored as of a later time
    #[arg(long)]
    sunset: String,

    /// Which revisions to score: revision, monthly, biannually, annually or latest
    #[arg(long)]
    score_at: Option<String>,

    /// Where to write scores (default: stdout)
    #[arg(long)]
    rev_scores: Option<PathBuf>,

    /// Output of a previous run; pages are only scored past what it contains
    #[arg(long)]
    extend: Option<PathBuf>,

    /// Dump files processed in parallel (default: available CPUs)
    #[arg(long)]
    processes: Option<usize>,

    /// Add a features column with the model's feature values
    #[arg(long)]
    output_features: bool,

    /// Show a progress spinner on stderr
    #[arg(long)]
    verbose: bool,

    /// Log at debug level
    #[arg(long)]
    debug: bool,

    /// Override a class weight, e.g. --class-weight '"FA"=6' (repeatable)
    #[arg(long = "class-weight", value_name = "LABEL=WEIGHT")]
    class_weights: Vec<String>,

    /// Configuration file path
    #[arg(short, long, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,
}

fn init_logging(config: &LoggingConfig, debug: bool) -> Result<()> {
    let directives = std::env::var(EnvFilter::DEFAULT_ENV).ok();

    // stdout may carry the scores
    let builder = FmtSubscriber::builder()
        .with_env_filter(config.env_filter(debug, directives.as_deref()))
        .with_target(false)
        .with_writer(io::stderr);

    match config.format {
        LogFormat::Text => tracing::subscriber::set_global_default(builder.finish())?,
        LogFormat::Json => tracing::subscriber::set_global_default(builder.json().finish())?,
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = Config::load_or_default(&cli.config)?;
    init_logging(&config.logging, cli.debug)?;

    let score_at: ScoreAt = cli
        .score_at
        .as_deref()
        .unwrap_or(&config.scoring.score_at)
        .parse()?;
    let sunset = Timestamp::parse(&cli.sunset).map_err(ConfigError::from)?;

    let weights = ClassWeights::default()
        .with_overrides(config.scoring.class_weights.clone())
        .apply_options(&cli.class_weights)?;

    let model = load_model(&cli.model).map_err(|source| ConfigError::Model {
        path: cli.model.clone(),
        source,
    })?;

    let watermarks = build_watermarks(cli.extend.as_deref()).context("Failed to read past scores")?;
    if let Some(ref path) = cli.extend {
        info!("Read past scores for {} pages from {}", watermarks.len(), path.display());
    }

    let processes = cli
        .processes
        .or(config.scoring.processes)
        .unwrap_or_else(ScoringConfig::default_processes);

    let coordinator = ScoringCoordinatorBuilder::new(model, sunset)
        .with_score_at(score_at)
        .with_start_year(config.scoring.start_year)
        .with_watermarks(watermarks)
        .with_class_weights(weights)
        .with_output_features(cli.output_features)
        .with_processes(processes)
        .with_verbose(cli.verbose)
        .build()?;

    // Created only once every setting has been validated
    let out: Box<dyn Write> = match cli.rev_scores {
        Some(ref path) => {
            let file = File::create(path).with_context(|| format!("Failed to create {}", path.display()))?;
            Box::new(BufWriter::new(file))
        }
        None => Box::new(BufWriter::new(io::stdout().lock())),
    };
    let mut sink = coordinator.writer(out)?;

    coordinator.run(&cli.dump_files, &mut sink).await?;
    Ok(())
}
