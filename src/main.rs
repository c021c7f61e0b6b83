use anyhow::{Context, Result};
use beatremix::config::AppConfig;
use beatremix::features::FeatureIndex;
use beatremix::merge::ChunkMerger;
use beatremix::pool::CandidatePool;
use beatremix::search::{CosineSearch, PoolResolvedSearch};
use beatremix::selector::BeatSelector;
use beatremix::sequencer::{create_rng, RemixSequencer, RemixStats};
use clap::Parser;
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "beatremix",
    version,
    about = "Generate a remix by stitching beat segments from many tracks"
)]
struct Cli {
    /// Rate at which you'd like to see remix jumps (0 to 1)
    #[arg(value_parser = parse_jump_rate)]
    jump_rate: f64,

    /// Number of beats for the generated remix
    #[arg(value_parser = clap::value_parser!(u64).range(1..))]
    number_of_beats: u64,

    /// Path where to save the generated remix (WAV)
    save_path: PathBuf,

    /// Directory of `<track>_<n>.<ext>` segments (overrides config)
    #[arg(long)]
    segments_dir: Option<PathBuf>,

    /// JSON feature table for the segments (overrides config)
    #[arg(long)]
    features: Option<PathBuf>,

    /// Seed for a reproducible remix
    #[arg(long)]
    seed: Option<u64>,

    /// Candidates fetched from the similarity search per jump
    #[arg(long, value_parser = clap::builder::RangedU64ValueParser::<usize>::new().range(1..))]
    search_k: Option<usize>,

    /// Also pick up segments in sub-directories
    #[arg(long)]
    recursive: bool,

    /// Number of threads for similarity scoring (0 = auto-detect from config)
    #[arg(short = 'j', long, default_value = "0")]
    jobs: usize,

    /// Config file (defaults to the XDG config location)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn parse_jump_rate(s: &str) -> std::result::Result<f64, String> {
    let rate: f64 = s.parse().map_err(|e| format!("not a number: {e}"))?;
    if (0.0..=1.0).contains(&rate) {
        Ok(rate)
    } else {
        Err(format!("jump rate must be between 0 and 1, got {rate}"))
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let log_level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level))
        .format_timestamp(None)
        .init();

    // Load config file (optional, defaults if missing)
    let config = match &cli.config {
        Some(path) => AppConfig::load_from(path),
        None => AppConfig::load(),
    };

    // Resolve inputs: CLI > config
    let segments_dir = cli
        .segments_dir
        .or(config.segments_dir.clone())
        .context("No segments directory. Pass --segments-dir or set segments_dir in config.")?;
    let features_path = cli
        .features
        .or(config.features_path.clone())
        .context("No feature table. Pass --features or set features_path in config.")?;
    let search_k = cli.search_k.unwrap_or(config.search_k);
    let seed = cli.seed.or(config.seed);
    let workers = if cli.jobs > 0 { cli.jobs } else { config.resolve_workers() };

    let pool = CandidatePool::discover(&segments_dir, cli.recursive || config.recursive)
        .with_context(|| format!("Failed to load segments from {}", segments_dir.display()))?;
    println!(
        "Found {} segments from {} tracks",
        pool.len(),
        pool.track_count()
    );

    let features = FeatureIndex::load(&features_path)
        .with_context(|| format!("Failed to load features from {}", features_path.display()))?;
    let cosine =
        CosineSearch::new(&features, workers).context("Failed to build similarity search")?;
    // The feature table may name segments under another root; jump targets
    // must come back as pool identifiers
    let search = PoolResolvedSearch::new(cosine, pool.clone());

    let selector =
        BeatSelector::new(cli.jump_rate, pool, features, search).with_search_k(search_k);
    let mut sequencer = RemixSequencer::new(selector, create_rng(seed)).with_progress(true);

    let mut stats = RemixStats::default();
    let remix = sequencer
        .generate_with(cli.number_of_beats as usize, |s| stats.record(s))
        .context("Remix generation failed")?;
    println!(
        "Generated remix with {} ({} tracks)",
        stats,
        remix.track_count()
    );

    let audio = ChunkMerger::new()
        .with_sample_rate(config.sample_rate)
        .with_progress(true)
        .concatenate(&remix.file_paths())
        .context("Failed to merge segments")?;
    println!(
        "Merged beats together ({:.1}s at {} Hz)",
        audio.duration_secs(),
        audio.sample_rate
    );

    audio
        .write_wav(&cli.save_path)
        .with_context(|| format!("Failed to write {}", cli.save_path.display()))?;
    println!("Saved new remix to {}", cli.save_path.display());

    Ok(())
}
