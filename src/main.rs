// Command-line batch runner: augments every generated document in a folder.

use anyhow::{Context, Result};
use clap::Parser;
use docsim_augment::{AugmentationPipeline, OperationRegistry, ParallelAugmentor, PipelineConfig};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "docsim-augment", about = "Augment synthetic document images and their ground truth")]
struct Cli {
    /// Augmentation config (JSON)
    #[arg(long, default_value = "templates/sample_augmentation/config.json")]
    config: PathBuf,

    /// Folder with generated images and their ground-truth JSON files
    #[arg(long, default_value = "output")]
    src_folder: PathBuf,

    /// Folder for augmented images and ground truth
    #[arg(long, default_value = "output_augmented")]
    dest_folder: PathBuf,

    /// Number of worker tasks (0 = one per CPU)
    #[arg(long, default_value_t = 4)]
    num_workers: usize,

    /// Number of augmented copies per image
    #[arg(long, default_value_t = 1)]
    epochs: u32,

    /// Base seed for reproducible runs; overrides the config's `seed`
    #[arg(long)]
    seed: Option<u64>,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let subscriber = tracing_subscriber::FmtSubscriber::builder()
        .with_env_filter(filter)
        .finish();
    tracing::subscriber::set_global_default(subscriber).context("Failed to set tracing subscriber")?;

    let config = PipelineConfig::from_json_file(&cli.config)
        .with_context(|| format!("Failed to load config {}", cli.config.display()))?;
    let seed = cli.seed.or(config.seed);
    let registry = OperationRegistry::with_defaults();
    let pipeline = AugmentationPipeline::from_config(&config, &registry).context("Failed to build pipeline")?;

    let num_workers = if cli.num_workers == 0 {
        num_cpus::get()
    } else {
        cli.num_workers
    };

    let augmentor = ParallelAugmentor::new(Arc::new(pipeline), num_workers).with_seed(seed);
    let summary = augmentor
        .run(&cli.src_folder, cli.epochs, Some(&cli.dest_folder))
        .await
        .with_context(|| format!("Failed to augment {}", cli.src_folder.display()))?;

    info!(
        "Done: {} processed, {} skipped, {} failed",
        summary.processed, summary.skipped, summary.failed
    );
    Ok(())
}
