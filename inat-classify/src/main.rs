//! iNaturalist classifier - command-line entry point
//!
//! Classifies a single image or a whole directory against the iNaturalist
//! computer-vision API and resolves each match to subfamily, tribe and genus.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use inat_classify::config::PipelineConfig;
use inat_classify::models::{BatchReport, HierarchyStats};
use inat_classify::services::{
    BatchRunner, HttpTransport, OrganizeMode, Organizer, Pipeline, ResultsDocument, ResultsStore,
    ResumePlan, TokenStatus, TokenValidator, Transport,
};
use inat_common::config::{load_config, resolve_access_token, TomlConfig};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, reload, util::SubscriberInitExt, EnvFilter};

/// Command-line arguments for inat-classify
#[derive(Parser, Debug)]
#[command(name = "inat-classify")]
#[command(about = "Classify insect photos with iNaturalist and sort them by subfamily/tribe/genus")]
#[command(version)]
struct Args {
    /// iNaturalist API access token (overrides INAT_ACCESS_TOKEN and the config file)
    #[arg(long, global = true)]
    token: Option<String>,

    /// Configuration file (default: <config_dir>/inat-classify/config.toml)
    #[arg(long, global = true, env = "INAT_CLASSIFY_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Classify one image and print the result as JSON
    Classify {
        image: PathBuf,
    },

    /// Classify every image under a directory
    Batch {
        directory: PathBuf,

        /// Results file
        #[arg(short, long, default_value = "results.json")]
        output: PathBuf,

        /// Sort classified images into <TARGET>/<subfamily>/<tribe>/<genus>/
        #[arg(long, value_name = "TARGET")]
        organize: Option<PathBuf>,

        /// Copy instead of move when organizing
        #[arg(long, requires = "organize")]
        copy: bool,

        /// Reprocess even if the results file already exists
        #[arg(long)]
        force: bool,

        /// Only scan the top level of the directory
        #[arg(long)]
        flat: bool,

        /// Check the access token before starting
        #[arg(long)]
        verify_token: bool,
    },

    /// Check that the access token is accepted
    VerifyToken,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command-line arguments
    let args = Args::parse();

    // Initialize tracing; RUST_LOG wins, otherwise the config file's level
    // replaces the default once the file is read
    let env_filter = EnvFilter::try_from_default_env().ok();
    let from_env = env_filter.is_some();
    let (filter, filter_handle) = reload::Layer::new(env_filter.unwrap_or_else(|| level_filter("info")));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting inat-classify v{}", env!("CARGO_PKG_VERSION"));

    let toml_config = load_config(args.config.as_deref()).context("Failed to load configuration")?;
    if !from_env {
        filter_handle
            .reload(level_filter(&toml_config.logging.level))
            .context("Failed to apply log level")?;
    }

    let mut config = PipelineConfig::from_toml(&toml_config).context("Invalid configuration")?;
    let transport = build_transport(args.token.as_deref(), &toml_config, &config)?;

    match args.command {
        Command::Classify { image } => classify_one(transport, &config, &image).await,
        Command::Batch {
            directory,
            output,
            organize,
            copy,
            force,
            flat,
            verify_token,
        } => {
            if flat {
                config.recursive = false;
            }
            if verify_token {
                check_token(transport.clone(), &config).await?;
            }
            let mode = if copy { OrganizeMode::Copy } else { OrganizeMode::Move };
            run_batch(transport, &config, &directory, &output, force, organize.map(|t| (t, mode))).await
        }
        Command::VerifyToken => check_token(transport, &config).await,
    }
}

fn level_filter(level: &str) -> EnvFilter {
    EnvFilter::new(format!("inat_classify={level},inat_common={level}"))
}

fn build_transport(
    cli_token: Option<&str>,
    toml_config: &TomlConfig,
    config: &PipelineConfig,
) -> Result<Arc<dyn Transport>> {
    let credential = resolve_access_token(cli_token, toml_config)?;
    let transport = HttpTransport::new(credential, &config.transport).context("Failed to build HTTP client")?;
    Ok(Arc::new(transport))
}

async fn check_token(transport: Arc<dyn Transport>, config: &PipelineConfig) -> Result<()> {
    let validator = TokenValidator::new(transport, config.endpoints.token_check_url());
    match validator.validate().await {
        TokenStatus::Valid => {
            println!("Access token is valid");
            Ok(())
        }
        TokenStatus::Invalid => bail!(
            "Access token was rejected. Obtain a new one at https://www.inaturalist.org/users/api_token"
        ),
        TokenStatus::Unreachable(reason) => bail!("Could not verify access token: {}", reason),
    }
}

async fn classify_one(transport: Arc<dyn Transport>, config: &PipelineConfig, image: &Path) -> Result<()> {
    let pipeline = Pipeline::new(transport, config);
    let result = pipeline.process(image).await?;
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}

async fn run_batch(
    transport: Arc<dyn Transport>,
    config: &PipelineConfig,
    directory: &Path,
    output: &Path,
    force: bool,
    organize: Option<(PathBuf, OrganizeMode)>,
) -> Result<()> {
    // Canonical root so stored image paths compare across runs
    let directory = directory
        .canonicalize()
        .with_context(|| format!("Cannot process {}", directory.display()))?;
    let store = ResultsStore::new(output, config.checkpoint_every);

    let mut document = match store.plan(&directory, force).context("Failed to load existing results")? {
        ResumePlan::Reuse(document) => {
            info!(path = %output.display(), "Reusing results (use --force to reprocess)");
            document
        }
        ResumePlan::Resume(previous) => {
            let completed = previous.processed_paths();
            let runner = batch_runner(transport, config).with_completed(completed);
            process(runner, store.with_previous(previous), &directory).await?
        }
        ResumePlan::Fresh => process(batch_runner(transport, config), store, &directory).await?,
    };

    print_stats(&HierarchyStats::from_results(&document.results));

    if let Some((target, mode)) = organize {
        let report = Organizer::new(&target, mode).organize(&document.results);
        println!(
            "Organized into {}: {} placed, {} skipped, {} failed",
            target.display(),
            report.moved,
            report.skipped,
            report.failed
        );

        if mode == OrganizeMode::Move && document.apply_relocations(&report.relocated) > 0 {
            ResultsStore::new(output, 0)
                .save(&document)
                .context("Failed to update results with new image locations")?;
            info!(path = %output.display(), moved = report.relocated.len(), "Results updated with new image locations");
        }
    }

    Ok(())
}

fn batch_runner(transport: Arc<dyn Transport>, config: &PipelineConfig) -> BatchRunner {
    let cancel_token = CancellationToken::new();
    tokio::spawn(cancel_on_signal(cancel_token.clone()));
    BatchRunner::new(Pipeline::new(transport, config), config).with_cancellation(cancel_token)
}

/// Run the batch with checkpoints and write the final document
async fn process(runner: BatchRunner, store: ResultsStore, directory: &Path) -> Result<ResultsDocument> {
    let report = runner
        .run_with_observer(directory, |outcomes| {
            store.checkpoint(directory, outcomes);
        })
        .await
        .with_context(|| format!("Cannot process {}", directory.display()))?;

    let document = store.save_report(&report).context("Failed to write results")?;
    print_summary(&report);
    Ok(document)
}

fn print_summary(report: &BatchReport) {
    let summary = report.summary();
    println!();
    println!("Processed {} of {} images", summary.succeeded + summary.failed, summary.total);
    println!("  succeeded: {}", summary.succeeded);
    println!("  failed:    {}", summary.failed);
    if summary.skipped > 0 {
        println!("  skipped:   {} (cancelled)", summary.skipped);
    }
    for failure in report.failures() {
        println!("  ! {}", failure);
    }
}

fn print_stats(stats: &HierarchyStats) {
    println!();
    println!("Classified images: {}", stats.processed);
    for (label, names) in [
        ("Subfamilies", &stats.subfamilies),
        ("Tribes", &stats.tribes),
        ("Genera", &stats.genera),
    ] {
        println!("{} ({}):", label, names.len());
        for name in names {
            println!("  - {}", name);
        }
    }
}

/// Cancel the batch on the first Ctrl+C, letting the image in flight
/// finish; exit immediately on the second
async fn cancel_on_signal(cancel_token: CancellationToken) {
    loop {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            return;
        }
        if interrupt(&cancel_token) == Interrupt::Exit {
            warn!("Received second Ctrl+C, exiting without finishing the current image");
            std::process::exit(130);
        }
        info!("Received Ctrl+C, stopping after the current image (press again to exit now)");
    }
}

#[derive(Debug, PartialEq, Eq)]
enum Interrupt {
    Cancel,
    Exit,
}

fn interrupt(cancel_token: &CancellationToken) -> Interrupt {
    if cancel_token.is_cancelled() {
        Interrupt::Exit
    } else {
        cancel_token.cancel();
        Interrupt::Cancel
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_interrupt_exits() {
        let token = CancellationToken::new();
        assert_eq!(interrupt(&token), Interrupt::Cancel);
        assert!(token.is_cancelled());
        assert_eq!(interrupt(&token), Interrupt::Exit);
        assert_eq!(interrupt(&token), Interrupt::Exit);
    }

    #[test]
    fn test_config_level_filter_names_both_crates() {
        let filter = level_filter("debug").to_string().to_lowercase();
        assert!(filter.contains("inat_classify=debug"), "{}", filter);
        assert!(filter.contains("inat_common=debug"), "{}", filter);
    }
}
