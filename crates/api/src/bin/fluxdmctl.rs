//! CLI front-end for the FluxDM download engine. Maps the public API's
//! operations (§6) onto subcommands and its exit codes onto the process
//! exit status.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use futures_util::StreamExt;
use indicatif::{ProgressBar, ProgressStyle};

use api::error::CliError;
use api::{build_orchestrator, tiers, EngineConfig};
use engine::{ProgressEvent, Tier};

#[derive(Parser)]
#[command(name = "fluxdmctl", about = "Drive the FluxDM chunked download engine")]
struct Cli {
    /// Overrides the platform-resolved persistent data directory.
    #[arg(long, global = true)]
    data_root: Option<PathBuf>,

    /// Root URL model tier artifacts are resolved under.
    #[arg(long, global = true, default_value = "https://cdn.fluxdm.example/models")]
    base_url: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Begin or continue a session for a tier (low|medium|high).
    Start { tier: String },
    /// Record consent for metered networks.
    GrantCellular,
    /// Delete merged artifacts, chunk temporaries, and the snapshot.
    Reset,
    /// Compute a diagnostic content hash for a tier's merged artifacts.
    VerifyHash { tier: String },
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = EngineConfig {
        data_root: cli.data_root.clone(),
        base_url: cli.base_url.clone(),
        ..EngineConfig::default()
    };

    let runtime = tokio::runtime::Runtime::new().expect("failed to start async runtime");
    match runtime.block_on(run(cli.command, config)) {
        Ok(()) => ExitCode::from(0),
        Err(e) => {
            eprintln!("fluxdmctl: {e}");
            ExitCode::from(e.exit_code() as u8)
        }
    }
}

async fn run(command: Command, config: EngineConfig) -> Result<(), CliError> {
    match command {
        Command::Start { tier } => {
            let tier = parse_tier(&tier)?;
            let orchestrator = build_orchestrator(&config)?;
            let model_tier = tiers::model_tier(tier, &config.base_url);

            let mut progress = Box::pin(orchestrator.observe());
            let bar = ProgressBar::new(100);
            bar.set_style(
                ProgressStyle::with_template(
                    "{spinner:.green} {msg} [{bar:40.cyan/blue}] {percent}%",
                )
                .unwrap()
                .progress_chars("#>-"),
            );
            let bar_handle = bar.clone();
            let watcher = tokio::spawn(async move {
                while let Some(event) = progress.next().await {
                    report_progress(&bar_handle, &event);
                }
            });

            let result = orchestrator.start(&model_tier).await;
            watcher.abort();
            bar.finish_and_clear();
            result?;
            Ok(())
        }
        Command::GrantCellular => {
            let orchestrator = build_orchestrator(&config)?;
            orchestrator.grant_cellular().await?;
            println!("cellular consent granted");
            Ok(())
        }
        Command::Reset => {
            let orchestrator = build_orchestrator(&config)?;
            orchestrator.reset().await?;
            println!("session reset");
            Ok(())
        }
        Command::VerifyHash { tier } => {
            let tier = parse_tier(&tier)?;
            let root = config.resolve_data_root()?;
            let layout = storage::Layout::new(root);
            let model_tier = tiers::model_tier(tier, &config.base_url);

            for artifact in &model_tier.artifacts {
                let path = layout.artifact_path(&model_tier.folder_name, &artifact.file_name);
                let digest = engine::compute_hash(&path).await?;
                println!("{digest}  {}", artifact.file_name);
            }
            Ok(())
        }
    }
}

fn parse_tier(raw: &str) -> Result<Tier, CliError> {
    Tier::parse(raw).ok_or_else(|| CliError::UnknownTier(raw.to_string()))
}

fn report_progress(bar: &ProgressBar, event: &ProgressEvent) {
    match event {
        ProgressEvent::Probing => bar.set_message("probing remote file sizes"),
        ProgressEvent::Downloading(p) => {
            bar.set_position((p.overall_fraction * 100.0) as u64);
            bar.set_message(format!(
                "downloading ({}/{} chunks, {:.0} KiB/s)",
                p.completed_chunks,
                p.total_chunks,
                p.bytes_per_second / 1024.0
            ));
        }
        ProgressEvent::Merging => bar.set_message("merging chunks"),
        ProgressEvent::Verifying => bar.set_message("verifying integrity"),
        ProgressEvent::Completed => {
            bar.set_position(100);
            bar.set_message("done");
        }
        ProgressEvent::Failed(msg) => bar.set_message(format!("failed: {msg}")),
    }
}
