//! # Texture Optimizer - Main Entry Point
//!
//! Questo è il punto di ingresso principale dell'applicazione.
//!
//! ## Responsabilità:
//! - Parsing degli argomenti della command line con `clap`
//! - Inizializzazione del logging con `tracing` (stderr in modalità JSON)
//! - Merge delle impostazioni salvate con i flag CLI
//! - Avvio del run, Ctrl-C come cancellazione
//!
//! ## Esempio di utilizzo:
//! ```bash
//! texture-optimizer convert ~/RimWorld/Mods --workers 8 --no-upscale
//! texture-optimizer restore ~/RimWorld/Mods --dry-run
//! texture-optimizer tools
//! ```

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use texture_optimizer::file_manager::FileManager;
use texture_optimizer::json_output::{JsonMessage, JsonObserver};
use texture_optimizer::manifest::OutputManifest;
use texture_optimizer::progress::ProgressManager;
use texture_optimizer::scanner::ExclusionRules;
use texture_optimizer::tool_resolver::ToolResolver;
use texture_optimizer::{BackendKind, RowOrder, RunConfig, RunController, TextureFormat};

#[derive(Parser)]
#[command(name = "texture-optimizer")]
#[command(about = "Convert PNG textures to compressed DDS beside the originals")]
struct Cli {
    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Settings file (default: <config dir>/texture-optimizer/settings.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Convert every PNG under ROOT to DDS
    Convert(ConvertArgs),
    /// Delete generated DDS files that have a PNG beside them
    Restore {
        root: PathBuf,
        /// List what would be removed without deleting
        #[arg(long)]
        dry_run: bool,
    },
    /// Show where external tools were found
    Tools {
        /// Explicit texconv path to check
        #[arg(long)]
        texconv: Option<PathBuf>,
    },
    /// Print the effective settings
    Config {
        /// Persist the settings file
        #[arg(long)]
        save: bool,
    },
}

#[derive(Args)]
struct ConvertArgs {
    /// Directory containing the textures (e.g. the Mods folder)
    root: PathBuf,

    /// Number of parallel workers
    #[arg(short, long)]
    workers: Option<usize>,

    /// Do not upscale small textures
    #[arg(long)]
    no_upscale: bool,

    /// Never use the GPU
    #[arg(long)]
    no_gpu: bool,

    /// Compression backend
    #[arg(long, value_enum)]
    backend: Option<BackendKind>,

    /// Path to texconv
    #[arg(long)]
    texconv: Option<PathBuf>,

    /// Output format
    #[arg(long, value_enum)]
    format: Option<TextureFormat>,

    /// Do not generate mipmaps
    #[arg(long)]
    no_mipmaps: bool,

    /// Keep the PNG row order (no vertical flip)
    #[arg(long)]
    no_flip: bool,

    /// Textures whose largest side is below this are upscaled
    #[arg(long)]
    min_dimension: Option<u32>,

    /// Capacity of the work queue
    #[arg(long)]
    queue_capacity: Option<usize>,

    /// Re-check existing outputs against recorded checksums
    #[arg(long)]
    verify_outputs: bool,

    /// Emit JSON lines on stdout instead of a progress bar
    #[arg(long)]
    json: bool,
}

impl ConvertArgs {
    /// CLI flags override the settings file
    fn apply(&self, mut config: RunConfig) -> RunConfig {
        config.root = self.root.clone();
        if let Some(workers) = self.workers {
            config.workers = workers;
            if self.queue_capacity.is_none() {
                config.queue_capacity = workers.saturating_mul(4);
            }
        }
        if let Some(capacity) = self.queue_capacity {
            config.queue_capacity = capacity;
        }
        if self.no_upscale {
            config.enable_upscale = false;
        }
        if self.no_gpu {
            config.prefer_gpu = false;
        }
        if let Some(backend) = self.backend {
            config.backend = backend;
        }
        if self.texconv.is_some() {
            config.texconv_path = self.texconv.clone();
        }
        if let Some(format) = self.format {
            config.texture_format = format;
        }
        if self.no_mipmaps {
            config.generate_mipmaps = false;
        }
        if self.no_flip {
            config.target_row_order = RowOrder::TopDown;
        }
        if let Some(min_dimension) = self.min_dimension {
            config.min_upscale_dimension = min_dimension;
        }
        if self.verify_outputs {
            config.verify_outputs = true;
        }
        config
    }
}

fn init_logging(verbose: bool, json: bool) -> Result<()> {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    if json {
        let subscriber = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .finish();
        tracing::subscriber::set_global_default(subscriber)?;
    } else {
        let subscriber = tracing_subscriber::fmt().with_env_filter(filter).finish();
        tracing::subscriber::set_global_default(subscriber)?;
    }
    Ok(())
}

fn settings_path(explicit: Option<&Path>) -> Option<PathBuf> {
    explicit
        .map(Path::to_path_buf)
        .or_else(RunConfig::default_settings_path)
}

async fn load_settings(explicit: Option<&Path>) -> Result<RunConfig> {
    match settings_path(explicit) {
        Some(path) => RunConfig::from_file(&path).await,
        None => Ok(RunConfig::default()),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let json = matches!(&cli.command, Command::Convert(args) if args.json);
    init_logging(cli.verbose, json)?;

    match &cli.command {
        Command::Convert(args) => convert(args, cli.config.as_deref()).await,
        Command::Restore { root, dry_run } => restore(root, *dry_run, cli.config.as_deref()).await,
        Command::Tools { texconv } => {
            let settings = load_settings(cli.config.as_deref()).await?;
            let explicit = texconv.clone().or(settings.texconv_path);
            println!("{}", ToolResolver::new(explicit).report());
            Ok(())
        }
        Command::Config { save } => show_config(*save, cli.config.as_deref()).await,
    }
}

async fn convert(args: &ConvertArgs, settings: Option<&Path>) -> Result<()> {
    let config = args.apply(load_settings(settings).await?);

    let controller = match RunController::from_config(config) {
        Ok(controller) => controller,
        Err(e) => {
            if args.json {
                JsonMessage::error(e.to_string(), None).emit();
            }
            return Err(e.into());
        }
    };

    let progress = if args.json {
        JsonMessage::start(
            controller.config().root.clone(),
            controller.backend_name().to_string(),
            controller.config(),
        )
        .emit();
        controller.subscribe(JsonObserver);
        None
    } else {
        let bar = ProgressManager::new();
        controller.subscribe_arc(Arc::new(bar.clone()));
        Some(bar)
    };

    let cancel = controller.cancel_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, finishing in-flight textures...");
            cancel.cancel();
        }
    });

    let result = controller.run().await?;

    if let Some(bar) = progress {
        bar.finish(&result.format_summary());
    }

    if args.json {
        JsonMessage::complete(&result).emit();
    } else {
        for issue in &result.failures {
            warn!("Failed: {} ({})", issue.path.display(), issue.reason);
        }
        if let Some(history) = result.history {
            info!(
                "All time: {} textures, {} of PNG -> {} of DDS",
                history.textures,
                FileManager::format_size(history.source_bytes),
                FileManager::format_size(history.output_bytes)
            );
        }
    }

    Ok(())
}

async fn restore(root: &Path, dry_run: bool, settings: Option<&Path>) -> Result<()> {
    let config = RunConfig {
        root: root.to_path_buf(),
        ..load_settings(settings).await?
    };
    config.validate()?;

    let spinner = ProgressManager::spinner("Looking for generated DDS files...");
    let rules = ExclusionRules::from_config(&config);
    let scan_root = config.root.clone();
    let extension = config.destination_extension().to_string();
    let outputs = tokio::task::spawn_blocking(move || {
        FileManager::find_generated_outputs(&scan_root, &rules, &extension)
    })
    .await
    .context("Output discovery failed")?;
    spinner.finish_and_clear();

    let report = FileManager::restore(&outputs, dry_run).await;

    if !dry_run {
        match OutputManifest::load(&config.root, config.state_dir.as_deref()).await {
            Ok(mut manifest) => {
                for output in &outputs {
                    manifest.forget(output);
                }
                manifest.cleanup();
                if let Err(e) = manifest.save().await {
                    warn!("Could not update output manifest: {:#}", e);
                }
            }
            Err(e) => warn!("Output manifest unavailable: {:#}", e),
        }
    }

    let verb = if dry_run { "Would remove" } else { "Removed" };
    info!(
        "{} {} DDS files ({})",
        verb,
        report.removed,
        FileManager::format_size(report.bytes_freed)
    );
    for (path, error) in &report.errors {
        warn!("Could not remove {}: {}", path.display(), error);
    }
    Ok(())
}

async fn show_config(save: bool, settings: Option<&Path>) -> Result<()> {
    let config = load_settings(settings).await?;
    println!("{}", serde_json::to_string_pretty(&config)?);

    if save {
        let path = settings_path(settings)
            .ok_or_else(|| anyhow::anyhow!("Could not determine the settings location"))?;
        config.save_to_file(&path).await?;
        info!("Settings saved to {}", path.display());
    }
    Ok(())
}
