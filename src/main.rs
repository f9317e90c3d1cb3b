mod cli;

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use cli::{Cli, Commands};

use up_core::config::Config;
use up_core::{Container, QualityPreset, StageOutcome};
use up_export::{
    DiskSpaceProvider, ExportSettings, ExportStage, LocalAsset, MediaAsset, SystemDiskSpace,
    TimeRange, ToolRegistry,
};
use up_operation::{start, Operation};

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Respect RUST_LOG if set, otherwise pick defaults from the verbose flag.
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cli.verbose {
            "upload_pipeline=debug,up_core=debug,up_operation=debug,up_export=debug,up_service=debug,up_pipeline=debug".to_string()
        } else {
            "upload_pipeline=info,up_export=info,up_pipeline=info".to_string()
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(&env_filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Export {
            input,
            preset,
            container,
            output_dir,
        } => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(export_file(
                &input,
                cli.config.as_deref(),
                preset,
                container,
                output_dir,
            ))
        }
        Commands::DiskSpace { path } => disk_space(path, cli.config.as_deref()),
        Commands::CheckTools => check_tools(cli.config.as_deref()),
        Commands::Validate {
            config: config_path,
        } => {
            let path = config_path.or(cli.config);
            validate_config(path.as_deref())
        }
        Commands::Version => {
            println!("upload-pipeline {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

async fn export_file(
    input: &Path,
    config_path: Option<&Path>,
    preset: Option<QualityPreset>,
    container: Option<Container>,
    output_dir: Option<PathBuf>,
) -> Result<()> {
    let mut config = Config::load_or_default(config_path);
    if let Some(preset) = preset {
        config.export.preset = preset;
    }
    if let Some(container) = container {
        config.export.container = container;
    }
    if output_dir.is_some() {
        config.export.output_dir = output_dir;
    }

    if !input.exists() {
        anyhow::bail!("Input file does not exist: {:?}", input);
    }

    let tools = ToolRegistry::discover(&config.tools);
    tools.require("ffmpeg")?;

    tracing::info!("Probing {:?}", input);
    let asset = LocalAsset::probe(&tools, input).await?;
    if let Err(e) = TimeRange::covering(&asset).validate() {
        anyhow::bail!("Cannot export {:?}: {e}", input);
    }

    let asset: Arc<dyn MediaAsset> = Arc::new(asset);
    let settings = ExportSettings::from(&config.export);
    std::fs::create_dir_all(&settings.output_dir)?;
    let stage = Arc::new(
        ExportStage::from_asset(&tools, asset, settings, Arc::new(SystemDiskSpace))
            .with_poll_interval(config.export.poll_interval()),
    );

    stage.set_progress_block(|progress| {
        let mut stderr = std::io::stderr();
        let _ = write!(stderr, "\rExporting: {:>3.0}%", progress * 100.0);
        let _ = stderr.flush();
    });

    // Ctrl-C cancels the export. The handler only holds a weak reference.
    let weak = Arc::downgrade(&stage);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            if let Some(stage) = weak.upgrade() {
                tracing::info!("Interrupted; cancelling export");
                stage.cancel();
            }
        }
    });

    start(&stage);
    let outcome = stage.core().wait().await;
    eprintln!();

    match outcome {
        StageOutcome::Succeeded(path) => {
            println!("Export complete!");
            println!("Output: {}", path.display());
            Ok(())
        }
        StageOutcome::Failed(error) => Err(anyhow::anyhow!(error)),
        StageOutcome::Cancelled => {
            println!("Export cancelled.");
            Ok(())
        }
    }
}

fn disk_space(path: Option<PathBuf>, config_path: Option<&Path>) -> Result<()> {
    let path = path.unwrap_or_else(|| Config::load_or_default(config_path).export.output_dir());
    match SystemDiskSpace.available_space(&path) {
        Some(bytes) => println!(
            "{}: {} bytes available ({:.1} GiB)",
            path.display(),
            bytes,
            bytes as f64 / (1024.0 * 1024.0 * 1024.0)
        ),
        None => println!("{}: free space could not be determined", path.display()),
    }
    Ok(())
}

fn check_tools(config_path: Option<&Path>) -> Result<()> {
    println!("Checking external tools...\n");

    let config = Config::load_or_default(config_path);
    let tools = ToolRegistry::discover(&config.tools).check_all();
    let mut all_ok = true;

    for tool in &tools {
        let status = if tool.available {
            "✓"
        } else {
            all_ok = false;
            "✗"
        };

        print!("{} {}", status, tool.name);
        if let Some(ref version) = tool.version {
            print!(" ({})", version);
        }
        if let Some(ref path) = tool.path {
            print!(" - {}", path.display());
        }
        println!();
    }

    println!();
    if all_ok {
        println!("All required tools are available!");
    } else {
        println!("Some tools are missing. Exports need ffmpeg and ffprobe.");
    }

    Ok(())
}

fn validate_config(path: Option<&Path>) -> Result<()> {
    let config = match path {
        Some(p) => {
            println!("Validating config: {:?}", p);
            let contents = std::fs::read_to_string(p)?;
            let config = Config::from_json(&contents)?;
            println!("✓ Configuration is valid");
            config
        }
        None => {
            println!("No config file specified, using defaults");
            Config::default()
        }
    };

    println!("  Export preset: {}", config.export.preset);
    println!("  Export container: {}", config.export.container);
    println!("  Output dir: {}", config.export.output_dir().display());
    println!("  Poll interval: {} ms", config.export.poll_interval_ms);
    println!(
        "  Remove export after upload: {}",
        config.upload.remove_export_after_upload
    );
    println!(
        "  Delete remote on failure: {}",
        config.upload.delete_remote_on_failure
    );

    let warnings = config.validate();
    if !warnings.is_empty() {
        println!("\nWarnings:");
        for warning in &warnings {
            println!("  - {warning}");
        }
    }

    Ok(())
}
