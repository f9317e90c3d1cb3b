use clap::{Parser, Subcommand};
use std::path::PathBuf;

use up_core::{Container, QualityPreset};

#[derive(Parser)]
#[command(name = "upload-pipeline")]
#[command(author, version, about = "Export recorded video into upload-ready files")]
pub struct Cli {
    /// Path to config file (JSON)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Export a media file into an upload-ready file
    Export {
        /// Recorded media file to export
        #[arg(required = true)]
        input: PathBuf,

        /// Quality preset (passthrough, low, medium, highest, hd720, hd1080, uhd2160)
        #[arg(long)]
        preset: Option<QualityPreset>,

        /// Output container (mp4, mov, m4v)
        #[arg(long)]
        container: Option<Container>,

        /// Directory the exported file is written to
        #[arg(short, long)]
        output_dir: Option<PathBuf>,
    },

    /// Show free disk space for a directory
    DiskSpace {
        /// Directory to check (defaults to the export output directory)
        path: Option<PathBuf>,
    },

    /// Check that required external tools are available
    CheckTools,

    /// Validate configuration file
    Validate {
        /// Config file to validate (uses default if not specified)
        config: Option<PathBuf>,
    },

    /// Display version information
    Version,
}
