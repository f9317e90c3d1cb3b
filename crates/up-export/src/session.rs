//! The transcode session contract the export stage drives.

use std::path::{Path, PathBuf};

use tokio::sync::oneshot;

use up_core::config::ExportConfig;
use up_core::{Container, QualityPreset};

use crate::asset::TimeRange;

/// Lifecycle of a transcode session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum SessionStatus {
    Unknown = 0,
    Waiting = 1,
    Exporting = 2,
    Completed = 3,
    Failed = 4,
    Cancelled = 5,
}

impl SessionStatus {
    /// Queued or running; progress is worth polling.
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Waiting | Self::Exporting)
    }

    pub fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Waiting,
            2 => Self::Exporting,
            3 => Self::Completed,
            4 => Self::Failed,
            5 => Self::Cancelled,
            _ => Self::Unknown,
        }
    }
}

/// What a transcode reports when it does not succeed.
#[derive(Debug, thiserror::Error)]
pub enum TranscodeError {
    /// The output volume filled up mid-transcode.
    #[error("no space left on device: {0}")]
    DiskFull(String),

    #[error("transcode failed: {0}")]
    Failed(String),

    #[error("transcode cancelled")]
    Cancelled,

    #[error(transparent)]
    Core(#[from] up_core::Error),
}

impl TranscodeError {
    pub fn is_disk_full(&self) -> bool {
        matches!(self, Self::DiskFull(_))
    }
}

pub type TranscodeResult = std::result::Result<(), TranscodeError>;

/// Output format and destination for an export.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportSettings {
    pub container: Container,
    pub preset: QualityPreset,
    pub output_dir: PathBuf,
    /// Put the index up front so the file can be streamed while uploading.
    pub optimize_for_network: bool,
}

impl From<&ExportConfig> for ExportSettings {
    fn from(config: &ExportConfig) -> Self {
        Self {
            container: config.container,
            preset: config.preset,
            output_dir: config.output_dir(),
            optimize_for_network: config.optimize_for_network,
        }
    }
}

/// An asynchronous media re-encode, exclusively owned by one export stage.
///
/// Implementations run the transcode off the caller's task and report the
/// result exactly once through the receiver returned by
/// [`export_asynchronously`](Self::export_asynchronously).
pub trait TranscodeSession: Send + Sync {
    fn time_range(&self) -> TimeRange;

    /// Expected output size in bytes. Zero when it cannot be estimated, which
    /// is always the case for passthrough.
    fn estimated_output_len(&self) -> u64;

    /// Where the output file is written.
    fn output_path(&self) -> &Path;

    fn status(&self) -> SessionStatus;

    /// Progress in `[0.0, 1.0]`.
    fn progress(&self) -> f64;

    /// Start the transcode. Status is `Waiting` by the time this returns.
    fn export_asynchronously(&self) -> oneshot::Receiver<TranscodeResult>;

    /// Stop the transcode and release its resources. Safe to call at any
    /// point, any number of times.
    fn cancel_export(&self);
}
