//! Application configuration types.
//!
//! The top-level [`Config`] struct is deserialized from JSON. Every section
//! defaults sensibly so a completely empty `{}` file is valid.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::Result;
use crate::media::{Container, QualityPreset};
use crate::Error;

// ---------------------------------------------------------------------------
// Top-level Config
// ---------------------------------------------------------------------------

/// Root application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub export: ExportConfig,
    pub tools: ToolsConfig,
    pub upload: UploadConfig,
}

impl Config {
    /// Deserialize a `Config` from a JSON string.
    pub fn from_json(json_str: &str) -> Result<Self> {
        serde_json::from_str(json_str)
            .map_err(|e| Error::Validation(format!("config parse error: {e}")))
    }

    /// Load configuration from a file path, falling back to defaults if the
    /// path is `None` or the file does not exist.
    pub fn load_or_default(path: Option<&Path>) -> Self {
        let Some(path) = path else {
            return Self::default();
        };

        match std::fs::read_to_string(path) {
            Ok(contents) => Self::from_json(&contents).unwrap_or_else(|e| {
                tracing::warn!("Failed to parse config file {}: {e}", path.display());
                Self::default()
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!("No config file at {}; using defaults", path.display());
                Self::default()
            }
            Err(e) => {
                tracing::warn!("Failed to read config file {}: {e}", path.display());
                Self::default()
            }
        }
    }

    /// Return a list of validation warnings (non-fatal issues).
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if self.export.poll_interval_ms == 0 {
            warnings.push(
                "export.poll_interval_ms is 0; progress polling will spin without pausing".into(),
            );
        }

        if let Some(ref dir) = self.export.output_dir {
            if dir.is_relative() {
                warnings.push(format!(
                    "export.output_dir '{}' is relative; exports land relative to the working directory",
                    dir.display()
                ));
            }
        }

        if self.export.preset.is_passthrough() {
            warnings.push(
                "export.preset is passthrough; output size cannot be estimated so the disk space check is skipped"
                    .into(),
            );
        }

        for (name, path) in [
            ("tools.ffmpeg_path", self.tools.ffmpeg_path.as_deref()),
            ("tools.ffprobe_path", self.tools.ffprobe_path.as_deref()),
        ] {
            if let Some(p) = path {
                if !p.exists() {
                    warnings.push(format!(
                        "{name} '{}' does not exist; falling back to PATH",
                        p.display()
                    ));
                }
            }
        }

        warnings
    }
}

// ---------------------------------------------------------------------------
// Sub-configs
// ---------------------------------------------------------------------------

/// Export stage settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    pub container: Container,
    pub preset: QualityPreset,
    /// Directory exported files are written to. Defaults to a subdirectory of
    /// the system temp dir.
    pub output_dir: Option<PathBuf>,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Move the index to the front of the file so uploads can be streamed.
    #[serde(default = "default_true")]
    pub optimize_for_network: bool,
}

fn default_poll_interval_ms() -> u64 {
    100
}

fn default_true() -> bool {
    true
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            container: Container::default(),
            preset: QualityPreset::default(),
            output_dir: None,
            poll_interval_ms: default_poll_interval_ms(),
            optimize_for_network: true,
        }
    }
}

impl ExportConfig {
    /// Resolved output directory.
    pub fn output_dir(&self) -> PathBuf {
        self.output_dir
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().join("upload-pipeline").join("exports"))
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// Paths to external CLI tools.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    pub ffmpeg_path: Option<PathBuf>,
    pub ffprobe_path: Option<PathBuf>,
}

/// Upload pipeline behaviour after export.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadConfig {
    /// Remove the exported file once the pipeline is done with it.
    #[serde(default = "default_true")]
    pub remove_export_after_upload: bool,
    /// Delete the remote video record when a later stage fails or the upload
    /// is cancelled.
    #[serde(default = "default_true")]
    pub delete_remote_on_failure: bool,
    /// Settings applied after activation, when any field is set.
    pub settings: UploadSettingsConfig,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            remove_export_after_upload: true,
            delete_remote_on_failure: true,
            settings: UploadSettingsConfig::default(),
        }
    }
}

/// Default video settings applied after activation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadSettingsConfig {
    pub title: Option<String>,
    pub description: Option<String>,
    pub privacy: Option<String>,
}

impl UploadSettingsConfig {
    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.description.is_none() && self.privacy.is_none()
    }
}
