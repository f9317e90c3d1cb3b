//! Source media handles.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use up_core::{Error, Result};

use crate::command::ToolCommand;
use crate::tools::ToolRegistry;

/// Sample-entry tags of protected (encrypted) streams.
const PROTECTED_CODEC_TAGS: &[&str] = &["encv", "enca", "drms", "drmi"];

/// A locally recorded media asset the export stage reads from.
pub trait MediaAsset: Send + Sync + fmt::Debug {
    fn path(&self) -> &Path;

    /// Duration in seconds; `None` when indefinite (e.g. a live stream).
    fn duration(&self) -> Option<f64>;

    /// Whether the asset may be exported at all. Protected content is not.
    fn is_exportable(&self) -> bool;
}

/// A media file on local disk.
#[derive(Debug, Clone, PartialEq)]
pub struct LocalAsset {
    path: PathBuf,
    duration: Option<f64>,
    exportable: bool,
}

impl LocalAsset {
    pub fn new(path: impl Into<PathBuf>, duration: Option<f64>, exportable: bool) -> Self {
        Self {
            path: path.into(),
            duration,
            exportable,
        }
    }

    /// Read duration and protection status with `ffprobe`.
    pub async fn probe(tools: &ToolRegistry, path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(Error::not_found("asset", path.display()));
        }
        let ffprobe = tools.require("ffprobe")?;

        let mut cmd = ToolCommand::new(ffprobe.path.clone());
        cmd.timeout(ffprobe.timeout);
        cmd.args([
            "-v",
            "quiet",
            "-print_format",
            "json",
            "-show_format",
            "-show_streams",
        ]);
        cmd.arg(path.to_string_lossy());

        let output = cmd.execute().await?;
        let asset = parse_probe_output(path, &output.stdout)?;
        tracing::debug!(
            "Probed {}: duration={:?} exportable={}",
            path.display(),
            asset.duration,
            asset.exportable
        );
        Ok(asset)
    }
}

impl MediaAsset for LocalAsset {
    fn path(&self) -> &Path {
        &self.path
    }

    fn duration(&self) -> Option<f64> {
        self.duration
    }

    fn is_exportable(&self) -> bool {
        self.exportable
    }
}

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    format: ProbeFormat,
    #[serde(default)]
    streams: Vec<ProbeStream>,
}

#[derive(Debug, Deserialize)]
struct ProbeFormat {
    duration: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProbeStream {
    codec_type: Option<String>,
    codec_tag_string: Option<String>,
}

fn parse_probe_output(path: &Path, json: &str) -> Result<LocalAsset> {
    let probe: ProbeOutput = serde_json::from_str(json)
        .map_err(|e| Error::Probe(format!("ffprobe JSON parse error: {e}")))?;

    let duration = probe
        .format
        .duration
        .as_deref()
        .and_then(|d| d.trim().parse::<f64>().ok());

    let has_av = probe.streams.iter().any(|s| {
        matches!(s.codec_type.as_deref(), Some("video") | Some("audio"))
    });
    let protected = probe.streams.iter().any(|s| {
        s.codec_tag_string
            .as_deref()
            .is_some_and(|tag| PROTECTED_CODEC_TAGS.contains(&tag))
    });

    Ok(LocalAsset::new(path, duration, has_av && !protected))
}

/// Why a [`TimeRange`] cannot be exported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum TimeRangeError {
    #[error("time range is invalid")]
    Invalid,
    #[error("time range is indefinite")]
    Indefinite,
    #[error("time range is empty")]
    Empty,
}

/// The span of the source that gets exported, in seconds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeRange {
    pub start: f64,
    pub duration: f64,
}

impl TimeRange {
    /// `[0, duration]`, or an indefinite range when the duration is unknown.
    pub fn covering(asset: &dyn MediaAsset) -> Self {
        Self {
            start: 0.0,
            duration: asset.duration().unwrap_or(f64::INFINITY),
        }
    }

    /// Non-empty, finite, and valid.
    pub fn validate(&self) -> std::result::Result<(), TimeRangeError> {
        if self.start.is_nan() || self.duration.is_nan() || self.start < 0.0 || self.duration < 0.0 {
            return Err(TimeRangeError::Invalid);
        }
        if self.start.is_infinite() || self.duration.is_infinite() {
            return Err(TimeRangeError::Indefinite);
        }
        if self.duration == 0.0 {
            return Err(TimeRangeError::Empty);
        }
        Ok(())
    }

    pub fn end(&self) -> f64 {
        self.start + self.duration
    }
}
