//! Locating `ffmpeg` and `ffprobe`.
//!
//! A path from [`up_core::config::ToolsConfig`] wins when it exists;
//! otherwise the tool is looked up on `PATH`.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use up_core::config::ToolsConfig;
use up_core::{Error, Result};

/// Limit for short invocations such as probing and `-version`.
const QUICK_TIMEOUT: Duration = Duration::from_secs(300);

const KNOWN_TOOLS: &[&str] = &["ffmpeg", "ffprobe"];

/// A tool that was found, and how long quick invocations of it may take.
/// Transcodes set their own limit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocatedTool {
    pub name: String,
    pub path: PathBuf,
    pub timeout: Duration,
}

impl LocatedTool {
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            timeout: QUICK_TIMEOUT,
        }
    }
}

/// One line of `check-tools` output.
#[derive(Debug, Clone)]
pub struct ToolInfo {
    pub name: String,
    pub available: bool,
    pub version: Option<String>,
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Default)]
pub struct ToolRegistry {
    tools: HashMap<String, LocatedTool>,
}

impl ToolRegistry {
    /// Find every known tool. Missing tools are simply absent from the
    /// registry; [`require`](Self::require) reports them.
    pub fn discover(config: &ToolsConfig) -> Self {
        let tools = KNOWN_TOOLS
            .iter()
            .filter_map(|&name| {
                let configured = match name {
                    "ffmpeg" => config.ffmpeg_path.as_deref(),
                    _ => config.ffprobe_path.as_deref(),
                };
                let path = locate(name, configured)?;
                tracing::debug!("Using {name} at {}", path.display());
                Some((name.to_string(), LocatedTool::new(name, path)))
            })
            .collect();
        Self { tools }
    }

    /// A registry holding exactly `tools`, without looking at the system.
    pub fn with_tools(tools: impl IntoIterator<Item = LocatedTool>) -> Self {
        Self {
            tools: tools.into_iter().map(|t| (t.name.clone(), t)).collect(),
        }
    }

    /// The named tool, or [`Error::Tool`] when it was not found.
    pub fn require(&self, name: &str) -> Result<&LocatedTool> {
        self.tools
            .get(name)
            .ok_or_else(|| Error::tool(name, format!("{name} not found; is it installed and in PATH?")))
    }

    pub fn check_all(&self) -> Vec<ToolInfo> {
        KNOWN_TOOLS
            .iter()
            .map(|&name| {
                let found = self.tools.get(name);
                ToolInfo {
                    name: name.to_string(),
                    available: found.is_some(),
                    version: found.and_then(|t| detect_version(&t.path)),
                    path: found.map(|t| t.path.clone()),
                }
            })
            .collect()
    }
}

fn locate(name: &str, configured: Option<&Path>) -> Option<PathBuf> {
    match configured {
        Some(path) if path.exists() => return Some(path.to_path_buf()),
        Some(path) => {
            tracing::warn!("Configured {name} path {} does not exist; searching PATH", path.display());
        }
        None => {}
    }
    let found = which::which(name).ok();
    if found.is_none() {
        tracing::debug!("{name} not found on PATH");
    }
    found
}

/// First line of `<tool> -version`.
fn detect_version(path: &Path) -> Option<String> {
    let output = std::process::Command::new(path).arg("-version").output().ok()?;
    if !output.status.success() {
        return None;
    }
    String::from_utf8_lossy(&output.stdout)
        .lines()
        .next()
        .map(str::to_string)
}
