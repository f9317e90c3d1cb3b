//! Setup and tooling errors.
//!
//! [`Error`] is what goes wrong before or around a stage: loading config,
//! probing an asset, spawning ffmpeg. What a stage reports as its own outcome
//! is a [`ClassifiedError`](crate::ClassifiedError).

use std::fmt;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A file or tool that was asked for does not exist.
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    /// Configuration or caller input was rejected.
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("IO error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },

    /// ffmpeg or ffprobe could not be run, timed out, or exited non-zero.
    #[error("Tool error [{tool}]: {message}")]
    Tool { tool: String, message: String },

    /// ffprobe ran but its output was unusable.
    #[error("Probe error: {0}")]
    Probe(String),
}

impl Error {
    pub fn not_found(entity: impl Into<String>, id: impl fmt::Display) -> Self {
        Error::NotFound {
            entity: entity.into(),
            id: id.to_string(),
        }
    }

    pub fn tool(tool: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Tool {
            tool: tool.into(),
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
