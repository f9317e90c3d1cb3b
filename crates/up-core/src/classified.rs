//! Classified errors: the failure half of a stage outcome.
//!
//! A [`ClassifiedError`] is plain data. Stages never return `Err` or panic
//! across their asynchronous boundary; they attach one of these to their
//! outcome and deliver it through the same completion channel used for
//! success.

use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// ErrorDomain
// ---------------------------------------------------------------------------

/// Identifies which stage produced an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorDomain {
    ExportOperation,
    MeOperation,
    MyVideosOperation,
    CreateVideoOperation,
    UploadVideoOperation,
    ActivateVideoOperation,
    VideoSettingsOperation,
    DeleteVideoOperation,
    VideoOperation,
}

impl ErrorDomain {
    /// Stable string tag for logs and serialized events.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ExportOperation => "ExportOperation",
            Self::MeOperation => "MeOperation",
            Self::MyVideosOperation => "MyVideosOperation",
            Self::CreateVideoOperation => "CreateVideoOperation",
            Self::UploadVideoOperation => "UploadVideoOperation",
            Self::ActivateVideoOperation => "ActivateVideoOperation",
            Self::VideoSettingsOperation => "VideoSettingsOperation",
            Self::DeleteVideoOperation => "DeleteVideoOperation",
            Self::VideoOperation => "VideoOperation",
        }
    }
}

impl fmt::Display for ErrorDomain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// LocalErrorCode
// ---------------------------------------------------------------------------

/// Symbolic local error code. The numeric value is stable and is what gets
/// reported alongside the domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LocalErrorCode {
    /// The source asset cannot be exported (e.g. protected content).
    AssetIsNotExportable,
    /// Not enough free space, detected before or during the transcode.
    DiskSpaceException,
    /// The transcode subsystem reported some other error.
    TranscodeError,
    /// The transcode reported success but produced no output file.
    FinishedWithNoOutput,
    /// A network collaborator call failed.
    RequestFailed,
}

impl LocalErrorCode {
    /// Numeric code.
    pub fn code(&self) -> i32 {
        match self {
            Self::AssetIsNotExportable => 1,
            Self::DiskSpaceException => 2,
            Self::TranscodeError => 3,
            Self::FinishedWithNoOutput => 4,
            Self::RequestFailed => 5,
        }
    }
}

impl fmt::Display for LocalErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AssetIsNotExportable => write!(f, "asset_is_not_exportable"),
            Self::DiskSpaceException => write!(f, "disk_space_exception"),
            Self::TranscodeError => write!(f, "transcode_error"),
            Self::FinishedWithNoOutput => write!(f, "finished_with_no_output"),
            Self::RequestFailed => write!(f, "request_failed"),
        }
    }
}

// ---------------------------------------------------------------------------
// ClassifiedError
// ---------------------------------------------------------------------------

/// An error tagged with the domain of the stage that produced it and a local
/// code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("[{domain} #{}] {description}", .code.code())]
pub struct ClassifiedError {
    /// Stage that produced the error.
    pub domain: ErrorDomain,
    /// Symbolic local error code.
    pub code: LocalErrorCode,
    /// Human-readable description.
    pub description: String,
    /// Message of the underlying error, when one was wrapped.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub underlying: Option<String>,
}

impl ClassifiedError {
    /// Create a new classified error without an underlying cause.
    pub fn new(domain: ErrorDomain, code: LocalErrorCode, description: impl Into<String>) -> Self {
        Self {
            domain,
            code,
            description: description.into(),
            underlying: None,
        }
    }

    /// Wrap an underlying error, keeping its message.
    pub fn wrap(
        domain: ErrorDomain,
        code: LocalErrorCode,
        underlying: &(dyn std::error::Error + 'static),
    ) -> Self {
        Self {
            domain,
            code,
            description: underlying.to_string(),
            underlying: Some(underlying.to_string()),
        }
    }

    /// Re-tag the error with another domain, keeping everything else.
    #[must_use]
    pub fn with_domain(mut self, domain: ErrorDomain) -> Self {
        self.domain = domain;
        self
    }

    /// Replace the local code, keeping everything else.
    #[must_use]
    pub fn with_code(mut self, code: LocalErrorCode) -> Self {
        self.code = code;
        self
    }

    /// Attach the message of an underlying error.
    #[must_use]
    pub fn with_underlying(mut self, underlying: impl Into<String>) -> Self {
        self.underlying = Some(underlying.into());
        self
    }

    /// Whether this error carries the given code.
    pub fn is(&self, code: LocalErrorCode) -> bool {
        self.code == code
    }
}

impl crate::Error {
    /// Classify a runtime error as a failed network request in `domain`.
    pub fn classify(&self, domain: ErrorDomain) -> ClassifiedError {
        ClassifiedError::wrap(domain, LocalErrorCode::RequestFailed, self)
    }
}
