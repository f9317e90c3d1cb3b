//! Stage labels used to correlate diagnostics across a pipeline run.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::classified::ErrorDomain;

/// The kind of work a stage performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StageKind {
    Export,
    Me,
    MyVideos,
    CreateVideo,
    UploadVideo,
    ActivateVideo,
    VideoSettings,
    DeleteVideo,
    Video,
}

impl StageKind {
    /// Stable label attached to every task a stage issues.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Export => "Export",
            Self::Me => "Me",
            Self::MyVideos => "MyVideos",
            Self::CreateVideo => "CreateVideo",
            Self::UploadVideo => "UploadVideo",
            Self::ActivateVideo => "ActivateVideo",
            Self::VideoSettings => "VideoSettings",
            Self::DeleteVideo => "DeleteVideo",
            Self::Video => "Video",
        }
    }

    /// The error domain used to tag failures of this stage.
    pub fn error_domain(&self) -> ErrorDomain {
        match self {
            Self::Export => ErrorDomain::ExportOperation,
            Self::Me => ErrorDomain::MeOperation,
            Self::MyVideos => ErrorDomain::MyVideosOperation,
            Self::CreateVideo => ErrorDomain::CreateVideoOperation,
            Self::UploadVideo => ErrorDomain::UploadVideoOperation,
            Self::ActivateVideo => ErrorDomain::ActivateVideoOperation,
            Self::VideoSettings => ErrorDomain::VideoSettingsOperation,
            Self::DeleteVideo => ErrorDomain::DeleteVideoOperation,
            Self::Video => ErrorDomain::VideoOperation,
        }
    }
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}
