//! Domain objects returned by the remote video service.

use serde::{Deserialize, Serialize};

use up_core::config::UploadSettingsConfig;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub uri: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Video {
    pub uri: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
    /// Transcode / availability status as reported by the service.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub privacy: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
}

impl Video {
    pub fn new(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            name: None,
            description: None,
            link: None,
            status: None,
            privacy: None,
            duration: None,
        }
    }
}

/// One page of the user's videos.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VideoList {
    pub total: u64,
    pub page: u32,
    pub per_page: u32,
    #[serde(default)]
    pub data: Vec<Video>,
}

/// What the service hands back when a video record is created: where to send
/// the bytes and how to activate the record afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadTicket {
    pub video_uri: String,
    pub upload_link: String,
    pub activation_uri: String,
}

/// Metadata applied to a video after activation. Unset fields are left
/// unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub privacy: Option<String>,
}

impl VideoSettings {
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.description.is_none() && self.privacy.is_none()
    }
}

impl From<&UploadSettingsConfig> for VideoSettings {
    fn from(config: &UploadSettingsConfig) -> Self {
        Self {
            name: config.title.clone(),
            description: config.description.clone(),
            privacy: config.privacy.clone(),
        }
    }
}
