use std::path::Path;

use async_trait::async_trait;

use up_core::ClassifiedError;

use crate::models::{UploadTicket, User, Video, VideoList, VideoSettings};

/// The remote video service, one async method per API step.
///
/// Failures come back as [`ClassifiedError`]s; the calling stage re-tags
/// them with its own domain.
#[async_trait]
pub trait UploadService: Send + Sync {
    async fn me(&self) -> Result<User, ClassifiedError>;

    async fn my_videos(&self) -> Result<VideoList, ClassifiedError>;

    /// Create a remote video record sized for `size` bytes.
    async fn create_video(&self, size: u64) -> Result<UploadTicket, ClassifiedError>;

    /// Send the file at `source` to `destination` (an upload link from
    /// [`create_video`](Self::create_video)).
    async fn upload_video(&self, source: &Path, destination: &str) -> Result<(), ClassifiedError>;

    /// Activate an uploaded video. Returns the video's URI.
    async fn activate_video(&self, activation_uri: &str) -> Result<String, ClassifiedError>;

    async fn video_settings(
        &self,
        video_uri: &str,
        settings: &VideoSettings,
    ) -> Result<Video, ClassifiedError>;

    async fn delete_video(&self, video_uri: &str) -> Result<(), ClassifiedError>;

    async fn video(&self, video_uri: &str) -> Result<Video, ClassifiedError>;
}
