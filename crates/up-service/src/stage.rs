//! Network stages: one [`UploadService`] call wrapped as an operation.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::FutureExt;
use parking_lot::Mutex;

use up_core::{ClassifiedError, StageKind};
use up_operation::{Operation, OperationCore};

use crate::models::{UploadTicket, User, Video, VideoList, VideoSettings};
use crate::service::UploadService;

type ServiceCall<T> = BoxFuture<'static, Result<T, ClassifiedError>>;

/// A single service call with the operation lifecycle.
///
/// The call races the stage's cancellation token; when cancellation wins the
/// in-flight request future is dropped and nothing is reported. Errors are
/// re-tagged with the stage's domain.
pub struct ServiceStage<T> {
    core: OperationCore<T>,
    call: Mutex<Option<ServiceCall<T>>>,
}

impl<T: Clone + Send + Sync + 'static> ServiceStage<T> {
    fn new<F>(kind: StageKind, call: F) -> Arc<Self>
    where
        F: std::future::Future<Output = Result<T, ClassifiedError>> + Send + 'static,
    {
        Arc::new(Self {
            core: OperationCore::new(kind),
            call: Mutex::new(Some(call.boxed())),
        })
    }

    pub fn kind(&self) -> StageKind {
        self.core.kind()
    }
}

impl ServiceStage<User> {
    pub fn me(service: Arc<dyn UploadService>) -> Arc<Self> {
        Self::new(StageKind::Me, async move { service.me().await })
    }
}

impl ServiceStage<VideoList> {
    pub fn my_videos(service: Arc<dyn UploadService>) -> Arc<Self> {
        Self::new(StageKind::MyVideos, async move { service.my_videos().await })
    }
}

impl ServiceStage<UploadTicket> {
    pub fn create_video(service: Arc<dyn UploadService>, size: u64) -> Arc<Self> {
        Self::new(StageKind::CreateVideo, async move {
            service.create_video(size).await
        })
    }
}

impl ServiceStage<()> {
    pub fn upload_video(
        service: Arc<dyn UploadService>,
        source: PathBuf,
        destination: String,
    ) -> Arc<Self> {
        Self::new(StageKind::UploadVideo, async move {
            service.upload_video(&source, &destination).await
        })
    }

    pub fn delete_video(service: Arc<dyn UploadService>, video_uri: String) -> Arc<Self> {
        Self::new(StageKind::DeleteVideo, async move {
            service.delete_video(&video_uri).await
        })
    }
}

impl ServiceStage<String> {
    pub fn activate_video(service: Arc<dyn UploadService>, activation_uri: String) -> Arc<Self> {
        Self::new(StageKind::ActivateVideo, async move {
            service.activate_video(&activation_uri).await
        })
    }
}

impl ServiceStage<Video> {
    pub fn video_settings(
        service: Arc<dyn UploadService>,
        video_uri: String,
        settings: VideoSettings,
    ) -> Arc<Self> {
        Self::new(StageKind::VideoSettings, async move {
            service.video_settings(&video_uri, &settings).await
        })
    }

    pub fn video(service: Arc<dyn UploadService>, video_uri: String) -> Arc<Self> {
        Self::new(StageKind::Video, async move { service.video(&video_uri).await })
    }
}

#[async_trait]
impl<T: Clone + Send + Sync + 'static> Operation for ServiceStage<T> {
    type Output = T;

    fn core(&self) -> &OperationCore<T> {
        &self.core
    }

    async fn main(&self) {
        let kind = self.core.kind();
        let operation_id = self.core.id().short();

        if self.core.is_cancelled() {
            return;
        }
        let Some(call) = self.call.lock().take() else {
            tracing::warn!(%operation_id, stage = %kind, "Service call already consumed");
            return;
        };

        tracing::debug!(%operation_id, stage = %kind, "Calling service");
        let result = tokio::select! {
            _ = self.core.cancellation().cancelled() => {
                tracing::debug!(%operation_id, stage = %kind, "Service call abandoned on cancellation");
                return;
            }
            result = call => result,
        };

        let result = result.map_err(|e| e.with_domain(kind.error_domain()));
        if let Err(ref e) = result {
            tracing::warn!(%operation_id, stage = %kind, "Service call failed: {e}");
        }
        self.core.finish(result);
    }
}

impl<T> fmt::Debug for ServiceStage<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceStage").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use up_core::{ErrorDomain, LocalErrorCode, StageOutcome};
    use up_operation::{start, OperationState};

    /// Answers every call immediately except `upload_video`, which hangs.
    #[derive(Default)]
    struct Canned {
        deletes: AtomicUsize,
    }

    /// Tagged with a domain no failing stage here owns, so re-tagging shows.
    fn failure() -> ClassifiedError {
        ClassifiedError::new(ErrorDomain::MeOperation, LocalErrorCode::RequestFailed, "HTTP 404")
    }

    #[async_trait]
    impl UploadService for Canned {
        async fn me(&self) -> Result<User, ClassifiedError> {
            Ok(User {
                uri: "/users/1".into(),
                name: "Ada".into(),
                link: None,
            })
        }
        async fn my_videos(&self) -> Result<VideoList, ClassifiedError> {
            Ok(VideoList::default())
        }
        async fn create_video(&self, size: u64) -> Result<UploadTicket, ClassifiedError> {
            Ok(UploadTicket {
                video_uri: format!("/videos/{size}"),
                upload_link: "https://upload.example/1".into(),
                activation_uri: "/activate/1".into(),
            })
        }
        async fn upload_video(&self, _source: &Path, _destination: &str) -> Result<(), ClassifiedError> {
            futures::future::pending().await
        }
        async fn activate_video(&self, _activation_uri: &str) -> Result<String, ClassifiedError> {
            Ok("/videos/1".into())
        }
        async fn video_settings(
            &self,
            video_uri: &str,
            settings: &VideoSettings,
        ) -> Result<Video, ClassifiedError> {
            let mut video = Video::new(video_uri);
            video.name = settings.name.clone();
            Ok(video)
        }
        async fn delete_video(&self, _video_uri: &str) -> Result<(), ClassifiedError> {
            self.deletes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
        async fn video(&self, _video_uri: &str) -> Result<Video, ClassifiedError> {
            Err(failure())
        }
    }

    #[tokio::test]
    async fn successful_call_is_the_output() {
        let service: Arc<dyn UploadService> = Arc::new(Canned::default());
        let stage = ServiceStage::create_video(service, 1024);
        assert_eq!(stage.kind(), StageKind::CreateVideo);
        start(&stage);
        let outcome = stage.core().wait().await;
        assert_matches!(outcome, StageOutcome::Succeeded(ref t) if t.video_uri == "/videos/1024");
    }

    #[tokio::test]
    async fn errors_are_retagged_with_the_stage_domain() {
        let service: Arc<dyn UploadService> = Arc::new(Canned::default());
        let stage = ServiceStage::video(service, "/videos/9".into());
        start(&stage);
        let error = stage.core().wait().await.error().cloned().unwrap();
        assert_eq!(error.domain, ErrorDomain::VideoOperation);
        assert_eq!(error.code, LocalErrorCode::RequestFailed);

        let service: Arc<dyn UploadService> = Arc::new(Canned::default());
        let stage = ServiceStage::video_settings(service, "/videos/9".into(), VideoSettings::default());
        start(&stage);
        assert!(stage.core().wait().await.output().is_some());
    }

    #[tokio::test]
    async fn cancel_abandons_a_hanging_call() {
        let service: Arc<dyn UploadService> = Arc::new(Canned::default());
        let stage = ServiceStage::upload_video(service, PathBuf::from("/tmp/a.mp4"), "https://upload".into());
        start(&stage);
        tokio::time::sleep(Duration::from_millis(20)).await;
        stage.cancel();

        let outcome = tokio::time::timeout(Duration::from_secs(1), stage.core().wait())
            .await
            .unwrap();
        assert_eq!(outcome, StageOutcome::Cancelled);
        assert_eq!(stage.core().state(), OperationState::Cancelled);
    }

    #[tokio::test]
    async fn each_step_has_its_own_label() {
        let canned = Arc::new(Canned::default());
        let service: Arc<dyn UploadService> = canned.clone();

        let me = ServiceStage::me(service.clone());
        let list = ServiceStage::my_videos(service.clone());
        let activate = ServiceStage::activate_video(service.clone(), "/activate/1".into());
        let delete = ServiceStage::delete_video(service, "/videos/1".into());
        assert_eq!(me.kind(), StageKind::Me);
        assert_eq!(list.kind(), StageKind::MyVideos);
        assert_eq!(activate.kind(), StageKind::ActivateVideo);
        assert_eq!(delete.kind(), StageKind::DeleteVideo);

        start(&delete);
        delete.core().wait().await;
        assert_eq!(canned.deletes.load(Ordering::SeqCst), 1);
    }
}
