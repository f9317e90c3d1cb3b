//! Shared test harness for integration tests.
//!
//! Provides a [`ScriptedSession`] the test drives by hand, a fixed
//! [`DiskSpaceProvider`], and an in-memory [`FakeService`] that records the
//! calls it receives.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::{oneshot, Notify};

use up_core::{ClassifiedError, ErrorDomain, LocalErrorCode, StageKind};
use up_export::{
    DiskSpaceProvider, ExportStage, LocalAsset, SessionStatus, TimeRange, TranscodeError,
    TranscodeResult, TranscodeSession,
};
use up_service::{UploadService, UploadTicket, User, Video, VideoList, VideoSettings};

/// Poll interval used by stages built here.
pub const POLL: Duration = Duration::from_millis(5);

// ---------------------------------------------------------------------------
// ScriptedSession
// ---------------------------------------------------------------------------

/// A transcode session whose progress, status, and result are set by the
/// test.
pub struct ScriptedSession {
    range: TimeRange,
    estimate: u64,
    output: PathBuf,
    status: Mutex<SessionStatus>,
    progress: Mutex<f64>,
    sender: Mutex<Option<oneshot::Sender<TranscodeResult>>>,
    starts: AtomicUsize,
    cancels: AtomicUsize,
    reports_cancellation: AtomicBool,
}

impl ScriptedSession {
    pub fn new(dir: &Path, estimate: u64) -> Arc<Self> {
        Arc::new(Self {
            range: TimeRange {
                start: 0.0,
                duration: 30.0,
            },
            estimate,
            output: dir.join("export.mp4"),
            status: Mutex::new(SessionStatus::Unknown),
            progress: Mutex::new(0.0),
            sender: Mutex::new(None),
            starts: AtomicUsize::new(0),
            cancels: AtomicUsize::new(0),
            reports_cancellation: AtomicBool::new(false),
        })
    }

    /// Make `cancel_export` deliver `Err(TranscodeError::Cancelled)`, the
    /// way ffmpeg sessions do once the child is killed.
    pub fn report_cancellation(&self) {
        self.reports_cancellation.store(true, Ordering::SeqCst);
    }

    pub fn start_count(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }

    pub fn cancel_count(&self) -> usize {
        self.cancels.load(Ordering::SeqCst)
    }

    pub fn set_status(&self, status: SessionStatus) {
        *self.status.lock() = status;
    }

    pub fn set_progress(&self, progress: f64) {
        *self.progress.lock() = progress;
    }

    /// Wait until the stage has started the transcode.
    pub async fn started(&self) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while self.start_count() == 0 {
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
        })
        .await
        .expect("transcode was never started");
    }

    /// Report the transcode result, optionally writing the output file
    /// first. This is the session's completion callback firing.
    pub fn complete(&self, result: TranscodeResult, write_output: bool) {
        if write_output {
            std::fs::write(&self.output, b"exported bytes").unwrap();
        }
        let status = if result.is_ok() {
            SessionStatus::Completed
        } else {
            SessionStatus::Failed
        };
        self.set_status(status);
        if let Some(tx) = self.sender.lock().take() {
            let _ = tx.send(result);
        }
    }

    /// Start reporting progress, step through `steps`, then succeed with an
    /// output file.
    pub async fn run_to_success(&self, steps: &[f64]) {
        self.started().await;
        self.set_status(SessionStatus::Exporting);
        for &step in steps {
            self.set_progress(step);
            tokio::time::sleep(POLL * 4).await;
        }
        self.complete(Ok(()), true);
    }
}

impl TranscodeSession for ScriptedSession {
    fn time_range(&self) -> TimeRange {
        self.range
    }

    fn estimated_output_len(&self) -> u64 {
        self.estimate
    }

    fn output_path(&self) -> &Path {
        &self.output
    }

    fn status(&self) -> SessionStatus {
        *self.status.lock()
    }

    fn progress(&self) -> f64 {
        *self.progress.lock()
    }

    fn export_asynchronously(&self) -> oneshot::Receiver<TranscodeResult> {
        let (tx, rx) = oneshot::channel();
        *self.sender.lock() = Some(tx);
        self.set_status(SessionStatus::Waiting);
        self.starts.fetch_add(1, Ordering::SeqCst);
        rx
    }

    fn cancel_export(&self) {
        self.cancels.fetch_add(1, Ordering::SeqCst);
        let mut status = self.status.lock();
        if status.is_active() {
            *status = SessionStatus::Cancelled;
        }
        drop(status);
        if self.reports_cancellation.load(Ordering::SeqCst) {
            if let Some(tx) = self.sender.lock().take() {
                let _ = tx.send(Err(TranscodeError::Cancelled));
            }
        }
    }
}

// ---------------------------------------------------------------------------
// FixedDisk
// ---------------------------------------------------------------------------

/// Reports the same free space for every path.
pub struct FixedDisk(pub Option<u64>);

impl DiskSpaceProvider for FixedDisk {
    fn available_space(&self, _path: &Path) -> Option<u64> {
        self.0
    }
}

/// An export stage over `session` for an asset that is (or is not)
/// exportable, with `available` bytes free.
pub fn export_stage(
    session: &Arc<ScriptedSession>,
    exportable: bool,
    available: Option<u64>,
) -> Arc<ExportStage> {
    let asset = Arc::new(LocalAsset::new("/media/recording.mov", Some(30.0), exportable));
    let session: Arc<dyn TranscodeSession> = session.clone();
    Arc::new(ExportStage::new(asset, session, Arc::new(FixedDisk(available))).with_poll_interval(POLL))
}

// ---------------------------------------------------------------------------
// FakeService
// ---------------------------------------------------------------------------

/// In-memory upload service.
///
/// Every call is recorded by its stage label. A call can be made to fail,
/// or to hang until the caller gives up on it.
#[derive(Default)]
pub struct FakeService {
    calls: Mutex<Vec<StageKind>>,
    fail_at: Mutex<Option<StageKind>>,
    hang_at: Mutex<Option<StageKind>>,
    hanging: Notify,
}

impl FakeService {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn failing_at(kind: StageKind) -> Arc<Self> {
        let service = Self::default();
        *service.fail_at.lock() = Some(kind);
        Arc::new(service)
    }

    pub fn hanging_at(kind: StageKind) -> Arc<Self> {
        let service = Self::default();
        *service.hang_at.lock() = Some(kind);
        Arc::new(service)
    }

    pub fn calls(&self) -> Vec<StageKind> {
        self.calls.lock().clone()
    }

    /// Resolves once a call has started hanging.
    pub async fn hung(&self) {
        tokio::time::timeout(Duration::from_secs(5), self.hanging.notified())
            .await
            .expect("no call hung");
    }

    async fn record(&self, kind: StageKind) -> Result<(), ClassifiedError> {
        self.calls.lock().push(kind);
        if *self.hang_at.lock() == Some(kind) {
            self.hanging.notify_one();
            std::future::pending::<()>().await;
        }
        if *self.fail_at.lock() == Some(kind) {
            return Err(ClassifiedError::new(
                ErrorDomain::VideoOperation,
                LocalErrorCode::RequestFailed,
                format!("{kind} returned HTTP 500"),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl UploadService for FakeService {
    async fn me(&self) -> Result<User, ClassifiedError> {
        self.record(StageKind::Me).await?;
        Ok(User {
            uri: "/users/7".into(),
            name: "Test User".into(),
            link: None,
        })
    }

    async fn my_videos(&self) -> Result<VideoList, ClassifiedError> {
        self.record(StageKind::MyVideos).await?;
        Ok(VideoList::default())
    }

    async fn create_video(&self, size: u64) -> Result<UploadTicket, ClassifiedError> {
        self.record(StageKind::CreateVideo).await?;
        assert!(size > 0, "created with an empty file");
        Ok(UploadTicket {
            video_uri: "/videos/42".into(),
            upload_link: "https://upload.test/42".into(),
            activation_uri: "/users/7/uploads/42".into(),
        })
    }

    async fn upload_video(&self, source: &Path, _destination: &str) -> Result<(), ClassifiedError> {
        assert!(source.exists(), "uploading a file that does not exist");
        self.record(StageKind::UploadVideo).await
    }

    async fn activate_video(&self, _activation_uri: &str) -> Result<String, ClassifiedError> {
        self.record(StageKind::ActivateVideo).await?;
        Ok("/videos/42".into())
    }

    async fn video_settings(
        &self,
        video_uri: &str,
        settings: &VideoSettings,
    ) -> Result<Video, ClassifiedError> {
        self.record(StageKind::VideoSettings).await?;
        let mut video = Video::new(video_uri);
        video.name = settings.name.clone();
        video.privacy = settings.privacy.clone();
        Ok(video)
    }

    async fn delete_video(&self, _video_uri: &str) -> Result<(), ClassifiedError> {
        self.record(StageKind::DeleteVideo).await
    }

    async fn video(&self, video_uri: &str) -> Result<Video, ClassifiedError> {
        self.record(StageKind::Video).await?;
        Ok(Video::new(video_uri))
    }
}
