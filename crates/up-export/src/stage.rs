//! The export stage: turns a recorded asset into an upload-ready file.
//!
//! [`ExportStage`] runs, in order, a cancellation checkpoint, the
//! exportability check, disk-space admission control, and then the
//! asynchronous transcode. While the transcode is queued or running a
//! background task polls its progress into the stage's progress block. The
//! transcode result is classified into a [`ClassifiedError`] or the output
//! path and reported through the operation core exactly once, unless the
//! stage was cancelled first.
//!
//! Spawned tasks hold only the pieces they need (core, session, progress
//! slot), never the stage itself or whoever owns it.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

use up_core::{ClassifiedError, ErrorDomain, LocalErrorCode, StageKind};
use up_operation::{Operation, OperationCore, OperationState, ProgressSlot};

use crate::asset::MediaAsset;
use crate::disk::{check_admission, DiskSpaceProvider, DiskSpaceStatus};
use crate::ffmpeg::FfmpegSession;
use crate::session::{ExportSettings, TranscodeError, TranscodeResult, TranscodeSession};
use crate::tools::ToolRegistry;

/// Default interval between progress polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

const DOMAIN: ErrorDomain = ErrorDomain::ExportOperation;

pub struct ExportStage {
    core: Arc<OperationCore<PathBuf>>,
    asset: Arc<dyn MediaAsset>,
    session: Arc<dyn TranscodeSession>,
    disk: Arc<dyn DiskSpaceProvider>,
    progress: Arc<ProgressSlot>,
    poll_interval: Duration,
    /// Stops the progress poller. A child of the core's cancellation token.
    poll_stop: CancellationToken,
}

impl ExportStage {
    /// Build a stage around an already created session.
    ///
    /// # Panics
    ///
    /// Panics if the session's time range is empty, indefinite, or invalid.
    /// That is a configuration defect, not a runtime condition.
    pub fn new(
        asset: Arc<dyn MediaAsset>,
        session: Arc<dyn TranscodeSession>,
        disk: Arc<dyn DiskSpaceProvider>,
    ) -> Self {
        let range = session.time_range();
        if let Err(e) = range.validate() {
            panic!(
                "export session for {} has an unusable time range {range:?}: {e}",
                asset.path().display()
            );
        }

        let core = Arc::new(OperationCore::new(StageKind::Export));
        let poll_stop = core.cancellation().child_token();
        Self {
            core,
            asset,
            session,
            disk,
            progress: Arc::new(ProgressSlot::new()),
            poll_interval: DEFAULT_POLL_INTERVAL,
            poll_stop,
        }
    }

    /// Build a stage that exports `asset` with ffmpeg.
    ///
    /// # Panics
    ///
    /// Panics if the ffmpeg session cannot be created (ffmpeg missing,
    /// unusable time range, output directory not creatable).
    pub fn from_asset(
        tools: &ToolRegistry,
        asset: Arc<dyn MediaAsset>,
        settings: ExportSettings,
        disk: Arc<dyn DiskSpaceProvider>,
    ) -> Self {
        let session = match FfmpegSession::new(tools, asset.as_ref(), settings) {
            Ok(session) => session,
            Err(e) => panic!(
                "cannot create export session for {}: {e}",
                asset.path().display()
            ),
        };
        Self::new(asset, Arc::new(session), disk)
    }

    #[must_use]
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Install the progress block. It may be called from a background task
    /// and is never called after cancellation or completion.
    pub fn set_progress_block(&self, block: impl Fn(f64) + Send + Sync + 'static) {
        self.progress.set(block);
    }

    pub fn clear_progress_block(&self) {
        self.progress.clear();
    }

    /// Last progress value delivered to the progress block.
    pub fn progress(&self) -> f64 {
        self.progress.last()
    }

    pub fn state(&self) -> OperationState {
        self.core.state()
    }

    /// The exported file, set only when finished successfully.
    pub fn output(&self) -> Option<PathBuf> {
        self.core.output()
    }

    /// The classified error, set only when finished with a failure.
    pub fn error(&self) -> Option<ClassifiedError> {
        self.core.error()
    }

    /// Where the session writes its output, whether or not it exists yet.
    pub fn output_path(&self) -> &Path {
        self.session.output_path()
    }

    fn fail(&self, error: ClassifiedError) {
        tracing::warn!(operation_id = %self.core.id().short(), "Export failed: {error}");
        self.progress.clear();
        self.core.finish(Err(error));
    }

    fn spawn_progress_poller(&self) {
        let session = Arc::clone(&self.session);
        let progress = Arc::clone(&self.progress);
        let stop = self.poll_stop.clone();
        let interval = self.poll_interval;

        tokio::spawn(async move {
            while session.status().is_active() && !stop.is_cancelled() {
                progress.publish(session.progress());
                tokio::select! {
                    _ = stop.cancelled() => break,
                    _ = tokio::time::sleep(interval) => {}
                }
            }
        });
    }

    fn spawn_completion_handler(&self, rx: oneshot::Receiver<TranscodeResult>) {
        let core = Arc::clone(&self.core);
        let session = Arc::clone(&self.session);
        let progress = Arc::clone(&self.progress);
        let poll_stop = self.poll_stop.clone();

        tokio::spawn(async move {
            let result = rx.await;
            poll_stop.cancel();

            if core.is_cancelled() {
                tracing::debug!(operation_id = %core.id().short(), "Transcode returned after cancellation; ignoring");
                return;
            }

            let outcome = match result {
                Ok(Ok(())) => {
                    let path = session.output_path();
                    if tokio::fs::try_exists(path).await.unwrap_or(false) {
                        Ok(path.to_path_buf())
                    } else {
                        tracing::error!(
                            operation_id = %core.id().short(),
                            "Transcode reported success but {} does not exist",
                            path.display()
                        );
                        Err(ClassifiedError::new(
                            DOMAIN,
                            LocalErrorCode::FinishedWithNoOutput,
                            "Export session finished with no error and no output URL",
                        ))
                    }
                }
                Ok(Err(e)) => {
                    let error = classify_transcode_error(&e);
                    tracing::warn!(operation_id = %core.id().short(), "Export failed: {error}");
                    Err(error)
                }
                Err(_) => {
                    let error = ClassifiedError::new(
                        DOMAIN,
                        LocalErrorCode::TranscodeError,
                        "Transcode session ended without reporting a result",
                    );
                    tracing::warn!(operation_id = %core.id().short(), "Export failed: {error}");
                    Err(error)
                }
            };

            progress.clear();
            if let Ok(ref path) = outcome {
                tracing::info!(operation_id = %core.id().short(), "Export finished: {}", path.display());
            }
            core.finish(outcome);
        });
    }
}

#[async_trait]
impl Operation for ExportStage {
    type Output = PathBuf;

    fn core(&self) -> &OperationCore<PathBuf> {
        &self.core
    }

    async fn main(&self) {
        let operation_id = self.core.id().short();

        if self.core.is_cancelled() {
            tracing::debug!(%operation_id, "Export cancelled before it began");
            return;
        }

        if !self.asset.is_exportable() {
            self.fail(ClassifiedError::new(
                DOMAIN,
                LocalErrorCode::AssetIsNotExportable,
                "Asset is not exportable",
            ));
            return;
        }

        let required = self.session.estimated_output_len();
        let output_dir = self.session.output_path().parent().unwrap_or(Path::new("."));
        if let DiskSpaceStatus::InsufficientSpace {
            available_bytes,
            required_bytes,
        } = check_admission(self.disk.as_ref(), output_dir, required)
        {
            self.fail(
                ClassifiedError::new(
                    DOMAIN,
                    LocalErrorCode::DiskSpaceException,
                    "Not enough disk space to copy asset",
                )
                .with_underlying(format!(
                    "{available_bytes} bytes available, {required_bytes} bytes required"
                )),
            );
            return;
        }

        tracing::debug!(%operation_id, estimated_bytes = required, "Starting transcode");
        let rx = self.session.export_asynchronously();
        self.spawn_progress_poller();
        self.spawn_completion_handler(rx);
    }

    /// Cancels the operation, drops the progress block, and stops the
    /// transcode.
    fn cancel(&self) {
        self.core.cancel();
        self.progress.clear();
        self.session.cancel_export();
    }
}

impl Drop for ExportStage {
    fn drop(&mut self) {
        // Cancel first so the session's answer to `cancel_export` is ignored.
        self.core.cancel();
        self.progress.clear();
        self.poll_stop.cancel();
        self.session.cancel_export();
    }
}

/// Map a transcode failure into the export error taxonomy. Running out of
/// space mid-transcode is the same condition as failing admission.
pub fn classify_transcode_error(error: &TranscodeError) -> ClassifiedError {
    match error {
        TranscodeError::DiskFull(_) => ClassifiedError::new(
            DOMAIN,
            LocalErrorCode::DiskSpaceException,
            "Not enough disk space to copy asset",
        )
        .with_underlying(error.to_string()),
        other => ClassifiedError::wrap(DOMAIN, LocalErrorCode::TranscodeError, other),
    }
}
