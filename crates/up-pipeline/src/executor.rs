//! Upload pipeline executor.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use up_core::config::UploadConfig;
use up_core::events::{EventBus, EventPayload};
use up_core::{ClassifiedError, ErrorDomain, LocalErrorCode, StageKind, StageOutcome, UploadId};
use up_export::ExportStage;
use up_operation::{start, Operation};
use up_service::{ServiceStage, UploadService, UploadTicket, Video, VideoSettings};

/// One upload: an export stage ready to start, plus the metadata to apply
/// once the video is live.
pub struct UploadRequest {
    pub export: Arc<ExportStage>,
    pub settings: VideoSettings,
}

impl UploadRequest {
    pub fn new(export: Arc<ExportStage>) -> Self {
        Self {
            export,
            settings: VideoSettings::default(),
        }
    }

    #[must_use]
    pub fn with_settings(mut self, settings: VideoSettings) -> Self {
        self.settings = settings;
        self
    }
}

/// What a successful upload produced.
#[derive(Debug, Clone, PartialEq)]
pub struct UploadReceipt {
    pub upload_id: UploadId,
    pub video_uri: String,
    /// The exported file. Already removed when the pipeline is configured to
    /// clean up after itself.
    pub exported_file: PathBuf,
    /// The video as returned by the settings step, if settings were applied.
    pub video: Option<Video>,
}

/// Runs one upload from export to activation.
///
/// Stages run strictly one after another; a stage failure stops the
/// pipeline. Partial work is cleaned up: the exported file is removed and,
/// once a remote record exists, a failed or cancelled upload deletes it.
/// Nothing is retried.
pub struct UploadPipeline {
    id: UploadId,
    service: Arc<dyn UploadService>,
    events: Arc<EventBus>,
    remove_export_after_upload: bool,
    delete_remote_on_failure: bool,
    cancellation: CancellationToken,
}

impl UploadPipeline {
    pub fn new(service: Arc<dyn UploadService>, events: Arc<EventBus>, config: &UploadConfig) -> Self {
        Self {
            id: UploadId::new(),
            service,
            events,
            remove_export_after_upload: config.remove_export_after_upload,
            delete_remote_on_failure: config.delete_remote_on_failure,
            cancellation: CancellationToken::new(),
        }
    }

    pub fn id(&self) -> UploadId {
        self.id
    }

    /// Cancel the running stage and every stage after it.
    pub fn cancel(&self) {
        self.cancellation.cancel();
    }

    /// A token that cancels this pipeline when fired, e.g. from a signal
    /// handler.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancellation.clone()
    }

    /// Run the upload to completion.
    ///
    /// The export stage's progress block is replaced with one that publishes
    /// `StageProgress` events.
    pub async fn run(&self, request: UploadRequest) -> StageOutcome<UploadReceipt> {
        tracing::info!(upload_id = %self.id, "Upload started");
        self.events
            .publish(EventPayload::UploadStarted { upload_id: self.id });

        let outcome = self.run_stages(request).await;

        match &outcome {
            StageOutcome::Succeeded(receipt) => {
                tracing::info!(upload_id = %self.id, "Upload completed: {}", receipt.video_uri);
                self.events.publish(EventPayload::UploadCompleted {
                    upload_id: self.id,
                    video_uri: receipt.video_uri.clone(),
                });
            }
            StageOutcome::Failed(error) => {
                tracing::warn!(upload_id = %self.id, "Upload failed: {error}");
                self.events.publish(EventPayload::UploadFailed {
                    upload_id: self.id,
                    error: error.clone(),
                });
            }
            StageOutcome::Cancelled => {
                tracing::info!(upload_id = %self.id, "Upload cancelled");
                self.events
                    .publish(EventPayload::UploadCancelled { upload_id: self.id });
            }
        }
        outcome
    }

    async fn run_stages(&self, request: UploadRequest) -> StageOutcome<UploadReceipt> {
        let UploadRequest { export, settings } = request;

        // The block captures the bus and the id, never the pipeline.
        let events = Arc::clone(&self.events);
        let upload_id = self.id;
        export.set_progress_block(move |progress| {
            events.publish(EventPayload::StageProgress {
                upload_id,
                stage: StageKind::Export,
                progress,
            });
        });

        let file = match into_step(self.run_stage(&export).await) {
            Ok(file) => file,
            Err(outcome) => return outcome,
        };
        drop(export);

        let outcome = self.publish(&file, settings).await;

        if self.remove_export_after_upload {
            self.remove_export(&file).await;
        }
        outcome
    }

    /// Everything after the export: create, upload, activate, settings.
    async fn publish(&self, file: &Path, settings: VideoSettings) -> StageOutcome<UploadReceipt> {
        let size = match tokio::fs::metadata(file).await {
            Ok(meta) => meta.len(),
            Err(e) => {
                return StageOutcome::Failed(ClassifiedError::wrap(
                    ErrorDomain::ExportOperation,
                    LocalErrorCode::FinishedWithNoOutput,
                    &e,
                ))
            }
        };

        let create = ServiceStage::create_video(Arc::clone(&self.service), size);
        let ticket = match into_step(self.run_stage(&create).await) {
            Ok(ticket) => ticket,
            Err(outcome) => return outcome,
        };

        let outcome = self.complete_remote(&ticket, file, settings).await;

        if !matches!(outcome, StageOutcome::Succeeded(_)) && self.delete_remote_on_failure {
            self.delete_remote(&ticket.video_uri).await;
        }
        outcome
    }

    async fn complete_remote(
        &self,
        ticket: &UploadTicket,
        file: &Path,
        settings: VideoSettings,
    ) -> StageOutcome<UploadReceipt> {
        let upload = ServiceStage::upload_video(
            Arc::clone(&self.service),
            file.to_path_buf(),
            ticket.upload_link.clone(),
        );
        if let Err(outcome) = into_step(self.run_stage(&upload).await) {
            return outcome;
        }

        let activate =
            ServiceStage::activate_video(Arc::clone(&self.service), ticket.activation_uri.clone());
        let video_uri = match into_step(self.run_stage(&activate).await) {
            Ok(uri) => uri,
            Err(outcome) => return outcome,
        };

        let video = if settings.is_empty() {
            None
        } else {
            let apply = ServiceStage::video_settings(
                Arc::clone(&self.service),
                video_uri.clone(),
                settings,
            );
            match into_step(self.run_stage(&apply).await) {
                Ok(video) => Some(video),
                Err(outcome) => return outcome,
            }
        };

        StageOutcome::Succeeded(UploadReceipt {
            upload_id: self.id,
            video_uri,
            exported_file: file.to_path_buf(),
            video,
        })
    }

    /// Start `stage` and wait for it, cancelling it if the pipeline is
    /// cancelled first.
    async fn run_stage<O>(&self, stage: &Arc<O>) -> StageOutcome<O::Output>
    where
        O: Operation + ?Sized,
    {
        let core = stage.core();
        let kind = core.kind();

        if self.cancellation.is_cancelled() {
            stage.cancel();
        }

        self.events.publish(EventPayload::StageStarted {
            upload_id: self.id,
            stage: kind,
        });
        tracing::debug!(upload_id = %self.id, stage = %kind, operation_id = %core.id().short(), "Stage starting");
        start(stage);

        let outcome = tokio::select! {
            outcome = core.wait() => outcome,
            _ = self.cancellation.cancelled() => {
                stage.cancel();
                core.wait().await
            }
        };

        let payload = match &outcome {
            StageOutcome::Succeeded(_) => EventPayload::StageFinished {
                upload_id: self.id,
                stage: kind,
            },
            StageOutcome::Failed(error) => EventPayload::StageFailed {
                upload_id: self.id,
                stage: kind,
                error: error.clone(),
            },
            StageOutcome::Cancelled => EventPayload::StageCancelled {
                upload_id: self.id,
                stage: kind,
            },
        };
        self.events.publish(payload);
        outcome
    }

    /// Delete the remote record. Runs even after cancellation.
    async fn delete_remote(&self, video_uri: &str) {
        tracing::info!(upload_id = %self.id, "Deleting remote video {video_uri}");
        let delete = ServiceStage::delete_video(Arc::clone(&self.service), video_uri.to_string());
        start(&delete);
        if let StageOutcome::Failed(error) = delete.core().wait().await {
            tracing::warn!(upload_id = %self.id, "Failed to delete remote video {video_uri}: {error}");
            self.events.publish(EventPayload::CleanupFailed {
                upload_id: self.id,
                message: error.to_string(),
            });
        }
    }

    async fn remove_export(&self, file: &Path) {
        match tokio::fs::remove_file(file).await {
            Ok(()) => tracing::debug!(upload_id = %self.id, "Removed exported file {}", file.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                tracing::warn!(upload_id = %self.id, "Failed to remove exported file {}: {e}", file.display());
                self.events.publish(EventPayload::CleanupFailed {
                    upload_id: self.id,
                    message: format!("failed to remove {}: {e}", file.display()),
                });
            }
        }
    }
}

/// Continue with the output of a succeeded stage, or stop with the failure
/// or cancellation re-typed for the caller.
fn into_step<T, U>(outcome: StageOutcome<T>) -> Result<T, StageOutcome<U>> {
    match outcome {
        StageOutcome::Succeeded(value) => Ok(value),
        StageOutcome::Failed(error) => Err(StageOutcome::Failed(error)),
        StageOutcome::Cancelled => Err(StageOutcome::Cancelled),
    }
}
