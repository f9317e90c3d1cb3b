//! Transcode session backed by the `ffmpeg` CLI.
//!
//! Progress comes from `-progress pipe:2`: ffmpeg writes `key=value` blocks to
//! stderr, each closed by a `progress=continue` or `progress=end` line. The
//! session turns `out_time_us` into a fraction of the exported time range.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use up_core::{Error, Result};

use crate::asset::{MediaAsset, TimeRange};
use crate::command::{StreamExit, ToolCommand};
use crate::session::{ExportSettings, SessionStatus, TranscodeError, TranscodeResult, TranscodeSession};
use crate::tools::ToolRegistry;

/// Upper bound on a single transcode: 24 hours.
const TRANSCODE_TIMEOUT: Duration = Duration::from_secs(86_400);

/// Audio bitrate for re-encoding presets, in bits per second.
const AUDIO_BITRATE: u64 = 128_000;

/// What the OS reports through ffmpeg when the output volume fills up.
const DISK_FULL_MARKER: &str = "No space left on device";

/// A single ffmpeg export of one asset.
///
/// The output file gets a fresh UUID name under the configured output
/// directory, so concurrent exports never collide. Dropping the session
/// kills a running ffmpeg.
#[derive(Debug)]
pub struct FfmpegSession {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    ffmpeg: PathBuf,
    input: PathBuf,
    settings: ExportSettings,
    time_range: TimeRange,
    output_path: PathBuf,
    status: AtomicU8,
    progress: AtomicU64,
    started: AtomicBool,
    cancel: CancellationToken,
}

impl FfmpegSession {
    /// Prepare an export of the whole asset.
    ///
    /// Fails when ffmpeg is missing, the asset's time range is not
    /// exportable, or the output directory cannot be created.
    pub fn new(
        tools: &ToolRegistry,
        asset: &dyn MediaAsset,
        settings: ExportSettings,
    ) -> Result<Self> {
        let ffmpeg = tools.require("ffmpeg")?.path.clone();

        let time_range = TimeRange::covering(asset);
        time_range
            .validate()
            .map_err(|e| Error::Validation(format!("{}: {e}", asset.path().display())))?;

        std::fs::create_dir_all(&settings.output_dir)?;
        let output_path = settings
            .output_dir
            .join(format!("{}.{}", Uuid::new_v4(), settings.container.extension()));

        Ok(Self {
            inner: Arc::new(Inner {
                ffmpeg,
                input: asset.path().to_path_buf(),
                settings,
                time_range,
                output_path,
                status: AtomicU8::new(SessionStatus::Unknown as u8),
                progress: AtomicU64::new(0f64.to_bits()),
                started: AtomicBool::new(false),
                cancel: CancellationToken::new(),
            }),
        })
    }

    /// The ffmpeg argument list for this export.
    pub fn args(&self) -> Vec<String> {
        self.inner.args()
    }
}

impl TranscodeSession for FfmpegSession {
    fn time_range(&self) -> TimeRange {
        self.inner.time_range
    }

    fn estimated_output_len(&self) -> u64 {
        estimate_output_len(&self.inner.settings, self.inner.time_range.duration)
    }

    fn output_path(&self) -> &Path {
        &self.inner.output_path
    }

    fn status(&self) -> SessionStatus {
        self.inner.status()
    }

    fn progress(&self) -> f64 {
        f64::from_bits(self.inner.progress.load(Ordering::Acquire))
    }

    fn export_asynchronously(&self) -> oneshot::Receiver<TranscodeResult> {
        let (tx, rx) = oneshot::channel();

        if self.inner.started.swap(true, Ordering::AcqRel) {
            let _ = tx.send(Err(TranscodeError::Failed("export already started".into())));
            return rx;
        }
        if self.inner.cancel.is_cancelled() {
            self.inner.set_status(SessionStatus::Cancelled);
            let _ = tx.send(Err(TranscodeError::Cancelled));
            return rx;
        }

        self.inner.set_status(SessionStatus::Waiting);
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            let result = inner.run().await;
            let _ = tx.send(result);
        });
        rx
    }

    fn cancel_export(&self) {
        self.inner.cancel.cancel();
        if !self.inner.started.load(Ordering::Acquire) {
            self.inner.set_status(SessionStatus::Cancelled);
        }
    }
}

impl Drop for FfmpegSession {
    fn drop(&mut self) {
        self.inner.cancel.cancel();
    }
}

impl Inner {
    fn status(&self) -> SessionStatus {
        SessionStatus::from_u8(self.status.load(Ordering::Acquire))
    }

    fn set_status(&self, status: SessionStatus) {
        self.status.store(status as u8, Ordering::Release);
    }

    fn set_progress(&self, progress: f64) {
        self.progress.store(progress.clamp(0.0, 1.0).to_bits(), Ordering::Release);
    }

    fn args(&self) -> Vec<String> {
        let mut args: Vec<String> = ["-y", "-nostdin", "-hide_banner", "-progress", "pipe:2", "-nostats"]
            .into_iter()
            .map(String::from)
            .collect();

        if self.time_range.start > 0.0 {
            args.extend(["-ss".into(), format_secs(self.time_range.start)]);
        }
        args.extend(["-i".into(), self.input.to_string_lossy().to_string()]);
        args.extend(["-t".into(), format_secs(self.time_range.duration)]);

        match self.settings.preset.target_bitrate() {
            None => {
                args.extend(["-map", "0:v?", "-map", "0:a?", "-c", "copy"].map(String::from));
            }
            Some(total) => {
                let video = total.saturating_sub(AUDIO_BITRATE);
                args.extend(["-map", "0:v:0", "-map", "0:a:0?"].map(String::from));
                args.extend(["-c:v".into(), "libx264".into(), "-preset".into(), "medium".into()]);
                args.extend([
                    "-b:v".into(),
                    video.to_string(),
                    "-maxrate".into(),
                    (video * 3 / 2).to_string(),
                    "-bufsize".into(),
                    (video * 2).to_string(),
                ]);
                if let Some(height) = self.settings.preset.max_height() {
                    args.extend(["-vf".into(), format!("scale=-2:'min({height},ih)'")]);
                }
                args.extend(["-c:a".into(), "aac".into(), "-b:a".into(), AUDIO_BITRATE.to_string()]);
            }
        }

        if self.settings.optimize_for_network {
            args.extend(["-movflags", "+faststart"].map(String::from));
        }
        args.extend(["-f".into(), self.settings.container.muxer().into()]);
        args.push(self.output_path.to_string_lossy().to_string());
        args
    }

    async fn run(&self) -> TranscodeResult {
        let mut cmd = ToolCommand::new(self.ffmpeg.clone());
        cmd.timeout(TRANSCODE_TIMEOUT);
        cmd.args(self.args());

        tracing::info!(
            "Export: {:?} -> {:?} (preset={}, container={})",
            self.input,
            self.output_path,
            self.settings.preset,
            self.settings.container,
        );
        self.set_status(SessionStatus::Exporting);

        let duration = self.time_range.duration;
        let mut disk_full = false;
        let result = cmd
            .execute_with_stderr_callback(
                |line| {
                    if line.contains(DISK_FULL_MARKER) {
                        disk_full = true;
                    }
                    if let Some(progress) = parse_progress_line(line, duration) {
                        self.set_progress(progress);
                    }
                },
                Some(self.cancel.clone()),
            )
            .await;

        match result {
            Ok(StreamExit::Finished(_)) => {
                self.set_progress(1.0);
                self.set_status(SessionStatus::Completed);
                Ok(())
            }
            Ok(StreamExit::Cancelled) => {
                self.discard_output().await;
                self.set_status(SessionStatus::Cancelled);
                Err(TranscodeError::Cancelled)
            }
            Err(e) => {
                self.discard_output().await;
                self.set_status(SessionStatus::Failed);
                if disk_full {
                    Err(TranscodeError::DiskFull(e.to_string()))
                } else {
                    Err(e.into())
                }
            }
        }
    }

    /// Remove a partially written output file.
    async fn discard_output(&self) {
        match tokio::fs::remove_file(&self.output_path).await {
            Ok(()) => tracing::debug!("Removed partial export {:?}", self.output_path),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!("Failed to remove partial export {:?}: {e}", self.output_path),
        }
    }
}

/// Output size in bytes for `duration` seconds at the preset's bitrate.
/// Zero for passthrough.
fn estimate_output_len(settings: &ExportSettings, duration: f64) -> u64 {
    match settings.preset.target_bitrate() {
        Some(bps) if duration.is_finite() && duration > 0.0 => {
            (bps as f64 * duration / 8.0).ceil() as u64
        }
        _ => 0,
    }
}

/// Progress fraction from one `-progress` line, if the line carries one.
fn parse_progress_line(line: &str, duration: f64) -> Option<f64> {
    if line.trim() == "progress=end" {
        return Some(1.0);
    }
    let us = line.strip_prefix("out_time_us=")?.trim().parse::<i64>().ok()?;
    if us < 0 || duration <= 0.0 {
        return None;
    }
    Some((us as f64 / 1_000_000.0 / duration).clamp(0.0, 1.0))
}

fn format_secs(secs: f64) -> String {
    format!("{secs:.3}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asset::LocalAsset;
    use crate::tools::LocatedTool;
    use assert_matches::assert_matches;
    use up_core::{Container, QualityPreset};

    fn registry(ffmpeg: &Path) -> ToolRegistry {
        ToolRegistry::with_tools([LocatedTool::new("ffmpeg", ffmpeg)])
    }

    fn settings(dir: &Path, preset: QualityPreset) -> ExportSettings {
        ExportSettings {
            container: Container::Mp4,
            preset,
            output_dir: dir.to_path_buf(),
            optimize_for_network: true,
        }
    }

    fn asset(duration: Option<f64>) -> LocalAsset {
        LocalAsset::new("/media/recording.mov", duration, true)
    }

    #[test]
    fn passthrough_copies_streams_and_estimates_zero() {
        let dir = tempfile::tempdir().unwrap();
        let session = FfmpegSession::new(
            &registry(Path::new("/usr/bin/ffmpeg")),
            &asset(Some(60.0)),
            settings(dir.path(), QualityPreset::Passthrough),
        )
        .unwrap();

        let args = session.args();
        assert!(args.windows(2).any(|w| w == ["-c", "copy"]));
        assert!(args.windows(2).any(|w| w == ["-movflags", "+faststart"]));
        assert!(args.windows(2).any(|w| w == ["-t", "60.000"]));
        assert_eq!(session.estimated_output_len(), 0);
        assert_eq!(session.status(), SessionStatus::Unknown);
    }

    #[test]
    fn encoding_preset_scales_and_estimates_from_bitrate() {
        let dir = tempfile::tempdir().unwrap();
        let session = FfmpegSession::new(
            &registry(Path::new("/usr/bin/ffmpeg")),
            &asset(Some(10.0)),
            settings(dir.path(), QualityPreset::Hd720),
        )
        .unwrap();

        let args = session.args();
        assert!(args.windows(2).any(|w| w == ["-c:v", "libx264"]));
        assert!(args.windows(2).any(|w| w == ["-vf", "scale=-2:'min(720,ih)'"]));
        // 5 Mbit/s for 10 s.
        assert_eq!(session.estimated_output_len(), 6_250_000);
    }

    #[test]
    fn output_names_are_unique_and_use_container_extension() {
        let dir = tempfile::tempdir().unwrap();
        let tools = registry(Path::new("/usr/bin/ffmpeg"));
        let mut s = settings(dir.path(), QualityPreset::Passthrough);
        s.container = Container::M4v;

        let a = FfmpegSession::new(&tools, &asset(Some(5.0)), s.clone()).unwrap();
        let b = FfmpegSession::new(&tools, &asset(Some(5.0)), s).unwrap();
        assert_ne!(a.output_path(), b.output_path());
        assert_eq!(a.output_path().extension().unwrap(), "m4v");
        assert_eq!(a.output_path().parent().unwrap(), dir.path());
        assert_eq!(a.args().last().unwrap(), &a.output_path().to_string_lossy());
        assert!(a.args().windows(2).any(|w| w == ["-f", "ipod"]));
    }

    #[test]
    fn invalid_time_range_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let tools = registry(Path::new("/usr/bin/ffmpeg"));
        for duration in [None, Some(0.0)] {
            let result = FfmpegSession::new(
                &tools,
                &asset(duration),
                settings(dir.path(), QualityPreset::Low),
            );
            assert_matches!(result, Err(Error::Validation(_)));
        }
    }

    #[test]
    fn missing_ffmpeg_is_a_tool_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = FfmpegSession::new(
            &ToolRegistry::default(),
            &asset(Some(1.0)),
            settings(dir.path(), QualityPreset::Low),
        );
        assert_matches!(result, Err(Error::Tool { .. }));
    }

    #[test]
    fn progress_lines() {
        assert_eq!(parse_progress_line("out_time_us=5000000", 10.0), Some(0.5));
        assert_eq!(parse_progress_line("out_time_us=20000000", 10.0), Some(1.0));
        assert_eq!(parse_progress_line("out_time_us=N/A", 10.0), None);
        assert_eq!(parse_progress_line("out_time_us=-1", 10.0), None);
        assert_eq!(parse_progress_line("progress=end", 10.0), Some(1.0));
        assert_eq!(parse_progress_line("progress=continue", 10.0), None);
        assert_eq!(parse_progress_line("fps=29.97", 10.0), None);
    }

    #[tokio::test]
    async fn cancel_before_export_reports_cancelled() {
        let dir = tempfile::tempdir().unwrap();
        let session = FfmpegSession::new(
            &registry(Path::new("/usr/bin/ffmpeg")),
            &asset(Some(1.0)),
            settings(dir.path(), QualityPreset::Passthrough),
        )
        .unwrap();

        session.cancel_export();
        assert_eq!(session.status(), SessionStatus::Cancelled);
        let result = session.export_asynchronously().await.unwrap();
        assert_matches!(result, Err(TranscodeError::Cancelled));
    }

    #[cfg(unix)]
    mod scripted {
        use super::*;
        use std::os::unix::fs::PermissionsExt;

        /// Write an executable stand-in for ffmpeg. The output path is the
        /// last argument.
        fn fake_ffmpeg(dir: &Path, body: &str) -> PathBuf {
            let path = dir.join("ffmpeg");
            std::fs::write(&path, format!("#!/bin/sh\nfor a; do out=$a; done\n{body}\n")).unwrap();
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
            path
        }

        #[tokio::test]
        async fn successful_run_writes_output_and_reports_progress() {
            let bin = tempfile::tempdir().unwrap();
            let out = tempfile::tempdir().unwrap();
            let ffmpeg = fake_ffmpeg(
                bin.path(),
                "echo out_time_us=500000 >&2\necho progress=continue >&2\n: > \"$out\"\necho progress=end >&2",
            );
            let session = FfmpegSession::new(
                &registry(&ffmpeg),
                &asset(Some(1.0)),
                settings(out.path(), QualityPreset::Passthrough),
            )
            .unwrap();

            let rx = session.export_asynchronously();
            assert_eq!(session.status(), SessionStatus::Waiting);
            let result = rx.await.unwrap();

            assert!(result.is_ok(), "{result:?}");
            assert_eq!(session.status(), SessionStatus::Completed);
            assert_eq!(session.progress(), 1.0);
            assert!(session.output_path().exists());
        }

        #[tokio::test]
        async fn disk_full_on_stderr_is_classified() {
            let bin = tempfile::tempdir().unwrap();
            let out = tempfile::tempdir().unwrap();
            let ffmpeg = fake_ffmpeg(
                bin.path(),
                "echo \"av_interleaved_write_frame(): No space left on device\" >&2\nexit 1",
            );
            let session = FfmpegSession::new(
                &registry(&ffmpeg),
                &asset(Some(1.0)),
                settings(out.path(), QualityPreset::Low),
            )
            .unwrap();

            let result = session.export_asynchronously().await.unwrap();
            assert_matches!(result, Err(TranscodeError::DiskFull(_)));
            assert_eq!(session.status(), SessionStatus::Failed);
        }

        #[tokio::test]
        async fn other_failures_are_tool_errors() {
            let bin = tempfile::tempdir().unwrap();
            let out = tempfile::tempdir().unwrap();
            let ffmpeg = fake_ffmpeg(bin.path(), "echo \"Invalid data found\" >&2\nexit 1");
            let session = FfmpegSession::new(
                &registry(&ffmpeg),
                &asset(Some(1.0)),
                settings(out.path(), QualityPreset::Low),
            )
            .unwrap();

            let result = session.export_asynchronously().await.unwrap();
            assert_matches!(result, Err(TranscodeError::Core(Error::Tool { .. })));
        }

        #[tokio::test]
        async fn cancel_mid_export_kills_ffmpeg() {
            let bin = tempfile::tempdir().unwrap();
            let out = tempfile::tempdir().unwrap();
            let ffmpeg = fake_ffmpeg(bin.path(), "echo progress=continue >&2\nsleep 10");
            let session = FfmpegSession::new(
                &registry(&ffmpeg),
                &asset(Some(1.0)),
                settings(out.path(), QualityPreset::Passthrough),
            )
            .unwrap();

            let rx = session.export_asynchronously();
            tokio::time::sleep(Duration::from_millis(100)).await;
            session.cancel_export();

            let result = tokio::time::timeout(Duration::from_secs(5), rx)
                .await
                .unwrap()
                .unwrap();
            assert_matches!(result, Err(TranscodeError::Cancelled));
            assert_eq!(session.status(), SessionStatus::Cancelled);
        }
    }
}
