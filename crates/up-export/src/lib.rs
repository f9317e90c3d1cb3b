//! up-export: the export stage and the pieces it drives.
//!
//! - [`command`]: external tool invocation with timeout, streaming stderr, and
//!   cancellation.
//! - [`tools`]: discovery of `ffmpeg` / `ffprobe`.
//! - [`asset`]: source media handles and the exported time range.
//! - [`session`]: the transcode session contract.
//! - [`ffmpeg`]: an ffmpeg-backed transcode session.
//! - [`disk`]: free-space queries and admission control.
//! - [`stage`]: [`ExportStage`], the cancellable export operation.

pub mod asset;
pub mod command;
pub mod disk;
pub mod ffmpeg;
pub mod session;
pub mod stage;
pub mod tools;

pub use asset::{LocalAsset, MediaAsset, TimeRange, TimeRangeError};
pub use command::{StreamExit, ToolCommand, ToolOutput};
pub use disk::{check_admission, DiskSpaceProvider, DiskSpaceStatus, SystemDiskSpace};
pub use ffmpeg::FfmpegSession;
pub use session::{ExportSettings, SessionStatus, TranscodeError, TranscodeResult, TranscodeSession};
pub use stage::ExportStage;
pub use tools::{LocatedTool, ToolInfo, ToolRegistry};
