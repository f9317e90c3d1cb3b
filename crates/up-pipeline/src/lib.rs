//! up-pipeline: chains the export stage and the network stages into one
//! upload.
//!
//! [`UploadPipeline`] runs export, create, upload, activate, and (when there
//! is anything to apply) settings, strictly in sequence. Cancellation flows
//! from the pipeline into whichever stage is running. Lifecycle and progress
//! are published on an [`up_core::events::EventBus`].

pub mod executor;

pub use executor::{UploadPipeline, UploadReceipt, UploadRequest};
