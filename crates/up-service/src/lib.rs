//! up-service: the remote video service contract and the cancellable stages
//! that call it.
//!
//! The service itself (request building, transport, response parsing) lives
//! behind [`UploadService`]. [`ServiceStage`] wraps one call as an
//! operation so it can be chained, cancelled, and classified like any other
//! stage.

pub mod models;
pub mod service;
pub mod stage;

pub use models::{UploadTicket, User, Video, VideoList, VideoSettings};
pub use service::UploadService;
pub use stage::ServiceStage;
