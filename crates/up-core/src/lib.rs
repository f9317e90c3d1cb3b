//! up-core: shared types, ids, errors, configuration, and event system.
//!
//! This crate is the foundational dependency for all other up-* crates,
//! providing the stage outcome and classified error vocabulary, type-safe
//! identifiers, a unified runtime error type, media-domain enums, application
//! configuration, and a broadcast event bus.

pub mod classified;
pub mod config;
pub mod error;
pub mod events;
pub mod ids;
pub mod media;
pub mod outcome;
pub mod stage;

// Re-export the most commonly used items at the crate root.
pub use classified::{ClassifiedError, ErrorDomain, LocalErrorCode};
pub use error::{Error, Result};
pub use ids::*;
pub use media::*;
pub use outcome::StageOutcome;
pub use stage::StageKind;
