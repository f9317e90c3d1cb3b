//! # up-operation
//!
//! The cancellable unit of work every upload stage is built on.
//!
//! This crate provides:
//!
//! - **[`OperationState`]** -- the `pending -> executing -> {finished |
//!   cancelled}` lifecycle and its transition rules.
//! - **[`OperationCore`]** -- state, cancellation flag, outcome, and the
//!   one-shot completion signal, all guarded so that cancellation racing with
//!   completion resolves to exactly one terminal state.
//! - **[`Operation`]** trait and [`start`] -- the work entry point a concrete
//!   stage implements, and how an owner kicks it off.
//! - **[`ProgressSlot`]** -- the progress sink an owner installs, safe to clear
//!   while another task is publishing through it.

pub mod operation;
pub mod progress;
pub mod state;

pub use operation::{start, CompletionBlock, Operation, OperationCore};
pub use progress::{ProgressBlock, ProgressSlot};
pub use state::OperationState;
