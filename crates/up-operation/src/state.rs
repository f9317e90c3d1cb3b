//! Operation lifecycle states.

use std::fmt;

/// Lifecycle of an operation.
///
/// `Finished` and `Cancelled` are terminal. Transitions only move forward:
///
/// ```text
/// Pending ──start──▶ Executing ──finish──▶ Finished
///    │                   │
///    └──────cancel───────┴──────cancel───▶ Cancelled
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationState {
    Pending,
    Executing,
    Finished,
    Cancelled,
}

impl OperationState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Finished | Self::Cancelled)
    }

    /// Whether moving from `self` to `next` is a legal transition.
    pub fn can_transition_to(&self, next: OperationState) -> bool {
        use OperationState::*;
        matches!(
            (self, next),
            (Pending, Executing) | (Pending, Cancelled) | (Executing, Finished) | (Executing, Cancelled)
        )
    }
}

impl fmt::Display for OperationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Executing => write!(f, "executing"),
            Self::Finished => write!(f, "finished"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}
