//! The terminal result of a stage.

use crate::classified::ClassifiedError;

/// How a stage ended.
///
/// Exactly one of these holds once a stage reaches a terminal state:
/// finished with an output, finished with a classified error, or cancelled
/// with neither.
#[derive(Debug, Clone, PartialEq)]
pub enum StageOutcome<T> {
    /// Finished and produced an output.
    Succeeded(T),
    /// Finished with a classified error.
    Failed(ClassifiedError),
    /// Cancelled; no output and no error were recorded.
    Cancelled,
}

impl<T> StageOutcome<T> {
    /// The output, if the stage succeeded.
    pub fn output(&self) -> Option<&T> {
        match self {
            Self::Succeeded(value) => Some(value),
            _ => None,
        }
    }

    /// The classified error, if the stage failed.
    pub fn error(&self) -> Option<&ClassifiedError> {
        match self {
            Self::Failed(err) => Some(err),
            _ => None,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Map the success value, leaving failures and cancellation untouched.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> StageOutcome<U> {
        match self {
            Self::Succeeded(value) => StageOutcome::Succeeded(f(value)),
            Self::Failed(err) => StageOutcome::Failed(err),
            Self::Cancelled => StageOutcome::Cancelled,
        }
    }
}

impl<T> From<Result<T, ClassifiedError>> for StageOutcome<T> {
    fn from(result: Result<T, ClassifiedError>) -> Self {
        match result {
            Ok(value) => Self::Succeeded(value),
            Err(err) => Self::Failed(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ErrorDomain, LocalErrorCode};

    #[test]
    fn accessors_are_mutually_exclusive() {
        let ok: StageOutcome<u32> = StageOutcome::Succeeded(7);
        assert_eq!(ok.output(), Some(&7));
        assert!(ok.error().is_none());
        assert!(!ok.is_cancelled());

        let failed: StageOutcome<u32> = StageOutcome::Failed(ClassifiedError::new(
            ErrorDomain::ExportOperation,
            LocalErrorCode::TranscodeError,
            "boom",
        ));
        assert!(failed.output().is_none());
        assert!(failed.error().is_some());

        let cancelled: StageOutcome<u32> = StageOutcome::Cancelled;
        assert!(cancelled.output().is_none());
        assert!(cancelled.error().is_none());
        assert!(cancelled.is_cancelled());
    }

    #[test]
    fn from_result_and_map() {
        let outcome: StageOutcome<u32> = Ok(2).into();
        assert_eq!(outcome.map(|v| v * 10), StageOutcome::Succeeded(20));
    }
}
