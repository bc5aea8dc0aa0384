//! Shared run state: the cancellation flag and the first error.

use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;

use crate::error::{PushError, Result};

/// Cancellation state shared by every task of one run.
///
/// The first real error wins; later errors and cancellation notices are
/// dropped.
#[derive(Debug, Default)]
pub(crate) struct RunState {
    cancelled: AtomicBool,
    first_error: Mutex<Option<PushError>>,
}

impl RunState {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Returns `Err(Cancelled)` once any task has failed.
    pub(crate) fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            return Err(PushError::Cancelled);
        }
        Ok(())
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// Records a task failure and cancels the run.
    pub(crate) fn fail(&self, err: PushError) {
        if err.is_cancelled() {
            return;
        }
        let mut first = self.first_error.lock();
        if first.is_none() {
            tracing::debug!(error = %err, "cancelling run after first error");
            *first = Some(err);
        }
        self.cancelled.store(true, Ordering::Release);
    }

    pub(crate) fn take_error(&self) -> Option<PushError> {
        self.first_error.lock().take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_error_wins() {
        let run = RunState::new();
        assert!(run.check().is_ok());

        run.fail(PushError::TagExists {
            reference: "first".to_string(),
        });
        run.fail(PushError::TagExists {
            reference: "second".to_string(),
        });

        assert!(matches!(run.check(), Err(PushError::Cancelled)));
        match run.take_error() {
            Some(PushError::TagExists { reference }) => assert_eq!(reference, "first"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_cancellation_is_not_recorded() {
        let run = RunState::new();
        run.fail(PushError::Cancelled);
        assert!(run.check().is_ok());
        assert!(run.take_error().is_none());
    }
}
