//! Error types for the push crate.
//!
//! A run stops at the first error; every other task winds down with
//! [`PushError::Cancelled`], which is never returned to the caller.

use std::sync::Arc;

use ferry_registry::RegistryError;
use thiserror::Error;

use crate::hooks::HookError;

/// Result type alias for push operations.
pub type Result<T> = std::result::Result<T, PushError>;

/// Errors that can occur while pushing a bundle.
#[derive(Error, Debug)]
pub enum PushError {
    /// Run configuration is invalid; nothing was pushed.
    #[error("invalid configuration: {reason}")]
    InvalidConfig {
        /// Reason for invalidity.
        reason: String,
    },

    /// Preparing a destination repository failed. Every task targeting the
    /// repository reports the same underlying error.
    #[error("preparation failed for repository '{repository}': {source}")]
    PreparationFailed {
        /// Destination repository.
        repository: String,
        /// The memoized preparation error.
        #[source]
        source: Arc<PushError>,
    },

    /// A pre-push hook rejected the repository.
    #[error("pre-push hook failed for repository '{repository}': {source}")]
    HookFailed {
        /// Destination repository.
        repository: String,
        /// Error returned by the hook.
        #[source]
        source: HookError,
    },

    /// Listing existing destination tags failed.
    #[error("failed to list existing tags of '{repository}': {source}")]
    TagListingFailed {
        /// Destination repository.
        repository: String,
        /// Underlying registry error.
        #[source]
        source: RegistryError,
    },

    /// The tag already exists and the policy forbids touching it.
    #[error("tag already exists in destination registry: {reference}")]
    TagExists {
        /// Destination reference.
        reference: String,
    },

    /// A registry operation failed.
    #[error("failed to {operation} {reference}: {source}")]
    Transport {
        /// What was being done (e.g. "fetch descriptor of").
        operation: &'static str,
        /// Reference the operation targeted.
        reference: String,
        /// Underlying registry error.
        #[source]
        source: RegistryError,
    },

    /// Merging the new index with the existing one failed.
    #[error("failed to merge indexes for {reference}: {source}")]
    MergeFailed {
        /// Destination reference.
        reference: String,
        /// Underlying error.
        #[source]
        source: ferry_core::Error,
    },

    /// Converting an index to OCI media types failed.
    #[error("failed to convert index {reference} to OCI format: {source}")]
    NormalizeFailed {
        /// Source reference.
        reference: String,
        /// The error that stopped the conversion.
        #[source]
        source: Box<PushError>,
    },

    /// Content could not be built or interpreted.
    #[error("invalid content for {reference}: {source}")]
    Content {
        /// Reference or digest the content belongs to.
        reference: String,
        /// Underlying error.
        #[source]
        source: ferry_core::Error,
    },

    /// The destination holds something that is neither image nor index.
    #[error("unexpected media type {media_type} for {reference}")]
    UnexpectedMediaType {
        /// Reference that was inspected.
        reference: String,
        /// Reported media type.
        media_type: String,
    },

    /// A push task ended abnormally.
    #[error("push task aborted: {reason}")]
    TaskAborted {
        /// Description of the failure.
        reason: String,
    },

    /// The run was cancelled because another task failed.
    #[error("cancelled")]
    Cancelled,
}

impl PushError {
    /// Returns true if this error only reports that the run was cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        match self {
            Self::Cancelled => true,
            Self::PreparationFailed { source, .. } => source.is_cancelled(),
            Self::NormalizeFailed { source, .. } => source.is_cancelled(),
            _ => false,
        }
    }

    pub(crate) fn transport(
        operation: &'static str,
        reference: &impl ToString,
    ) -> impl FnOnce(RegistryError) -> Self {
        let reference = reference.to_string();
        move |source| Self::Transport {
            operation,
            reference,
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_tag_exists() {
        let err = PushError::TagExists {
            reference: "dest/app:v1".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "tag already exists in destination registry: dest/app:v1"
        );
    }

    #[test]
    fn test_preparation_failure_chains_source() {
        let inner = Arc::new(PushError::HookFailed {
            repository: "dest/app".to_string(),
            source: "quota exceeded".into(),
        });
        let err = PushError::PreparationFailed {
            repository: "dest/app".to_string(),
            source: inner,
        };
        assert!(err.to_string().contains("quota exceeded"));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_is_cancelled_looks_through_wrappers() {
        let err = PushError::PreparationFailed {
            repository: "dest/app".to_string(),
            source: Arc::new(PushError::Cancelled),
        };
        assert!(err.is_cancelled());
        assert!(!PushError::TagExists {
            reference: "x".to_string()
        }
        .is_cancelled());
    }
}
