//! Error types for registry operations.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur during registry operations.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// Failed to connect to registry.
    #[error("Failed to connect to registry at {url}: {source}")]
    ConnectionFailed {
        /// Registry URL.
        url: String,
        /// Underlying error.
        #[source]
        source: reqwest::Error,
    },

    /// Registry rejected the credentials (HTTP 401).
    #[error("Authentication failed: {message}")]
    AuthenticationFailed {
        /// Error message.
        message: String,
    },

    /// Registry denied access to the content (HTTP 403).
    #[error("Access to {reference} is forbidden")]
    Forbidden {
        /// Reference or repository that was denied.
        reference: String,
    },

    /// Content does not exist (HTTP 404).
    #[error("Not found: {reference}")]
    NotFound {
        /// Reference or repository that was looked up.
        reference: String,
    },

    /// Any other non-success HTTP status.
    #[error("HTTP error from registry: {status} - {message}")]
    HttpError {
        /// HTTP status code.
        status: u16,
        /// Error message.
        message: String,
    },

    /// Fetched bytes do not hash to the digest they were requested by.
    #[error("Digest mismatch for {reference}: expected {expected}, got {actual}")]
    DigestMismatch {
        /// Reference being fetched.
        reference: String,
        /// Expected digest.
        expected: String,
        /// Digest of the received bytes.
        actual: String,
    },

    /// Registry returned a manifest of the wrong kind.
    #[error("Unexpected media type {media_type} for {reference}")]
    UnexpectedMediaType {
        /// Reference being fetched.
        reference: String,
        /// Media type the registry reported.
        media_type: String,
    },

    /// Manifest or blob content could not be interpreted.
    #[error("Invalid content for {reference}: {source}")]
    InvalidContent {
        /// Reference being fetched.
        reference: String,
        /// Underlying error.
        #[source]
        source: ferry_core::Error,
    },

    /// A layer could not be read from the image's blob source.
    #[error("Failed to read blob {digest}: {source}")]
    BlobReadFailed {
        /// Digest of the blob.
        digest: String,
        /// Underlying error.
        #[source]
        source: ferry_core::Error,
    },

    /// Blob upload failed.
    #[error("Failed to upload blob: {message}")]
    UploadFailed {
        /// Error message.
        message: String,
    },

    /// Manifest push failed.
    #[error("Failed to push manifest {reference}: {message}")]
    ManifestPushFailed {
        /// Destination reference.
        reference: String,
        /// Error message.
        message: String,
    },

    /// Invalid URL.
    #[error("Invalid URL: {url}")]
    InvalidUrl {
        /// URL string.
        url: String,
    },

    /// CA certificate could not be loaded.
    #[error("Invalid CA certificate: {message}")]
    InvalidCertificate {
        /// Error message.
        message: String,
    },

    /// File I/O error.
    #[error("File I/O error at {path}: {source}")]
    IoError {
        /// File path.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// JSON serialization/deserialization error.
    #[error("JSON error: {source}")]
    JsonError {
        /// Underlying error.
        #[source]
        source: serde_json::Error,
    },
}

impl RegistryError {
    /// Maps a non-success HTTP status onto the error taxonomy.
    #[must_use]
    pub fn from_status(status: u16, reference: impl Into<String>, body: String) -> Self {
        match status {
            401 => Self::AuthenticationFailed {
                message: if body.is_empty() {
                    format!("registry rejected credentials for {}", reference.into())
                } else {
                    body
                },
            },
            403 => Self::Forbidden {
                reference: reference.into(),
            },
            404 => Self::NotFound {
                reference: reference.into(),
            },
            _ => Self::HttpError {
                status,
                message: body,
            },
        }
    }

    /// Returns true if the content does not exist.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Returns true if the registry answered "no existing content": either
    /// not found or forbidden.
    ///
    /// Registries that hide repositories from callers without pull access
    /// answer 403 for repositories that do not exist yet.
    #[must_use]
    pub const fn is_absent(&self) -> bool {
        matches!(self, Self::NotFound { .. } | Self::Forbidden { .. })
    }
}

impl From<reqwest::Error> for RegistryError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_connect() {
            Self::ConnectionFailed {
                url: err
                    .url()
                    .map_or_else(|| "unknown".to_string(), ToString::to_string),
                source: err,
            }
        } else {
            Self::HttpError {
                status: err.status().map_or(0, |s| s.as_u16()),
                message: err.to_string(),
            }
        }
    }
}

impl From<serde_json::Error> for RegistryError {
    fn from(err: serde_json::Error) -> Self {
        Self::JsonError { source: err }
    }
}
