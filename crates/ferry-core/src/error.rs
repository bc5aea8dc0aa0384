//! Error types for ferry core operations.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using [`Error`] as the error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while building or parsing artifact values.
#[derive(Error, Debug)]
pub enum Error {
    /// Digest string is not `<algorithm>:<hex>`.
    #[error("Invalid digest '{value}': {reason}")]
    InvalidDigest {
        /// The rejected digest string.
        value: String,
        /// Why it was rejected.
        reason: String,
    },

    /// Digest algorithm is not one ferry can compute.
    #[error("Unsupported digest algorithm: {algorithm}")]
    UnsupportedDigestAlgorithm {
        /// Algorithm name.
        algorithm: String,
    },

    /// Reference, repository or tag failed validation.
    #[error("Invalid reference '{reference}': {reason}")]
    InvalidReference {
        /// The rejected reference.
        reference: String,
        /// Why it was rejected.
        reason: String,
    },

    /// Platform string is not `os/arch[/variant]`.
    #[error("Invalid platform: {value}")]
    InvalidPlatform {
        /// The rejected platform string.
        value: String,
    },

    /// Manifest content does not match what it claims to be.
    #[error("Invalid manifest: {reason}")]
    InvalidManifest {
        /// Reason the manifest is invalid.
        reason: String,
    },

    /// Number of layer blobs does not match the manifest's layer descriptors.
    #[error("Manifest lists {expected} layers but {actual} blobs were supplied")]
    LayerCountMismatch {
        /// Layers listed in the manifest.
        expected: usize,
        /// Layer blobs supplied.
        actual: usize,
    },

    /// An OCI image-format value could not be built.
    #[error("Invalid OCI content: {0}")]
    OciSpec(#[from] oci_spec::OciSpecError),

    /// A blob source does not hold the requested blob.
    #[error("Blob {digest} not found")]
    BlobNotFound {
        /// Digest of the missing blob.
        digest: String,
    },

    /// A blob source failed while opening or streaming a blob.
    #[error("Failed to read blob {digest}: {source}")]
    BlobUnavailable {
        /// Digest of the blob.
        digest: String,
        /// Underlying failure.
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// JSON serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration file could not be read.
    #[error("Failed to read configuration from {path}: {source}")]
    ConfigRead {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Configuration file is not valid YAML for the expected shape.
    #[error("Failed to parse configuration: {source}")]
    ConfigParse {
        /// Underlying YAML error.
        #[source]
        source: serde_yaml::Error,
    },
}
