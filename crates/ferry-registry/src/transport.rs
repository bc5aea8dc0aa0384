//! The seam between replication logic and a concrete registry.

use async_trait::async_trait;
use ferry_core::{Descriptor, Image, ImageIndex, Reference, Repository};

use crate::error::RegistryError;

/// Operations a replication run needs from a registry.
///
/// [`RegistryClient`](crate::RegistryClient) implements this over HTTP;
/// tests use an in-memory implementation.
///
/// Implementations report missing content as [`RegistryError::NotFound`]
/// and denied access as [`RegistryError::Forbidden`] so callers can apply
/// [`RegistryError::is_absent`].
#[async_trait]
pub trait Transport: Send + Sync {
    /// Lists the tags of a repository.
    async fn list_tags(&self, repository: &Repository) -> Result<Vec<String>, RegistryError>;

    /// Resolves a reference to the descriptor of its manifest.
    async fn fetch_descriptor(&self, reference: &Reference) -> Result<Descriptor, RegistryError>;

    /// Fetches a single-platform image with its config. Layers are read
    /// lazily from the image's blob source.
    async fn fetch_image(&self, reference: &Reference) -> Result<Image, RegistryError>;

    /// Fetches an index and, recursively, every child it references.
    async fn fetch_index(&self, reference: &Reference) -> Result<ImageIndex, RegistryError>;

    /// Writes an image's blobs and manifest under `reference`.
    async fn write_image(&self, reference: &Reference, image: &Image) -> Result<(), RegistryError>;

    /// Writes every child of `index` by digest, then the index itself under
    /// `reference`.
    async fn write_index(
        &self,
        reference: &Reference,
        index: &ImageIndex,
    ) -> Result<(), RegistryError>;
}
