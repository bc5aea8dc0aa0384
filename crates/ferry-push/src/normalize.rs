//! Rewriting indexes to OCI media types.
//!
//! Changing a manifest's media type changes its bytes and therefore its
//! digest, so every child is rebuilt and the index that lists it is rebuilt
//! around the new descriptors.

use async_trait::async_trait;
use futures::future::{BoxFuture, FutureExt};

use ferry_core::{
    Artifact, Descriptor, DescriptorEx, Digest, Image, ImageIndex, IndexEntry, MediaType,
    MediaTypeEx, Repository,
};
use ferry_registry::Transport;

use crate::error::{PushError, Result};

/// Where the normalizer re-fetches children from.
#[async_trait]
pub trait ArtifactSource: Send + Sync {
    /// Fetches the image with manifest digest `digest`.
    async fn fetch_image(&self, digest: &Digest) -> Result<Image>;

    /// Fetches the index with manifest digest `digest`, children included.
    async fn fetch_index(&self, digest: &Digest) -> Result<ImageIndex>;
}

/// Fetches children by digest from a repository, optionally falling back to
/// a second repository when the first does not have them.
///
/// After a merge, some children only exist at the destination, so the
/// orchestrator reads from the source first and the destination second.
#[derive(Clone, Copy)]
pub struct TransportSource<'a> {
    transport: &'a dyn Transport,
    repository: &'a Repository,
    fallback: Option<(&'a dyn Transport, &'a Repository)>,
}

impl<'a> TransportSource<'a> {
    /// Reads children from `repository` through `transport`.
    #[must_use]
    pub const fn new(transport: &'a dyn Transport, repository: &'a Repository) -> Self {
        Self {
            transport,
            repository,
            fallback: None,
        }
    }

    /// Retries not-found children against `repository` through `transport`.
    #[must_use]
    pub const fn with_fallback(
        mut self,
        transport: &'a dyn Transport,
        repository: &'a Repository,
    ) -> Self {
        self.fallback = Some((transport, repository));
        self
    }
}

#[async_trait]
impl ArtifactSource for TransportSource<'_> {
    async fn fetch_image(&self, digest: &Digest) -> Result<Image> {
        let reference = self.repository.digest(digest.clone());
        match self.transport.fetch_image(&reference).await {
            Err(err) if err.is_not_found() && self.fallback.is_some() => {
                let Some((transport, repository)) = self.fallback else {
                    return Err(PushError::transport("fetch image", &reference)(err));
                };
                let reference = repository.digest(digest.clone());
                tracing::debug!(reference = %reference, "image not in source, reading from fallback");
                transport
                    .fetch_image(&reference)
                    .await
                    .map_err(PushError::transport("fetch image", &reference))
            }
            result => result.map_err(PushError::transport("fetch image", &reference)),
        }
    }

    async fn fetch_index(&self, digest: &Digest) -> Result<ImageIndex> {
        let reference = self.repository.digest(digest.clone());
        match self.transport.fetch_index(&reference).await {
            Err(err) if err.is_not_found() && self.fallback.is_some() => {
                let Some((transport, repository)) = self.fallback else {
                    return Err(PushError::transport("fetch index", &reference)(err));
                };
                let reference = repository.digest(digest.clone());
                tracing::debug!(reference = %reference, "index not in source, reading from fallback");
                transport
                    .fetch_index(&reference)
                    .await
                    .map_err(PushError::transport("fetch index", &reference))
            }
            result => result.map_err(PushError::transport("fetch index", &reference)),
        }
    }
}

/// Returns an equivalent index in which the index and every child manifest
/// use OCI media types.
///
/// An index that is already an OCI index is returned unchanged without
/// fetching anything. Otherwise each child is re-fetched from `source` by
/// digest and rebuilt with the OCI manifest, config and layer types; its
/// descriptor keeps the platform and annotations but takes the rebuilt
/// manifest's digest, size and media type. Nested indexes are normalized the
/// same way.
///
/// # Errors
///
/// Returns the first fetch or rebuild error. A partially normalized index is
/// never returned.
pub fn normalize<'a>(
    index: &'a ImageIndex,
    source: &'a dyn ArtifactSource,
) -> BoxFuture<'a, Result<ImageIndex>> {
    async move {
        let index_digest = index.digest();
        if index.media_type() == &MediaType::ImageIndex {
            return Ok(index.clone());
        }

        let mut entries = Vec::with_capacity(index.len());
        for (descriptor, artifact) in index.entries() {
            let digest = descriptor.content_digest().map_err(content(&index_digest))?;
            let rebuilt = match artifact {
                Artifact::Image(_) => {
                    let image = source.fetch_image(&digest).await?;
                    Artifact::Image(rebuild_as_oci(&image).map_err(content(&digest))?)
                }
                Artifact::Index(_) => {
                    let nested = source.fetch_index(&digest).await?;
                    Artifact::Index(normalize(&nested, source).await?)
                }
            };

            tracing::debug!(
                original = %digest,
                rebuilt = %rebuilt.digest(),
                "rebuilt child with OCI media types"
            );
            let rebuilt_descriptor = rebuilt.descriptor().map_err(content(&digest))?;
            let mut descriptor = descriptor.clone();
            descriptor.set_media_type(rebuilt_descriptor.media_type().clone());
            descriptor.set_digest(rebuilt_descriptor.digest().clone());
            descriptor.set_size(rebuilt_descriptor.size());
            entries.push(IndexEntry::new(descriptor, rebuilt));
        }

        ImageIndex::new(MediaType::ImageIndex, entries).map_err(content(&index_digest))
    }
    .boxed()
}

/// Rebuilds an image with the OCI manifest, config and layer media types.
///
/// Config and layer bytes are carried over unchanged, so only the manifest
/// digest changes. The rebuilt image reads its layers from the same source
/// as `image`; nothing is downloaded.
///
/// # Errors
///
/// Returns an error if the new manifest cannot be serialized.
pub fn rebuild_as_oci(image: &Image) -> ferry_core::Result<Image> {
    let mut manifest = image.manifest().clone();

    let mut config = manifest.config().clone();
    config.set_media_type(MediaType::ImageConfig);
    let layers: Vec<Descriptor> = manifest
        .layers()
        .iter()
        .map(|layer| {
            let media_type = layer.media_type().to_oci_layer();
            let mut layer = layer.clone();
            layer.set_media_type(media_type);
            layer
        })
        .collect();

    manifest.set_media_type(Some(MediaType::ImageManifest));
    manifest.set_config(config);
    manifest.set_layers(layers);
    image.rebuild(manifest)
}

fn content(digest: &Digest) -> impl FnOnce(ferry_core::Error) -> PushError + '_ {
    move |source| PushError::Content {
        reference: digest.to_string(),
        source,
    }
}
