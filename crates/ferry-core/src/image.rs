//! Single-platform images: a manifest, its config and lazily read layers.

use std::sync::Arc;

use bytes::Bytes;
use oci_spec::image::{Descriptor, ImageManifest, MediaType, Platform};
use serde::Deserialize;

use crate::blob::{read_blob, BlobSource, BlobStream, InlineBlobs};
use crate::descriptor::{descriptor, DescriptorEx};
use crate::digest::Digest;
use crate::error::{Error, Result};
use crate::media_types::MediaTypeEx;
use crate::platform::PlatformEx;

/// A single-platform image or artifact.
///
/// The manifest bytes are kept exactly as fetched (or as serialized when the
/// image was built locally), so [`Image::digest`] always matches what a
/// registry stores. The config blob is held in memory; layers are read from
/// the image's [`BlobSource`] only when opened. Images are immutable;
/// rebuilding one yields a new value with a new digest.
#[derive(Debug, Clone)]
pub struct Image {
    manifest: ImageManifest,
    media_type: MediaType,
    raw: Bytes,
    config: Bytes,
    blobs: Arc<dyn BlobSource>,
}

impl PartialEq for Image {
    fn eq(&self, other: &Self) -> bool {
        self.media_type == other.media_type && self.raw == other.raw && self.config == other.config
    }
}

impl Eq for Image {}

impl Image {
    /// Builds an image from a freshly constructed manifest and in-memory
    /// layer blobs.
    ///
    /// The manifest is serialized to produce the bytes the digest is computed
    /// over.
    ///
    /// # Errors
    ///
    /// Returns an error if the manifest has no media type, if the number of
    /// layer blobs does not match, or if serialization fails.
    pub fn new(manifest: ImageManifest, config: Bytes, layers: Vec<Bytes>) -> Result<Self> {
        if manifest.layers().len() != layers.len() {
            return Err(Error::LayerCountMismatch {
                expected: manifest.layers().len(),
                actual: layers.len(),
            });
        }
        Self::build(manifest, config, Arc::new(InlineBlobs::new(layers)))
    }

    /// Builds an image from a freshly constructed manifest whose layers are
    /// read from `blobs`.
    ///
    /// # Errors
    ///
    /// Returns an error if the manifest has no media type or serialization
    /// fails.
    pub fn build(manifest: ImageManifest, config: Bytes, blobs: Arc<dyn BlobSource>) -> Result<Self> {
        let media_type = manifest
            .media_type()
            .clone()
            .ok_or_else(|| Error::InvalidManifest {
                reason: "built manifests must declare a media type".to_string(),
            })?;
        let raw = Bytes::from(serde_json::to_vec(&manifest)?);
        Self::assemble(manifest, media_type, raw, config, blobs)
    }

    /// Wraps manifest bytes fetched from a registry.
    ///
    /// `content_type` is the media type the registry reported; it is used when
    /// the manifest itself omits `mediaType`. Layers are read from `blobs`.
    ///
    /// # Errors
    ///
    /// Returns an error if the bytes are not an image manifest.
    pub fn from_raw(
        raw: Bytes,
        content_type: Option<MediaType>,
        config: Bytes,
        blobs: Arc<dyn BlobSource>,
    ) -> Result<Self> {
        let manifest = Self::parse_manifest(&raw)?;
        let media_type = manifest
            .media_type()
            .clone()
            .or(content_type)
            .unwrap_or(MediaType::ImageManifest);
        Self::assemble(manifest, media_type, raw, config, blobs)
    }

    /// Parses manifest bytes, so callers can learn which blobs to fetch.
    ///
    /// # Errors
    ///
    /// Returns an error if the bytes are not valid manifest JSON.
    pub fn parse_manifest(raw: &[u8]) -> Result<ImageManifest> {
        Ok(serde_json::from_slice(raw)?)
    }

    fn assemble(
        manifest: ImageManifest,
        media_type: MediaType,
        raw: Bytes,
        config: Bytes,
        blobs: Arc<dyn BlobSource>,
    ) -> Result<Self> {
        if media_type.is_index() {
            return Err(Error::InvalidManifest {
                reason: format!("{media_type} is an index type, not an image manifest"),
            });
        }
        Ok(Self {
            manifest,
            media_type,
            raw,
            config,
            blobs,
        })
    }

    /// Builds a new image around `manifest` that keeps this image's config
    /// and reads layers from the same source.
    ///
    /// # Errors
    ///
    /// Returns an error if the manifest has no media type or serialization
    /// fails.
    pub fn rebuild(&self, manifest: ImageManifest) -> Result<Self> {
        Self::build(manifest, self.config.clone(), Arc::clone(&self.blobs))
    }

    /// Returns the same image reading its layers from `blobs`.
    #[must_use]
    pub fn with_blob_source(mut self, blobs: Arc<dyn BlobSource>) -> Self {
        self.blobs = blobs;
        self
    }

    /// Returns the parsed manifest.
    #[must_use]
    pub const fn manifest(&self) -> &ImageManifest {
        &self.manifest
    }

    /// Returns the manifest media type.
    #[must_use]
    pub const fn media_type(&self) -> &MediaType {
        &self.media_type
    }

    /// Returns the manifest bytes the digest is computed over.
    #[must_use]
    pub const fn raw_manifest(&self) -> &Bytes {
        &self.raw
    }

    /// Returns the config blob.
    #[must_use]
    pub const fn config_blob(&self) -> &Bytes {
        &self.config
    }

    /// Returns the layer descriptors, in order.
    #[must_use]
    pub fn layers(&self) -> &[Descriptor] {
        self.manifest.layers()
    }

    /// Iterates over the layers whose blobs registries serve, skipping
    /// foreign and non-distributable layers.
    pub fn distributable_layers(&self) -> impl Iterator<Item = &Descriptor> {
        self.layers().iter().filter(|layer| layer.is_distributable())
    }

    /// Returns where the layers are read from.
    #[must_use]
    pub const fn blob_source(&self) -> &Arc<dyn BlobSource> {
        &self.blobs
    }

    /// Opens a layer blob as a stream.
    ///
    /// # Errors
    ///
    /// Returns the blob source's error.
    pub async fn open_layer(&self, layer: &Descriptor) -> Result<BlobStream> {
        self.blobs.open(layer).await
    }

    /// Reads a whole layer blob into memory.
    ///
    /// # Errors
    ///
    /// Returns the blob source's error.
    pub async fn read_layer(&self, layer: &Descriptor) -> Result<Bytes> {
        read_blob(self.blobs.as_ref(), layer).await
    }

    /// Returns the digest of the manifest.
    #[must_use]
    pub fn digest(&self) -> Digest {
        Digest::sha256(&self.raw)
    }

    /// Returns the size of the manifest in bytes.
    #[must_use]
    pub fn size(&self) -> u64 {
        self.raw.len() as u64
    }

    /// Returns a descriptor pointing at this image's manifest.
    ///
    /// # Errors
    ///
    /// Returns an error if the descriptor cannot be built.
    pub fn descriptor(&self) -> Result<Descriptor> {
        descriptor(self.media_type.clone(), &self.digest(), self.size())
    }

    /// Parses the platform fields of the config blob.
    ///
    /// # Errors
    ///
    /// Returns an error if the config blob is not JSON.
    pub fn config_file(&self) -> Result<ImageConfig> {
        Ok(serde_json::from_slice(&self.config)?)
    }

    /// Returns the platform declared by the config blob, if it declares one.
    ///
    /// # Errors
    ///
    /// Returns an error if the config blob is not JSON.
    pub fn platform(&self) -> Result<Option<Platform>> {
        self.config_file()?.platform()
    }
}

/// Platform-related fields of an image config blob.
///
/// Only the fields needed to describe the image's platform are read; the rest
/// of the config is carried as opaque bytes, so configs of non-image
/// artifacts parse too.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ImageConfig {
    /// CPU architecture.
    #[serde(default)]
    pub architecture: String,

    /// Operating system.
    #[serde(default)]
    pub os: String,

    /// CPU variant.
    #[serde(default)]
    pub variant: Option<String>,

    /// Operating system version.
    #[serde(rename = "os.version", default)]
    pub os_version: Option<String>,

    /// Operating system features.
    #[serde(rename = "os.features", default)]
    pub os_features: Option<Vec<String>>,
}

impl ImageConfig {
    /// Returns the platform, or `None` when os or architecture is missing.
    ///
    /// # Errors
    ///
    /// Returns an error if the platform cannot be built.
    pub fn platform(&self) -> Result<Option<Platform>> {
        if self.os.is_empty() || self.architecture.is_empty() {
            return Ok(None);
        }
        let mut platform =
            Platform::from_parts(&self.os, &self.architecture, self.variant.as_deref())?;
        platform.set_os_version(self.os_version.clone());
        platform.set_os_features(self.os_features.clone());
        Ok(Some(platform))
    }
}
