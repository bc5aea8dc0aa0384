//! Builders for images and indexes used in tests.
//!
//! Every fixture produces real content: manifests are serialized, blobs are
//! hashed and digests are consistent, so fixtures can be written to any
//! [`Transport`](ferry_registry::Transport).

use std::sync::Arc;

use bytes::Bytes;
use ferry_core::{
    descriptor, media_types, Artifact, DescriptorEx, Digest, Image, ImageIndex,
    ImageManifestBuilder, IndexEntry, InlineBlobs, MediaType, Result,
};
use serde_json::json;

/// Builder for single-platform images.
///
/// # Examples
///
/// ```rust
/// use ferry_core::DescriptorEx;
/// use ferry_test::ImageFixture;
///
/// let image = ImageFixture::new("linux", "arm64").variant("v8").layers(2).build()?;
/// assert_eq!(image.layers().len(), 2);
/// assert_eq!(image.descriptor()?.with_platform(image.platform()?).platform_name().as_deref(), Some("linux/arm64/v8"));
/// # Ok::<(), ferry_core::Error>(())
/// ```
#[derive(Debug, Clone)]
pub struct ImageFixture {
    os: String,
    architecture: String,
    variant: Option<String>,
    docker: bool,
    layers: usize,
    foreign_layers: usize,
    label: String,
}

impl ImageFixture {
    /// Creates an OCI image builder for `os/architecture` with one layer.
    #[must_use]
    pub fn new(os: &str, architecture: &str) -> Self {
        Self {
            os: os.to_string(),
            architecture: architecture.to_string(),
            variant: None,
            docker: false,
            layers: 1,
            foreign_layers: 0,
            label: String::new(),
        }
    }

    /// Sets the CPU variant.
    #[must_use]
    pub fn variant(mut self, variant: &str) -> Self {
        self.variant = Some(variant.to_string());
        self
    }

    /// Uses Docker schema 2 media types instead of OCI.
    #[must_use]
    pub const fn docker(mut self) -> Self {
        self.docker = true;
        self
    }

    /// Sets the number of layers.
    #[must_use]
    pub const fn layers(mut self, layers: usize) -> Self {
        self.layers = layers;
        self
    }

    /// Prepends Docker foreign layers. Their blobs are not held by the image,
    /// like base layers of Windows images that registries never serve.
    #[must_use]
    pub const fn foreign_layers(mut self, layers: usize) -> Self {
        self.foreign_layers = layers;
        self
    }

    /// Mixes `label` into the config and layers so otherwise identical
    /// fixtures get different digests.
    #[must_use]
    pub fn label(mut self, label: &str) -> Self {
        self.label = label.to_string();
        self
    }

    /// Builds the image.
    ///
    /// # Errors
    ///
    /// Returns an error if the manifest cannot be serialized.
    pub fn build(self) -> Result<Image> {
        let (manifest_type, config_type, layer_type) = if self.docker {
            (
                media_types::docker_manifest(),
                media_types::docker_config(),
                media_types::docker_layer(),
            )
        } else {
            (
                MediaType::ImageManifest,
                MediaType::ImageConfig,
                MediaType::ImageLayerGzip,
            )
        };

        let mut config = json!({
            "architecture": self.architecture,
            "os": self.os,
            "config": { "Labels": { "fixture": self.label } },
            "rootfs": { "type": "layers", "diff_ids": [] },
        });
        if let Some(variant) = &self.variant {
            config["variant"] = json!(variant);
        }
        let config = Bytes::from(serde_json::to_vec(&config)?);

        let platform = match &self.variant {
            Some(variant) => format!("{}/{}/{variant}", self.os, self.architecture),
            None => format!("{}/{}", self.os, self.architecture),
        };
        let blob = |kind: &str, i: usize| Bytes::from(format!("{platform}:{}:{kind}{i}", self.label));
        let foreign: Vec<Bytes> = (0..self.foreign_layers).map(|i| blob("foreign", i)).collect();
        let layers: Vec<Bytes> = (0..self.layers).map(|i| blob("", i)).collect();

        let mut descriptors = Vec::with_capacity(foreign.len() + layers.len());
        for l in &foreign {
            descriptors.push(descriptor(
                media_types::docker_foreign_layer(),
                &Digest::sha256(l),
                l.len() as u64,
            )?);
        }
        for l in &layers {
            descriptors.push(descriptor(layer_type.clone(), &Digest::sha256(l), l.len() as u64)?);
        }

        let manifest = ImageManifestBuilder::default()
            .schema_version(2_u32)
            .media_type(manifest_type)
            .config(descriptor(config_type, &Digest::sha256(&config), config.len() as u64)?)
            .layers(descriptors)
            .build()?;
        Image::build(manifest, config, Arc::new(InlineBlobs::new(layers)))
    }
}

/// Builder for multi-platform indexes.
///
/// # Examples
///
/// ```rust
/// use ferry_test::{ImageFixture, IndexFixture};
///
/// let index = IndexFixture::docker()
///     .image(ImageFixture::new("linux", "amd64").docker().build()?)
///     .image(ImageFixture::new("linux", "arm64").docker().build()?)
///     .build()?;
/// assert_eq!(index.len(), 2);
/// # Ok::<(), ferry_core::Error>(())
/// ```
#[derive(Debug, Clone)]
pub struct IndexFixture {
    media_type: MediaType,
    entries: Vec<(Artifact, bool)>,
}

impl IndexFixture {
    /// Starts an OCI image index.
    #[must_use]
    pub fn oci() -> Self {
        Self {
            media_type: MediaType::ImageIndex,
            entries: Vec::new(),
        }
    }

    /// Starts a Docker manifest list.
    #[must_use]
    pub fn docker() -> Self {
        Self {
            media_type: media_types::docker_manifest_list(),
            entries: Vec::new(),
        }
    }

    /// Adds an image; its descriptor carries the platform from its config.
    #[must_use]
    pub fn image(mut self, image: Image) -> Self {
        self.entries.push((Artifact::Image(image), true));
        self
    }

    /// Adds an image whose descriptor has no platform, like an attestation
    /// manifest.
    #[must_use]
    pub fn image_without_platform(mut self, image: Image) -> Self {
        self.entries.push((Artifact::Image(image), false));
        self
    }

    /// Adds a nested index.
    #[must_use]
    pub fn index(mut self, index: ImageIndex) -> Self {
        self.entries.push((Artifact::Index(index), false));
        self
    }

    /// Builds the index.
    ///
    /// # Errors
    ///
    /// Returns an error if an image config cannot be parsed.
    pub fn build(self) -> Result<ImageIndex> {
        let mut entries = Vec::with_capacity(self.entries.len());
        for (artifact, with_platform) in self.entries {
            let mut descriptor = artifact.descriptor()?;
            if let (Artifact::Image(image), true) = (&artifact, with_platform) {
                descriptor = descriptor.with_platform(image.platform()?);
            }
            entries.push(IndexEntry::new(descriptor, artifact));
        }
        ImageIndex::new(self.media_type, entries)
    }
}

/// Renders the platforms of an index's entries, `-` for entries without one.
#[must_use]
pub fn platforms(index: &ImageIndex) -> Vec<String> {
    index
        .entries()
        .map(|(descriptor, _)| descriptor.platform_name().unwrap_or_else(|| "-".to_string()))
        .collect()
}
