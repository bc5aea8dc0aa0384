//! Multi-platform image indexes.

use bytes::Bytes;
use oci_spec::image::{Descriptor, ImageIndex as IndexManifest, ImageIndexBuilder, MediaType, Platform};

use crate::descriptor::{descriptor, DescriptorEx};
use crate::digest::Digest;
use crate::error::{Error, Result};
use crate::image::Image;
use crate::media_types::{self, MediaTypeEx};

/// Content an index entry points at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Artifact {
    /// A single-platform image manifest.
    Image(Image),
    /// A nested index.
    Index(ImageIndex),
}

impl Artifact {
    /// Returns the digest of the artifact's manifest.
    #[must_use]
    pub fn digest(&self) -> Digest {
        match self {
            Self::Image(image) => image.digest(),
            Self::Index(index) => index.digest(),
        }
    }

    /// Returns the artifact's manifest media type.
    #[must_use]
    pub const fn media_type(&self) -> &MediaType {
        match self {
            Self::Image(image) => image.media_type(),
            Self::Index(index) => index.media_type(),
        }
    }

    /// Returns a descriptor pointing at the artifact.
    ///
    /// # Errors
    ///
    /// Returns an error if the descriptor cannot be built.
    pub fn descriptor(&self) -> Result<Descriptor> {
        match self {
            Self::Image(image) => image.descriptor(),
            Self::Index(index) => index.descriptor(),
        }
    }
}

/// A descriptor paired with the content it points at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexEntry {
    /// Descriptor as listed in the index.
    pub descriptor: Descriptor,
    /// The referenced content.
    pub artifact: Artifact,
}

impl IndexEntry {
    /// Creates a new entry.
    #[must_use]
    pub const fn new(descriptor: Descriptor, artifact: Artifact) -> Self {
        Self {
            descriptor,
            artifact,
        }
    }

    /// Returns the platform listed in the descriptor, if any.
    #[must_use]
    pub fn platform(&self) -> Option<&Platform> {
        self.descriptor.platform().as_ref()
    }
}

/// An image index together with every child it references.
///
/// Like [`Image`], an index is immutable once digested: merging or
/// normalizing produces a new `ImageIndex` value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageIndex {
    manifest: IndexManifest,
    media_type: MediaType,
    raw: Bytes,
    children: Vec<Artifact>,
}

impl ImageIndex {
    /// Creates an index with no entries.
    ///
    /// # Errors
    ///
    /// Returns an error if `media_type` is not an index type.
    pub fn empty(media_type: MediaType) -> Result<Self> {
        Self::new(media_type, Vec::new())
    }

    /// Builds an index from entries.
    ///
    /// # Errors
    ///
    /// Returns an error if `media_type` is not an index type or an entry's
    /// descriptor digest does not match its content.
    pub fn new(media_type: MediaType, entries: Vec<IndexEntry>) -> Result<Self> {
        let template = ImageIndexBuilder::default()
            .schema_version(2_u32)
            .media_type(media_type)
            .manifests(Vec::new())
            .build()?;
        Self::build(template, entries)
    }

    /// Builds a new index that keeps this index's media type and annotations
    /// but lists `entries` instead.
    ///
    /// # Errors
    ///
    /// Returns an error if an entry's descriptor digest does not match its
    /// content.
    pub fn with_entries(&self, entries: Vec<IndexEntry>) -> Result<Self> {
        let mut template = self.manifest.clone();
        template.set_media_type(Some(self.media_type.clone()));
        template.set_manifests(Vec::new());
        Self::build(template, entries)
    }

    fn build(mut manifest: IndexManifest, entries: Vec<IndexEntry>) -> Result<Self> {
        let media_type = manifest
            .media_type()
            .clone()
            .ok_or_else(|| Error::InvalidManifest {
                reason: "built indexes must declare a media type".to_string(),
            })?;
        if !media_type.is_index() {
            return Err(Error::InvalidManifest {
                reason: format!("{media_type} is not an index type"),
            });
        }

        let mut descriptors = Vec::with_capacity(entries.len());
        let mut children = Vec::with_capacity(entries.len());
        for entry in entries {
            check_entry(&entry.descriptor, &entry.artifact)?;
            descriptors.push(entry.descriptor);
            children.push(entry.artifact);
        }
        manifest.set_manifests(descriptors);

        let raw = Bytes::from(serde_json::to_vec(&manifest)?);
        Ok(Self {
            manifest,
            media_type,
            raw,
            children,
        })
    }

    /// Wraps index bytes fetched from a registry together with its children.
    ///
    /// `children` must be in the same order as the index's descriptors.
    ///
    /// # Errors
    ///
    /// Returns an error if the bytes are not an index, the child count
    /// differs, or a child's digest does not match its descriptor.
    pub fn from_raw(raw: Bytes, content_type: Option<MediaType>, children: Vec<Artifact>) -> Result<Self> {
        let manifest = Self::parse_manifest(&raw)?;
        let media_type = manifest
            .media_type()
            .clone()
            .or(content_type)
            .unwrap_or(MediaType::ImageIndex);
        if !media_type.is_index() {
            return Err(Error::InvalidManifest {
                reason: format!("{media_type} is not an index type"),
            });
        }
        if manifest.manifests().len() != children.len() {
            return Err(Error::InvalidManifest {
                reason: format!(
                    "index lists {} manifests but {} children were supplied",
                    manifest.manifests().len(),
                    children.len()
                ),
            });
        }
        for (descriptor, child) in manifest.manifests().iter().zip(&children) {
            check_entry(descriptor, child)?;
        }
        Ok(Self {
            manifest,
            media_type,
            raw,
            children,
        })
    }

    /// Parses index bytes without children, so callers can learn which
    /// children to fetch.
    ///
    /// # Errors
    ///
    /// Returns an error if the bytes are not valid index JSON.
    pub fn parse_manifest(raw: &[u8]) -> Result<IndexManifest> {
        Ok(serde_json::from_slice(raw)?)
    }

    /// Wraps a single-platform image in a one-entry index.
    ///
    /// The entry's platform is read from the image config. Docker manifests
    /// get a Docker manifest list, everything else an OCI index.
    ///
    /// # Errors
    ///
    /// Returns an error if the image config cannot be parsed.
    pub fn for_single_platform_image(image: Image) -> Result<Self> {
        let media_type = if image.media_type().is_docker() {
            media_types::docker_manifest_list()
        } else {
            MediaType::ImageIndex
        };
        let descriptor = image.descriptor()?.with_platform(image.platform()?);
        Self::new(media_type, vec![IndexEntry::new(descriptor, Artifact::Image(image))])
    }

    /// Returns the parsed index manifest.
    #[must_use]
    pub const fn manifest(&self) -> &IndexManifest {
        &self.manifest
    }

    /// Returns the index media type.
    #[must_use]
    pub const fn media_type(&self) -> &MediaType {
        &self.media_type
    }

    /// Returns the index bytes the digest is computed over.
    #[must_use]
    pub const fn raw_manifest(&self) -> &Bytes {
        &self.raw
    }

    /// Iterates over descriptors paired with their content, in order.
    pub fn entries(&self) -> impl Iterator<Item = (&Descriptor, &Artifact)> {
        self.manifest.manifests().iter().zip(self.children.iter())
    }

    /// Consumes the index, returning its entries in order.
    #[must_use]
    pub fn into_entries(self) -> Vec<IndexEntry> {
        self.manifest
            .manifests()
            .iter()
            .cloned()
            .zip(self.children)
            .map(|(descriptor, artifact)| IndexEntry::new(descriptor, artifact))
            .collect()
    }

    /// Returns the number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.children.len()
    }

    /// Returns true if the index has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    /// Returns the digest of the index manifest.
    #[must_use]
    pub fn digest(&self) -> Digest {
        Digest::sha256(&self.raw)
    }

    /// Returns the size of the index manifest in bytes.
    #[must_use]
    pub fn size(&self) -> u64 {
        self.raw.len() as u64
    }

    /// Returns a descriptor pointing at this index.
    ///
    /// # Errors
    ///
    /// Returns an error if the descriptor cannot be built.
    pub fn descriptor(&self) -> Result<Descriptor> {
        descriptor(self.media_type.clone(), &self.digest(), self.size())
    }
}

fn check_entry(descriptor: &Descriptor, artifact: &Artifact) -> Result<()> {
    let listed = descriptor.content_digest()?;
    let actual = artifact.digest();
    if listed != actual {
        return Err(Error::InvalidManifest {
            reason: format!(
                "descriptor digest {listed} does not match content digest {actual}"
            ),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::PlatformEx;
    use oci_spec::image::ImageManifestBuilder;

    fn image_for(os: &str, arch: &str, media_type: MediaType) -> Image {
        let config = Bytes::from(format!(r#"{{"architecture":"{arch}","os":"{os}"}}"#));
        let manifest = ImageManifestBuilder::default()
            .schema_version(2_u32)
            .media_type(media_type)
            .config(
                descriptor(MediaType::ImageConfig, &Digest::sha256(&config), config.len() as u64)
                    .unwrap(),
            )
            .layers(Vec::new())
            .build()
            .unwrap();
        Image::new(manifest, config, Vec::new()).unwrap()
    }

    fn entry_for(image: Image) -> IndexEntry {
        let descriptor = image
            .descriptor()
            .unwrap()
            .with_platform(image.platform().unwrap());
        IndexEntry::new(descriptor, Artifact::Image(image))
    }

    #[test]
    fn test_empty_index() {
        let index = ImageIndex::empty(MediaType::ImageIndex).unwrap();
        assert!(index.is_empty());
        assert_eq!(index.media_type(), &MediaType::ImageIndex);
    }

    #[test]
    fn test_non_index_media_type_rejected() {
        assert!(ImageIndex::empty(MediaType::ImageManifest).is_err());
    }

    #[test]
    fn test_entries_in_order() {
        let amd64 = image_for("linux", "amd64", MediaType::ImageManifest);
        let arm64 = image_for("linux", "arm64", MediaType::ImageManifest);
        let index = ImageIndex::new(
            MediaType::ImageIndex,
            vec![entry_for(amd64.clone()), entry_for(arm64.clone())],
        )
        .unwrap();

        let digests: Vec<_> = index
            .entries()
            .map(|(d, _)| d.content_digest().unwrap())
            .collect();
        assert_eq!(digests, vec![amd64.digest(), arm64.digest()]);
        assert_eq!(index.digest(), Digest::sha256(index.raw_manifest()));
    }

    #[test]
    fn test_mismatched_entry_rejected() {
        let amd64 = image_for("linux", "amd64", MediaType::ImageManifest);
        let arm64 = image_for("linux", "arm64", MediaType::ImageManifest);
        let bad = IndexEntry::new(amd64.descriptor().unwrap(), Artifact::Image(arm64));
        assert!(ImageIndex::new(MediaType::ImageIndex, vec![bad]).is_err());
    }

    #[test]
    fn test_single_platform_docker_image_gets_manifest_list() {
        let image = image_for("linux", "amd64", media_types::docker_manifest());
        let index = ImageIndex::for_single_platform_image(image.clone()).unwrap();
        assert_eq!(index.media_type(), &media_types::docker_manifest_list());
        assert_eq!(index.len(), 1);
        let (descriptor, _) = index.entries().next().unwrap();
        assert_eq!(descriptor.content_digest().unwrap(), image.digest());
        assert_eq!(
            descriptor.platform().as_ref(),
            Some(&Platform::parse("linux/amd64").unwrap())
        );
    }

    #[test]
    fn test_from_raw_round_trip() {
        let image = image_for("linux", "amd64", MediaType::ImageManifest);
        let index = ImageIndex::new(MediaType::ImageIndex, vec![entry_for(image.clone())]).unwrap();
        let parsed = ImageIndex::from_raw(
            index.raw_manifest().clone(),
            None,
            vec![Artifact::Image(image)],
        )
        .unwrap();
        assert_eq!(parsed, index);
    }

    #[test]
    fn test_docker_list_serializes_media_type() {
        let index = ImageIndex::empty(media_types::docker_manifest_list()).unwrap();
        let json: serde_json::Value = serde_json::from_slice(index.raw_manifest()).unwrap();
        assert_eq!(json["schemaVersion"], 2);
        assert_eq!(json["mediaType"], media_types::DOCKER_MANIFEST_LIST);
        assert_eq!(json["manifests"].as_array().unwrap().len(), 0);
    }

    #[test]
    fn test_with_entries_keeps_media_type_and_annotations() {
        let image = image_for("linux", "amd64", media_types::docker_manifest());
        let mut manifest = ImageIndexBuilder::default()
            .schema_version(2_u32)
            .media_type(media_types::docker_manifest_list())
            .manifests(Vec::new())
            .build()
            .unwrap();
        manifest.set_annotations(Some([("a".to_string(), "b".to_string())].into_iter().collect()));
        let base = ImageIndex::build(manifest, Vec::new()).unwrap();

        let rebuilt = base.with_entries(vec![entry_for(image)]).unwrap();
        assert_eq!(rebuilt.media_type(), &media_types::docker_manifest_list());
        assert_eq!(rebuilt.len(), 1);
        assert!(rebuilt.manifest().annotations().is_some());
    }
}
