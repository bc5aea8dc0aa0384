//! Run inputs: which images and charts to replicate.
//!
//! Both sets key their outer maps with [`BTreeMap`], so registries, images,
//! repositories and charts always iterate in lexicographic order. Tags and
//! versions keep the order they were configured in.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Images to replicate from a single source registry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryImages {
    /// Image name to tags, tags in configuration order.
    #[serde(default)]
    pub images: BTreeMap<String, Vec<String>>,

    /// TLS verification for the source registry. Carried for round-tripping
    /// configuration files; bundle pushes read from a local registry.
    #[serde(rename = "tls-verify", default, skip_serializing_if = "Option::is_none")]
    pub tls_verify: Option<bool>,
}

/// Mapping from registry name to the images to replicate from it.
///
/// # Examples
///
/// ```
/// use ferry_core::RegistryImageSet;
///
/// let set = RegistryImageSet::from_yaml(
///     "docker.io:\n  images:\n    nginx: [\"1.27\", \"1.26\"]\n    alpine: [\"3.20\"]\n",
/// )?;
///
/// assert_eq!(set.total_images(), 3);
/// let images: Vec<_> = set.iter().map(|(_, image, _)| image).collect();
/// assert_eq!(images, ["alpine", "nginx"]);
/// # Ok::<(), ferry_core::Error>(())
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RegistryImageSet(BTreeMap<String, RegistryImages>);

impl RegistryImageSet {
    /// Creates an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses the structured YAML form.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigParse`] if the document does not have the
    /// expected shape.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let set: Option<Self> =
            serde_yaml::from_str(yaml).map_err(|source| Error::ConfigParse { source })?;
        Ok(set.unwrap_or_default())
    }

    /// Reads and parses a YAML file.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigRead`] if the file cannot be read, or
    /// [`Error::ConfigParse`] if it cannot be parsed.
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let yaml = std::fs::read_to_string(path).map_err(|source| Error::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&yaml)
    }

    /// Appends `tags` to `image` under `registry`.
    pub fn insert<I, S>(&mut self, registry: impl Into<String>, image: impl Into<String>, tags: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.0
            .entry(registry.into())
            .or_default()
            .images
            .entry(image.into())
            .or_default()
            .extend(tags.into_iter().map(Into::into));
    }

    /// Iterates over registries in sorted order.
    pub fn registries(&self) -> impl Iterator<Item = (&str, &RegistryImages)> {
        self.0.iter().map(|(name, images)| (name.as_str(), images))
    }

    /// Iterates over `(registry, image, tags)` in push order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str, &[String])> {
        self.0.iter().flat_map(|(registry, cfg)| {
            cfg.images
                .iter()
                .map(move |(image, tags)| (registry.as_str(), image.as_str(), tags.as_slice()))
        })
    }

    /// Total number of tags across every registry and image.
    #[must_use]
    pub fn total_images(&self) -> usize {
        self.iter().map(|(_, _, tags)| tags.len()).sum()
    }

    /// Returns true if no registries are configured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Charts to replicate from a single chart repository.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChartRepository {
    /// Chart name to versions, versions in configuration order.
    #[serde(default)]
    pub charts: BTreeMap<String, Vec<String>>,

    /// Upstream repository URL the charts were bundled from.
    #[serde(rename = "repoURL", default, skip_serializing_if = "Option::is_none")]
    pub repo_url: Option<String>,
}

/// Mapping from chart repository name to the charts to replicate.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChartRepositorySet {
    /// Repositories by name.
    #[serde(default)]
    pub repositories: BTreeMap<String, ChartRepository>,
}

impl ChartRepositorySet {
    /// Creates an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses the structured YAML form.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigParse`] if the document does not have the
    /// expected shape.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let set: Option<Self> =
            serde_yaml::from_str(yaml).map_err(|source| Error::ConfigParse { source })?;
        Ok(set.unwrap_or_default())
    }

    /// Reads and parses a YAML file.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigRead`] if the file cannot be read, or
    /// [`Error::ConfigParse`] if it cannot be parsed.
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let yaml = std::fs::read_to_string(path).map_err(|source| Error::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&yaml)
    }

    /// Appends `versions` to `chart` under `repository`.
    pub fn insert<I, S>(&mut self, repository: impl Into<String>, chart: impl Into<String>, versions: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.repositories
            .entry(repository.into())
            .or_default()
            .charts
            .entry(chart.into())
            .or_default()
            .extend(versions.into_iter().map(Into::into));
    }

    /// Iterates over `(repository, chart, versions)` in push order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str, &[String])> {
        self.repositories.iter().flat_map(|(repository, cfg)| {
            cfg.charts.iter().map(move |(chart, versions)| {
                (repository.as_str(), chart.as_str(), versions.as_slice())
            })
        })
    }

    /// Total number of versions across every repository and chart.
    #[must_use]
    pub fn total_charts(&self) -> usize {
        self.iter().map(|(_, _, versions)| versions.len()).sum()
    }

    /// Returns true if no repositories are configured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.repositories.is_empty()
    }
}
