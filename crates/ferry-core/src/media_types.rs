//! Media types ferry handles beyond the variants of [`MediaType`].
//!
//! Docker schema 2 types have no [`MediaType`] variant and are carried as
//! [`MediaType::Other`]. Always construct them through the functions here so
//! that equal types compare equal.

use oci_spec::image::MediaType;

/// Docker image manifest (schema 2).
pub const DOCKER_MANIFEST: &str = "application/vnd.docker.distribution.manifest.v2+json";

/// Docker manifest list.
pub const DOCKER_MANIFEST_LIST: &str = "application/vnd.docker.distribution.manifest.list.v2+json";

/// Docker image config.
pub const DOCKER_CONFIG: &str = "application/vnd.docker.container.image.v1+json";

/// Docker gzip layer.
pub const DOCKER_LAYER: &str = "application/vnd.docker.image.rootfs.diff.tar.gzip";

/// Docker foreign layer. Its blob lives outside the registry.
pub const DOCKER_FOREIGN_LAYER: &str = "application/vnd.docker.image.rootfs.foreign.diff.tar.gzip";

/// Prefix shared by the OCI non-distributable layer types.
pub const OCI_NON_DISTRIBUTABLE_PREFIX: &str = "application/vnd.oci.image.layer.nondistributable.";

const OCI_NON_DISTRIBUTABLE_GZIP: &str =
    "application/vnd.oci.image.layer.nondistributable.v1.tar+gzip";

/// Docker image manifest media type.
#[must_use]
pub fn docker_manifest() -> MediaType {
    MediaType::from(DOCKER_MANIFEST)
}

/// Docker manifest list media type.
#[must_use]
pub fn docker_manifest_list() -> MediaType {
    MediaType::from(DOCKER_MANIFEST_LIST)
}

/// Docker image config media type.
#[must_use]
pub fn docker_config() -> MediaType {
    MediaType::from(DOCKER_CONFIG)
}

/// Docker gzip layer media type.
#[must_use]
pub fn docker_layer() -> MediaType {
    MediaType::from(DOCKER_LAYER)
}

/// Docker foreign layer media type.
#[must_use]
pub fn docker_foreign_layer() -> MediaType {
    MediaType::from(DOCKER_FOREIGN_LAYER)
}

/// Every manifest and index type ferry accepts, most preferred first.
#[must_use]
pub fn manifest_types() -> [MediaType; 4] {
    [
        MediaType::ImageIndex,
        docker_manifest_list(),
        MediaType::ImageManifest,
        docker_manifest(),
    ]
}

/// Extension of [`MediaType`]
pub trait MediaTypeEx {
    /// Returns true for multi-platform index types (OCI index or Docker list).
    fn is_index(&self) -> bool;

    /// Returns true for single-platform image manifest types.
    fn is_image(&self) -> bool;

    /// Returns true for any type in the `application/vnd.oci.` family.
    fn is_oci(&self) -> bool;

    /// Returns true for Docker-specific types.
    fn is_docker(&self) -> bool;

    /// Returns true for OCI image layer types.
    fn is_oci_layer(&self) -> bool;

    /// Returns true for layers whose blob registries are not expected to
    /// serve: Docker foreign layers and OCI non-distributable layers.
    fn is_non_distributable(&self) -> bool;

    /// Maps a layer media type onto its OCI counterpart.
    ///
    /// Docker foreign layers become OCI non-distributable layers. OCI layer
    /// types are returned unchanged; everything else becomes the OCI gzip
    /// layer type.
    ///
    /// # Examples
    ///
    /// ```
    /// use ferry_core::media_types::{self, MediaTypeEx};
    /// use ferry_core::MediaType;
    ///
    /// assert_eq!(media_types::docker_layer().to_oci_layer(), MediaType::ImageLayerGzip);
    ///
    /// let zstd = MediaType::ImageLayerZstd;
    /// assert_eq!(zstd.to_oci_layer(), zstd);
    /// ```
    fn to_oci_layer(&self) -> MediaType;
}

impl MediaTypeEx for MediaType {
    fn is_index(&self) -> bool {
        *self == Self::ImageIndex || self.to_string() == DOCKER_MANIFEST_LIST
    }

    fn is_image(&self) -> bool {
        *self == Self::ImageManifest || self.to_string() == DOCKER_MANIFEST
    }

    fn is_oci(&self) -> bool {
        self.to_string().starts_with("application/vnd.oci.")
    }

    fn is_docker(&self) -> bool {
        self.to_string().starts_with("application/vnd.docker.")
    }

    fn is_oci_layer(&self) -> bool {
        self.to_string().starts_with("application/vnd.oci.image.layer.")
    }

    fn is_non_distributable(&self) -> bool {
        let media_type = self.to_string();
        media_type == DOCKER_FOREIGN_LAYER || media_type.starts_with(OCI_NON_DISTRIBUTABLE_PREFIX)
    }

    fn to_oci_layer(&self) -> MediaType {
        if self.is_oci_layer() {
            return self.clone();
        }
        if self.to_string() == DOCKER_FOREIGN_LAYER {
            return MediaType::from(OCI_NON_DISTRIBUTABLE_GZIP);
        }
        MediaType::ImageLayerGzip
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_index_types() {
        assert!(MediaType::ImageIndex.is_index());
        assert!(docker_manifest_list().is_index());
        assert!(!MediaType::ImageManifest.is_index());
    }

    #[test]
    fn test_image_types() {
        assert!(MediaType::ImageManifest.is_image());
        assert!(docker_manifest().is_image());
        assert!(!MediaType::ImageIndex.is_image());
        assert!(!MediaType::from("application/vnd.cncf.helm.config.v1+json").is_image());
    }

    #[test]
    fn test_family_checks() {
        assert!(MediaType::ImageConfig.is_oci());
        assert!(docker_config().is_docker());
        assert!(!docker_config().is_oci());
    }

    #[test]
    fn test_docker_types_round_trip_through_strings() {
        assert_eq!(docker_manifest_list().to_string(), DOCKER_MANIFEST_LIST);
        assert_eq!(
            MediaType::from(DOCKER_MANIFEST_LIST),
            docker_manifest_list()
        );
        let json = serde_json::to_string(&docker_layer()).unwrap();
        assert_eq!(json, format!("\"{DOCKER_LAYER}\""));
    }

    #[test]
    fn test_foreign_layer_maps_to_non_distributable() {
        let oci = docker_foreign_layer().to_oci_layer();
        assert_eq!(oci.to_string(), OCI_NON_DISTRIBUTABLE_GZIP);
        assert!(oci.is_non_distributable());
    }

    #[test]
    fn test_non_distributable_layers() {
        assert!(docker_foreign_layer().is_non_distributable());
        assert!(MediaType::from(OCI_NON_DISTRIBUTABLE_GZIP).is_non_distributable());
        assert!(!docker_layer().is_non_distributable());
        assert!(!MediaType::ImageLayerGzip.is_non_distributable());
    }
}
