//! Helpers for OCI content descriptors.

use oci_spec::image::{Descriptor, DescriptorBuilder, MediaType, Platform};

use crate::digest::Digest;
use crate::error::{Error, Result};
use crate::media_types::MediaTypeEx;
use crate::platform::PlatformEx;

/// Builds a descriptor for `size` bytes of content with digest `digest`.
///
/// # Examples
///
/// ```
/// use ferry_core::{descriptor, DescriptorEx, Digest, MediaType};
///
/// let desc = descriptor(MediaType::ImageManifest, &Digest::sha256(b"{}"), 2)?;
/// assert_eq!(desc.content_size(), 2);
/// assert!(desc.platform().is_none());
/// # Ok::<(), ferry_core::Error>(())
/// ```
///
/// # Errors
///
/// Returns an error if `size` does not fit the descriptor's size field.
pub fn descriptor(media_type: MediaType, digest: &Digest, size: u64) -> Result<Descriptor> {
    let size = i64::try_from(size).map_err(|_| Error::InvalidManifest {
        reason: format!("content of {size} bytes is too large to describe"),
    })?;
    Ok(DescriptorBuilder::default()
        .media_type(media_type)
        .size(size)
        .digest(digest.to_string())
        .build()?)
}

/// Extension of [`Descriptor`]
pub trait DescriptorEx {
    /// Parses the descriptor's digest.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidDigest`] if the digest is malformed.
    fn content_digest(&self) -> Result<Digest>;

    /// Returns the size of the described content, zero if it is negative.
    fn content_size(&self) -> u64;

    /// Returns true when the described blob is expected to be served by
    /// registries. Foreign and non-distributable layers are not.
    fn is_distributable(&self) -> bool;

    /// Renders the descriptor's platform, `None` when it has none.
    fn platform_name(&self) -> Option<String>;

    /// Returns a copy of the descriptor pointing at the given platform.
    #[must_use]
    fn with_platform(self, platform: Option<Platform>) -> Self;
}

impl DescriptorEx for Descriptor {
    fn content_digest(&self) -> Result<Digest> {
        Digest::parse(self.digest())
    }

    fn content_size(&self) -> u64 {
        u64::try_from(self.size()).unwrap_or_default()
    }

    fn is_distributable(&self) -> bool {
        !self.media_type().is_non_distributable()
    }

    fn platform_name(&self) -> Option<String> {
        self.platform().as_ref().map(PlatformEx::describe)
    }

    fn with_platform(mut self, platform: Option<Platform>) -> Self {
        self.set_platform(platform);
        self
    }
}
